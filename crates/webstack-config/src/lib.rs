pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 設定ファイルの候補（優先順）
pub const CONFIG_CANDIDATES: [&str; 4] = [
    "webstack.local.kdl",
    ".webstack.local.kdl",
    "webstack.kdl",
    ".webstack.kdl",
];

/// 設定ファイルのパスを直接指定する環境変数
pub const CONFIG_PATH_ENV: &str = "WEBSTACK_CONFIG_PATH";

/// webstackのグローバル設定ディレクトリを取得
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("webstack");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// プロジェクトの webstack.kdl を探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 WEBSTACK_CONFIG_PATH
/// 2. カレントディレクトリ: webstack.local.kdl, .webstack.local.kdl, webstack.kdl, .webstack.kdl
/// 3. ./.webstack/ ディレクトリ内: 同様の順序
/// 4. ~/.config/webstack/webstack.kdl
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;
    let search_dirs = [current_dir.clone(), current_dir.join(".webstack")];

    for dir in search_dirs.iter().filter(|d| d.is_dir()) {
        if let Some(path) = CONFIG_CANDIDATES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())
        {
            return Ok(path);
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("webstack").join("webstack.kdl");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// デプロイ先のアカウントとリージョン
///
/// コードに埋め込まず、常にプロセスの環境変数から読み込みます。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEnvironment {
    pub account: String,
    pub region: String,
}

const ACCOUNT_VARS: [&str; 2] = ["WEBSTACK_ACCOUNT", "CDK_DEFAULT_ACCOUNT"];
const REGION_VARS: [&str; 3] = ["WEBSTACK_REGION", "CDK_DEFAULT_REGION", "AWS_REGION"];

impl AccountEnvironment {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            account: first_env(&ACCOUNT_VARS)?,
            region: first_env(&REGION_VARS)?,
        })
    }
}

fn first_env(names: &[&str]) -> Result<String> {
    names
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()))
        .ok_or_else(|| ConfigError::MissingEnvVar(names.join(" / ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_get_config_dir() {
        let config_dir = get_config_dir().unwrap();
        assert!(config_dir.ends_with("webstack"));
        assert!(config_dir.exists());
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        fs::write(temp_dir.path().join("webstack.kdl"), "// test").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = temp_env::with_var_unset(CONFIG_PATH_ENV, find_config_file);
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with("webstack.kdl"));
    }

    #[test]
    #[serial]
    fn test_local_file_has_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        fs::write(temp_dir.path().join("webstack.kdl"), "// shared").unwrap();
        fs::write(temp_dir.path().join(".webstack.local.kdl"), "// local").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = temp_env::with_var_unset(CONFIG_PATH_ENV, find_config_file);
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with(".webstack.local.kdl"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_webstack_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        let dir = temp_dir.path().join(".webstack");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("webstack.kdl"), "// nested").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = temp_env::with_var_unset(CONFIG_PATH_ENV, find_config_file);
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with(".webstack/webstack.kdl"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.kdl");
        fs::write(&config_path, "// custom").unwrap();

        let result = temp_env::with_var(CONFIG_PATH_ENV, Some(&config_path), find_config_file);
        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    #[serial]
    fn test_find_config_file_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = temp_env::with_vars(
            [(CONFIG_PATH_ENV, None::<&str>), ("HOME", Some(temp_dir.path().to_str().unwrap())), ("XDG_CONFIG_HOME", None)],
            find_config_file,
        );
        std::env::set_current_dir(original_dir).unwrap();

        assert!(matches!(result, Err(ConfigError::ConfigFileNotFound)));
    }

    #[test]
    #[serial]
    fn test_account_environment_fallbacks() {
        temp_env::with_vars(
            [
                ("WEBSTACK_ACCOUNT", None),
                ("CDK_DEFAULT_ACCOUNT", Some("123456789012")),
                ("WEBSTACK_REGION", Some("ap-northeast-1")),
                ("CDK_DEFAULT_REGION", Some("us-east-1")),
            ],
            || {
                let env = AccountEnvironment::from_env().unwrap();
                assert_eq!(env.account, "123456789012");
                assert_eq!(env.region, "ap-northeast-1");
            },
        );
    }

    #[test]
    #[serial]
    fn test_account_environment_missing() {
        temp_env::with_vars(
            [
                ("WEBSTACK_ACCOUNT", None::<&str>),
                ("CDK_DEFAULT_ACCOUNT", None),
                ("WEBSTACK_REGION", Some("us-east-1")),
            ],
            || match AccountEnvironment::from_env() {
                Err(ConfigError::MissingEnvVar(vars)) => {
                    assert!(vars.contains("WEBSTACK_ACCOUNT"));
                }
                other => panic!("unexpected: {:?}", other),
            },
        );
    }
}
