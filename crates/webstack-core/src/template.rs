//! テンプレート展開機能
//!
//! Teraを使用して設定ファイルをパース前に展開します。
//! 変数は `.env` ファイルと `WEBSTACK_` で始まる環境変数から集めます。

use crate::error::{Result, StackError};
use crate::onepassword;
use std::collections::HashMap;
use std::path::Path;
use tera::{Context, Tera};
use tracing::{debug, info};

/// テンプレートに渡す環境変数のプレフィックス
pub const ENV_PREFIX: &str = "WEBSTACK_";

/// 変数コンテキスト
pub type Variables = HashMap<String, String>;

/// テンプレートプロセッサ
pub struct TemplateProcessor {
    tera: Tera,
    variables: Variables,
}

impl TemplateProcessor {
    pub fn new() -> Self {
        Self {
            tera: Tera::default(),
            variables: Variables::new(),
        }
    }

    pub fn add_variable(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    /// `WEBSTACK_` で始まる環境変数を追加
    #[tracing::instrument(skip(self))]
    pub fn add_env_variables(&mut self) {
        let mut count = 0;
        for (key, value) in std::env::vars().filter(|(key, _)| key.starts_with(ENV_PREFIX)) {
            debug!(key = %key, "Adding environment variable");
            self.variables.insert(key, value);
            count += 1;
        }
        info!(env_var_count = count, "Added filtered environment variables");
    }

    /// .env ファイルから変数を読み込んで追加
    ///
    /// .env の変数はプレフィックス制限なしで全て読み込まれます。
    /// `op://` 参照は1Password CLIで解決します。
    #[tracing::instrument(skip(self))]
    pub fn add_env_file_variables(&mut self, env_file_path: &Path) -> Result<()> {
        let content =
            std::fs::read_to_string(env_file_path).map_err(|e| StackError::IoError {
                path: env_file_path.to_path_buf(),
                message: e.to_string(),
            })?;

        let mut file_vars = parse_env_file(&content);
        let resolved = onepassword::resolve_variables(&mut file_vars)?;

        info!(
            env_file = %env_file_path.display(),
            variable_count = file_vars.len(),
            resolved_secrets = resolved,
            "Loaded variables from .env file"
        );
        self.variables.extend(file_vars);
        Ok(())
    }

    /// 文字列をテンプレートとして展開
    pub fn render_str(&mut self, template: &str) -> Result<String> {
        let mut context = Context::new();
        for (key, value) in &self.variables {
            context.insert(key.as_str(), value);
        }
        self.tera
            .render_str(template, &context)
            .map_err(|e| StackError::TemplateRenderError(extract_tera_error_detail(&e)))
    }

    /// ファイルを読み込んでテンプレート展開
    pub fn render_file(&mut self, path: &Path) -> Result<String> {
        let content = std::fs::read_to_string(path).map_err(|e| StackError::IoError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        self.render_str(&content).map_err(|e| match e {
            StackError::TemplateRenderError(message) => StackError::TemplateError {
                file: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }
}

impl Default for TemplateProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// `KEY=VALUE` 形式の行を読む
///
/// 空行と `#` で始まる行は無視します。
pub fn parse_env_file(content: &str) -> Variables {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let key = key.trim().trim_start_matches("export ").trim();
            (key.to_string(), strip_quotes(value.trim()).to_string())
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn strip_quotes(s: &str) -> &str {
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// Teraエラーから詳細情報を抽出
fn extract_tera_error_detail(e: &tera::Error) -> String {
    use std::error::Error;

    let mut details = vec![e.to_string()];
    let mut source = e.source();
    while let Some(err) = source {
        details.push(err.to_string());
        source = err.source();
    }
    let full_error = details.join(" | ");

    if full_error.contains("not found in context")
        && let Some(start) = full_error.find("Variable `")
        && let Some(end) = full_error[start..].find("` not found")
    {
        let var_name = &full_error[start + 10..start + end];
        return format!(
            "未定義の変数: `{}`\nヒント: .env ファイルに追加するか、{}* 環境変数を設定してください",
            var_name, ENV_PREFIX
        );
    }

    full_error
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_simple_variable_expansion() {
        let mut processor = TemplateProcessor::new();
        processor.add_variable("DOMAIN", "example.com");

        let result = processor.render_str(r#"domain "{{ DOMAIN }}""#).unwrap();
        assert_eq!(result, r#"domain "example.com""#);
    }

    #[test]
    fn test_filter_and_default() {
        let mut processor = TemplateProcessor::new();
        processor.add_variable("ENV", "PROD");

        let template = r#"environment "{{ ENV | lower }}" key-pair "{{ KEY | default(value="ops") }}""#;
        let result = processor.render_str(template).unwrap();
        assert_eq!(result, r#"environment "prod" key-pair "ops""#);
    }

    #[test]
    fn test_undefined_variable_error() {
        let mut processor = TemplateProcessor::new();
        let err = processor.render_str("domain \"{{ MISSING }}\"").unwrap_err();
        match err {
            StackError::TemplateRenderError(msg) => assert!(msg.contains("MISSING")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_env_variables_filtering() {
        temp_env::with_vars(
            [
                ("WEBSTACK_DOMAIN", Some("example.com")),
                ("AWS_SECRET_ACCESS_KEY", Some("should-not-leak")),
            ],
            || {
                let mut processor = TemplateProcessor::new();
                processor.add_env_variables();
                assert_eq!(processor.variables()["WEBSTACK_DOMAIN"], "example.com");
                assert!(!processor.variables().contains_key("AWS_SECRET_ACCESS_KEY"));
            },
        );
    }

    #[test]
    fn test_parse_env_file() {
        let vars = parse_env_file(
            r#"
# comment
DOMAIN=example.com
export ENVIRONMENT="prod"
DB_USER='admin'
BROKEN_LINE
"#,
        );
        assert_eq!(vars.len(), 3);
        assert_eq!(vars["DOMAIN"], "example.com");
        assert_eq!(vars["ENVIRONMENT"], "prod");
        assert_eq!(vars["DB_USER"], "admin");
    }

    #[test]
    fn test_env_file_variables() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join(".env");
        std::fs::write(&env_path, "DOMAIN=example.net\n").unwrap();

        let mut processor = TemplateProcessor::new();
        processor.add_env_file_variables(&env_path).unwrap();
        let result = processor.render_str("domain \"{{ DOMAIN }}\"").unwrap();
        assert_eq!(result, "domain \"example.net\"");
    }

    #[test]
    fn test_render_file_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webstack.kdl");
        std::fs::write(&path, "domain \"{{ NOPE }}\"").unwrap();

        let err = TemplateProcessor::new().render_file(&path).unwrap_err();
        match err {
            StackError::TemplateError { file, .. } => assert_eq!(file, path),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
