//! 統合ローダー
//!
//! ファイル発見、テンプレート展開、パースを統合

use crate::error::Result;
use crate::model::DeploymentConfig;
use crate::parser::parse_kdl_string;
use crate::template::TemplateProcessor;
use std::path::Path;
use tracing::{debug, info, instrument};

/// 設定ファイルを探してDeploymentConfigを生成
///
/// 以下の処理を実行:
/// 1. 設定ファイルの検出
/// 2. 変数の収集
/// 3. テンプレート展開
/// 4. KDLパース
#[instrument]
pub fn load_config() -> Result<DeploymentConfig> {
    info!("Starting config load");
    let path = webstack_config::find_config_file()?;
    load_config_from_path(&path)
}

/// 指定されたファイルからロード
#[instrument(skip(path), fields(path = %path.display()))]
pub fn load_config_from_path(path: &Path) -> Result<DeploymentConfig> {
    debug!("Step 1: Expanding template");
    let expanded = expand_config_file(path)?;

    debug!("Step 2: Parsing KDL");
    let name = project_dir(path)
        .and_then(|dir| dir.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();
    let config = parse_kdl_string(&expanded, name)?;
    info!(
        project = %config.project,
        environment = %config.environment,
        domain = %config.domain,
        "Config loaded successfully"
    );

    Ok(config)
}

/// 設定ファイルをテンプレート展開した結果を返す
///
/// 変数の優先順位は `.env` < `WEBSTACK_*` 環境変数。
pub fn expand_config_file(path: &Path) -> Result<String> {
    let mut processor = TemplateProcessor::new();

    if let Some(dir) = project_dir(path) {
        processor.add_variable("PROJECT_ROOT", dir.to_string_lossy().to_string());

        let env_file = dir.join(".env");
        if env_file.is_file() {
            processor.add_env_file_variables(&env_file)?;
        }
    }
    processor.add_env_variables();

    let expanded = processor.render_file(path)?;
    info!(content_size = expanded.len(), "Template expansion complete");
    Ok(expanded)
}

/// 設定ファイルの属するプロジェクトディレクトリ
///
/// `.webstack/` 内のファイルはその親をプロジェクトとみなします。
pub fn project_dir(path: &Path) -> Option<&Path> {
    let parent = path.parent()?;
    if parent.file_name().and_then(|n| n.to_str()) == Some(".webstack") {
        parent.parent()
    } else {
        Some(parent)
    }
}
