use super::{
    ANCHOR_LINE, BootstrapParams, CONFIG_PATH, CONFIG_SAMPLE_PATH, ConfigEdit, Step, php_quote,
};
use crate::error::{Result, StackError};
use crate::model::RendererKind;
use tera::{Context, Tera};

/// `wp-config.php` を生成する方式
pub trait ConfigRenderer: Send + Sync {
    fn name(&self) -> &'static str;

    /// 設定ファイルを用意する手順
    fn config_steps(&self, params: &BootstrapParams) -> Result<Vec<Step>>;
}

pub fn renderer_for(kind: RendererKind) -> Box<dyn ConfigRenderer> {
    match kind {
        RendererKind::Sed => Box::new(SedSubstitution),
        RendererKind::Template => Box::new(TemplatedConfig),
    }
}

/// サンプル設定をコピーしてその場で置換する
///
/// 置換はサンプルの文字列に依存します。上流のサンプルが変わると
/// 置換やアンカー行への挿入が空振りする可能性があります。
#[derive(Debug, Clone, Copy, Default)]
pub struct SedSubstitution;

impl ConfigRenderer for SedSubstitution {
    fn name(&self) -> &'static str {
        "sed"
    }

    fn config_steps(&self, params: &BootstrapParams) -> Result<Vec<Step>> {
        let mut edits: Vec<ConfigEdit> = params
            .substitutions()
            .iter()
            .map(|(placeholder, value)| ConfigEdit::Replace {
                from: format!("'{}'", placeholder),
                to: php_quote(value),
            })
            .collect();

        // 各挿入はアンカー直後に入るので、最終的な順序の逆に並べる
        for line in params.identity_directives().into_iter().rev() {
            edits.push(ConfigEdit::InsertAfter {
                anchor: ANCHOR_LINE.to_string(),
                line,
            });
        }

        Ok(vec![
            Step::command(format!("sudo cp {} {}", CONFIG_SAMPLE_PATH, CONFIG_PATH)),
            Step::EditConfig {
                path: CONFIG_PATH.to_string(),
                edits,
            },
        ])
    }
}

const WP_CONFIG_TEMPLATE: &str = r#"<?php
define( 'DB_NAME', {{ db_name }} );
define( 'DB_USER', {{ db_user }} );
define( 'DB_PASSWORD', {{ db_password }} );
define( 'DB_HOST', {{ db_host }} );
define( 'DB_CHARSET', 'utf8' );
define( 'DB_COLLATE', '' );
{% for line in identity %}{{ line }}
{% endfor %}
$table_prefix = 'wp_';

define( 'WP_DEBUG', false );

if ( ! defined( 'ABSPATH' ) ) {
	define( 'ABSPATH', __DIR__ . '/' );
}

require_once ABSPATH . 'wp-settings.php';
"#;

/// 設定ファイル全体をテンプレートから生成する
///
/// サンプル設定の内容に依存しないため、アンカー行の変化の影響を受けません。
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplatedConfig;

impl ConfigRenderer for TemplatedConfig {
    fn name(&self) -> &'static str {
        "template"
    }

    fn config_steps(&self, params: &BootstrapParams) -> Result<Vec<Step>> {
        let mut context = Context::new();
        context.insert("db_name", &php_quote(&params.db_name));
        context.insert("db_user", &php_quote(&params.db_user));
        context.insert("db_password", &php_quote(params.db_password.expose()));
        context.insert("db_host", &php_quote(&params.db_endpoint));
        context.insert("identity", &params.identity_directives());

        let content = Tera::one_off(WP_CONFIG_TEMPLATE, &context, false)
            .map_err(|e| StackError::TemplateRenderError(e.to_string()))?;

        Ok(vec![Step::WriteFile {
            path: CONFIG_PATH.to_string(),
            content,
        }])
    }
}
