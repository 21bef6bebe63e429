//! ホストのブートストラップ
//!
//! WordPressを取得・展開し、`wp-config.php` をデータベース接続情報で書き換える
//! 手順を組み立てます。パラメータはスクリプト生成時に一度だけ埋め込まれ、
//! 以降スクリプトは不変です。データベースのエンドポイントは属性トークンのまま
//! 埋め込まれ、評価エンジンが作成後の値に置換します。
//!
//! 設定ファイルの書き換え方式は [`ConfigRenderer`] で差し替えられます。

mod init;
mod renderer;

pub use init::DeclarativeInit;
pub use renderer::{ConfigRenderer, SedSubstitution, TemplatedConfig, renderer_for};

use crate::error::{Result, StackError};
use crate::secret::Secret;
use crate::token;
use tracing::debug;

/// Webルート
pub const WEB_ROOT: &str = "/var/www/html";
/// 書き換え対象の設定ファイル
pub const CONFIG_PATH: &str = "/var/www/html/wp-config.php";
/// 配布物に含まれるサンプル設定
pub const CONFIG_SAMPLE_PATH: &str = "/var/www/html/wp-config-sample.php";
/// サイト識別子を挿入するアンカー行
pub const ANCHOR_LINE: &str = "define( 'DB_COLLATE', '' );";
/// 配布物のURL
pub const DISTRIBUTION_URL: &str = "https://wordpress.org/latest.tar.gz";

/// サンプル設定のプレースホルダー
pub const PLACEHOLDERS: [&str; 4] = [
    "database_name_here",
    "username_here",
    "password_here",
    "localhost",
];

const PACKAGES: [&str; 3] = ["httpd", "php", "php-mysqlnd"];
const WEB_SERVICE: &str = "httpd";

/// スクリプトに埋め込むパラメータ
#[derive(Debug, Clone)]
pub struct BootstrapParams {
    /// データベースのエンドポイント（トークンのままでもよい）
    pub db_endpoint: String,
    pub db_name: String,
    pub db_user: String,
    pub db_password: Secret,
    pub site_domain: String,
    pub site_scheme: String,
    /// WP_SITEURL / WP_HOME を挿入するか
    pub site_identity: bool,
}

impl BootstrapParams {
    /// `{scheme}://www.{domain}`
    pub fn site_url(&self) -> String {
        format!("{}://www.{}", self.site_scheme, self.site_domain)
    }

    /// プレースホルダーと置換後の値の対応
    pub fn substitutions(&self) -> [(&'static str, &str); 4] {
        [
            (PLACEHOLDERS[0], self.db_name.as_str()),
            (PLACEHOLDERS[1], self.db_user.as_str()),
            (PLACEHOLDERS[2], self.db_password.expose()),
            (PLACEHOLDERS[3], self.db_endpoint.as_str()),
        ]
    }

    /// アンカー行の直後に並ぶサイト識別子の定義
    pub fn identity_directives(&self) -> Vec<String> {
        if !self.site_identity {
            return Vec::new();
        }
        let url = php_quote(&self.site_url());
        vec![
            format!("define( 'WP_SITEURL', {} );", url),
            format!("define( 'WP_HOME', {} );", url),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Enable,
    Restart,
}

impl ServiceAction {
    fn as_str(&self) -> &'static str {
        match self {
            ServiceAction::Start => "start",
            ServiceAction::Enable => "enable",
            ServiceAction::Restart => "restart",
        }
    }
}

/// 設定ファイルへの編集
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigEdit {
    /// 文字列をすべて置換
    Replace { from: String, to: String },
    /// アンカー行の直後に1行挿入
    InsertAfter { anchor: String, line: String },
}

impl ConfigEdit {
    fn to_shell(&self, path: &str) -> String {
        let script = match self {
            ConfigEdit::Replace { from, to } => format!(
                "s/{}/{}/g",
                token::map_literals(from, sed_pattern_escape),
                token::map_literals(to, sed_replacement_escape)
            ),
            ConfigEdit::InsertAfter { anchor, line } => format!(
                "/{}/a {}",
                sed_pattern_escape(anchor),
                token::map_literals(line, |s| s.replace('\\', "\\\\"))
            ),
        };
        format!(
            "sudo sed -i \"{}\" {}",
            token::map_literals(&script, shell_double_quote_escape),
            path
        )
    }

    fn apply(&self, content: &str) -> Result<String> {
        match self {
            ConfigEdit::Replace { from, to } => Ok(content.replace(from.as_str(), to)),
            ConfigEdit::InsertAfter { anchor, line } => {
                let mut found = false;
                let mut out = String::with_capacity(content.len() + line.len() + 1);
                for l in content.split_inclusive('\n') {
                    out.push_str(l);
                    if l.contains(anchor.as_str()) {
                        found = true;
                        if !l.ends_with('\n') {
                            out.push('\n');
                        }
                        out.push_str(line);
                        out.push('\n');
                    }
                }
                if !found {
                    return Err(StackError::AnchorNotFound(anchor.clone()));
                }
                Ok(out)
            }
        }
    }
}

/// ブートストラップの1手順
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Command(String),
    InstallPackages(Vec<String>),
    Service { name: String, action: ServiceAction },
    EditConfig { path: String, edits: Vec<ConfigEdit> },
    WriteFile { path: String, content: String },
}

impl Step {
    pub fn command(cmd: impl Into<String>) -> Self {
        Step::Command(cmd.into())
    }

    /// シェルの行に変換
    pub fn to_shell(&self) -> Vec<String> {
        match self {
            Step::Command(cmd) => vec![cmd.clone()],
            Step::InstallPackages(packages) => vec![format!("yum install -y {}", packages.join(" "))],
            Step::Service { name, action } => vec![format!("systemctl {} {}", action.as_str(), name)],
            Step::EditConfig { path, edits } => edits.iter().map(|e| e.to_shell(path)).collect(),
            Step::WriteFile { path, content } => {
                let mut lines = vec![format!("sudo tee {} > /dev/null <<'WEBSTACK_EOF'", path)];
                lines.extend(content.lines().map(str::to_string));
                lines.push("WEBSTACK_EOF".to_string());
                lines
            }
        }
    }
}

/// 順序付きのブートストラップ手順
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapScript {
    steps: Vec<Step>,
}

impl BootstrapScript {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn lines(&self) -> Vec<String> {
        self.steps.iter().flat_map(Step::to_shell).collect()
    }

    /// シェルスクリプトとして出力
    pub fn render(&self) -> String {
        let mut out = String::from("#!/bin/bash\n");
        for line in self.lines() {
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    /// サンプル設定にこのスクリプトの編集を適用した結果
    ///
    /// アンカー行が見つからなければ [`StackError::AnchorNotFound`] を返します。
    /// シェル上の `sed` は黙って何もしないため、生成前にここで検出できます。
    pub fn preview_config(&self, sample: &str) -> Result<String> {
        let mut content = sample.to_string();
        for step in &self.steps {
            match step {
                Step::EditConfig { path, edits } if path == CONFIG_PATH => {
                    for edit in edits {
                        content = edit.apply(&content)?;
                    }
                }
                Step::WriteFile { path, content: written } if path == CONFIG_PATH => {
                    content = written.clone();
                }
                _ => {}
            }
        }
        Ok(content)
    }
}

/// ブートストラップ手順を組み立てる
pub fn build_bootstrap_script(
    params: &BootstrapParams,
    renderer: &dyn ConfigRenderer,
) -> Result<BootstrapScript> {
    let mut steps = vec![
        Step::command("yum update -y"),
        Step::InstallPackages(PACKAGES.iter().map(|p| p.to_string()).collect()),
        Step::Service {
            name: WEB_SERVICE.to_string(),
            action: ServiceAction::Start,
        },
        Step::Service {
            name: WEB_SERVICE.to_string(),
            action: ServiceAction::Enable,
        },
        Step::command(format!("cd {}", WEB_ROOT)),
        Step::command(format!("wget {}", DISTRIBUTION_URL)),
        Step::command("tar -xzf latest.tar.gz"),
        Step::command(format!("cp -r wordpress/* {}/", WEB_ROOT)),
        Step::command("rm -rf wordpress"),
        Step::command("rm -rf latest.tar.gz"),
        Step::command(format!("chown -R apache:apache {}/", WEB_ROOT)),
        Step::Service {
            name: WEB_SERVICE.to_string(),
            action: ServiceAction::Restart,
        },
    ];

    steps.extend(renderer.config_steps(params)?);

    steps.extend([
        Step::command("sudo usermod -a -G apache ec2-user"),
        Step::command("sudo chown -R ec2-user:apache /var/www"),
        Step::command("sudo chmod 2775 /var/www"),
        Step::command("sudo find /var/www -type d -exec chmod 2775 {} \\;"),
        Step::command("sudo find /var/www -type f -exec chmod 0664 {} \\;"),
    ]);

    debug!(
        renderer = renderer.name(),
        steps = steps.len(),
        "Built bootstrap script"
    );
    Ok(BootstrapScript { steps })
}

/// 既定の書き換え方式（sed）でスクリプトを出力
pub fn render_bootstrap_script(params: &BootstrapParams) -> Result<String> {
    Ok(build_bootstrap_script(params, &SedSubstitution)?.render())
}

/// PHPのシングルクォート文字列
pub(crate) fn php_quote(value: &str) -> String {
    format!(
        "'{}'",
        token::map_literals(value, |s| s.replace('\\', "\\\\").replace('\'', "\\'"))
    )
}

fn sed_pattern_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '/' | '.' | '*' | '[' | ']' | '^' | '$') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn sed_replacement_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '/' | '&') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn shell_double_quote_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// 配布物の wp-config-sample.php（関係する部分のみ）
    pub const WP_CONFIG_SAMPLE: &str = r#"<?php
/** The name of the database for WordPress */
define( 'DB_NAME', 'database_name_here' );

/** Database username */
define( 'DB_USER', 'username_here' );

/** Database password */
define( 'DB_PASSWORD', 'password_here' );

/** Database hostname */
define( 'DB_HOST', 'localhost' );

/** Database charset to use in creating database tables. */
define( 'DB_CHARSET', 'utf8' );

/** The database collate type. Don't change this if in doubt. */
define( 'DB_COLLATE', '' );

$table_prefix = 'wp_';

define( 'WP_DEBUG', false );

if ( ! defined( 'ABSPATH' ) ) {
	define( 'ABSPATH', __DIR__ . '/' );
}

require_once ABSPATH . 'wp-settings.php';
"#;
}
