use super::{BootstrapScript, ServiceAction, Step};
use serde::Serialize;
use std::collections::BTreeMap;

/// 宣言的な初期化定義
///
/// シェルスクリプトの代わりに、パッケージ・ファイル・サービス・コマンドを
/// 分けて宣言します。コマンドはキーの辞書順に実行されるため、
/// 連番をキーにして元の順序を保ちます。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeclarativeInit {
    pub packages: BTreeMap<String, Vec<String>>,
    pub files: BTreeMap<String, InitFile>,
    pub services: BTreeMap<String, InitService>,
    pub commands: BTreeMap<String, InitCommand>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitFile {
    pub content: String,
    pub mode: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InitService {
    pub enabled: bool,
    pub ensure_running: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitCommand {
    pub command: String,
}

impl DeclarativeInit {
    pub fn from_script(script: &BootstrapScript) -> Self {
        let mut init = DeclarativeInit::default();
        let mut seq = 0usize;
        let mut push_command = |init: &mut DeclarativeInit, command: String| {
            seq += 1;
            init.commands
                .insert(format!("{:03}", seq), InitCommand { command });
        };

        for step in script.steps() {
            match step {
                Step::InstallPackages(packages) => {
                    init.packages
                        .entry("yum".to_string())
                        .or_default()
                        .extend(packages.iter().cloned());
                }
                Step::Service { name, action } => {
                    let service = init.services.entry(name.clone()).or_default();
                    match action {
                        ServiceAction::Start => service.ensure_running = true,
                        ServiceAction::Enable => service.enabled = true,
                        // 設定変更後の再起動は順序が重要なのでコマンドとして残す
                        ServiceAction::Restart => {
                            push_command(&mut init, format!("systemctl restart {}", name))
                        }
                    }
                }
                Step::WriteFile { path, content } => {
                    init.files.insert(
                        path.clone(),
                        InitFile {
                            content: content.clone(),
                            mode: "000644".to_string(),
                        },
                    );
                }
                Step::Command(_) | Step::EditConfig { .. } => {
                    for line in step.to_shell() {
                        push_command(&mut init, line);
                    }
                }
            }
        }
        init
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
