//! 1Password参照の解決
//!
//! `op://Vault/Item/Field` 形式の参照を `op read` で読み出します。
//! サーバー環境では `OP_SERVICE_ACCOUNT_TOKEN`、ローカルではサインイン済みの
//! CLIセッションが使われます。解決した値はログにもエラーにも出力しません。

use crate::error::{Result, StackError};
use crate::secret::Secret;
use std::collections::HashMap;
use std::process::Command;
use tracing::{debug, info};

const OP_PREFIX: &str = "op://";

/// `op` コマンドが使えるか
pub fn is_available() -> bool {
    Command::new("op")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

pub fn is_op_reference(value: &str) -> bool {
    value.starts_with(OP_PREFIX)
}

/// 参照を1件解決
pub fn resolve_reference(reference: &str) -> Result<Secret> {
    if !is_op_reference(reference) {
        return Err(StackError::OnePasswordError(format!(
            "無効な1Password参照: {} (op://で始まる必要があります)",
            reference
        )));
    }

    debug!(reference = %reference, "Reading 1Password reference");

    let mut cmd = Command::new("op");
    cmd.arg("read").arg(reference);
    if let Ok(account) = std::env::var("OP_ACCOUNT") {
        cmd.arg("--account").arg(account);
    }

    let output = cmd
        .output()
        .map_err(|e| StackError::OnePasswordError(format!("1Password CLI実行エラー: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let hint = if stderr.contains("not signed in") || stderr.contains("session expired") {
            "\nヒント: `op signin` でサインインするか、OP_SERVICE_ACCOUNT_TOKEN を設定してください"
        } else if stderr.contains("not found") {
            "\nヒント: Vault名、Item名、Field名が正しいか確認してください"
        } else {
            ""
        };
        return Err(StackError::OnePasswordError(format!(
            "{} の解決に失敗: {}{}",
            reference,
            stderr.trim(),
            hint
        )));
    }

    Ok(Secret::new(
        String::from_utf8_lossy(&output.stdout).trim().to_string(),
    ))
}

/// テンプレート変数に含まれる `op://` 参照を解決
///
/// 解決した件数を返します。
pub fn resolve_variables(variables: &mut HashMap<String, String>) -> Result<usize> {
    let pending: Vec<(String, String)> = variables
        .iter()
        .filter(|(_, value)| is_op_reference(value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    if pending.is_empty() {
        return Ok(0);
    }
    if !is_available() {
        return Err(StackError::OnePasswordError(
            "1Password CLI (op) がインストールされていないか、PATHに存在しません".to_string(),
        ));
    }

    let mut failures = Vec::new();
    for (key, reference) in &pending {
        match resolve_reference(reference) {
            Ok(secret) => {
                variables.insert(key.clone(), secret.expose().to_string());
            }
            Err(e) => failures.push(format!("{}: {}", key, e)),
        }
    }

    if !failures.is_empty() {
        return Err(StackError::OnePasswordError(failures.join("\n")));
    }

    info!(count = pending.len(), "Resolved 1Password references");
    Ok(pending.len())
}
