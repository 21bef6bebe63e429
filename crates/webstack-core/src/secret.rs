//! 秘密情報
//!
//! データベースのパスワードなど、宣言には埋め込むがログや合成出力には
//! 出してはならない値を扱います。

use crate::error::{Result, StackError};
use crate::onepassword;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// 秘密情報の代わりに表示する伏せ字
pub const REDACTED: &str = "********";

/// 伏せ字で表示される文字列
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// 平文を取り出す
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({})", REDACTED)
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

/// 秘密情報の取得元
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecretSource {
    /// 環境変数
    Env(String),
    /// 1Password参照（`op://...`）
    OnePassword(String),
    /// 設定ファイルに直接書かれた値
    Literal(String),
}

impl SecretSource {
    /// 設定値から取得元を判定
    pub fn from_value(value: &str) -> Self {
        if onepassword::is_op_reference(value) {
            SecretSource::OnePassword(value.to_string())
        } else {
            SecretSource::Literal(value.to_string())
        }
    }

    pub fn resolve(&self, name: &str) -> Result<Secret> {
        match self {
            SecretSource::Env(var) => std::env::var(var)
                .ok()
                .filter(|v| !v.is_empty())
                .map(Secret::new)
                .ok_or_else(|| StackError::MissingSecret(format!("{} (環境変数 {})", name, var))),
            SecretSource::OnePassword(reference) => onepassword::resolve_reference(reference),
            SecretSource::Literal(value) => {
                warn!(
                    secret = %name,
                    "Secret is written in plain text in the config file; use env= or op:// outside of demos"
                );
                if value.is_empty() {
                    return Err(StackError::MissingSecret(name.to_string()));
                }
                Ok(Secret::new(value.clone()))
            }
        }
    }
}
