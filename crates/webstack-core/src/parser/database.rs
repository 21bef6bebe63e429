//! database ノードのパース

use super::value::{first_arg, prop, prop_u32, required_bool, required_string, required_u32};
use crate::database::DatabaseSpec;
use crate::error::{Result, StackError};
use crate::model::CredentialsConfig;
use crate::secret::SecretSource;
use kdl::KdlNode;

/// database ノードをパース
///
/// 資格情報は別に返します。パスワードはこの時点では解決しません。
pub fn parse_database(node: &KdlNode) -> Result<(DatabaseSpec, CredentialsConfig)> {
    let mut spec = DatabaseSpec::default();
    let mut credentials = CredentialsConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "engine" => {
                    spec.engine = required_string(child)?;
                    if let Some(version) = prop(child, "version").and_then(|v| v.as_string()) {
                        spec.engine_version = version.to_string();
                    }
                }
                "version" | "engine-version" => spec.engine_version = required_string(child)?,
                "name" => spec.name = required_string(child)?,
                "username" => credentials.username = required_string(child)?,
                "password" => credentials.password = parse_password(child)?,
                "instance-class" | "instance_class" => spec.instance_class = required_string(child)?,
                "allocated-storage" | "allocated_storage" => {
                    spec.allocated_storage = required_u32(child)?;
                    if let Some(max) = prop_u32(child, "max")? {
                        spec.max_allocated_storage = max;
                    }
                }
                "max-allocated-storage" | "max_allocated_storage" => {
                    spec.max_allocated_storage = required_u32(child)?
                }
                "publicly-accessible" | "publicly_accessible" => {
                    spec.publicly_accessible = required_bool(child)?
                }
                "port" => {
                    let port = required_u32(child)?;
                    spec.port = u16::try_from(port).map_err(|_| {
                        StackError::InvalidConfig(format!("ポート番号 {} は範囲外です", port))
                    })?;
                }
                _ => {}
            }
        }
    }

    Ok((spec, credentials))
}

/// `password env="VAR"` / `password "op://..."` / `password "literal"`
fn parse_password(node: &KdlNode) -> Result<SecretSource> {
    if let Some(var) = prop(node, "env").and_then(|v| v.as_string()) {
        return Ok(SecretSource::Env(var.to_string()));
    }
    first_arg(node)
        .and_then(|v| v.as_string())
        .map(SecretSource::from_value)
        .ok_or_else(|| {
            StackError::InvalidConfig(
                "password には env=\"VAR\"、op:// 参照、または文字列を指定してください".to_string(),
            )
        })
}
