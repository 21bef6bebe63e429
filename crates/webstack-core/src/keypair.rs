//! キーペアプロビジョナー

use crate::context::{DeploymentContext, normalize_name};
use crate::error::Result;
use crate::stack::{ResourceRef, Stack, kind};
use crate::token::AttrRef;
use serde_json::json;
use tracing::info;

/// 宣言済みのキーペア
///
/// 秘密鍵はプロバイダー側のシークレットストアにのみ保存され、
/// 宣言にもステートにも現れません。
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    resource: ResourceRef,
    name: String,
}

impl KeyMaterial {
    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    /// 物理名（ホストに関連付ける鍵の名前）
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_name(&self) -> AttrRef {
        self.resource.attr("key_name")
    }
}

/// キーペアを宣言
///
/// 同じ物理名の鍵が既に存在する場合はプロバイダーが作成時に衝突エラーを返します。
pub fn provision_key_pair(
    stack: &mut Stack,
    ctx: &DeploymentContext,
    name: Option<&str>,
) -> Result<KeyMaterial> {
    let name = match name {
        Some(name) => normalize_name(name),
        None => ctx.resource_name("key-pair"),
    };

    let resource = stack.declare(
        kind::KEY_PAIR,
        ctx.resource_name("key-pair"),
        json!({
            "key_name": name,
            "key_type": "rsa",
            "format": "pem",
            "private_key_storage": "provider-secret-store",
        }),
    )?;

    info!(key = %name, "Declared key pair");
    Ok(KeyMaterial { resource, name })
}
