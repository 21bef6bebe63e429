//! variant / network ノードのパース

use super::value::{prop, required_bool, required_string, required_u32};
use crate::error::{Result, StackError};
use crate::model::DeploymentVariant;
use crate::network::NetworkSpec;
use kdl::KdlNode;

/// variant ノードをパース
///
/// 省略された項目は既定値（CDN + エッジTLS + スクリプト + sed）のまま。
pub fn parse_variant(node: &KdlNode) -> Result<DeploymentVariant> {
    let mut variant = DeploymentVariant::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "edge" => variant.edge = required_string(child)?.parse()?,
                "tls" => variant.tls = required_string(child)?.parse()?,
                "bootstrap" => variant.bootstrap = required_string(child)?.parse()?,
                "renderer" => variant.renderer = required_string(child)?.parse()?,
                "site-identity" | "site_identity" => variant.site_identity = required_bool(child)?,
                other => {
                    return Err(StackError::InvalidConfig(format!(
                        "variant に未知の項目があります: {}",
                        other
                    )));
                }
            }
        }
    }

    Ok(variant)
}

/// network ノードをパース
pub fn parse_network(node: &KdlNode) -> Result<NetworkSpec> {
    let mut spec = NetworkSpec::default();

    // `network cidr="10.1.0.0/16"` の省略形も許可
    if let Some(cidr) = prop(node, "cidr").and_then(|v| v.as_string()) {
        spec.cidr = cidr.to_string();
    }

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "cidr" => spec.cidr = required_string(child)?,
                "max-azs" | "max_azs" => spec.max_azs = required_u32(child)?,
                "subnet-mask" | "subnet_mask" => {
                    let mask = required_u32(child)?;
                    spec.subnet_mask = u8::try_from(mask).map_err(|_| {
                        StackError::InvalidCidr(format!("サブネットマスク /{} は範囲外です", mask))
                    })?;
                }
                _ => {}
            }
        }
    }

    Ok(spec)
}
