//! KDLパーサー
//!
//! webstackのKDL設定ファイルをパースして `DeploymentConfig` を生成します。
//! 各ノードのパース処理はモジュールに分離されています。

mod compute;
mod database;
mod value;
mod variant;

pub use compute::parse_compute;
pub use database::parse_database;
pub use variant::{parse_network, parse_variant};

use crate::error::{Result, StackError};
use crate::model::DeploymentConfig;
use kdl::KdlDocument;
use std::fs;
use std::path::Path;
use value::required_string;

/// environment ノードがない場合の環境名
pub const DEFAULT_ENVIRONMENT: &str = "dev";

/// KDLファイルをパースしてDeploymentConfigを生成
pub fn parse_kdl_file<P: AsRef<Path>>(path: P) -> Result<DeploymentConfig> {
    let content = fs::read_to_string(path.as_ref())?;
    let name = path
        .as_ref()
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();
    parse_kdl_string(&content, name)
}

/// KDL文字列をパース
///
/// `project` がなければ `default_name` をプロジェクト名にします。
/// `domain` は必須です。
pub fn parse_kdl_string(content: &str, default_name: String) -> Result<DeploymentConfig> {
    let doc: KdlDocument = content.parse()?;

    let mut project = default_name;
    let mut environment = DEFAULT_ENVIRONMENT.to_string();
    let mut domain: Option<String> = None;
    let mut variant = None;
    let mut network = None;
    let mut key_pair = None;
    let mut database = None;
    let mut compute = None;

    for node in doc.nodes() {
        match node.name().value() {
            "project" => project = required_string(node)?,
            "environment" | "env" => environment = required_string(node)?,
            "domain" => domain = Some(required_string(node)?),
            "variant" => variant = Some(parse_variant(node)?),
            "network" => network = Some(parse_network(node)?),
            "key-pair" | "key_pair" => key_pair = Some(required_string(node)?),
            "database" => database = Some(parse_database(node)?),
            "compute" => compute = Some(parse_compute(node)?),
            _ => {
                // 不明なノードはスキップ
            }
        }
    }

    let domain = domain
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| StackError::InvalidConfig("domain が指定されていません".to_string()))?;

    let mut config = DeploymentConfig::new(project, environment, domain);
    if let Some(variant) = variant {
        config.variant = variant;
    }
    if let Some(network) = network {
        config.network = network;
    }
    config.key_pair = key_pair;
    if let Some((spec, credentials)) = database {
        config.database = spec;
        config.credentials = credentials;
    }
    if let Some(compute) = compute {
        config.compute = compute;
    }

    Ok(config)
}

#[cfg(test)]
mod tests;
