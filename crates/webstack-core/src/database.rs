//! データベースプロビジョナー
//!
//! マネージドRDBをプライベートサブネットにのみ配置します。
//! 公開設定やストレージ上限の不整合はプロバイダー呼び出し前に拒否します。

use crate::context::DeploymentContext;
use crate::error::{Result, StackError};
use crate::network::Network;
use crate::secret::Secret;
use crate::stack::{ResourceRef, Stack, kind};
use crate::token::AttrRef;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

/// マルチAZのサブネットグループに必要なゾーン数
const MIN_DB_ZONES: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DatabaseSpec {
    pub engine: String,
    pub engine_version: String,
    pub name: String,
    pub instance_class: String,
    /// 初期ストレージ (GB)
    pub allocated_storage: u32,
    /// 自動拡張の上限 (GB)
    pub max_allocated_storage: u32,
    pub port: u16,
    pub publicly_accessible: bool,
}

impl Default for DatabaseSpec {
    fn default() -> Self {
        Self {
            engine: "mysql".to_string(),
            engine_version: "5.7".to_string(),
            name: "wordpress".to_string(),
            instance_class: "db.t3.micro".to_string(),
            allocated_storage: 20,
            max_allocated_storage: 100,
            port: 3306,
            publicly_accessible: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseCredentials {
    pub username: String,
    pub password: Secret,
}

impl DatabaseCredentials {
    pub fn new(username: impl Into<String>, password: Secret) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

/// 宣言済みのデータベース
#[derive(Debug, Clone)]
pub struct DatabaseInstance {
    resource: ResourceRef,
    subnet_group: ResourceRef,
    firewall: ResourceRef,
    name: String,
    port: u16,
}

impl DatabaseInstance {
    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    pub fn subnet_group(&self) -> &ResourceRef {
        &self.subnet_group
    }

    /// データベース専用のファイアウォール（自前の受信ルールは持たない）
    pub fn firewall(&self) -> &ResourceRef {
        &self.firewall
    }

    pub fn firewall_group_id(&self) -> AttrRef {
        self.firewall.attr("security_group_id")
    }

    /// 作成完了後にのみ解決されるエンドポイント
    pub fn endpoint_address(&self) -> AttrRef {
        self.resource.attr("endpoint_address")
    }

    pub fn database_name(&self) -> &str {
        &self.name
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

fn check_spec(ctx: &DeploymentContext, network: &Network, spec: &DatabaseSpec) -> Result<()> {
    if spec.publicly_accessible {
        return Err(StackError::PubliclyAccessibleDatabase(
            ctx.resource_name("database"),
        ));
    }
    if spec.max_allocated_storage < spec.allocated_storage {
        return Err(StackError::InvalidStorage {
            allocated: spec.allocated_storage,
            max: spec.max_allocated_storage,
        });
    }
    let zones = network.az_count() as u32;
    if zones < MIN_DB_ZONES {
        return Err(StackError::InsufficientZones {
            resource: ctx.resource_name("database"),
            required: MIN_DB_ZONES,
            actual: zones,
        });
    }
    Ok(())
}

/// データベースを宣言
pub fn provision_database(
    stack: &mut Stack,
    ctx: &DeploymentContext,
    network: &Network,
    spec: &DatabaseSpec,
    credentials: &DatabaseCredentials,
) -> Result<DatabaseInstance> {
    check_spec(ctx, network, spec)?;
    if credentials.password.is_empty() {
        return Err(StackError::MissingSecret("database.password".to_string()));
    }

    let subnet_ids: Vec<String> = network
        .private_subnets()
        .iter()
        .map(|s| s.subnet_id().token())
        .collect();

    let subnet_group = stack.declare(
        kind::DB_SUBNET_GROUP,
        ctx.scoped_name("database", "subnets"),
        json!({
            "name": ctx.scoped_name("database", "subnets"),
            "description": format!("Private subnets for {}", ctx.resource_name("database")),
            "subnet_ids": subnet_ids,
        }),
    )?;

    let firewall = stack.declare(
        kind::SECURITY_GROUP,
        ctx.scoped_name("database", "sg"),
        json!({
            "name": ctx.scoped_name("database", "sg"),
            "vpc_id": network.vpc_id().token(),
            "purpose": "database",
            "allow_all_outbound": true,
            "ingress": [],
        }),
    )?;

    let resource = stack.declare(
        kind::DATABASE,
        ctx.resource_name("database"),
        json!({
            "identifier": ctx.resource_name("database"),
            "engine": spec.engine,
            "engine_version": spec.engine_version,
            "database_name": spec.name,
            "instance_class": spec.instance_class,
            "allocated_storage": spec.allocated_storage,
            "max_allocated_storage": spec.max_allocated_storage,
            "port": spec.port,
            "publicly_accessible": false,
            "subnet_group": subnet_group.attr("name").token(),
            "security_group_ids": [firewall.attr("security_group_id").token()],
            "master_username": credentials.username,
            "master_password": credentials.password.expose(),
        }),
    )?;

    info!(
        database = %resource.key(),
        engine = %format!("{} {}", spec.engine, spec.engine_version),
        storage = %format!("{}-{}GB", spec.allocated_storage, spec.max_allocated_storage),
        "Declared database"
    );

    Ok(DatabaseInstance {
        resource,
        subnet_group,
        firewall,
        name: spec.name.clone(),
        port: spec.port,
    })
}
