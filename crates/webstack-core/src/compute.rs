//! コンピュートプロビジョナー
//!
//! 起動テンプレート、ホストプール、ターゲットグループ、ロードバランサー、
//! リスナー、そしてホストからデータベースへの接続許可を宣言します。

use crate::bootstrap::{BootstrapScript, DeclarativeInit};
use crate::context::DeploymentContext;
use crate::database::DatabaseInstance;
use crate::edge::Certificate;
use crate::error::{Result, StackError};
use crate::keypair::KeyMaterial;
use crate::model::{BootstrapMode, TlsMode};
use crate::network::{FirewallRuleSet, HostRole, Network};
use crate::stack::{ResourceRef, Stack, kind};
use crate::token::AttrRef;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HealthCheck {
    pub path: String,
    pub interval_secs: u32,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            interval_secs: 60,
        }
    }
}

/// 起動完了シグナルの待機ポリシー
///
/// `count = 0` は待機しない（ヘルスゲートなし）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BootSignalPolicy {
    pub count: u32,
    pub timeout_secs: u32,
}

impl Default for BootSignalPolicy {
    fn default() -> Self {
        Self {
            count: 0,
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ComputeSpec {
    pub instance_type: String,
    pub machine_image: String,
    pub desired_capacity: u32,
    pub health_check: HealthCheck,
    pub boot_signals: BootSignalPolicy,
}

impl Default for ComputeSpec {
    fn default() -> Self {
        Self {
            instance_type: "t2.micro".to_string(),
            machine_image: "amazon-linux-2023".to_string(),
            desired_capacity: 1,
            health_check: HealthCheck::default(),
            boot_signals: BootSignalPolicy::default(),
        }
    }
}

/// ロードバランサーのハンドル
///
/// [`launch_pool`] だけが生成できます。エッジルーティングはこの値を要求するため、
/// ロードバランサーより先にルーティングを宣言することはできません。
#[derive(Debug, Clone)]
pub struct LoadBalancer {
    resource: ResourceRef,
}

impl LoadBalancer {
    pub(crate) fn from_resource(resource: ResourceRef) -> Self {
        Self { resource }
    }

    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    pub fn dns_name(&self) -> AttrRef {
        self.resource.attr("dns_name")
    }

    pub fn hosted_zone_id(&self) -> AttrRef {
        self.resource.attr("hosted_zone_id")
    }
}

#[derive(Debug, Clone)]
pub struct HostPool {
    pub resource: ResourceRef,
    pub desired_capacity: u32,
}

/// `launch_pool` の入力
pub struct LaunchRequest<'a> {
    pub script: &'a BootstrapScript,
    pub bootstrap: BootstrapMode,
    pub network: &'a Network,
    pub role: &'a HostRole,
    /// ホストとロードバランサーの両方に付けるファイアウォール
    ///
    /// 80/443/22 の公開ルールをロードバランサーでもそのまま使うため、専用のグループは作りません。
    pub firewall: &'a FirewallRuleSet,
    pub key: &'a KeyMaterial,
    pub database: &'a DatabaseInstance,
    pub certificate: Option<&'a Certificate>,
    pub tls: TlsMode,
    pub spec: &'a ComputeSpec,
}

/// 宣言済みのコンピュート層
#[derive(Debug)]
pub struct ComputeTier {
    pub launch_template: ResourceRef,
    pub pool: HostPool,
    pub target_group: ResourceRef,
    pub load_balancer: LoadBalancer,
    pub listeners: Vec<ResourceRef>,
    pub database_access: ResourceRef,
}

/// ホストプールとロードバランサーを宣言
pub fn launch_pool(
    stack: &mut Stack,
    ctx: &DeploymentContext,
    request: LaunchRequest<'_>,
) -> Result<ComputeTier> {
    let spec = request.spec;
    if spec.desired_capacity == 0 {
        return Err(StackError::InvalidConfig(
            "desired-capacity は 1 以上である必要があります".to_string(),
        ));
    }
    let https_certificate = match request.tls {
        TlsMode::LoadBalancer => Some(request.certificate.ok_or_else(|| {
            StackError::InvalidVariant(
                "tls=load-balancer には証明書が必要です".to_string(),
            )
        })?),
        _ => None,
    };

    let public_subnets: Vec<String> = request
        .network
        .public_subnets()
        .iter()
        .map(|s| s.subnet_id().token())
        .collect();
    let hosts_group = request.firewall.group_id().token();

    let mut template = json!({
        "name": ctx.resource_name("launch-template"),
        "instance_type": spec.instance_type,
        "machine_image": spec.machine_image,
        "iam_instance_profile": request.role.instance_profile_arn().token(),
        "security_group_ids": [hosts_group],
        "key_name": request.key.key_name().token(),
    });
    match request.bootstrap {
        BootstrapMode::Script => {
            template["user_data"] = json!(request.script.render());
        }
        BootstrapMode::DeclarativeInit => {
            template["init"] = DeclarativeInit::from_script(request.script).to_value();
        }
    }
    let launch_template = stack.declare(
        kind::LAUNCH_TEMPLATE,
        ctx.resource_name("launch-template"),
        template,
    )?;

    let target_group = stack.declare(
        kind::TARGET_GROUP,
        ctx.resource_name("targets"),
        json!({
            "vpc_id": request.network.vpc_id().token(),
            "port": 80,
            "protocol": "HTTP",
            "target_type": "instance",
            "health_check": {
                "path": spec.health_check.path,
                "interval_seconds": spec.health_check.interval_secs,
            },
        }),
    )?;

    let mut pool_config = json!({
        "launch_template_id": launch_template.attr("launch_template_id").token(),
        "subnet_ids": public_subnets,
        "min_size": spec.desired_capacity,
        "max_size": spec.desired_capacity,
        "desired_capacity": spec.desired_capacity,
        "target_group_arns": [target_group.attr("target_group_arn").token()],
    });
    if spec.boot_signals.count > 0 {
        pool_config["creation_policy"] = json!({
            "signals": spec.boot_signals.count,
            "timeout_secs": spec.boot_signals.timeout_secs,
        });
    }
    let pool = stack.declare(
        kind::AUTO_SCALING_GROUP,
        ctx.resource_name("hosts"),
        pool_config,
    )?;

    let lb = stack.declare(
        kind::LOAD_BALANCER,
        ctx.resource_name("lb"),
        json!({
            "name": ctx.resource_name("lb"),
            "scheme": "internet-facing",
            "subnet_ids": public_subnets,
            "security_group_ids": [hosts_group],
        }),
    )?;

    let mut listeners = vec![stack.declare(
        kind::LISTENER,
        ctx.scoped_name("lb", "http"),
        json!({
            "load_balancer_arn": lb.attr("load_balancer_arn").token(),
            "port": 80,
            "protocol": "HTTP",
            "open": true,
            "default_target_group_arn": target_group.attr("target_group_arn").token(),
        }),
    )?];

    if let Some(certificate) = https_certificate {
        listeners.push(stack.declare(
            kind::LISTENER,
            ctx.scoped_name("lb", "https"),
            json!({
                "load_balancer_arn": lb.attr("load_balancer_arn").token(),
                "port": 443,
                "protocol": "HTTPS",
                "open": true,
                "certificate_arn": certificate.arn().token(),
                "default_target_group_arn": target_group.attr("target_group_arn").token(),
            }),
        )?);
    }

    // ホストからデータベースの既定ポートへの接続のみ許可
    let database_access = stack.declare(
        kind::SECURITY_GROUP_INGRESS,
        ctx.scoped_name("database", "from-hosts"),
        json!({
            "group_id": request.database.firewall_group_id().token(),
            "source_group_id": hosts_group,
            "protocol": "tcp",
            "port": request.database.port(),
            "description": "Allow database access from hosts",
        }),
    )?;

    info!(
        pool = %pool.key(),
        capacity = spec.desired_capacity,
        listeners = listeners.len(),
        "Declared compute tier"
    );

    Ok(ComputeTier {
        launch_template,
        pool: HostPool {
            resource: pool,
            desired_capacity: spec.desired_capacity,
        },
        target_group,
        load_balancer: LoadBalancer::from_resource(lb),
        listeners,
        database_access,
    })
}
