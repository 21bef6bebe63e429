//! ネットワークプロビジョナー
//!
//! VPC、パブリック/プライベートサブネット、NATゲートウェイ、フローログに加えて、
//! ホストが共有するIAMロールとファイアウォールルールセットを宣言します。

use crate::context::{DeploymentContext, MAX_AVAILABILITY_ZONES};
use crate::error::{Result, StackError};
use crate::stack::{ResourceRef, Stack, kind};
use crate::token::AttrRef;
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::Ipv4Addr;
use tracing::info;

/// ホストに開放する受信ポート（順序はそのまま宣言される）
pub const INGRESS_RULES: [(u16, &str); 3] = [(443, "HTTPS"), (80, "HTTP"), (22, "SSH")];

/// ホストロールに付与する唯一のマネージドポリシー
pub const REMOTE_MANAGEMENT_POLICY: &str = "AmazonSSMManagedInstanceCore";

const HOST_PRINCIPAL: &str = "ec2.amazonaws.com";
const ANY_IPV4: &str = "0.0.0.0/0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct NetworkSpec {
    pub cidr: String,
    pub max_azs: u32,
    pub subnet_mask: u8,
}

impl Default for NetworkSpec {
    fn default() -> Self {
        Self {
            cidr: "10.0.0.0/16".to_string(),
            max_azs: 2,
            subnet_mask: 24,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubnetTier {
    Public,
    Private,
}

impl SubnetTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubnetTier::Public => "public",
            SubnetTier::Private => "private",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Subnet {
    pub resource: ResourceRef,
    pub cidr: Ipv4Network,
    pub availability_zone: String,
    pub tier: SubnetTier,
}

impl Subnet {
    pub fn subnet_id(&self) -> AttrRef {
        self.resource.attr("subnet_id")
    }
}

/// 宣言済みのネットワーク
#[derive(Debug, Clone)]
pub struct Network {
    vpc: ResourceRef,
    cidr: Ipv4Network,
    internet_gateway: ResourceRef,
    nat_gateway: ResourceRef,
    flow_log: ResourceRef,
    public: Vec<Subnet>,
    private: Vec<Subnet>,
}

impl Network {
    pub fn vpc(&self) -> &ResourceRef {
        &self.vpc
    }

    pub fn vpc_id(&self) -> AttrRef {
        self.vpc.attr("vpc_id")
    }

    pub fn cidr(&self) -> Ipv4Network {
        self.cidr
    }

    pub fn internet_gateway(&self) -> &ResourceRef {
        &self.internet_gateway
    }

    pub fn nat_gateway(&self) -> &ResourceRef {
        &self.nat_gateway
    }

    pub fn flow_log(&self) -> &ResourceRef {
        &self.flow_log
    }

    pub fn public_subnets(&self) -> &[Subnet] {
        &self.public
    }

    pub fn private_subnets(&self) -> &[Subnet] {
        &self.private
    }

    /// 利用しているアベイラビリティゾーン数
    pub fn az_count(&self) -> usize {
        self.private.len()
    }
}

/// ホストが引き受けるロール
#[derive(Debug, Clone)]
pub struct HostRole {
    resource: ResourceRef,
}

impl HostRole {
    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    pub fn role_arn(&self) -> AttrRef {
        self.resource.attr("role_arn")
    }

    pub fn instance_profile_arn(&self) -> AttrRef {
        self.resource.attr("instance_profile_arn")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngressRule {
    pub port: u16,
    pub protocol: String,
    pub source: String,
    pub description: String,
}

/// ホスト用ファイアウォールルールセット
#[derive(Debug, Clone)]
pub struct FirewallRuleSet {
    resource: ResourceRef,
    rules: Vec<IngressRule>,
}

impl FirewallRuleSet {
    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    pub fn group_id(&self) -> AttrRef {
        self.resource.attr("security_group_id")
    }

    pub fn rules(&self) -> &[IngressRule] {
        &self.rules
    }

    pub fn ports(&self) -> Vec<u16> {
        self.rules.iter().map(|r| r.port).collect()
    }
}

#[derive(Debug, Clone)]
pub struct NetworkBundle {
    pub network: Network,
    pub role: HostRole,
    pub firewall: FirewallRuleSet,
}

/// アドレス空間を同じマスク長のサブネットに分割
///
/// 先頭から `count` 個のブロックを返します。
pub fn allocate_subnets(cidr: &str, mask: u8, count: u32) -> Result<Vec<Ipv4Network>> {
    let network: Ipv4Network = cidr
        .parse()
        .map_err(|e| StackError::InvalidCidr(format!("{}: {}", cidr, e)))?;

    if network.ip() != network.network() {
        return Err(StackError::InvalidCidr(format!(
            "{} のホスト部が 0 ではありません（{}/{} を指定してください）",
            cidr,
            network.network(),
            network.prefix()
        )));
    }
    if mask < network.prefix() || mask > 28 {
        return Err(StackError::InvalidCidr(format!(
            "サブネットマスク /{} は {} に対して無効です",
            mask, cidr
        )));
    }

    let available = 1u64 << (mask - network.prefix());
    if u64::from(count) > available {
        return Err(StackError::AddressSpaceExhausted {
            cidr: cidr.to_string(),
            mask,
            needed: count,
            available: available.min(u64::from(u32::MAX)) as u32,
        });
    }

    let base = u32::from(network.network());
    let block = 1u32 << (32 - mask);
    (0..count)
        .map(|i| {
            let addr = Ipv4Addr::from(base + i * block);
            Ipv4Network::new(addr, mask).map_err(|e| StackError::InvalidCidr(e.to_string()))
        })
        .collect()
}

/// ネットワーク一式を宣言
pub fn provision_network(
    stack: &mut Stack,
    ctx: &DeploymentContext,
    spec: &NetworkSpec,
) -> Result<NetworkBundle> {
    if spec.max_azs == 0 {
        return Err(StackError::InsufficientZones {
            resource: ctx.resource_name("network"),
            required: 1,
            actual: 0,
        });
    }

    let zones: Vec<String> = (0..spec.max_azs as usize)
        .map(|i| ctx.availability_zone(i))
        .collect::<Option<_>>()
        .ok_or_else(|| StackError::TooManyZones {
            resource: ctx.resource_name("network"),
            requested: spec.max_azs,
            max: MAX_AVAILABILITY_ZONES,
        })?;

    // ゾーン数は上で26以下に収まっている
    let blocks = allocate_subnets(&spec.cidr, spec.subnet_mask, spec.max_azs * 2)?;
    let cidr: Ipv4Network = spec
        .cidr
        .parse()
        .map_err(|e| StackError::InvalidCidr(format!("{}: {}", spec.cidr, e)))?;

    let vpc = stack.declare(
        kind::VPC,
        ctx.resource_name("network"),
        json!({
            "name": ctx.resource_name("network"),
            "cidr": spec.cidr,
            "enable_dns_hostnames": true,
            "enable_dns_support": true,
        }),
    )?;

    let igw = stack.declare(
        kind::INTERNET_GATEWAY,
        ctx.scoped_name("network", "igw"),
        json!({ "vpc_id": vpc.attr("vpc_id").token() }),
    )?;

    let azs = spec.max_azs as usize;
    let mut public = Vec::with_capacity(azs);
    for (i, block) in blocks[..azs].iter().enumerate() {
        let az = zones[i].clone();
        let resource = stack.declare(
            kind::SUBNET,
            ctx.scoped_name("network", &format!("public-{}", i + 1)),
            json!({
                "vpc_id": vpc.attr("vpc_id").token(),
                "cidr": block.to_string(),
                "availability_zone": az,
                "tier": SubnetTier::Public.as_str(),
                "map_public_ip": true,
                "default_route": {
                    "destination": ANY_IPV4,
                    "gateway_id": igw.attr("gateway_id").token(),
                },
            }),
        )?;
        public.push(Subnet {
            resource,
            cidr: *block,
            availability_zone: az,
            tier: SubnetTier::Public,
        });
    }

    // NATは1つだけ。最初のパブリックサブネットに置く
    let nat = stack.declare_with(
        kind::NAT_GATEWAY,
        ctx.scoped_name("network", "nat-1"),
        json!({
            "subnet_id": public[0].subnet_id().token(),
            "allocation": "elastic-ip",
        }),
        &[&igw],
    )?;

    let mut private = Vec::with_capacity(azs);
    for (i, block) in blocks[azs..].iter().enumerate() {
        let az = zones[i].clone();
        let resource = stack.declare(
            kind::SUBNET,
            ctx.scoped_name("network", &format!("private-{}", i + 1)),
            json!({
                "vpc_id": vpc.attr("vpc_id").token(),
                "cidr": block.to_string(),
                "availability_zone": az,
                "tier": SubnetTier::Private.as_str(),
                "map_public_ip": false,
                "default_route": {
                    "destination": ANY_IPV4,
                    "nat_gateway_id": nat.attr("nat_gateway_id").token(),
                },
            }),
        )?;
        private.push(Subnet {
            resource,
            cidr: *block,
            availability_zone: az,
            tier: SubnetTier::Private,
        });
    }

    let flow_log = stack.declare(
        kind::FLOW_LOG,
        ctx.scoped_name("network", "flow-log"),
        json!({
            "resource_id": vpc.attr("vpc_id").token(),
            "resource_kind": "vpc",
            "traffic_type": "ALL",
            "destination": {
                "type": "cloud-watch-logs",
                "log_group": ctx.scoped_name("network", "flow-log"),
            },
        }),
    )?;

    let role = stack.declare(
        kind::IAM_ROLE,
        ctx.resource_name("host-role"),
        json!({
            "name": ctx.resource_name("host-role"),
            "assumed_by": HOST_PRINCIPAL,
            "managed_policies": [REMOTE_MANAGEMENT_POLICY],
        }),
    )?;

    let rules: Vec<IngressRule> = INGRESS_RULES
        .iter()
        .map(|(port, description)| IngressRule {
            port: *port,
            protocol: "tcp".to_string(),
            source: ANY_IPV4.to_string(),
            description: format!("Allow {}", description),
        })
        .collect();

    let firewall = stack.declare(
        kind::SECURITY_GROUP,
        ctx.resource_name("hosts"),
        json!({
            "name": ctx.resource_name("hosts"),
            "vpc_id": vpc.attr("vpc_id").token(),
            "purpose": "hosts",
            "allow_all_outbound": true,
            "ingress": rules,
        }),
    )?;

    info!(
        vpc = %vpc.key(),
        cidr = %spec.cidr,
        azs = spec.max_azs,
        "Declared network"
    );

    Ok(NetworkBundle {
        network: Network {
            vpc,
            cidr,
            internet_gateway: igw,
            nat_gateway: nat,
            flow_log,
            public,
            private,
        },
        role: HostRole { resource: role },
        firewall: FirewallRuleSet {
            resource: firewall,
            rules,
        },
    })
}
