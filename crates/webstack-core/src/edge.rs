//! エッジ（DNSゾーン・証明書・ルーティング）
//!
//! ゾーンと証明書は早い段階で作成し、ルーティングはロードバランサーの作成後に
//! 結び付けます。[`EdgeIdentity::bind_edge_routing`] は [`LoadBalancer`] を要求するため、
//! ロードバランサーより前にルーティングを宣言することはできません。

use crate::compute::LoadBalancer;
use crate::context::DeploymentContext;
use crate::error::{Result, StackError};
use crate::model::{EdgeStrategy, TlsMode};
use crate::stack::{ResourceRef, Stack, kind};
use crate::token::AttrRef;
use serde_json::json;
use tracing::info;

/// 証明書の検証方式
const VALIDATION_METHOD: &str = "dns";

#[derive(Debug, Clone)]
pub struct DnsZone {
    resource: ResourceRef,
    domain: String,
}

impl DnsZone {
    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn zone_id(&self) -> AttrRef {
        self.resource.attr("zone_id")
    }
}

#[derive(Debug, Clone)]
pub struct Certificate {
    resource: ResourceRef,
}

impl Certificate {
    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    pub fn arn(&self) -> AttrRef {
        self.resource.attr("certificate_arn")
    }
}

/// ホストゾーンを宣言
pub fn create_zone(stack: &mut Stack, ctx: &DeploymentContext) -> Result<DnsZone> {
    let resource = stack.declare(
        kind::HOSTED_ZONE,
        ctx.resource_name("zone"),
        json!({ "zone_name": ctx.domain() }),
    )?;
    Ok(DnsZone {
        resource,
        domain: ctx.domain().to_string(),
    })
}

/// ルートドメインとワイルドカードの証明書を宣言（ゾーンでDNS検証）
pub fn issue_certificate(
    stack: &mut Stack,
    ctx: &DeploymentContext,
    zone: &DnsZone,
) -> Result<Certificate> {
    let resource = stack.declare(
        kind::CERTIFICATE,
        ctx.resource_name("certificate"),
        json!({
            "domain_name": zone.domain(),
            "subject_alternative_names": [ctx.wildcard_domain()],
            "validation": {
                "method": VALIDATION_METHOD,
                "zone_id": zone.zone_id().token(),
            },
        }),
    )?;
    Ok(Certificate { resource })
}

/// エッジの識別情報（ゾーンと証明書）
#[derive(Debug)]
pub struct EdgeIdentity {
    zone: DnsZone,
    certificate: Option<Certificate>,
}

impl EdgeIdentity {
    /// ゾーンと、TLSが必要な場合は証明書を宣言
    pub fn provision(stack: &mut Stack, ctx: &DeploymentContext, tls: TlsMode) -> Result<Self> {
        let zone = create_zone(stack, ctx)?;
        let certificate = if tls.needs_certificate() {
            Some(issue_certificate(stack, ctx, &zone)?)
        } else {
            None
        };

        info!(
            zone = %zone.domain(),
            certificate = certificate.is_some(),
            "Declared edge identity"
        );
        Ok(Self { zone, certificate })
    }

    pub fn zone(&self) -> &DnsZone {
        &self.zone
    }

    pub fn certificate(&self) -> Option<&Certificate> {
        self.certificate.as_ref()
    }

    /// ロードバランサーへのルーティングを結び付ける
    ///
    /// 識別情報は消費されるため、ルーティングは1デプロイにつき1回しか結べません。
    pub fn bind_edge_routing(
        self,
        stack: &mut Stack,
        ctx: &DeploymentContext,
        load_balancer: &LoadBalancer,
        strategy: EdgeStrategy,
    ) -> Result<EdgeRouting> {
        let (target, target_zone, target_kind, distribution) = match strategy {
            EdgeStrategy::Cdn => {
                let certificate = self.certificate.as_ref().ok_or_else(|| {
                    StackError::InvalidVariant("CDN には証明書が必要です".to_string())
                })?;
                let distribution = stack.declare(
                    kind::CDN_DISTRIBUTION,
                    ctx.resource_name("cdn"),
                    json!({
                        "origin": {
                            "domain_name": load_balancer.dns_name().token(),
                            "protocol_policy": "http-only",
                        },
                        "viewer_protocol_policy": "redirect-to-https",
                        "cache_policy": "caching-optimized",
                        "aliases": [ctx.www_domain(), ctx.domain()],
                        "certificate_arn": certificate.arn().token(),
                    }),
                )?;
                (
                    distribution.attr("domain_name"),
                    distribution.attr("hosted_zone_id"),
                    kind::CDN_DISTRIBUTION,
                    Some(distribution),
                )
            }
            EdgeStrategy::DirectAlias => (
                load_balancer.dns_name(),
                load_balancer.hosted_zone_id(),
                kind::LOAD_BALANCER,
                None,
            ),
        };

        let mut records = Vec::with_capacity(2);
        for (label, name) in [("root", ctx.domain().to_string()), ("www", ctx.www_domain())] {
            let resource = stack.declare(
                kind::DNS_RECORD,
                ctx.scoped_name("dns", label),
                json!({
                    "zone_id": self.zone.zone_id().token(),
                    "name": name,
                    "record_type": "A",
                    "alias": {
                        "target": target.token(),
                        "target_zone_id": target_zone.token(),
                        "target_kind": target_kind,
                    },
                }),
            )?;
            records.push(DnsRecord {
                resource,
                name,
                target: target.clone(),
            });
        }

        info!(strategy = %strategy, target = %target, "Bound edge routing");

        Ok(EdgeRouting {
            strategy,
            distribution,
            target,
            records,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DnsRecord {
    pub resource: ResourceRef,
    pub name: String,
    pub target: AttrRef,
}

/// 結び付けられたエッジルーティング
#[derive(Debug, Clone)]
pub struct EdgeRouting {
    strategy: EdgeStrategy,
    distribution: Option<ResourceRef>,
    target: AttrRef,
    records: Vec<DnsRecord>,
}

impl EdgeRouting {
    pub fn strategy(&self) -> EdgeStrategy {
        self.strategy
    }

    pub fn distribution(&self) -> Option<&ResourceRef> {
        self.distribution.as_ref()
    }

    /// レコードが向いているエイリアス先
    pub fn target(&self) -> &AttrRef {
        &self.target
    }

    /// ルートと `www` の2レコード
    pub fn records(&self) -> &[DnsRecord] {
        &self.records
    }
}
