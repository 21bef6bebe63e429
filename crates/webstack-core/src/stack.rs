//! リソースグラフ
//!
//! プロビジョナーは [`Stack`] にリソースを宣言し、読み取り専用のハンドル
//! ([`ResourceRef`]) を受け取ります。宣言に埋め込まれた属性トークンから
//! 依存関係が自動的に導出されます。参照できるのは既に宣言済みのリソースだけなので、
//! グラフは構築時点で一方向（DAG）になります。

use crate::error::{Result, StackError};
use crate::token::{self, AttrRef};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use webstack_cloud::provider::resource_key;
use webstack_cloud::ResourceConfig;

/// リソースタイプ名
pub mod kind {
    pub const VPC: &str = "vpc";
    pub const INTERNET_GATEWAY: &str = "internet-gateway";
    pub const SUBNET: &str = "subnet";
    pub const NAT_GATEWAY: &str = "nat-gateway";
    pub const FLOW_LOG: &str = "flow-log";
    pub const IAM_ROLE: &str = "iam-role";
    pub const SECURITY_GROUP: &str = "security-group";
    pub const SECURITY_GROUP_INGRESS: &str = "security-group-ingress";
    pub const KEY_PAIR: &str = "key-pair";
    pub const HOSTED_ZONE: &str = "hosted-zone";
    pub const CERTIFICATE: &str = "certificate";
    pub const DB_SUBNET_GROUP: &str = "db-subnet-group";
    pub const DATABASE: &str = "database";
    pub const LAUNCH_TEMPLATE: &str = "launch-template";
    pub const AUTO_SCALING_GROUP: &str = "auto-scaling-group";
    pub const TARGET_GROUP: &str = "target-group";
    pub const LOAD_BALANCER: &str = "load-balancer";
    pub const LISTENER: &str = "listener";
    pub const CDN_DISTRIBUTION: &str = "cdn-distribution";
    pub const DNS_RECORD: &str = "dns-record";
}

/// 宣言済みリソースへの読み取り専用ハンドル
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    resource_type: String,
    id: String,
}

impl ResourceRef {
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> String {
        resource_key(&self.resource_type, &self.id)
    }

    /// 作成後に解決される属性への参照
    pub fn attr(&self, attribute: &str) -> AttrRef {
        AttrRef::new(&self.resource_type, &self.id, attribute)
    }
}

/// 宣言済みリソースのグラフ
#[derive(Debug, Clone, Default)]
pub struct Stack {
    name: String,
    resources: Vec<ResourceConfig>,
    index: HashMap<String, usize>,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// リソースを宣言
    pub fn declare(
        &mut self,
        resource_type: &str,
        id: impl Into<String>,
        config: serde_json::Value,
    ) -> Result<ResourceRef> {
        self.declare_with(resource_type, id, config, &[])
    }

    /// 明示的な依存関係付きでリソースを宣言
    ///
    /// トークン参照による依存関係に加えて `depends_on` を追加します。
    pub fn declare_with(
        &mut self,
        resource_type: &str,
        id: impl Into<String>,
        config: serde_json::Value,
        depends_on: &[&ResourceRef],
    ) -> Result<ResourceRef> {
        let id = id.into();
        let key = resource_key(resource_type, &id);
        if self.index.contains_key(&key) {
            return Err(StackError::DuplicateResource(key));
        }

        let mut deps: Vec<String> = Vec::new();
        for reference in token::find_references(&config) {
            let dep = reference.key();
            if !self.index.contains_key(&dep) {
                return Err(StackError::UnknownReference {
                    resource: key,
                    reference: reference.token(),
                });
            }
            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }
        for explicit in depends_on {
            let dep = explicit.key();
            if !self.index.contains_key(&dep) {
                return Err(StackError::UnknownReference {
                    resource: key,
                    reference: dep,
                });
            }
            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }

        debug!(resource = %key, dependencies = deps.len(), "Declared resource");

        let mut resource = ResourceConfig::new(resource_type, id.clone(), config);
        resource.depends_on = deps;
        let fingerprint = fingerprint(&resource);
        let resource = resource.with_fingerprint(fingerprint);

        self.index.insert(key, self.resources.len());
        self.resources.push(resource);

        Ok(ResourceRef {
            resource_type: resource_type.to_string(),
            id,
        })
    }

    /// 同じ構造のスタックからフィンガープリントを引き継ぐ
    ///
    /// 秘密情報を差し替えて組み立てたスタックの値を使い、平文から計算した
    /// ハッシュがステートに残らないようにします。
    pub fn adopt_fingerprints(&mut self, other: &Stack) {
        for resource in &mut self.resources {
            if let Some(source) = other.get(&resource.key()) {
                resource.fingerprint = source.fingerprint.clone();
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&ResourceConfig> {
        self.index.get(key).map(|&i| &self.resources[i])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// 宣言順にリソースを列挙
    pub fn resources(&self) -> impl Iterator<Item = &ResourceConfig> {
        self.resources.iter()
    }

    pub fn by_type(&self, resource_type: &str) -> Vec<&ResourceConfig> {
        self.resources
            .iter()
            .filter(|r| r.resource_type == resource_type)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// 直接の依存先
    pub fn dependencies(&self, key: &str) -> &[String] {
        self.get(key).map(|r| r.depends_on.as_slice()).unwrap_or(&[])
    }

    /// 推移的に依存しているリソース（`key` が失敗したら作れないもの）
    pub fn dependents(&self, key: &str) -> Vec<String> {
        let mut blocked: HashSet<String> = HashSet::new();
        blocked.insert(key.to_string());
        let mut result = Vec::new();
        // 宣言順は依存順でもあるので一回の走査で閉包が求まる
        for resource in &self.resources {
            let k = resource.key();
            if resource.depends_on.iter().any(|d| blocked.contains(d)) {
                blocked.insert(k.clone());
                result.push(k);
            }
        }
        result
    }

    /// トポロジカルな段（wave）に分割
    ///
    /// 同じ段のリソースは互いに独立しており、並行して作成できます。
    pub fn waves(&self) -> Result<Vec<Vec<String>>> {
        let mut remaining: HashMap<String, HashSet<&str>> = HashMap::new();
        for resource in &self.resources {
            for dep in &resource.depends_on {
                if !self.index.contains_key(dep) {
                    return Err(StackError::UnknownReference {
                        resource: resource.key(),
                        reference: dep.clone(),
                    });
                }
            }
            remaining.insert(
                resource.key(),
                resource.depends_on.iter().map(String::as_str).collect(),
            );
        }

        let mut done: HashSet<String> = HashSet::new();
        let mut waves = Vec::new();
        while done.len() < self.resources.len() {
            let wave: Vec<String> = self
                .resources
                .iter()
                .map(ResourceConfig::key)
                .filter(|k| !done.contains(k))
                .filter(|k| {
                    remaining
                        .get(k)
                        .is_some_and(|deps| deps.iter().all(|d| done.contains(*d)))
                })
                .collect();

            if wave.is_empty() {
                let stuck: Vec<String> = self
                    .resources
                    .iter()
                    .map(ResourceConfig::key)
                    .filter(|k| !done.contains(k))
                    .collect();
                return Err(StackError::CircularDependency(stuck.join(", ")));
            }

            done.extend(wave.iter().cloned());
            waves.push(wave);
        }
        Ok(waves)
    }

    /// 構造的な検証
    ///
    /// - すべての参照が宣言済みで、循環がないこと
    /// - データベースがプライベートサブネットにのみ配置されていること
    /// - ホスト用ファイアウォールのポートが {443, 80, 22} であること
    /// - 1つのロードバランサーにエッジルーターが1種類だけ接続されていること
    pub fn validate(&self) -> Result<()> {
        self.waves()?;
        self.validate_private_placement()?;
        self.validate_host_firewall()?;
        self.validate_edge_routing()?;
        debug!(stack = %self.name, resources = self.len(), "Stack validated");
        Ok(())
    }

    fn referenced_of_type(&self, resource: &ResourceConfig, resource_type: &str) -> Vec<&ResourceConfig> {
        token::find_references(&resource.config)
            .into_iter()
            .filter(|r| r.resource_type == resource_type)
            .filter_map(|r| self.get(&r.key()))
            .collect()
    }

    fn validate_private_placement(&self) -> Result<()> {
        for db in self.by_type(kind::DATABASE) {
            if db.get_config::<bool>("publicly_accessible").unwrap_or(false) {
                return Err(StackError::PubliclyAccessibleDatabase(db.key()));
            }

            let mut subnets = self.referenced_of_type(db, kind::SUBNET);
            for group in self.referenced_of_type(db, kind::DB_SUBNET_GROUP) {
                subnets.extend(self.referenced_of_type(group, kind::SUBNET));
            }

            if subnets.is_empty() {
                return Err(StackError::InvalidConfig(format!(
                    "{} にサブネットが割り当てられていません",
                    db.key()
                )));
            }

            for subnet in subnets {
                if subnet.get_config::<String>("tier").as_deref() != Some("private") {
                    return Err(StackError::PublicPlacement {
                        resource: db.key(),
                        subnet: subnet.key(),
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_host_firewall(&self) -> Result<()> {
        for group in self.by_type(kind::SECURITY_GROUP) {
            if group.get_config::<String>("purpose").as_deref() != Some("hosts") {
                continue;
            }
            let rules: Vec<serde_json::Value> = group.get_config("ingress").unwrap_or_default();
            let mut ports: Vec<u64> = rules
                .iter()
                .filter_map(|r| r.get("port").and_then(|p| p.as_u64()))
                .collect();
            ports.sort_unstable();
            if ports != [22, 80, 443] {
                return Err(StackError::FirewallRuleViolation(format!(
                    "{} のポートは 443/80/22 である必要があります（実際: {:?}）",
                    group.key(),
                    ports
                )));
            }
        }
        Ok(())
    }

    fn validate_edge_routing(&self) -> Result<()> {
        for lb in self.by_type(kind::LOAD_BALANCER) {
            let lb_key = lb.key();
            let references_lb = |r: &&ResourceConfig| {
                token::find_references(&r.config)
                    .iter()
                    .any(|a| a.key() == lb_key)
            };
            let cdn = self
                .by_type(kind::CDN_DISTRIBUTION)
                .into_iter()
                .filter(references_lb)
                .count();
            let direct = self
                .by_type(kind::DNS_RECORD)
                .into_iter()
                .filter(references_lb)
                .count();
            if cdn > 1 || (cdn > 0 && direct > 0) {
                return Err(StackError::ConflictingEdgeRouting(lb_key));
            }
        }
        Ok(())
    }

    /// 宣言内容をシリアライズ可能な形に変換
    pub fn synthesize(&self) -> Synthesis {
        Synthesis {
            stack: self.name.clone(),
            resources: self
                .resources
                .iter()
                .map(|r| SynthesizedResource {
                    key: r.key(),
                    resource_type: r.resource_type.clone(),
                    id: r.id.clone(),
                    depends_on: r.depends_on.clone(),
                    config: r.config.clone(),
                })
                .collect(),
        }
    }
}

/// 未解決の宣言の指紋（SHA-256）
pub fn fingerprint(resource: &ResourceConfig) -> String {
    let mut hasher = Sha256::new();
    hasher.update(resource.resource_type.as_bytes());
    hasher.update(b"\0");
    hasher.update(resource.id.as_bytes());
    hasher.update(b"\0");
    hasher.update(resource.config.to_string().as_bytes());
    for dep in &resource.depends_on {
        hasher.update(b"\0");
        hasher.update(dep.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// シリアライズされたスタック
#[derive(Debug, Clone, Serialize)]
pub struct Synthesis {
    pub stack: String,
    pub resources: Vec<SynthesizedResource>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SynthesizedResource {
    pub key: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    pub config: serde_json::Value,
}

impl Synthesis {
    /// 秘密情報を伏せ字に置換
    pub fn redact(&mut self, secret: &str) {
        if secret.is_empty() {
            return;
        }
        for resource in &mut self.resources {
            redact_value(&mut resource.config, secret);
        }
    }
}

fn redact_value(value: &mut serde_json::Value, secret: &str) {
    match value {
        serde_json::Value::String(s) if s.contains(secret) => {
            *s = s.replace(secret, crate::secret::REDACTED);
        }
        serde_json::Value::Array(items) => {
            for item in items {
                redact_value(item, secret);
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values_mut() {
                redact_value(item, secret);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn subnet(stack: &mut Stack, id: &str, tier: &str) -> ResourceRef {
        stack
            .declare(kind::SUBNET, id, json!({"tier": tier, "cidr": "10.0.0.0/24"}))
            .unwrap()
    }

    #[test]
    fn test_declare_derives_dependencies_from_tokens() {
        let mut stack = Stack::new("test");
        let vpc = stack.declare(kind::VPC, "net", json!({"cidr": "10.0.0.0/16"})).unwrap();
        let sn = stack
            .declare(
                kind::SUBNET,
                "net-public-1",
                json!({"vpc_id": vpc.attr("vpc_id").token(), "tier": "public"}),
            )
            .unwrap();

        assert_eq!(stack.dependencies(&sn.key()), ["vpc:net".to_string()]);
        assert!(stack.dependencies(&vpc.key()).is_empty());
    }

    #[test]
    fn test_unknown_reference_is_rejected() {
        let mut stack = Stack::new("test");
        let err = stack
            .declare(
                kind::DNS_RECORD,
                "root",
                json!({"alias_target": "${load-balancer:lb.dns_name}"}),
            )
            .unwrap_err();
        assert!(matches!(err, StackError::UnknownReference { .. }));
        assert!(err.is_declaration_error());
    }

    #[test]
    fn test_duplicate_resource_is_rejected() {
        let mut stack = Stack::new("test");
        stack.declare(kind::VPC, "net", json!({})).unwrap();
        assert!(matches!(
            stack.declare(kind::VPC, "net", json!({})),
            Err(StackError::DuplicateResource(_))
        ));
    }

    #[test]
    fn test_waves_follow_dependencies() {
        let mut stack = Stack::new("test");
        let vpc = stack.declare(kind::VPC, "net", json!({})).unwrap();
        let key = stack.declare(kind::KEY_PAIR, "keys", json!({})).unwrap();
        let sn = stack
            .declare(kind::SUBNET, "sn", json!({"vpc": vpc.attr("vpc_id").token()}))
            .unwrap();
        stack
            .declare(
                kind::LAUNCH_TEMPLATE,
                "lt",
                json!({"subnet": sn.attr("subnet_id").token(), "key": key.attr("key_name").token()}),
            )
            .unwrap();

        let waves = stack.waves().unwrap();
        assert_eq!(waves.len(), 3);
        assert_eq!(waves[0], vec!["vpc:net".to_string(), "key-pair:keys".to_string()]);
        assert_eq!(waves[1], vec!["subnet:sn".to_string()]);
        assert_eq!(waves[2], vec!["launch-template:lt".to_string()]);
    }

    #[test]
    fn test_dependents_are_transitive() {
        let mut stack = Stack::new("test");
        let a = stack.declare(kind::VPC, "a", json!({})).unwrap();
        let b = stack
            .declare(kind::SUBNET, "b", json!({"v": a.attr("vpc_id").token()}))
            .unwrap();
        stack
            .declare(kind::NAT_GATEWAY, "c", json!({"s": b.attr("subnet_id").token()}))
            .unwrap();
        stack.declare(kind::KEY_PAIR, "d", json!({})).unwrap();

        assert_eq!(
            stack.dependents("vpc:a"),
            vec!["subnet:b".to_string(), "nat-gateway:c".to_string()]
        );
    }

    #[test]
    fn test_database_in_public_subnet_is_rejected() {
        let mut stack = Stack::new("test");
        let public = subnet(&mut stack, "public-1", "public");
        let private = subnet(&mut stack, "private-1", "private");
        let group = stack
            .declare(
                kind::DB_SUBNET_GROUP,
                "group",
                json!({"subnet_ids": [public.attr("subnet_id").token(), private.attr("subnet_id").token()]}),
            )
            .unwrap();
        stack
            .declare(
                kind::DATABASE,
                "db",
                json!({"subnet_group": group.attr("name").token(), "publicly_accessible": false}),
            )
            .unwrap();

        match stack.validate() {
            Err(StackError::PublicPlacement { resource, subnet }) => {
                assert_eq!(resource, "database:db");
                assert_eq!(subnet, "subnet:public-1");
            }
            other => panic!("expected PublicPlacement, got {:?}", other),
        }
    }

    #[test]
    fn test_host_firewall_ports_are_checked() {
        let mut stack = Stack::new("test");
        stack
            .declare(
                kind::SECURITY_GROUP,
                "hosts",
                json!({"purpose": "hosts", "ingress": [{"port": 443}, {"port": 80}, {"port": 8080}]}),
            )
            .unwrap();
        assert!(matches!(
            stack.validate(),
            Err(StackError::FirewallRuleViolation(_))
        ));
    }

    #[test]
    fn test_cdn_and_direct_alias_on_same_load_balancer_is_rejected() {
        let mut stack = Stack::new("test");
        let lb = stack.declare(kind::LOAD_BALANCER, "lb", json!({})).unwrap();
        stack
            .declare(
                kind::CDN_DISTRIBUTION,
                "cdn",
                json!({"origin": {"domain_name": lb.attr("dns_name").token()}}),
            )
            .unwrap();
        stack
            .declare(
                kind::DNS_RECORD,
                "root",
                json!({"alias_target": lb.attr("dns_name").token()}),
            )
            .unwrap();

        assert!(matches!(
            stack.validate(),
            Err(StackError::ConflictingEdgeRouting(key)) if key == "load-balancer:lb"
        ));
    }

    #[test]
    fn test_fingerprint_changes_with_config() {
        let a = ResourceConfig::new(kind::VPC, "net", json!({"cidr": "10.0.0.0/16"}));
        let b = ResourceConfig::new(kind::VPC, "net", json!({"cidr": "10.1.0.0/16"}));
        assert_eq!(fingerprint(&a), fingerprint(&a.clone()));
        assert_ne!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a).len(), 64);
    }

    #[test]
    fn test_synthesis_redacts_secrets() {
        let mut stack = Stack::new("test");
        stack
            .declare(
                kind::LAUNCH_TEMPLATE,
                "lt",
                json!({"user_data": "sed s/'password_here'/'hunter2'/g"}),
            )
            .unwrap();
        let mut synth = stack.synthesize();
        synth.redact("hunter2");
        let text = serde_json::to_string(&synth).unwrap();
        assert!(!text.contains("hunter2"));
        assert!(text.contains("********"));
    }
}
