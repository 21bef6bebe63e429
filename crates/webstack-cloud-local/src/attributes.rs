//! Fabricated post-creation attributes
//!
//! Each resource type gets the identifiers a real provider would only know
//! after creating it. Values are random but shaped like the real ones so
//! that they can be pasted into other declarations unchanged.

use serde_json::{Value, json};
use uuid::Uuid;
use webstack_cloud::ResourceConfig;

/// Hosted zone id used by every CDN distribution
pub const CDN_HOSTED_ZONE_ID: &str = "Z2FDTNDATAQYW2";

/// Field holding the physical name for types whose names must be unique
pub fn physical_name_field(resource_type: &str) -> Option<&'static str> {
    match resource_type {
        "key-pair" => Some("key_name"),
        "hosted-zone" => Some("zone_name"),
        "database" => Some("identifier"),
        "vpc" | "security-group" | "iam-role" | "db-subnet-group" => Some("name"),
        _ => None,
    }
}

fn hex(len: usize) -> String {
    let mut out = String::with_capacity(len);
    while out.len() < len {
        out.push_str(&Uuid::new_v4().simple().to_string());
    }
    out.truncate(len);
    out
}

fn upper(len: usize) -> String {
    hex(len).to_uppercase()
}

fn config_str(resource: &ResourceConfig, field: &str) -> String {
    resource
        .get_config::<String>(field)
        .unwrap_or_else(|| resource.id.clone())
}

/// Attributes for a newly created resource
pub fn fabricate(resource: &ResourceConfig, account: &str, region: &str) -> Vec<(String, Value)> {
    let id = resource.id.as_str();
    let attrs: Vec<(&str, Value)> = match resource.resource_type.as_str() {
        "vpc" => vec![
            ("vpc_id", json!(format!("vpc-{}", hex(17)))),
            ("cidr_block", json!(config_str(resource, "cidr"))),
        ],
        "internet-gateway" => vec![("gateway_id", json!(format!("igw-{}", hex(17))))],
        "subnet" => vec![
            ("subnet_id", json!(format!("subnet-{}", hex(17)))),
            ("cidr_block", json!(config_str(resource, "cidr"))),
            (
                "availability_zone",
                json!(config_str(resource, "availability_zone")),
            ),
        ],
        "nat-gateway" => vec![
            ("nat_gateway_id", json!(format!("nat-{}", hex(17)))),
            ("allocation_id", json!(format!("eipalloc-{}", hex(17)))),
        ],
        "flow-log" => vec![("flow_log_id", json!(format!("fl-{}", hex(17))))],
        "iam-role" => vec![
            (
                "role_arn",
                json!(format!("arn:aws:iam::{}:role/{}", account, id)),
            ),
            (
                "instance_profile_arn",
                json!(format!("arn:aws:iam::{}:instance-profile/{}", account, id)),
            ),
        ],
        "security-group" => vec![("security_group_id", json!(format!("sg-{}", hex(17))))],
        "security-group-ingress" => {
            vec![("rule_id", json!(format!("sgr-{}", hex(17))))]
        }
        "key-pair" => vec![
            ("key_name", json!(config_str(resource, "key_name"))),
            ("key_pair_id", json!(format!("key-{}", hex(17)))),
        ],
        "hosted-zone" => {
            let servers: Vec<String> = (0..4)
                .map(|i| {
                    let tld = ["com", "net", "org", "co.uk"][i];
                    format!("ns-{}.awsdns-{:02}.{}", 100 + i * 512, i * 17 % 64, tld)
                })
                .collect();
            vec![
                ("zone_id", json!(format!("Z{}", upper(13)))),
                ("name_servers", json!(servers)),
            ]
        }
        "certificate" => vec![(
            "certificate_arn",
            json!(format!(
                "arn:aws:acm:{}:{}:certificate/{}",
                region,
                account,
                Uuid::new_v4()
            )),
        )],
        "db-subnet-group" => vec![("name", json!(config_str(resource, "name")))],
        "database" => vec![
            (
                "endpoint_address",
                json!(format!(
                    "{}.{}.{}.rds.amazonaws.com",
                    config_str(resource, "identifier"),
                    hex(12),
                    region
                )),
            ),
            (
                "endpoint_port",
                json!(resource.get_config::<u16>("port").unwrap_or(3306)),
            ),
            (
                "db_instance_arn",
                json!(format!("arn:aws:rds:{}:{}:db:{}", region, account, id)),
            ),
        ],
        "launch-template" => vec![
            ("launch_template_id", json!(format!("lt-{}", hex(17)))),
            ("latest_version", json!(1)),
        ],
        "auto-scaling-group" => vec![(
            "auto_scaling_group_arn",
            json!(format!(
                "arn:aws:autoscaling:{}:{}:autoScalingGroup:{}:autoScalingGroupName/{}",
                region,
                account,
                Uuid::new_v4(),
                id
            )),
        )],
        "target-group" => vec![(
            "target_group_arn",
            json!(format!(
                "arn:aws:elasticloadbalancing:{}:{}:targetgroup/{}/{}",
                region,
                account,
                short_name(id),
                hex(16)
            )),
        )],
        "load-balancer" => vec![
            (
                "load_balancer_arn",
                json!(format!(
                    "arn:aws:elasticloadbalancing:{}:{}:loadbalancer/app/{}/{}",
                    region,
                    account,
                    short_name(id),
                    hex(16)
                )),
            ),
            (
                "dns_name",
                json!(format!(
                    "{}-{}.{}.elb.amazonaws.com",
                    short_name(id),
                    &hex(10),
                    region
                )),
            ),
            ("hosted_zone_id", json!(format!("Z{}", upper(13)))),
        ],
        "listener" => vec![(
            "listener_arn",
            json!(format!(
                "arn:aws:elasticloadbalancing:{}:{}:listener/app/{}/{}",
                region,
                account,
                short_name(id),
                hex(16)
            )),
        )],
        "cdn-distribution" => vec![
            ("distribution_id", json!(format!("E{}", upper(13)))),
            ("domain_name", json!(format!("d{}.cloudfront.net", hex(13)))),
            ("hosted_zone_id", json!(CDN_HOSTED_ZONE_ID)),
        ],
        "dns-record" => vec![("fqdn", json!(config_str(resource, "name")))],
        _ => vec![("id", json!(format!("{}-{}", id, hex(8))))],
    };

    attrs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Load balancer and target group names are capped at 32 characters
fn short_name(id: &str) -> &str {
    let end = id
        .char_indices()
        .nth(32)
        .map(|(i, _)| i)
        .unwrap_or(id.len());
    id[..end].trim_end_matches('-')
}

/// Fields that carry credentials in clear text once tokens are resolved
fn is_secret_field(key: &str) -> bool {
    key.contains("password") || key == "user_data" || key == "init"
}

/// Replace credential-bearing values before the declaration is persisted
pub fn redact_secrets(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    if is_secret_field(k) && !v.is_null() {
                        (k.clone(), json!("********"))
                    } else {
                        (k.clone(), redact_secrets(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_secrets).collect()),
        other => other.clone(),
    }
}
