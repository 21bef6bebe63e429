use super::*;
use crate::model::{BootstrapMode, EdgeStrategy, RendererKind, TlsMode};
use crate::secret::SecretSource;

#[test]
fn test_parse_minimal_config() {
    let kdl = r#"
        project "wordpress"
        environment "prod"
        domain "example.com"
    "#;

    let config = parse_kdl_string(kdl, "fallback".to_string()).unwrap();
    assert_eq!(config.project, "wordpress");
    assert_eq!(config.environment, "prod");
    assert_eq!(config.domain, "example.com");
    assert_eq!(config, DeploymentConfig::new("wordpress", "prod", "example.com"));
}

#[test]
fn test_parse_uses_default_name_and_environment() {
    let config = parse_kdl_string(r#"domain "example.com""#, "blog".to_string()).unwrap();
    assert_eq!(config.project, "blog");
    assert_eq!(config.environment, DEFAULT_ENVIRONMENT);
}

#[test]
fn test_parse_missing_domain_error() {
    let result = parse_kdl_string(r#"project "wordpress""#, "test".to_string());
    assert!(matches!(result, Err(StackError::InvalidConfig(_))));
}

#[test]
fn test_parse_variant() {
    let kdl = r#"
        domain "example.com"
        variant {
            edge "direct-alias"
            tls "load-balancer"
            bootstrap "declarative-init"
            renderer "sed"
            site-identity #false
        }
    "#;

    let config = parse_kdl_string(kdl, "test".to_string()).unwrap();
    assert_eq!(config.variant.edge, EdgeStrategy::DirectAlias);
    assert_eq!(config.variant.tls, TlsMode::LoadBalancer);
    assert_eq!(config.variant.bootstrap, BootstrapMode::DeclarativeInit);
    assert_eq!(config.variant.renderer, RendererKind::Sed);
    assert!(!config.variant.site_identity);
}

#[test]
fn test_parse_unknown_variant_value() {
    let kdl = r#"
        domain "example.com"
        variant {
            edge "anycast"
        }
    "#;

    let err = parse_kdl_string(kdl, "test".to_string()).unwrap_err();
    assert!(matches!(err, StackError::InvalidVariant(_)));
    assert!(err.to_string().contains("direct-alias"));
}

#[test]
fn test_parse_network() {
    let kdl = r#"
        domain "example.com"
        network {
            cidr "10.20.0.0/16"
            max-azs 3
            subnet-mask 20
        }
    "#;

    let config = parse_kdl_string(kdl, "test".to_string()).unwrap();
    assert_eq!(config.network.cidr, "10.20.0.0/16");
    assert_eq!(config.network.max_azs, 3);
    assert_eq!(config.network.subnet_mask, 20);
}

#[test]
fn test_parse_network_mask_out_of_range() {
    let kdl = r#"
        domain "example.com"
        network {
            subnet-mask 300
        }
    "#;
    assert!(matches!(
        parse_kdl_string(kdl, "test".to_string()),
        Err(StackError::InvalidCidr(_))
    ));
}

#[test]
fn test_parse_database() {
    let kdl = r#"
        domain "example.com"
        database {
            engine "mysql" version="8.0"
            name "blog"
            username "wpadmin"
            password env="BLOG_DB_PASSWORD"
            allocated-storage 30
            max-allocated-storage 200
            instance-class "db.t3.small"
            publicly-accessible #false
        }
    "#;

    let config = parse_kdl_string(kdl, "test".to_string()).unwrap();
    assert_eq!(config.database.engine, "mysql");
    assert_eq!(config.database.engine_version, "8.0");
    assert_eq!(config.database.name, "blog");
    assert_eq!(config.database.allocated_storage, 30);
    assert_eq!(config.database.max_allocated_storage, 200);
    assert_eq!(config.database.instance_class, "db.t3.small");
    assert_eq!(config.credentials.username, "wpadmin");
    assert_eq!(
        config.credentials.password,
        SecretSource::Env("BLOG_DB_PASSWORD".to_string())
    );
}

#[test]
fn test_parse_database_password_sources() {
    let op = r#"
        domain "example.com"
        database {
            password "op://Infra/wordpress-db/password"
        }
    "#;
    let config = parse_kdl_string(op, "test".to_string()).unwrap();
    assert_eq!(
        config.credentials.password,
        SecretSource::OnePassword("op://Infra/wordpress-db/password".to_string())
    );

    let literal = r#"
        domain "example.com"
        database {
            password "password#1"
        }
    "#;
    let config = parse_kdl_string(literal, "test".to_string()).unwrap();
    assert_eq!(
        config.credentials.password,
        SecretSource::Literal("password#1".to_string())
    );
}

#[test]
fn test_parse_publicly_accessible_is_kept_for_validation() {
    // 公開設定の拒否はパーサーではなくプロビジョナーの責務
    let kdl = r#"
        domain "example.com"
        database {
            publicly-accessible #true
        }
    "#;
    let config = parse_kdl_string(kdl, "test".to_string()).unwrap();
    assert!(config.database.publicly_accessible);
}

#[test]
fn test_parse_compute() {
    let kdl = r#"
        domain "example.com"
        key-pair "ops-key"
        compute {
            instance-type "t3.small"
            machine-image "amazon-linux-2"
            desired-capacity 2
            health-check path="/healthz" interval=30
            boot-signals count=2 timeout=600
        }
    "#;

    let config = parse_kdl_string(kdl, "test".to_string()).unwrap();
    assert_eq!(config.key_pair.as_deref(), Some("ops-key"));
    assert_eq!(config.compute.instance_type, "t3.small");
    assert_eq!(config.compute.machine_image, "amazon-linux-2");
    assert_eq!(config.compute.desired_capacity, 2);
    assert_eq!(config.compute.health_check.path, "/healthz");
    assert_eq!(config.compute.health_check.interval_secs, 30);
    assert_eq!(config.compute.boot_signals.count, 2);
    assert_eq!(config.compute.boot_signals.timeout_secs, 600);
}

#[test]
fn test_parse_negative_capacity_error() {
    let kdl = r#"
        domain "example.com"
        compute {
            desired-capacity -1
        }
    "#;
    assert!(matches!(
        parse_kdl_string(kdl, "test".to_string()),
        Err(StackError::InvalidConfig(_))
    ));
}

#[test]
fn test_parse_invalid_kdl() {
    assert!(matches!(
        parse_kdl_string("domain \"example.com", "test".to_string()),
        Err(StackError::KdlParse(_))
    ));
}

#[test]
fn test_parse_kdl_file() {
    let dir = tempfile::tempdir().unwrap();
    let project_dir = dir.path().join("myblog");
    std::fs::create_dir(&project_dir).unwrap();
    let path = project_dir.join("webstack.kdl");
    std::fs::write(&path, r#"domain "example.org""#).unwrap();

    let config = parse_kdl_file(&path).unwrap();
    assert_eq!(config.project, "myblog");
    assert_eq!(config.domain, "example.org");
}
