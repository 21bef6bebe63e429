//! ローカルプロバイダーを使ったデプロイ全体のテスト

use std::time::Duration;
use webstack_cloud::{ActionType, CloudProvider, ResourceStatus};
use webstack_cloud_local::LocalProvider;
use webstack_core::{
    DatabaseCredentials, DeploymentConfig, DeploymentContext, EdgeStrategy, Engine, EngineOptions,
    Secret, StackError, TlsMode, assemble,
};

fn context(environment: &str) -> DeploymentContext {
    DeploymentContext::new("wordpress", environment, "example.com", "123456789012", "us-east-1")
}

fn credentials() -> DatabaseCredentials {
    DatabaseCredentials::new("admin", Secret::new("password#1"))
}

fn fast_options() -> EngineOptions {
    EngineOptions {
        validation_poll_interval: Duration::from_millis(5),
        validation_timeout: Duration::from_millis(200),
    }
}

fn provider(dir: &tempfile::TempDir) -> LocalProvider {
    LocalProvider::new(dir.path(), "123456789012", "us-east-1")
}

#[tokio::test]
async fn test_full_apply_resolves_every_resource() {
    let dir = tempfile::tempdir().unwrap();
    let config = DeploymentConfig::new("wordpress", "prod", "example.com");
    let deployment = assemble(&context("prod"), &config, &credentials()).unwrap();
    let engine = Engine::new(provider(&dir), fast_options());

    let plan = engine.plan(&deployment.stack).await.unwrap();
    assert_eq!(
        plan.actions_by_type(ActionType::Create).len(),
        deployment.stack.len()
    );

    let result = engine.apply(&deployment.stack, &plan).await.unwrap();
    assert!(result.is_success(), "failed: {:?}", result.failed);
    assert!(result.pending.is_empty());
    assert!(result.skipped.is_empty());

    let state = engine.provider().get_state().await.unwrap();
    assert_eq!(state.len(), deployment.stack.len());
    assert!(state.iter().all(|(_, s)| s.status == ResourceStatus::Available));

    // データベースのエンドポイントが起動スクリプトに埋め込まれている
    let db = state.get("database:wordpress-prod-database").unwrap();
    let endpoint = db.attribute_string("endpoint_address").unwrap();
    assert!(endpoint.ends_with(".us-east-1.rds.amazonaws.com"));

    let outputs = engine.resolve_outputs(&deployment).await.unwrap();
    assert_eq!(outputs["database_endpoint"], endpoint);
    assert_eq!(outputs["site_url"], "https://www.example.com");
    assert!(outputs["edge_target"].ends_with(".cloudfront.net"));
    assert!(!outputs.values().any(|v| v.contains("${")));

    let raw = std::fs::read_to_string(engine.provider().state_path()).unwrap();
    assert!(!raw.contains("password#1"));
}

#[tokio::test]
async fn test_second_plan_has_no_changes() {
    let dir = tempfile::tempdir().unwrap();
    let config = DeploymentConfig::new("wordpress", "prod", "example.com");
    let deployment = assemble(&context("prod"), &config, &credentials()).unwrap();
    let engine = Engine::new(provider(&dir), fast_options());

    let plan = engine.plan(&deployment.stack).await.unwrap();
    engine.apply(&deployment.stack, &plan).await.unwrap();

    let replan = engine.plan(&deployment.stack).await.unwrap();
    assert!(!replan.has_changes, "{}", replan.summary());

    // 容量を変えると該当リソースだけが更新対象になる
    let mut scaled = config.clone();
    scaled.compute.desired_capacity = 2;
    let deployment = assemble(&context("prod"), &scaled, &credentials()).unwrap();
    let replan = engine.plan(&deployment.stack).await.unwrap();
    let updates: Vec<String> = replan
        .actions_by_type(ActionType::Update)
        .iter()
        .map(|a| a.resource_key())
        .collect();
    assert_eq!(updates, vec!["auto-scaling-group:wordpress-prod-hosts".to_string()]);
}

#[tokio::test]
async fn test_stored_fingerprints_are_independent_of_password() {
    let dir = tempfile::tempdir().unwrap();
    let config = DeploymentConfig::new("wordpress", "prod", "example.com");
    let deployment = assemble(&context("prod"), &config, &credentials()).unwrap();
    let engine = Engine::new(provider(&dir), fast_options());
    let plan = engine.plan(&deployment.stack).await.unwrap();
    engine.apply(&deployment.stack, &plan).await.unwrap();

    let rotated = assemble(
        &context("prod"),
        &config,
        &DatabaseCredentials::new("admin", Secret::new("rotated&p/ss")),
    )
    .unwrap();
    let state = engine.provider().get_state().await.unwrap();
    for resource in rotated.stack.resources() {
        let stored = state.get(&resource.key()).unwrap();
        assert_eq!(stored.fingerprint, resource.fingerprint, "{}", resource.key());
    }
}

#[tokio::test]
async fn test_pending_certificate_skips_dependents() {
    let dir = tempfile::tempdir().unwrap();
    let config = DeploymentConfig::new("wordpress", "prod", "example.com");
    let deployment = assemble(&context("prod"), &config, &credentials()).unwrap();
    let engine = Engine::new(
        provider(&dir).with_validation_refreshes(u32::MAX),
        EngineOptions {
            validation_poll_interval: Duration::from_millis(5),
            validation_timeout: Duration::from_millis(30),
        },
    );

    let plan = engine.plan(&deployment.stack).await.unwrap();
    let result = engine.apply(&deployment.stack, &plan).await.unwrap();

    assert!(result.failed.is_empty());
    assert_eq!(result.pending.len(), 1);
    assert_eq!(
        result.pending[0].action_id,
        "create-certificate:wordpress-prod-certificate"
    );
    assert!(!result.is_complete());

    let skipped: Vec<&str> = result.skipped.iter().map(|s| s.action_id.as_str()).collect();
    assert!(skipped.contains(&"create-cdn-distribution:wordpress-prod-cdn"));
    assert!(
        result
            .skipped
            .iter()
            .all(|s| s.blocked_by == "certificate:wordpress-prod-certificate")
    );

    // 証明書に依存しないリソースは作成済み
    let state = engine.provider().get_state().await.unwrap();
    assert!(state.get("load-balancer:wordpress-prod-lb").is_some());
    assert!(state.get("cdn-distribution:wordpress-prod-cdn").is_none());
}

#[tokio::test]
async fn test_direct_alias_deployment() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = DeploymentConfig::new("wordpress", "prod", "example.com");
    config.variant.edge = EdgeStrategy::DirectAlias;
    config.variant.tls = TlsMode::LoadBalancer;
    let deployment = assemble(&context("prod"), &config, &credentials()).unwrap();
    let engine = Engine::new(provider(&dir), fast_options());

    let plan = engine.plan(&deployment.stack).await.unwrap();
    let result = engine.apply(&deployment.stack, &plan).await.unwrap();
    assert!(result.is_success(), "failed: {:?}", result.failed);

    let state = engine.provider().get_state().await.unwrap();
    let lb_dns = state
        .get("load-balancer:wordpress-prod-lb")
        .and_then(|s| s.attribute_string("dns_name"))
        .unwrap();
    let outputs = engine.resolve_outputs(&deployment).await.unwrap();
    assert_eq!(outputs["edge_target"], lb_dns);
}

#[tokio::test]
async fn test_failure_stops_remaining_waves() {
    let dir = tempfile::tempdir().unwrap();
    let config = DeploymentConfig::new("wordpress", "prod", "example.com");
    let deployment = assemble(&context("prod"), &config, &credentials()).unwrap();
    let engine = Engine::new(provider(&dir).fail_on("database"), fast_options());

    let plan = engine.plan(&deployment.stack).await.unwrap();
    let result = engine.apply(&deployment.stack, &plan).await.unwrap();

    let failure = result.first_failure().unwrap();
    assert_eq!(failure.action_id, "create-database:wordpress-prod-database");
    assert!(!result.skipped.is_empty());
    assert!(
        result
            .skipped
            .iter()
            .any(|s| s.action_id == "create-launch-template:wordpress-prod-launch-template")
    );

    let state = engine.provider().get_state().await.unwrap();
    assert!(state.get("launch-template:wordpress-prod-launch-template").is_none());
}

#[tokio::test]
async fn test_overlapping_network_is_rejected_by_provider() {
    let dir = tempfile::tempdir().unwrap();
    let config = DeploymentConfig::new("wordpress", "prod", "example.com");

    let prod = assemble(&context("prod"), &config, &credentials()).unwrap();
    let engine = Engine::new(provider(&dir), fast_options());
    let plan = engine.plan(&prod.stack).await.unwrap();
    assert!(engine.apply(&prod.stack, &plan).await.unwrap().is_success());

    // 同じアドレス空間の別環境
    let mut staging_config = DeploymentConfig::new("wordpress", "staging", "staging.example.com");
    staging_config.network = config.network.clone();
    let staging_ctx = DeploymentContext::new(
        "wordpress",
        "staging",
        "staging.example.com",
        "123456789012",
        "us-east-1",
    );
    let staging = assemble(&staging_ctx, &staging_config, &credentials()).unwrap();
    let plan = engine.plan(&staging.stack).await.unwrap();
    let result = engine.apply(&staging.stack, &plan).await.unwrap();
    assert_eq!(result.failed.len(), 1);
    assert_eq!(
        result.failed[0].action_id,
        "create-vpc:wordpress-staging-network"
    );
}

#[tokio::test]
async fn test_public_database_is_rejected_before_any_provider_call() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = DeploymentConfig::new("wordpress", "prod", "example.com");
    config.database.publicly_accessible = true;

    let err = assemble(&context("prod"), &config, &credentials()).unwrap_err();
    assert!(matches!(err, StackError::PubliclyAccessibleDatabase(_)));
    assert!(err.is_declaration_error());

    // プロバイダーには何も残らない
    let state = provider(&dir).get_state().await.unwrap();
    assert!(state.is_empty());
    assert!(!dir.path().join(".webstack").exists());
}

#[tokio::test]
async fn test_destroy_removes_everything() {
    let dir = tempfile::tempdir().unwrap();
    let config = DeploymentConfig::new("wordpress", "prod", "example.com");
    let deployment = assemble(&context("prod"), &config, &credentials()).unwrap();
    let engine = Engine::new(provider(&dir), fast_options());

    let plan = engine.plan(&deployment.stack).await.unwrap();
    engine.apply(&deployment.stack, &plan).await.unwrap();

    let result = engine.destroy(&deployment.stack).await.unwrap();
    assert!(result.is_success());
    assert_eq!(result.succeeded.len(), deployment.stack.len());
    assert!(engine.provider().get_state().await.unwrap().is_empty());
}
