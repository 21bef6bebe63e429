//! Local provider implementation

use crate::attributes::{fabricate, physical_name_field, redact_secrets};
use crate::error::{LocalError, Result};
use async_trait::async_trait;
use ipnetwork::Ipv4Network;
use regex::Regex;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::sync::Mutex;
use webstack_cloud::{
    AuthStatus, CloudError, CloudProvider, GlobalState, ProviderState, ResourceConfig,
    ResourceState, ResourceStatus, StateManager,
};

static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{[a-z][a-z0-9-]*:[A-Za-z0-9_-]+\.[a-z0-9_]+\}")
        .expect("token pattern is a valid regex")
});

/// Refreshes a pending certificate needs before it is issued
const DEFAULT_VALIDATION_REFRESHES: u32 = 1;

/// Attribute counting how often a pending certificate was re-read
const VALIDATION_CHECKS: &str = "validation_checks";

/// Simulated provider persisting its state under `<root>/.webstack/`
pub struct LocalProvider {
    root: PathBuf,
    store: StateManager,
    account: String,
    region: String,
    validation_refreshes: u32,
    fail_on: HashSet<String>,
    gate: Mutex<()>,
}

impl LocalProvider {
    pub fn new(root: impl AsRef<Path>, account: impl Into<String>, region: impl Into<String>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            store: StateManager::new(&root),
            root,
            account: account.into(),
            region: region.into(),
            validation_refreshes: DEFAULT_VALIDATION_REFRESHES,
            fail_on: HashSet::new(),
            gate: Mutex::new(()),
        }
    }

    /// Number of refreshes after which a pending certificate becomes available
    pub fn with_validation_refreshes(mut self, refreshes: u32) -> Self {
        self.validation_refreshes = refreshes;
        self
    }

    /// Make every create/update of the given resource type fail
    pub fn fail_on(mut self, resource_type: impl Into<String>) -> Self {
        self.fail_on.insert(resource_type.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_path(&self) -> PathBuf {
        self.store.state_path()
    }

    /// Load, mutate and persist the state under both the in-process gate and the file lock
    async fn with_state<T, F>(&self, f: F) -> std::result::Result<T, CloudError>
    where
        F: FnOnce(&mut GlobalState) -> Result<T>,
    {
        let _guard = self.gate.lock().await;
        let lock = self.store.acquire_lock().await?;
        let mut state = self.store.load().await?;

        let outcome = f(&mut state);
        if outcome.is_ok() {
            self.store.save(&state).await?;
        }
        lock.release().await?;
        outcome.map_err(CloudError::from)
    }

    fn check_declaration(&self, state: &GlobalState, resource: &ResourceConfig) -> Result<()> {
        if self.fail_on.contains(&resource.resource_type) {
            return Err(LocalError::InjectedFailure(resource.key()));
        }
        if let Some(token) = find_token(&resource.config) {
            return Err(LocalError::UnresolvedToken {
                resource: resource.key(),
                token,
            });
        }
        check_unique_name(state, resource)?;
        if resource.resource_type == "vpc" {
            check_cidr_overlap(state, resource)?;
        }
        Ok(())
    }

    fn initial_status(&self, state: &GlobalState, resource: &ResourceConfig) -> ResourceStatus {
        if resource.resource_type == "certificate"
            && !(self.validation_refreshes == 0 && validating_zone_exists(state, &resource.config))
        {
            ResourceStatus::PendingValidation
        } else {
            ResourceStatus::Available
        }
    }
}

/// First attribute token left in a declaration
fn find_token(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => TOKEN_PATTERN.find(s).map(|m| m.as_str().to_string()),
        Value::Array(items) => items.iter().find_map(find_token),
        Value::Object(map) => map.values().find_map(find_token),
        _ => None,
    }
}

fn check_unique_name(state: &GlobalState, resource: &ResourceConfig) -> Result<()> {
    let Some(field) = physical_name_field(&resource.resource_type) else {
        return Ok(());
    };
    let Some(name) = resource.get_config::<String>(field) else {
        return Ok(());
    };
    let key = resource.key();
    let taken = state
        .resources_of_type(&resource.resource_type)
        .into_iter()
        .any(|(k, existing)| {
            *k != key && existing.config.get(field).and_then(|v| v.as_str()) == Some(name.as_str())
        });
    if taken {
        return Err(LocalError::DuplicateName {
            resource_type: resource.resource_type.clone(),
            name,
        });
    }
    Ok(())
}

fn check_cidr_overlap(state: &GlobalState, resource: &ResourceConfig) -> Result<()> {
    let cidr_str = resource
        .get_config::<String>("cidr")
        .ok_or_else(|| LocalError::MissingField {
            resource: resource.key(),
            field: "cidr".to_string(),
        })?;
    let cidr: Ipv4Network = cidr_str
        .parse()
        .map_err(|_| LocalError::InvalidCidr(cidr_str.clone()))?;

    let key = resource.key();
    for (existing_key, existing) in state.resources_of_type("vpc") {
        if *existing_key == key {
            continue;
        }
        let Some(other) = existing
            .config
            .get("cidr")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<Ipv4Network>().ok())
        else {
            continue;
        };
        if cidr.contains(other.network()) || other.contains(cidr.network()) {
            return Err(LocalError::OverlappingCidr {
                cidr: cidr_str,
                existing: existing_key.clone(),
                existing_cidr: other.to_string(),
            });
        }
    }
    Ok(())
}

fn validating_zone_exists(state: &GlobalState, config: &Value) -> bool {
    let Some(zone_id) = config
        .get("validation")
        .and_then(|v| v.get("zone_id"))
        .and_then(|v| v.as_str())
    else {
        return false;
    };
    state
        .resources_of_type("hosted-zone")
        .into_iter()
        .any(|(_, zone)| zone.attribute_string("zone_id").as_deref() == Some(zone_id))
}

#[async_trait]
impl CloudProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn display_name(&self) -> &str {
        "ローカルシミュレーター"
    }

    async fn check_auth(&self) -> webstack_cloud::Result<AuthStatus> {
        if self.account.trim().is_empty() || self.region.trim().is_empty() {
            return Ok(AuthStatus::failed("account and region must be set"));
        }
        Ok(AuthStatus::ok(format!("{} ({})", self.account, self.region)))
    }

    async fn get_state(&self) -> webstack_cloud::Result<ProviderState> {
        let _guard = self.gate.lock().await;
        Ok(self.store.load().await?.to_provider_state())
    }

    async fn create(&self, resource: &ResourceConfig) -> webstack_cloud::Result<ResourceState> {
        let key = resource.key();
        tracing::info!(resource = %key, "Creating resource");

        self.with_state(|state| {
            if state.get_resource(&key).is_some() {
                return Err(CloudError::ResourceAlreadyExists(key.clone()).into());
            }
            self.check_declaration(state, resource)?;

            let mut created = ResourceState::new(&resource.id, &resource.resource_type)
                .with_status(self.initial_status(state, resource));
            for (name, value) in fabricate(resource, &self.account, &self.region) {
                created.set_attribute(name, value);
            }
            if created.status == ResourceStatus::PendingValidation {
                created.set_attribute(VALIDATION_CHECKS, json!(0));
            }
            created.config = redact_secrets(&resource.config);
            created.fingerprint = resource.fingerprint.clone();

            tracing::debug!(resource = %key, status = %created.status, "Resource created");
            state.set_resource(key.clone(), created.clone());
            Ok(created)
        })
        .await
    }

    async fn update(&self, resource: &ResourceConfig) -> webstack_cloud::Result<ResourceState> {
        let key = resource.key();
        tracing::info!(resource = %key, "Updating resource");

        self.with_state(|state| {
            let mut updated = state
                .get_resource(&key)
                .cloned()
                .ok_or_else(|| CloudError::ResourceNotFound(key.clone()))?;
            self.check_declaration(state, resource)?;

            if updated.status == ResourceStatus::Error {
                updated.status = self.initial_status(state, resource);
            }
            updated.config = redact_secrets(&resource.config);
            updated.fingerprint = resource.fingerprint.clone();
            updated.updated_at = chrono::Utc::now();

            state.set_resource(key.clone(), updated.clone());
            Ok(updated)
        })
        .await
    }

    async fn refresh(&self, key: &str) -> webstack_cloud::Result<ResourceState> {
        self.with_state(|state| {
            let mut current = state
                .get_resource(key)
                .cloned()
                .ok_or_else(|| CloudError::ResourceNotFound(key.to_string()))?;

            if current.status == ResourceStatus::PendingValidation {
                let checks = current.get_attribute::<u32>(VALIDATION_CHECKS).unwrap_or(0) + 1;
                current.set_attribute(VALIDATION_CHECKS, json!(checks));
                if checks >= self.validation_refreshes
                    && validating_zone_exists(state, &current.config)
                {
                    current.status = ResourceStatus::Available;
                    tracing::info!(resource = %key, checks, "Validation completed");
                }
                state.set_resource(key.to_string(), current.clone());
            }
            Ok(current)
        })
        .await
    }

    async fn destroy(&self, key: &str) -> webstack_cloud::Result<()> {
        tracing::info!(resource = %key, "Destroying resource");
        self.with_state(|state| {
            state
                .remove_resource(key)
                .map(|_| ())
                .ok_or_else(|| CloudError::ResourceNotFound(key.to_string()).into())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(dir: &tempfile::TempDir) -> LocalProvider {
        LocalProvider::new(dir.path(), "123456789012", "us-east-1")
    }

    fn vpc(id: &str, cidr: &str) -> ResourceConfig {
        ResourceConfig::new("vpc", id, json!({"name": id, "cidr": cidr}))
    }

    #[tokio::test]
    async fn test_create_persists_state() {
        let dir = tempfile::tempdir().unwrap();
        let created = provider(&dir).create(&vpc("net", "10.0.0.0/16")).await.unwrap();
        assert_eq!(created.status, ResourceStatus::Available);
        assert!(created.attribute_string("vpc_id").unwrap().starts_with("vpc-"));

        // 別インスタンスから読める
        let state = provider(&dir).get_state().await.unwrap();
        assert_eq!(state.len(), 1);
        assert!(state.get("vpc:net").is_some());
        assert!(dir.path().join(".webstack/state.json").exists());
    }

    #[tokio::test]
    async fn test_rejects_unresolved_token() {
        let dir = tempfile::tempdir().unwrap();
        let subnet = ResourceConfig::new(
            "subnet",
            "a",
            json!({"vpc_id": "${vpc:net.vpc_id}", "cidr": "10.0.0.0/24"}),
        );
        let err = provider(&dir).create(&subnet).await.unwrap_err();
        assert!(matches!(err, CloudError::UnresolvedReference { .. }));
        assert!(provider(&dir).get_state().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_duplicate_key_name() {
        let dir = tempfile::tempdir().unwrap();
        let p = provider(&dir);
        p.create(&ResourceConfig::new("key-pair", "a", json!({"key_name": "ops"})))
            .await
            .unwrap();
        let err = p
            .create(&ResourceConfig::new("key-pair", "b", json!({"key_name": "ops"})))
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::ResourceAlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_rejects_overlapping_vpc() {
        let dir = tempfile::tempdir().unwrap();
        let p = provider(&dir);
        p.create(&vpc("a", "10.0.0.0/16")).await.unwrap();
        p.create(&vpc("b", "10.1.0.0/16")).await.unwrap();
        let err = p.create(&vpc("c", "10.0.128.0/20")).await.unwrap_err();
        assert!(matches!(err, CloudError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_certificate_validation_needs_zone() {
        let dir = tempfile::tempdir().unwrap();
        let p = provider(&dir).with_validation_refreshes(2);

        let zone = p
            .create(&ResourceConfig::new("hosted-zone", "zone", json!({"zone_name": "example.com"})))
            .await
            .unwrap();
        let zone_id = zone.attribute_string("zone_id").unwrap();

        let cert = ResourceConfig::new(
            "certificate",
            "cert",
            json!({"domain_name": "example.com", "validation": {"method": "dns", "zone_id": zone_id}}),
        );
        let created = p.create(&cert).await.unwrap();
        assert_eq!(created.status, ResourceStatus::PendingValidation);

        let first = p.refresh("certificate:cert").await.unwrap();
        assert_eq!(first.status, ResourceStatus::PendingValidation);
        let second = p.refresh("certificate:cert").await.unwrap();
        assert_eq!(second.status, ResourceStatus::Available);
    }

    #[tokio::test]
    async fn test_certificate_without_zone_stays_pending() {
        let dir = tempfile::tempdir().unwrap();
        let p = provider(&dir);
        let cert = ResourceConfig::new(
            "certificate",
            "cert",
            json!({"validation": {"method": "dns", "zone_id": "ZMISSING"}}),
        );
        p.create(&cert).await.unwrap();
        for _ in 0..3 {
            let state = p.refresh("certificate:cert").await.unwrap();
            assert_eq!(state.status, ResourceStatus::PendingValidation);
        }
    }

    #[tokio::test]
    async fn test_fail_on_injects_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = provider(&dir).fail_on("vpc");
        let err = p.create(&vpc("net", "10.0.0.0/16")).await.unwrap_err();
        assert!(matches!(err, CloudError::ApiError(_)));
    }

    #[tokio::test]
    async fn test_password_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let db = ResourceConfig::new(
            "database",
            "db",
            json!({"identifier": "db", "master_password": "password#1", "port": 3306}),
        );
        provider(&dir).create(&db).await.unwrap();
        let raw = std::fs::read_to_string(dir.path().join(".webstack/state.json")).unwrap();
        assert!(!raw.contains("password#1"));
    }

    #[tokio::test]
    async fn test_update_and_destroy() {
        let dir = tempfile::tempdir().unwrap();
        let p = provider(&dir);
        let created = p.create(&vpc("net", "10.0.0.0/16")).await.unwrap();

        let updated = p
            .update(&vpc("net", "10.0.0.0/16").with_fingerprint("abc"))
            .await
            .unwrap();
        assert_eq!(updated.fingerprint.as_deref(), Some("abc"));
        assert_eq!(updated.attribute_string("vpc_id"), created.attribute_string("vpc_id"));

        p.destroy("vpc:net").await.unwrap();
        assert!(matches!(
            p.destroy("vpc:net").await,
            Err(CloudError::ResourceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_creates_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let p = provider(&dir);
        let subnets: Vec<ResourceConfig> = (0..4)
            .map(|i| ResourceConfig::new("subnet", format!("s{}", i), json!({"cidr": format!("10.0.{}.0/24", i)})))
            .collect();
        let results = create_all(&p, &subnets).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(p.get_state().await.unwrap().len(), 4);
    }

    async fn create_all(
        p: &LocalProvider,
        resources: &[ResourceConfig],
    ) -> Vec<webstack_cloud::Result<ResourceState>> {
        let (a, b, c, d) = tokio::join!(
            p.create(&resources[0]),
            p.create(&resources[1]),
            p.create(&resources[2]),
            p.create(&resources[3]),
        );
        vec![a, b, c, d]
    }
}
