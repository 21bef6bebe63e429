//! Persistent resource state
//!
//! A provider keeps what it has created in `.webstack/state.json`. The
//! provisioning core only ever reads this through [`CloudProvider::get_state`];
//! writing is left to provider implementations.
//!
//! [`CloudProvider::get_state`]: crate::CloudProvider::get_state

use crate::error::{CloudError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".webstack";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const STATE_TMP: &str = "state.json.tmp";
const LOCK_FILE: &str = "lock.json";

/// A lock older than this is assumed to belong to a crashed process
const LOCK_TTL_MINUTES: i64 = 60;

/// Contents of the state file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalState {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    /// Keyed by `type:id`
    pub resources: BTreeMap<String, ResourceState>,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
        }
    }
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a ResourceState)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, s)| s.resource_type == resource_type)
    }

    pub fn set_resource(&mut self, key: String, state: ResourceState) {
        self.resources.insert(key, state);
        self.updated_at = Utc::now();
    }

    pub fn remove_resource(&mut self, key: &str) -> Option<ResourceState> {
        let removed = self.resources.remove(key);
        if removed.is_some() {
            self.updated_at = Utc::now();
        }
        removed
    }

    pub fn get_resource(&self, key: &str) -> Option<&ResourceState> {
        self.resources.get(key)
    }

    pub fn to_provider_state(&self) -> ProviderState {
        ProviderState {
            resources: self.resources.clone(),
        }
    }
}

/// Read-only view of what a provider currently holds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderState {
    pub resources: BTreeMap<String, ResourceState>,
}

impl ProviderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: String, state: ResourceState) {
        self.resources.insert(key, state);
    }

    pub fn get(&self, key: &str) -> Option<&ResourceState> {
        self.resources.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<ResourceState> {
        self.resources.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ResourceState)> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// One provisioned resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    pub id: String,
    pub resource_type: String,
    pub status: ResourceStatus,

    /// Values other resources may reference (endpoint address, ARN, DNS name)
    pub attributes: BTreeMap<String, serde_json::Value>,

    /// Declaration the resource was created from, secrets removed
    #[serde(default)]
    pub config: serde_json::Value,

    /// Fingerprint of the unresolved declaration, compared on plan
    #[serde(default)]
    pub fingerprint: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            status: ResourceStatus::Unknown,
            attributes: BTreeMap::new(),
            config: serde_json::Value::Null,
            fingerprint: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.attributes.insert(key.into(), value);
        self.updated_at = Utc::now();
    }

    pub fn get_attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Attribute as the text substituted into a dependent declaration
    pub fn attribute_string(&self, key: &str) -> Option<String> {
        match self.attributes.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn key(&self) -> String {
        format!("{}:{}", self.resource_type, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Creating,
    /// Exists and its attributes are resolved
    Available,
    /// Exists but waits on an external validation such as a DNS record
    PendingValidation,
    Deleting,
    Deleted,
    Error,
    Unknown,
}

impl ResourceStatus {
    /// Whether dependents may consume this resource's attributes
    pub fn is_ready(&self) -> bool {
        matches!(self, ResourceStatus::Available)
    }

    fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Creating => "creating",
            ResourceStatus::Available => "available",
            ResourceStatus::PendingValidation => "pending-validation",
            ResourceStatus::Deleting => "deleting",
            ResourceStatus::Deleted => "deleted",
            ResourceStatus::Error => "error",
            ResourceStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reads and writes the state directory of one project
pub struct StateManager {
    dir: PathBuf,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            dir: project_root.as_ref().join(STATE_DIR),
        }
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    pub async fn load(&self) -> Result<GlobalState> {
        let content = match fs::read_to_string(self.state_path()).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(GlobalState::new()),
            Err(e) => return Err(e.into()),
        };

        let state: GlobalState = serde_json::from_str(&content)?;
        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "state file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }
        Ok(state)
    }

    /// Write the state through a temporary file, keeping the previous one as a backup
    pub async fn save(&self, state: &GlobalState) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.state_path();
        let tmp = self.dir.join(STATE_TMP);
        fs::write(&tmp, serde_json::to_vec_pretty(state)?).await?;

        if fs::try_exists(&path).await? {
            fs::copy(&path, self.dir.join(STATE_BACKUP)).await?;
        }
        fs::rename(&tmp, &path).await?;

        tracing::debug!(resources = state.resources.len(), "Saved state");
        Ok(())
    }

    /// Take the lock file, failing if another process holds a fresh lock
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(LOCK_FILE);

        match self.create_lock_file(&path).await {
            Err(CloudError::Io(e)) if e.kind() == ErrorKind::AlreadyExists => {
                let holder: LockInfo = serde_json::from_slice(&fs::read(&path).await?)?;
                if Utc::now() - holder.acquired_at < Duration::minutes(LOCK_TTL_MINUTES) {
                    return Err(CloudError::LockError(format!(
                        "state is locked by {} (pid {}) since {}",
                        holder.host, holder.pid, holder.acquired_at
                    )));
                }
                tracing::warn!(host = %holder.host, pid = holder.pid, "Removing stale state lock");
                fs::remove_file(&path).await?;
                self.create_lock_file(&path).await?;
            }
            other => other?,
        }

        Ok(StateLock { path: Some(path) })
    }

    async fn create_lock_file(&self, path: &Path) -> Result<()> {
        let info = LockInfo {
            host: std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string()),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        tokio::io::AsyncWriteExt::write_all(&mut file, &serde_json::to_vec(&info)?).await?;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    host: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// Held lock; removed on release or drop
pub struct StateLock {
    path: Option<PathBuf>,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        if let Some(path) = self.path.take() {
            match fs::remove_file(&path).await {
                Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_state_save_load() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut state = GlobalState::new();
        state.set_resource(
            "database:wordpress-prod-database".to_string(),
            ResourceState::new("wordpress-prod-database", "database")
                .with_status(ResourceStatus::Available)
                .with_attribute(
                    "endpoint_address",
                    serde_json::json!("wordpress-prod-database.abc.us-east-1.rds.amazonaws.com"),
                ),
        );
        manager.save(&state).await.unwrap();

        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.resources.len(), 1);
        let db = loaded
            .get_resource("database:wordpress-prod-database")
            .unwrap();
        assert_eq!(db.status, ResourceStatus::Available);
        assert!(
            db.attribute_string("endpoint_address")
                .unwrap()
                .ends_with(".rds.amazonaws.com")
        );
        assert!(!temp_dir.path().join(".webstack/state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_state_is_empty() {
        let temp_dir = tempdir().unwrap();
        let state = StateManager::new(temp_dir.path()).load().await.unwrap();
        assert!(state.resources.is_empty());
        assert!(!temp_dir.path().join(".webstack").exists());
    }

    #[tokio::test]
    async fn test_newer_state_version_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());
        let mut state = GlobalState::new();
        state.version = STATE_VERSION + 1;
        manager.save(&state).await.unwrap();

        assert!(matches!(
            manager.load().await,
            Err(CloudError::StateError(_))
        ));
    }

    #[tokio::test]
    async fn test_save_keeps_backup() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        manager.save(&GlobalState::new()).await.unwrap();
        manager.save(&GlobalState::new()).await.unwrap();

        assert!(temp_dir.path().join(".webstack/state.json.backup").exists());
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let lock = manager.acquire_lock().await.unwrap();
        assert!(matches!(
            manager.acquire_lock().await,
            Err(CloudError::LockError(_))
        ));

        lock.release().await.unwrap();
        let again = manager.acquire_lock().await.unwrap();
        drop(again);
        assert!(!temp_dir.path().join(".webstack/lock.json").exists());
    }

    #[tokio::test]
    async fn test_stale_lock_is_replaced() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());
        let stale = LockInfo {
            host: "old-host".to_string(),
            pid: 1,
            acquired_at: Utc::now() - Duration::hours(2),
        };
        std::fs::create_dir_all(temp_dir.path().join(".webstack")).unwrap();
        std::fs::write(
            temp_dir.path().join(".webstack/lock.json"),
            serde_json::to_vec(&stale).unwrap(),
        )
        .unwrap();

        let lock = manager.acquire_lock().await.unwrap();
        lock.release().await.unwrap();
    }

    #[test]
    fn test_resources_of_type() {
        let mut state = GlobalState::new();
        for (ty, id) in [("vpc", "a"), ("subnet", "a-public-1"), ("vpc", "b")] {
            let resource = ResourceState::new(id, ty);
            state.set_resource(resource.key(), resource);
        }
        let vpcs: Vec<&String> = state.resources_of_type("vpc").map(|(k, _)| k).collect();
        assert_eq!(vpcs, vec!["vpc:a", "vpc:b"]);
    }

    #[test]
    fn test_attribute_string() {
        let state = ResourceState::new("db", "database")
            .with_attribute("endpoint_port", serde_json::json!(3306))
            .with_attribute("endpoint_address", serde_json::json!("db.internal"));
        assert_eq!(state.attribute_string("endpoint_port").as_deref(), Some("3306"));
        assert_eq!(
            state.attribute_string("endpoint_address").as_deref(),
            Some("db.internal")
        );
        assert_eq!(state.attribute_string("missing"), None);
    }

    #[test]
    fn test_status_readiness() {
        assert!(ResourceStatus::Available.is_ready());
        assert!(!ResourceStatus::PendingValidation.is_ready());
        assert_eq!(
            ResourceStatus::PendingValidation.to_string(),
            "pending-validation"
        );
    }
}
