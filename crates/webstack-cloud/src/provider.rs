//! Cloud provider trait definition

use crate::error::Result;
use crate::state::{ProviderState, ResourceState};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Declarative resource provider
///
/// A provider turns a resource declaration into a real resource and exposes
/// the attributes that only exist after creation (ids, addresses, ARNs).
/// Implementations own their state store; callers only read it back through
/// [`CloudProvider::get_state`].
///
/// Providers must not retry: a rejected declaration is returned as an error
/// and the caller decides what to do with the rest of the plan.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Short name used in logs (e.g. "local")
    fn name(&self) -> &str;

    fn display_name(&self) -> &str;

    /// Check if the provider is properly configured and authenticated
    async fn check_auth(&self) -> Result<AuthStatus>;

    /// Get the current state of all resources managed by this provider
    async fn get_state(&self) -> Result<ProviderState>;

    /// Create a resource from a fully resolved declaration
    async fn create(&self, resource: &ResourceConfig) -> Result<ResourceState>;

    /// Replace the declaration of an existing resource
    async fn update(&self, resource: &ResourceConfig) -> Result<ResourceState>;

    /// Re-read a resource, e.g. to observe a pending validation completing
    async fn refresh(&self, key: &str) -> Result<ResourceState>;

    /// Destroy a specific resource by key (`type:id`)
    async fn destroy(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    pub authenticated: bool,

    pub account_info: Option<String>,

    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// Declaration of a single resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Resource type (e.g., "vpc", "database", "load-balancer")
    pub resource_type: String,

    /// Resource identifier, unique per type
    pub id: String,

    /// Resource-specific configuration
    pub config: serde_json::Value,

    /// Keys (`type:id`) of resources that must exist first
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Fingerprint of the declaration before attribute resolution
    #[serde(default)]
    pub fingerprint: Option<String>,
}

impl ResourceConfig {
    pub fn new(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        config: serde_json::Value,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            config,
            depends_on: Vec::new(),
            fingerprint: None,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    /// `type:id`
    pub fn key(&self) -> String {
        resource_key(&self.resource_type, &self.id)
    }

    /// Get a configuration value as a specific type
    pub fn get_config<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.config.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Build a resource key from its type and id
pub fn resource_key(resource_type: &str, id: &str) -> String {
    format!("{}:{}", resource_type, id)
}
