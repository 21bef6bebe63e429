//! Local simulated provider for webstack
//!
//! This crate implements the CloudProvider trait without talking to any
//! remote API. It stands in for the real declarative provider so that the
//! whole plan/apply cycle can run on a developer machine and in tests.
//!
//! # Features
//!
//! - State persisted in `<root>/.webstack/state.json` through `StateManager`
//! - Fabricated post-creation attributes (ids, ARNs, endpoints, DNS names)
//! - Certificates that stay pending until their validating zone exists
//! - Failure injection per resource type
//!
//! # Example
//!
//! ```ignore
//! use webstack_cloud::CloudProvider;
//! use webstack_cloud_local::LocalProvider;
//!
//! let provider = LocalProvider::new(".", "123456789012", "us-east-1");
//!
//! let auth = provider.check_auth().await?;
//! let state = provider.get_state().await?;
//! ```

pub mod attributes;
pub mod error;
pub mod provider;

pub use error::{LocalError, Result};
pub use provider::LocalProvider;
