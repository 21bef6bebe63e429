//! webstack Cloud Provider Abstraction
//!
//! This crate defines the seam between the webstack provisioning core and the
//! declarative resource provider that actually creates infrastructure. The
//! core never talks to a remote API directly: it hands [`ResourceConfig`]
//! declarations to a [`CloudProvider`] and reads back [`ResourceState`]
//! containing the resolved attributes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  webstack CLI                    │
//! │             (webstack plan/up/down)              │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               webstack-core                      │
//! │   provisioners → Stack (graph) → Engine          │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               webstack-cloud                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │          Provider Abstraction             │   │
//! │  │  trait CloudProvider { ... }              │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │ Plan/Actions │  │  State Mgmt  │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────┐
//! │ cloud-local   │
//! │   provider    │
//! └───────────────┘
//! ```

pub mod action;
pub mod error;
pub mod provider;
pub mod state;

pub use action::{Action, ActionResult, ActionType, ApplyResult, Plan, PlanSummary, SkippedAction};
pub use error::{CloudError, Result};
pub use provider::{AuthStatus, CloudProvider, ResourceConfig, resource_key};
pub use state::{
    GlobalState, ProviderState, ResourceState, ResourceStatus, StateLock, StateManager,
};
