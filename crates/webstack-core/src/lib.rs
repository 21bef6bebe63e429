//! webstack core
//!
//! WordPressホスティング環境（ネットワーク、データベース、ホストプール、
//! ロードバランサー、CDN/DNS）を宣言し、プロバイダーに適用します。

pub mod bootstrap;
pub mod compute;
pub mod context;
pub mod database;
pub mod deployment;
pub mod edge;
pub mod engine;
pub mod error;
pub mod keypair;
pub mod loader;
pub mod model;
pub mod network;
pub mod onepassword;
pub mod parser;
pub mod secret;
pub mod stack;
pub mod template;
pub mod token;

pub use bootstrap::{BootstrapParams, BootstrapScript, render_bootstrap_script};
pub use compute::{ComputeSpec, ComputeTier, LoadBalancer};
pub use context::DeploymentContext;
pub use database::{DatabaseCredentials, DatabaseInstance, DatabaseSpec};
pub use deployment::{Deployment, assemble};
pub use edge::{EdgeIdentity, EdgeRouting};
pub use engine::{Engine, EngineOptions};
pub use error::{Result, StackError};
pub use keypair::KeyMaterial;
pub use loader::{expand_config_file, load_config, load_config_from_path, project_dir};
pub use model::*;
pub use network::{NetworkBundle, NetworkSpec};
pub use parser::{parse_kdl_file, parse_kdl_string};
pub use secret::{Secret, SecretSource};
pub use stack::{ResourceRef, Stack, Synthesis};
pub use token::AttrRef;
