//! Local provider error types

use thiserror::Error;
use webstack_cloud::CloudError;

#[derive(Error, Debug)]
pub enum LocalError {
    #[error("{resource} still contains an unresolved reference: {token}")]
    UnresolvedToken { resource: String, token: String },

    #[error("A {resource_type} named '{name}' already exists")]
    DuplicateName { resource_type: String, name: String },

    #[error("VPC CIDR {cidr} overlaps {existing_cidr} of {existing}")]
    OverlappingCidr {
        cidr: String,
        existing: String,
        existing_cidr: String,
    },

    #[error("Invalid CIDR '{0}'")]
    InvalidCidr(String),

    #[error("{resource} is missing required field '{field}'")]
    MissingField { resource: String, field: String },

    #[error("Injected failure for {0}")]
    InjectedFailure(String),

    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),
}

impl From<LocalError> for CloudError {
    fn from(err: LocalError) -> Self {
        match err {
            LocalError::UnresolvedToken { resource, token } => CloudError::UnresolvedReference {
                resource,
                reference: token,
            },
            LocalError::DuplicateName { .. } => CloudError::ResourceAlreadyExists(err.to_string()),
            LocalError::OverlappingCidr { .. }
            | LocalError::InvalidCidr(_)
            | LocalError::MissingField { .. } => CloudError::InvalidConfig(err.to_string()),
            LocalError::InjectedFailure(_) => CloudError::ApiError(err.to_string()),
            LocalError::Cloud(inner) => inner,
        }
    }
}

pub type Result<T> = std::result::Result<T, LocalError>;
