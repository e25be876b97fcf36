//! Reconciliation of a spec's fleet against the cluster.

pub mod delete;
pub mod deploy;
pub mod status;

use crate::cluster::ClusterError;
use crate::config::resolver::ResolutionError;
use crate::manifests::TemplateError;
use strum::Display;
use thiserror::Error;
use vauto_api::ResourceKind;

/// Failure of one instance. Never aborts the rest of the fleet.
#[derive(Debug, Error)]
pub enum InstanceError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: ResourceKind, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ResourceState {
    Planned,
    Applying,
    Applied,
    SkipExists,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceOutcome {
    pub kind: ResourceKind,
    pub name: String,
    pub state: ResourceState,
    pub message: Option<String>,
}

impl ResourceOutcome {
    fn new<N: Into<String>>(kind: ResourceKind, name: N, state: ResourceState) -> Self {
        Self {
            kind,
            name: name.into(),
            state,
            message: None,
        }
    }
}
