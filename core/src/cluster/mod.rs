pub mod kube;

pub use self::kube::KubeCluster;

use crate::manifests::ManagedResource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use thiserror::Error;
use vauto_api::ResourceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Create,
    List,
    Delete,
    DeleteCollection,
    ListEvents,
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let verb = match self {
            Operation::Get => "get",
            Operation::Create => "create",
            Operation::List => "list",
            Operation::Delete => "delete",
            Operation::DeleteCollection => "delete collection of",
            Operation::ListEvents => "list events in",
        };
        f.write_str(verb)
    }
}

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("Failed to {operation} {kind} {name}: {reason}")]
    Operation {
        operation: Operation,
        kind: ResourceKind,
        name: String,
        reason: String,
    },
}

impl ClusterError {
    pub fn operation<N: Into<String>, R: Display>(
        operation: Operation,
        kind: ResourceKind,
        name: N,
        reason: R,
    ) -> Self {
        Self::Operation {
            operation,
            kind,
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// The parts of a cluster object the reconciler reasons about.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSummary {
    pub kind: ResourceKind,
    pub name: String,
    pub namespace: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub created: Option<DateTime<Utc>>,
    pub status: Value,
}

impl ResourceSummary {
    pub fn new<N: Into<String>>(kind: ResourceKind, name: N) -> Self {
        Self {
            kind,
            name: name.into(),
            namespace: None,
            labels: BTreeMap::new(),
            created: None,
            status: Value::Null,
        }
    }

    /// A string field of the status block, by path.
    pub fn status_str(&self, path: &[&str]) -> Option<&str> {
        path.iter()
            .try_fold(&self.status, |value, key| value.get(*key))
            .and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub event_type: String,
    pub reason: String,
    pub message: String,
    pub object: String,
    pub count: i32,
    pub timestamp: Option<DateTime<Utc>>,
}

impl EventRecord {
    pub fn is_warning(&self) -> bool {
        self.event_type == "Warning"
    }
}

/// Operations the reconciler needs from the cluster. Each call is
/// independent; nothing is transactional across calls.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn create(&self, resource: &ManagedResource) -> Result<CreateOutcome, ClusterError>;

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        selector: Option<&str>,
    ) -> Result<Vec<ResourceSummary>, ClusterError>;

    async fn delete(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<DeleteOutcome, ClusterError>;

    async fn delete_collection(
        &self,
        kind: ResourceKind,
        namespace: &str,
        selector: &str,
    ) -> Result<(), ClusterError>;

    /// Events of a namespace, oldest first.
    async fn list_events(&self, namespace: &str) -> Result<Vec<EventRecord>, ClusterError>;

    /// Creates the namespace when it does not exist yet.
    async fn ensure_namespace(&self, namespace: &str) -> Result<(), ClusterError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_str() {
        let mut summary = ResourceSummary::new(ResourceKind::VirtualMachineInstance, "web-01");
        summary.status = json!({"phase": "Running", "interfaces": [{"ipAddress": "10.0.0.1"}]});
        assert_eq!(summary.status_str(&["phase"]), Some("Running"));
        assert_eq!(summary.status_str(&["missing"]), None);
        assert_eq!(summary.status_str(&["interfaces"]), None);
    }

    #[test]
    fn test_operation_error_message() {
        let err = ClusterError::operation(
            Operation::Create,
            ResourceKind::DataVolume,
            "web-01-rootdisk",
            "quota exceeded",
        );
        assert_eq!(
            err.to_string(),
            "Failed to create DataVolume web-01-rootdisk: quota exceeded"
        );
    }
}
