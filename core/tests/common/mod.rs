//! Shared fixtures for the reconciler scenarios: an on-disk project and an
//! in-memory cluster.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::sync::{Mutex, Once};
use tempfile::TempDir;
use vauto_api::ResourceKind;
use vauto_core::cluster::{
    ClusterClient, ClusterError, CreateOutcome, DeleteOutcome, EventRecord, Operation,
    ResourceSummary,
};
use vauto_core::config::ProjectLayout;
use vauto_core::manifests::ManagedResource;

static INIT: Once = Once::new();

pub fn init_test_env() {
    INIT.call_once(|| {
        vauto_core::crypto::init_crypto();
    });
}

pub const PROJECT: &str = "opasnet";

pub const NETWORKS: &str = r"
networks:
  default:
    type: pod
  svc-net:
    type: multus
    bridge: br-svc
    ipam:
      type: whereabouts
      range: 10.10.0.0/24
      gateway: 10.10.0.1
  shared-net:
    type: multus
    nad_name: shared-net
    bridge: br-shared
    ipam:
      type: dhcp
";

pub const IMAGES: &str = r"
images:
  rhel9:
    url: http://images.example/rhel9.qcow2
";

pub const STORAGE: &str = r"
storage_profiles:
  fast:
    storage_class: ceph-rbd
    access_mode: ReadWriteOnce
";

/// A project directory holding the standard catalog and the given specs.
pub struct Project {
    dir: TempDir,
    pub layout: ProjectLayout,
}

impl Project {
    pub fn new(specs: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().unwrap();
        let layout = ProjectLayout::new(dir.path());

        let infrastructure = layout.infrastructure_dir(PROJECT);
        fs::create_dir_all(&infrastructure).unwrap();
        fs::write(infrastructure.join("networks.yaml"), NETWORKS).unwrap();
        fs::write(infrastructure.join("images.yaml"), IMAGES).unwrap();
        fs::write(infrastructure.join("storage.yaml"), STORAGE).unwrap();

        for (name, body) in specs {
            let path = layout.spec_path(PROJECT, name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, body).unwrap();
        }

        Self { dir, layout }
    }
}

#[derive(Debug, Clone)]
struct Stored {
    summary: ResourceSummary,
    object: Value,
}

/// In-memory cluster honoring equality label selectors.
#[derive(Default)]
pub struct FakeCluster {
    objects: Mutex<Vec<Stored>>,
    events: Mutex<Vec<EventRecord>>,
    namespaces: Mutex<Vec<String>>,
    failures: Mutex<HashSet<(Operation, ResourceKind)>>,
}

fn selector_matches(selector: &str, labels: &BTreeMap<String, String>) -> bool {
    selector.split(',').all(|term| match term.split_once('=') {
        Some((key, value)) => labels.get(key).is_some_and(|v| v == value),
        None => false,
    })
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `operation` on `kind` fail.
    pub fn fail(&self, operation: Operation, kind: ResourceKind) {
        self.failures.lock().unwrap().insert((operation, kind));
    }

    /// Adds an object that was not created through this tool.
    pub fn seed(&self, summary: ResourceSummary) {
        self.objects.lock().unwrap().push(Stored {
            summary,
            object: Value::Null,
        });
    }

    pub fn seed_event(&self, event: EventRecord) {
        self.events.lock().unwrap().push(event);
    }

    pub fn names(&self, kind: ResourceKind) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .filter(|stored| stored.summary.kind == kind)
            .map(|stored| stored.summary.name.clone())
            .collect()
    }

    pub fn summary(&self, kind: ResourceKind, name: &str) -> Option<ResourceSummary> {
        self.find(kind, name).map(|stored| stored.summary)
    }

    /// The full document a resource was created from.
    pub fn object(&self, kind: ResourceKind, name: &str) -> Option<Value> {
        self.find(kind, name).map(|stored| stored.object)
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.namespaces.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    fn find(&self, kind: ResourceKind, name: &str) -> Option<Stored> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .find(|stored| stored.summary.kind == kind && stored.summary.name == name)
            .cloned()
    }

    fn check(&self, operation: Operation, kind: ResourceKind, name: &str) -> Result<(), ClusterError> {
        if self.failures.lock().unwrap().contains(&(operation, kind)) {
            return Err(ClusterError::operation(operation, kind, name, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn create(&self, resource: &ManagedResource) -> Result<CreateOutcome, ClusterError> {
        self.check(Operation::Create, resource.kind, resource.name())?;
        if self.find(resource.kind, resource.name()).is_some() {
            return Ok(CreateOutcome::AlreadyExists);
        }

        let mut summary = ResourceSummary::new(resource.kind, resource.name());
        summary.namespace = resource.namespace().map(str::to_string);
        summary.labels = resource.labels();
        self.objects.lock().unwrap().push(Stored {
            summary,
            object: serde_json::to_value(&resource.object).unwrap(),
        });
        Ok(CreateOutcome::Created)
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        selector: Option<&str>,
    ) -> Result<Vec<ResourceSummary>, ClusterError> {
        self.check(Operation::List, kind, namespace)?;
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|stored| stored.summary.kind == kind)
            .filter(|stored| selector.is_none_or(|s| selector_matches(s, &stored.summary.labels)))
            .map(|stored| stored.summary.clone())
            .collect())
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        _namespace: &str,
        name: &str,
    ) -> Result<DeleteOutcome, ClusterError> {
        self.check(Operation::Delete, kind, name)?;
        let mut objects = self.objects.lock().unwrap();
        let before = objects.len();
        objects.retain(|stored| !(stored.summary.kind == kind && stored.summary.name == name));
        Ok(if objects.len() < before {
            DeleteOutcome::Deleted
        } else {
            DeleteOutcome::NotFound
        })
    }

    async fn delete_collection(
        &self,
        kind: ResourceKind,
        _namespace: &str,
        selector: &str,
    ) -> Result<(), ClusterError> {
        self.check(Operation::DeleteCollection, kind, selector)?;
        self.objects.lock().unwrap().retain(|stored| {
            !(stored.summary.kind == kind && selector_matches(selector, &stored.summary.labels))
        });
        Ok(())
    }

    async fn list_events(&self, namespace: &str) -> Result<Vec<EventRecord>, ClusterError> {
        self.check(Operation::ListEvents, ResourceKind::Namespace, namespace)?;
        Ok(self.events.lock().unwrap().clone())
    }

    async fn ensure_namespace(&self, namespace: &str) -> Result<(), ClusterError> {
        self.check(Operation::Create, ResourceKind::Namespace, namespace)?;
        let mut namespaces = self.namespaces.lock().unwrap();
        if !namespaces.iter().any(|ns| ns == namespace) {
            namespaces.push(namespace.to_string());
        }
        Ok(())
    }
}
