use crate::cluster::{
    ClusterClient, ClusterError, CreateOutcome, DeleteOutcome, EventRecord, Operation,
    ResourceSummary,
};
use crate::manifests::ManagedResource;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, Namespace};
use kube::api::{DeleteParams, DynamicObject, ListParams, ObjectMeta, PostParams};
use kube::{Api, Client};
use serde_json::Value;
use tracing::{debug, info};
use vauto_api::ResourceKind;

const CONFLICT: u16 = 409;
const NOT_FOUND: u16 = 404;

/// [`ClusterClient`] backed by the Kubernetes API, addressing every kind
/// dynamically so that no generated bindings for KubeVirt, CDI or Multus are
/// needed.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, kind: ResourceKind, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &kind.api_resource())
    }
}

fn api_code(err: &kube::Error) -> Option<u16> {
    match err {
        kube::Error::Api(response) => Some(response.code),
        _ => None,
    }
}

fn summarize(kind: ResourceKind, object: DynamicObject) -> ResourceSummary {
    let DynamicObject { metadata, data, .. } = object;
    ResourceSummary {
        kind,
        name: metadata.name.unwrap_or_default(),
        namespace: metadata.namespace,
        labels: metadata.labels.unwrap_or_default(),
        created: metadata.creation_timestamp.map(|ts| ts.0),
        status: data.get("status").cloned().unwrap_or(Value::Null),
    }
}

fn event_record(event: Event) -> EventRecord {
    let object = format!(
        "{}/{}",
        event.involved_object.kind.unwrap_or_default(),
        event.involved_object.name.unwrap_or_default()
    );
    let timestamp = event
        .last_timestamp
        .map(|ts| ts.0)
        .or_else(|| event.event_time.map(|ts| ts.0))
        .or_else(|| event.metadata.creation_timestamp.map(|ts| ts.0));

    EventRecord {
        event_type: event.type_.unwrap_or_else(|| "Normal".to_string()),
        reason: event.reason.unwrap_or_default(),
        message: event.message.unwrap_or_default(),
        object,
        count: event.count.unwrap_or(1),
        timestamp,
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn create(&self, resource: &ManagedResource) -> Result<CreateOutcome, ClusterError> {
        let namespace = resource.namespace().unwrap_or("default");
        match self
            .api(resource.kind, namespace)
            .create(&PostParams::default(), &resource.object)
            .await
        {
            Ok(_) => {
                debug!("Created {} {}/{}", resource.kind, namespace, resource.name());
                Ok(CreateOutcome::Created)
            }
            Err(err) if api_code(&err) == Some(CONFLICT) => Ok(CreateOutcome::AlreadyExists),
            Err(err) => Err(ClusterError::operation(
                Operation::Create,
                resource.kind,
                resource.name(),
                err,
            )),
        }
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        selector: Option<&str>,
    ) -> Result<Vec<ResourceSummary>, ClusterError> {
        let mut list_params = ListParams::default();
        if let Some(selector) = selector {
            list_params = list_params.labels(selector);
        }

        let objects = self
            .api(kind, namespace)
            .list(&list_params)
            .await
            .map_err(|err| ClusterError::operation(Operation::List, kind, namespace, err))?;

        Ok(objects
            .items
            .into_iter()
            .map(|object| summarize(kind, object))
            .collect())
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<DeleteOutcome, ClusterError> {
        match self
            .api(kind, namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(err) if api_code(&err) == Some(NOT_FOUND) => Ok(DeleteOutcome::NotFound),
            Err(err) => Err(ClusterError::operation(Operation::Delete, kind, name, err)),
        }
    }

    async fn delete_collection(
        &self,
        kind: ResourceKind,
        namespace: &str,
        selector: &str,
    ) -> Result<(), ClusterError> {
        self.api(kind, namespace)
            .delete_collection(&DeleteParams::default(), &ListParams::default().labels(selector))
            .await
            .map(|_| ())
            .map_err(|err| {
                ClusterError::operation(Operation::DeleteCollection, kind, selector, err)
            })
    }

    async fn list_events(&self, namespace: &str) -> Result<Vec<EventRecord>, ClusterError> {
        let events: Api<Event> = Api::namespaced(self.client.clone(), namespace);
        let mut records: Vec<EventRecord> = events
            .list(&ListParams::default())
            .await
            .map_err(|err| {
                ClusterError::operation(Operation::ListEvents, ResourceKind::Namespace, namespace, err)
            })?
            .items
            .into_iter()
            .map(event_record)
            .collect();

        records.sort_by_key(|record| record.timestamp);
        Ok(records)
    }

    async fn ensure_namespace(&self, namespace: &str) -> Result<(), ClusterError> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let existing = namespaces.get_opt(namespace).await.map_err(|err| {
            ClusterError::operation(Operation::Get, ResourceKind::Namespace, namespace, err)
        })?;
        if existing.is_some() {
            debug!("Namespace {namespace} exists");
            return Ok(());
        }

        let object = Namespace {
            metadata: ObjectMeta {
                name: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        match namespaces.create(&PostParams::default(), &object).await {
            Ok(_) => {
                info!("Created namespace {namespace}");
                Ok(())
            }
            Err(err) if api_code(&err) == Some(CONFLICT) => Ok(()),
            Err(err) => Err(ClusterError::operation(
                Operation::Create,
                ResourceKind::Namespace,
                namespace,
                err,
            )),
        }
    }
}
