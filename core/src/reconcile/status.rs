use crate::cluster::{ClusterClient, ClusterError, EventRecord, ResourceSummary};
use serde_json::Value;
use strum::Display;
use thiserror::Error;
use tracing::{debug, warn};
use vauto_api::{LabelSelector, ResourceKind};

/// Number of events kept in a report.
pub const EVENT_LIMIT: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Section {
    #[strum(serialize = "virtual machines")]
    Machines,
    #[strum(serialize = "runtime instances")]
    Runtime,
    #[strum(serialize = "storage")]
    Storage,
    #[strum(serialize = "configuration")]
    Config,
    #[strum(serialize = "events")]
    Events,
}

/// A status query that failed. The report still carries every other section.
#[derive(Debug, Error)]
#[error("Failed to query {section}: {source}")]
pub struct DiagnosticQueryError {
    pub section: Section,
    #[source]
    pub source: ClusterError,
}

/// Suffixes of the resources rendered for an instance.
const DERIVED_SUFFIXES: [&str; 2] = ["cloudinit", "rootdisk"];

/// What a status report is about. `instances` holds the exact instance names
/// covered, a single one when the report is narrowed to a target.
#[derive(Debug, Clone)]
pub struct StatusQuery {
    pub namespace: String,
    pub selector: LabelSelector,
    pub instances: Vec<String>,
}

impl StatusQuery {
    fn covers(&self, name: &str) -> bool {
        self.instances
            .iter()
            .any(|instance| belongs_to(name, instance))
    }
}

/// Whether `name` is `instance` itself or a resource derived from it: its
/// boot config, root disk, attachments, launcher pod or importer pod.
/// Sibling instances sharing a prefix, such as `web-api-01` for `web`, do
/// not match.
pub fn belongs_to(name: &str, instance: &str) -> bool {
    if name == instance {
        return true;
    }
    if let Some(pod) = name.strip_prefix("virt-launcher-") {
        return pod
            .rsplit_once('-')
            .is_some_and(|(vm, _)| vm == instance);
    }
    if let Some(imported) = name.strip_prefix("importer-") {
        return belongs_to(imported, instance);
    }
    name.strip_prefix(instance)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|suffix| DERIVED_SUFFIXES.contains(&suffix) || suffix.starts_with("net-"))
}

/// Names mentioned by an event: the object's name and the message's words.
fn event_names(event: &EventRecord) -> impl Iterator<Item = &str> {
    let object = event
        .object
        .rsplit_once('/')
        .map_or(event.object.as_str(), |(_, name)| name);
    std::iter::once(object).chain(
        event
            .message
            .split(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
            .filter(|word| !word.is_empty()),
    )
}

#[derive(Debug, Default)]
pub struct StatusReport {
    pub machines: Vec<ResourceSummary>,
    pub runtime: Vec<ResourceSummary>,
    pub storage: Vec<ResourceSummary>,
    pub config: Vec<ResourceSummary>,
    pub events: Vec<EventRecord>,
    pub warnings: Vec<DiagnosticQueryError>,
}

impl StatusReport {
    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
            && self.runtime.is_empty()
            && self.storage.is_empty()
            && self.config.is_empty()
    }
}

/// Keeps the events mentioning one of `instances` or their resources,
/// limited to the most recent `limit`, warnings first. Input is expected
/// oldest first.
pub fn select_events(events: Vec<EventRecord>, instances: &[String], limit: usize) -> Vec<EventRecord> {
    let matching: Vec<_> = events
        .into_iter()
        .filter(|event| {
            event_names(event)
                .any(|name| instances.iter().any(|instance| belongs_to(name, instance)))
        })
        .collect();

    let recent = matching.len().saturating_sub(limit);
    let (mut warnings, normal): (Vec<_>, Vec<_>) = matching
        .into_iter()
        .skip(recent)
        .partition(EventRecord::is_warning);
    warnings.extend(normal);
    warnings
}

/// The printable state of a virtual machine, as reported by the controller.
pub fn machine_state(machine: &ResourceSummary) -> &str {
    machine
        .status_str(&["printableStatus"])
        .unwrap_or("Unknown")
}

/// The phase of a runtime instance, pod, data volume or claim.
pub fn phase(resource: &ResourceSummary) -> &str {
    resource.status_str(&["phase"]).unwrap_or("Unknown")
}

/// First address reported on a runtime instance's interfaces.
pub fn primary_address(instance: &ResourceSummary) -> Option<&str> {
    instance
        .status
        .get("interfaces")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find_map(|interface| interface.get("ipAddress").and_then(Value::as_str))
}

/// Import progress of a data volume, e.g. `45.5%`.
pub fn progress(volume: &ResourceSummary) -> Option<&str> {
    volume.status_str(&["progress"])
}

async fn query(
    cluster: &dyn ClusterClient,
    status: &StatusQuery,
    kinds: &[ResourceKind],
) -> Result<Vec<ResourceSummary>, ClusterError> {
    let selector = status.selector.to_string();
    let mut found = Vec::new();
    for kind in kinds {
        found.extend(
            cluster
                .list(*kind, &status.namespace, Some(&selector))
                .await?,
        );
    }
    Ok(found)
}

/// Volumes and claims. Claims created before labeling, or by the importer
/// without our labels, are matched by name when no labeled one exists.
async fn storage(
    cluster: &dyn ClusterClient,
    status: &StatusQuery,
) -> Result<Vec<ResourceSummary>, ClusterError> {
    let mut found = query(
        cluster,
        status,
        &[ResourceKind::DataVolume, ResourceKind::PersistentVolumeClaim],
    )
    .await?;
    if found
        .iter()
        .any(|r| r.kind == ResourceKind::PersistentVolumeClaim)
    {
        return Ok(found);
    }

    debug!("No labeled claims, matching by instance name");
    let claims = cluster
        .list(ResourceKind::PersistentVolumeClaim, &status.namespace, None)
        .await?;
    found.extend(
        claims
            .into_iter()
            .filter(|claim| status.covers(&claim.name)),
    );
    Ok(found)
}

fn record<T: Default>(
    warnings: &mut Vec<DiagnosticQueryError>,
    section: Section,
    result: Result<T, ClusterError>,
) -> T {
    result.unwrap_or_else(|source| {
        let err = DiagnosticQueryError { section, source };
        warn!("{err}");
        warnings.push(err);
        T::default()
    })
}

/// Queries every section independently. A failing section is recorded as a
/// warning and left empty.
pub async fn collect(cluster: &dyn ClusterClient, status: &StatusQuery) -> StatusReport {
    let mut report = StatusReport::default();
    let warnings = &mut report.warnings;

    report.machines = record(
        warnings,
        Section::Machines,
        query(cluster, status, &[ResourceKind::VirtualMachine]).await,
    );

    report.runtime = record(
        warnings,
        Section::Runtime,
        query(
            cluster,
            status,
            &[ResourceKind::VirtualMachineInstance, ResourceKind::Pod],
        )
        .await,
    );

    report.storage = record(warnings, Section::Storage, storage(cluster, status).await);

    report.config = record(
        warnings,
        Section::Config,
        query(
            cluster,
            status,
            &[
                ResourceKind::NetworkAttachmentDefinition,
                ResourceKind::Secret,
            ],
        )
        .await,
    );

    let events = cluster.list_events(&status.namespace).await;
    report.events = record(
        warnings,
        Section::Events,
        events.map(|events| select_events(events, &status.instances, EVENT_LIMIT)),
    );

    report
}
