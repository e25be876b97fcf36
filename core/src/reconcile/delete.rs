use crate::cluster::{ClusterClient, ClusterError, DeleteOutcome, ResourceSummary};
use tracing::{debug, info, warn};
use vauto_api::constants::MANAGED_LABEL;
use vauto_api::kinds::{LEGACY_KINDS, MANAGED_KINDS};
use vauto_api::{LabelSelector, ResourceKind};

/// Everything a delete would remove, split by how it was found.
#[derive(Debug, Clone)]
pub struct DeletionSet {
    pub namespace: String,
    pub selector: LabelSelector,
    pub labeled: Vec<ResourceSummary>,
    pub legacy: Vec<ResourceSummary>,
}

impl DeletionSet {
    pub fn is_empty(&self) -> bool {
        self.labeled.is_empty() && self.legacy.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct DeletionReport {
    pub deleted: Vec<(ResourceKind, String)>,
    pub not_found: Vec<(ResourceKind, String)>,
    pub errors: Vec<ClusterError>,
}

impl DeletionReport {
    pub fn failed(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Resources whose name starts with `base_name` and that no selector has
/// claimed. Anything carrying the managed label belongs to some spec and is
/// left to that spec's selector.
pub fn legacy_matches(
    candidates: Vec<ResourceSummary>,
    labeled: &[ResourceSummary],
    base_name: &str,
) -> Vec<ResourceSummary> {
    candidates
        .into_iter()
        .filter(|candidate| candidate.name.starts_with(base_name))
        .filter(|candidate| !candidate.labels.contains_key(MANAGED_LABEL))
        .filter(|candidate| {
            !labeled
                .iter()
                .any(|found| found.kind == candidate.kind && found.name == candidate.name)
        })
        .collect()
}

/// Queries the cluster for everything the selector covers. Without an
/// instance target, unlabeled resources named after the spec are included.
pub async fn gather(
    cluster: &dyn ClusterClient,
    namespace: &str,
    selector: &LabelSelector,
    base_name: &str,
) -> Result<DeletionSet, ClusterError> {
    let rendered = selector.to_string();

    let mut labeled = Vec::new();
    for kind in MANAGED_KINDS {
        labeled.extend(cluster.list(kind, namespace, Some(&rendered)).await?);
    }

    let mut legacy = Vec::new();
    if selector.instance().is_none() {
        for kind in LEGACY_KINDS {
            let candidates = cluster.list(kind, namespace, None).await?;
            legacy.extend(legacy_matches(candidates, &labeled, base_name));
        }
    }

    debug!(
        "Found {} labeled and {} legacy resources in {namespace}",
        labeled.len(),
        legacy.len()
    );

    Ok(DeletionSet {
        namespace: namespace.to_string(),
        selector: selector.clone(),
        labeled,
        legacy,
    })
}

/// Bulk-deletes the labeled group per kind, then removes legacy resources
/// one at a time. Resources that are already gone are not an error.
pub async fn execute(cluster: &dyn ClusterClient, set: &DeletionSet) -> DeletionReport {
    let mut report = DeletionReport::default();
    let rendered = set.selector.to_string();

    for kind in MANAGED_KINDS {
        let names: Vec<_> = set
            .labeled
            .iter()
            .filter(|resource| resource.kind == kind)
            .map(|resource| resource.name.clone())
            .collect();
        if names.is_empty() {
            continue;
        }

        match cluster
            .delete_collection(kind, &set.namespace, &rendered)
            .await
        {
            Ok(()) => {
                info!("Deleted {} {kind} resources", names.len());
                report
                    .deleted
                    .extend(names.into_iter().map(|name| (kind, name)));
            }
            Err(err) => {
                warn!("{err}");
                report.errors.push(err);
            }
        }
    }

    for resource in &set.legacy {
        match cluster
            .delete(resource.kind, &set.namespace, &resource.name)
            .await
        {
            Ok(DeleteOutcome::Deleted) => {
                info!("Deleted {} {}", resource.kind, resource.name);
                report.deleted.push((resource.kind, resource.name.clone()));
            }
            Ok(DeleteOutcome::NotFound) => {
                debug!("{} {} already gone", resource.kind, resource.name);
                report.not_found.push((resource.kind, resource.name.clone()));
            }
            Err(err) => {
                warn!("{err}");
                report.errors.push(err);
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use vauto_api::ManagedLabels;

    fn summary(kind: ResourceKind, name: &str) -> ResourceSummary {
        ResourceSummary::new(kind, name)
    }

    #[test]
    fn test_legacy_matches_excludes_labeled() {
        let labeled = vec![summary(ResourceKind::VirtualMachine, "web-01")];
        let mut foreign = summary(ResourceKind::VirtualMachine, "web-api-01");
        foreign.labels = ManagedLabels::builder()
            .project("p")
            .spec("web-api")
            .instance("web-api-01")
            .build()
            .to_map();

        let candidates = vec![
            summary(ResourceKind::VirtualMachine, "web-01"),
            summary(ResourceKind::VirtualMachine, "web-02"),
            summary(ResourceKind::DataVolume, "web-01"),
            summary(ResourceKind::VirtualMachine, "db-01"),
            foreign,
        ];

        let legacy = legacy_matches(candidates, &labeled, "web");
        let found: Vec<_> = legacy.iter().map(|r| (r.kind, r.name.as_str())).collect();
        assert_eq!(
            found,
            [
                (ResourceKind::VirtualMachine, "web-02"),
                (ResourceKind::DataVolume, "web-01"),
            ]
        );
    }

    proptest! {
        #[test]
        fn test_selection_is_partitioned(
            labeled_names in proptest::collection::hash_set("web-[0-9]{2}", 0..6),
            other_names in proptest::collection::hash_set("web-[0-9]{2}", 0..6),
        ) {
            let labeled: Vec<_> = labeled_names
                .iter()
                .map(|name| summary(ResourceKind::Secret, name))
                .collect();
            let candidates: Vec<_> = labeled_names
                .iter()
                .chain(other_names.iter())
                .map(|name| summary(ResourceKind::Secret, name))
                .collect();

            let legacy = legacy_matches(candidates, &labeled, "web");
            for resource in &legacy {
                prop_assert!(!labeled_names.contains(&resource.name));
            }
            for name in other_names.difference(&labeled_names) {
                prop_assert!(legacy.iter().any(|r| &r.name == name));
            }
        }
    }
}
