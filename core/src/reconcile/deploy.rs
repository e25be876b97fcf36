use crate::cluster::{ClusterClient, ClusterError, CreateOutcome};
use crate::config::catalog::ImageSource;
use crate::config::resolver::{ResolutionError, ResolvedSpec};
use crate::manifests::{ManagedResource, synthesize};
use crate::net::{InterfaceSpec, StaticAddress};
use crate::reconcile::{InstanceError, ResourceOutcome, ResourceState};
use std::net::IpAddr;
use tracing::{debug, error, info, warn};

/// Rendered resources of one instance, or the reason it cannot be deployed.
#[derive(Debug)]
pub struct InstancePlan {
    pub name: String,
    pub address: Option<IpAddr>,
    pub static_address: Option<StaticAddress>,
    pub resources: Result<Vec<ManagedResource>, InstanceError>,
}

#[derive(Debug)]
pub struct DeployPlan {
    pub namespace: String,
    pub image: ImageSource,
    pub interfaces: Vec<InterfaceSpec>,
    pub instances: Vec<InstancePlan>,
}

/// Decision taken before applying an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Apply,
    Skip,
    Quit,
}

#[derive(Debug)]
pub struct InstanceReport {
    pub name: String,
    pub outcomes: Vec<ResourceOutcome>,
    pub errors: Vec<InstanceError>,
    pub skipped: bool,
}

impl InstanceReport {
    fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            outcomes: Vec::new(),
            errors: Vec::new(),
            skipped: false,
        }
    }

    pub fn failed(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct FleetReport {
    pub instances: Vec<InstanceReport>,
    pub quit: bool,
}

impl FleetReport {
    pub fn failed(&self) -> bool {
        self.instances.iter().any(InstanceReport::failed)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &InstanceError)> {
        self.instances.iter().flat_map(|instance| {
            instance
                .errors
                .iter()
                .map(move |err| (instance.name.as_str(), err))
        })
    }
}

/// Renders every instance. Problems shared by the whole fleet (no image, no
/// network) are returned as errors; problems of one instance are kept in its
/// plan.
pub fn plan(spec: &ResolvedSpec) -> Result<DeployPlan, ResolutionError> {
    spec.ensure_instances()?;
    let image = spec.image_source()?;
    let interfaces = spec.interfaces()?;

    let instances = spec
        .contexts_for(&image, &interfaces)
        .into_iter()
        .map(|mut ctx| {
            let resources = ctx
                .apply_target_address()
                .map_err(InstanceError::from)
                .and_then(|()| synthesize(&ctx).map_err(InstanceError::from));
            if let Err(err) = &resources {
                error!("{}: {err}", ctx.vm_name);
            }
            InstancePlan {
                name: ctx.vm_name,
                address: ctx.target_address,
                static_address: ctx.static_address,
                resources,
            }
        })
        .collect();

    Ok(DeployPlan {
        namespace: spec.namespace().clone(),
        image,
        interfaces,
        instances,
    })
}

/// Maps the result of one create call onto the state of that resource.
/// Attachment definitions are shared between instances, so any failure to
/// create one is downgraded.
pub fn classify(
    resource: &ManagedResource,
    result: Result<CreateOutcome, ClusterError>,
) -> (ResourceOutcome, Option<InstanceError>) {
    let shared = resource.kind.is_shared();
    let mut outcome = ResourceOutcome::new(resource.kind, resource.name(), ResourceState::Applied);

    match result {
        Ok(CreateOutcome::Created) => {
            info!("Created {} {}", resource.kind, resource.name());
            (outcome, None)
        }
        Ok(CreateOutcome::AlreadyExists) if shared => {
            warn!("{} {} already exists, skipping", resource.kind, resource.name());
            outcome.state = ResourceState::SkipExists;
            (outcome, None)
        }
        Err(err) if shared => {
            warn!("{err}, continuing with the existing definition");
            outcome.state = ResourceState::SkipExists;
            outcome.message = Some(err.to_string());
            (outcome, None)
        }
        Ok(CreateOutcome::AlreadyExists) => {
            let err = InstanceError::AlreadyExists {
                kind: resource.kind,
                name: resource.name().to_string(),
            };
            error!("{err}");
            outcome.state = ResourceState::Failed;
            outcome.message = Some(err.to_string());
            (outcome, Some(err))
        }
        Err(err) => {
            error!("{err}");
            outcome.state = ResourceState::Failed;
            outcome.message = Some(err.to_string());
            (outcome, Some(err.into()))
        }
    }
}

/// Outcomes of an instance rendered but left unapplied.
fn planned(instance: &InstancePlan) -> Vec<ResourceOutcome> {
    instance
        .resources
        .iter()
        .flatten()
        .map(|r| ResourceOutcome::new(r.kind, r.name(), ResourceState::Planned))
        .collect()
}

/// Creates the resources of one instance in order. A failed resource does
/// not stop the ones after it.
pub async fn apply_instance(cluster: &dyn ClusterClient, plan: InstancePlan) -> InstanceReport {
    let mut report = InstanceReport::new(plan.name);

    let resources = match plan.resources {
        Ok(resources) => resources,
        Err(err) => {
            report.errors.push(err);
            return report;
        }
    };

    for resource in &resources {
        debug!(
            "{} {} {}",
            ResourceState::Applying,
            resource.kind,
            resource.name()
        );
        let (outcome, err) = classify(resource, cluster.create(resource).await);
        report.outcomes.push(outcome);
        report.errors.extend(err);
    }

    report
}

/// Ensures the namespace, then applies each instance in declared order.
/// `gate` is consulted before every instance that rendered successfully.
pub async fn apply<G>(
    cluster: &dyn ClusterClient,
    plan: DeployPlan,
    mut gate: G,
) -> Result<FleetReport, ClusterError>
where
    G: FnMut(&InstancePlan) -> Gate,
{
    cluster.ensure_namespace(&plan.namespace).await?;

    let mut fleet = FleetReport::default();
    for instance in plan.instances {
        if instance.resources.is_ok() {
            match gate(&instance) {
                Gate::Apply => {}
                Gate::Skip => {
                    info!("Skipping {}", instance.name);
                    let mut report = InstanceReport::new(instance.name.as_str());
                    report.skipped = true;
                    report.outcomes = planned(&instance);
                    fleet.instances.push(report);
                    continue;
                }
                Gate::Quit => {
                    fleet.quit = true;
                    break;
                }
            }
        }

        let report = apply_instance(cluster, instance).await;
        if !report.failed() {
            info!("{} deployed", report.name);
        }
        fleet.instances.push(report);
    }

    Ok(fleet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Operation;
    use kube::api::{DynamicObject, ObjectMeta};
    use rstest::rstest;
    use vauto_api::ResourceKind;

    fn resource(kind: ResourceKind, name: &str) -> ManagedResource {
        ManagedResource {
            kind,
            object: DynamicObject {
                types: None,
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    ..Default::default()
                },
                data: serde_json::Value::Null,
            },
        }
    }

    fn failure(kind: ResourceKind) -> Result<CreateOutcome, ClusterError> {
        Err(ClusterError::operation(Operation::Create, kind, "x", "forbidden"))
    }

    #[rstest]
    #[case(ResourceKind::NetworkAttachmentDefinition, Ok(CreateOutcome::Created), ResourceState::Applied, false)]
    #[case(ResourceKind::NetworkAttachmentDefinition, Ok(CreateOutcome::AlreadyExists), ResourceState::SkipExists, false)]
    #[case(ResourceKind::NetworkAttachmentDefinition, failure(ResourceKind::NetworkAttachmentDefinition), ResourceState::SkipExists, false)]
    #[case(ResourceKind::Secret, Ok(CreateOutcome::Created), ResourceState::Applied, false)]
    #[case(ResourceKind::Secret, Ok(CreateOutcome::AlreadyExists), ResourceState::Failed, true)]
    #[case(ResourceKind::VirtualMachine, failure(ResourceKind::VirtualMachine), ResourceState::Failed, true)]
    fn test_classify(
        #[case] kind: ResourceKind,
        #[case] result: Result<CreateOutcome, ClusterError>,
        #[case] state: ResourceState,
        #[case] is_error: bool,
    ) {
        let (outcome, err) = classify(&resource(kind, "web-01-x"), result);
        assert_eq!(outcome.state, state);
        assert_eq!(outcome.name, "web-01-x");
        assert_eq!(err.is_some(), is_error);
    }

    #[test]
    fn test_fleet_report_failures() {
        let mut ok = InstanceReport::new("web-01");
        ok.outcomes
            .push(ResourceOutcome::new(ResourceKind::Secret, "a", ResourceState::Applied));
        let mut bad = InstanceReport::new("web-02");
        bad.errors.push(InstanceError::AlreadyExists {
            kind: ResourceKind::VirtualMachine,
            name: "web-02".into(),
        });

        let fleet = FleetReport {
            instances: vec![ok, bad],
            quit: false,
        };
        assert!(fleet.failed());
        let failures: Vec<_> = fleet.failures().map(|(name, _)| name).collect();
        assert_eq!(failures, ["web-02"]);
    }
}
