use crate::config::catalog::{Catalog, ImageSource};
use crate::config::context::{DEFAULT_CPU, DEFAULT_DISK_SIZE, DEFAULT_MEMORY, EffectiveContext};
use crate::config::document::{Auth, InputDecl, InstanceDescriptor, NetworkRef, Overrides, SpecDocument};
use crate::config::{ConfigError, ProjectLayout};
use crate::net::{InterfaceSpec, resolve_interfaces};
use getset::Getters;
use ipnet::IpNet;
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::IpAddr;
use thiserror::Error;
use tracing::{debug, warn};
use vauto_api::constants::NAMESPACE_PREFIX;

const ENV_PREFIX: &str = "env:";

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("No image configured for spec '{0}': set `image` to a catalog entry or `image_url`")]
    NoImage(String),

    #[error("No valid networks resolved for spec '{0}'")]
    NoNetworks(String),

    #[error("Spec '{0}' resolves to no instances: declare `instances` or a positive `replicas`")]
    NoInstances(String),

    #[error("Address {address} of instance '{instance}' is outside subnet {subnet}")]
    AddressOutsideSubnet {
        instance: String,
        address: IpAddr,
        subnet: IpNet,
    },

    #[error("No value accepted for secret '{key}' after {attempts} attempts")]
    SecretNotCollected { key: String, attempts: u32 },

    #[error("Failed to collect secret '{key}': {reason}")]
    Collector { key: String, reason: String },

    #[error("Instance '{target}' is not part of spec '{spec}'")]
    UnknownTarget { spec: String, target: String },
}

/// A spec with all of its layers read, before per-instance expansion.
#[derive(Getters, Debug, Clone)]
#[getset(get = "pub")]
pub struct ResolvedSpec {
    project: String,
    spec: String,
    namespace: String,
    base_name: String,
    catalog: Catalog,
    instances: Vec<InstanceDescriptor>,
    inputs: Vec<InputDecl>,
    boot_script: String,
    auth: Auth,
    sizing: Overrides,
    access_mode: Option<String>,
    volume_mode: Option<String>,
    image: Option<String>,
    image_url: Option<String>,
    network_refs: Option<Vec<NetworkRef>>,
}

/// Reads the spec and the project catalog and layers them.
pub fn resolve(
    layout: &ProjectLayout,
    project: &str,
    spec: &str,
    replicas: Option<u32>,
) -> Result<ResolvedSpec, ConfigError> {
    let document = SpecDocument::load(&layout.spec_path(project, spec))?;
    let catalog = Catalog::load(
        &layout.infrastructure_dir(project),
        document.infrastructure.as_ref(),
    )?;
    Ok(ResolvedSpec::new(project, spec, document, catalog, replicas))
}

impl ResolvedSpec {
    pub fn new(
        project: &str,
        spec: &str,
        document: SpecDocument,
        catalog: Catalog,
        replicas: Option<u32>,
    ) -> Self {
        let SpecDocument {
            common,
            instances,
            cloud_init,
            ..
        } = document;

        let base_name = common
            .name_prefix
            .clone()
            .unwrap_or_else(|| spec.to_string());
        let namespace = common
            .namespace
            .clone()
            .unwrap_or_else(|| format!("{NAMESPACE_PREFIX}{project}"));

        let mut sizing = Overrides {
            cpu: Some(DEFAULT_CPU),
            memory: Some(DEFAULT_MEMORY.to_string()),
            disk_size: Some(DEFAULT_DISK_SIZE.to_string()),
            ..Default::default()
        };
        let mut access_mode = None;
        let mut volume_mode = None;

        if let Some(profile_name) = &common.storage_profile {
            match catalog.storage_profiles().get(profile_name) {
                Some(profile) => {
                    sizing.layer(&Overrides {
                        disk_size: profile.disk_size.clone(),
                        storage_class: profile.storage_class.clone(),
                        ..Default::default()
                    });
                    access_mode.clone_from(&profile.access_mode);
                    volume_mode.clone_from(&profile.volume_mode);
                }
                None => warn!("Storage profile '{profile_name}' not found in catalog, using defaults"),
            }
        }

        sizing.layer(&common.overrides);
        resolve_env_vars(&mut sizing.vars);

        let mut auth = common.auth.clone();
        auth.password = auth
            .password
            .map(|password| resolve_env(&password, "auth.password"));

        let instances = if instances.is_empty() {
            let count = replicas.or(common.replicas).unwrap_or(1);
            legacy_instances(&base_name, count)
        } else {
            if replicas.is_some() {
                debug!("Spec '{spec}' declares instances, ignoring --replicas");
            }
            instances
        };

        let network_refs = common.network_refs();

        Self {
            project: project.to_string(),
            spec: spec.to_string(),
            namespace,
            base_name,
            catalog,
            instances,
            inputs: common.inputs,
            boot_script: cloud_init,
            auth,
            sizing,
            access_mode,
            volume_mode,
            image: common.image,
            image_url: common.image_url,
            network_refs,
        }
    }

    pub fn instance_names(&self) -> Vec<String> {
        self.instances.iter().map(|i| i.name.clone()).collect()
    }

    pub fn instance(&self, name: &str) -> Option<&InstanceDescriptor> {
        self.instances.iter().find(|instance| instance.name == name)
    }

    /// Narrows the fleet to one instance.
    pub fn retain_target(&mut self, target: &str) -> Result<(), ResolutionError> {
        if self.instance(target).is_none() {
            return Err(ResolutionError::UnknownTarget {
                spec: self.spec.clone(),
                target: target.to_string(),
            });
        }
        self.instances.retain(|instance| instance.name == target);
        Ok(())
    }

    /// The current value of a secret field, if it holds anything.
    pub fn secret_value(&self, key: &str) -> Option<&str> {
        let value = if key == "password" {
            self.auth.password.as_deref()
        } else {
            self.sizing.vars.get(key).and_then(Value::as_str)
        };
        value.filter(|value| !value.is_empty())
    }

    /// Stores a collected secret. `password` also fills an empty auth password.
    pub fn set_secret(&mut self, key: &str, value: String) {
        if key == "password" && !self.auth.has_password() {
            self.auth.password = Some(value.clone());
        }
        self.sizing.vars.insert(key.to_string(), Value::String(value));
    }

    /// A catalog image wins over a direct URL.
    pub fn image_source(&self) -> Result<ImageSource, ResolutionError> {
        if let Some(key) = &self.image {
            match self.catalog.images().get(key).map(|entry| entry.source()) {
                Some(Some(source)) => return Ok(source),
                Some(None) => warn!("Image '{key}' has neither url nor pvc_name"),
                None => debug!("Image '{key}' not found in catalog"),
            }
        }

        self.image_url
            .clone()
            .map(ImageSource::Http)
            .ok_or_else(|| ResolutionError::NoImage(self.spec.clone()))
    }

    /// The interfaces shared by every instance, before static injection.
    pub fn interfaces(&self) -> Result<Vec<InterfaceSpec>, ResolutionError> {
        let interfaces = resolve_interfaces(self.network_refs.as_deref(), &self.catalog);
        if interfaces.is_empty() {
            return Err(ResolutionError::NoNetworks(self.spec.clone()));
        }
        Ok(interfaces)
    }

    /// Fails on an empty fleet, e.g. `replicas: 0`.
    pub fn ensure_instances(&self) -> Result<(), ResolutionError> {
        if self.instances.is_empty() {
            return Err(ResolutionError::NoInstances(self.spec.clone()));
        }
        Ok(())
    }

    /// Expands the fleet into one context per instance, in declared order.
    pub fn contexts(&self) -> Result<Vec<EffectiveContext>, ResolutionError> {
        self.ensure_instances()?;
        let image = self.image_source()?;
        let interfaces = self.interfaces()?;
        Ok(self.contexts_for(&image, &interfaces))
    }

    /// Expands the fleet over an already resolved image and interface list.
    pub fn contexts_for(
        &self,
        image: &ImageSource,
        interfaces: &[InterfaceSpec],
    ) -> Vec<EffectiveContext> {
        self.instances
            .iter()
            .map(|instance| self.context_for(instance, image, interfaces))
            .collect()
    }

    fn context_for(
        &self,
        instance: &InstanceDescriptor,
        image: &ImageSource,
        interfaces: &[InterfaceSpec],
    ) -> EffectiveContext {
        let mut sizing = self.sizing.clone();
        let mut instance_overrides = instance.overrides.clone();
        resolve_env_vars(&mut instance_overrides.vars);
        sizing.layer(&instance_overrides);

        EffectiveContext {
            project: self.project.clone(),
            spec: self.spec.clone(),
            vm_name: instance.name.clone(),
            namespace: self.namespace.clone(),
            cpu: sizing.cpu.unwrap_or(DEFAULT_CPU),
            memory: sizing
                .memory
                .unwrap_or_else(|| DEFAULT_MEMORY.to_string()),
            disk_size: sizing
                .disk_size
                .unwrap_or_else(|| DEFAULT_DISK_SIZE.to_string()),
            storage_class: sizing.storage_class,
            access_mode: self.access_mode.clone(),
            volume_mode: self.volume_mode.clone(),
            image: image.clone(),
            boot_script: self.boot_script.clone(),
            interfaces: interfaces.to_vec(),
            auth: self.auth.clone(),
            vars: sizing.vars,
            target_address: instance.ip,
            static_address: None,
        }
    }
}

/// `<base>` for a single replica, otherwise `<base>-01`, `<base>-02`, ...
pub fn legacy_instances(base_name: &str, count: u32) -> Vec<InstanceDescriptor> {
    if count == 1 {
        return vec![InstanceDescriptor::named(base_name)];
    }
    (1..=count)
        .map(|ordinal| InstanceDescriptor::named(format!("{base_name}-{ordinal:02}")))
        .collect()
}

/// Resolves an `env:NAME` reference. Anything else is returned as is.
pub fn resolve_env(value: &str, field: &str) -> String {
    let Some(variable) = value.strip_prefix(ENV_PREFIX) else {
        return value.to_string();
    };

    match std::env::var(variable) {
        Ok(resolved) if !resolved.is_empty() => resolved,
        _ => {
            warn!("Environment variable '{variable}' for {field} is empty or unset");
            String::new()
        }
    }
}

fn resolve_env_vars(vars: &mut BTreeMap<String, Value>) {
    for (key, value) in vars.iter_mut() {
        if let Value::String(text) = value {
            if text.starts_with(ENV_PREFIX) {
                *text = resolve_env(text, key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::catalog::{AttachmentType, NetworkEntry};
    use rstest::rstest;
    use serde_yaml::Mapping;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn document(yaml: &str) -> SpecDocument {
        let mapping: Mapping = serde_yaml::from_str(yaml).unwrap();
        SpecDocument::from_mapping(mapping, &PathBuf::from("spec.yaml")).unwrap()
    }

    fn catalog() -> Catalog {
        serde_yaml::from_str(
            r"
networks:
  default:
    type: pod
  svc-net:
    nad_name: svc-net
    bridge: br-svc
    ipam:
      type: whereabouts
      range: 10.215.100.0/24
images:
  rhel9:
    url: http://images.example/rhel9.qcow2
storage_profiles:
  fast:
    storage_class: ocs-ceph-rbd
    disk_size: 80Gi
    access_mode: ReadWriteMany
",
        )
        .unwrap()
    }

    #[rstest]
    #[case(1, &["web"])]
    #[case(2, &["web-01", "web-02"])]
    #[case(3, &["web-01", "web-02", "web-03"])]
    fn test_legacy_instance_names(#[case] count: u32, #[case] expected: &[&str]) {
        let names: Vec<_> = legacy_instances("web", count)
            .into_iter()
            .map(|instance| instance.name)
            .collect();
        assert_eq!(names, expected);
        assert!(legacy_instances("web", count).iter().all(|i| i.ip.is_none()));
    }

    #[rstest]
    #[case("replicas: 0\nimage: rhel9", None)]
    #[case("replicas: 2\nimage: rhel9", Some(0))]
    fn test_zero_replicas_is_rejected(#[case] yaml: &str, #[case] replicas: Option<u32>) {
        let resolved = ResolvedSpec::new("p", "web", document(yaml), catalog(), replicas);
        assert!(resolved.instance_names().is_empty());
        assert!(matches!(
            resolved.contexts(),
            Err(ResolutionError::NoInstances(spec)) if spec == "web"
        ));
    }

    #[test]
    fn test_defaults_apply() {
        let resolved = ResolvedSpec::new(
            "opasnet",
            "web",
            document("image: rhel9"),
            catalog(),
            None,
        );
        let contexts = resolved.contexts().unwrap();
        assert_eq!(contexts.len(), 1);

        let ctx = &contexts[0];
        assert_eq!(ctx.vm_name, "web");
        assert_eq!(ctx.namespace, "vm-opasnet");
        assert_eq!(ctx.cpu, 2);
        assert_eq!(ctx.memory, "4Gi");
        assert_eq!(ctx.disk_size, "50Gi");
        assert_eq!(ctx.storage_class, None);
        assert_eq!(ctx.interfaces.len(), 1);
        assert_eq!(ctx.interfaces[0].entry.attachment, AttachmentType::PodNetwork);
    }

    #[test]
    fn test_layering_order() {
        let resolved = ResolvedSpec::new(
            "p",
            "s",
            document(
                r"
common:
  storage_profile: fast
  memory: 8Gi
  disk_size: 100Gi
  image: rhel9
  network: svc-net
instances:
  - name: db-01
    cpu: 8
  - name: db-02
",
            ),
            catalog(),
            Some(7),
        );
        let contexts = resolved.contexts().unwrap();
        assert_eq!(contexts.len(), 2);

        assert_eq!(contexts[0].cpu, 8);
        assert_eq!(contexts[1].cpu, 2);
        assert!(contexts.iter().all(|ctx| ctx.memory == "8Gi"));
        assert!(contexts.iter().all(|ctx| ctx.disk_size == "100Gi"));
        assert!(
            contexts
                .iter()
                .all(|ctx| ctx.storage_class.as_deref() == Some("ocs-ceph-rbd"))
        );
        assert_eq!(contexts[0].access_mode.as_deref(), Some("ReadWriteMany"));
    }

    #[test]
    fn test_replicas_flag_overrides_document() {
        let resolved = ResolvedSpec::new(
            "p",
            "s",
            document("replicas: 2\nname_prefix: api\nimage: rhel9"),
            catalog(),
            Some(3),
        );
        let names: Vec<_> = resolved.instances().iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["api-01", "api-02", "api-03"]);
    }

    #[test]
    fn test_missing_image_is_resolution_error() {
        let resolved = ResolvedSpec::new("p", "s", document("image: nope"), catalog(), None);
        assert!(matches!(
            resolved.contexts(),
            Err(ResolutionError::NoImage(spec)) if spec == "s"
        ));
    }

    #[test]
    fn test_image_url_fallback() {
        let resolved = ResolvedSpec::new(
            "p",
            "s",
            document("image: nope\nimage_url: http://x/y.qcow2"),
            catalog(),
            None,
        );
        assert_eq!(
            resolved.image_source().unwrap(),
            ImageSource::Http("http://x/y.qcow2".into())
        );
    }

    #[test]
    fn test_zero_networks_is_resolution_error() {
        let resolved = ResolvedSpec::new(
            "p",
            "s",
            document("image: rhel9\nnetworks: [missing]"),
            catalog(),
            None,
        );
        assert!(matches!(
            resolved.contexts(),
            Err(ResolutionError::NoNetworks(_))
        ));
    }

    #[test]
    fn test_contexts_own_their_interfaces() {
        let resolved = ResolvedSpec::new(
            "p",
            "s",
            document("image: rhel9\nnetwork: svc-net\nreplicas: 2"),
            catalog(),
            None,
        );
        let mut contexts = resolved.contexts().unwrap();
        contexts[0].interfaces[0].entry = NetworkEntry::default();
        assert_eq!(contexts[1].interfaces[0].entry.nad_name.as_deref(), Some("svc-net"));
    }

    #[test]
    fn test_env_references_resolve() {
        // SAFETY: the variable name is unique to this test.
        unsafe {
            std::env::set_var("VAUTO_TEST_DB_PASSWORD", "s3cret");
        }
        let resolved = ResolvedSpec::new(
            "p",
            "s",
            document(
                r"
image: rhel9
auth:
  username: admin
  password: env:VAUTO_TEST_MISSING_PASSWORD
db_password: env:VAUTO_TEST_DB_PASSWORD
",
            ),
            catalog(),
            None,
        );
        assert_eq!(resolved.auth().password.as_deref(), Some(""));
        assert!(!resolved.auth().has_password());
        assert_eq!(resolved.secret_value("db_password"), Some("s3cret"));
        assert_eq!(resolved.secret_value("password"), None);
    }

    #[test]
    fn test_set_secret_fills_auth_password() {
        let mut resolved = ResolvedSpec::new("p", "s", document("image: rhel9"), catalog(), None);
        resolved.set_secret("password", "hunter2".into());
        assert_eq!(resolved.auth().password.as_deref(), Some("hunter2"));
        assert_eq!(resolved.secret_value("password"), Some("hunter2"));
    }

    #[test]
    fn test_retain_target() {
        let mut resolved = ResolvedSpec::new(
            "p",
            "s",
            document("image: rhel9\nreplicas: 3"),
            catalog(),
            None,
        );
        resolved.retain_target("s-02").unwrap();
        assert_eq!(resolved.instances().len(), 1);
        assert!(matches!(
            resolved.retain_target("s-09"),
            Err(ResolutionError::UnknownTarget { .. })
        ));
    }

    #[test]
    fn test_resolve_reads_project_layout() {
        let dir = TempDir::new().unwrap();
        let layout = ProjectLayout::new(dir.path());
        fs::create_dir_all(layout.infrastructure_dir("p")).unwrap();
        fs::create_dir_all(layout.spec_path("p", "s").parent().unwrap()).unwrap();
        fs::write(
            layout.infrastructure_dir("p").join("images.yaml"),
            "images:\n  rhel9:\n    url: http://images.example/rhel9.qcow2\n",
        )
        .unwrap();
        fs::write(
            layout.infrastructure_dir("p").join("networks.yaml"),
            "networks:\n  default:\n    type: pod\n",
        )
        .unwrap();
        fs::write(layout.spec_path("p", "s"), "common:\n  image: rhel9\n").unwrap();

        let resolved = resolve(&layout, "p", "s", None).unwrap();
        assert_eq!(resolved.namespace(), "vm-p");
        assert_eq!(resolved.contexts().unwrap().len(), 1);

        assert!(matches!(
            resolve(&layout, "p", "missing", None),
            Err(ConfigError::SpecNotFound(_))
        ));
    }
}
