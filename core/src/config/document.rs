use crate::config::catalog::Catalog;
use crate::config::serde::{read_document, take_field};
use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_yaml::Mapping;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;

/// Sizing keys accepted at every layer, plus free-form template variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_size: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,

    #[serde(flatten)]
    pub vars: BTreeMap<String, Value>,
}

impl Overrides {
    /// Fields set in `other` win.
    pub fn layer(&mut self, other: &Overrides) {
        if other.cpu.is_some() {
            self.cpu = other.cpu;
        }
        if other.memory.is_some() {
            self.memory.clone_from(&other.memory);
        }
        if other.disk_size.is_some() {
            self.disk_size.clone_from(&other.disk_size);
        }
        if other.storage_class.is_some() {
            self.storage_class.clone_from(&other.storage_class);
        }
        self.vars
            .extend(other.vars.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Auth {
    pub fn has_password(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// A secret the operator declares up front, with an optional custom prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDecl {
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// A network as referenced from a spec: either a catalog key or an inline
/// entry whose `name` may point at a catalog entry it refines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NetworkRef {
    ByName(String),
    Inline(Map<String, Value>),
}

/// The shared block of a spec document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommonBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_profile: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkRef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<NetworkRef>,

    #[serde(default)]
    pub auth: Auth,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputDecl>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,

    #[serde(flatten)]
    pub overrides: Overrides,
}

impl CommonBlock {
    /// `networks` wins over `network`; `None` means "use the catalog default".
    pub fn network_refs(&self) -> Option<Vec<NetworkRef>> {
        if !self.networks.is_empty() {
            return Some(self.networks.clone());
        }
        self.network.clone().map(|network| vec![network])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,

    #[serde(flatten)]
    pub overrides: Overrides,
}

impl InstanceDescriptor {
    pub fn named<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            ip: None,
            overrides: Overrides::default(),
        }
    }
}

/// One spec document as read from `specs/<spec>.yaml`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpecDocument {
    pub common: CommonBlock,
    pub instances: Vec<InstanceDescriptor>,
    pub cloud_init: String,
    pub infrastructure: Option<Catalog>,
}

impl SpecDocument {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let document =
            read_document(path)?.ok_or_else(|| ConfigError::SpecNotFound(path.to_path_buf()))?;
        Self::from_mapping(document, path)
    }

    /// Splits a raw document into its parts. Without a `common` key the
    /// remaining top-level keys form the common block.
    pub fn from_mapping(mut document: Mapping, path: &Path) -> Result<Self, ConfigError> {
        let instances: Option<Vec<InstanceDescriptor>> =
            take_field(&mut document, "instances", path)?;
        let cloud_init: Option<String> = take_field(&mut document, "cloud_init", path)?;
        let infrastructure: Option<Catalog> = take_field(&mut document, "infrastructure", path)?;

        let mut common: CommonBlock = if document.contains_key("common") {
            take_field(&mut document, "common", path)?.unwrap_or_default()
        } else {
            serde_yaml::from_value(serde_yaml::Value::Mapping(document)).map_err(|source| {
                ConfigError::Malformed {
                    path: path.to_path_buf(),
                    source,
                }
            })?
        };

        let cloud_init = match cloud_init {
            Some(text) => text,
            None => match common.overrides.vars.remove("cloud_init") {
                Some(Value::String(text)) => text,
                _ => String::new(),
            },
        };

        Ok(Self {
            common,
            instances: instances.unwrap_or_default(),
            cloud_init,
            infrastructure,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse(yaml: &str) -> SpecDocument {
        let mapping: Mapping = serde_yaml::from_str(yaml).unwrap();
        SpecDocument::from_mapping(mapping, &PathBuf::from("spec.yaml")).unwrap()
    }

    #[test]
    fn test_structured_document() {
        let doc = parse(
            r"
common:
  namespace: web-ns
  cpu: 4
  image: rhel9
  networks: [svc-net, {name: mgmt, nad_name: mgmt-x}]
  auth:
    username: cloud-user
  inputs:
    - key: db_password
      prompt: Database password
  motd: hello
instances:
  - name: web-01
    ip: 10.215.100.101
    memory: 8Gi
  - name: web-02
cloud_init: |
  #cloud-config
infrastructure:
  networks:
    svc-net:
      bridge: br-svc
",
        );

        assert_eq!(doc.common.namespace.as_deref(), Some("web-ns"));
        assert_eq!(doc.common.overrides.cpu, Some(4));
        assert_eq!(doc.common.overrides.vars["motd"], Value::from("hello"));
        assert_eq!(doc.common.auth.username.as_deref(), Some("cloud-user"));
        assert_eq!(doc.common.inputs[0].key, "db_password");

        let refs = doc.common.network_refs().unwrap();
        assert_eq!(refs[0], NetworkRef::ByName("svc-net".into()));
        assert!(matches!(&refs[1], NetworkRef::Inline(map) if map["name"] == "mgmt"));

        assert_eq!(doc.instances.len(), 2);
        assert_eq!(
            doc.instances[0].ip,
            Some("10.215.100.101".parse::<IpAddr>().unwrap())
        );
        assert_eq!(doc.instances[0].overrides.memory.as_deref(), Some("8Gi"));
        assert_eq!(doc.instances[1].ip, None);
        assert!(doc.cloud_init.starts_with("#cloud-config"));
        assert!(doc.infrastructure.unwrap().networks().contains_key("svc-net"));
    }

    #[test]
    fn test_flat_legacy_document() {
        let doc = parse(
            r"
replicas: 3
name_prefix: api
image_url: http://images.example/base.qcow2
network: default
cloud_init: '#cloud-config'
",
        );

        assert_eq!(doc.common.replicas, Some(3));
        assert_eq!(doc.common.name_prefix.as_deref(), Some("api"));
        assert_eq!(
            doc.common.network_refs(),
            Some(vec![NetworkRef::ByName("default".into())])
        );
        assert!(doc.instances.is_empty());
        assert_eq!(doc.cloud_init, "#cloud-config");
        assert!(!doc.common.overrides.vars.contains_key("cloud_init"));
    }

    #[test]
    fn test_networks_list_wins_over_single_network() {
        let doc = parse("network: a\nnetworks: [b, c]\n");
        assert_eq!(
            doc.common.network_refs(),
            Some(vec![
                NetworkRef::ByName("b".into()),
                NetworkRef::ByName("c".into())
            ])
        );
    }

    #[test]
    fn test_missing_spec_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = SpecDocument::load(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::SpecNotFound(_)));
    }

    #[test]
    fn test_overrides_layering() {
        let mut base = Overrides {
            cpu: Some(2),
            memory: Some("4Gi".into()),
            ..Default::default()
        };
        base.vars.insert("motd".into(), Value::from("base"));
        let top = Overrides {
            memory: Some("8Gi".into()),
            vars: BTreeMap::from([("motd".into(), Value::from("top"))]),
            ..Default::default()
        };
        base.layer(&top);
        assert_eq!(base.cpu, Some(2));
        assert_eq!(base.memory.as_deref(), Some("8Gi"));
        assert_eq!(base.vars["motd"], Value::from("top"));
    }
}
