use crate::config::ConfigError;
use crate::config::serde::read_category;
use getset::Getters;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;
use tracing::debug;

pub const NETWORKS_FILE: &str = "networks.yaml";
pub const IMAGES_FILE: &str = "images.yaml";
pub const STORAGE_FILE: &str = "storage.yaml";

/// How an interface is attached to the guest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttachmentType {
    /// The orchestrator's implicit primary network.
    #[serde(alias = "pod")]
    PodNetwork,
    /// A secondary network reached through an attachment definition.
    #[default]
    #[serde(other)]
    Bridged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpamAddress {
    pub address: String,
}

/// Address assignment for one interface, kept free-form beyond the fields the
/// resolver reasons about so that plugin-specific keys reach the CNI config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ipam {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<IpamAddress>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Ipam {
    /// The declared range, when it parses as a CIDR. Host bits are allowed.
    pub fn subnet(&self) -> Option<IpNet> {
        self.range.as_deref()?.trim().parse().ok()
    }

    pub fn is_static(&self) -> bool {
        self.plugin.as_deref() == Some("static")
    }

    /// Rewrites this block to a single static address.
    pub fn set_static(&mut self, address: IpAddr, prefix_len: u8) {
        self.plugin = Some("static".to_string());
        self.addresses = vec![IpamAddress {
            address: format!("{address}/{prefix_len}"),
        }];
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "type", default)]
    pub attachment: AttachmentType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nad_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipam: Option<Ipam>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Http(String),
    Pvc {
        name: String,
        namespace: Option<String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pvc_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pvc_namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_cpu: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_memory: Option<String>,
}

impl ImageEntry {
    /// An existing volume takes precedence over a download URL.
    pub fn source(&self) -> Option<ImageSource> {
        if let Some(name) = &self.pvc_name {
            return Some(ImageSource::Pvc {
                name: name.clone(),
                namespace: self.pvc_namespace.clone(),
            });
        }
        self.url.clone().map(ImageSource::Http)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_size: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_mode: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_mode: Option<String>,
}

/// Named networks, images and storage profiles available to one project.
///
/// The same shape is used for a spec's `infrastructure` block, which is
/// layered on top of the project files by [`Catalog::merge`].
#[derive(Getters, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[getset(get = "pub")]
    #[serde(default)]
    networks: BTreeMap<String, NetworkEntry>,

    #[getset(get = "pub")]
    #[serde(default)]
    images: BTreeMap<String, ImageEntry>,

    #[getset(get = "pub")]
    #[serde(default)]
    storage_profiles: BTreeMap<String, StorageProfile>,
}

impl Catalog {
    pub fn new(
        networks: BTreeMap<String, NetworkEntry>,
        images: BTreeMap<String, ImageEntry>,
        storage_profiles: BTreeMap<String, StorageProfile>,
    ) -> Self {
        Self {
            networks,
            images,
            storage_profiles,
        }
    }

    /// Reads the project catalog files from `dir` and layers `overrides` on
    /// top. Missing files contribute nothing.
    pub fn load(dir: &Path, overrides: Option<&Catalog>) -> Result<Self, ConfigError> {
        let base = Self {
            networks: read_category(&dir.join(NETWORKS_FILE), "networks")?,
            images: read_category(&dir.join(IMAGES_FILE), "images")?,
            storage_profiles: read_category(&dir.join(STORAGE_FILE), "storage_profiles")?,
        };

        debug!(
            "Loaded project catalog from {}: {} networks, {} images, {} storage profiles",
            dir.display(),
            base.networks.len(),
            base.images.len(),
            base.storage_profiles.len()
        );

        Ok(match overrides {
            Some(overrides) => base.merge(overrides.clone()),
            None => base,
        })
    }

    /// Entries of `other` replace entries of `self` with the same key whole.
    #[must_use]
    pub fn merge(mut self, other: Catalog) -> Self {
        self.networks.extend(other.networks);
        self.images.extend(other.images);
        self.storage_profiles.extend(other.storage_profiles);
        self
    }
}
