use crate::config::catalog::ImageSource;
use crate::config::document::Auth;
use crate::config::resolver::ResolutionError;
use crate::net::{Injection, InterfaceSpec, StaticAddress, inject_static};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::IpAddr;
use tracing::warn;
use vauto_api::ManagedLabels;

pub const DEFAULT_CPU: u32 = 2;
pub const DEFAULT_MEMORY: &str = "4Gi";
pub const DEFAULT_DISK_SIZE: &str = "50Gi";

/// Everything needed to synthesize the resources of one instance.
///
/// Each context owns its interfaces, so static injection on one instance
/// never leaks into a sibling.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveContext {
    pub project: String,
    pub spec: String,
    pub vm_name: String,
    pub namespace: String,
    pub cpu: u32,
    pub memory: String,
    pub disk_size: String,
    pub storage_class: Option<String>,
    pub access_mode: Option<String>,
    pub volume_mode: Option<String>,
    pub image: ImageSource,
    pub boot_script: String,
    pub interfaces: Vec<InterfaceSpec>,
    pub auth: Auth,
    pub vars: BTreeMap<String, Value>,
    pub target_address: Option<IpAddr>,
    pub static_address: Option<StaticAddress>,
}

impl EffectiveContext {
    pub fn labels(&self) -> ManagedLabels {
        ManagedLabels::builder()
            .project(self.project.as_str())
            .spec(self.spec.as_str())
            .instance(self.vm_name.as_str())
            .build()
    }

    pub fn secret_name(&self) -> String {
        format!("{}-cloudinit", self.vm_name)
    }

    pub fn root_disk_name(&self) -> String {
        format!("{}-rootdisk", self.vm_name)
    }

    /// Applies the instance's target address, if any, to its interfaces.
    pub fn apply_target_address(&mut self) -> Result<(), ResolutionError> {
        let Some(address) = self.target_address else {
            return Ok(());
        };

        match inject_static(&mut self.interfaces, &self.vm_name, address) {
            Injection::Applied(derived) => {
                self.static_address = Some(derived);
                Ok(())
            }
            Injection::Rejected { subnet } => Err(ResolutionError::AddressOutsideSubnet {
                instance: self.vm_name.clone(),
                address,
                subnet,
            }),
            Injection::NoCandidate => {
                warn!(
                    "Could not inject static address {address} for {}: no interface declares a CIDR range",
                    self.vm_name
                );
                Ok(())
            }
        }
    }
}
