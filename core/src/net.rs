use crate::config::catalog::{AttachmentType, Catalog, NetworkEntry};
use crate::config::document::NetworkRef;
use ipnet::IpNet;
use serde_json::{Map, Value};
use std::net::IpAddr;
use tracing::{debug, info, warn};

const DEFAULT_NETWORK: &str = "default";

/// One guest interface, carrying its own copy of the catalog entry.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceSpec {
    pub name: String,
    pub entry: NetworkEntry,
}

impl InterfaceSpec {
    pub fn new<N: Into<String>>(name: N, entry: NetworkEntry) -> Self {
        Self {
            name: name.into(),
            entry,
        }
    }

    pub fn is_pod_network(&self) -> bool {
        self.entry.attachment == AttachmentType::PodNetwork
    }

    /// Name of the attachment definition the guest binds to, if any.
    pub fn attachment_name(&self, vm_name: &str, ordinal: usize) -> Option<String> {
        if self.is_pod_network() {
            return None;
        }
        Some(
            self.entry
                .nad_name
                .clone()
                .unwrap_or_else(|| format!("{vm_name}-net-{ordinal}")),
        )
    }

    /// Whether an attachment definition must be created for this interface.
    pub fn emits_attachment(&self) -> bool {
        !self.is_pod_network() && self.entry.bridge.is_some()
    }
}

/// Variables derived from a successful static injection, consumed by the
/// boot script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticAddress {
    pub static_ip: String,
    pub gateway_ip: Option<String>,
    pub interface_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Injection {
    Applied(StaticAddress),
    Rejected { subnet: IpNet },
    NoCandidate,
}

/// Guest NIC name for the interface at `ordinal`, following virtio PCI
/// enumeration.
pub fn guest_interface_name(ordinal: usize) -> String {
    format!("enp{}s0", ordinal + 1)
}

/// Resolves network references against the catalog. Unresolvable references
/// are dropped. Without references the catalog's `default` network is used.
pub fn resolve_interfaces(refs: Option<&[NetworkRef]>, catalog: &Catalog) -> Vec<InterfaceSpec> {
    let Some(refs) = refs else {
        return match catalog.networks().get(DEFAULT_NETWORK) {
            Some(entry) => vec![InterfaceSpec::new(DEFAULT_NETWORK, entry.clone())],
            None => {
                warn!("No networks declared and the catalog has no '{DEFAULT_NETWORK}' network");
                Vec::new()
            }
        };
    };

    refs.iter()
        .enumerate()
        .filter_map(|(ordinal, reference)| resolve_reference(ordinal, reference, catalog))
        .collect()
}

fn resolve_reference(
    ordinal: usize,
    reference: &NetworkRef,
    catalog: &Catalog,
) -> Option<InterfaceSpec> {
    match reference {
        NetworkRef::ByName(name) => match catalog.networks().get(name) {
            Some(entry) => Some(InterfaceSpec::new(name, entry.clone())),
            None => {
                warn!("Network '{name}' not found in catalog, skipping");
                None
            }
        },
        NetworkRef::Inline(fields) => {
            let name = fields.get("name").and_then(Value::as_str);
            let merged = match name.and_then(|name| catalog.networks().get(name)) {
                Some(base) => merge_fields(base, fields)?,
                None => Value::Object(fields.clone()),
            };

            match serde_json::from_value::<NetworkEntry>(merged) {
                Ok(entry) => Some(InterfaceSpec::new(
                    name.map_or_else(|| format!("net-{ordinal}"), str::to_string),
                    entry,
                )),
                Err(err) => {
                    warn!("Inline network at position {ordinal} is invalid, skipping: {err}");
                    None
                }
            }
        }
    }
}

/// Inline fields replace the catalog entry's fields one by one.
fn merge_fields(base: &NetworkEntry, fields: &Map<String, Value>) -> Option<Value> {
    match serde_json::to_value(base) {
        Ok(Value::Object(mut merged)) => {
            merged.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
            Some(Value::Object(merged))
        }
        Ok(_) => None,
        Err(err) => {
            warn!("Failed to merge inline network fields: {err}");
            None
        }
    }
}

/// Rewrites the first addressable interface to carry `address` statically.
///
/// Only interfaces that emit their own attachment definition are candidates,
/// so pod-network and pre-existing shared attachments are skipped. The first
/// candidate whose IPAM range is a CIDR decides the outcome: an address
/// outside it leaves every interface untouched. At most one interface is
/// rewritten.
pub fn inject_static(interfaces: &mut [InterfaceSpec], vm_name: &str, address: IpAddr) -> Injection {
    for (ordinal, interface) in interfaces.iter_mut().enumerate() {
        if !interface.emits_attachment() {
            continue;
        }
        let Some(ipam) = interface.entry.ipam.as_mut() else {
            continue;
        };
        let Some(subnet) = ipam.subnet() else {
            continue;
        };

        if !subnet.contains(&address) {
            warn!("Instance {vm_name} address {address} is outside subnet {subnet}");
            return Injection::Rejected { subnet };
        }

        ipam.set_static(address, subnet.prefix_len());
        let gateway_ip = ipam.gateway.clone();

        let original = interface
            .entry
            .nad_name
            .clone()
            .unwrap_or_else(|| interface.name.clone());
        let nad_name = format!("{vm_name}-{original}");

        let derived = StaticAddress {
            static_ip: format!("{address}/{}", subnet.prefix_len()),
            gateway_ip,
            interface_name: guest_interface_name(ordinal),
        };

        info!(
            "{vm_name}: static address {} on attachment {nad_name} (interface {})",
            derived.static_ip, derived.interface_name
        );
        interface.entry.nad_name = Some(nad_name);
        return Injection::Applied(derived);
    }

    debug!("{vm_name}: no interface with a CIDR range for address {address}");
    Injection::NoCandidate
}
