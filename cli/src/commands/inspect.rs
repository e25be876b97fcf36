use crate::commands::print_table;
use anyhow::Result;
use itertools::Itertools;
use serde_yaml::Value;
use tabled::Tabled;
use tracing::warn;
use vauto_core::config::{AttachmentType, EffectiveContext, ImageSource, ResolvedSpec};
use vauto_core::credentials::requests_for;
use vauto_core::manifests::boot_script;

#[derive(Tabled)]
struct InstanceRow {
    name: String,
    cpu: String,
    memory: String,
    disk: String,
    address: String,
}

#[derive(Tabled)]
struct NetworkRow {
    name: String,
    #[tabled(rename = "type")]
    attachment: String,
    attachment_name: String,
    bridge: String,
    range: String,
}

#[derive(Tabled)]
struct ImageRow {
    name: String,
    source: String,
    min_cpu: String,
    min_memory: String,
}

#[derive(Tabled)]
struct StorageRow {
    name: String,
    storage_class: String,
    disk_size: String,
    access_mode: String,
    volume_mode: String,
}

/// What a cloud-config boot script does, as far as it parses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootScriptSummary {
    CloudConfig {
        users: Vec<String>,
        packages: usize,
        run_commands: usize,
    },
    Opaque {
        bytes: usize,
    },
}

impl BootScriptSummary {
    pub fn of(script: &str) -> Self {
        let Ok(Value::Mapping(document)) = serde_yaml::from_str::<Value>(script) else {
            return Self::Opaque {
                bytes: script.len(),
            };
        };

        let list = |key: &str| {
            document
                .get(key)
                .and_then(Value::as_sequence)
                .cloned()
                .unwrap_or_default()
        };

        let users = list("users")
            .iter()
            .filter_map(|user| match user {
                Value::String(name) => Some(name.clone()),
                Value::Mapping(entry) => entry.get("name").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect();

        Self::CloudConfig {
            users,
            packages: list("packages").len(),
            run_commands: list("runcmd").len(),
        }
    }
}

impl std::fmt::Display for BootScriptSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CloudConfig {
                users,
                packages,
                run_commands,
            } => {
                let users = if users.is_empty() {
                    "-".to_string()
                } else {
                    users.join(", ")
                };
                write!(
                    f,
                    "users: {users}; packages: {packages}; run commands: {run_commands}"
                )
            }
            Self::Opaque { bytes } => write!(f, "{bytes} bytes (not a cloud-config document)"),
        }
    }
}

fn optional(value: Option<&String>) -> String {
    value.cloned().unwrap_or_else(|| "-".to_string())
}

fn describe_source(source: Option<ImageSource>) -> String {
    match source {
        Some(ImageSource::Http(url)) => url,
        Some(ImageSource::Pvc { name, namespace }) => {
            format!("pvc {}", namespace.map_or(name.clone(), |ns| format!("{ns}/{name}")))
        }
        None => "(no source)".to_string(),
    }
}

fn instance_rows(spec: &ResolvedSpec, contexts: &[EffectiveContext]) -> Vec<InstanceRow> {
    if contexts.is_empty() {
        return spec
            .instances()
            .iter()
            .map(|instance| InstanceRow {
                name: instance.name.clone(),
                cpu: "-".to_string(),
                memory: "-".to_string(),
                disk: "-".to_string(),
                address: instance.ip.map_or("-".to_string(), |ip| ip.to_string()),
            })
            .collect();
    }

    contexts
        .iter()
        .map(|ctx| InstanceRow {
            name: ctx.vm_name.clone(),
            cpu: ctx.cpu.to_string(),
            memory: ctx.memory.clone(),
            disk: ctx.disk_size.clone(),
            address: ctx
                .static_address
                .as_ref()
                .map(|derived| format!("{} ({})", derived.static_ip, derived.interface_name))
                .or_else(|| ctx.target_address.map(|ip| ip.to_string()))
                .unwrap_or_else(|| "dynamic".to_string()),
        })
        .collect()
}

pub fn handle_inspect_command(spec: &ResolvedSpec) -> Result<bool> {
    let mut healthy = true;
    let contexts = match spec.contexts() {
        Ok(mut contexts) => {
            for ctx in &mut contexts {
                if let Err(err) = ctx.apply_target_address() {
                    warn!("{err}");
                    healthy = false;
                }
            }
            contexts
        }
        Err(err) => {
            warn!("{err}");
            healthy = false;
            Vec::new()
        }
    };

    println!("Project:   {}", spec.project());
    println!("Spec:      {}", spec.spec());
    println!("Namespace: {}", spec.namespace());
    println!("Base name: {}", spec.base_name());
    println!(
        "Storage:   class {}, access {}, volume mode {}",
        optional(spec.sizing().storage_class.as_ref()),
        optional(spec.access_mode().as_ref()),
        optional(spec.volume_mode().as_ref())
    );
    println!();

    print_table("Instances", instance_rows(spec, &contexts), 0, false);

    let script = contexts
        .first()
        .and_then(|ctx| boot_script::render(ctx).ok())
        .unwrap_or_else(|| spec.boot_script().clone());
    println!("Boot script: {}", BootScriptSummary::of(&script));
    let secrets = requests_for(spec).into_iter().map(|r| r.key).join(", ");
    if !secrets.is_empty() {
        println!("Secrets:     {secrets}");
    }
    println!();

    let catalog = spec.catalog();
    let networks = catalog
        .networks()
        .iter()
        .map(|(name, entry)| NetworkRow {
            name: name.clone(),
            attachment: match entry.attachment {
                AttachmentType::PodNetwork => "pod".to_string(),
                AttachmentType::Bridged => "bridged".to_string(),
            },
            attachment_name: match entry.attachment {
                AttachmentType::PodNetwork => "-".to_string(),
                AttachmentType::Bridged => entry
                    .nad_name
                    .clone()
                    .unwrap_or_else(|| "<vm>-net-<n>".to_string()),
            },
            bridge: optional(entry.bridge.as_ref()),
            range: optional(entry.ipam.as_ref().and_then(|ipam| ipam.range.as_ref())),
        })
        .collect();
    print_table("Networks", networks, 1, false);

    let images = catalog
        .images()
        .iter()
        .map(|(name, entry)| ImageRow {
            name: name.clone(),
            source: describe_source(entry.source()),
            min_cpu: entry.min_cpu.map_or("-".to_string(), |cpu| cpu.to_string()),
            min_memory: optional(entry.min_memory.as_ref()),
        })
        .collect();
    print_table("Images", images, 1, false);

    let profiles = catalog
        .storage_profiles()
        .iter()
        .map(|(name, profile)| StorageRow {
            name: name.clone(),
            storage_class: optional(profile.storage_class.as_ref()),
            disk_size: optional(profile.disk_size.as_ref()),
            access_mode: optional(profile.access_mode.as_ref()),
            volume_mode: optional(profile.volume_mode.as_ref()),
        })
        .collect();
    print_table("Storage profiles", profiles, 1, false);

    Ok(healthy)
}
