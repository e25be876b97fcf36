pub mod boot_script;

use crate::config::catalog::ImageSource;
use crate::config::context::EffectiveContext;
use gtmpl::{Context, FuncError, Template, gtmpl_fn};
use gtmpl_derive::Gtmpl;
use kube::api::DynamicObject;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use thiserror::Error;
use typed_builder::TypedBuilder;
use vauto_api::ResourceKind;

const SECRET_TEMPLATE: &str = include_str!("./templates/secret.kubernetes-helm-yaml");
const NETWORK_ATTACHMENT_TEMPLATE: &str =
    include_str!("./templates/network_attachment.kubernetes-helm-yaml");
const DATA_VOLUME_TEMPLATE: &str = include_str!("./templates/data_volume.kubernetes-helm-yaml");
const VIRTUAL_MACHINE_TEMPLATE: &str =
    include_str!("./templates/virtual_machine.kubernetes-helm-yaml");

const CNI_VERSION: &str = "0.3.1";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Failed to render boot script for {instance}: {source}")]
    BootScript {
        instance: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("Failed to render {kind} manifest for {instance}: {reason}")]
    Render {
        instance: String,
        kind: ResourceKind,
        reason: String,
    },

    #[error("Rendered {kind} manifest for {instance} is not a valid resource: {source}")]
    Parse {
        instance: String,
        kind: ResourceKind,
        #[source]
        source: serde_yaml::Error,
    },
}

/// One rendered resource carrying the lifecycle labels of its instance.
#[derive(Debug, Clone)]
pub struct ManagedResource {
    pub kind: ResourceKind,
    pub object: DynamicObject,
}

impl ManagedResource {
    pub fn name(&self) -> &str {
        self.object.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.object.metadata.namespace.as_deref()
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        self.object.metadata.labels.clone().unwrap_or_default()
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.object)
    }
}

gtmpl_fn!(
    fn quote(s: String) -> Result<String, FuncError> {
        Ok(serde_json::Value::String(s).to_string())
    }
);

#[derive(Clone, TypedBuilder, Debug, Gtmpl)]
struct SecretValues {
    #[builder(setter(into))]
    name: String,
    #[builder(setter(into))]
    namespace: String,
    #[builder(setter(into))]
    user_data: String,
}

#[derive(Clone, TypedBuilder, Debug, Gtmpl)]
struct NetworkAttachmentValues {
    #[builder(setter(into))]
    name: String,
    #[builder(setter(into))]
    namespace: String,
    #[builder(setter(into))]
    config: String,
}

#[derive(Clone, TypedBuilder, Debug, Gtmpl)]
struct DataVolumeValues {
    #[builder(setter(into))]
    name: String,
    #[builder(setter(into))]
    namespace: String,
    #[builder(default, setter(into))]
    url: String,
    #[builder(default, setter(into))]
    pvc_name: String,
    #[builder(default, setter(into))]
    pvc_namespace: String,
    #[builder(setter(into))]
    disk_size: String,
    #[builder(default, setter(into))]
    storage_class: String,
    #[builder(default, setter(into))]
    access_mode: String,
    #[builder(default, setter(into))]
    volume_mode: String,
}

#[derive(Clone, TypedBuilder, Debug, Gtmpl)]
struct InterfaceValues {
    #[builder(setter(into))]
    name: String,
    #[builder(setter(into))]
    binding: String,
    #[builder(default, setter(into))]
    network_name: String,
}

#[derive(Clone, TypedBuilder, Debug, Gtmpl)]
struct VirtualMachineValues {
    #[builder(setter(into))]
    name: String,
    #[builder(setter(into))]
    namespace: String,
    #[builder(setter(into))]
    cpu: String,
    #[builder(setter(into))]
    memory: String,
    #[builder(setter(into))]
    root_disk: String,
    #[builder(setter(into))]
    secret: String,
    interfaces: Vec<InterfaceValues>,
}

struct Renderer<'a> {
    ctx: &'a EffectiveContext,
    labels: BTreeMap<String, String>,
}

impl Renderer<'_> {
    fn render<V: Into<gtmpl_value::Value>>(
        &self,
        kind: ResourceKind,
        text: &str,
        values: V,
    ) -> Result<ManagedResource, TemplateError> {
        let render_error = |reason: String| TemplateError::Render {
            instance: self.ctx.vm_name.clone(),
            kind,
            reason,
        };

        let mut template = Template::default();
        template.add_func("quote", quote);
        template
            .parse(text)
            .map_err(|err| render_error(err.to_string()))?;
        let yaml = template
            .render(&Context::from(values))
            .map_err(|err| render_error(err.to_string()))?;

        let mut object: DynamicObject =
            serde_yaml::from_str(&yaml).map_err(|source| TemplateError::Parse {
                instance: self.ctx.vm_name.clone(),
                kind,
                source,
            })?;

        object
            .metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(self.labels.clone());

        Ok(ManagedResource { kind, object })
    }
}

/// Renders the resources of one instance in creation order: boot config,
/// attachment definitions, root disk, virtual machine.
pub fn synthesize(ctx: &EffectiveContext) -> Result<Vec<ManagedResource>, TemplateError> {
    let renderer = Renderer {
        ctx,
        labels: ctx.labels().to_map(),
    };

    let user_data = boot_script::render(ctx).map_err(|source| TemplateError::BootScript {
        instance: ctx.vm_name.clone(),
        source,
    })?;

    let mut resources = Vec::with_capacity(ctx.interfaces.len() + 3);

    resources.push(
        renderer.render(
            ResourceKind::Secret,
            SECRET_TEMPLATE,
            SecretValues::builder()
                .name(ctx.secret_name())
                .namespace(ctx.namespace.as_str())
                .user_data(user_data)
                .build(),
        )?,
    );

    let mut interfaces = Vec::with_capacity(ctx.interfaces.len());
    for (ordinal, interface) in ctx.interfaces.iter().enumerate() {
        let nic = format!("nic{ordinal}");
        let Some(attachment) = interface.attachment_name(&ctx.vm_name, ordinal) else {
            interfaces.push(
                InterfaceValues::builder()
                    .name(nic)
                    .binding("masquerade")
                    .build(),
            );
            continue;
        };

        if interface.emits_attachment() {
            resources.push(
                renderer.render(
                    ResourceKind::NetworkAttachmentDefinition,
                    NETWORK_ATTACHMENT_TEMPLATE,
                    NetworkAttachmentValues::builder()
                        .name(attachment.as_str())
                        .namespace(ctx.namespace.as_str())
                        .config(cni_config(&attachment, interface))
                        .build(),
                )?,
            );
        }

        interfaces.push(
            InterfaceValues::builder()
                .name(nic)
                .binding("bridge")
                .network_name(attachment)
                .build(),
        );
    }

    let data_volume = match &ctx.image {
        ImageSource::Http(url) => DataVolumeValues::builder()
            .name(ctx.root_disk_name())
            .namespace(ctx.namespace.as_str())
            .url(url.as_str())
            .disk_size(ctx.disk_size.as_str())
            .storage_class(ctx.storage_class.clone().unwrap_or_default())
            .access_mode(ctx.access_mode.clone().unwrap_or_default())
            .volume_mode(ctx.volume_mode.clone().unwrap_or_default())
            .build(),
        ImageSource::Pvc { name, namespace } => DataVolumeValues::builder()
            .name(ctx.root_disk_name())
            .namespace(ctx.namespace.as_str())
            .pvc_name(name.as_str())
            .pvc_namespace(namespace.clone().unwrap_or_else(|| ctx.namespace.clone()))
            .disk_size(ctx.disk_size.as_str())
            .storage_class(ctx.storage_class.clone().unwrap_or_default())
            .access_mode(ctx.access_mode.clone().unwrap_or_default())
            .volume_mode(ctx.volume_mode.clone().unwrap_or_default())
            .build(),
    };
    resources.push(renderer.render(ResourceKind::DataVolume, DATA_VOLUME_TEMPLATE, data_volume)?);

    let mut vm = renderer.render(
        ResourceKind::VirtualMachine,
        VIRTUAL_MACHINE_TEMPLATE,
        VirtualMachineValues::builder()
            .name(ctx.vm_name.as_str())
            .namespace(ctx.namespace.as_str())
            .cpu(ctx.cpu.to_string())
            .memory(ctx.memory.as_str())
            .root_disk(ctx.root_disk_name())
            .secret(ctx.secret_name())
            .interfaces(interfaces)
            .build(),
    )?;
    stamp_template_labels(&mut vm.object, &renderer.labels);
    resources.push(vm);

    Ok(resources)
}

/// Runtime instances do not inherit the labels of their virtual machine, so
/// they are copied into the pod template metadata as well.
fn stamp_template_labels(object: &mut DynamicObject, labels: &BTreeMap<String, String>) {
    let Some(root) = object.data.as_object_mut() else {
        return;
    };
    let template_labels = root
        .entry("spec")
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .map(|spec| spec.entry("template").or_insert_with(|| json!({})))
        .and_then(Value::as_object_mut)
        .map(|template| template.entry("metadata").or_insert_with(|| json!({})))
        .and_then(Value::as_object_mut)
        .map(|metadata| metadata.entry("labels").or_insert_with(|| json!({})))
        .and_then(Value::as_object_mut);

    if let Some(template_labels) = template_labels {
        for (key, value) in labels {
            template_labels.insert(key.clone(), Value::String(value.clone()));
        }
    }
}

/// Bridge CNI configuration for one attachment definition.
fn cni_config(name: &str, interface: &crate::net::InterfaceSpec) -> String {
    let entry = &interface.entry;
    let mut config = Map::new();
    config.insert("cniVersion".into(), CNI_VERSION.into());
    config.insert("name".into(), name.into());
    config.insert("type".into(), "bridge".into());
    if let Some(bridge) = &entry.bridge {
        config.insert("bridge".into(), bridge.clone().into());
    }
    if let Some(mtu) = entry.mtu {
        config.insert("mtu".into(), mtu.into());
    }
    if let Some(vlan) = entry.vlan {
        config.insert("vlan".into(), vlan.into());
    }
    if let Some(ipam) = &entry.ipam {
        config.insert(
            "ipam".into(),
            serde_json::to_value(ipam).unwrap_or_else(|_| json!({})),
        );
    }
    Value::Object(config).to_string()
}
