use crate::constants::{CDI_GROUP, KUBEVIRT_GROUP, MULTUS_GROUP};
use kube::core::{ApiResource, GroupVersionKind};
use strum::{Display, EnumIter, IntoStaticStr};

/// Every cluster kind the tool reads or writes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter,
    IntoStaticStr,
)]
pub enum ResourceKind {
    Namespace,
    Secret,
    NetworkAttachmentDefinition,
    DataVolume,
    PersistentVolumeClaim,
    VirtualMachine,
    VirtualMachineInstance,
    Pod,
}

/// Kinds stamped with lifecycle labels, queried and bulk-deleted by selector.
pub const MANAGED_KINDS: [ResourceKind; 5] = [
    ResourceKind::VirtualMachine,
    ResourceKind::DataVolume,
    ResourceKind::PersistentVolumeClaim,
    ResourceKind::Secret,
    ResourceKind::NetworkAttachmentDefinition,
];

/// Kinds scanned by name prefix for resources that predate label tracking.
pub const LEGACY_KINDS: [ResourceKind; 4] = [
    ResourceKind::VirtualMachine,
    ResourceKind::DataVolume,
    ResourceKind::PersistentVolumeClaim,
    ResourceKind::Secret,
];

impl ResourceKind {
    fn coordinates(self) -> (&'static str, &'static str, &'static str) {
        match self {
            ResourceKind::Namespace => ("", "v1", "namespaces"),
            ResourceKind::Secret => ("", "v1", "secrets"),
            ResourceKind::PersistentVolumeClaim => ("", "v1", "persistentvolumeclaims"),
            ResourceKind::Pod => ("", "v1", "pods"),
            ResourceKind::NetworkAttachmentDefinition => {
                (MULTUS_GROUP, "v1", "network-attachment-definitions")
            }
            ResourceKind::DataVolume => (CDI_GROUP, "v1beta1", "datavolumes"),
            ResourceKind::VirtualMachine => (KUBEVIRT_GROUP, "v1", "virtualmachines"),
            ResourceKind::VirtualMachineInstance => {
                (KUBEVIRT_GROUP, "v1", "virtualmachineinstances")
            }
        }
    }

    pub fn group(self) -> &'static str {
        self.coordinates().0
    }

    pub fn version(self) -> &'static str {
        self.coordinates().1
    }

    pub fn plural(self) -> &'static str {
        self.coordinates().2
    }

    /// Short name as printed in `kind/name` references.
    pub fn short_name(self) -> &'static str {
        match self {
            ResourceKind::Namespace => "ns",
            ResourceKind::Secret => "secret",
            ResourceKind::NetworkAttachmentDefinition => "net-attach-def",
            ResourceKind::DataVolume => "dv",
            ResourceKind::PersistentVolumeClaim => "pvc",
            ResourceKind::VirtualMachine => "vm",
            ResourceKind::VirtualMachineInstance => "vmi",
            ResourceKind::Pod => "pod",
        }
    }

    /// Attachments may be shared between instances through one catalog entry,
    /// so an existing one is not an error.
    pub fn is_shared(self) -> bool {
        self == ResourceKind::NetworkAttachmentDefinition
    }

    pub fn api_resource(self) -> ApiResource {
        let kind: &'static str = self.into();
        let gvk = GroupVersionKind::gvk(self.group(), self.version(), kind);
        ApiResource::from_gvk_with_plural(&gvk, self.plural())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    #[rstest]
    #[case(ResourceKind::Secret, "v1")]
    #[case(ResourceKind::VirtualMachine, "kubevirt.io/v1")]
    #[case(ResourceKind::DataVolume, "cdi.kubevirt.io/v1beta1")]
    #[case(ResourceKind::NetworkAttachmentDefinition, "k8s.cni.cncf.io/v1")]
    fn test_api_version(#[case] kind: ResourceKind, #[case] expected: &str) {
        assert_eq!(kind.api_resource().api_version, expected);
    }

    #[test]
    fn test_api_resource_carries_plural() {
        let ar = ResourceKind::NetworkAttachmentDefinition.api_resource();
        assert_eq!(ar.kind, "NetworkAttachmentDefinition");
        assert_eq!(ar.plural, "network-attachment-definitions");
        assert_eq!(ar.api_version, "k8s.cni.cncf.io/v1");
    }

    #[test]
    fn test_legacy_kinds_are_managed() {
        for kind in LEGACY_KINDS {
            assert!(MANAGED_KINDS.contains(&kind));
        }
        assert!(!LEGACY_KINDS.contains(&ResourceKind::NetworkAttachmentDefinition));
    }

    #[test]
    fn test_only_attachments_are_shared() {
        let shared: Vec<_> = ResourceKind::iter().filter(|k| k.is_shared()).collect();
        assert_eq!(shared, vec![ResourceKind::NetworkAttachmentDefinition]);
    }
}
