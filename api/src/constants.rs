pub const MANAGED_LABEL: &str = "v-auto/managed";
pub const MANAGED_VALUE: &str = "true";

pub const PROJECT_LABEL: &str = "v-auto/project";
pub const SPEC_LABEL: &str = "v-auto/spec";
pub const INSTANCE_LABEL: &str = "v-auto/name";

pub const NAMESPACE_PREFIX: &str = "vm-";

pub const KUBEVIRT_GROUP: &str = "kubevirt.io";
pub const CDI_GROUP: &str = "cdi.kubevirt.io";
pub const MULTUS_GROUP: &str = "k8s.cni.cncf.io";
