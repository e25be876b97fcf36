use crate::constants::{
    INSTANCE_LABEL, MANAGED_LABEL, MANAGED_VALUE, PROJECT_LABEL, SPEC_LABEL,
};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use typed_builder::TypedBuilder;

/// The fixed label set stamped on every resource synthesized for one instance.
#[derive(TypedBuilder, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ManagedLabels {
    #[builder(setter(into))]
    project: String,

    #[builder(setter(into))]
    spec: String,

    #[builder(setter(into))]
    instance: String,
}

impl ManagedLabels {
    pub fn to_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (MANAGED_LABEL.to_string(), MANAGED_VALUE.to_string()),
            (PROJECT_LABEL.to_string(), self.project.clone()),
            (SPEC_LABEL.to_string(), self.spec.clone()),
            (INSTANCE_LABEL.to_string(), self.instance.clone()),
        ])
    }
}

/// Equality selector over the lifecycle labels of one spec, optionally
/// narrowed to one instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelSelector {
    project: String,
    spec: String,
    instance: Option<String>,
}

impl LabelSelector {
    pub fn for_spec<P: Into<String>, S: Into<String>>(project: P, spec: S) -> Self {
        Self {
            project: project.into(),
            spec: spec.into(),
            instance: None,
        }
    }

    #[must_use]
    pub fn with_instance<I: Into<String>>(mut self, instance: I) -> Self {
        self.instance = Some(instance.into());
        self
    }

    pub fn instance(&self) -> Option<&str> {
        self.instance.as_deref()
    }
}

impl Display for LabelSelector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{MANAGED_LABEL}={MANAGED_VALUE},{PROJECT_LABEL}={},{SPEC_LABEL}={}",
            self.project, self.spec
        )?;
        if let Some(instance) = &self.instance {
            write!(f, ",{INSTANCE_LABEL}={instance}")?;
        }
        Ok(())
    }
}
