pub mod catalog;
pub mod context;
pub mod document;
pub mod resolver;
pub mod serde;

pub use catalog::{AttachmentType, Catalog, ImageEntry, ImageSource, Ipam, NetworkEntry};
pub use context::EffectiveContext;
pub use document::{Auth, InputDecl, InstanceDescriptor, NetworkRef, SpecDocument};
pub use resolver::{ResolutionError, ResolvedSpec, resolve};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("VM spec not found at {}", .0.display())]
    SpecNotFound(PathBuf),

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed document {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Document {} is not a mapping", .0.display())]
    NotAMapping(PathBuf),
}

/// Where project directories live on disk.
///
/// ```text
/// <base>/projects/<project>/infrastructure/{networks,images,storage}.yaml
/// <base>/projects/<project>/specs/<spec>.yaml
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    base_dir: PathBuf,
}

impl ProjectLayout {
    pub fn new<P: Into<PathBuf>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn project_dir(&self, project: &str) -> PathBuf {
        self.base_dir.join("projects").join(project)
    }

    pub fn infrastructure_dir(&self, project: &str) -> PathBuf {
        self.project_dir(project).join("infrastructure")
    }

    pub fn spec_path(&self, project: &str, spec: &str) -> PathBuf {
        self.project_dir(project)
            .join("specs")
            .join(format!("{spec}.yaml"))
    }
}
