use anyhow::{Result, bail};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

pub const USAGE: &str = "vauto <project> <spec> <deploy|delete|status|inspect> [--target NAME] [--replicas N] [--yes] [--dry-run]";

#[derive(Parser, Debug)]
#[command(
    name = "vauto",
    about = "Provision fleets of KubeVirt virtual machines from declarative specs",
    version,
    long_about = "Resolves a project's spec against its infrastructure catalog, renders the boot config, attachments, root disk and virtual machine of every instance, and applies, deletes or reports on them in the cluster."
)]
pub struct Cli {
    /// Project, spec and action. The action keyword may appear in any position
    #[arg(value_name = "ARGS", num_args = 0..=3)]
    pub args: Vec<String>,

    /// Project name
    #[arg(short, long)]
    pub project: Option<String>,

    /// Spec name within the project
    #[arg(short, long)]
    pub spec: Option<String>,

    /// Action to run
    #[arg(short, long, value_enum)]
    pub action: Option<Action>,

    /// Number of instances for specs without an instance list
    #[arg(long)]
    pub replicas: Option<u32>,

    /// Restrict the action to one instance
    #[arg(short, long)]
    pub target: Option<String>,

    /// Skip confirmations
    #[arg(short, long)]
    pub yes: bool,

    /// Render only, never touch the cluster
    #[arg(long)]
    pub dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Use emojis in table output
    #[arg(long)]
    pub emoji: bool,

    /// Directory holding `projects/`
    #[arg(long, env = "VAUTO_BASE_DIR", default_value = ".")]
    pub base_dir: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Action {
    Deploy,
    Delete,
    #[value(alias = "list")]
    Status,
    Inspect,
}

impl Action {
    fn parse(arg: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(arg, true).ok()
    }
}

/// The project, spec and action of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub project: String,
    pub spec: String,
    pub action: Action,
}

impl Cli {
    /// Combines positional arguments with flags. Flags win; the first
    /// positional naming an action is the action, the rest fill project then
    /// spec.
    pub fn invocation(&self) -> Result<Invocation> {
        let mut action = self.action;
        let mut names = Vec::new();
        for arg in &self.args {
            match Action::parse(arg) {
                Some(parsed) if action.is_none() => action = Some(parsed),
                _ => names.push(arg.clone()),
            }
        }

        let mut names = names.into_iter();
        let project = self.project.clone().or_else(|| names.next());
        let spec = self.spec.clone().or_else(|| names.next());

        let mut missing = Vec::new();
        if project.is_none() {
            missing.push("project");
        }
        if spec.is_none() {
            missing.push("spec");
        }
        if action.is_none() {
            missing.push("action");
        }

        match (project, spec, action) {
            (Some(project), Some(spec), Some(action)) => Ok(Invocation {
                project,
                spec,
                action,
            }),
            _ => {
                let mut message = format!("Missing {}\nUsage: {USAGE}", missing.join(", "));
                if action.is_none() {
                    if let Some(target) = &self.target {
                        message.push_str(&format!(
                            "\nHint: to remove one instance, run `vauto <project> <spec> delete --target {target}`"
                        ));
                    }
                }
                bail!(message)
            }
        }
    }
}
