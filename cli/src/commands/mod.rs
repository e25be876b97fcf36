pub mod delete;
pub mod deploy;
pub mod inspect;
pub mod status;

use crate::cli::{Action, Cli, Invocation};
use crate::table_theme::TableTheme;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tabled::{Table, Tabled};
use vauto_api::LabelSelector;
use vauto_core::config::{ProjectLayout, ResolvedSpec, resolve};

/// Main command dispatcher. `Ok(false)` means the action ran but something
/// in it failed.
pub async fn handle_command(cli: &Cli, invocation: &Invocation) -> Result<bool> {
    let layout = ProjectLayout::new(&cli.base_dir);
    let mut spec = resolve(&layout, &invocation.project, &invocation.spec, cli.replicas)
        .with_context(|| {
            format!(
                "Failed to load spec '{}' of project '{}'",
                invocation.spec, invocation.project
            )
        })?;

    match invocation.action {
        Action::Deploy => {
            if let Some(target) = &cli.target {
                spec.retain_target(target)?;
            }
            deploy::handle_deploy_command(cli, spec).await
        }
        Action::Delete => delete::handle_delete_command(cli, &spec).await,
        Action::Status => status::handle_status_command(cli, &spec).await,
        Action::Inspect => {
            if let Some(target) = &cli.target {
                spec.retain_target(target)?;
            }
            inspect::handle_inspect_command(&spec)
        }
    }
}

/// Selector over the spec's resources, narrowed to the target when given.
pub fn selector(spec: &ResolvedSpec, target: Option<&str>) -> LabelSelector {
    let selector = LabelSelector::for_spec(spec.project(), spec.spec());
    match target {
        Some(target) => selector.with_instance(target),
        None => selector,
    }
}

pub fn format_age_from_datetime(timestamp: DateTime<Utc>) -> String {
    let duration = Utc::now().signed_duration_since(timestamp);
    if duration.num_days() > 0 {
        format!("{}d", duration.num_days())
    } else if duration.num_hours() > 0 {
        format!("{}h", duration.num_hours())
    } else if duration.num_minutes() > 0 {
        format!("{}m", duration.num_minutes())
    } else {
        format!("{}s", duration.num_seconds())
    }
}

pub fn format_age(age: Option<DateTime<Utc>>) -> String {
    match age {
        Some(timestamp) => format_age_from_datetime(timestamp),
        None => "<unknown>".to_string(),
    }
}

/// Prints a titled table, or a placeholder when there is nothing to show.
pub fn print_table<T: Tabled>(title: &str, rows: Vec<T>, state_column: usize, emoji: bool) {
    println!("{title}");
    if rows.is_empty() {
        println!("  (none)");
    } else {
        println!("{}", TableTheme::apply_status(Table::new(rows), state_column, emoji));
    }
    println!();
}
