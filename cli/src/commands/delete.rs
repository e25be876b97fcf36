use crate::cli::Cli;
use crate::commands::status::show_status;
use crate::commands::{format_age, print_table, selector};
use crate::kube::connect;
use crate::prompt::confirm;
use anyhow::{Context, Result};
use tabled::Tabled;
use vauto_core::cluster::ResourceSummary;
use vauto_core::config::ResolvedSpec;
use vauto_core::reconcile::delete::{self, DeletionSet};

#[derive(Tabled)]
struct DeletionRow {
    kind: String,
    name: String,
    found_by: &'static str,
    age: String,
}

fn rows<'a>(
    resources: &'a [ResourceSummary],
    found_by: &'static str,
) -> impl Iterator<Item = DeletionRow> + 'a {
    resources.iter().map(move |resource| DeletionRow {
        kind: resource.kind.short_name().to_string(),
        name: resource.name.clone(),
        found_by,
        age: format_age(resource.created),
    })
}

fn print_set(set: &DeletionSet) {
    let all = rows(&set.labeled, "labels")
        .chain(rows(&set.legacy, "name prefix"))
        .collect();
    print_table(
        &format!("Resources to delete in {}", set.namespace),
        all,
        2,
        false,
    );
}

pub async fn handle_delete_command(cli: &Cli, spec: &ResolvedSpec) -> Result<bool> {
    let cluster = connect().await?;
    let target = cli.target.as_deref();

    let set = delete::gather(
        &cluster,
        spec.namespace(),
        &selector(spec, target),
        spec.base_name(),
    )
    .await
    .context("Failed to look up resources to delete")?;

    if set.is_empty() {
        match target {
            Some(target) => println!("No resources found for instance {target}."),
            None => println!("No resources found for spec {}.", spec.spec()),
        }
        return Ok(true);
    }

    print_set(&set);
    if cli.dry_run {
        return Ok(true);
    }
    if !cli.yes && !confirm("Delete these resources?")? {
        println!("Aborted.");
        return Ok(true);
    }

    let report = delete::execute(&cluster, &set).await;
    println!(
        "Deleted {} resources, {} already gone.",
        report.deleted.len(),
        report.not_found.len()
    );
    for err in &report.errors {
        println!("  - {err}");
    }

    println!();
    show_status(&cluster, cli, spec).await;
    Ok(!report.failed())
}
