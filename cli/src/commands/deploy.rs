use crate::cli::Cli;
use crate::commands::print_table;
use crate::commands::status::show_status;
use crate::kube::connect;
use crate::prompt::{TerminalCollector, confirm, instance_gate};
use anyhow::{Context, Result};
use itertools::Itertools;
use tabled::Tabled;
use tracing::{error, info};
use vauto_core::config::{ImageSource, ResolvedSpec};
use vauto_core::credentials::{collect_secrets, requests_for};
use vauto_core::reconcile::deploy::{self, DeployPlan, FleetReport, Gate};

#[derive(Tabled)]
struct OutcomeRow {
    instance: String,
    kind: String,
    name: String,
    state: String,
    message: String,
}

fn describe_image(image: &ImageSource) -> String {
    match image {
        ImageSource::Http(url) => url.clone(),
        ImageSource::Pvc { name, namespace } => match namespace {
            Some(namespace) => format!("pvc {namespace}/{name}"),
            None => format!("pvc {name}"),
        },
    }
}

fn print_summary(spec: &ResolvedSpec, plan: &DeployPlan, users: &[String]) {
    println!("Project:       {}", spec.project());
    println!("Spec:          {}", spec.spec());
    println!("Namespace:     {}", plan.namespace);
    println!("Image:         {}", describe_image(&plan.image));
    println!(
        "Disk:          {}",
        spec.sizing().disk_size.as_deref().unwrap_or("-")
    );
    println!(
        "Storage class: {}",
        spec.sizing().storage_class.as_deref().unwrap_or("(default)")
    );
    println!(
        "Interfaces:    {}",
        plan.interfaces.iter().map(|i| i.name.as_str()).join(", ")
    );
    if !users.is_empty() {
        println!("Users:         {}", users.join(", "));
    }
    println!("Instances:");
    for instance in &plan.instances {
        let address = instance
            .static_address
            .as_ref()
            .map(|derived| format!("{} on {}", derived.static_ip, derived.interface_name))
            .or_else(|| instance.address.map(|address| address.to_string()))
            .unwrap_or_else(|| "dynamic".to_string());
        match &instance.resources {
            Ok(_) => println!("  - {} ({address})", instance.name),
            Err(err) => println!("  - {} ({address}): {err}", instance.name),
        }
    }
    println!();
}

fn print_rendered(plan: &DeployPlan) -> Result<()> {
    for instance in &plan.instances {
        let Ok(resources) = &instance.resources else {
            continue;
        };
        for resource in resources {
            println!("---");
            print!(
                "{}",
                resource
                    .to_yaml()
                    .with_context(|| format!("Failed to print {}", resource.name()))?
            );
        }
    }
    Ok(())
}

fn print_report(fleet: &FleetReport, emoji: bool) {
    let rows = fleet
        .instances
        .iter()
        .flat_map(|instance| {
            instance.outcomes.iter().map(|outcome| OutcomeRow {
                instance: instance.name.clone(),
                kind: outcome.kind.short_name().to_string(),
                name: outcome.name.clone(),
                state: outcome.state.to_string(),
                message: outcome.message.clone().unwrap_or_default(),
            })
        })
        .collect();
    print_table("Deployment", rows, 3, emoji);

    let skipped: Vec<_> = fleet
        .instances
        .iter()
        .filter(|instance| instance.skipped)
        .map(|instance| instance.name.as_str())
        .collect();
    if !skipped.is_empty() {
        println!("Skipped: {}", skipped.join(", "));
    }
    if fleet.quit {
        println!("Stopped before the end of the fleet.");
    }

    let failures: Vec<_> = fleet.failures().collect();
    if !failures.is_empty() {
        println!("Failures:");
        for (instance, err) in failures {
            println!("  - {instance}: {err}");
        }
    }
}

pub async fn handle_deploy_command(cli: &Cli, mut spec: ResolvedSpec) -> Result<bool> {
    spec.ensure_instances()?;
    let requests = requests_for(&spec);
    let mut users: Vec<String> = requests
        .iter()
        .filter_map(|request| request.account.clone())
        .collect();
    if let Some(username) = &spec.auth().username {
        if !users.contains(username) {
            users.insert(0, username.clone());
        }
    }
    collect_secrets(&mut spec, &requests, &TerminalCollector)?;

    let plan = deploy::plan(&spec)?;
    print_summary(&spec, &plan, &users);
    let renderable = plan.instances.iter().all(|i| i.resources.is_ok());

    if cli.dry_run {
        print_rendered(&plan)?;
        return Ok(renderable);
    }

    if !cli.yes && !confirm("Proceed with deployment?")? {
        println!("Aborted.");
        return Ok(true);
    }

    let cluster = connect().await?;
    let ask_each = !cli.yes && plan.instances.len() > 1;
    let fleet = deploy::apply(&cluster, plan, |instance| {
        if ask_each {
            instance_gate(instance)
        } else {
            Gate::Apply
        }
    })
    .await
    .context("Failed to prepare the namespace")?;

    print_report(&fleet, cli.emoji);
    if fleet.failed() {
        error!("Deployment finished with failures");
    } else {
        info!("Deployment finished");
    }

    println!();
    show_status(&cluster, cli, &spec).await;
    Ok(!fleet.failed())
}
