use crate::cli::Cli;
use crate::commands::{format_age, print_table, selector};
use crate::kube::connect;
use anyhow::Result;
use tabled::Tabled;
use vauto_core::cluster::ClusterClient;
use vauto_core::config::ResolvedSpec;
use vauto_core::reconcile::status::{
    self, StatusQuery, StatusReport, machine_state, phase, primary_address, progress,
};

#[derive(Tabled)]
struct MachineRow {
    name: String,
    status: String,
    age: String,
}

#[derive(Tabled)]
struct RuntimeRow {
    kind: String,
    name: String,
    phase: String,
    address: String,
    age: String,
}

#[derive(Tabled)]
struct StorageRow {
    kind: String,
    name: String,
    phase: String,
    progress: String,
    age: String,
}

#[derive(Tabled)]
struct ConfigRow {
    kind: String,
    name: String,
    age: String,
}

#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "type")]
    event_type: String,
    reason: String,
    object: String,
    message: String,
    count: i32,
    age: String,
}

pub fn status_query(spec: &ResolvedSpec, target: Option<&str>) -> StatusQuery {
    StatusQuery {
        namespace: spec.namespace().clone(),
        selector: selector(spec, target),
        instances: target.map_or_else(|| spec.instance_names(), |t| vec![t.to_string()]),
    }
}

pub async fn handle_status_command(cli: &Cli, spec: &ResolvedSpec) -> Result<bool> {
    let cluster = connect().await?;
    show_status(&cluster, cli, spec).await;
    Ok(true)
}

/// Prints every section of the status report. Sections that could not be
/// queried are listed as warnings at the end.
pub async fn show_status(cluster: &dyn ClusterClient, cli: &Cli, spec: &ResolvedSpec) {
    let query = status_query(spec, cli.target.as_deref());
    let report = status::collect(cluster, &query).await;

    println!(
        "Status of {}/{} in namespace {}",
        spec.project(),
        spec.spec(),
        spec.namespace()
    );
    println!();
    render(&report, cli.emoji);
}

fn render(report: &StatusReport, emoji: bool) {
    let machines = report
        .machines
        .iter()
        .map(|vm| MachineRow {
            name: vm.name.clone(),
            status: machine_state(vm).to_string(),
            age: format_age(vm.created),
        })
        .collect();
    print_table("Virtual machines", machines, 1, emoji);

    let runtime = report
        .runtime
        .iter()
        .map(|r| RuntimeRow {
            kind: r.kind.short_name().to_string(),
            name: r.name.clone(),
            phase: phase(r).to_string(),
            address: primary_address(r).unwrap_or("-").to_string(),
            age: format_age(r.created),
        })
        .collect();
    print_table("Runtime", runtime, 2, emoji);

    let storage = report
        .storage
        .iter()
        .map(|r| StorageRow {
            kind: r.kind.short_name().to_string(),
            name: r.name.clone(),
            phase: phase(r).to_string(),
            progress: progress(r).unwrap_or("-").to_string(),
            age: format_age(r.created),
        })
        .collect();
    print_table("Storage", storage, 2, emoji);

    let config = report
        .config
        .iter()
        .map(|r| ConfigRow {
            kind: r.kind.short_name().to_string(),
            name: r.name.clone(),
            age: format_age(r.created),
        })
        .collect();
    print_table("Configuration", config, 0, false);

    let events = report
        .events
        .iter()
        .map(|e| EventRow {
            event_type: e.event_type.clone(),
            reason: e.reason.clone(),
            object: e.object.clone(),
            message: e.message.clone(),
            count: e.count,
            age: format_age(e.timestamp),
        })
        .collect();
    print_table("Recent events", events, 0, emoji);

    if report.is_empty() {
        println!("No resources found.");
    }
    for warning in &report.warnings {
        println!("Warning: {warning}");
    }
}
