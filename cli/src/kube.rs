use anyhow::{Context, Result};
use kube::{Client, Config};
use tracing::debug;
use vauto_core::cluster::KubeCluster;

/// Connects with the inferred configuration (`KUBECONFIG`, in-cluster, then
/// `~/.kube/config`).
pub async fn connect() -> Result<KubeCluster> {
    let config = Config::infer()
        .await
        .context("Failed to infer Kubernetes configuration")?;
    debug!("Using cluster {}", config.cluster_url);
    let client = Client::try_from(config).context("Failed to create Kubernetes client")?;
    Ok(KubeCluster::new(client))
}
