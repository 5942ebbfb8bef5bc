use std::path::Path;

use clap::{Args, Subcommand};
use tracing::info;

use super::Session;
use crate::config::secret_timeout;
use crate::errors::{Context, Error};
use crate::secrets::{extract, kube_client, talos, KubeSecretStore, SecretLocator, WaitSpec};
use crate::utils::fs::existing_path;

#[derive(Subcommand, Debug)]
pub enum SecretsCommand {
    /// Wait for the Cluster API kubeconfig secret and write it to disk
    GetKubeconfig(WaitArgs),
    /// Wait for the Cluster API talosconfig secret and write it to disk
    GetTalosconfig(WaitArgs),
    /// Generate a kubeconfig using talosctl and the Talos control plane
    KubeconfigViaTalos,
}

#[derive(Args, Debug)]
pub struct WaitArgs {
    /// Maximum time to wait for the secret, e.g. 20m
    #[arg(long)]
    pub timeout: Option<String>,
}

pub async fn run(command: SecretsCommand, session: &Session) -> Result<(), Error> {
    let cluster = &session.cluster;
    match command {
        SecretsCommand::GetKubeconfig(args) => {
            fetch(session, "kubeconfig", &cluster.kubeconfig_path, &args)
                .await
                .context("get-kubeconfig")
        }
        SecretsCommand::GetTalosconfig(args) => {
            fetch(session, "talosconfig", &cluster.talosconfig_path, &args)
                .await
                .context("get-talosconfig")
        }
        SecretsCommand::KubeconfigViaTalos => via_talos(session)
            .await
            .context("kubeconfig-via-talos"),
    }
}

/// Wait for `<cluster>-<kind>` and write its payload to `destination`.
async fn fetch(
    session: &Session,
    kind: &str,
    destination: &Path,
    args: &WaitArgs,
) -> Result<(), Error> {
    let cluster = &session.cluster;
    let timeout = secret_timeout(args.timeout.as_deref(), &session.file.secrets)?;
    tokio::fs::create_dir_all(&cluster.out_dir)
        .await
        .with_context(|| format!("ensure output dir {}", cluster.out_dir.display()))?;

    let client = kube_client(existing_path(&cluster.kubeconfig_path)).await?;
    let locator = SecretLocator::new(
        KubeSecretStore::new(client, &cluster.namespace),
        &cluster.namespace,
        &session.cancel,
    );
    let spec = WaitSpec::new(Some(format!("{}-{kind}", cluster.name)), &cluster.name, timeout);
    info!(
        pattern = ?spec.name_pattern,
        namespace = %cluster.namespace,
        timeout = ?spec.timeout,
        "Waiting for {kind} secret"
    );

    let name = locator.locate(&spec).await?;
    extract(locator.store(), &name, Some(kind), destination).await?;
    info!(secret = %name, path = %destination.display(), "Wrote {kind}");
    Ok(())
}

async fn via_talos(session: &Session) -> Result<(), Error> {
    let cluster = &session.cluster;
    if !cluster.kubeconfig_path.is_file() {
        return Err(Error::NotFound(format!(
            "kubeconfig {} (run: secrets get-kubeconfig)",
            cluster.kubeconfig_path.display()
        )));
    }
    tokio::fs::create_dir_all(&cluster.out_dir)
        .await
        .with_context(|| format!("ensure output dir {}", cluster.out_dir.display()))?;

    let client = kube_client(Some(&cluster.kubeconfig_path)).await?;
    talos::kubeconfig_via_talos(
        &session.runner,
        client,
        &cluster.talosconfig_path,
        &cluster.out_dir,
        &cluster.name,
    )
    .await?;
    Ok(())
}
