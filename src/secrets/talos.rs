use std::path::{Path, PathBuf};

use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::{info, instrument};

use crate::errors::{Context, Error};
use crate::labels_and_annotations::CONTROL_PLANE_LABEL;
use crate::tools::exec::{ensure_commands, CommandRunner, Invocation};
use crate::utils::fs::{write_with_mode, PRIVATE_FILE_MODE};

/// KubePrism listens on every control-plane node on this port.
const KUBEPRISM_PORT: u16 = 7445;

/// InternalIP addresses in node order, without duplicates.
pub fn internal_ips(nodes: &[Node]) -> Vec<String> {
    let mut ips: Vec<String> = Vec::new();
    let addresses = nodes
        .iter()
        .filter_map(|node| node.status.as_ref())
        .filter_map(|status| status.addresses.as_ref())
        .flatten()
        .filter(|address| address.type_ == "InternalIP" && !address.address.is_empty());
    for address in addresses {
        if !ips.contains(&address.address) {
            ips.push(address.address.clone());
        }
    }
    ips
}

#[instrument(skip(client))]
pub async fn discover_control_plane_ips(client: Client) -> Result<Vec<String>, Error> {
    let nodes: Api<Node> = Api::all(client);
    let list = nodes
        .list(&ListParams::default().labels(CONTROL_PLANE_LABEL))
        .await
        .context("list control-plane nodes")?;
    let ips = internal_ips(&list.items);
    if ips.is_empty() {
        return Err(Error::NotFound(String::from(
            "InternalIP on any control-plane node",
        )));
    }
    Ok(ips)
}

pub fn talosctl_kubeconfig_target(out_dir: &Path, cluster: &str) -> PathBuf {
    out_dir.join(format!("kubeconfig-{cluster}-talosctl"))
}

fn talosctl(talosconfig: &Path, args: Vec<String>) -> Invocation {
    let mut full = vec![
        String::from("--talosconfig"),
        talosconfig.display().to_string(),
    ];
    full.extend(args);
    Invocation::new("talosctl", full)
}

/// Point the talosconfig at every control-plane node.
fn configure_invocations(talosconfig: &Path, ips: &[String]) -> Vec<Invocation> {
    ["endpoints", "nodes"]
        .into_iter()
        .map(|setting| {
            let mut args = vec![String::from("config"), setting.to_string()];
            args.extend(ips.iter().cloned());
            talosctl(talosconfig, args)
        })
        .collect()
}

/// Ask the first node for a kubeconfig, printed to stdout.
fn kubeconfig_invocation(talosconfig: &Path, node: &str) -> Invocation {
    talosctl(
        talosconfig,
        vec![
            String::from("kubeconfig"),
            String::from("-"),
            String::from("--nodes"),
            node.to_string(),
            String::from("--endpoints"),
            format!("{node}:{KUBEPRISM_PORT}"),
            String::from("--force"),
        ],
    )
}

/// Produce a kubeconfig for the workload cluster by asking talosctl, using
/// the control-plane addresses the current kubeconfig can see.
pub async fn kubeconfig_via_talos<R: CommandRunner + ?Sized>(
    runner: &R,
    client: Client,
    talosconfig: &Path,
    out_dir: &Path,
    cluster: &str,
) -> Result<PathBuf, Error> {
    if !talosconfig.is_file() {
        return Err(Error::NotFound(format!(
            "talosconfig {}",
            talosconfig.display()
        )));
    }
    ensure_commands(&["talosctl"])?;

    let ips = discover_control_plane_ips(client).await?;
    info!(?ips, "Discovered control-plane addresses");

    for invocation in configure_invocations(talosconfig, &ips) {
        runner
            .stream(&invocation)
            .await
            .with_context(|| format!("talosctl config {}", invocation.args[3]))?;
    }

    let output = runner
        .capture(&kubeconfig_invocation(talosconfig, &ips[0]))
        .await
        .context("talosctl kubeconfig")?;
    let target = talosctl_kubeconfig_target(out_dir, cluster);
    write_with_mode(&target, output.stdout.as_bytes(), PRIVATE_FILE_MODE).await?;
    info!(path = %target.display(), "Saved talosctl-generated kubeconfig");
    Ok(target)
}
