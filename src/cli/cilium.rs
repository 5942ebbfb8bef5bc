use clap::{Args, Subcommand};
use tracing::info;

use super::Session;
use crate::errors::{Context, Error};
use crate::tools::cilium;
use crate::utils::fs::existing_path;

#[derive(Subcommand, Debug)]
pub enum CiliumCommand {
    /// Install or upgrade Cilium via helm (kube-proxy-free, KubePrism ready)
    Install(InstallArgs),
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Cilium version to install; overrides --cilium-version
    #[arg(long = "version")]
    pub version: Option<String>,
}

pub async fn run(command: CiliumCommand, session: &Session) -> Result<(), Error> {
    match command {
        CiliumCommand::Install(args) => {
            let version = args
                .version
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| session.cluster.cilium_version.clone());
            let kubeconfig = existing_path(&session.cluster.kubeconfig_path);
            info!(%version, kubeconfig = ?kubeconfig, "Installing Cilium");
            cilium::install(&session.runner, &version, kubeconfig)
                .await
                .context("cilium install")?;
            Ok(())
        }
    }
}
