//! Command line surface. Each command group resolves its settings and hands
//! off to the library modules.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::config::{ClusterArgs, ClusterSettings, FileConfig, LogArgs};
use crate::errors::Error;
use crate::tools::exec::ProcessRunner;
use crate::utils::get_version_string;

pub mod capi;
pub mod cilium;
pub mod kind;
pub mod proxmox;
pub mod secrets;

/// CLI tool for managing kind, Cluster API and Proxmox-hosted Talos clusters
#[derive(Parser, Debug)]
#[command(name = "cctl", version, about, long_about = None)]
pub struct Cli {
    /// Path to a YAML or JSON config file
    #[arg(long, global = true, env = "CCTL_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub cluster: ClusterArgs,

    #[command(flatten)]
    pub log: LogArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Commands for managing the kind cluster
    #[command(subcommand)]
    Kind(kind::KindCommand),
    /// Cluster API helpers
    #[command(subcommand)]
    Capi(capi::CapiCommand),
    /// Cilium helpers
    #[command(subcommand)]
    Cilium(cilium::CiliumCommand),
    /// Helpers for fetching Cluster API kubeconfig/talosconfig secrets
    #[command(subcommand)]
    Secrets(secrets::SecretsCommand),
    /// Proxmox helpers (Talos schematics, ISO uploads, VM templates)
    Proxmox(proxmox::ProxmoxCli),
    /// Show version
    Version,
}

/// Everything a command needs beyond its own arguments.
pub struct Session {
    pub file: FileConfig,
    pub cluster: ClusterSettings,
    pub cancel: CancellationToken,
    pub runner: ProcessRunner,
}

impl Session {
    pub fn new(file: FileConfig, cluster: &ClusterArgs, cancel: &CancellationToken) -> Self {
        let cluster = ClusterSettings::resolve(cluster, &file.cluster);
        Session {
            file,
            cluster,
            cancel: cancel.clone(),
            runner: ProcessRunner,
        }
    }
}

impl Commands {
    pub async fn run(self, session: &Session) -> Result<(), Error> {
        match self {
            Commands::Kind(command) => kind::run(command, session).await,
            Commands::Capi(command) => capi::run(command, session).await,
            Commands::Cilium(command) => cilium::run(command, session).await,
            Commands::Secrets(command) => secrets::run(command, session).await,
            Commands::Proxmox(proxmox) => proxmox::run(proxmox, session).await,
            Commands::Version => {
                println!("{}", get_version_string());
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from([
            "cctl",
            "secrets",
            "get-kubeconfig",
            "--cluster-name",
            "espresso",
            "--timeout",
            "5m",
        ])
        .unwrap();
        assert_eq!(cli.cluster.name.as_deref(), Some("espresso"));
        assert!(matches!(
            cli.command,
            Commands::Secrets(secrets::SecretsCommand::GetKubeconfig(ref args))
                if args.timeout.as_deref() == Some("5m")
        ));
    }

    #[test]
    fn get_talos_image_requires_version() {
        let err = Cli::try_parse_from(["cctl", "proxmox", "get-talos-image"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
