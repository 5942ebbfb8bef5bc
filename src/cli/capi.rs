use std::path::PathBuf;

use clap::{Args, Subcommand};
use tracing::info;

use super::Session;
use crate::errors::{Context, Error};
use crate::tools::capi::{self, Providers};

#[derive(Subcommand, Debug)]
pub enum CapiCommand {
    /// Initialize Cluster API providers via clusterctl
    Init(InitArgs),
    /// Apply Cluster API manifests (kubectl apply)
    Deploy(DeployArgs),
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path to clusterctl.yaml
    #[arg(long, default_value = "configs/capi/clusterctl.yaml")]
    pub clusterctl_config: PathBuf,
    /// Core provider
    #[arg(long, default_value = "cluster-api")]
    pub core: String,
    /// Bootstrap providers (comma separated)
    #[arg(long, value_delimiter = ',', default_value = "kubeadm")]
    pub bootstrap: Vec<String>,
    /// Control plane providers (comma separated)
    #[arg(long, value_delimiter = ',', default_value = "kubeadm")]
    pub control_plane: Vec<String>,
    /// Infrastructure providers (comma separated)
    #[arg(long, value_delimiter = ',', default_value = "docker")]
    pub infrastructure: Vec<String>,
    /// Kubeconfig of the cluster to initialize, if not the current one
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DeployArgs {
    /// File or directory with manifests
    #[arg(short, long, default_value = "configs/capi/templates/cluster.yaml")]
    pub file: PathBuf,
    /// Namespace for the manifests; defaults to the cluster namespace
    #[arg(long = "manifest-namespace")]
    pub namespace: Option<String>,
}

pub async fn run(command: CapiCommand, session: &Session) -> Result<(), Error> {
    match command {
        CapiCommand::Init(args) => {
            let providers = Providers {
                core: args.core,
                bootstrap: args.bootstrap,
                control_plane: args.control_plane,
                infrastructure: args.infrastructure,
            };
            info!(clusterctl = %args.clusterctl_config.display(), ?providers, "capi init");
            capi::init(
                &session.runner,
                &args.clusterctl_config,
                &providers,
                args.kubeconfig.as_deref(),
            )
            .await
            .context("capi init")
        }
        CapiCommand::Deploy(args) => {
            let namespace = args
                .namespace
                .unwrap_or_else(|| session.cluster.namespace.clone());
            info!(file = %args.file.display(), %namespace, "capi deploy");
            capi::deploy(&session.runner, &args.file, Some(&namespace))
                .await
                .context("capi deploy")
        }
    }
}
