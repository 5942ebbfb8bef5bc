use std::path::Path;

use tracing::{debug, info};

use super::exec::{ensure_commands, CommandRunner, Invocation};
use super::plan::{run_plan, Step};
use crate::errors::Error;

/// Providers handed to `clusterctl init`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Providers {
    pub core: String,
    pub bootstrap: Vec<String>,
    pub control_plane: Vec<String>,
    pub infrastructure: Vec<String>,
}

impl Default for Providers {
    fn default() -> Self {
        Providers {
            core: String::from("cluster-api"),
            bootstrap: vec![String::from("kubeadm")],
            control_plane: vec![String::from("kubeadm")],
            infrastructure: vec![String::from("docker")],
        }
    }
}

fn init_invocation(
    clusterctl_config: &Path,
    providers: &Providers,
    kubeconfig: Option<&Path>,
) -> Invocation {
    let mut args = vec![String::from("init")];
    if clusterctl_config.is_file() {
        args.push(String::from("--config"));
        args.push(clusterctl_config.display().to_string());
    }
    args.push(String::from("--core"));
    args.push(providers.core.clone());
    for (flag, values) in [
        ("--bootstrap", &providers.bootstrap),
        ("--control-plane", &providers.control_plane),
        ("--infrastructure", &providers.infrastructure),
    ] {
        if !values.is_empty() {
            args.push(flag.to_string());
            args.push(values.join(","));
        }
    }
    if let Some(kubeconfig) = kubeconfig {
        args.push(String::from("--kubeconfig"));
        args.push(kubeconfig.display().to_string());
    }
    Invocation::new("clusterctl", args)
}

fn apply_invocation(manifests: &Path, namespace: Option<&str>) -> Invocation {
    let mut args = vec![
        String::from("apply"),
        String::from("-f"),
        manifests.display().to_string(),
    ];
    if let Some(namespace) = namespace.filter(|ns| !ns.is_empty()) {
        args.push(String::from("-n"));
        args.push(namespace.to_string());
    }
    Invocation::new("kubectl", args)
}

pub async fn init<R: CommandRunner + ?Sized>(
    runner: &R,
    clusterctl_config: &Path,
    providers: &Providers,
    kubeconfig: Option<&Path>,
) -> Result<(), Error> {
    ensure_commands(&["clusterctl"])?;
    debug!(?providers, "clusterctl: init");
    run_plan(
        runner,
        &[Step::required(
            "clusterctl init",
            init_invocation(clusterctl_config, providers, kubeconfig),
        )],
    )
    .await?;
    info!("Cluster API providers initialized");
    Ok(())
}

pub async fn deploy<R: CommandRunner + ?Sized>(
    runner: &R,
    manifests: &Path,
    namespace: Option<&str>,
) -> Result<(), Error> {
    if manifests.as_os_str().is_empty() {
        return Err(Error::Validation(String::from(
            "manifest path is required: --file",
        )));
    }
    ensure_commands(&["kubectl"])?;
    run_plan(
        runner,
        &[Step::required("kubectl apply", apply_invocation(manifests, namespace))],
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_lists_all_provider_kinds() {
        let providers = Providers {
            infrastructure: vec![String::from("proxmox"), String::from("in-cluster")],
            bootstrap: vec![String::from("talos")],
            control_plane: vec![String::from("talos")],
            ..Providers::default()
        };
        let invocation = init_invocation(
            Path::new("/nonexistent/clusterctl.yaml"),
            &providers,
            Some(Path::new("/tmp/kubeconfig")),
        );

        assert_eq!(invocation.program, "clusterctl");
        assert_eq!(
            invocation.args,
            vec![
                "init",
                "--core",
                "cluster-api",
                "--bootstrap",
                "talos",
                "--control-plane",
                "talos",
                "--infrastructure",
                "proxmox,in-cluster",
                "--kubeconfig",
                "/tmp/kubeconfig",
            ]
        );
    }

    #[test]
    fn apply_passes_namespace_when_set() {
        let invocation = apply_invocation(Path::new("cluster.yaml"), Some("capi"));
        assert_eq!(invocation.args, vec!["apply", "-f", "cluster.yaml", "-n", "capi"]);

        let invocation = apply_invocation(Path::new("cluster.yaml"), Some(""));
        assert_eq!(invocation.args, vec!["apply", "-f", "cluster.yaml"]);
    }
}
