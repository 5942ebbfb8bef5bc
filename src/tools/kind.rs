use std::path::Path;

use tracing::{debug, info};

use super::exec::{ensure_commands, CommandRunner, Invocation};
use super::plan::{run_plan, Step};
use crate::errors::Error;

pub const DEFAULT_KIND_NAME: &str = "dev";
pub const DEFAULT_KIND_CONFIG: &str = "configs/kind.yaml";
const READY_WAIT: &str = "2m";

fn create_invocation(name: &str, config: Option<&Path>) -> Invocation {
    let mut args = vec![
        String::from("create"),
        String::from("cluster"),
        String::from("--name"),
        name.to_string(),
    ];
    // A missing config file just means "use kind's defaults"
    if let Some(config) = config.filter(|path| path.is_file()) {
        args.push(String::from("--config"));
        args.push(config.display().to_string());
    }
    args.push(String::from("--wait"));
    args.push(String::from(READY_WAIT));
    Invocation::new("kind", args)
}

fn delete_invocation(name: &str) -> Invocation {
    Invocation::new("kind", ["delete", "cluster", "--name", name])
}

pub async fn create<R: CommandRunner + ?Sized>(
    runner: &R,
    name: &str,
    config: Option<&Path>,
) -> Result<(), Error> {
    ensure_commands(&["kind"])?;
    debug!(name, config = ?config, "kind: creating cluster");
    run_plan(runner, &[Step::required("kind create cluster", create_invocation(name, config))]).await?;
    info!(name, "kind cluster ready");
    Ok(())
}

pub async fn delete<R: CommandRunner + ?Sized>(runner: &R, name: &str) -> Result<(), Error> {
    ensure_commands(&["kind"])?;
    debug!(name, "kind: deleting cluster");
    run_plan(runner, &[Step::required("kind delete cluster", delete_invocation(name))]).await?;
    Ok(())
}

/// Recreate the cluster. Deleting a cluster that does not exist is fine.
pub async fn reset<R: CommandRunner + ?Sized>(
    runner: &R,
    name: &str,
    config: Option<&Path>,
) -> Result<(), Error> {
    ensure_commands(&["kind"])?;
    run_plan(
        runner,
        &[
            Step::best_effort("kind delete cluster", delete_invocation(name)),
            Step::required("kind create cluster", create_invocation(name, config)),
        ],
    )
    .await?;
    info!(name, "kind cluster recreated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn config_is_only_passed_when_present() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("kind.yaml");
        assert_eq!(
            create_invocation("dev", Some(missing.as_path())).args,
            vec!["create", "cluster", "--name", "dev", "--wait", "2m"]
        );

        std::fs::write(&missing, "kind: Cluster\n").unwrap();
        let args = create_invocation("dev", Some(missing.as_path())).args;
        assert_eq!(args[4], "--config");
        assert_eq!(args[5], missing.display().to_string());
    }

    #[test]
    fn delete_targets_named_cluster() {
        assert_eq!(
            delete_invocation("dev").args,
            vec!["delete", "cluster", "--name", "dev"]
        );
    }
}
