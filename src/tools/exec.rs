use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::process::Command;
use tracing::debug;

use crate::errors::Error;

/// A single process invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new<I, A>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Invocation {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
        }
    }

    /// Point kubectl, helm and friends at a specific kubeconfig.
    pub fn with_kubeconfig(mut self, kubeconfig: Option<&Path>) -> Self {
        if let Some(path) = kubeconfig {
            self.env
                .push((String::from("KUBECONFIG"), path.display().to_string()));
        }
        self
    }

    fn command_line(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.env.iter().cloned())
            .kill_on_drop(true);
        command
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion capturing stdout and stderr.
    async fn capture(&self, invocation: &Invocation) -> Result<CommandOutput, Error>;

    /// Run to completion with stdout and stderr attached to ours.
    async fn stream(&self, invocation: &Invocation) -> Result<(), Error>;
}

pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn capture(&self, invocation: &Invocation) -> Result<CommandOutput, Error> {
        debug!(command = ?invocation.command_line(), "capture");
        let output = invocation
            .command()
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::CommandError(invocation.command_line(), e.to_string()))?;

        let captured = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        if !output.status.success() {
            return Err(Error::CommandError(
                invocation.command_line(),
                format!("{}: {}", output.status, captured.stderr.trim()),
            ));
        }
        Ok(captured)
    }

    async fn stream(&self, invocation: &Invocation) -> Result<(), Error> {
        debug!(command = ?invocation.command_line(), "stream");
        let status = invocation
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| Error::CommandError(invocation.command_line(), e.to_string()))?;

        if !status.success() {
            return Err(Error::CommandError(
                invocation.command_line(),
                status.to_string(),
            ));
        }
        Ok(())
    }
}

fn find_in_path(name: &str, path: &std::ffi::OsStr) -> Option<PathBuf> {
    env::split_paths(path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Check that every named binary is on `PATH`, reporting all missing ones.
pub fn ensure_commands(names: &[&str]) -> Result<(), Error> {
    let path = env::var_os("PATH").unwrap_or_default();
    let missing: Vec<String> = names
        .iter()
        .filter(|name| !name.is_empty())
        .filter(|name| find_in_path(name, &path).is_none())
        .map(|name| name.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::MissingCommands(missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn kubeconfig_is_passed_through_env() {
        let invocation = Invocation::new("kubectl", ["get", "pods"])
            .with_kubeconfig(Some(Path::new("/tmp/kubeconfig")));
        assert_eq!(
            invocation.env,
            vec![(String::from("KUBECONFIG"), String::from("/tmp/kubeconfig"))]
        );
        assert_eq!(invocation.command_line(), vec!["kubectl", "get", "pods"]);

        let bare = Invocation::new("kubectl", ["version"]).with_kubeconfig(None);
        assert!(bare.env.is_empty());
    }

    #[test]
    fn lookup_only_considers_given_path() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("kind"), b"#!/bin/sh\n").unwrap();
        let path = env::join_paths([dir.path()]).unwrap();

        assert!(find_in_path("kind", &path).is_some());
        assert!(find_in_path("clusterctl", &path).is_none());
    }

    #[test]
    fn missing_commands_are_all_reported() {
        let err = ensure_commands(&["cctl-test-missing-a", "", "cctl-test-missing-b"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "required commands not found: cctl-test-missing-a, cctl-test-missing-b"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_output_and_failures() {
        let output = ProcessRunner
            .capture(&Invocation::new("sh", ["-c", "echo out; echo err >&2"]))
            .await
            .unwrap();
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");

        let err = ProcessRunner
            .capture(&Invocation::new("sh", ["-c", "echo NotFound >&2; exit 3"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CommandError(_, ref msg) if msg.contains("NotFound")));
    }
}
