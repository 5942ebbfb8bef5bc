use std::path::Path;

use tracing::info;

use super::exec::{ensure_commands, CommandRunner, Invocation};
use super::plan::{run_plan, Step, StepOutcome};
use crate::errors::Error;

const HELM_REPO_NAME: &str = "cilium";
const HELM_REPO_URL: &str = "https://helm.cilium.io";
const NAMESPACE: &str = "kube-system";

/// Kube-proxy-free install talking to the API server through KubePrism.
const VALUES: &[&str] = &[
    "kubeProxyReplacement=true",
    "k8sServiceHost=localhost",
    "k8sServicePort=7445",
    "routingMode=native",
    "ipam.mode=kubernetes",
    "hubble.enabled=true",
    "hubble.relay.enabled=true",
    "hubble.ui.enabled=true",
];

pub fn install_plan(version: &str, kubeconfig: Option<&Path>) -> Vec<Step> {
    let helm = |args: Vec<String>| Invocation::new("helm", args).with_kubeconfig(kubeconfig);
    let kubectl = |args: &[&str]| Invocation::new("kubectl", args.iter().copied()).with_kubeconfig(kubeconfig);

    let mut upgrade = vec![
        "upgrade",
        "--install",
        "cilium",
        "cilium/cilium",
        "--namespace",
        NAMESPACE,
        "--create-namespace",
        "--version",
        version,
    ]
    .into_iter()
    .map(String::from)
    .collect::<Vec<_>>();
    for value in VALUES {
        upgrade.push(String::from("--set"));
        upgrade.push(value.to_string());
    }

    vec![
        Step::best_effort(
            "helm repo add cilium",
            helm(vec![
                String::from("repo"),
                String::from("add"),
                String::from(HELM_REPO_NAME),
                String::from(HELM_REPO_URL),
            ]),
        ),
        Step::best_effort(
            "helm repo update",
            helm(vec![String::from("repo"), String::from("update")]),
        ),
        Step::required("helm upgrade --install cilium", helm(upgrade)),
        Step::required(
            "kubectl rollout status cilium",
            kubectl(&["-n", NAMESPACE, "rollout", "status", "ds/cilium", "--timeout=5m"]),
        ),
        Step::best_effort(
            "kubectl get pods",
            kubectl(&["-n", NAMESPACE, "get", "pods", "-l", "k8s-app=cilium", "-owide"]),
        ),
    ]
}

pub async fn install<R: CommandRunner + ?Sized>(
    runner: &R,
    version: &str,
    kubeconfig: Option<&Path>,
) -> Result<Vec<StepOutcome>, Error> {
    if version.is_empty() {
        return Err(Error::Validation(String::from("cilium version is required")));
    }
    ensure_commands(&["helm", "kubectl"])?;

    info!(version, "Installing Cilium via helm");
    let outcomes = run_plan(runner, &install_plan(version, kubeconfig)).await?;
    info!("Cilium installation complete");
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::exec::MockCommandRunner;

    #[test]
    fn only_install_and_rollout_are_required() {
        let plan = install_plan("1.16.4", None);
        let required: Vec<&str> = plan
            .iter()
            .filter(|step| step.required)
            .map(|step| step.description.as_str())
            .collect();
        assert_eq!(
            required,
            vec!["helm upgrade --install cilium", "kubectl rollout status cilium"]
        );
    }

    #[test]
    fn upgrade_pins_version_and_kubeconfig() {
        let plan = install_plan("1.16.4", Some(Path::new("out/kubeconfig-coffee")));
        let upgrade = &plan[2].invocation;
        let version_at = upgrade.args.iter().position(|a| a == "--version").unwrap();
        assert_eq!(upgrade.args[version_at + 1], "1.16.4");
        assert!(upgrade.args.contains(&String::from("k8sServicePort=7445")));
        assert!(plan.iter().all(|step| step.invocation.env
            == vec![(String::from("KUBECONFIG"), String::from("out/kubeconfig-coffee"))]));
    }

    #[tokio::test]
    async fn repo_refresh_failures_do_not_abort_install() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_stream()
            .withf(|i| i.program == "helm" && i.args.first().map(String::as_str) == Some("repo"))
            .times(2)
            .returning(|i| Err(Error::CommandError(i.args.clone(), String::from("offline"))));
        runner
            .expect_stream()
            .times(3)
            .returning(|_| Ok(()));

        let outcomes = run_plan(&runner, &install_plan("1.16.4", None)).await.unwrap();
        assert_eq!(outcomes.len(), 5);
        assert!(matches!(outcomes[0], StepOutcome::Tolerated(_)));
        assert!(matches!(outcomes[1], StepOutcome::Tolerated(_)));
        assert!(outcomes[2..].iter().all(|o| *o == StepOutcome::Succeeded));
    }
}
