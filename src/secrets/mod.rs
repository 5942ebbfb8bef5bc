use std::path::Path;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

use crate::errors::{Context, Error};

pub mod extractor;
pub mod locator;
pub mod store;
pub mod talos;

pub use extractor::extract;
pub use locator::{SecretLocator, WaitSpec};
pub use store::KubeSecretStore;

/// Client for the management cluster. An explicit kubeconfig wins over the
/// ambient one.
pub async fn kube_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    let Some(path) = kubeconfig else {
        return Client::try_default().await.context("load default kubeconfig");
    };
    let kubeconfig = Kubeconfig::read_from(path)
        .with_context(|| format!("read kubeconfig {}", path.display()))?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .with_context(|| format!("load kubeconfig {}", path.display()))?;
    Client::try_from(config).context("build Kubernetes client")
}
