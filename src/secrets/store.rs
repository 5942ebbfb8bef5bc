use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ApiResource, DynamicObject, ListParams};
use kube::{Client, ResourceExt};
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use tracing::instrument;

use crate::errors::{Context, Error};
use crate::labels_and_annotations::CLUSTER_NAME_LABEL;
use crate::utils::traits::kube::LabelExt;

/// A secret as observed in the store. Payloads are still base64 encoded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SecretRef {
    pub name: String,
    pub owner_label: Option<String>,
    pub data: BTreeMap<String, String>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Point lookup. `Ok(None)` when the store reports the object as missing.
    async fn get(&self, name: &str) -> Result<Option<SecretRef>, Error>;

    /// All secrets in the namespace, in the order the store returns them.
    async fn list(&self) -> Result<Vec<SecretRef>, Error>;
}

/// Body of a v1/Secret kept in its wire form.
#[derive(Deserialize, Default)]
struct SecretBody {
    #[serde(default)]
    data: Option<BTreeMap<String, String>>,
}

/// Secret store backed by the Kubernetes API.
///
/// Secrets are read as dynamic objects so the payload is decoded by the
/// extractor and not by the client.
pub struct KubeSecretStore {
    api: Api<DynamicObject>,
    namespace: String,
}

impl KubeSecretStore {
    pub fn new(client: Client, namespace: &str) -> Self {
        let resource = ApiResource::erase::<Secret>(&());
        KubeSecretStore {
            api: Api::namespaced_with(client, namespace, &resource),
            namespace: namespace.to_string(),
        }
    }

    fn to_secret_ref(object: DynamicObject) -> Result<SecretRef, Error> {
        let name = object.name_any();
        let owner_label = object.label(CLUSTER_NAME_LABEL).map(String::from);
        let body: SecretBody = serde_json::from_value(object.data)
            .with_context(|| format!("parse secret {name}"))?;
        Ok(SecretRef {
            name,
            owner_label,
            data: body.data.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    async fn get(&self, name: &str) -> Result<Option<SecretRef>, Error> {
        let object = self
            .api
            .get_opt(name)
            .await
            .with_context(|| format!("get secret {name} in namespace {}", self.namespace))?;
        object.map(Self::to_secret_ref).transpose()
    }

    #[instrument(skip(self), fields(namespace = %self.namespace))]
    async fn list(&self) -> Result<Vec<SecretRef>, Error> {
        let objects = self
            .api
            .list(&ListParams::default())
            .await
            .with_context(|| format!("list secrets in namespace {}", self.namespace))?;
        objects.items.into_iter().map(Self::to_secret_ref).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_dynamic_secret() {
        let object: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {
                "name": "coffee-cluster-kubeconfig",
                "namespace": "default",
                "labels": { "cluster.x-k8s.io/cluster-name": "coffee-cluster" }
            },
            "type": "cluster.x-k8s.io/secret",
            "data": { "value": "aGVsbG8=" }
        }))
        .unwrap();

        let secret = KubeSecretStore::to_secret_ref(object).unwrap();
        assert_eq!(secret.name, "coffee-cluster-kubeconfig");
        assert_eq!(secret.owner_label.as_deref(), Some("coffee-cluster"));
        assert_eq!(secret.data.get("value").map(String::as_str), Some("aGVsbG8="));
    }

    #[test]
    fn secret_without_data_or_labels() {
        let object: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": { "name": "empty" }
        }))
        .unwrap();

        let secret = KubeSecretStore::to_secret_ref(object).unwrap();
        assert_eq!(secret.owner_label, None);
        assert!(secret.data.is_empty());
    }
}
