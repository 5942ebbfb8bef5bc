use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::{info, instrument};

use super::store::{SecretRef, SecretStore};
use crate::errors::{Context, Error};
use crate::utils::fs::{write_with_mode, PRIVATE_FILE_MODE};

pub const CONVENTIONAL_KEY: &str = "value";

/// Pick the data key to extract: the preferred key, then `value`, then the
/// lexicographically smallest key.
pub fn select_key<'a>(secret: &'a SecretRef, preferred_key: Option<&str>) -> Option<&'a str> {
    let data = &secret.data;
    preferred_key
        .filter(|key| !key.is_empty())
        .and_then(|key| data.get_key_value(key))
        .or_else(|| data.get_key_value(CONVENTIONAL_KEY))
        .or_else(|| data.iter().next())
        .map(|(key, _)| key.as_str())
}

pub fn decode_payload(secret: &SecretRef, preferred_key: Option<&str>) -> Result<Vec<u8>, Error> {
    let key = select_key(secret, preferred_key)
        .ok_or_else(|| Error::Validation(format!("secret {} has no data", secret.name)))?;
    let encoded = secret.data[key].trim();
    STANDARD
        .decode(encoded)
        .with_context(|| format!("decode secret {} key {key}", secret.name))
}

/// Write the selected payload of `secret_name` to `destination` with
/// owner-only permissions.
#[instrument(skip(store))]
pub async fn extract<S: SecretStore + ?Sized>(
    store: &S,
    secret_name: &str,
    preferred_key: Option<&str>,
    destination: &Path,
) -> Result<(), Error> {
    if secret_name.is_empty() {
        return Err(Error::Validation(String::from("secret name is required")));
    }
    let secret = store
        .get(secret_name)
        .await?
        .ok_or_else(|| Error::NotFound(format!("secret {secret_name}")))?;

    let payload = decode_payload(&secret, preferred_key)?;
    write_with_mode(destination, &payload, PRIVATE_FILE_MODE).await?;
    info!(path = %destination.display(), bytes = payload.len(), "Wrote secret payload");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::store::MockSecretStore;
    use tempfile::TempDir;

    fn secret_with(keys: &[(&str, &str)]) -> SecretRef {
        SecretRef {
            name: String::from("coffee-kubeconfig"),
            owner_label: Some(String::from("coffee")),
            data: keys
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn prefers_requested_key() {
        let secret = secret_with(&[("value", "dg=="), ("kubeconfig", "aw==")]);
        assert_eq!(select_key(&secret, Some("kubeconfig")), Some("kubeconfig"));
    }

    #[test]
    fn falls_back_to_value_key() {
        let secret = secret_with(&[("b", "Yg=="), ("a", "YQ=="), ("value", "dg==")]);
        assert_eq!(select_key(&secret, None), Some("value"));
        assert_eq!(select_key(&secret, Some("missing")), Some("value"));
    }

    #[test]
    fn falls_back_to_smallest_key() {
        let secret = secret_with(&[("b", "Yg=="), ("a", "YQ==")]);
        assert_eq!(select_key(&secret, None), Some("a"));
    }

    #[test]
    fn empty_data_is_an_error() {
        let secret = secret_with(&[]);
        assert_eq!(select_key(&secret, None), None);
        assert!(matches!(
            decode_payload(&secret, None).unwrap_err(),
            Error::Validation(_)
        ));
    }

    #[test]
    fn invalid_base64_is_fatal() {
        let secret = secret_with(&[("value", "not base64!")]);
        let err = decode_payload(&secret, None).unwrap_err();
        assert!(matches!(err.root(), Error::Decode(_)));
        assert!(err.to_string().starts_with("decode secret coffee-kubeconfig key value"));
    }

    #[tokio::test]
    async fn extracts_payload_to_private_file() {
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("out/kubeconfig-coffee");
        let mut store = MockSecretStore::new();
        store
            .expect_get()
            .times(1)
            .returning(|_| Ok(Some(secret_with(&[("value", "YXBpVmVyc2lvbjogdjE=")]))));

        extract(&store, "coffee-kubeconfig", Some("kubeconfig"), &destination)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&destination).unwrap(), b"apiVersion: v1");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&destination).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn missing_secret_is_not_found() {
        let dir = TempDir::new().unwrap();
        let mut store = MockSecretStore::new();
        store.expect_get().returning(|_| Ok(None));

        let err = extract(&store, "ghost", None, &dir.path().join("ghost"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!dir.path().join("ghost").exists());
    }
}
