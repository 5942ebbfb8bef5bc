use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::store::{SecretRef, SecretStore};
use crate::errors::{Context, Error};
use crate::utils::poll::Poller;

/// Substituted when a caller asks for a zero timeout.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(15 * 60);
pub const SECRET_POLL_INTERVAL: Duration = Duration::from_secs(5);

lazy_static! {
    static ref FALLBACK_NAME: Regex = Regex::new(r"(kubeconfig|talosconfig)").unwrap();
    static ref OBJECT_NAME: Regex =
        Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").unwrap();
}

#[derive(Clone, Debug)]
pub struct WaitSpec {
    pub name_pattern: Option<String>,
    pub owner_label: String,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl WaitSpec {
    pub fn new(name_pattern: Option<String>, owner_label: &str, timeout: Duration) -> Self {
        WaitSpec {
            name_pattern: name_pattern.filter(|p| !p.is_empty()),
            owner_label: owner_label.to_string(),
            timeout: if timeout.is_zero() {
                DEFAULT_WAIT_TIMEOUT
            } else {
                timeout
            },
            poll_interval: SECRET_POLL_INTERVAL,
        }
    }

    /// Patterns that are also valid object names get a point lookup first.
    fn exact_name(&self) -> Option<&str> {
        self.name_pattern
            .as_deref()
            .filter(|pattern| pattern.len() <= 253 && OBJECT_NAME.is_match(pattern))
    }
}

/// Compiled form of a `WaitSpec`'s matching rule.
struct SecretMatcher<'a> {
    pattern: Option<Regex>,
    owner_label: &'a str,
}

impl<'a> SecretMatcher<'a> {
    fn compile(spec: &'a WaitSpec) -> Result<Self, Error> {
        let pattern = match spec.name_pattern.as_deref() {
            Some(pattern) => Some(
                Regex::new(pattern).with_context(|| format!("compile secret regex {pattern:?}"))?,
            ),
            None => None,
        };
        Ok(SecretMatcher {
            pattern,
            owner_label: &spec.owner_label,
        })
    }

    /// The conventional names are accepted alongside any explicit pattern.
    fn matches(&self, secret: &SecretRef) -> bool {
        let name_matches = self
            .pattern
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(&secret.name))
            || FALLBACK_NAME.is_match(&secret.name);
        name_matches && secret.owner_label.as_deref() == Some(self.owner_label)
    }
}

pub struct SecretLocator<S> {
    store: S,
    namespace: String,
    cancel: CancellationToken,
}

impl<S: SecretStore> SecretLocator<S> {
    pub fn new(store: S, namespace: &str, cancel: &CancellationToken) -> Self {
        SecretLocator {
            store,
            namespace: namespace.to_string(),
            cancel: cancel.clone(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Wait for a secret matching `spec` and return its name.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub async fn locate(&self, spec: &WaitSpec) -> Result<String, Error> {
        let matcher = SecretMatcher::compile(spec)?;
        let operation = format!(
            "secret like {:?} in namespace {}",
            spec.name_pattern.as_deref().unwrap_or("kubeconfig|talosconfig"),
            self.namespace
        );
        let mut poller = Poller::new(operation, spec.poll_interval, spec.timeout, &self.cancel);

        loop {
            if let Some(name) = poller.guard(self.scan(spec, &matcher)).await? {
                info!(secret = %name, "Found secret");
                return Ok(name);
            }
            debug!("No matching secret yet");
            poller.wait().await?;
        }
    }

    async fn scan(&self, spec: &WaitSpec, matcher: &SecretMatcher<'_>) -> Result<Option<String>, Error> {
        if let Some(name) = spec.exact_name() {
            if let Some(secret) = self.store.get(name).await? {
                return Ok(Some(secret.name));
            }
        }

        let secrets = self.store.list().await?;
        Ok(secrets
            .into_iter()
            .find(|secret| matcher.matches(secret))
            .map(|secret| secret.name))
    }
}
