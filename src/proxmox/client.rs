use std::path::Path;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument};

use crate::config::ProxmoxSettings;
use crate::errors::{Context, Error};
use crate::utils::http::ensure_success;

const API_PORT: u16 = 8006;
const BODY_SNIPPET_LIMIT: usize = 2048;

/// The subset of the hypervisor API the template workflow needs.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Hypervisor: Send + Sync {
    async fn vm_exists(&self, vmid: u64) -> Result<bool, Error>;
    async fn delete_vm(&self, vmid: u64) -> Result<(), Error>;
    async fn create_vm(&self, payload: &[u8]) -> Result<(), Error>;
    async fn convert_to_template(&self, vmid: u64) -> Result<(), Error>;
    async fn upload_iso(&self, path: &Path, file_name: &str) -> Result<(), Error>;
}

/// Envelope around every Proxmox API answer.
#[derive(Deserialize, Debug)]
pub struct ProxmoxResponse<T> {
    pub data: Option<T>,
}

#[derive(Deserialize, Debug, Default)]
pub struct VmConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub template: Option<u8>,
}

pub struct ProxmoxClient {
    http: reqwest::Client,
    base_url: String,
    node: String,
    storage: String,
}

impl ProxmoxClient {
    pub fn new(settings: &ProxmoxSettings) -> Result<Self, Error> {
        let base_url = format!("https://{}:{API_PORT}/api2/json", settings.url);
        Self::with_base_url(&base_url, settings)
    }

    fn with_base_url(base_url: &str, settings: &ProxmoxSettings) -> Result<Self, Error> {
        let mut token = HeaderValue::from_str(&format!(
            "PVEAPIToken={}={}",
            settings.token_id, settings.token_secret
        ))
        .map_err(|_| Error::Validation(String::from("proxmox API token contains invalid characters")))?;
        token.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, token);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(settings.http_timeout)
            .danger_accept_invalid_certs(settings.skip_tls_verify)
            .build()
            .context("build proxmox HTTP client")?;

        Ok(ProxmoxClient {
            http,
            base_url: base_url.to_string(),
            node: settings.node.clone(),
            storage: settings.iso_storage.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> (RequestBuilder, String) {
        let operation = format!("proxmox API {method} {path}");
        let builder = self.http.request(method, format!("{}{path}", self.base_url));
        (builder, operation)
    }

    async fn send(&self, builder: RequestBuilder, operation: &str) -> Result<Response, Error> {
        builder
            .send()
            .await
            .with_context(|| format!("{operation} request failed"))
    }

    /// Send a mutating request. Any 2xx is success; the task id Proxmox
    /// usually hands back is only logged.
    async fn run_task(&self, builder: RequestBuilder, operation: &str) -> Result<(), Error> {
        let response = self.send(builder, operation).await?;
        let response = ensure_success(response, operation, BODY_SNIPPET_LIMIT).await?;
        let task = match response.text().await {
            Ok(body) => task_id(&body),
            Err(e) => {
                debug!(operation, error = %e, "Could not read Proxmox response body");
                None
            }
        };
        debug!(operation, task = ?task, "Proxmox accepted request");
        Ok(())
    }
}

/// The UPID from a `{"data": "UPID:..."}` envelope, if there is one.
fn task_id(body: &str) -> Option<String> {
    serde_json::from_str::<ProxmoxResponse<serde_json::Value>>(body)
        .ok()
        .and_then(|envelope| envelope.data)
        .and_then(|data| data.as_str().map(String::from))
}

#[async_trait]
impl Hypervisor for ProxmoxClient {
    #[instrument(skip(self), fields(node = %self.node))]
    async fn vm_exists(&self, vmid: u64) -> Result<bool, Error> {
        let (builder, operation) =
            self.request(Method::GET, &format!("/nodes/{}/qemu/{vmid}/config", self.node));
        let response = self.send(builder, &operation).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let response = ensure_success(response, &operation, BODY_SNIPPET_LIMIT).await?;
        let config = response
            .json::<ProxmoxResponse<VmConfig>>()
            .await
            .ok()
            .and_then(|envelope| envelope.data)
            .unwrap_or_default();
        debug!(name = ?config.name, template = config.template == Some(1), "VM present");
        Ok(true)
    }

    #[instrument(skip(self), fields(node = %self.node))]
    async fn delete_vm(&self, vmid: u64) -> Result<(), Error> {
        let (builder, operation) =
            self.request(Method::DELETE, &format!("/nodes/{}/qemu/{vmid}", self.node));
        self.run_task(builder, &operation).await
    }

    #[instrument(skip(self, payload), fields(node = %self.node, bytes = payload.len()))]
    async fn create_vm(&self, payload: &[u8]) -> Result<(), Error> {
        let (builder, operation) = self.request(Method::POST, &format!("/nodes/{}/qemu", self.node));
        let builder = builder
            .header(CONTENT_TYPE, "application/json")
            .body(payload.to_vec());
        self.run_task(builder, &operation).await
    }

    #[instrument(skip(self), fields(node = %self.node))]
    async fn convert_to_template(&self, vmid: u64) -> Result<(), Error> {
        let (builder, operation) = self.request(
            Method::POST,
            &format!("/nodes/{}/qemu/{vmid}/template", self.node),
        );
        self.run_task(builder, &operation).await
    }

    #[instrument(skip(self), fields(node = %self.node, storage = %self.storage))]
    async fn upload_iso(&self, path: &Path, file_name: &str) -> Result<(), Error> {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("open iso {}", path.display()))?;
        let length = file
            .metadata()
            .await
            .with_context(|| format!("stat iso {}", path.display()))?
            .len();

        let part = Part::stream_with_length(
            reqwest::Body::wrap_stream(ReaderStream::new(file)),
            length,
        )
        .file_name(file_name.to_string())
        .mime_str("application/octet-stream")
        .context("build multipart upload")?;
        let form = Form::new().text("content", "iso").part("filename", part);

        let (builder, operation) = self.request(
            Method::POST,
            &format!("/nodes/{}/storage/{}/upload", self.node, self.storage),
        );
        self.run_task(builder.multipart(form), &operation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::http::testing::serve_once;
    use std::time::Duration;

    fn settings() -> ProxmoxSettings {
        ProxmoxSettings {
            url: String::from("pve.example"),
            token_id: String::from("root@pam!cctl"),
            token_secret: String::from("s3cret"),
            node: String::from("pve"),
            http_timeout: Duration::from_secs(5),
            ..ProxmoxSettings::default()
        }
    }

    fn client(base: &str) -> ProxmoxClient {
        ProxmoxClient::with_base_url(&format!("{base}/api2/json"), &settings()).unwrap()
    }

    #[test]
    fn base_url_uses_api_port() {
        let client = ProxmoxClient::new(&settings()).unwrap();
        assert_eq!(client.base_url, "https://pve.example:8006/api2/json");
    }

    #[tokio::test]
    async fn missing_vm_is_absent() {
        let (base, server) = serve_once(404, b"").await;
        assert!(!client(&base).vm_exists(100).await.unwrap());

        let request = server.await.unwrap();
        assert!(request.head.starts_with("GET /api2/json/nodes/pve/qemu/100/config "));
        let head = request.head.to_ascii_lowercase();
        assert!(head.contains("authorization: pveapitoken=root@pam!cctl=s3cret"));
        assert!(head.contains("accept: application/json"));
    }

    #[tokio::test]
    async fn existing_vm_is_present() {
        let (base, server) = serve_once(200, br#"{"data":{"name":"talos-template","template":1}}"#).await;
        assert!(client(&base).vm_exists(100).await.unwrap());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn other_statuses_are_fatal() {
        let (base, server) = serve_once(403, b"permission denied").await;
        let err = client(&base).vm_exists(100).await.unwrap_err();
        server.await.unwrap();

        assert_eq!(
            err.to_string(),
            "proxmox API GET /nodes/pve/qemu/100/config returned 403: permission denied"
        );
    }

    #[tokio::test]
    async fn create_posts_raw_payload() {
        let (base, server) = serve_once(200, br#"{"data":"UPID:pve:0001"}"#).await;
        let payload = br#"{"vmid":100,"name":"talos"}"#;
        client(&base).create_vm(payload).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.head.starts_with("POST /api2/json/nodes/pve/qemu "));
        assert_eq!(request.body, payload);
    }

    #[tokio::test]
    async fn empty_success_body_is_accepted() {
        let (base, server) = serve_once(200, b"").await;
        client(&base).create_vm(br#"{"vmid":100}"#).await.unwrap();
        server.await.unwrap();

        let (base, server) = serve_once(200, b"<html>ok</html>").await;
        client(&base).convert_to_template(100).await.unwrap();
        server.await.unwrap();
    }

    #[test]
    fn task_id_is_optional() {
        assert_eq!(task_id(r#"{"data":"UPID:pve:0001"}"#).as_deref(), Some("UPID:pve:0001"));
        assert_eq!(task_id(r#"{"data":null}"#), None);
        assert_eq!(task_id(""), None);
    }

    #[tokio::test]
    async fn convert_failure_reports_operation() {
        let (base, server) = serve_once(500, b"VM is locked (create)").await;
        let err = client(&base).convert_to_template(100).await.unwrap_err();
        server.await.unwrap();

        match err {
            Error::RemoteStatus { operation, status, body } => {
                assert_eq!(operation, "proxmox API POST /nodes/pve/qemu/100/template");
                assert_eq!(status, 500);
                assert_eq!(body, "VM is locked (create)");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
