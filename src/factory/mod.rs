//! Talos image factory: schematic registration and ISO downloads.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
#[cfg(test)]
use mockall::automock;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::errors::{Context, Error};
use crate::utils::http::ensure_success;

pub mod image;
pub mod schematic;

pub use image::get_talos_image;
pub use schematic::SchematicCache;

pub const DEFAULT_FACTORY_URL: &str = "https://factory.talos.dev";
const BODY_SNIPPET_LIMIT: usize = 1024;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ImageFactory: Send + Sync {
    /// Register a schematic definition and return its content-derived id.
    async fn create_schematic(&self, definition: Vec<u8>) -> Result<String, Error>;

    /// Stream the nocloud ISO for `schematic_id` and `version` into
    /// `destination`, returning the number of bytes written.
    async fn download_image(
        &self,
        schematic_id: &str,
        version: &str,
        destination: &Path,
    ) -> Result<u64, Error>;
}

#[derive(Deserialize)]
struct SchematicResponse {
    #[serde(default)]
    id: String,
}

pub struct TalosFactoryClient {
    http: reqwest::Client,
    base_url: String,
}

impl TalosFactoryClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build image factory HTTP client")?;
        Ok(TalosFactoryClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn image_url(&self, schematic_id: &str, version: &str) -> String {
        format!(
            "{}/image/{schematic_id}/v{version}/nocloud-amd64.iso",
            self.base_url
        )
    }
}

#[async_trait]
impl ImageFactory for TalosFactoryClient {
    #[instrument(skip(self, definition), fields(bytes = definition.len()))]
    async fn create_schematic(&self, definition: Vec<u8>) -> Result<String, Error> {
        let response = self
            .http
            .post(format!("{}/schematics", self.base_url))
            .header(CONTENT_TYPE, "application/x-yaml")
            .body(definition)
            .send()
            .await
            .context("talos factory request failed")?;
        let response = ensure_success(response, "talos factory", BODY_SNIPPET_LIMIT).await?;

        let payload: SchematicResponse = response
            .json()
            .await
            .context("decode talos factory response")?;
        let id = payload.id.trim();
        if id.is_empty() {
            return Err(Error::Validation(String::from(
                "talos factory response missing id",
            )));
        }
        Ok(id.to_string())
    }

    #[instrument(skip(self))]
    async fn download_image(
        &self,
        schematic_id: &str,
        version: &str,
        destination: &Path,
    ) -> Result<u64, Error> {
        let url = self.image_url(schematic_id, version);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("download request failed")?;
        let response = ensure_success(response, "download", BODY_SNIPPET_LIMIT).await?;

        let mut file = tokio::fs::File::create(destination)
            .await
            .with_context(|| format!("create iso file {}", destination.display()))?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("read image chunk")?;
            file.write_all(&chunk).await.context("write iso file")?;
            written += chunk.len() as u64;
        }
        file.flush().await.context("write iso file")?;

        debug!(bytes = written, "Image downloaded");
        Ok(written)
    }
}
