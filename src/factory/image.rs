use std::path::Path;

use tempfile::TempPath;
use tracing::{info, warn};

use super::schematic::SchematicCache;
use super::ImageFactory;
use crate::errors::{Context, Error};
use crate::proxmox::Hypervisor;

pub fn iso_file_name(version: &str) -> String {
    format!("talos-{version}-nocloud-amd64.iso")
}

fn temporary_iso() -> Result<TempPath, Error> {
    let file = tempfile::Builder::new()
        .prefix("talos-")
        .suffix(".iso")
        .tempfile()
        .context("create temporary iso file")?;
    Ok(file.into_temp_path())
}

async fn transfer<F, H>(
    factory: &F,
    hypervisor: &H,
    staging: &Path,
    schematic_id: &str,
    version: &str,
) -> Result<(), Error>
where
    F: ImageFactory + ?Sized,
    H: Hypervisor + ?Sized,
{
    let bytes = factory
        .download_image(schematic_id, version, staging)
        .await
        .context("download talos iso")?;

    let file_name = iso_file_name(version);
    info!(file = %file_name, bytes, "Uploading ISO to Proxmox");
    hypervisor
        .upload_iso(staging, &file_name)
        .await
        .context("upload iso to proxmox")
}

/// Download the ISO built from `schematic_id` and push it into hypervisor
/// storage. The staging file is removed whatever the outcome.
pub async fn materialize_and_upload<F, H>(
    factory: &F,
    hypervisor: &H,
    schematic_id: &str,
    version: &str,
) -> Result<(), Error>
where
    F: ImageFactory + ?Sized,
    H: Hypervisor + ?Sized,
{
    if version.is_empty() {
        return Err(Error::Validation(String::from(
            "talos version is required (e.g. --version 1.11.2)",
        )));
    }

    let staging = temporary_iso()?;
    let result = transfer(factory, hypervisor, &staging, schematic_id, version).await;

    let staging_path = staging.to_path_buf();
    if let Err(e) = staging.close() {
        warn!(file = %staging_path.display(), error = %e, "Failed to remove temporary ISO");
    }
    result
}

pub async fn get_talos_image<F, H>(
    cache: &SchematicCache<F>,
    hypervisor: &H,
    version: &str,
) -> Result<(), Error>
where
    F: ImageFactory,
    H: Hypervisor + ?Sized,
{
    let schematic_id = cache.ensure().await.context("ensure schematic")?;
    info!(schematic_id = %schematic_id, version, "Fetching Talos ISO");

    materialize_and_upload(cache.factory(), hypervisor, &schematic_id, version).await?;
    info!(version, "Talos ISO uploaded successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::MockImageFactory;
    use crate::proxmox::MockHypervisor;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    fn downloading_factory(seen: Arc<Mutex<Option<PathBuf>>>) -> MockImageFactory {
        let mut factory = MockImageFactory::new();
        factory
            .expect_download_image()
            .withf(|id, version, _| id == "abc123" && version == "1.11.2")
            .times(1)
            .returning(move |_, _, destination| {
                std::fs::write(destination, b"ISO").unwrap();
                *seen.lock().unwrap() = Some(destination.to_path_buf());
                Ok(3)
            });
        factory
    }

    #[tokio::test]
    async fn uploads_under_versioned_name_and_cleans_up() {
        let seen = Arc::new(Mutex::new(None));
        let factory = downloading_factory(seen.clone());
        let mut hypervisor = MockHypervisor::new();
        hypervisor
            .expect_upload_iso()
            .withf(|path, name| {
                name == "talos-1.11.2-nocloud-amd64.iso" && std::fs::read(path).unwrap() == b"ISO"
            })
            .times(1)
            .returning(|_, _| Ok(()));

        materialize_and_upload(&factory, &hypervisor, "abc123", "1.11.2")
            .await
            .unwrap();

        let staging = seen.lock().unwrap().clone().unwrap();
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn upload_failure_still_removes_staging_file() {
        let seen = Arc::new(Mutex::new(None));
        let factory = downloading_factory(seen.clone());
        let mut hypervisor = MockHypervisor::new();
        hypervisor.expect_upload_iso().times(1).returning(|_, _| {
            Err(Error::RemoteStatus {
                operation: String::from("proxmox API POST /nodes/pve/storage/local/upload"),
                status: 500,
                body: String::from("storage full"),
            })
        });

        let err = materialize_and_upload(&factory, &hypervisor, "abc123", "1.11.2")
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("upload iso to proxmox: "));
        let staging = seen.lock().unwrap().clone().unwrap();
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn download_failure_skips_upload() {
        let mut factory = MockImageFactory::new();
        factory.expect_download_image().times(1).returning(|_, _, _| {
            Err(Error::RemoteStatus {
                operation: String::from("download"),
                status: 404,
                body: String::from("no such schematic"),
            })
        });
        let mut hypervisor = MockHypervisor::new();
        hypervisor.expect_upload_iso().never();

        let err = materialize_and_upload(&factory, &hypervisor, "abc123", "1.11.2")
            .await
            .unwrap_err();
        assert!(matches!(err.root(), Error::RemoteStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn empty_version_is_rejected_up_front() {
        let mut factory = MockImageFactory::new();
        factory.expect_download_image().never();
        let hypervisor = MockHypervisor::new();

        let err = materialize_and_upload(&factory, &hypervisor, "abc123", "")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn get_talos_image_rejects_empty_version() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache_path = dir.path().join(".schematic_id");
        std::fs::write(&cache_path, "abc123\n").unwrap();
        let mut factory = MockImageFactory::new();
        factory.expect_create_schematic().never();
        factory.expect_download_image().never();
        let mut hypervisor = MockHypervisor::new();
        hypervisor.expect_upload_iso().never();

        let cache = SchematicCache::new(factory, &cache_path, &dir.path().join("schematic.yaml"));
        let err = get_talos_image(&cache, &hypervisor, "").await.unwrap_err();
        assert!(matches!(err.root(), Error::Validation(_)));
    }
}
