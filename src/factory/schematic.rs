use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::ImageFactory;
use crate::errors::{Context, Error};
use crate::utils::fs::{read_optional, remove_if_exists, write_with_mode, PUBLIC_FILE_MODE};

/// Single-value file cache for the factory schematic id.
///
/// Nothing invalidates the cache when the schematic definition changes; run
/// `refresh` (or `clear`) after editing it. Concurrent refreshes are not
/// coordinated; the last writer wins.
pub struct SchematicCache<F> {
    factory: F,
    cache_path: PathBuf,
    definition_path: PathBuf,
}

impl<F: ImageFactory> SchematicCache<F> {
    pub fn new(factory: F, cache_path: &Path, definition_path: &Path) -> Self {
        SchematicCache {
            factory,
            cache_path: cache_path.to_path_buf(),
            definition_path: definition_path.to_path_buf(),
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    async fn cached(&self) -> Result<Option<String>, Error> {
        let contents = read_optional(&self.cache_path)
            .await
            .context("read schematic cache")?;
        Ok(contents
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty()))
    }

    /// The cached id, registering the definition with the factory on a miss.
    pub async fn ensure(&self) -> Result<String, Error> {
        if let Some(id) = self.cached().await? {
            debug!(schematic_id = %id, "Using cached schematic");
            return Ok(id);
        }
        self.refresh().await
    }

    pub async fn refresh(&self) -> Result<String, Error> {
        let definition = tokio::fs::read(&self.definition_path)
            .await
            .with_context(|| format!("read schematic yaml {}", self.definition_path.display()))?;
        let id = self.factory.create_schematic(definition).await?;

        write_with_mode(&self.cache_path, id.as_bytes(), PUBLIC_FILE_MODE)
            .await
            .context("write schematic cache")?;
        info!(schematic_id = %id, path = %self.cache_path.display(), "Cached Talos schematic ID");
        Ok(id)
    }

    pub async fn show(&self) -> Result<String, Error> {
        self.cached().await?.ok_or_else(|| {
            Error::NotFound(String::from(
                "cached schematic ID (run refresh-schematic first)",
            ))
        })
    }

    pub async fn clear(&self) -> Result<(), Error> {
        remove_if_exists(&self.cache_path)
            .await
            .context("remove schematic cache")?;
        info!(path = %self.cache_path.display(), "Cleared cached schematic ID");
        Ok(())
    }
}
