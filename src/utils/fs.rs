use std::io::ErrorKind;
use std::path::Path;

use tokio::io::AsyncWriteExt;

use crate::errors::{Context, Error};

pub const PRIVATE_FILE_MODE: u32 = 0o600;
pub const PUBLIC_FILE_MODE: u32 = 0o644;

/// Write `contents` to `path`, creating missing parent directories.
///
/// The mode is applied on creation and re-applied afterwards, so an existing
/// file with looser permissions is tightened as well.
pub async fn write_with_mode(path: &Path, contents: &[u8], mode: u32) -> Result<(), Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("ensure output dir {}", parent.display()))?;
    }

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(mode);

    let mut file = options
        .open(path)
        .await
        .with_context(|| format!("open {}", path.display()))?;
    file.write_all(contents)
        .await
        .with_context(|| format!("write {}", path.display()))?;
    file.flush().await?;

    harden_permissions(path, mode).await
}

/// Apply `mode` to a file written by someone else.
pub async fn harden_permissions(path: &Path, mode: u32) -> Result<(), Error> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .await
            .with_context(|| format!("set permissions on {}", path.display()))?;
    }
    #[cfg(not(unix))]
    let _ = (path, mode);

    Ok(())
}

/// Remove a file, treating an already-absent file as success.
pub async fn remove_if_exists(path: &Path) -> Result<(), Error> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
    }
}

/// Read a file, mapping an absent file to `None`.
pub async fn read_optional(path: &Path) -> Result<Option<String>, Error> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
    }
}

pub fn existing_path(path: &Path) -> Option<&Path> {
    path.exists().then_some(path)
}
