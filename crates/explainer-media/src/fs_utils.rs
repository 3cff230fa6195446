//! Filesystem helpers for publishing artifacts.

use std::path::Path;
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// EXDEV on Linux and macOS.
const CROSS_DEVICE_ERRNO: i32 = 18;

/// Move `src` to `dst`, creating parent directories as needed.
///
/// Work directories and the published video directory may sit on different
/// mounts; a failed rename with EXDEV falls back to copy and delete.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(CROSS_DEVICE_ERRNO) => {
            tracing::debug!(
                src = %src.display(),
                dst = %dst.display(),
                "Cross-device rename, copying instead"
            );
            copy_then_remove(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

async fn copy_then_remove(src: &Path, dst: &Path) -> MediaResult<()> {
    // Stage next to dst so the final rename stays on one filesystem.
    let staged = dst.with_extension("partial");
    fs::copy(src, &staged).await?;

    if let Err(e) = fs::rename(&staged, dst).await {
        let _ = fs::remove_file(&staged).await;
        return Err(e.into());
    }

    if let Err(e) = fs::remove_file(src).await {
        tracing::warn!(src = %src.display(), error = %e, "Could not remove source after copy");
    }
    Ok(())
}

/// Size of a file in bytes, or `None` if it does not exist.
pub async fn file_size(path: impl AsRef<Path>) -> Option<u64> {
    fs::metadata(path.as_ref())
        .await
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.len())
}
