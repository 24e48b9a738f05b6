//! Filesystem helpers for clip artifacts.

use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// EXDEV on Linux and macOS.
const EXDEV: i32 = 18;

/// Delete a file, treating "already gone" as success.
///
/// Returns whether a file was actually removed.
pub async fn remove_file_if_exists(path: impl AsRef<Path>) -> MediaResult<bool> {
    match fs::remove_file(path.as_ref()).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(MediaError::from(e)),
    }
}

/// Size of a regular file, or `None` if it does not exist.
pub async fn file_size(path: impl AsRef<Path>) -> MediaResult<Option<u64>> {
    match fs::metadata(path.as_ref()).await {
        Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(MediaError::from(e)),
    }
}

/// Move `src` to `dst`, falling back to copy + delete across filesystems.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(EXDEV) => {
            tracing::debug!(
                "Cross-device rename, copying instead: {} -> {}",
                src.display(),
                dst.display()
            );
            copy_and_delete(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

async fn copy_and_delete(src: &Path, dst: &Path) -> MediaResult<()> {
    // Same directory as dst so the final rename stays on one filesystem
    let staging = dst.with_extension("moving");

    if let Err(e) = fs::copy(src, &staging).await {
        let _ = remove_file_if_exists(&staging).await;
        return Err(MediaError::from(e));
    }

    if let Err(e) = fs::rename(&staging, dst).await {
        let _ = remove_file_if_exists(&staging).await;
        return Err(MediaError::from(e));
    }

    if let Err(e) = fs::remove_file(src).await {
        tracing::warn!("Failed to remove {} after copy: {}", src.display(), e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_remove_file_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clip.mp4");
        fs::write(&path, b"data").await.unwrap();

        assert!(remove_file_if_exists(&path).await.unwrap());
        assert!(!path.exists());
        assert!(!remove_file_if_exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_file_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clip.mp4");
        assert_eq!(file_size(&path).await.unwrap(), None);

        fs::write(&path, b"12345").await.unwrap();
        assert_eq!(file_size(&path).await.unwrap(), Some(5));
        assert_eq!(file_size(dir.path()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_move_file_creates_parent() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("render.part");
        let dst = dir.path().join("out").join("tiktok.mp4");
        fs::write(&src, b"video").await.unwrap();

        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"video");
    }

    #[tokio::test]
    async fn test_move_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let result = move_file(dir.path().join("nope"), dir.path().join("dst")).await;
        assert!(matches!(result, Err(MediaError::Io(_))));
    }
}
