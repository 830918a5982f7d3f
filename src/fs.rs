//! File system abstraction for testability.

use async_trait::async_trait;
use std::path::Path;

/// File system operations used by the downloader.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Returns the size of a regular file if it exists.
    async fn file_size(&self, path: &Path) -> Option<u64>;

    /// Creates all directories in the given path.
    async fn create_dir_all(&self, path: &Path) -> std::io::Result<()>;

    /// Creates (or truncates) a file for writing.
    async fn create_file(&self, path: &Path) -> std::io::Result<tokio::fs::File>;

    /// Opens an existing file for appending.
    async fn append_file(&self, path: &Path) -> std::io::Result<tokio::fs::File>;

    /// Renames a file, replacing the destination.
    async fn rename_file(&self, from: &Path, to: &Path) -> std::io::Result<()>;

    /// Removes a file.
    async fn remove_file(&self, path: &Path) -> std::io::Result<()>;
}

/// Default file system implementation using `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileSystem;

impl TokioFileSystem {
    /// Creates a new `TokioFileSystem` instance.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystem for TokioFileSystem {
    async fn file_size(&self, path: &Path) -> Option<u64> {
        tokio::fs::metadata(path)
            .await
            .ok()
            .filter(std::fs::Metadata::is_file)
            .map(|m| m.len())
    }

    async fn create_dir_all(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn create_file(&self, path: &Path) -> std::io::Result<tokio::fs::File> {
        tokio::fs::File::create(path).await
    }

    async fn append_file(&self, path: &Path) -> std::io::Result<tokio::fs::File> {
        tokio::fs::OpenOptions::new().append(true).open(path).await
    }

    async fn rename_file(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        tokio::fs::rename(from, to).await
    }

    async fn remove_file(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::remove_file(path).await
    }
}
