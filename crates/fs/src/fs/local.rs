use std::path::Path as StdPath;

use async_trait::async_trait;
use tokio_util::io::ReaderStream;

use crate::node::ByteStream;

/// A host directory entry, as seen through the adapter
#[derive(Debug, Clone)]
pub struct LocalEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Read-only view of a hierarchical host filesystem, used to copy
/// content in. No write capability is required or exposed.
#[async_trait]
pub trait LocalFs: Send + Sync {
    /// Open a file as a byte stream
    async fn open(&self, path: &StdPath) -> std::io::Result<ByteStream>;
    /// List a directory's entries
    async fn read_dir(&self, path: &StdPath) -> std::io::Result<Vec<LocalEntry>>;
    /// Whether the path names a directory
    async fn is_dir(&self, path: &StdPath) -> std::io::Result<bool>;
}

/// The host operating system's filesystem
#[derive(Debug, Clone, Default)]
pub struct OsFs;

#[async_trait]
impl LocalFs for OsFs {
    async fn open(&self, path: &StdPath) -> std::io::Result<ByteStream> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Box::new(ReaderStream::new(file)))
    }

    async fn read_dir(&self, path: &StdPath) -> std::io::Result<Vec<LocalEntry>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(path).await?;
        while let Some(entry) = dir.next_entry().await? {
            let file_type = entry.file_type().await?;
            entries.push(LocalEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                is_dir: file_type.is_dir(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn is_dir(&self, path: &StdPath) -> std::io::Result<bool> {
        Ok(tokio::fs::metadata(path).await?.is_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_os_fs_reads_files_and_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), b"alpha")
            .await
            .unwrap();
        tokio::fs::create_dir(dir.path().join("sub")).await.unwrap();

        let fs = OsFs;
        assert!(fs.is_dir(dir.path()).await.unwrap());
        assert!(!fs.is_dir(&dir.path().join("a.txt")).await.unwrap());

        let entries = fs.read_dir(dir.path()).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a.txt");
        assert!(!entries[0].is_dir);
        assert_eq!(entries[1].name, "sub");
        assert!(entries[1].is_dir);

        let mut stream = fs.open(&dir.path().join("a.txt")).await.unwrap();
        let mut content = Vec::new();
        while let Some(chunk) = stream.next().await {
            content.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(content, b"alpha");
    }
}
