use crate::core::Storage;
use crate::utils::error::Result;
use std::path::{Path, PathBuf};

/// File-system storage. Relative paths resolve against `root`; absolute
/// paths are used as given.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn current_dir() -> Self {
        Self::new(".")
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(Path::new(path))
    }
}

impl Storage for LocalStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.resolve(path);
        let data = tokio::fs::read(&full_path).await?;
        tracing::debug!("Read {} bytes from {}", data.len(), full_path.display());
        Ok(data)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.resolve(path);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full_path, data).await?;
        tracing::debug!("Wrote {} bytes to {}", data.len(), full_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_parent_directories() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp.path());
        storage
            .write_file("out/charts/a.json", b"{\"a\":1}")
            .await
            .unwrap();
        assert!(temp.path().join("out/charts/a.json").exists());
        assert_eq!(
            storage.read_file("out/charts/a.json").await.unwrap(),
            b"{\"a\":1}".to_vec()
        );
    }

    #[tokio::test]
    async fn test_absolute_paths_bypass_root() {
        let temp = TempDir::new().unwrap();
        let absolute = temp.path().join("prompt.md");
        std::fs::write(&absolute, "hello").unwrap();
        let storage = LocalStorage::new("/nonexistent-root");
        let data = storage.read_file(absolute.to_str().unwrap()).await.unwrap();
        assert_eq!(data, b"hello".to_vec());
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let storage = LocalStorage::current_dir();
        let err = storage.read_file("does/not/exist.md").await.unwrap_err();
        assert!(matches!(err, crate::utils::error::ChartError::IoError(_)));
    }
}
