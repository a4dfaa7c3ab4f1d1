//! Local filesystem storage backend.

use super::{ObjectStorage, StorageError};
use actix_web::web;
use async_trait::async_trait;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Local filesystem storage backend.
pub struct LocalStorage {
    /// Base path for file storage
    base_path: PathBuf,
    /// URL prefix the base path is served under
    public_url: String,
}

impl LocalStorage {
    /// Create a new local storage backend.
    ///
    /// The `base_path` directory will be created if it doesn't exist.
    pub fn new(base_path: PathBuf, public_url: String) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path)?;
        log::info!("LocalStorage initialized at {:?}", base_path);
        Ok(Self {
            base_path,
            public_url: public_url.trim_end_matches('/').to_string(),
        })
    }

    /// Resolves a key below the base path, rejecting anything that escapes it.
    fn get_file_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::Config(format!("invalid object key '{}'", key)));
        }
        Ok(self.base_path.join(relative))
    }

    pub fn public_url_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_url, key)
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn upload(
        &self,
        data: Vec<u8>,
        key: &str,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        let path = self.get_file_path(key)?;
        log::info!("LocalStorage: upload: {:?}", path);

        // Write to a temporary sibling first so a failed write leaves nothing behind.
        web::block(move || {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let tmp = path.with_extension("partial");
            fs::write(&tmp, data)?;
            fs::rename(&tmp, &path)
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;

        Ok(self.public_url_for(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_rt::test]
    async fn test_upload_writes_file_and_returns_url() {
        let dir = tempfile::tempdir().unwrap();
        let storage =
            LocalStorage::new(dir.path().to_path_buf(), "http://files.test/".to_string()).unwrap();

        let url = storage
            .upload(b"{}".to_vec(), "reports/report_2024_1.json", "application/json")
            .await
            .unwrap();

        assert_eq!(url, "http://files.test/reports/report_2024_1.json");
        let written = std::fs::read(dir.path().join("reports/report_2024_1.json")).unwrap();
        assert_eq!(written, b"{}");
        assert!(!dir.path().join("reports/report_2024_1.partial").exists());
    }

    #[actix_rt::test]
    async fn test_upload_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let storage =
            LocalStorage::new(dir.path().to_path_buf(), "http://files.test".to_string()).unwrap();

        let result = storage
            .upload(b"x".to_vec(), "../escape.txt", "text/plain")
            .await;
        assert!(matches!(result, Err(StorageError::Config(_))));
    }
}
