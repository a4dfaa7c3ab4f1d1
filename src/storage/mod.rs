//! Object storage abstraction for uploaded evidence, exams and report snapshots.
//!
//! Supports multiple backends:
//! - `local`: Local filesystem storage
//! - `s3`: S3-compatible object storage (MinIO, AWS S3, etc.)

pub mod local;
pub mod s3;

use crate::app_config::StorageConfig;
use async_trait::async_trait;
use rusoto_core::Region;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Storage operation errors.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error
    Io(std::io::Error),
    /// S3 error
    S3(String),
    /// Backend misconfigured
    Config(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "I/O error: {}", e),
            StorageError::S3(msg) => write!(f, "S3 error: {}", msg),
            StorageError::Config(msg) => write!(f, "Storage misconfigured: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}

/// Durable object storage.
///
/// An upload either stores the whole object and returns its public URL,
/// or fails with nothing stored.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(
        &self,
        data: Vec<u8>,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError>;
}

/// Builds an object key of the form `{prefix}/{uuid}{ext}`.
///
/// The extension is taken from the client file name, lowercased, and dropped
/// when it is not plain alphanumeric.
pub fn object_key(prefix: &str, original_name: &str) -> String {
    let ext = original_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default();

    format!("{}/{}{}", prefix, uuid::Uuid::new_v4(), ext)
}

/// Key for a monthly report snapshot.
pub fn report_key(year: i32, month: u32) -> String {
    format!("reports/report_{}_{}.json", year, month)
}

/// A file received from a client, not yet stored.
#[derive(Clone, Debug)]
pub struct PendingFile {
    pub original_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// A file that made it into storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoredFile {
    pub url: String,
    pub original_name: String,
    pub content_type: String,
    pub size: u64,
}

/// Uploads every file under `prefix`, stopping at the first failure.
/// Callers write their entity only once this returns Ok.
pub async fn upload_all(
    storage: &dyn ObjectStorage,
    prefix: &str,
    files: Vec<PendingFile>,
) -> Result<Vec<StoredFile>, StorageError> {
    let mut stored = Vec::with_capacity(files.len());
    for file in files {
        let key = object_key(prefix, &file.original_name);
        let size = file.data.len() as u64;
        let url = storage.upload(file.data, &key, &file.content_type).await?;
        stored.push(StoredFile {
            url,
            original_name: file.original_name,
            content_type: file.content_type,
            size,
        });
    }
    Ok(stored)
}

/// Creates the configured backend.
pub fn from_config(config: &StorageConfig) -> Result<Arc<dyn ObjectStorage>, StorageError> {
    match config.backend.as_str() {
        "local" => Ok(Arc::new(local::LocalStorage::new(
            PathBuf::from(&config.local_path),
            config.local_public_url.clone(),
        )?)),
        "s3" => {
            let region = Region::Custom {
                name: config.s3_region.clone(),
                endpoint: config.s3_endpoint.clone(),
            };
            Ok(Arc::new(s3::S3Storage::new(
                region,
                config.s3_bucket.clone(),
                config.s3_public_url.clone(),
            )))
        }
        other => Err(StorageError::Config(format!(
            "unknown storage backend '{}'",
            other
        ))),
    }
}
