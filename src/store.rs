use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tempfile::Builder;

use crate::domain::{BlobKey, BlobRef};
use crate::error::EtlError;

pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// Bucket-scoped blob storage. Writes fully replace the object.
pub trait ObjectStore {
    fn bucket(&self) -> &str;
    fn put(&self, key: &BlobKey, content: &[u8], content_type: &str) -> Result<BlobRef, EtlError>;
    fn get(&self, key: &BlobKey) -> Result<Vec<u8>, EtlError>;
    fn exists(&self, key: &BlobKey) -> Result<bool, EtlError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobMetadata {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    pub size: u64,
    pub updated_at: String,
}

/// A bucket backed by a local directory: `<root>/<bucket>/<key>`, with a
/// `<key>.meta.json` sidecar next to every object.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: Utf8PathBuf,
    bucket: String,
}

impl FsObjectStore {
    pub fn new(root: impl Into<Utf8PathBuf>, bucket: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            bucket: bucket.into(),
        }
    }

    pub fn bucket_root(&self) -> Utf8PathBuf {
        self.root.join(&self.bucket)
    }

    pub fn object_path(&self, key: &BlobKey) -> Utf8PathBuf {
        self.bucket_root().join(key.as_str())
    }

    pub fn metadata_path(&self, key: &BlobKey) -> Utf8PathBuf {
        self.bucket_root().join(format!("{}.meta.json", key.as_str()))
    }

    pub fn read_metadata(&self, key: &BlobKey) -> Result<Option<BlobMetadata>, EtlError> {
        let path = self.metadata_path(key);
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| EtlError::Storage(format!("read {path}: {err}")))?;
        let metadata = serde_json::from_str(&content)
            .map_err(|err| EtlError::Storage(format!("parse {path}: {err}")))?;
        Ok(Some(metadata))
    }

    fn not_found(&self, key: &BlobKey) -> EtlError {
        EtlError::BlobNotFound {
            bucket: self.bucket.clone(),
            key: key.to_string(),
        }
    }
}

impl ObjectStore for FsObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn put(&self, key: &BlobKey, content: &[u8], content_type: &str) -> Result<BlobRef, EtlError> {
        let path = self.object_path(key);
        write_atomic(&path, content)?;

        let metadata = BlobMetadata {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            content_type: content_type.to_string(),
            size: content.len() as u64,
            updated_at: chrono::Utc::now().to_rfc3339(),
        };
        let encoded = serde_json::to_vec_pretty(&metadata)
            .map_err(|err| EtlError::Storage(err.to_string()))?;
        write_atomic(&self.metadata_path(key), &encoded)?;

        Ok(BlobRef {
            bucket: self.bucket.clone(),
            key: key.clone(),
        })
    }

    fn get(&self, key: &BlobKey) -> Result<Vec<u8>, EtlError> {
        let path = self.object_path(key);
        match fs::read(path.as_std_path()) {
            Ok(content) => Ok(content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(self.not_found(key)),
            Err(err) => Err(EtlError::Storage(format!("read {path}: {err}"))),
        }
    }

    fn exists(&self, key: &BlobKey) -> Result<bool, EtlError> {
        Ok(self.object_path(key).as_std_path().is_file())
    }
}

/// Write through a temp file in the destination directory, then persist over `path`.
pub fn write_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), EtlError> {
    let parent = path
        .parent()
        .ok_or_else(|| EtlError::Storage(format!("invalid object path {path}")))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| EtlError::Storage(format!("create {parent}: {err}")))?;
    let mut temp = Builder::new()
        .prefix(".species-etl-blob")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| EtlError::Storage(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| EtlError::Storage(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| EtlError::Storage(format!("persist {path}: {}", err.error)))?;
    Ok(())
}
