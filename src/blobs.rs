//! Uploaded file storage on local disk.
//!
//! Keys are `/`-separated relative paths such as `users/{uid}/media/{file}`.
//! Legacy uploads live under `galleries/{uid}/...`.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::docstore::validate_segment;

pub const LEGACY_ROOT: &str = "galleries";
pub const USERS_ROOT: &str = "users";

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid blob key: {0}")]
    InvalidKey(String),

    #[error("Blob already exists: {0}")]
    AlreadyExists(String),
}

#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path under the root. Every segment is validated so a
    /// key can never climb out of the root.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, BlobError> {
        let mut path = self.root.clone();
        for segment in key.split('/') {
            validate_segment(segment).map_err(|_| BlobError::InvalidKey(key.to_string()))?;
            path.push(segment);
        }
        Ok(path)
    }

    pub async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), BlobError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    pub async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, key: &str) -> Result<bool, BlobError> {
        let path = self.path_for(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    /// Returns whether the blob existed.
    pub async fn delete(&self, key: &str) -> Result<bool, BlobError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Move a blob. Refuses to overwrite an existing destination.
    pub async fn rename(&self, from: &str, to: &str) -> Result<(), BlobError> {
        let source = self.path_for(from)?;
        let target = self.path_for(to)?;
        if tokio::fs::try_exists(&target).await? {
            return Err(BlobError::AlreadyExists(to.to_string()));
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&source, &target).await?;
        Ok(())
    }

    /// Every legacy blob, grouped by the owner directory it sits in.
    pub async fn list_legacy(&self) -> Result<Vec<(String, Vec<String>)>, BlobError> {
        let legacy_root = self.root.join(LEGACY_ROOT);
        if !tokio::fs::try_exists(&legacy_root).await? {
            return Ok(Vec::new());
        }

        let mut owners = Vec::new();
        let mut entries = tokio::fs::read_dir(&legacy_root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let owner = entry.file_name().to_string_lossy().into_owned();
            let prefix = format!("{}/{}", LEGACY_ROOT, owner);
            let mut keys = Vec::new();
            collect_files(&entry.path(), &prefix, &mut keys).await?;
            keys.sort();
            owners.push((owner, keys));
        }
        owners.sort();
        Ok(owners)
    }
}

async fn collect_files(dir: &Path, prefix: &str, keys: &mut Vec<String>) -> Result<(), BlobError> {
    let mut pending = vec![(dir.to_path_buf(), prefix.to_string())];
    while let Some((dir, prefix)) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let key = format!("{}/{}", prefix, name);
            if entry.file_type().await?.is_dir() {
                pending.push((entry.path(), key));
            } else {
                keys.push(key);
            }
        }
    }
    Ok(())
}

/// Keep `[A-Za-z0-9.-]`, replace everything else with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

pub fn user_key(owner: &str, category: &str, file_name: &str) -> String {
    format!("{}/{}/{}/{}", USERS_ROOT, owner, category, file_name)
}

/// Public download URL for a blob key.
pub fn url_for(key: &str) -> String {
    format!("/files/{}", key)
}

/// Owner segment of a `users/{owner}/...` key.
pub fn key_owner(key: &str) -> Option<&str> {
    let mut parts = key.splitn(3, '/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(USERS_ROOT), Some(owner), Some(rest)) if !rest.is_empty() => Some(owner),
        _ => None,
    }
}

/// True for keys under the pre-isolation `galleries/` tree.
pub fn is_legacy_key(key: &str) -> bool {
    key.strip_prefix(LEGACY_ROOT)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|rest| !rest.is_empty())
}
