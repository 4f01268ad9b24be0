//! Per-user gallery operations.
//!
//! Everything here reads and writes `users/{uid}/...` only. The caller's user
//! id is validated before any store access.

mod media;
pub mod models;
mod music;
mod profile;
mod stories;
mod timeline;
mod timestamp;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;

use crate::blobs::{BlobError, BlobStore};
use crate::docstore::{CollectionPath, Document, DocumentStore, StoreError};

pub use self::media::LikeToggle;
pub use self::models::*;
pub use self::music::NewWishlistItem;
pub use self::profile::ProfileUpdate;
pub use self::stories::group_stories_by_uploader;
pub use self::timeline::{NewTimelineEvent, TimelineEventUpdate};

pub const MEDIA: &str = "media";
pub const COMMENTS: &str = "comments";
pub const LIKES: &str = "likes";
pub const STORIES: &str = "stories";
pub const TIMELINE: &str = "timeline";
pub const PROFILE: &str = "profile";
pub const SPOTIFY: &str = "spotify";
pub const WISHLIST: &str = "wishlist";

pub const MAX_NOTE_LENGTH: usize = 2000;
pub const MAX_COMMENT_LENGTH: usize = 500;

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("Invalid user id")]
    InvalidUser,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("You can only modify your own items")]
    Forbidden,

    #[error("{0}")]
    Invalid(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Blob error: {0}")]
    Blob(#[from] BlobError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A file received from a client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

#[derive(Clone)]
pub struct GalleryStore {
    store: Arc<dyn DocumentStore>,
    blobs: BlobStore,
    story_ttl: chrono::Duration,
}

impl GalleryStore {
    pub fn new(store: Arc<dyn DocumentStore>, blobs: BlobStore, story_ttl: chrono::Duration) -> Self {
        Self {
            store,
            blobs,
            story_ttl,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    fn user_path(&self, user_id: &str, name: &str) -> Result<CollectionPath, GalleryError> {
        validate_user_id(user_id)?;
        CollectionPath::user(user_id, name).map_err(|_| GalleryError::InvalidUser)
    }
}

pub fn validate_user_id(user_id: &str) -> Result<(), GalleryError> {
    if user_id.trim().is_empty() {
        return Err(GalleryError::InvalidUser);
    }
    Ok(())
}

/// Decode every document, skipping (and logging) the ones that don't fit the
/// model. Legacy documents are not guaranteed to carry every field.
pub(crate) fn decode_all<T: DeserializeOwned>(docs: Vec<Document>, what: &str) -> Vec<T> {
    docs.into_iter()
        .filter_map(|doc| match doc.decode::<T>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Skipping unreadable {} {}: {}", what, doc.id, e);
                None
            }
        })
        .collect()
}

pub(crate) fn require_text(value: &str, field: &str, max: usize) -> Result<String, GalleryError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(GalleryError::Invalid(format!("{} cannot be empty", field)));
    }
    if trimmed.chars().count() > max {
        return Err(GalleryError::Invalid(format!(
            "{} must be {} characters or less",
            field, max
        )));
    }
    Ok(trimmed.to_string())
}
