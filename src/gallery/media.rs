use chrono::Utc;
use serde::Serialize;

use super::{
    decode_all, require_text, Comment, GalleryError, GalleryStore, Like, MediaItem, MediaKind,
    Upload, COMMENTS, LIKES, MAX_COMMENT_LENGTH, MAX_NOTE_LENGTH, MEDIA,
};
use crate::blobs::{sanitize_file_name, url_for, user_key};
use crate::docstore::{to_fields, BatchWriter, WriteOp, DEFAULT_BATCH_LIMIT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LikeToggle {
    pub liked: bool,
    pub count: usize,
}

impl GalleryStore {
    /// Newest first.
    pub async fn list_media(&self, user_id: &str) -> Result<Vec<MediaItem>, GalleryError> {
        let path = self.user_path(user_id, MEDIA)?;
        let mut items: Vec<MediaItem> = decode_all(self.store.list(&path).await?, "media item");
        items.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(items)
    }

    pub async fn get_media(&self, user_id: &str, media_id: &str) -> Result<MediaItem, GalleryError> {
        let path = self.user_path(user_id, MEDIA)?;
        let doc = self
            .store
            .get(&path, media_id)
            .await?
            .ok_or(GalleryError::NotFound("Media item"))?;
        Ok(doc.decode()?)
    }

    pub async fn upload_media(
        &self,
        user_id: &str,
        uploaded_by: &str,
        upload: Upload,
    ) -> Result<MediaItem, GalleryError> {
        let path = self.user_path(user_id, MEDIA)?;
        if upload.bytes.is_empty() {
            return Err(GalleryError::Invalid("Uploaded file is empty".into()));
        }

        let now = Utc::now();
        let file_name = format!(
            "{}_{}",
            now.timestamp_millis(),
            sanitize_file_name(&upload.file_name)
        );
        let key = user_key(user_id, MEDIA, &file_name);
        self.blobs.write(&key, &upload.bytes).await?;

        let item = MediaItem {
            id: String::new(),
            name: upload.file_name,
            url: url_for(&key),
            uploaded_by: uploaded_by.to_string(),
            uploaded_at: Some(now),
            device_id: user_id.to_string(),
            kind: MediaKind::from_content_type(&upload.content_type),
            note_text: None,
            user_id: user_id.to_string(),
            storage_path: Some(key.clone()),
            size: Some(upload.bytes.len() as u64),
            is_unavailable: false,
            original_id: None,
            migrated_at: None,
        };

        let doc = match self.store.insert(&path, to_fields(&item)?).await {
            Ok(doc) => doc,
            Err(e) => {
                if let Err(cleanup) = self.blobs.delete(&key).await {
                    tracing::warn!("Failed to remove orphaned upload {}: {}", key, cleanup);
                }
                return Err(e.into());
            }
        };

        tracing::info!("User {} uploaded {} ({} bytes)", user_id, key, upload.bytes.len());
        Ok(MediaItem { id: doc.id, ..item })
    }

    pub async fn add_note(
        &self,
        user_id: &str,
        uploaded_by: &str,
        text: &str,
    ) -> Result<MediaItem, GalleryError> {
        let path = self.user_path(user_id, MEDIA)?;
        let text = require_text(text, "Note", MAX_NOTE_LENGTH)?;

        let item = MediaItem {
            id: String::new(),
            name: "Note".to_string(),
            url: String::new(),
            uploaded_by: uploaded_by.to_string(),
            uploaded_at: Some(Utc::now()),
            device_id: user_id.to_string(),
            kind: MediaKind::Note,
            note_text: Some(text),
            user_id: user_id.to_string(),
            storage_path: None,
            size: None,
            is_unavailable: false,
            original_id: None,
            migrated_at: None,
        };

        let doc = self.store.insert(&path, to_fields(&item)?).await?;
        Ok(MediaItem { id: doc.id, ..item })
    }

    /// Remove a media item together with its comments, likes and stored file.
    pub async fn delete_media(&self, user_id: &str, media_id: &str) -> Result<(), GalleryError> {
        let media_path = self.user_path(user_id, MEDIA)?;
        let item = self.get_media(user_id, media_id).await?;
        if item.user_id != user_id {
            return Err(GalleryError::Forbidden);
        }

        let mut writer = BatchWriter::new(self.store.as_ref(), DEFAULT_BATCH_LIMIT);
        for name in [COMMENTS, LIKES] {
            let path = self.user_path(user_id, name)?;
            for doc in self.store.find_where(&path, "mediaId", media_id).await? {
                writer
                    .stage(vec![WriteOp::Delete {
                        path: path.clone(),
                        id: doc.id,
                    }])
                    .await?;
            }
        }
        // The item itself goes last so a failed run can simply be retried.
        writer
            .stage(vec![WriteOp::Delete {
                path: media_path,
                id: media_id.to_string(),
            }])
            .await?;
        writer.flush().await?;

        if let Some(key) = item.storage_path.as_deref() {
            if let Err(e) = self.blobs.delete(key).await {
                tracing::warn!("Media {} deleted but file {} was left behind: {}", media_id, key, e);
            }
        }

        tracing::info!(
            "User {} deleted media {} ({} related documents)",
            user_id,
            media_id,
            writer.committed_groups().saturating_sub(1)
        );
        Ok(())
    }

    /// Oldest first. `media_id` narrows the list to one item.
    pub async fn list_comments(
        &self,
        user_id: &str,
        media_id: Option<&str>,
    ) -> Result<Vec<Comment>, GalleryError> {
        let path = self.user_path(user_id, COMMENTS)?;
        let docs = match media_id {
            Some(media_id) => self.store.find_where(&path, "mediaId", media_id).await?,
            None => self.store.list(&path).await?,
        };
        let mut comments: Vec<Comment> = decode_all(docs, "comment");
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }

    pub async fn add_comment(
        &self,
        user_id: &str,
        media_id: &str,
        user_name: &str,
        text: &str,
    ) -> Result<Comment, GalleryError> {
        let path = self.user_path(user_id, COMMENTS)?;
        let text = require_text(text, "Comment", MAX_COMMENT_LENGTH)?;
        self.get_media(user_id, media_id).await?;

        let comment = Comment {
            id: String::new(),
            media_id: media_id.to_string(),
            text,
            user_name: user_name.to_string(),
            device_id: user_id.to_string(),
            user_id: user_id.to_string(),
            created_at: Some(Utc::now()),
        };
        let doc = self.store.insert(&path, to_fields(&comment)?).await?;
        Ok(Comment { id: doc.id, ..comment })
    }

    pub async fn delete_comment(&self, user_id: &str, comment_id: &str) -> Result<(), GalleryError> {
        let path = self.user_path(user_id, COMMENTS)?;
        if !self.store.delete(&path, comment_id).await? {
            return Err(GalleryError::NotFound("Comment"));
        }
        Ok(())
    }

    pub async fn list_likes(
        &self,
        user_id: &str,
        media_id: Option<&str>,
    ) -> Result<Vec<Like>, GalleryError> {
        let path = self.user_path(user_id, LIKES)?;
        let docs = match media_id {
            Some(media_id) => self.store.find_where(&path, "mediaId", media_id).await?,
            None => self.store.list(&path).await?,
        };
        Ok(decode_all(docs, "like"))
    }

    /// Like the item if `user_name` hasn't yet, otherwise take the like back.
    pub async fn toggle_like(
        &self,
        user_id: &str,
        media_id: &str,
        user_name: &str,
    ) -> Result<LikeToggle, GalleryError> {
        let path = self.user_path(user_id, LIKES)?;
        self.get_media(user_id, media_id).await?;

        let likes = self.store.find_where(&path, "mediaId", media_id).await?;
        let existing = likes
            .iter()
            .find(|doc| doc.str_field("userName") == Some(user_name));

        let liked = match existing {
            Some(doc) => {
                self.store.delete(&path, &doc.id).await?;
                false
            }
            None => {
                let like = Like {
                    id: String::new(),
                    media_id: media_id.to_string(),
                    user_name: user_name.to_string(),
                    device_id: user_id.to_string(),
                    user_id: user_id.to_string(),
                    created_at: Some(Utc::now()),
                };
                self.store.insert(&path, to_fields(&like)?).await?;
                true
            }
        };

        let count = self.store.find_where(&path, "mediaId", media_id).await?.len();
        Ok(LikeToggle { liked, count })
    }
}
