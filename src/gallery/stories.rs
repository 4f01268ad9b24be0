use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::{decode_all, GalleryError, GalleryStore, Story, StoryKind, Upload, UserStories, STORIES};
use crate::blobs::{sanitize_file_name, url_for, user_key};
use crate::docstore::{to_fields, BatchWriter, CollectionPath, WriteOp, DEFAULT_BATCH_LIMIT};

impl GalleryStore {
    pub async fn upload_story(
        &self,
        user_id: &str,
        uploaded_by: &str,
        upload: Upload,
    ) -> Result<Story, GalleryError> {
        let path = self.user_path(user_id, STORIES)?;
        let media_type = if upload.content_type.starts_with("video/") {
            StoryKind::Video
        } else if upload.content_type.starts_with("image/") {
            StoryKind::Image
        } else {
            return Err(GalleryError::Invalid(
                "Stories must be an image or a video".into(),
            ));
        };
        if upload.bytes.is_empty() {
            return Err(GalleryError::Invalid("Uploaded file is empty".into()));
        }

        let now = Utc::now();
        let file_name = format!(
            "story_{}_{}",
            now.timestamp_millis(),
            sanitize_file_name(&upload.file_name)
        );
        let key = user_key(user_id, STORIES, &file_name);
        self.blobs.write(&key, &upload.bytes).await?;

        let story = Story {
            id: String::new(),
            url: url_for(&key),
            file_name,
            media_type,
            uploaded_by: uploaded_by.to_string(),
            uploaded_at: Some(now),
            device_id: user_id.to_string(),
            user_id: user_id.to_string(),
            expires_at: now + self.story_ttl,
            storage_path: Some(key.clone()),
        };

        let doc = match self.store.insert(&path, to_fields(&story)?).await {
            Ok(doc) => doc,
            Err(e) => {
                if let Err(cleanup) = self.blobs.delete(&key).await {
                    tracing::warn!("Failed to remove orphaned story {}: {}", key, cleanup);
                }
                return Err(e.into());
            }
        };
        Ok(Story { id: doc.id, ..story })
    }

    /// Stories that have not expired at `now`, newest first.
    pub async fn list_active_stories(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Story>, GalleryError> {
        let path = self.user_path(user_id, STORIES)?;
        let mut stories: Vec<Story> = decode_all(self.store.list(&path).await?, "story");
        stories.retain(|story| story.is_active(now));
        stories.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(stories)
    }

    pub async fn delete_story(&self, user_id: &str, story_id: &str) -> Result<(), GalleryError> {
        let path = self.user_path(user_id, STORIES)?;
        let doc = self
            .store
            .get(&path, story_id)
            .await?
            .ok_or(GalleryError::NotFound("Story"))?;
        let story: Story = doc.decode()?;
        if story.user_id != user_id {
            return Err(GalleryError::Forbidden);
        }

        self.store.delete(&path, story_id).await?;
        if let Some(key) = story.storage_path.as_deref() {
            if let Err(e) = self.blobs.delete(key).await {
                tracing::warn!("Story {} deleted but file {} was left behind: {}", story_id, key, e);
            }
        }
        Ok(())
    }

    /// Delete every story, for every user, that expired at or before `now`.
    /// Returns how many were removed.
    pub async fn purge_expired_stories(&self, now: DateTime<Utc>) -> Result<usize, GalleryError> {
        let mut writer = BatchWriter::new(self.store.as_ref(), DEFAULT_BATCH_LIMIT);
        let mut files = Vec::new();

        for owner in self.store.list_owners().await? {
            let path = match CollectionPath::user(&owner, STORIES) {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!("Skipping stories of owner {:?}: {}", owner, e);
                    continue;
                }
            };
            let stories: Vec<Story> = decode_all(self.store.list(&path).await?, "story");
            for story in stories.into_iter().filter(|story| !story.is_active(now)) {
                writer
                    .stage(vec![WriteOp::Delete {
                        path: path.clone(),
                        id: story.id,
                    }])
                    .await?;
                if let Some(key) = story.storage_path {
                    files.push(key);
                }
            }
        }
        writer.flush().await?;

        for key in &files {
            if let Err(e) = self.blobs.delete(key).await {
                tracing::warn!("Failed to remove expired story file {}: {}", key, e);
            }
        }

        let purged = writer.committed_groups();
        if purged > 0 {
            tracing::info!("Purged {} expired stories", purged);
        }
        Ok(purged)
    }
}

/// Group stories by uploader. Each group is sorted newest first and the
/// groups are ordered by their latest story, newest first.
pub fn group_stories_by_uploader(stories: Vec<Story>) -> Vec<UserStories> {
    let mut by_uploader: BTreeMap<String, Vec<Story>> = BTreeMap::new();
    for story in stories {
        by_uploader
            .entry(story.uploaded_by.clone())
            .or_default()
            .push(story);
    }

    let mut groups: Vec<UserStories> = by_uploader
        .into_iter()
        .filter_map(|(user_name, mut stories)| {
            stories.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
            let latest_story = stories.first()?.clone();
            Some(UserStories {
                user_name,
                latest_story,
                stories,
            })
        })
        .collect();

    groups.sort_by(|a, b| b.latest_story.uploaded_at.cmp(&a.latest_story.uploaded_at));
    groups
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{gallery, upload};
    use super::*;
    use chrono::Duration;

    fn story(id: &str, by: &str, minutes_ago: i64) -> Story {
        let uploaded = Utc::now() - Duration::minutes(minutes_ago);
        Story {
            id: id.into(),
            url: String::new(),
            file_name: String::new(),
            media_type: StoryKind::Image,
            uploaded_by: by.into(),
            uploaded_at: Some(uploaded),
            device_id: String::new(),
            user_id: "u1".into(),
            expires_at: uploaded + Duration::hours(24),
            storage_path: None,
        }
    }

    #[test]
    fn grouping_orders_by_latest_story() {
        let groups = group_stories_by_uploader(vec![
            story("a1", "Alice", 30),
            story("b1", "Bob", 10),
            story("a2", "Alice", 5),
        ]);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].user_name, "Alice");
        assert_eq!(groups[0].latest_story.id, "a2");
        let ids: Vec<&str> = groups[0].stories.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a2", "a1"]);
        assert_eq!(groups[1].user_name, "Bob");
    }

    #[test]
    fn grouping_nothing_yields_nothing() {
        assert!(group_stories_by_uploader(Vec::new()).is_empty());
    }

    #[tokio::test]
    async fn stories_expire_after_ttl() {
        let (gallery, _tmp) = gallery();
        let story = gallery
            .upload_story("u1", "Jane", upload("clip.mp4", "video/mp4"))
            .await
            .unwrap();
        assert_eq!(story.media_type, StoryKind::Video);

        let now = Utc::now();
        assert_eq!(gallery.list_active_stories("u1", now).await.unwrap().len(), 1);

        let later = now + Duration::hours(25);
        assert!(gallery.list_active_stories("u1", later).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_media_story_is_rejected() {
        let (gallery, _tmp) = gallery();
        let err = gallery
            .upload_story("u1", "Jane", upload("notes.txt", "text/plain"))
            .await
            .unwrap_err();
        assert!(matches!(err, GalleryError::Invalid(_)));
    }

    #[tokio::test]
    async fn purge_removes_only_expired_stories() {
        let (gallery, _tmp) = gallery();
        let old = gallery
            .upload_story("u1", "Jane", upload("a.jpg", "image/jpeg"))
            .await
            .unwrap();
        gallery
            .upload_story("u2", "Bob", upload("b.jpg", "image/jpeg"))
            .await
            .unwrap();

        // Pull u1's story into the past
        let path = CollectionPath::user("u1", STORIES).unwrap();
        let mut expired = old.clone();
        expired.expires_at = Utc::now() - Duration::minutes(1);
        gallery
            .store()
            .set(&path, &old.id, to_fields(&expired).unwrap())
            .await
            .unwrap();

        let purged = gallery.purge_expired_stories(Utc::now()).await.unwrap();
        assert_eq!(purged, 1);

        let key = old.storage_path.unwrap();
        assert!(!gallery.blobs().exists(&key).await.unwrap());
        assert_eq!(gallery.store().count(&path).await.unwrap(), 0);
        assert_eq!(
            gallery.list_active_stories("u2", Utc::now()).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn delete_story_removes_file() {
        let (gallery, _tmp) = gallery();
        let story = gallery
            .upload_story("u1", "Jane", upload("a.jpg", "image/jpeg"))
            .await
            .unwrap();

        gallery.delete_story("u1", &story.id).await.unwrap();
        let key = story.storage_path.unwrap();
        assert!(!gallery.blobs().exists(&key).await.unwrap());
        assert!(matches!(
            gallery.delete_story("u1", &story.id).await,
            Err(GalleryError::NotFound(_))
        ));
    }
}
