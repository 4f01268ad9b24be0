use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use super::{decode_all, GalleryError, GalleryStore, TimelineEvent, TimelineEventType, TIMELINE};
use crate::docstore::to_fields;

const MAX_TITLE_LENGTH: usize = 200;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTimelineEvent {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: TimelineEventType,
    #[serde(default)]
    pub custom_event_name: Option<String>,
    pub date: NaiveDate,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub media_urls: Vec<String>,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEventUpdate {
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<TimelineEventType>,
    pub custom_event_name: Option<String>,
    pub date: Option<NaiveDate>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub media_urls: Option<Vec<String>>,
}

/// Trim text fields and enforce the title/custom-name rules in place.
fn normalize(event: &mut TimelineEvent) -> Result<(), GalleryError> {
    event.title = super::require_text(&event.title, "Title", MAX_TITLE_LENGTH)?;
    event.description = event.description.trim().to_string();
    event.location = event
        .location
        .take()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty());

    if event.kind == TimelineEventType::Custom {
        let name = event
            .custom_event_name
            .take()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                GalleryError::Invalid("Custom events need a custom event name".into())
            })?;
        event.custom_event_name = Some(name);
    } else {
        event.custom_event_name = None;
    }
    Ok(())
}

impl GalleryStore {
    /// Chronological, oldest event first.
    pub async fn list_timeline(&self, user_id: &str) -> Result<Vec<TimelineEvent>, GalleryError> {
        let path = self.user_path(user_id, TIMELINE)?;
        let mut events: Vec<TimelineEvent> =
            decode_all(self.store.list(&path).await?, "timeline event");
        events.sort_by(|a, b| a.date.cmp(&b.date).then(a.created_at.cmp(&b.created_at)));
        Ok(events)
    }

    pub async fn create_timeline_event(
        &self,
        user_id: &str,
        created_by: &str,
        new: NewTimelineEvent,
    ) -> Result<TimelineEvent, GalleryError> {
        let path = self.user_path(user_id, TIMELINE)?;
        let mut event = TimelineEvent {
            id: String::new(),
            title: new.title,
            kind: new.kind,
            custom_event_name: new.custom_event_name,
            date: new.date,
            description: new.description,
            location: new.location,
            media_urls: new.media_urls,
            created_by: created_by.to_string(),
            user_id: user_id.to_string(),
            created_at: Some(Utc::now()),
        };
        normalize(&mut event)?;

        let doc = self.store.insert(&path, to_fields(&event)?).await?;
        Ok(TimelineEvent { id: doc.id, ..event })
    }

    pub async fn update_timeline_event(
        &self,
        user_id: &str,
        event_id: &str,
        update: TimelineEventUpdate,
    ) -> Result<TimelineEvent, GalleryError> {
        let path = self.user_path(user_id, TIMELINE)?;
        let doc = self
            .store
            .get(&path, event_id)
            .await?
            .ok_or(GalleryError::NotFound("Timeline event"))?;
        let mut event: TimelineEvent = doc.decode()?;

        if let Some(title) = update.title {
            event.title = title;
        }
        if let Some(kind) = update.kind {
            event.kind = kind;
        }
        if update.custom_event_name.is_some() {
            event.custom_event_name = update.custom_event_name;
        }
        if let Some(date) = update.date {
            event.date = date;
        }
        if let Some(description) = update.description {
            event.description = description;
        }
        if update.location.is_some() {
            event.location = update.location;
        }
        if let Some(media_urls) = update.media_urls {
            event.media_urls = media_urls;
        }
        normalize(&mut event)?;

        self.store.set(&path, event_id, to_fields(&event)?).await?;
        Ok(event)
    }

    pub async fn delete_timeline_event(
        &self,
        user_id: &str,
        event_id: &str,
    ) -> Result<(), GalleryError> {
        let path = self.user_path(user_id, TIMELINE)?;
        if !self.store.delete(&path, event_id).await? {
            return Err(GalleryError::NotFound("Timeline event"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::gallery;
    use super::*;

    fn new_event(title: &str, kind: TimelineEventType, date: &str) -> NewTimelineEvent {
        NewTimelineEvent {
            title: title.to_string(),
            kind,
            custom_event_name: None,
            date: date.parse().unwrap(),
            description: String::new(),
            location: None,
            media_urls: Vec::new(),
        }
    }

    #[tokio::test]
    async fn events_sort_by_date() {
        let (gallery, _tmp) = gallery();
        gallery
            .create_timeline_event("u1", "Jane", new_event("Engaged", TimelineEventType::Engagement, "2023-06-01"))
            .await
            .unwrap();
        gallery
            .create_timeline_event("u1", "Jane", new_event("We met", TimelineEventType::FirstDate, "2019-02-14"))
            .await
            .unwrap();

        let titles: Vec<String> = gallery
            .list_timeline("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, vec!["We met", "Engaged"]);
    }

    #[tokio::test]
    async fn custom_event_needs_a_name() {
        let (gallery, _tmp) = gallery();
        let mut event = new_event("Road trip", TimelineEventType::Custom, "2021-08-01");
        let err = gallery
            .create_timeline_event("u1", "Jane", event.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, GalleryError::Invalid(_)));

        event.custom_event_name = Some("  Big trip ".into());
        let created = gallery.create_timeline_event("u1", "Jane", event).await.unwrap();
        assert_eq!(created.custom_event_name.as_deref(), Some("Big trip"));
    }

    #[tokio::test]
    async fn custom_name_is_dropped_for_builtin_types() {
        let (gallery, _tmp) = gallery();
        let mut event = new_event("Kiss", TimelineEventType::FirstKiss, "2019-03-01");
        event.custom_event_name = Some("ignored".into());
        let created = gallery.create_timeline_event("u1", "Jane", event).await.unwrap();
        assert_eq!(created.custom_event_name, None);
    }

    #[tokio::test]
    async fn update_merges_fields() {
        let (gallery, _tmp) = gallery();
        let created = gallery
            .create_timeline_event("u1", "Jane", new_event("Moved in", TimelineEventType::MovingTogether, "2020-01-01"))
            .await
            .unwrap();

        let updated = gallery
            .update_timeline_event(
                "u1",
                &created.id,
                TimelineEventUpdate {
                    location: Some("Lisbon".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Moved in");
        assert_eq!(updated.location.as_deref(), Some("Lisbon"));

        let stored = gallery.list_timeline("u1").await.unwrap();
        assert_eq!(stored[0].location.as_deref(), Some("Lisbon"));
    }

    #[tokio::test]
    async fn delete_missing_event_is_not_found() {
        let (gallery, _tmp) = gallery();
        assert!(matches!(
            gallery.delete_timeline_event("u1", "nope").await,
            Err(GalleryError::NotFound(_))
        ));
    }
}
