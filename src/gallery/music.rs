use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{decode_all, GalleryError, GalleryStore, SpotifyCredentials, WishlistItem, SPOTIFY, WISHLIST};
use crate::docstore::to_fields;

const CREDENTIALS_DOC: &str = "current";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWishlistItem {
    pub track_id: String,
    pub name: String,
    pub artists: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub album_image: Option<String>,
    pub uri: String,
}

impl GalleryStore {
    pub async fn get_spotify_credentials(
        &self,
        user_id: &str,
    ) -> Result<Option<SpotifyCredentials>, GalleryError> {
        let path = self.user_path(user_id, SPOTIFY)?;
        match self.store.get(&path, CREDENTIALS_DOC).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    pub async fn save_spotify_credentials(
        &self,
        user_id: &str,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<SpotifyCredentials, GalleryError> {
        let path = self.user_path(user_id, SPOTIFY)?;
        if access_token.trim().is_empty() || refresh_token.trim().is_empty() {
            return Err(GalleryError::Invalid("Spotify tokens cannot be empty".into()));
        }

        let credentials = SpotifyCredentials {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            expires_at,
            user_id: user_id.to_string(),
            updated_at: Some(Utc::now()),
        };
        self.store
            .set(&path, CREDENTIALS_DOC, to_fields(&credentials)?)
            .await?;
        tracing::debug!("Stored Spotify credentials for {}", user_id);
        Ok(credentials)
    }

    /// Newest first.
    pub async fn list_wishlist(&self, user_id: &str) -> Result<Vec<WishlistItem>, GalleryError> {
        let path = self.user_path(user_id, WISHLIST)?;
        let mut items: Vec<WishlistItem> = decode_all(self.store.list(&path).await?, "wishlist item");
        items.sort_by(|a, b| b.added_at.cmp(&a.added_at));
        Ok(items)
    }

    /// Adding a track that is already on the list returns the existing entry.
    pub async fn add_wishlist_item(
        &self,
        user_id: &str,
        added_by: &str,
        new: NewWishlistItem,
    ) -> Result<WishlistItem, GalleryError> {
        let path = self.user_path(user_id, WISHLIST)?;
        for (value, field) in [(&new.track_id, "Track id"), (&new.name, "Track name"), (&new.uri, "Track uri")] {
            if value.trim().is_empty() {
                return Err(GalleryError::Invalid(format!("{} cannot be empty", field)));
            }
        }

        if let Some(doc) = self
            .store
            .find_where(&path, "trackId", &new.track_id)
            .await?
            .into_iter()
            .next()
        {
            return Ok(doc.decode()?);
        }

        let item = WishlistItem {
            id: String::new(),
            track_id: new.track_id,
            name: new.name,
            artists: new.artists,
            album: new.album,
            album_image: new.album_image,
            uri: new.uri,
            added_by: added_by.to_string(),
            user_id: user_id.to_string(),
            added_at: Some(Utc::now()),
        };
        let doc = self.store.insert(&path, to_fields(&item)?).await?;
        Ok(WishlistItem { id: doc.id, ..item })
    }

    pub async fn delete_wishlist_item(&self, user_id: &str, item_id: &str) -> Result<(), GalleryError> {
        let path = self.user_path(user_id, WISHLIST)?;
        if !self.store.delete(&path, item_id).await? {
            return Err(GalleryError::NotFound("Wishlist item"));
        }
        Ok(())
    }
}
