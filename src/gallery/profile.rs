use chrono::Utc;
use serde::Deserialize;

use super::{GalleryError, GalleryStore, UserProfile, PROFILE};
use crate::docstore::to_fields;

const PROFILE_DOC: &str = "data";
const MAX_DISPLAY_NAME_LENGTH: usize = 64;
const MAX_BIO_LENGTH: usize = 500;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub profile_image: Option<String>,
    pub dark_mode: Option<bool>,
    pub audio_enabled: Option<bool>,
}

impl GalleryStore {
    pub async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, GalleryError> {
        let path = self.user_path(user_id, PROFILE)?;
        match self.store.get(&path, PROFILE_DOC).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// Merge `update` into the stored profile, creating it on first write.
    pub async fn update_profile(
        &self,
        user_id: &str,
        update: ProfileUpdate,
    ) -> Result<UserProfile, GalleryError> {
        let path = self.user_path(user_id, PROFILE)?;
        let mut profile = self.get_profile(user_id).await?.unwrap_or_default();
        profile.user_id = user_id.to_string();

        if let Some(name) = update.display_name {
            profile.display_name = super::require_text(&name, "Display name", MAX_DISPLAY_NAME_LENGTH)?;
        }
        if let Some(bio) = update.bio {
            let bio = bio.trim().to_string();
            if bio.chars().count() > MAX_BIO_LENGTH {
                return Err(GalleryError::Invalid(format!(
                    "Bio must be {} characters or less",
                    MAX_BIO_LENGTH
                )));
            }
            profile.bio = Some(bio).filter(|b| !b.is_empty());
        }
        if let Some(image) = update.profile_image {
            profile.profile_image = Some(image).filter(|i| !i.is_empty());
        }
        if let Some(dark_mode) = update.dark_mode {
            profile.dark_mode = dark_mode;
        }
        if let Some(audio_enabled) = update.audio_enabled {
            profile.audio_enabled = audio_enabled;
        }
        profile.updated_at = Some(Utc::now());

        self.store.set(&path, PROFILE_DOC, to_fields(&profile)?).await?;
        Ok(profile)
    }
}
