use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{Account, AuthError, AuthService};
use crate::docstore::{to_fields, BatchWriter, CollectionPath, WriteOp, DEFAULT_BATCH_LIMIT};

pub const SESSIONS: &str = "sessions";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

fn sessions_path() -> CollectionPath {
    CollectionPath::global(SESSIONS)
}

impl AuthService {
    /// Create a new session for a user. Returns the session token.
    pub async fn create_session(&self, user_id: &str) -> Result<String, AuthError> {
        let token = generate_token();
        let now = Utc::now();
        let session = Session {
            user_id: user_id.to_string(),
            created_at: now,
            expires_at: now + chrono::Duration::hours(self.session_hours as i64),
        };
        self.store
            .set(&sessions_path(), &token, to_fields(&session)?)
            .await?;
        Ok(token)
    }

    /// Account behind a live session. Expired sessions are deleted on sight.
    pub async fn resolve_session(&self, token: &str) -> Result<Option<Account>, AuthError> {
        let Some(doc) = self.store.get(&sessions_path(), token).await? else {
            return Ok(None);
        };
        let session: Session = doc.decode()?;
        if session.expires_at <= Utc::now() {
            self.store.delete(&sessions_path(), token).await?;
            return Ok(None);
        }
        self.get_account(&session.user_id).await
    }

    /// Delete a session by token.
    pub async fn delete_session(&self, token: &str) -> Result<(), AuthError> {
        self.store.delete(&sessions_path(), token).await?;
        Ok(())
    }

    /// Delete every session that expired at or before `now`, including ones
    /// that no longer decode. Returns how many were removed.
    pub async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize, AuthError> {
        let path = sessions_path();
        let mut writer = BatchWriter::new(self.store.as_ref(), DEFAULT_BATCH_LIMIT);
        for doc in self.store.list(&path).await? {
            let expired = match doc.decode::<Session>() {
                Ok(session) => session.expires_at <= now,
                Err(e) => {
                    tracing::warn!("Dropping unreadable session: {}", e);
                    true
                }
            };
            if expired {
                writer
                    .stage(vec![WriteOp::Delete {
                        path: path.clone(),
                        id: doc.id,
                    }])
                    .await?;
            }
        }
        writer.flush().await?;
        Ok(writer.committed_groups())
    }
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Registration;
    use crate::docstore::{DocumentStore, MemoryDocumentStore};
    use std::sync::Arc;

    #[test]
    fn generate_token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_token_is_unique() {
        let t1 = generate_token();
        let t2 = generate_token();
        assert_ne!(t1, t2);
    }

    async fn registered(hours: u64) -> (AuthService, Arc<MemoryDocumentStore>, Account) {
        let store = Arc::new(MemoryDocumentStore::new());
        let auth = AuthService::new(store.clone(), hours, 4);
        let account = auth
            .register(Registration {
                username: "jane".into(),
                password: "secret123".into(),
                display_name: "Jane".into(),
                email: None,
            })
            .await
            .unwrap();
        (auth, store, account)
    }

    #[tokio::test]
    async fn session_resolves_to_account_until_logout() {
        let (auth, _store, account) = registered(24).await;
        let token = auth.create_session(&account.id).await.unwrap();

        let resolved = auth.resolve_session(&token).await.unwrap().unwrap();
        assert_eq!(resolved.id, account.id);

        auth.delete_session(&token).await.unwrap();
        assert!(auth.resolve_session(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_session_is_removed() {
        let (auth, store, account) = registered(0).await;
        let token = auth.create_session(&account.id).await.unwrap();

        assert!(auth.resolve_session(&token).await.unwrap().is_none());
        assert!(store.get(&sessions_path(), &token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_sessions() {
        let (auth, store, account) = registered(1).await;
        let live = auth.create_session(&account.id).await.unwrap();
        let stale = auth.create_session(&account.id).await.unwrap();
        store
            .set(
                &sessions_path(),
                &stale,
                to_fields(&Session {
                    user_id: account.id.clone(),
                    created_at: Utc::now() - chrono::Duration::hours(3),
                    expires_at: Utc::now() - chrono::Duration::hours(2),
                })
                .unwrap(),
            )
            .await
            .unwrap();
        store
            .set(&sessions_path(), "garbled", serde_json::Map::new())
            .await
            .unwrap();

        let purged = auth.purge_expired_sessions(Utc::now()).await.unwrap();

        assert_eq!(purged, 2);
        assert_eq!(store.count(&sessions_path()).await.unwrap(), 1);
        assert!(auth.resolve_session(&live).await.unwrap().is_some());
        assert_eq!(auth.purge_expired_sessions(Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_token_is_none() {
        let (auth, _store, _account) = registered(24).await;
        assert!(auth.resolve_session("deadbeef").await.unwrap().is_none());
    }
}
