use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AuthError, AuthService};
use crate::docstore::{new_document_id, to_fields, CollectionPath};

pub const ACCOUNTS: &str = "accounts";
pub const MIN_PASSWORD_LENGTH: usize = 6;
const MAX_DISPLAY_NAME_LENGTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(default)]
    pub id: String,
    pub username: String,
    pub password_hash: String,
    #[serde(default)]
    pub email: Option<String>,
    pub display_name: String,
    #[serde(default)]
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// An account without its password hash.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicAccount {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub display_name: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Account> for PublicAccount {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.clone(),
            username: account.username.clone(),
            email: account.email.clone(),
            display_name: account.display_name.clone(),
            is_admin: account.is_admin,
            created_at: account.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// 3 to 32 characters of `[A-Za-z0-9_.-]`.
pub fn validate_username(username: &str) -> Result<(), AuthError> {
    let len = username.chars().count();
    if !(3..=32).contains(&len) {
        return Err(AuthError::InvalidInput(
            "Username must be between 3 and 32 characters".into(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(AuthError::InvalidInput(
            "Username may only contain letters, digits, '_', '.' and '-'".into(),
        ));
    }
    Ok(())
}

fn accounts_path() -> CollectionPath {
    CollectionPath::global(ACCOUNTS)
}

impl AuthService {
    pub async fn register(&self, registration: Registration) -> Result<Account, AuthError> {
        self.create_account(registration, false).await
    }

    async fn create_account(
        &self,
        registration: Registration,
        is_admin: bool,
    ) -> Result<Account, AuthError> {
        let username = registration.username.trim().to_string();
        validate_username(&username)?;
        if registration.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::InvalidInput(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }
        let display_name = registration.display_name.trim().to_string();
        if display_name.is_empty() || display_name.chars().count() > MAX_DISPLAY_NAME_LENGTH {
            return Err(AuthError::InvalidInput(format!(
                "Display name must be between 1 and {} characters",
                MAX_DISPLAY_NAME_LENGTH
            )));
        }
        let email = registration
            .email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());

        let password_hash = self.hash_password(registration.password).await?;

        let _guard = self.registration.lock().await;
        if self.find_by_username(&username).await?.is_some() {
            return Err(AuthError::UsernameTaken);
        }

        let account = Account {
            id: new_document_id(),
            username,
            password_hash,
            email,
            display_name,
            is_admin,
            created_at: Utc::now(),
        };
        self.store
            .set(&accounts_path(), &account.id, to_fields(&account)?)
            .await?;

        tracing::info!("Registered account {} ({})", account.username, account.id);
        Ok(account)
    }

    /// Wrong username and wrong password fail the same way.
    pub async fn login(&self, username: &str, password: &str) -> Result<Account, AuthError> {
        let account = self
            .find_by_username(username.trim())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let hash = account.password_hash.clone();
        let password = password.to_string();
        let valid = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))??;
        if !valid {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(account)
    }

    /// Make sure an admin account with these credentials exists. Returns
    /// whether a new account was created.
    pub async fn bootstrap_admin(&self, username: &str, password: &str) -> Result<bool, AuthError> {
        if let Some(mut account) = self.find_by_username(username.trim()).await? {
            if !account.is_admin {
                account.is_admin = true;
                self.store
                    .set(&accounts_path(), &account.id, to_fields(&account)?)
                    .await?;
                tracing::info!("Promoted {} to admin", account.username);
            }
            return Ok(false);
        }

        self.create_account(
            Registration {
                username: username.to_string(),
                password: password.to_string(),
                display_name: username.to_string(),
                email: None,
            },
            true,
        )
        .await?;
        Ok(true)
    }

    pub async fn get_account(&self, id: &str) -> Result<Option<Account>, AuthError> {
        match self.store.get(&accounts_path(), id).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// Oldest first.
    pub async fn list_accounts(&self) -> Result<Vec<Account>, AuthError> {
        let mut accounts = Vec::new();
        for doc in self.store.list(&accounts_path()).await? {
            accounts.push(doc.decode::<Account>()?);
        }
        accounts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(accounts)
    }

    /// Usernames compare case-insensitively.
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, AuthError> {
        for doc in self.store.list(&accounts_path()).await? {
            let matches = doc
                .str_field("username")
                .is_some_and(|name| name.eq_ignore_ascii_case(username));
            if matches {
                return Ok(Some(doc.decode()?));
            }
        }
        Ok(None)
    }

    async fn hash_password(&self, password: String) -> Result<String, AuthError> {
        let cost = self.bcrypt_cost;
        let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))??;
        Ok(hash)
    }
}
