//! Password accounts and sessions, both stored as documents.

pub mod accounts;
pub mod handlers;
pub mod session;

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::docstore::{DocumentStore, StoreError};

pub use accounts::{Account, PublicAccount, Registration};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("{0}")]
    InvalidInput(String),

    #[error("Username is already taken")]
    UsernameTaken,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Password hashing error: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn DocumentStore>,
    session_hours: u64,
    bcrypt_cost: u32,
    // Serialises the check-then-insert of registrations.
    registration: Arc<Mutex<()>>,
}

impl AuthService {
    pub fn new(store: Arc<dyn DocumentStore>, session_hours: u64, bcrypt_cost: u32) -> Self {
        Self {
            store,
            session_hours,
            bcrypt_cost,
            registration: Arc::new(Mutex::new(())),
        }
    }

    pub fn session_hours(&self) -> u64 {
        self.session_hours
    }
}
