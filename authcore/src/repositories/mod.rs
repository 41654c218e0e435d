//! User storage
//!
//! The auth core only talks to users through [`UserStore`]. Uniqueness of
//! email, username and phone number is the store's job: `insert` is
//! attempted optimistically and a collision comes back as
//! [`StoreError::Duplicate`], never as a separate existence check.

pub mod memory;
pub mod user;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use memory::InMemoryUserStore;
pub use user::PgUserStore;

/// User record as held by the store
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub username: Option<String>,
    pub phone_number: Option<String>,
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: Option<String>,
    pub phone_number: Option<String>,
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub is_verified: bool,
}

/// Store failures
#[derive(Error, Debug)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write
    #[error("Duplicate {field}")]
    Duplicate { field: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// User store collaborator
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, StoreError>;

    /// Insert a user, failing with `StoreError::Duplicate` on a collision
    async fn insert(&self, user: NewUser) -> Result<UserRecord, StoreError>;

    /// Persist the mutable fields of an existing user
    async fn update(&self, user: &UserRecord) -> Result<(), StoreError>;

    /// Mark a user verified and active
    ///
    /// Returns `true` only for the call that performed the transition;
    /// any later or concurrent call sees `false`.
    async fn activate(&self, id: i64) -> Result<bool, StoreError>;
}
