//! In-memory user store
//!
//! Used by tests and the development CLI. Uniqueness checks and the write
//! happen under one lock, so there is no check-then-insert window.

use super::{NewUser, StoreError, UserRecord, UserStore};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    next_id: i64,
    users: HashMap<i64, UserRecord>,
}

impl Inner {
    /// Field of `candidate` that collides with a user other than `skip_id`
    fn collision(&self, candidate: &UserRecord, skip_id: Option<i64>) -> Option<&'static str> {
        self.users
            .values()
            .filter(|existing| Some(existing.id) != skip_id)
            .find_map(|existing| {
                if existing.email == candidate.email {
                    Some("email")
                } else if candidate.username.is_some() && existing.username == candidate.username {
                    Some("username")
                } else if candidate.phone_number.is_some()
                    && existing.phone_number == candidate.phone_number
                {
                    Some("phone_number")
                } else {
                    None
                }
            })
    }
}

/// User store held in process memory
#[derive(Default)]
pub struct InMemoryUserStore {
    inner: RwLock<Inner>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users
    pub async fn len(&self) -> usize {
        self.inner.read().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn insert(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();

        let record = UserRecord {
            id: inner.next_id + 1,
            email: user.email,
            username: user.username,
            phone_number: user.phone_number,
            password_hash: user.password_hash,
            role: user.role,
            is_active: user.is_active,
            is_verified: user.is_verified,
            verified_at: user.is_verified.then_some(now),
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };

        if let Some(field) = inner.collision(&record, None) {
            return Err(StoreError::Duplicate {
                field: field.to_string(),
            });
        }

        inner.next_id = record.id;
        inner.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(&self, user: &UserRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;

        if let Some(field) = inner.collision(user, Some(user.id)) {
            return Err(StoreError::Duplicate {
                field: field.to_string(),
            });
        }

        // Updating a user that does not exist is a no-op, like SQL UPDATE
        if let Some(existing) = inner.users.get_mut(&user.id) {
            *existing = UserRecord {
                updated_at: Utc::now(),
                ..user.clone()
            };
        }
        Ok(())
    }

    async fn activate(&self, id: i64) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.users.get_mut(&id) {
            Some(user) if !user.is_verified => {
                let now = Utc::now();
                user.is_verified = true;
                user.is_active = true;
                user.verified_at = Some(now);
                user.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            username: None,
            phone_number: None,
            password_hash: "$argon2id$placeholder".to_string(),
            role: "customer".to_string(),
            is_active: false,
            is_verified: false,
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = InMemoryUserStore::new();
        let user = store.insert(new_user("a@x.com")).await.unwrap();

        assert_eq!(user.id, 1);
        assert_eq!(
            store.find_by_email("a@x.com").await.unwrap().unwrap().id,
            user.id
        );
        assert_eq!(store.find_by_id(user.id).await.unwrap().unwrap().email, "a@x.com");
        assert!(store.find_by_id(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = InMemoryUserStore::new();
        store.insert(new_user("a@x.com")).await.unwrap();

        let err = store.insert(new_user("a@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { ref field } if field == "email"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let store = InMemoryUserStore::new();
        let mut first = new_user("a@x.com");
        first.username = Some("jane".to_string());
        store.insert(first).await.unwrap();

        let mut second = new_user("b@x.com");
        second.username = Some("jane".to_string());
        let err = store.insert(second).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { ref field } if field == "username"));
    }

    #[tokio::test]
    async fn test_missing_usernames_do_not_collide() {
        let store = InMemoryUserStore::new();
        store.insert(new_user("a@x.com")).await.unwrap();
        store.insert(new_user("b@x.com")).await.unwrap();
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_same_email() {
        let store = Arc::new(InMemoryUserStore::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.insert(new_user("race@x.com")).await })
            })
            .collect();

        let mut created = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(StoreError::Duplicate { .. }) => duplicates += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(created, 1);
        assert_eq!(duplicates, 7);
    }

    #[tokio::test]
    async fn test_activate_exactly_once() {
        let store = InMemoryUserStore::new();
        let user = store.insert(new_user("a@x.com")).await.unwrap();

        assert!(store.activate(user.id).await.unwrap());
        assert!(!store.activate(user.id).await.unwrap());

        let user = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(user.is_verified);
        assert!(user.is_active);
        assert!(user.verified_at.is_some());
    }

    #[tokio::test]
    async fn test_activate_unknown_user() {
        let store = InMemoryUserStore::new();
        assert!(!store.activate(42).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_persists_fields() {
        let store = InMemoryUserStore::new();
        let mut user = store.insert(new_user("a@x.com")).await.unwrap();

        user.role = "admin".to_string();
        user.last_login_at = Some(Utc::now());
        store.update(&user).await.unwrap();

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.role, "admin");
        assert!(stored.last_login_at.is_some());
    }

    #[tokio::test]
    async fn test_update_cannot_steal_email() {
        let store = InMemoryUserStore::new();
        store.insert(new_user("a@x.com")).await.unwrap();
        let mut second = store.insert(new_user("b@x.com")).await.unwrap();

        second.email = "a@x.com".to_string();
        let err = store.update(&second).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }
}
