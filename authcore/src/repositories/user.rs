//! PostgreSQL user store

use super::{NewUser, StoreError, UserRecord, UserStore};
use async_trait::async_trait;
use sqlx::PgPool;

/// SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

const USER_COLUMNS: &str = "id, email, username, phone_number, password_hash, role, \
     is_active, is_verified, verified_at, last_login_at, created_at, updated_at";

/// User store backed by the `users` table
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Map a unique violation to the column it protects
///
/// Constraint names follow Postgres' default `users_<column>_key`.
fn duplicate_field(err: &sqlx::Error) -> Option<String> {
    let db_err = err.as_database_error()?;
    if db_err.code().as_deref() != Some(UNIQUE_VIOLATION) {
        return None;
    }

    let constraint = db_err.constraint().unwrap_or_default();
    let field = ["email", "username", "phone_number"]
        .into_iter()
        .find(|field| constraint.contains(field))
        .unwrap_or("account");
    Some(field.to_string())
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, StoreError> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn insert(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let result = sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            INSERT INTO users (email, username, phone_number, password_hash, role, is_active, is_verified)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.phone_number)
        .bind(&user.password_hash)
        .bind(&user.role)
        .bind(user.is_active)
        .bind(user.is_verified)
        .fetch_one(&self.pool)
        .await;

        result.map_err(|err| match duplicate_field(&err) {
            Some(field) => StoreError::Duplicate { field },
            None => StoreError::Database(err),
        })
    }

    async fn update(&self, user: &UserRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                email = $2,
                username = $3,
                phone_number = $4,
                password_hash = $5,
                role = $6,
                is_active = $7,
                is_verified = $8,
                verified_at = $9,
                last_login_at = $10,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.phone_number)
        .bind(&user.password_hash)
        .bind(&user.role)
        .bind(user.is_active)
        .bind(user.is_verified)
        .bind(user.verified_at)
        .bind(user.last_login_at)
        .execute(&self.pool)
        .await;

        result.map(|_| ()).map_err(|err| match duplicate_field(&err) {
            Some(field) => StoreError::Duplicate { field },
            None => StoreError::Database(err),
        })
    }

    async fn activate(&self, id: i64) -> Result<bool, StoreError> {
        // The WHERE clause makes concurrent activations race-free
        let result = sqlx::query(
            r#"
            UPDATE users SET
                is_verified = TRUE,
                is_active = TRUE,
                verified_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND NOT is_verified
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

