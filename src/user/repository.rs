//! User repository for database operations.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::{debug, instrument};

use super::models::{CreateUserRequest, User};

const USER_COLUMNS: &str =
    "id, username, email, password_hash, name, is_online, created_at, updated_at";

/// Repository for user database operations.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Create a new user repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn generate_id() -> String {
        format!("usr_{}", nanoid::nanoid!(12))
    }

    /// Create a new user. The password in the request must already be hashed.
    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn create(&self, request: CreateUserRequest) -> Result<User> {
        let id = Self::generate_id();
        let name = request.name.unwrap_or_else(|| request.username.clone());

        debug!("Creating user: {} ({})", request.username, id);

        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, name)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&request.username)
        .bind(&request.email)
        .bind(&request.password)
        .bind(&name)
        .execute(&self.pool)
        .await
        .context("Failed to insert user")?;

        self.get(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found after creation"))
    }

    /// Get a user by ID.
    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user")?;

        Ok(user)
    }

    /// Get a user by username.
    #[instrument(skip(self))]
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user by username")?;

        Ok(user)
    }

    /// Get a user by email.
    #[instrument(skip(self))]
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ?"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user by email")?;

        Ok(user)
    }

    /// List users, optionally restricted to a set of IDs.
    #[instrument(skip(self, ids))]
    pub async fn list(&self, ids: &[String]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return sqlx::query_as::<_, User>(&format!(
                "SELECT {USER_COLUMNS} FROM users ORDER BY username"
            ))
            .fetch_all(&self.pool)
            .await
            .context("Failed to list users");
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id IN ({placeholders}) ORDER BY username"
        );

        let mut query = sqlx::query_as::<_, User>(&sql);
        for id in ids {
            query = query.bind(id);
        }

        query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list users by id")
    }

    /// Update mutable user fields.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn update(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET username = ?, email = ?, name = ?, is_online = ?,
                updated_at = datetime('now')
            WHERE id = ?
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.is_online)
        .bind(&user.id)
        .execute(&self.pool)
        .await
        .context("Failed to update user")?;

        Ok(())
    }

    /// Return the online subset of the given users. An empty slice returns
    /// every online user.
    #[instrument(skip(self, user_ids))]
    pub async fn get_online(&self, user_ids: &[String]) -> Result<Vec<User>> {
        if user_ids.is_empty() {
            return sqlx::query_as::<_, User>(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE is_online = 1"
            ))
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch online users");
        }

        let placeholders = vec!["?"; user_ids.len()].join(", ");
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE is_online = 1 AND id IN ({placeholders})"
        );

        let mut query = sqlx::query_as::<_, User>(&sql);
        for id in user_ids {
            query = query.bind(id);
        }

        query
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch online users")
    }

    /// Check if a username is free.
    pub async fn is_username_available(&self, username: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check username availability")?;

        Ok(count == 0)
    }

    /// Check if an email is free.
    pub async fn is_email_available(&self, email: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check email availability")?;

        Ok(count == 0)
    }
}
