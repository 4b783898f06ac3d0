//! User service for business logic.

use anyhow::{Context, Result, bail};
use tracing::{info, instrument};

use super::models::{CreateUserRequest, UpdateUserRequest, User};
use super::repository::UserRepository;

/// Service for user management operations.
#[derive(Debug, Clone)]
pub struct UserService {
    repo: UserRepository,
}

impl UserService {
    /// Create a new user service.
    pub fn new(repo: UserRepository) -> Self {
        Self { repo }
    }

    /// Register a new user with validation.
    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn create_user(&self, request: CreateUserRequest) -> Result<User> {
        if !is_valid_username(&request.username) {
            bail!(
                "Invalid username format. Must be 3-50 alphanumeric characters, underscores, or hyphens."
            );
        }

        if !is_valid_email(&request.email) {
            bail!("Invalid email format.");
        }

        if request.password.len() < 6 {
            bail!("Password must be at least 6 characters.");
        }

        if !self.repo.is_username_available(&request.username).await? {
            bail!("Username '{}' is already taken.", request.username);
        }

        if !self.repo.is_email_available(&request.email).await? {
            bail!("Email '{}' is already registered.", request.email);
        }

        let mut processed_request = request;
        processed_request.password = hash_password(&processed_request.password)?;

        let user = self.repo.create(processed_request).await?;
        info!(user_id = %user.id, username = %user.username, "Created new user");

        Ok(user)
    }

    /// Get a user by ID.
    #[instrument(skip(self))]
    pub async fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.repo.get(id).await
    }

    /// Look up a user by username or email, for login.
    pub async fn get_user_by_login(&self, login: &str) -> Result<Option<User>> {
        if let Some(user) = self.repo.get_by_username(login).await? {
            return Ok(Some(user));
        }
        self.repo.get_by_email(login).await
    }

    /// List users, optionally restricted to a set of IDs.
    pub async fn list_users(&self, ids: &[String]) -> Result<Vec<User>> {
        self.repo.list(ids).await
    }

    /// Update a user's profile fields.
    #[instrument(skip(self, request))]
    pub async fn update_user(&self, id: &str, request: UpdateUserRequest) -> Result<User> {
        let mut user = self
            .repo
            .get(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found: {id}"))?;

        if let Some(email) = request.email {
            if !is_valid_email(&email) {
                bail!("Invalid email format.");
            }
            if let Some(existing) = self.repo.get_by_email(&email).await? {
                if existing.id != id {
                    bail!("Email '{}' is already registered.", email);
                }
            }
            user.email = email;
        }
        if let Some(name) = request.name {
            user.name = name;
        }

        self.repo.update(&user).await?;
        Ok(user)
    }

    /// Return the online subset of the given users.
    pub async fn get_online_users(&self, user_ids: &[String]) -> Result<Vec<User>> {
        self.repo.get_online(user_ids).await
    }

    /// Flip the online flag on a user record.
    pub async fn set_online(&self, user_id: &str, online: bool) -> Result<()> {
        let mut user = self
            .repo
            .get(user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found: {user_id}"))?;

        user.is_online = online;
        self.repo.update(&user).await
    }

    /// Hub unregister hook target: mark the user offline.
    #[instrument(skip(self))]
    pub async fn handle_unregister(&self, user_id: &str) -> Result<()> {
        self.set_online(user_id, false).await
    }

    /// Verify a login password against the stored hash.
    pub fn verify_password(&self, user: &User, password: &str) -> Result<bool> {
        bcrypt::verify(password, &user.password_hash).context("Failed to verify password")
    }
}

/// Validate username format: 3-50 chars, alphanumeric plus `_` and `-`.
fn is_valid_username(username: &str) -> bool {
    let len = username.chars().count();
    if !(3..=50).contains(&len) {
        return false;
    }
    username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Minimal email shape check; real validation happens at delivery time.
fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

/// Hash a password using bcrypt.
fn hash_password(password: &str) -> Result<String> {
    let cost = bcrypt::DEFAULT_COST;
    bcrypt::hash(password, cost).context("Failed to hash password")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_usernames() {
        assert!(is_valid_username("alice"));
        assert!(is_valid_username("bob_42"));
        assert!(is_valid_username("kim-jones"));
        assert!(!is_valid_username("ab"));
        assert!(!is_valid_username("has space"));
        assert!(!is_valid_username(&"x".repeat(51)));
    }

    #[test]
    fn test_valid_emails() {
        assert!(is_valid_email("alice@example.com"));
        assert!(!is_valid_email("alice"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("alice@nodot"));
        assert!(!is_valid_email("alice@.com"));
    }

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("hunter22").unwrap();
        assert!(bcrypt::verify("hunter22", &hash).unwrap());
        assert!(!bcrypt::verify("wrong", &hash).unwrap());
    }
}
