//! In-memory user directory indexed by id, email, username and external
//! provider id.
//!
//! Records are owned by the id index; the other indices only point at ids.
//! Email and username lookups are case-insensitive.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::store::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("Email is already registered")]
    DuplicateEmail,
    #[error("Username is already taken")]
    DuplicateUsername,
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("Username must not contain '@'")]
    InvalidUsername,
    #[error("External provider id is missing")]
    InvalidProvider,
    #[error("Account is already linked to another provider")]
    ProviderAlreadyLinked,
    #[error("User not found")]
    UnknownUser,
}

#[derive(Debug)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: Option<String>,
    pub password_hash: Option<SecretString>,
    pub external_provider_id: Option<String>,
    pub profile_image_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub email_verified: bool,
}

impl User {
    #[must_use]
    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.external_provider_id.is_some()
    }
}

impl Clone for User {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            password_hash: self
                .password_hash
                .as_ref()
                .map(|hash| SecretString::from(hash.expose_secret().to_owned())),
            external_provider_id: self.external_provider_id.clone(),
            profile_image_ref: self.profile_image_ref.clone(),
            created_at: self.created_at,
            email_verified: self.email_verified,
        }
    }
}

/// Identity returned by an OAuth provider after the code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalProfile {
    pub provider_id: String,
    pub email: String,
    pub picture: Option<String>,
}

#[derive(Default)]
struct Indexes {
    users: HashMap<Uuid, User>,
    by_email: HashMap<String, Uuid>,
    by_username: HashMap<String, Uuid>,
    by_provider: HashMap<String, Uuid>,
}

pub struct UserDirectory {
    clock: Arc<dyn Clock>,
    indexes: Mutex<Indexes>,
}

/// Normalize an email or username for lookup and uniqueness checks.
pub(crate) fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

impl UserDirectory {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            indexes: Mutex::new(Indexes::default()),
        }
    }

    /// Register a password account.
    ///
    /// # Errors
    /// `InvalidEmail`, `InvalidUsername`, `DuplicateEmail` or `DuplicateUsername`.
    pub fn create(
        &self,
        username: Option<&str>,
        email: &str,
        password_hash: SecretString,
    ) -> Result<User, DirectoryError> {
        let email_key = normalize(email);
        if !valid_email(&email_key) {
            return Err(DirectoryError::InvalidEmail);
        }
        let username = username.map(str::trim).filter(|name| !name.is_empty());
        // Usernames never look like emails; logins try the email index first.
        if username.is_some_and(|name| name.contains('@')) {
            return Err(DirectoryError::InvalidUsername);
        }
        let username_key = username.map(normalize);

        let mut indexes = self.indexes.lock();
        if indexes.by_email.contains_key(&email_key) {
            return Err(DirectoryError::DuplicateEmail);
        }
        if let Some(key) = &username_key {
            if indexes.by_username.contains_key(key) {
                return Err(DirectoryError::DuplicateUsername);
            }
        }

        let user = User {
            id: Uuid::new_v4(),
            email: email.trim().to_string(),
            username: username.map(str::to_string),
            password_hash: Some(password_hash),
            external_provider_id: None,
            profile_image_ref: None,
            created_at: self.clock.now(),
            email_verified: false,
        };

        indexes.by_email.insert(email_key, user.id);
        if let Some(key) = username_key {
            indexes.by_username.insert(key, user.id);
        }
        indexes.users.insert(user.id, user.clone());

        Ok(user)
    }

    #[must_use]
    pub fn find_by_id(&self, id: Uuid) -> Option<User> {
        self.indexes.lock().users.get(&id).cloned()
    }

    #[must_use]
    pub fn find_by_email(&self, email: &str) -> Option<User> {
        let indexes = self.indexes.lock();
        let id = indexes.by_email.get(&normalize(email))?;
        indexes.users.get(id).cloned()
    }

    #[must_use]
    pub fn find_by_username(&self, username: &str) -> Option<User> {
        let indexes = self.indexes.lock();
        let id = indexes.by_username.get(&normalize(username))?;
        indexes.users.get(id).cloned()
    }

    /// Lookup used by password login, where the user may type either.
    #[must_use]
    pub fn find_by_login(&self, email_or_username: &str) -> Option<User> {
        let key = normalize(email_or_username);
        let indexes = self.indexes.lock();
        let id = indexes
            .by_email
            .get(&key)
            .or_else(|| indexes.by_username.get(&key))?;
        indexes.users.get(id).cloned()
    }

    /// Resolve an OAuth login to a user, linking or creating as needed.
    ///
    /// # Errors
    /// `ProviderAlreadyLinked` if the email belongs to an account linked to a
    /// different provider id, `InvalidProvider` for a blank provider id,
    /// `InvalidEmail` when a new account would be created from a malformed email.
    pub fn find_or_link_external(&self, profile: &ExternalProfile) -> Result<User, DirectoryError> {
        let provider_id = profile.provider_id.trim();
        if provider_id.is_empty() {
            return Err(DirectoryError::InvalidProvider);
        }
        let email_key = normalize(&profile.email);

        let mut guard = self.indexes.lock();
        let Indexes {
            users,
            by_email,
            by_provider,
            ..
        } = &mut *guard;

        if let Some(user) = by_provider.get(provider_id).and_then(|id| users.get_mut(id)) {
            if let Some(picture) = &profile.picture {
                if user.profile_image_ref.as_ref() != Some(picture) {
                    user.profile_image_ref = Some(picture.clone());
                }
            }
            return Ok(user.clone());
        }

        if let Some(user) = by_email.get(&email_key).and_then(|id| users.get_mut(id)) {
            if user.is_linked() {
                return Err(DirectoryError::ProviderAlreadyLinked);
            }
            user.external_provider_id = Some(provider_id.to_string());
            if user.profile_image_ref.is_none() {
                user.profile_image_ref.clone_from(&profile.picture);
            }
            by_provider.insert(provider_id.to_string(), user.id);
            info!(user_id = %user.id, "linked external provider to existing account");
            return Ok(user.clone());
        }

        if !valid_email(&email_key) {
            return Err(DirectoryError::InvalidEmail);
        }

        let user = User {
            id: Uuid::new_v4(),
            email: profile.email.trim().to_string(),
            username: None,
            password_hash: None,
            external_provider_id: Some(provider_id.to_string()),
            profile_image_ref: profile.picture.clone(),
            created_at: self.clock.now(),
            email_verified: false,
        };
        by_email.insert(email_key, user.id);
        by_provider.insert(provider_id.to_string(), user.id);
        users.insert(user.id, user.clone());
        info!(user_id = %user.id, "created user from external provider");

        Ok(user)
    }

    /// Replace the password hash, e.g. after a password reset.
    ///
    /// # Errors
    /// `UnknownUser` if `id` is not registered.
    pub fn set_password_hash(&self, id: Uuid, password_hash: SecretString) -> Result<User, DirectoryError> {
        let mut indexes = self.indexes.lock();
        let user = indexes
            .users
            .get_mut(&id)
            .ok_or(DirectoryError::UnknownUser)?;
        user.password_hash = Some(password_hash);
        Ok(user.clone())
    }

    /// # Errors
    /// `UnknownUser` if `id` is not registered.
    pub fn mark_email_verified(&self, id: Uuid) -> Result<User, DirectoryError> {
        let mut indexes = self.indexes.lock();
        let user = indexes
            .users
            .get_mut(&id)
            .ok_or(DirectoryError::UnknownUser)?;
        user.email_verified = true;
        Ok(user.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.indexes.lock().users.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indexes.lock().users.is_empty()
    }
}
