//! Authentication module.

use crate::db::{Database, Role, Session, SubscriptionType, User, now_timestamp};
use crate::error::{AppError, FieldErrors, Result};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

const MIN_PASSWORD_LEN: usize = 6;
const MAX_FIELD_LEN: usize = 255;

/// Hash a password using Argon2.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Verify a password against a hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Generate a secure random token.
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
                && !domain.contains('@')
        }
        None => false,
    }
}

/// Registration form.
#[derive(Debug, Clone)]
pub struct Registration<'a> {
    /// Display name.
    pub name: &'a str,
    /// Login email.
    pub email: &'a str,
    /// Password.
    pub password: &'a str,
    /// Password repeated.
    pub password_confirmation: &'a str,
}

/// Authentication service.
pub struct AuthService {
    db: Database,
    session_duration_days: u32,
    registration_enabled: bool,
}

impl AuthService {
    /// Create a new auth service.
    pub fn new(db: Database, session_duration_days: u32, registration_enabled: bool) -> Self {
        Self {
            db,
            session_duration_days,
            registration_enabled,
        }
    }

    /// Register a new member.
    pub fn register(&self, form: &Registration<'_>) -> Result<User> {
        if !self.registration_enabled {
            return Err(AppError::Forbidden("Registration is disabled".to_string()));
        }

        let mut errors = FieldErrors::new();
        if form.password != form.password_confirmation {
            errors.add("password", "The password confirmation does not match.");
        }

        self.create_user_checked(form.name, form.email, form.password, Role::Member, errors)
    }

    /// Create a new user (admin function).
    pub fn create_user(&self, name: &str, email: &str, password: &str, role: &str) -> Result<User> {
        let role = Role::parse(role).ok_or_else(|| {
            AppError::Validation(FieldErrors::single(
                "role",
                "Role must be 'admin' or 'member'",
            ))
        })?;

        self.create_user_checked(name, email, password, role, FieldErrors::new())
    }

    fn create_user_checked(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: Role,
        mut errors: FieldErrors,
    ) -> Result<User> {
        let name = name.trim();
        let email = normalize_email(email);

        if name.is_empty() {
            errors.add("name", "The name field is required.");
        } else if name.chars().count() > MAX_FIELD_LEN {
            errors.add("name", "The name may not be greater than 255 characters.");
        }

        if email.len() > MAX_FIELD_LEN || !is_valid_email(&email) {
            errors.add("email", "The email must be a valid email address.");
        }

        if password.chars().count() < MIN_PASSWORD_LEN {
            errors.add("password", "The password must be at least 6 characters.");
        }

        errors.into_result()?;

        let password_hash = hash_password(password)?;

        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            email,
            password_hash,
            role,
            subscription_type: SubscriptionType::Free,
            subscription_expires_at: None,
            created_at: now_timestamp(),
            last_login: None,
        };

        self.db.create_user(&user)?;
        tracing::info!(user_id = %user.id, role = user.role.as_str(), "Created user");
        Ok(user)
    }

    /// Login and create a session.
    pub fn login(&self, email: &str, password: &str) -> Result<(User, String)> {
        let invalid = || AppError::Unauthenticated("Invalid credentials".to_string());

        let user = self
            .db
            .get_user_by_email(&normalize_email(email))?
            .ok_or_else(invalid)?;

        if !verify_password(password, &user.password_hash)? {
            return Err(invalid());
        }

        // Update last login
        self.db.update_user_last_login(&user.id)?;

        let token = self.issue_session(&user.id)?;
        Ok((user, token))
    }

    fn issue_session(&self, user_id: &str) -> Result<String> {
        let token = generate_token();
        let expires_at = now_timestamp() + (self.session_duration_days as i64 * 24 * 60 * 60);

        let session = Session {
            token: token.clone(),
            user_id: user_id.to_string(),
            expires_at,
        };

        self.db.create_session(&session)?;
        Ok(token)
    }

    /// Validate a session token and return the user.
    pub fn validate_token(&self, token: &str) -> Result<Option<User>> {
        let session = match self.db.get_session(token)? {
            Some(s) => s,
            None => return Ok(None),
        };

        // Check expiration
        if session.expires_at < now_timestamp() {
            self.db.delete_session(token)?;
            return Ok(None);
        }

        self.db.get_user_by_id(&session.user_id)
    }

    /// Replace a valid session with a fresh one.
    pub fn refresh(&self, token: &str) -> Result<(User, String)> {
        let user = self
            .validate_token(token)?
            .ok_or_else(|| AppError::Unauthenticated("Invalid or expired token".to_string()))?;

        self.db.delete_session(token)?;
        let token = self.issue_session(&user.id)?;
        Ok((user, token))
    }

    /// Logout (delete session).
    pub fn logout(&self, token: &str) -> Result<()> {
        self.db.delete_session(token)
    }

    /// Change user password.
    pub fn change_password(&self, email: &str, new_password: &str) -> Result<bool> {
        if new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(FieldErrors::single(
                "password",
                "The password must be at least 6 characters.",
            )));
        }

        let password_hash = hash_password(new_password)?;
        self.db
            .update_user_password(&normalize_email(email), &password_hash)
    }

    /// Change user role.
    pub fn set_role(&self, email: &str, role: &str) -> Result<bool> {
        let role = Role::parse(role).ok_or_else(|| {
            AppError::Validation(FieldErrors::single(
                "role",
                "Role must be 'admin' or 'member'",
            ))
        })?;
        self.db.update_user_role(&normalize_email(email), role)
    }

    /// Delete a user.
    pub fn delete_user(&self, email: &str) -> Result<bool> {
        self.db.delete_user(&normalize_email(email))
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        self.db.list_users()
    }
}
