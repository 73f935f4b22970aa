//! Card holders

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::DomainError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn register(
        id: Uuid,
        username: String,
        email: String,
        display_name: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let username = username.trim().to_string();
        if username.is_empty() || username.len() > 64 {
            return Err(DomainError::Validation(
                "username must be between 1 and 64 characters".to_string(),
            ));
        }
        if !is_plausible_email(&email) {
            return Err(DomainError::Validation(format!("invalid email '{}'", email)));
        }

        Ok(Self {
            id,
            username,
            email: email.trim().to_lowercase(),
            display_name,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Inactive users are treated as absent by card operations
    pub fn ensure_active(&self) -> Result<(), DomainError> {
        if !self.is_active {
            return Err(DomainError::user_not_found(self.id));
        }
        Ok(())
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.trim().split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_normalizes_fields() {
        let user = User::register(
            Uuid::new_v4(),
            "  alice ".to_string(),
            "Alice@Example.com".to_string(),
            None,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(user.username, "alice");
        assert_eq!(user.email, "alice@example.com");
        assert!(user.is_active);
    }

    #[test]
    fn test_register_rejects_bad_email() {
        let result = User::register(
            Uuid::new_v4(),
            "bob".to_string(),
            "bob-at-example".to_string(),
            None,
            Utc::now(),
        );
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_inactive_user_is_not_found() {
        let mut user = User::register(
            Uuid::new_v4(),
            "carol".to_string(),
            "carol@example.com".to_string(),
            None,
            Utc::now(),
        )
        .unwrap();
        user.is_active = false;

        assert!(user.ensure_active().unwrap_err().is_not_found());
    }
}
