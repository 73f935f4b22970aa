//! User Handlers
//!
//! Registration and lookup of card holders.

use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::domain::{DomainError, OperationContext, User};
use crate::error::AppError;
use crate::repository::{Repository, RepositoryError};
use crate::state::AppState;

use super::CreateUserCommand;

/// Handler for user creation
pub struct CreateUserHandler {
    users: Arc<dyn Repository<User>>,
    audit: AuditLogService,
}

impl CreateUserHandler {
    pub fn new(state: &AppState) -> Self {
        Self {
            users: state.users.clone(),
            audit: state.audit.clone(),
        }
    }

    /// Execute the create user command
    pub async fn execute(
        &self,
        command: CreateUserCommand,
        context: &OperationContext,
    ) -> Result<User, AppError> {
        let user = User::register(
            command.user_id,
            command.username,
            command.email,
            command.display_name,
            context.requested_at,
        )?;

        let user = self.users.create(&user).await.map_err(|e| match e {
            RepositoryError::AlreadyExists { .. } => AppError::InvalidRequest(
                "User with this ID, username, or email already exists".to_string(),
            ),
            other => other.into(),
        })?;

        tracing::info!(user_id = %user.id, username = %user.username, "User created");

        self.audit
            .record(
                AuditLogBuilder::new(AuditAction::UserCreated)
                    .resource("User", user.id)
                    .after_state(&user),
                context,
            )
            .await;

        Ok(user)
    }
}

/// Handler for user lookup
pub struct GetUserHandler {
    users: Arc<dyn Repository<User>>,
}

impl GetUserHandler {
    pub fn new(state: &AppState) -> Self {
        Self {
            users: state.users.clone(),
        }
    }

    pub async fn execute(&self, user_id: Uuid) -> Result<User, AppError> {
        self.users.get(user_id).await.map_err(|e| match e {
            RepositoryError::NotFound { .. } => AppError::from(DomainError::user_not_found(user_id)),
            other => AppError::from(other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_user_command() {
        let cmd = CreateUserCommand::new(
            Uuid::new_v4(),
            "alice".to_string(),
            "alice@example.com".to_string(),
        )
        .with_display_name("Alice Smith".to_string());

        assert_eq!(cmd.username, "alice");
        assert_eq!(cmd.display_name, Some("Alice Smith".to_string()));
    }
}
