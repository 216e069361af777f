//! User lookups and guarded deletion

use std::sync::Arc;

use uuid::Uuid;

use super::{
    availability::{AvailabilityService, BorrowScope},
    side_effects::{Outcome, SideEffects},
};
use crate::{
    error::{AppError, AppResult},
    models::{AuditAction, NewAuditLog, User, UserRole},
    repository::UserStore,
};

#[derive(Clone)]
pub struct UsersService {
    users: Arc<dyn UserStore>,
    availability: AvailabilityService,
    side_effects: SideEffects,
}

impl UsersService {
    pub fn new(
        users: Arc<dyn UserStore>,
        availability: AvailabilityService,
        side_effects: SideEffects,
    ) -> Self {
        Self {
            users,
            availability,
            side_effects,
        }
    }

    pub async fn get_user(&self, id: Uuid) -> AppResult<User> {
        self.users.get_user(id).await
    }

    /// Admins are never deleted; other users only once they hold no borrowed book
    pub async fn delete_user(&self, actor: Uuid, id: Uuid) -> AppResult<Outcome<()>> {
        let user = self.users.get_user(id).await?;

        if user.role == UserRole::Admin {
            return Err(AppError::Conflict("admin users cannot be deleted".to_string()));
        }

        let borrowed = self.availability.count_borrowed(BorrowScope::User(id)).await?;
        if borrowed > 0 {
            return Err(AppError::Conflict(format!(
                "user still has {} borrowed book(s)",
                borrowed
            )));
        }

        self.users.delete_user(id).await?;
        tracing::info!(user_id = %id, "user deleted");

        let mut emission = self.side_effects.batch();
        emission
            .audit(NewAuditLog::new(
                format!("Deleted user {}.", user.display_name()),
                actor,
                AuditAction::Delete,
                &user,
            ))
            .await;

        Ok(emission.finish(()))
    }
}
