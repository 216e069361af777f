//! Users repository: lookups and guarded deletion

use async_trait::async_trait;
use uuid::Uuid;

use super::{Repository, UserStore};
use crate::{
    error::{AppError, AppResult},
    models::User,
};

#[async_trait]
impl UserStore for Repository {
    async fn get_user(&self, id: Uuid) -> AppResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    async fn delete_user(&self, id: Uuid) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))?;

        let borrowed: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM borrowed_books WHERE user_id = $1 AND status = 'borrowed'",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if borrowed > 0 {
            return Err(AppError::Conflict(format!(
                "user still has {} borrowed book(s)",
                borrowed
            )));
        }

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
