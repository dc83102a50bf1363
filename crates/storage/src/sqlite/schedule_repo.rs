use sqlx::Row;

use orfo_core::model::{ReminderTime, UserId};

use super::SqliteRepository;
use super::mapping::{conn, ser};
use crate::repository::{ScheduleRepository, StorageError, ToggleOutcome};

#[async_trait::async_trait]
impl ScheduleRepository for SqliteRepository {
    async fn times(&self, user: &UserId) -> Result<Vec<ReminderTime>, StorageError> {
        let rows = sqlx::query("SELECT at FROM schedule WHERE user_id = ?1 ORDER BY at")
            .bind(user.as_str().to_owned())
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut times = Vec::with_capacity(rows.len());
        for row in rows {
            let at = row.try_get::<String, _>("at").map_err(ser)?;
            times.push(at.parse::<ReminderTime>().map_err(ser)?);
        }
        Ok(times)
    }

    async fn toggle(&self, user: &UserId, at: ReminderTime) -> Result<ToggleOutcome, StorageError> {
        let removed = sqlx::query("DELETE FROM schedule WHERE user_id = ?1 AND at = ?2")
            .bind(user.as_str().to_owned())
            .bind(at.to_string())
            .execute(&self.pool)
            .await
            .map_err(conn)?;

        if removed.rows_affected() > 0 {
            return Ok(ToggleOutcome::Removed);
        }

        sqlx::query("INSERT INTO schedule (user_id, at) VALUES (?1, ?2)")
            .bind(user.as_str().to_owned())
            .bind(at.to_string())
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(ToggleOutcome::Added)
    }

    async fn users_at(&self, at: ReminderTime) -> Result<Vec<UserId>, StorageError> {
        let rows = sqlx::query("SELECT user_id FROM schedule WHERE at = ?1 ORDER BY user_id")
            .bind(at.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut users = Vec::with_capacity(rows.len());
        for row in rows {
            users.push(UserId::new(
                row.try_get::<String, _>("user_id").map_err(ser)?,
            ));
        }
        Ok(users)
    }
}
