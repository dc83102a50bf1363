use orfo_core::model::{Question, UserId};

use super::SqliteRepository;
use super::mapping::{conn, question_from_row};
use crate::repository::{PoolRepository, StorageError};

#[async_trait::async_trait]
impl PoolRepository for SqliteRepository {
    async fn is_contributor(&self, user: &UserId) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT 1 FROM contributors WHERE user_id = ?1")
            .bind(user.as_str().to_owned())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        Ok(row.is_some())
    }

    async fn add_contributor(&self, user: &UserId) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO contributors (user_id) VALUES (?1) ON CONFLICT(user_id) DO NOTHING",
        )
        .bind(user.as_str().to_owned())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn add_to_pool(&self, category: &str, question: &Question) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO pool_questions (category, front, back) VALUES (?1, ?2, ?3)")
            .bind(category.to_owned())
            .bind(question.front().to_owned())
            .bind(question.back().to_owned())
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }

    async fn pool_questions(&self) -> Result<Vec<Question>, StorageError> {
        let rows = sqlx::query("SELECT front, back FROM pool_questions ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut questions = Vec::with_capacity(rows.len());
        for row in rows {
            questions.push(question_from_row(&row)?);
        }
        Ok(questions)
    }
}
