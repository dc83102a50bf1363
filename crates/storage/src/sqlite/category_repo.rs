use sqlx::Row;

use orfo_core::model::{Category, Question, UserId};

use super::SqliteRepository;
use super::mapping::{conn, question_from_row, ser};
use crate::repository::{CategoryRepository, StorageError};

impl SqliteRepository {
    async fn category_id(
        &self,
        user: &UserId,
        name: &str,
    ) -> Result<Option<i64>, StorageError> {
        let row = sqlx::query("SELECT id FROM categories WHERE user_id = ?1 AND name = ?2")
            .bind(user.as_str().to_owned())
            .bind(name.to_owned())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        match row {
            Some(row) => Ok(Some(row.try_get::<i64, _>("id").map_err(ser)?)),
            None => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl CategoryRepository for SqliteRepository {
    async fn category_names(&self, user: &UserId) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query("SELECT name FROM categories WHERE user_id = ?1 ORDER BY name")
            .bind(user.as_str().to_owned())
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut names = Vec::with_capacity(rows.len());
        for row in rows {
            names.push(row.try_get::<String, _>("name").map_err(ser)?);
        }
        Ok(names)
    }

    async fn get_category(
        &self,
        user: &UserId,
        name: &str,
    ) -> Result<Option<Category>, StorageError> {
        let Some(id) = self.category_id(user, name).await? else {
            return Ok(None);
        };

        let rows = sqlx::query(
            r"
            SELECT front, back FROM questions
            WHERE category_id = ?1
            ORDER BY id ASC
            ",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut questions = Vec::with_capacity(rows.len());
        for row in rows {
            questions.push(question_from_row(&row)?);
        }
        Category::new(name, questions).map(Some).map_err(ser)
    }

    async fn create_category(&self, user: &UserId, name: &str) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO categories (user_id, name) VALUES (?1, ?2)")
            .bind(user.as_str().to_owned())
            .bind(name.to_owned())
            .execute(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
                _ => StorageError::Connection(e.to_string()),
            })?;
        Ok(())
    }

    async fn add_question(
        &self,
        user: &UserId,
        category: &str,
        question: &Question,
    ) -> Result<(), StorageError> {
        let id = self
            .category_id(user, category)
            .await?
            .ok_or(StorageError::NotFound)?;

        sqlx::query("INSERT INTO questions (category_id, front, back) VALUES (?1, ?2, ?3)")
            .bind(id)
            .bind(question.front().to_owned())
            .bind(question.back().to_owned())
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }

    async fn replace_question(
        &self,
        user: &UserId,
        category: &str,
        old_pair: &str,
        question: &Question,
    ) -> Result<(), StorageError> {
        let id = self
            .category_id(user, category)
            .await?
            .ok_or(StorageError::NotFound)?;

        // Only the first match: duplicates are legal and edited one at a time.
        let res = sqlx::query(
            r"
            UPDATE questions SET front = ?1, back = ?2
            WHERE id = (
                SELECT MIN(id) FROM questions
                WHERE category_id = ?3 AND (front || '←' || back) = ?4
            )
            ",
        )
        .bind(question.front().to_owned())
        .bind(question.back().to_owned())
        .bind(id)
        .bind(old_pair.to_owned())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn remove_question(
        &self,
        user: &UserId,
        category: &str,
        pair: &str,
    ) -> Result<(), StorageError> {
        let id = self
            .category_id(user, category)
            .await?
            .ok_or(StorageError::NotFound)?;

        let res = sqlx::query(
            r"
            DELETE FROM questions
            WHERE id = (
                SELECT MIN(id) FROM questions
                WHERE category_id = ?1 AND (front || '←' || back) = ?2
            )
            ",
        )
        .bind(id)
        .bind(pair.to_owned())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn question_count(&self, user: &UserId, category: &str) -> Result<u32, StorageError> {
        let Some(id) = self.category_id(user, category).await? else {
            return Ok(0);
        };

        let row = sqlx::query("SELECT COUNT(*) AS n FROM questions WHERE category_id = ?1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(conn)?;
        let n = row.try_get::<i64, _>("n").map_err(ser)?;
        u32::try_from(n).map_err(|_| StorageError::Serialization("count out of range".into()))
    }

    async fn delete_category(&self, user: &UserId, name: &str) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM categories WHERE user_id = ?1 AND name = ?2")
            .bind(user.as_str().to_owned())
            .bind(name.to_owned())
            .execute(&self.pool)
            .await
            .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
