use sqlx::Row;

use orfo_core::model::{MistakeRecord, UserId};

use super::SqliteRepository;
use super::mapping::{conn, mistake_from_row, ser};
use crate::repository::{LedgerRepository, StorageError};

#[async_trait::async_trait]
impl LedgerRepository for SqliteRepository {
    async fn increment(
        &self,
        user: &UserId,
        category: &str,
        pair: &str,
    ) -> Result<u32, StorageError> {
        sqlx::query(
            r"
            INSERT INTO mistakes (user_id, category, pair, count)
            VALUES (?1, ?2, ?3, 1)
            ON CONFLICT(user_id, category, pair) DO UPDATE SET count = count + 1
            ",
        )
        .bind(user.as_str().to_owned())
        .bind(category.to_owned())
        .bind(pair.to_owned())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        let row = sqlx::query(
            "SELECT count FROM mistakes WHERE user_id = ?1 AND category = ?2 AND pair = ?3",
        )
        .bind(user.as_str().to_owned())
        .bind(category.to_owned())
        .bind(pair.to_owned())
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        let count = row.try_get::<i64, _>("count").map_err(ser)?;
        u32::try_from(count).map_err(|_| StorageError::Serialization("count out of range".into()))
    }

    async fn decrement_or_remove(
        &self,
        user: &UserId,
        category: &str,
        pair: &str,
    ) -> Result<u32, StorageError> {
        let updated = sqlx::query(
            r"
            UPDATE mistakes SET count = count - 1
            WHERE user_id = ?1 AND category = ?2 AND pair = ?3 AND count > 1
            ",
        )
        .bind(user.as_str().to_owned())
        .bind(category.to_owned())
        .bind(pair.to_owned())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if updated.rows_affected() == 0 {
            // Either the count was 1 (delete the row) or the entry is absent.
            sqlx::query(
                "DELETE FROM mistakes WHERE user_id = ?1 AND category = ?2 AND pair = ?3",
            )
            .bind(user.as_str().to_owned())
            .bind(category.to_owned())
            .bind(pair.to_owned())
            .execute(&self.pool)
            .await
            .map_err(conn)?;
            return Ok(0);
        }

        let row = sqlx::query(
            "SELECT count FROM mistakes WHERE user_id = ?1 AND category = ?2 AND pair = ?3",
        )
        .bind(user.as_str().to_owned())
        .bind(category.to_owned())
        .bind(pair.to_owned())
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        let count = row.try_get::<i64, _>("count").map_err(ser)?;
        u32::try_from(count).map_err(|_| StorageError::Serialization("count out of range".into()))
    }

    async fn set_count(
        &self,
        user: &UserId,
        category: &str,
        pair: &str,
        count: u32,
    ) -> Result<(), StorageError> {
        let res = if count == 0 {
            sqlx::query(
                "DELETE FROM mistakes WHERE user_id = ?1 AND category = ?2 AND pair = ?3",
            )
            .bind(user.as_str().to_owned())
            .bind(category.to_owned())
            .bind(pair.to_owned())
            .execute(&self.pool)
            .await
            .map_err(conn)?
        } else {
            sqlx::query(
                r"
                UPDATE mistakes SET count = ?4
                WHERE user_id = ?1 AND category = ?2 AND pair = ?3
                ",
            )
            .bind(user.as_str().to_owned())
            .bind(category.to_owned())
            .bind(pair.to_owned())
            .bind(i64::from(count))
            .execute(&self.pool)
            .await
            .map_err(conn)?
        };

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn remove_entry(
        &self,
        user: &UserId,
        category: &str,
        pair: &str,
    ) -> Result<(), StorageError> {
        let res = sqlx::query(
            "DELETE FROM mistakes WHERE user_id = ?1 AND category = ?2 AND pair = ?3",
        )
        .bind(user.as_str().to_owned())
        .bind(category.to_owned())
        .bind(pair.to_owned())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn clear_category(&self, user: &UserId, category: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM mistakes WHERE user_id = ?1 AND category = ?2")
            .bind(user.as_str().to_owned())
            .bind(category.to_owned())
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }

    async fn rename_entry(
        &self,
        user: &UserId,
        category: &str,
        old_pair: &str,
        new_pair: &str,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        // The moved entry wins over anything already stored under the new key.
        sqlx::query("DELETE FROM mistakes WHERE user_id = ?1 AND category = ?2 AND pair = ?3")
            .bind(user.as_str().to_owned())
            .bind(category.to_owned())
            .bind(new_pair.to_owned())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        sqlx::query(
            r"
            UPDATE mistakes SET pair = ?4
            WHERE user_id = ?1 AND category = ?2 AND pair = ?3
            ",
        )
        .bind(user.as_str().to_owned())
        .bind(category.to_owned())
        .bind(old_pair.to_owned())
        .bind(new_pair.to_owned())
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn entries(
        &self,
        user: &UserId,
        category: Option<&str>,
    ) -> Result<Vec<MistakeRecord>, StorageError> {
        let rows = match category {
            Some(category) => {
                sqlx::query(
                    r"
                    SELECT category, pair, count FROM mistakes
                    WHERE user_id = ?1 AND category = ?2
                    ORDER BY count DESC, pair ASC
                    ",
                )
                .bind(user.as_str().to_owned())
                .bind(category.to_owned())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r"
                    SELECT category, pair, count FROM mistakes
                    WHERE user_id = ?1
                    ORDER BY count DESC, pair ASC
                    ",
                )
                .bind(user.as_str().to_owned())
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(conn)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(mistake_from_row(&row)?);
        }
        Ok(records)
    }

    async fn categories_with_mistakes(&self, user: &UserId) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query(
            "SELECT DISTINCT category FROM mistakes WHERE user_id = ?1 ORDER BY category",
        )
        .bind(user.as_str().to_owned())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut names = Vec::with_capacity(rows.len());
        for row in rows {
            names.push(row.try_get::<String, _>("category").map_err(ser)?);
        }
        Ok(names)
    }
}
