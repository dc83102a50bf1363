use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use orfo_core::model::{MistakeRecord, Question};

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn question_from_row(row: &SqliteRow) -> Result<Question, StorageError> {
    let front = row.try_get::<String, _>("front").map_err(ser)?;
    let back = row.try_get::<String, _>("back").map_err(ser)?;
    Question::new(front, back).map_err(ser)
}

pub(crate) fn mistake_from_row(row: &SqliteRow) -> Result<MistakeRecord, StorageError> {
    let count = row.try_get::<i64, _>("count").map_err(ser)?;
    Ok(MistakeRecord {
        category: row.try_get::<String, _>("category").map_err(ser)?,
        pair: row.try_get::<String, _>("pair").map_err(ser)?,
        count: u32::try_from(count)
            .map_err(|_| StorageError::Serialization("count out of range".into()))?,
    })
}
