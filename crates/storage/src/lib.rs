pub mod repository;
pub mod sqlite;

pub use repository::{
    CategoryRepository, InMemoryStore, LedgerRepository, PoolRepository, ScheduleRepository,
    Storage, StorageError, ToggleOutcome,
};
