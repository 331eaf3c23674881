mod gateway;
mod sqlite_store;
mod time;

pub use gateway::{BatchStatement, Row};
pub use sqlite_store::SqliteStore;
