//! SQLite-backed outbox store.
//!
//! One table, `device_data`, keyed by `(deveui, datetime)` with the
//! timestamp kept as the verbatim text assigned at ingestion. WAL mode
//! with synchronous=FULL so a confirmed append survives power loss.

mod sqlite;

pub use sqlite::SqliteOutbox;
