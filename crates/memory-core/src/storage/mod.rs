//! Persistent store (C4) and its supporting pieces: schema migrations
//! and a bounded reader pool (C5).

pub mod migrations;
pub mod pool;
pub mod sqlite;

pub use pool::{PooledConnection, ReaderPool};
pub use sqlite::Store;
