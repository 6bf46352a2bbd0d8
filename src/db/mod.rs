//! Identity store: the durable, append-only table of detected faces.
//!
//! Rows are never updated or deleted. Each upload's faces are committed in a
//! single transaction, so a failed write never leaves a partial upload visible.

mod schema;
pub mod faces;

use rusqlite::Connection;
use std::path::Path;

use crate::error::PersistenceError;

pub use faces::{FaceRecord, NewFace};
pub use schema::{MIGRATIONS, SCHEMA};

pub struct Database {
    pub(crate) conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    pub fn initialize(&self) -> Result<(), PersistenceError> {
        self.conn.execute_batch(SCHEMA)?;
        self.run_migrations();
        Ok(())
    }

    fn run_migrations(&self) {
        for migration in MIGRATIONS {
            if let Err(e) = self.conn.execute(migration, []) {
                tracing::debug!(error = %e, "Skipping migration");
            }
        }
    }
}
