//! Blocking SQLite store.
//!
//! Every increment runs inside one `IMMEDIATE` transaction: the update takes
//! the write lock, so the read-back that follows sees exactly the value this
//! caller produced even when several processes share the database file.

use std::path::Path;

use rusqlite::{Connection, ErrorCode, OptionalExtension, TransactionBehavior, params};

use crate::{
    distributor::{
        SegmentDefinition, SegmentStore,
        sql::{
            CREATE_TABLE_SQL, FETCH_DEFINITION_SQL, FETCH_MAX_ID_SQL, INCREMENT_MAX_ID_SQL,
            INSERT_SEGMENT_SQL,
        },
    },
    error::{Error, Result},
    mutex::{Mutex, lock},
    time::current_secs,
};

/// A [`SegmentStore`] over a single `rusqlite` connection.
pub struct SqliteSegmentStore {
    conn: Mutex<Connection>,
}

impl SqliteSegmentStore {
    /// Opens (or creates) the database file at `path` and ensures the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// An in-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(CREATE_TABLE_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl SegmentStore for SqliteSegmentStore {
    fn increment_max_id(&self, namespace: &str, step: i64) -> Result<i64> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let affected = tx.execute(INCREMENT_MAX_ID_SQL, params![step, current_secs(), namespace])?;
        if affected == 0 {
            return Err(Error::SegmentNameMissing {
                namespace: namespace.into(),
            });
        }

        let max_id: Option<i64> = tx
            .query_row(FETCH_MAX_ID_SQL, params![namespace], |row| row.get(0))
            .optional()?;
        let Some(max_id) = max_id else {
            return Err(Error::SegmentNameMissing {
                namespace: namespace.into(),
            });
        };

        tx.commit()?;
        Ok(max_id)
    }

    fn definition(&self, namespace: &str) -> Result<SegmentDefinition> {
        let conn = lock(&self.conn)?;
        conn.query_row(FETCH_DEFINITION_SQL, params![namespace], |row| {
            Ok(SegmentDefinition {
                namespace: row.get(0)?,
                max_id: row.get(1)?,
                step: row.get(2)?,
                safe_distance: row.get(3)?,
            })
        })
        .optional()?
        .ok_or_else(|| Error::SegmentNameMissing {
            namespace: namespace.into(),
        })
    }

    fn add_segment(&self, definition: &SegmentDefinition) -> Result<()> {
        definition.validate()?;
        let conn = lock(&self.conn)?;
        let inserted = conn.execute(
            INSERT_SEGMENT_SQL,
            params![
                definition.namespace,
                definition.max_id,
                definition.step,
                definition.safe_distance,
                current_secs()
            ],
        );
        match inserted {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(Error::IllegalArgument(format!(
                    "namespace:[{}] already exists",
                    definition.namespace
                )))
            }
            Err(e) => Err(e.into()),
        }
    }
}
