//! Non-blocking SQLite store on an `sqlx` pool.

use std::str::FromStr;

use sqlx::{
    Row,
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
};

use crate::{
    distributor::{
        AsyncSegmentStore, SegmentDefinition,
        sql::{
            CREATE_TABLE_SQL, FETCH_DEFINITION_SQL, FETCH_MAX_ID_SQL, INCREMENT_MAX_ID_SQL,
            INSERT_SEGMENT_SQL,
        },
    },
    error::{Error, Result},
    time::current_secs,
};

/// An [`AsyncSegmentStore`] over an `sqlx` SQLite pool.
#[derive(Debug, Clone)]
pub struct SqlxSegmentStore {
    pool: SqlitePool,
}

impl SqlxSegmentStore {
    /// Connects to `url` (e.g. `sqlite://segments.db`), creating the file if
    /// needed, and ensures the schema.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// An in-memory database (for testing).
    ///
    /// Limited to one connection: every in-memory connection would otherwise
    /// see its own empty database.
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(CREATE_TABLE_SQL).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl AsyncSegmentStore for SqlxSegmentStore {
    async fn increment_max_id_async(&self, namespace: &str, step: i64) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let affected = sqlx::query(INCREMENT_MAX_ID_SQL)
            .bind(step)
            .bind(current_secs())
            .bind(namespace)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(Error::SegmentNameMissing {
                namespace: namespace.into(),
            });
        }

        let row = sqlx::query(FETCH_MAX_ID_SQL)
            .bind(namespace)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Err(Error::SegmentNameMissing {
                namespace: namespace.into(),
            });
        };
        let max_id: i64 = row.try_get(0)?;

        tx.commit().await?;
        Ok(max_id)
    }

    async fn definition_async(&self, namespace: &str) -> Result<SegmentDefinition> {
        let row = sqlx::query(FETCH_DEFINITION_SQL)
            .bind(namespace)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::SegmentNameMissing {
                namespace: namespace.into(),
            })?;
        let safe_distance: i64 = row.try_get(3)?;
        Ok(SegmentDefinition {
            namespace: row.try_get(0)?,
            max_id: row.try_get(1)?,
            step: row.try_get(2)?,
            safe_distance: u32::try_from(safe_distance).map_err(Error::segment)?,
        })
    }

    async fn add_segment_async(&self, definition: &SegmentDefinition) -> Result<()> {
        definition.validate()?;
        let inserted = sqlx::query(INSERT_SEGMENT_SQL)
            .bind(definition.namespace.as_str())
            .bind(definition.max_id)
            .bind(definition.step)
            .bind(i64::from(definition.safe_distance))
            .bind(current_secs())
            .execute(&self.pool)
            .await;
        match inserted {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(Error::IllegalArgument(format!(
                    "namespace:[{}] already exists",
                    definition.namespace
                )))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AsyncSegmentDistributor, AsyncStoreSegmentDistributor, IdSegment};

    async fn store_with(namespace: &str, step: i64) -> SqlxSegmentStore {
        let store = SqlxSegmentStore::new_in_memory().await.unwrap();
        store
            .add_segment_async(&SegmentDefinition::new(namespace, 0, step, 10))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn increments_and_reads_back() {
        let store = store_with("order", 100).await;
        assert_eq!(store.increment_max_id_async("order", 100).await.unwrap(), 100);
        assert_eq!(store.increment_max_id_async("order", 100).await.unwrap(), 200);
        assert_eq!(store.definition_async("order").await.unwrap().max_id, 200);
    }

    #[tokio::test]
    async fn missing_namespace_is_reported() {
        let store = SqlxSegmentStore::new_in_memory().await.unwrap();
        let err = store.increment_max_id_async("nope", 100).await.unwrap_err();
        assert!(matches!(err, Error::SegmentNameMissing { .. }));
    }

    #[tokio::test]
    async fn duplicate_namespace_is_rejected() {
        let store = store_with("order", 100).await;
        let err = store
            .add_segment_async(&SegmentDefinition::new("order", 0, 100, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IllegalArgument(_)));
    }

    #[tokio::test]
    async fn distributor_builds_segments() {
        let store = store_with("order", 100).await;
        let distributor = AsyncStoreSegmentDistributor::new("order", 100, store).unwrap();

        let first = distributor.next_id_segment_async(60).await.unwrap();
        assert_eq!(first.max_id(), 100);
        assert_eq!(first.sequence(), 1);

        let merged = distributor.next_merged_segment_async(3, 60).await.unwrap();
        assert_eq!(merged.max_id(), 400);
        assert_eq!(merged.single_step(), 100);
        assert_eq!(merged.offset(), 100);
    }
}
