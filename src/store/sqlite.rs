/// SQLite-backed document store
///
/// Documents are stored as JSON text keyed by path, with their parent
/// collection indexed for queries. Predicates, ordering and limits are
/// evaluated in-process over the collection rows. Batches run inside one
/// transaction.
use crate::{
    error::ConsoleResult,
    store::{
        batch::stage_writes, ChangeEvent, ChangeHub, DocPath, Document, DocumentStore, Fields,
        Query, WriteBatch,
    },
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use tokio::sync::broadcast;

/// SQLite document store
#[derive(Clone)]
pub struct SqliteStore {
    db: SqlitePool,
    hub: ChangeHub,
    max_batch_ops: usize,
}

impl SqliteStore {
    /// Wrap a pool, creating the document table if needed
    pub async fn new(db: SqlitePool, max_batch_ops: usize) -> ConsoleResult<Self> {
        crate::db::init_schema(&db).await?;
        Ok(Self {
            db,
            hub: ChangeHub::new(),
            max_batch_ops,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    fn row_to_document(row: sqlx::sqlite::SqliteRow) -> ConsoleResult<Document> {
        let path: String = row.try_get("path")?;
        let data: String = row.try_get("data")?;
        let fields: Fields = serde_json::from_str(&data)?;
        Ok(Document::new(DocPath::parse(&path)?, fields))
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, path: &DocPath) -> ConsoleResult<Option<Document>> {
        let row = sqlx::query("SELECT path, data FROM documents WHERE path = ?1")
            .bind(path.as_str())
            .fetch_optional(&self.db)
            .await?;

        row.map(Self::row_to_document).transpose()
    }

    async fn query(&self, query: &Query) -> ConsoleResult<Vec<Document>> {
        let rows = sqlx::query("SELECT path, data FROM documents WHERE collection = ?1")
            .bind(query.collection.as_str())
            .fetch_all(&self.db)
            .await?;

        let docs = rows
            .into_iter()
            .map(Self::row_to_document)
            .collect::<ConsoleResult<Vec<_>>>()?;

        Ok(query.apply(docs))
    }

    async fn commit(&self, batch: WriteBatch) -> ConsoleResult<()> {
        batch.check_limit(self.max_batch_ops)?;
        if batch.is_empty() {
            return Ok(());
        }

        // Take the write lock up front so concurrent writers wait on the
        // busy timeout instead of failing the read-to-write upgrade
        let mut tx = self.db.begin_with("BEGIN IMMEDIATE").await?;

        let mut existing = BTreeMap::new();
        for path in batch.paths() {
            let row = sqlx::query("SELECT data FROM documents WHERE path = ?1")
                .bind(path.as_str())
                .fetch_optional(&mut *tx)
                .await?;
            if let Some(row) = row {
                let data: String = row.try_get("data")?;
                existing.insert(path, serde_json::from_str::<Fields>(&data)?);
            }
        }

        // Precondition failures drop the transaction, rolling it back
        let staged = stage_writes(&batch, existing, Utc::now())?;

        for (path, fields) in &staged.documents {
            match fields {
                Some(fields) => {
                    sqlx::query(
                        r#"
                        INSERT INTO documents (path, collection, data)
                        VALUES (?1, ?2, ?3)
                        ON CONFLICT(path) DO UPDATE SET data = excluded.data
                        "#,
                    )
                    .bind(path.as_str())
                    .bind(path.collection())
                    .bind(serde_json::to_string(fields)?)
                    .execute(&mut *tx)
                    .await?;
                }
                None => {
                    sqlx::query("DELETE FROM documents WHERE path = ?1")
                        .bind(path.as_str())
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        tx.commit().await?;

        self.hub.notify(staged.changed_collections);
        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.hub.subscribe()
    }

    fn max_batch_ops(&self) -> usize {
        self.max_batch_ops
    }
}
