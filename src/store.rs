use async_trait::async_trait;
use serde::{ Deserialize, Serialize };
use serde_json::Value;
use surrealdb::engine::local::{ Db, RocksDb };
use surrealdb::opt::RecordId;
use surrealdb::Surreal;
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::models::{ EmbeddingVector, StoredRecord };

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create-or-replace the embedding of `id`. Without an id the store
    /// assigns one. Returns the id that was written.
    async fn upsert(
        &self,
        id: Option<&str>,
        embedding: &EmbeddingVector
    ) -> Result<String, StoreError>;

    /// Every record, unfiltered, with the embedding column left raw.
    async fn fetch_all(&self) -> Result<Vec<StoredRecord>, StoreError>;
}

#[derive(Debug, Serialize)]
struct EmbeddingPatch {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct WrittenRecord {
    id: RecordId,
}

#[derive(Debug, Deserialize)]
struct CorpusRow {
    id: RecordId,
    content: Option<Value>,
    embedding: Option<Value>,
}

impl From<CorpusRow> for StoredRecord {
    fn from(row: CorpusRow) -> Self {
        StoredRecord {
            id: row.id.id.to_raw(),
            content: match row.content {
                Some(Value::String(text)) => Some(text),
                _ => None,
            },
            embedding: row.embedding.filter(|value| !value.is_null()),
        }
    }
}

pub struct SurrealStore {
    db: Surreal<Db>,
    table: String,
}

impl SurrealStore {
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&config.path)?;
        let path = config.path.to_string_lossy();

        let db = Surreal::new::<RocksDb>(&*path).await?;
        db.use_ns(config.namespace.as_str()).use_db(config.database.as_str()).await?;

        debug!(path = %path, table = %config.table, "Connected to record store");
        Ok(Self {
            db,
            table: config.table.clone(),
        })
    }

    /// Writes a record verbatim, bypassing validation. Lets tests plant the
    /// kind of malformed rows other writers leave behind.
    #[cfg(test)]
    pub async fn put_raw(
        &self,
        id: &str,
        content: Option<&str>,
        embedding: Value
    ) -> Result<(), StoreError> {
        self.db
            .query("CREATE type::thing($table, $id) SET content = $content, embedding = $embedding")
            .bind(("table", self.table.clone()))
            .bind(("id", id.to_string()))
            .bind(("content", content.map(str::to_string)))
            .bind(("embedding", embedding)).await?
            .check()?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SurrealStore {
    async fn upsert(
        &self,
        id: Option<&str>,
        embedding: &EmbeddingVector
    ) -> Result<String, StoreError> {
        let patch = EmbeddingPatch {
            embedding: embedding.as_slice().to_vec(),
        };

        // MERGE leaves other columns (content) untouched.
        let written: Option<WrittenRecord> = match id {
            Some(id) => self.db.update((self.table.as_str(), id)).merge(patch).await?,
            None => self.db.create(self.table.as_str()).content(patch).await?.into_iter().next(),
        };

        let written = written.ok_or_else(||
            StoreError::MissingRecord(id.unwrap_or("<new>").to_string())
        )?;
        Ok(written.id.id.to_raw())
    }

    async fn fetch_all(&self) -> Result<Vec<StoredRecord>, StoreError> {
        let rows: Vec<CorpusRow> = self.db
            .query("SELECT id, content, embedding FROM type::table($table)")
            .bind(("table", self.table.clone())).await?
            .take(0)?;

        Ok(rows.into_iter().map(StoredRecord::from).collect())
    }
}
