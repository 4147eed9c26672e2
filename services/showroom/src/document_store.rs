use crate::config::DatabaseConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors raised by the document store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("collection not configured: {0}")]
    Unconfigured(&'static str),

    #[error("document {collection}/{id} already exists")]
    AlreadyExists { collection: String, id: String },

    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("malformed document: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A stored document
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Document {
    /// Document id, unique within its collection
    pub id: String,
    /// Document body
    pub data: serde_json::Value,
    /// When the document was created
    pub created_at: DateTime<Utc>,
    /// When the document was last written
    pub updated_at: DateTime<Utc>,
}

/// Key-value document API over named collections.
///
/// Each individual write is atomic. Nothing spans documents, so callers
/// that touch several documents must order their writes themselves.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// List every document in a collection, in insertion order
    async fn list_documents(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    async fn get_document(&self, collection: &str, id: &str)
        -> Result<Option<Document>, StoreError>;

    /// Create a document, failing with `AlreadyExists` if the id is taken
    async fn create_document(
        &self,
        collection: &str,
        id: &str,
        data: &serde_json::Value,
    ) -> Result<Document, StoreError>;

    /// Replace the body of an existing document
    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        data: &serde_json::Value,
    ) -> Result<Document, StoreError>;

    /// Delete a document. Returns whether it existed.
    async fn delete_document(&self, collection: &str, id: &str) -> Result<bool, StoreError>;

    /// Check backend connectivity
    async fn ping(&self) -> Result<(), StoreError>;
}

/// PostgreSQL-backed document store
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    /// Create a new document store with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .connect(&config.url)
            .await?;

        info!("Connected to PostgreSQL document store");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    #[instrument(skip(self))]
    async fn list_documents(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let documents = sqlx::query_as::<_, Document>(
            r#"
            SELECT id, data, created_at, updated_at
            FROM documents
            WHERE collection = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        Ok(documents)
    }

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        let document = sqlx::query_as::<_, Document>(
            r#"
            SELECT id, data, created_at, updated_at
            FROM documents
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(document)
    }

    #[instrument(skip(self, data))]
    async fn create_document(
        &self,
        collection: &str,
        id: &str,
        data: &serde_json::Value,
    ) -> Result<Document, StoreError> {
        let document = sqlx::query_as::<_, Document>(
            r#"
            INSERT INTO documents (collection, id, data, created_at, updated_at)
            VALUES ($1, $2, $3, NOW(), NOW())
            ON CONFLICT (collection, id) DO NOTHING
            RETURNING id, data, created_at, updated_at
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(data)
        .fetch_optional(&self.pool)
        .await?;

        let document = document.ok_or_else(|| StoreError::AlreadyExists {
            collection: collection.to_string(),
            id: id.to_string(),
        })?;

        debug!("Document created");
        Ok(document)
    }

    #[instrument(skip(self, data))]
    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        data: &serde_json::Value,
    ) -> Result<Document, StoreError> {
        let document = sqlx::query_as::<_, Document>(
            r#"
            UPDATE documents
            SET data = $3, updated_at = NOW()
            WHERE collection = $1 AND id = $2
            RETURNING id, data, created_at, updated_at
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(data)
        .fetch_optional(&self.pool)
        .await?;

        let document = document.ok_or_else(|| StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })?;

        debug!("Document updated");
        Ok(document)
    }

    #[instrument(skip(self))]
    async fn delete_document(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM documents
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection)
        .bind(id)
        .execute(&self.pool)
        .await?;

        let existed = result.rows_affected() > 0;
        debug!(existed, "Document deleted");
        Ok(existed)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// In-process document store, used by tests and local tooling
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<HashMap<String, Vec<Document>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_collections<R>(
        &self,
        f: impl FnOnce(&mut HashMap<String, Vec<Document>>) -> R,
    ) -> Result<R, StoreError> {
        let mut guard = self
            .collections
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store poisoned".to_string()))?;
        Ok(f(&mut guard))
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn list_documents(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        self.with_collections(|c| c.get(collection).cloned().unwrap_or_default())
    }

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        self.with_collections(|c| {
            c.get(collection)
                .and_then(|docs| docs.iter().find(|d| d.id == id).cloned())
        })
    }

    async fn create_document(
        &self,
        collection: &str,
        id: &str,
        data: &serde_json::Value,
    ) -> Result<Document, StoreError> {
        self.with_collections(|c| {
            let docs = c.entry(collection.to_string()).or_default();
            if docs.iter().any(|d| d.id == id) {
                return Err(StoreError::AlreadyExists {
                    collection: collection.to_string(),
                    id: id.to_string(),
                });
            }
            let now = Utc::now();
            let document = Document {
                id: id.to_string(),
                data: data.clone(),
                created_at: now,
                updated_at: now,
            };
            docs.push(document.clone());
            Ok(document)
        })?
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        data: &serde_json::Value,
    ) -> Result<Document, StoreError> {
        self.with_collections(|c| {
            let document = c
                .get_mut(collection)
                .and_then(|docs| docs.iter_mut().find(|d| d.id == id))
                .ok_or_else(|| StoreError::NotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                })?;
            document.data = data.clone();
            document.updated_at = Utc::now();
            Ok(document.clone())
        })?
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        self.with_collections(|c| match c.get_mut(collection) {
            Some(docs) => {
                let before = docs.len();
                docs.retain(|d| d.id != id);
                docs.len() != before
            }
            None => false,
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
