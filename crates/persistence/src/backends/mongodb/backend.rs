//! MongoDB backend implementation.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use bson::{Document, doc};
use futures_util::{StreamExt, TryStreamExt};
use mongodb::options::{ClientOptions, CountOptions, FindOptions};
use mongodb::{Client, Collection, Database};

use crate::config::MongoConfig;
use crate::context::OperationContext;
use crate::core::{Backend, BackendKind, CollectionSession, DocumentCursor, WriteOutcome};
use crate::engine::CollectionStorage;
use crate::error::{BackendError, StorageResult};
use crate::translate::FindSpec;

const BACKEND_NAME: &str = "mongodb";

/// MongoDB backend bound to a single collection.
#[derive(Clone)]
pub struct MongoBackend {
    client: Client,
    database: Database,
    collection: Collection<Document>,
    config: MongoConfig,
}

impl Debug for MongoBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoBackend")
            .field("database", &self.config.database)
            .field("collection", &self.config.collection)
            .field("max_pool_size", &self.config.max_pool_size)
            .finish_non_exhaustive()
    }
}

impl MongoBackend {
    /// Connects to the server described by `config`.
    ///
    /// The driver connects lazily, so an unreachable server is reported by
    /// the first operation rather than here. Use
    /// [`health_check`](Backend::health_check) to probe eagerly.
    pub async fn connect(config: MongoConfig) -> StorageResult<Self> {
        let mut options = ClientOptions::parse(&config.uri).await.map_err(|e| {
            BackendError::ConnectionFailed {
                backend_name: BACKEND_NAME.to_string(),
                message: e.to_string(),
            }
        })?;
        options.max_pool_size = Some(config.max_pool_size);
        options.min_pool_size = Some(config.min_pool_size);
        options.connect_timeout = Some(config.connect_timeout());
        if let Some(app_name) = &config.app_name {
            options.app_name = Some(app_name.clone());
        }

        let client =
            Client::with_options(options).map_err(|e| BackendError::ConnectionFailed {
                backend_name: BACKEND_NAME.to_string(),
                message: e.to_string(),
            })?;

        tracing::info!(
            "MongoDB backend ready for {}.{} (pool size {}..{})",
            config.database,
            config.collection,
            config.min_pool_size,
            config.max_pool_size
        );

        Ok(Self::with_client(client, config))
    }

    /// Wraps an existing client.
    pub fn with_client(client: Client, config: MongoConfig) -> Self {
        let database = client.database(&config.database);
        let collection = database.collection::<Document>(&config.collection);
        Self {
            client,
            database,
            collection,
            config,
        }
    }

    /// Returns the underlying driver client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Returns the configuration.
    pub fn config(&self) -> &MongoConfig {
        &self.config
    }

    /// Drops the whole collection.
    pub async fn drop_collection(&self) -> Result<(), BackendError> {
        self.collection.drop().await?;
        Ok(())
    }
}

/// A session on a MongoDB collection.
///
/// Sessions are cheap handles; connection pooling happens in the driver.
#[derive(Debug, Clone)]
pub struct MongoSession {
    collection: Collection<Document>,
}

#[async_trait]
impl Backend for MongoBackend {
    type Session = MongoSession;

    fn kind(&self) -> BackendKind {
        BackendKind::MongoDB
    }

    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn acquire(&self, _ctx: &OperationContext) -> Result<Self::Session, BackendError> {
        Ok(MongoSession {
            collection: self.collection.clone(),
        })
    }

    async fn release(&self, _session: Self::Session) {
        // The driver returns connections to its pool after each command
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| BackendError::Unavailable {
                backend_name: BACKEND_NAME.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }
}

#[async_trait]
impl CollectionSession for MongoSession {
    fn collection_name(&self) -> &str {
        self.collection.name()
    }

    async fn insert_many(&self, docs: Vec<Document>) -> Result<(), BackendError> {
        self.collection.insert_many(docs).ordered(true).await?;
        Ok(())
    }

    async fn replace_one(
        &self,
        filter: Document,
        replacement: Document,
    ) -> Result<WriteOutcome, BackendError> {
        let result = self.collection.replace_one(filter, replacement).await?;
        Ok(WriteOutcome::from_count(result.matched_count))
    }

    async fn delete_one(&self, filter: Document) -> Result<WriteOutcome, BackendError> {
        let result = self.collection.delete_one(filter).await?;
        Ok(WriteOutcome::from_count(result.deleted_count))
    }

    async fn delete_many(&self, filter: Document) -> Result<u64, BackendError> {
        let result = self.collection.delete_many(filter).await?;
        Ok(result.deleted_count)
    }

    async fn find(
        &self,
        filter: Document,
        spec: FindSpec,
    ) -> Result<DocumentCursor, BackendError> {
        let mut options = FindOptions::default();
        options.sort = Some(spec.sort);
        if spec.skip > 0 {
            options.skip = Some(spec.skip);
        }
        if let Some(limit) = spec.limit {
            options.limit = Some(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        options.projection = spec.projection;
        options.max_time = spec.max_time.map(clamp_max_time);

        let cursor = self.collection.find(filter).with_options(options).await?;
        Ok(cursor.map_err(BackendError::from).boxed())
    }

    async fn count(
        &self,
        filter: Document,
        max_time: Option<Duration>,
    ) -> Result<u64, BackendError> {
        let mut options = CountOptions::default();
        options.max_time = max_time.map(clamp_max_time);
        let count = self
            .collection
            .count_documents(filter)
            .with_options(options)
            .await?;
        Ok(count)
    }
}

// A zero maxTimeMS means no limit to the server; keep at least 1ms.
fn clamp_max_time(max_time: Duration) -> Duration {
    max_time.max(Duration::from_millis(1))
}

/// Connects to MongoDB and returns a storage using the configured layout.
pub async fn connect_mongo(config: MongoConfig) -> StorageResult<CollectionStorage<MongoBackend>> {
    let layout = config.layout.clone();
    let backend = MongoBackend::connect(config).await?;
    Ok(CollectionStorage::with_layout(backend, layout))
}
