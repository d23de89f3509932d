//! MongoDB backend integration tests.
//!
//! Configuration tests run without a server. Tests that require a running
//! MongoDB instance use testcontainers to start one in Docker.
//!
//! Run with: `cargo test -p resource-persistence --features mongodb -- mongodb`

#![cfg(feature = "mongodb")]

use resource_persistence::config::MongoConfig;
use resource_persistence::translate::DocumentLayout;

// ============================================================================
// Backend Configuration Tests (no MongoDB instance required)
// ============================================================================

#[test]
fn test_mongodb_config_defaults() {
    let config = MongoConfig::default();
    assert_eq!(config.uri, "mongodb://localhost:27017");
    assert_eq!(config.database, "resources");
    assert_eq!(config.collection, "items");
    assert_eq!(config.layout, DocumentLayout::Inline);
    assert_eq!(config.max_pool_size, 10);
}

#[test]
fn test_mongodb_config_from_json() {
    let config: MongoConfig = serde_json::from_str(
        r#"{
            "uri": "mongodb://db.internal:27017",
            "database": "app",
            "collection": "users",
            "layout": {"kind": "nested", "prefix": "payload"},
            "app_name": "users-api"
        }"#,
    )
    .unwrap();
    assert_eq!(config.uri, "mongodb://db.internal:27017");
    assert_eq!(config.layout, DocumentLayout::nested("payload"));
    assert_eq!(config.app_name.as_deref(), Some("users-api"));
    assert_eq!(config.min_pool_size, 1);
}

#[tokio::test]
async fn test_mongodb_connect_rejects_bad_uri() {
    use resource_persistence::backends::mongodb::MongoBackend;

    let config = MongoConfig::new("not-a-uri", "app", "users");
    let err = MongoBackend::connect(config).await.unwrap_err();
    assert!(err.to_string().contains("connection failed"));
}

// ============================================================================
// Integration Tests (requires Docker for testcontainers)
// ============================================================================

/// Integration tests that require a real MongoDB instance via testcontainers.
///
/// They mirror the patterns in memory_tests.rs.
///
/// Run with:
///   cargo test -p resource-persistence --features mongodb -- mongodb_integration
///
/// Skip if no Docker:
///   cargo test -p resource-persistence --features mongodb -- --skip mongodb_integration
#[cfg(test)]
mod mongodb_integration {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bson::{Document, doc};
    use futures_util::TryStreamExt;

    use resource_persistence::backends::mongodb::MongoBackend;
    use resource_persistence::config::MongoConfig;
    use resource_persistence::core::{Backend, BackendKind, ResourceStorage};
    use resource_persistence::translate::DocumentLayout;
    use resource_persistence::types::{ETag, Expression, Item, Query, SortField, Window};
    use resource_persistence::{CollectionStorage, OperationContext};

    use testcontainers::ImageExt;
    use testcontainers::runners::AsyncRunner;
    use testcontainers_modules::mongo::Mongo;
    use tokio::sync::OnceCell;

    /// Shared MongoDB container reused across all tests in this module.
    struct SharedMongo {
        uri: String,
        /// Kept alive for the duration of the test binary; dropped at process exit.
        _container: testcontainers::ContainerAsync<Mongo>,
    }

    static SHARED_MONGO: OnceCell<SharedMongo> = OnceCell::const_new();
    static COLLECTION_SEQ: AtomicUsize = AtomicUsize::new(0);

    async fn shared_mongo() -> &'static SharedMongo {
        SHARED_MONGO
            .get_or_init(|| async {
                let run_id = std::env::var("GITHUB_RUN_ID").unwrap_or_default();
                let container = Mongo::default()
                    .with_label("github.run_id", &run_id)
                    .start()
                    .await
                    .expect("Failed to start MongoDB container");

                let port = container
                    .get_host_port_ipv4(27017)
                    .await
                    .expect("Failed to get host port");

                let host = container
                    .get_host()
                    .await
                    .expect("Failed to get host")
                    .to_string();

                SharedMongo {
                    uri: format!("mongodb://{}:{}", host, port),
                    _container: container,
                }
            })
            .await
    }

    /// Connects to a fresh collection on the shared container.
    async fn create_backend(layout: DocumentLayout) -> MongoBackend {
        let shared = shared_mongo().await;
        let seq = COLLECTION_SEQ.fetch_add(1, Ordering::SeqCst);
        let config = MongoConfig::new(&shared.uri, "resource_tests", format!("items_{}", seq))
            .with_layout(layout);
        MongoBackend::connect(config)
            .await
            .expect("Failed to create MongoBackend")
    }

    async fn create_storage() -> (MongoBackend, CollectionStorage<MongoBackend>) {
        let backend = create_backend(DocumentLayout::Inline).await;
        (backend.clone(), CollectionStorage::new(backend))
    }

    async fn raw_documents(backend: &MongoBackend) -> Vec<Document> {
        let config = backend.config();
        backend
            .client()
            .database(&config.database)
            .collection::<Document>(&config.collection)
            .find(doc! {})
            .sort(doc! { "_id": 1 })
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap()
    }

    fn item(id: &str, etag: &str, payload: Document) -> Item {
        Item::new(id, payload).with_etag(ETag::explicit(etag))
    }

    // ========================================================================
    // Backend Tests
    // ========================================================================

    #[tokio::test]
    async fn mongodb_integration_health_check() {
        let backend = create_backend(DocumentLayout::Inline).await;
        assert_eq!(backend.kind(), BackendKind::MongoDB);
        assert_eq!(backend.name(), "mongodb");
        backend.health_check().await.unwrap();
    }

    // ========================================================================
    // CRUD Tests
    // ========================================================================

    #[tokio::test]
    async fn mongodb_integration_insert_duplicate_is_conflict() {
        let (backend, storage) = create_storage().await;
        let ctx = OperationContext::new();
        storage
            .insert(&ctx, &[item("1", "a", doc! {})])
            .await
            .unwrap();

        let err = storage
            .insert(&ctx, &[item("2", "a", doc! {}), item("1", "b", doc! {})])
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(raw_documents(&backend).await.len(), 2);
    }

    #[tokio::test]
    async fn mongodb_integration_update_and_delete() {
        let (backend, storage) = create_storage().await;
        let ctx = OperationContext::new();
        let v1 = item("1", "v1", doc! { "name": "a" });
        storage.insert(&ctx, &[v1.clone()]).await.unwrap();

        let v2 = item("1", "v2", doc! { "name": "b" });
        storage.update(&ctx, &v2, &v1).await.unwrap();

        assert!(storage.update(&ctx, &v2, &v1).await.unwrap_err().is_conflict());
        assert!(storage.delete(&ctx, &v1).await.unwrap_err().is_conflict());
        assert!(
            storage
                .delete(&ctx, &item("9", "v1", doc! {}))
                .await
                .unwrap_err()
                .is_not_found()
        );

        storage.delete(&ctx, &v2).await.unwrap();
        assert!(raw_documents(&backend).await.is_empty());
    }

    #[tokio::test]
    async fn mongodb_integration_provisional_etag() {
        let (backend, storage) = create_storage().await;
        let ctx = OperationContext::new();
        let config = backend.config();
        backend
            .client()
            .database(&config.database)
            .collection::<Document>(&config.collection)
            .insert_one(doc! { "_id": "legacy", "name": "old" })
            .await
            .unwrap();

        let list = storage.find(&ctx, &Query::new()).await.unwrap();
        let original = list.items[0].clone();
        assert_eq!(original.etag().render(original.id()), "p-legacy");

        let next = item("legacy", "v1", doc! { "name": "new" });
        storage.update(&ctx, &next, &original).await.unwrap();
        assert!(
            storage
                .update(&ctx, &next, &original)
                .await
                .unwrap_err()
                .is_conflict()
        );
    }

    // ========================================================================
    // Query Tests
    // ========================================================================

    #[tokio::test]
    async fn mongodb_integration_find_totals() {
        let (_backend, storage) = create_storage().await;
        let ctx = OperationContext::new();
        storage
            .insert(
                &ctx,
                &[
                    item("1", "a", doc! { "foo": "bar", "n": 3 }),
                    item("2", "a", doc! { "foo": "bar", "n": 1 }),
                    item("3", "a", doc! { "foo": "baz", "n": 2 }),
                ],
            )
            .await
            .unwrap();

        let by_foo = Query::new().with_predicate(Expression::equal("foo", "bar"));

        let list = storage.find(&ctx, &by_foo).await.unwrap();
        assert_eq!(list.total, Some(2));

        let list = storage
            .find(&ctx, &by_foo.clone().with_window(Window::new(0, Some(1))))
            .await
            .unwrap();
        assert_eq!(list.items.len(), 1);
        assert_eq!(list.total, None);

        let list = storage
            .find(&ctx, &by_foo.clone().with_window(Window::new(0, Some(0))))
            .await
            .unwrap();
        assert!(list.items.is_empty());
        assert_eq!(list.total, Some(2));

        let sorted = Query::new()
            .with_sort(SortField::desc("n"))
            .with_window(Window::new(1, Some(5)));
        let list = storage.find(&ctx, &sorted).await.unwrap();
        let ids: Vec<String> = list.items.iter().map(|i| i.id().to_string()).collect();
        assert_eq!(ids, vec!["3", "2"]);
        assert_eq!(list.total, Some(3));

        assert_eq!(storage.count(&ctx, &by_foo).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn mongodb_integration_clear_window() {
        let (backend, storage) = create_storage().await;
        let ctx = OperationContext::new();
        storage
            .insert(
                &ctx,
                &[
                    item("1", "a", doc! { "name": "c" }),
                    item("2", "a", doc! { "name": "a" }),
                    item("3", "a", doc! { "name": "b" }),
                ],
            )
            .await
            .unwrap();

        let zero = Query::new().with_window(Window::new(0, Some(0)));
        assert_eq!(storage.clear(&ctx, &zero).await.into_result().unwrap(), 0);

        let first = Query::new()
            .with_sort(SortField::asc("name"))
            .with_window(Window::new(0, Some(1)));
        assert_eq!(storage.clear(&ctx, &first).await.into_result().unwrap(), 1);

        let left: Vec<String> = raw_documents(&backend)
            .await
            .iter()
            .map(|d| d.get_str("_id").unwrap().to_string())
            .collect();
        assert_eq!(left, vec!["1", "3"]);

        assert_eq!(
            storage
                .clear(&ctx, &Query::new())
                .await
                .into_result()
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn mongodb_integration_nested_layout() {
        let backend = create_backend(DocumentLayout::nested("data")).await;
        let storage = CollectionStorage::with_layout(backend.clone(), DocumentLayout::nested("data"));
        let ctx = OperationContext::new();
        storage
            .insert(
                &ctx,
                &[
                    item("1", "a", doc! { "tags": [{ "k": "x", "v": 1 }] }),
                    item("2", "a", doc! { "tags": [{ "k": "y", "v": 5 }] }),
                ],
            )
            .await
            .unwrap();

        let stored = raw_documents(&backend).await;
        assert!(stored[0].get_document("data").is_ok());

        let query = Query::new().with_predicate(Expression::elem_match(
            "tags",
            [Expression::equal("k", "y"), Expression::greater_than("v", 2)],
        ));
        let list = storage.find(&ctx, &query).await.unwrap();
        assert_eq!(list.items.len(), 1);
        assert_eq!(list.items[0].id().to_string(), "2");
    }
}
