//! In-process backend implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use futures_util::StreamExt;
use futures_util::stream;
use parking_lot::RwLock;

use crate::context::OperationContext;
use crate::core::{Backend, BackendKind, CollectionSession, DocumentCursor, WriteOutcome};
use crate::error::BackendError;
use crate::translate::{FindSpec, ID_FIELD};

use super::matcher::{matches, project, sort_documents, values_equal};

const BACKEND_NAME: &str = "memory";

/// In-process document store holding a single collection.
///
/// Clones share the same documents, so a clone can be kept to inspect or
/// seed the collection while the engine owns the original.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    collection: String,
    documents: Arc<RwLock<Vec<Document>>>,
}

impl MemoryBackend {
    /// Creates an empty collection named `collection`.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            documents: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Returns the collection name.
    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    /// Returns the number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Returns `true` if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    /// Returns a snapshot of the stored documents in insertion order.
    pub fn documents(&self) -> Vec<Document> {
        self.documents.read().clone()
    }

    /// Stores a document as-is, bypassing the item codec.
    ///
    /// Useful to seed documents written by other tools, such as documents
    /// without an `_etag` field.
    pub fn insert_raw(&self, doc: Document) -> Result<(), BackendError> {
        insert_document(&self.collection, &mut self.documents.write(), doc)
    }
}

/// A session on a [`MemoryBackend`] collection.
#[derive(Debug)]
pub struct MemorySession {
    collection: String,
    documents: Arc<RwLock<Vec<Document>>>,
}

#[async_trait]
impl Backend for MemoryBackend {
    type Session = MemorySession;

    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn acquire(&self, _ctx: &OperationContext) -> Result<Self::Session, BackendError> {
        Ok(MemorySession {
            collection: self.collection.clone(),
            documents: Arc::clone(&self.documents),
        })
    }

    async fn release(&self, _session: Self::Session) {
        // Nothing is pooled
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

#[async_trait]
impl CollectionSession for MemorySession {
    fn collection_name(&self) -> &str {
        &self.collection
    }

    async fn insert_many(&self, docs: Vec<Document>) -> Result<(), BackendError> {
        let mut stored = self.documents.write();
        for doc in docs {
            insert_document(&self.collection, &mut stored, doc)?;
        }
        Ok(())
    }

    async fn replace_one(
        &self,
        filter: Document,
        mut replacement: Document,
    ) -> Result<WriteOutcome, BackendError> {
        let mut stored = self.documents.write();
        let Some(index) = position(&stored, &filter)? else {
            return Ok(WriteOutcome::NotMatched);
        };
        if let Some(id) = stored[index].get(ID_FIELD).cloned() {
            if let Some(new_id) = replacement.get(ID_FIELD)
                && !values_equal(new_id, &id)
            {
                return Err(BackendError::QueryError {
                    message: format!(
                        "performing an update on the path '_id' would modify the immutable field '_id' ({} to {})",
                        id, new_id
                    ),
                });
            }
            replacement.insert(ID_FIELD, id);
        }
        stored[index] = replacement;
        Ok(WriteOutcome::Matched)
    }

    async fn delete_one(&self, filter: Document) -> Result<WriteOutcome, BackendError> {
        let mut stored = self.documents.write();
        match position(&stored, &filter)? {
            Some(index) => {
                stored.remove(index);
                Ok(WriteOutcome::Matched)
            }
            None => Ok(WriteOutcome::NotMatched),
        }
    }

    async fn delete_many(&self, filter: Document) -> Result<u64, BackendError> {
        let mut stored = self.documents.write();
        let hits = stored
            .iter()
            .map(|doc| matches(doc, &filter))
            .collect::<Result<Vec<_>, _>>()?;
        let before = stored.len();
        let mut hits = hits.into_iter();
        stored.retain(|_| !hits.next().unwrap_or(false));
        Ok((before - stored.len()) as u64)
    }

    async fn find(
        &self,
        filter: Document,
        spec: FindSpec,
    ) -> Result<DocumentCursor, BackendError> {
        let mut found = Vec::new();
        for doc in self.documents.read().iter() {
            if matches(doc, &filter)? {
                found.push(doc.clone());
            }
        }
        sort_documents(&mut found, &spec.sort);

        let skip = usize::try_from(spec.skip).unwrap_or(usize::MAX);
        // A zero limit means no limit, as in the server.
        let limit = match spec.limit {
            None | Some(0) => usize::MAX,
            Some(n) => usize::try_from(n).unwrap_or(usize::MAX),
        };
        let page: Vec<Result<Document, BackendError>> = found
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|doc| match &spec.projection {
                Some(projection) => Ok(project(doc, projection)),
                None => Ok(doc),
            })
            .collect();
        Ok(stream::iter(page).boxed())
    }

    async fn count(
        &self,
        filter: Document,
        _max_time: Option<Duration>,
    ) -> Result<u64, BackendError> {
        let mut count = 0;
        for doc in self.documents.read().iter() {
            if matches(doc, &filter)? {
                count += 1;
            }
        }
        Ok(count)
    }
}

fn position(stored: &[Document], filter: &Document) -> Result<Option<usize>, BackendError> {
    for (index, doc) in stored.iter().enumerate() {
        if matches(doc, filter)? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

fn insert_document(
    collection: &str,
    stored: &mut Vec<Document>,
    mut doc: Document,
) -> Result<(), BackendError> {
    let id = match doc.get(ID_FIELD) {
        Some(id) => id.clone(),
        None => {
            let id = Bson::ObjectId(ObjectId::new());
            doc.insert(ID_FIELD, id.clone());
            id
        }
    };
    let duplicate = stored
        .iter()
        .any(|existing| existing.get(ID_FIELD).is_some_and(|e| values_equal(e, &id)));
    if duplicate {
        return Err(BackendError::DuplicateKey {
            backend_name: BACKEND_NAME.to_string(),
            message: format!(
                "E11000 duplicate key error collection: {} dup key: {{ _id: {} }}",
                collection, id
            ),
        });
    }
    stored.push(doc);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use futures_util::TryStreamExt;

    async fn session_with(docs: Vec<Document>) -> (MemoryBackend, MemorySession) {
        let backend = MemoryBackend::new("test");
        for doc in docs {
            backend.insert_raw(doc).unwrap();
        }
        let session = backend.acquire(&OperationContext::new()).await.unwrap();
        (backend, session)
    }

    #[tokio::test]
    async fn test_insert_many_stops_at_duplicate() {
        let (backend, session) = session_with(vec![doc! { "_id": 2 }]).await;
        let err = session
            .insert_many(vec![doc! { "_id": 1 }, doc! { "_id": 2_i64 }, doc! { "_id": 3 }])
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::DuplicateKey { .. }));
        assert_eq!(backend.len(), 2);
    }

    #[tokio::test]
    async fn test_insert_generates_missing_id() {
        let (backend, session) = session_with(vec![]).await;
        session.insert_many(vec![doc! { "a": 1 }]).await.unwrap();
        let stored = backend.documents();
        assert!(matches!(stored[0].get("_id"), Some(Bson::ObjectId(_))));
    }

    #[tokio::test]
    async fn test_replace_keeps_id() {
        let (backend, session) = session_with(vec![doc! { "_id": 1, "v": 1 }]).await;
        let outcome = session
            .replace_one(doc! { "_id": 1 }, doc! { "v": 2 })
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Matched);
        assert_eq!(backend.documents(), vec![doc! { "v": 2, "_id": 1 }]);

        let outcome = session
            .replace_one(doc! { "_id": 9 }, doc! { "v": 3 })
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::NotMatched);
    }

    #[tokio::test]
    async fn test_replace_rejects_id_change() {
        let (backend, session) = session_with(vec![doc! { "_id": 1, "v": 1 }]).await;
        let err = session
            .replace_one(doc! { "_id": 1 }, doc! { "_id": 2, "v": 2 })
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::QueryError { .. }));
        assert_eq!(backend.documents(), vec![doc! { "_id": 1, "v": 1 }]);

        // Same id in another numeric representation is not a change
        let outcome = session
            .replace_one(doc! { "_id": 1 }, doc! { "_id": 1_i64, "v": 3 })
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Matched);
        assert_eq!(backend.documents()[0].get_i32("v").unwrap(), 3);
    }

    #[tokio::test]
    async fn test_insert_distinct_large_ids() {
        let (backend, session) = session_with(vec![doc! { "_id": 9_007_199_254_740_992_i64 }]).await;
        session
            .insert_many(vec![doc! { "_id": 9_007_199_254_740_993_i64 }])
            .await
            .unwrap();
        assert_eq!(backend.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_many_counts_removed() {
        let (backend, session) = session_with(vec![
            doc! { "_id": 1, "k": "a" },
            doc! { "_id": 2, "k": "b" },
            doc! { "_id": 3, "k": "a" },
        ])
        .await;
        let removed = session.delete_many(doc! { "k": "a" }).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(backend.documents(), vec![doc! { "_id": 2, "k": "b" }]);
    }

    #[tokio::test]
    async fn test_find_zero_limit_is_unbounded() {
        let (_backend, session) =
            session_with(vec![doc! { "_id": 1 }, doc! { "_id": 2 }, doc! { "_id": 3 }]).await;
        let spec = FindSpec {
            sort: doc! { "_id": -1 },
            limit: Some(0),
            ..Default::default()
        };
        let docs: Vec<Document> = session
            .find(doc! {}, spec)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0], doc! { "_id": 3 });
    }

    #[tokio::test]
    async fn test_find_skip_limit_projection() {
        let (_backend, session) = session_with(vec![
            doc! { "_id": 1, "n": "c" },
            doc! { "_id": 2, "n": "a" },
            doc! { "_id": 3, "n": "b" },
        ])
        .await;
        let spec = FindSpec {
            sort: doc! { "n": 1 },
            skip: 1,
            limit: Some(1),
            projection: Some(doc! { "_id": 1 }),
            ..Default::default()
        };
        let docs: Vec<Document> = session
            .find(doc! {}, spec)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(docs, vec![doc! { "_id": 3 }]);
    }
}
