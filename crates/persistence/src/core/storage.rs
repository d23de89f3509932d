//! Core resource storage trait.
//!
//! This module defines the [`ResourceStorage`] trait, which provides the
//! operations a resource layer needs from its storage: batch insert,
//! compare-and-swap update and delete, bulk clear, paged find and count.
//! Every operation takes an [`OperationContext`] as its first parameter.

use async_trait::async_trait;

use crate::context::OperationContext;
use crate::error::{StorageError, StorageResult};
use crate::types::{Item, ItemList, Query};

/// Result of a bulk clear.
///
/// A clear can fail after removing some items, so the removed count is
/// reported together with the error instead of being discarded.
#[derive(Debug)]
pub struct ClearOutcome {
    /// Number of items removed.
    pub removed: u64,
    /// Error raised while or after removing, if any.
    pub error: Option<StorageError>,
}

impl ClearOutcome {
    /// A clear that removed `removed` items without error.
    pub fn removed(removed: u64) -> Self {
        Self {
            removed,
            error: None,
        }
    }

    /// A clear that failed after removing `removed` items.
    pub fn failed(removed: u64, error: StorageError) -> Self {
        Self {
            removed,
            error: Some(error),
        }
    }

    /// Returns `true` if the clear completed without error.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Converts into a result, dropping the removed count on error.
    pub fn into_result(self) -> StorageResult<u64> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.removed),
        }
    }
}

/// Core storage trait for resource items.
///
/// # Optimistic Concurrency
///
/// `update` and `delete` only succeed against the expected prior version of
/// the item, given by its [`ETag`](crate::types::ETag). When the write
/// matches nothing, implementations tell apart a missing item
/// ([`ResourceError::NotFound`](crate::error::ResourceError::NotFound)) from
/// a stale version
/// ([`ConcurrencyError::VersionConflict`](crate::error::ConcurrencyError::VersionConflict)).
///
/// # Example
///
/// ```
/// use bson::doc;
/// use resource_persistence::backends::memory::MemoryBackend;
/// use resource_persistence::core::ResourceStorage;
/// use resource_persistence::engine::CollectionStorage;
/// use resource_persistence::types::{ETag, Item, Query};
/// use resource_persistence::OperationContext;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), resource_persistence::StorageError> {
/// let storage = CollectionStorage::new(MemoryBackend::new("items"));
/// let ctx = OperationContext::new();
///
/// let item = Item::new("1", doc! { "name": "Smith" }).with_etag(ETag::explicit("v1"));
/// storage.insert(&ctx, std::slice::from_ref(&item)).await?;
///
/// let updated = Item::new("1", doc! { "name": "Jones" }).with_etag(ETag::explicit("v2"));
/// storage.update(&ctx, &updated, &item).await?;
///
/// // the first version is now stale
/// assert!(storage.update(&ctx, &updated, &item).await.unwrap_err().is_conflict());
///
/// let page = storage.find(&ctx, &Query::new()).await?;
/// assert_eq!(page.total, Some(1));
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait ResourceStorage: Send + Sync {
    /// Returns a human-readable name for this storage backend.
    fn backend_name(&self) -> &'static str;

    /// Inserts new items.
    ///
    /// # Errors
    ///
    /// * `StorageError::Concurrency(DuplicateKey)` - If an item with the same id exists
    /// * `StorageError::Context` - If the context expired, even when the store
    ///   accepted the items
    async fn insert(&self, ctx: &OperationContext, items: &[Item]) -> StorageResult<()>;

    /// Replaces `original` with `item`, provided the stored version still
    /// matches `original`'s version token.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NotFound)` - If no item has `original`'s id
    /// * `StorageError::Concurrency(VersionConflict)` - If the stored version differs
    async fn update(
        &self,
        ctx: &OperationContext,
        item: &Item,
        original: &Item,
    ) -> StorageResult<()>;

    /// Deletes `item`, provided the stored version still matches its version token.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NotFound)` - If no item has this id
    /// * `StorageError::Concurrency(VersionConflict)` - If the stored version differs
    async fn delete(&self, ctx: &OperationContext, item: &Item) -> StorageResult<()>;

    /// Deletes every item matching the query's predicate, restricted to the
    /// query's sort and window when one is set.
    async fn clear(&self, ctx: &OperationContext, query: &Query) -> ClearOutcome;

    /// Finds items matching the query.
    async fn find(&self, ctx: &OperationContext, query: &Query) -> StorageResult<ItemList>;

    /// Counts items matching the query's predicate. Sort and window are ignored.
    async fn count(&self, ctx: &OperationContext, query: &Query) -> StorageResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContextError;

    #[test]
    fn test_clear_outcome_into_result() {
        assert_eq!(ClearOutcome::removed(3).into_result().unwrap(), 3);

        let outcome = ClearOutcome::failed(2, ContextError::Cancelled.into());
        assert!(!outcome.is_ok());
        assert_eq!(outcome.removed, 2);
        assert!(outcome.into_result().unwrap_err().is_cancelled());
    }
}
