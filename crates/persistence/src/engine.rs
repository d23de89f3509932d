//! Storage engine over a document store backend.
//!
//! [`CollectionStorage`] implements [`ResourceStorage`] on top of any
//! [`Backend`]. It translates queries, encodes items, enforces
//! compare-and-swap on the `_etag` field and deduces result totals.
//!
//! Each operation checks the [`OperationContext`] on entry, bounds every
//! round-trip by it, and checks it again once the store answers. One session
//! is acquired per operation and released on every exit path.

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures_util::TryStreamExt;

use crate::codec::{decode_item, encode_item};
use crate::context::OperationContext;
use crate::core::{Backend, ClearOutcome, CollectionSession, ResourceStorage, WriteOutcome};
use crate::error::{BackendError, ConcurrencyError, ResourceError, StorageError, StorageResult};
use crate::translate::{
    DocumentLayout, ETAG_FIELD, FieldMapper, FindSpec, ID_FIELD, apply_window, translate_predicate,
    translate_sort,
};
use crate::types::{ETag, Item, ItemId, ItemList, Query, Window};

/// Resource storage backed by one collection of a document store.
#[derive(Debug)]
pub struct CollectionStorage<B: Backend> {
    backend: B,
    fields: FieldMapper,
}

impl<B: Backend> CollectionStorage<B> {
    /// Creates a storage with payload fields stored inline.
    pub fn new(backend: B) -> Self {
        Self::with_layout(backend, DocumentLayout::Inline)
    }

    /// Creates a storage with the given payload layout.
    pub fn with_layout(backend: B, layout: DocumentLayout) -> Self {
        Self {
            backend,
            fields: FieldMapper::new(layout),
        }
    }

    /// Returns the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the payload layout.
    pub fn layout(&self) -> &DocumentLayout {
        self.fields.layout()
    }

    async fn acquire(&self, ctx: &OperationContext) -> StorageResult<B::Session> {
        ctx.run(self.backend.acquire(ctx)).await
    }

    async fn replace_in(
        &self,
        ctx: &OperationContext,
        session: &B::Session,
        replacement: Document,
        original: &Item,
    ) -> StorageResult<()> {
        let filter = version_filter(original.id(), original.etag());
        tracing::debug!(
            "[{}] replace in {}: filter={}",
            correlation(ctx),
            session.collection_name(),
            filter
        );
        match ctx.run(session.replace_one(filter, replacement)).await? {
            WriteOutcome::Matched => ctx.check().map_err(Into::into),
            WriteOutcome::NotMatched => {
                self.resolve_unmatched(ctx, session, original.id(), original.etag())
                    .await
            }
        }
    }

    async fn delete_in(
        &self,
        ctx: &OperationContext,
        session: &B::Session,
        item: &Item,
    ) -> StorageResult<()> {
        let filter = version_filter(item.id(), item.etag());
        tracing::debug!(
            "[{}] delete in {}: filter={}",
            correlation(ctx),
            session.collection_name(),
            filter
        );
        match ctx.run(session.delete_one(filter)).await? {
            WriteOutcome::Matched => ctx.check().map_err(Into::into),
            WriteOutcome::NotMatched => {
                self.resolve_unmatched(ctx, session, item.id(), item.etag())
                    .await
            }
        }
    }

    /// Tells a missing item apart from a stale version after a write matched nothing.
    async fn resolve_unmatched(
        &self,
        ctx: &OperationContext,
        session: &B::Session,
        id: &ItemId,
        etag: &ETag,
    ) -> StorageResult<()> {
        let count = ctx
            .run(session.count(doc! { ID_FIELD: id.to_bson() }, ctx.remaining()))
            .await?;
        tracing::debug!(
            "[{}] unmatched write on {}/{}: {} stored with that id",
            correlation(ctx),
            session.collection_name(),
            id,
            count
        );
        if count == 0 {
            return Err(ResourceError::NotFound { id: id.to_string() }.into());
        }
        ctx.check()?;
        Err(ConcurrencyError::VersionConflict {
            id: id.to_string(),
            expected_etag: etag.render(id),
        }
        .into())
    }

    async fn clear_in(
        &self,
        ctx: &OperationContext,
        session: &B::Session,
        query: &Query,
        filter: Document,
    ) -> ClearOutcome {
        // Bulk removes take no sort, skip or limit: resolve the window to ids first.
        let filter = match &query.window {
            Some(window) => match self.select_ids(ctx, session, query, filter, window).await {
                Ok(ids) if ids.is_empty() => return finish_clear(ctx, 0),
                Ok(ids) => doc! { ID_FIELD: { "$in": ids } },
                Err(err) => return ClearOutcome::failed(0, err),
            },
            None => filter,
        };

        tracing::debug!(
            "[{}] delete many in {}: filter={}",
            correlation(ctx),
            session.collection_name(),
            filter
        );
        match ctx.run(session.delete_many(filter)).await {
            Ok(removed) => finish_clear(ctx, removed),
            Err(err) => ClearOutcome::failed(0, err),
        }
    }

    async fn select_ids(
        &self,
        ctx: &OperationContext,
        session: &B::Session,
        query: &Query,
        filter: Document,
        window: &Window,
    ) -> StorageResult<Vec<Bson>> {
        let spec = FindSpec::new(translate_sort(&query.sort, &self.fields))
            .with_projection(doc! { ID_FIELD: 1 })
            .with_max_time(ctx.remaining());
        let spec = apply_window(spec, window);

        let mut cursor = ctx.run(session.find(filter, spec)).await?;
        let mut ids = Vec::new();
        while let Some(doc) = ctx.run(cursor.try_next()).await? {
            if let Some(id) = doc.get(ID_FIELD) {
                ids.push(id.clone());
            }
        }
        Ok(ids)
    }

    async fn find_in(
        &self,
        ctx: &OperationContext,
        session: &B::Session,
        filter: Document,
        spec: FindSpec,
    ) -> StorageResult<Vec<Item>> {
        tracing::debug!(
            "[{}] find in {}: filter={} sort={} skip={} limit={:?}",
            correlation(ctx),
            session.collection_name(),
            filter,
            spec.sort,
            spec.skip,
            spec.limit
        );
        let mut cursor = ctx.run(session.find(filter, spec)).await?;
        let mut items = Vec::new();
        while let Some(doc) = ctx.run(cursor.try_next()).await? {
            items.push(decode_item(doc, self.fields.layout())?);
        }
        ctx.check()?;
        Ok(items)
    }
}

#[async_trait]
impl<B: Backend> ResourceStorage for CollectionStorage<B> {
    fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    async fn insert(&self, ctx: &OperationContext, items: &[Item]) -> StorageResult<()> {
        ctx.check()?;
        if items.is_empty() {
            return Ok(());
        }
        let docs = items
            .iter()
            .map(|item| encode_item(item, self.fields.layout()))
            .collect::<StorageResult<Vec<_>>>()?;

        let session = self.acquire(ctx).await?;
        tracing::debug!(
            "[{}] insert {} items in {}",
            correlation(ctx),
            docs.len(),
            session.collection_name()
        );
        let result = ctx.run(session.insert_many(docs)).await;
        self.backend.release(session).await;

        // An expired context wins over whatever the store answered.
        ctx.check()?;
        match result {
            Err(StorageError::Backend(BackendError::DuplicateKey { message, .. })) => {
                Err(ConcurrencyError::DuplicateKey { message }.into())
            }
            other => other,
        }
    }

    async fn update(
        &self,
        ctx: &OperationContext,
        item: &Item,
        original: &Item,
    ) -> StorageResult<()> {
        ctx.check()?;
        let replacement = encode_item(item, self.fields.layout())?;

        let session = self.acquire(ctx).await?;
        let result = self.replace_in(ctx, &session, replacement, original).await;
        self.backend.release(session).await;
        result
    }

    async fn delete(&self, ctx: &OperationContext, item: &Item) -> StorageResult<()> {
        ctx.check()?;

        let session = self.acquire(ctx).await?;
        let result = self.delete_in(ctx, &session, item).await;
        self.backend.release(session).await;
        result
    }

    async fn clear(&self, ctx: &OperationContext, query: &Query) -> ClearOutcome {
        if let Err(err) = ctx.check() {
            return ClearOutcome::failed(0, err.into());
        }
        let filter = match translate_predicate(&query.predicate, &self.fields) {
            Ok(filter) => filter,
            Err(err) => return ClearOutcome::failed(0, err.into()),
        };
        // Stores read a zero limit as unbounded; a zero window removes nothing.
        if query.window.is_some_and(|w| w.is_empty()) {
            return ClearOutcome::removed(0);
        }

        let session = match self.acquire(ctx).await {
            Ok(session) => session,
            Err(err) => return ClearOutcome::failed(0, err),
        };
        let outcome = self.clear_in(ctx, &session, query, filter).await;
        self.backend.release(session).await;

        if let Some(err) = &outcome.error
            && outcome.removed > 0
        {
            tracing::warn!(
                "[{}] clear removed {} items before failing: {}",
                correlation(ctx),
                outcome.removed,
                err
            );
        }
        outcome
    }

    async fn find(&self, ctx: &OperationContext, query: &Query) -> StorageResult<ItemList> {
        ctx.check()?;
        // Stores read a zero limit as unbounded, so only count.
        if query.window.is_some_and(|w| w.is_empty()) {
            let total = self.count(ctx, query).await?;
            return Ok(ItemList {
                total: Some(total),
                limit: Some(0),
                items: Vec::new(),
            });
        }

        let filter = translate_predicate(&query.predicate, &self.fields)?;
        let mut spec =
            FindSpec::new(translate_sort(&query.sort, &self.fields)).with_max_time(ctx.remaining());
        if let Some(window) = &query.window {
            spec = apply_window(spec, window);
        }

        let session = self.acquire(ctx).await?;
        let result = self.find_in(ctx, &session, filter, spec).await;
        self.backend.release(session).await;
        let items = result?;

        Ok(ItemList {
            total: deduce_total(query.window.as_ref(), items.len() as u64),
            limit: query.window.and_then(|w| w.limit),
            items,
        })
    }

    async fn count(&self, ctx: &OperationContext, query: &Query) -> StorageResult<u64> {
        ctx.check()?;
        let filter = translate_predicate(&query.predicate, &self.fields)?;

        let session = self.acquire(ctx).await?;
        tracing::debug!(
            "[{}] count in {}: filter={}",
            correlation(ctx),
            session.collection_name(),
            filter
        );
        let result = ctx.run(session.count(filter, ctx.remaining())).await;
        self.backend.release(session).await;

        let count = result?;
        ctx.check()?;
        Ok(count)
    }
}

/// Builds the compare-and-swap filter for a write against `id` at version `etag`.
///
/// A provisional token only matches documents that carry no `_etag` at all.
fn version_filter(id: &ItemId, etag: &ETag) -> Document {
    match etag.as_explicit() {
        Some(token) => doc! { ID_FIELD: id.to_bson(), ETAG_FIELD: token },
        None => doc! { ID_FIELD: id.to_bson(), ETAG_FIELD: { "$exists": false } },
    }
}

/// Correlation id for log lines, `-` when the caller set none.
fn correlation(ctx: &OperationContext) -> &str {
    ctx.correlation_id().unwrap_or("-")
}

fn finish_clear(ctx: &OperationContext, removed: u64) -> ClearOutcome {
    match ctx.check() {
        Ok(()) => ClearOutcome::removed(removed),
        Err(err) => ClearOutcome::failed(removed, err.into()),
    }
}

/// Deduces the number of matching items from a page, when the page proves it.
///
/// A full page says nothing about what follows. A short page past a
/// positive offset proves the total only if it is not empty, since an empty
/// page may simply be out of bounds.
pub(crate) fn deduce_total(window: Option<&Window>, returned: u64) -> Option<u64> {
    let (offset, limit) = window.map_or((0, None), |w| (w.offset, w.limit));
    if limit.is_some_and(|limit| returned >= limit) {
        return None;
    }
    if offset > 0 {
        (returned > 0).then(|| offset + returned)
    } else {
        Some(returned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_filter() {
        let id = ItemId::from("1234");
        assert_eq!(
            version_filter(&id, &ETag::explicit("etag1")),
            doc! { "_id": "1234", "_etag": "etag1" }
        );
        assert_eq!(
            version_filter(&id, &ETag::Provisional),
            doc! { "_id": "1234", "_etag": { "$exists": false } }
        );
        assert_eq!(
            version_filter(&id, &ETag::explicit("")),
            doc! { "_id": "1234", "_etag": { "$exists": false } }
        );
    }

    #[test]
    fn test_correlation_in_logs() {
        assert_eq!(correlation(&OperationContext::new()), "-");
        let ctx = OperationContext::new()
            .with_correlation_id("req-42")
            .with_timeout(std::time::Duration::from_secs(5));
        let (ctx, _handle) = ctx.with_cancellation();
        assert_eq!(correlation(&ctx), "req-42");
    }

    #[test]
    fn test_deduce_total_without_window() {
        assert_eq!(deduce_total(None, 5), Some(5));
        assert_eq!(deduce_total(None, 0), Some(0));
    }

    #[test]
    fn test_deduce_total_full_page_is_unknown() {
        assert_eq!(deduce_total(Some(&Window::new(0, Some(1))), 1), None);
        assert_eq!(deduce_total(Some(&Window::new(10, Some(5))), 5), None);
    }

    #[test]
    fn test_deduce_total_short_page() {
        assert_eq!(deduce_total(Some(&Window::new(0, Some(10))), 3), Some(3));
        assert_eq!(deduce_total(Some(&Window::new(20, Some(10))), 3), Some(23));
        assert_eq!(deduce_total(Some(&Window::new(20, None)), 4), Some(24));
    }

    #[test]
    fn test_deduce_total_empty_page_past_offset_is_unknown() {
        assert_eq!(deduce_total(Some(&Window::new(20, Some(10))), 0), None);
        assert_eq!(deduce_total(Some(&Window::new(20, None)), 0), None);
    }
}
