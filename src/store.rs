use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::models::{Document, SuggestedQuestionSet};

type Documents = HashMap<String, Arc<Document>>;
type Suggestions = HashMap<String, Arc<SuggestedQuestionSet>>;

/// In-memory registry of queryable documents, keyed by document id.
#[derive(Clone, Default)]
pub struct DocumentStore {
    documents: Arc<RwLock<Documents>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Documents> {
        self.documents.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Documents> {
        self.documents.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a document unless one with the same content hash is already
    /// present, in which case the existing document is returned.
    pub fn insert(&self, document: Document) -> Arc<Document> {
        let mut guard = self.write();
        if let Some(existing) = guard
            .values()
            .find(|doc| doc.content_hash == document.content_hash)
        {
            return existing.clone();
        }
        let document = Arc::new(document);
        guard.insert(document.id.clone(), document.clone());
        document
    }

    pub fn get(&self, id: &str) -> Option<Arc<Document>> {
        self.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    pub fn find_by_hash(&self, content_hash: &str) -> Option<Arc<Document>> {
        self.read()
            .values()
            .find(|doc| doc.content_hash == content_hash)
            .cloned()
    }

    /// Documents ordered by ingestion time, oldest first.
    pub fn list(&self) -> Vec<Arc<Document>> {
        let mut docs: Vec<Arc<Document>> = self.read().values().cloned().collect();
        docs.sort_by(|a, b| a.ingested_at.cmp(&b.ingested_at).then(a.id.cmp(&b.id)));
        docs
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Document>> {
        self.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Compute-once, read-many suggestion sets keyed by document id.
///
/// Population is cache-aside: the value is computed outside the lock and the
/// last writer wins, so two concurrent misses for the same document may both
/// call the model.
#[derive(Clone, Default)]
pub struct SuggestionCache {
    entries: Arc<RwLock<Suggestions>>,
}

impl SuggestionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> RwLockWriteGuard<'_, Suggestions> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, document_id: &str) -> Option<Arc<SuggestedQuestionSet>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(document_id)
            .cloned()
    }

    pub fn put(&self, set: SuggestedQuestionSet) -> Arc<SuggestedQuestionSet> {
        let set = Arc::new(set);
        self.write().insert(set.document_id.clone(), set.clone());
        set
    }

    /// Returns the cached set or computes one. The computed set is stored
    /// only if `is_live` still holds once the write lock is taken, so an
    /// `invalidate` issued after the owner is gone cannot be undone by a
    /// computation that was already running.
    pub async fn get_or_try_insert_with<F, Fut, E, L>(
        &self,
        document_id: &str,
        is_live: L,
        compute: F,
    ) -> Result<Arc<SuggestedQuestionSet>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SuggestedQuestionSet, E>>,
        L: Fn() -> bool,
    {
        if let Some(hit) = self.get(document_id) {
            tracing::debug!(document_id, "suggestion cache hit");
            return Ok(hit);
        }

        let set = Arc::new(compute().await?);
        let mut guard = self.write();
        if is_live() {
            guard.insert(set.document_id.clone(), set.clone());
        } else {
            tracing::debug!(document_id, "owner removed during computation; not caching");
        }
        Ok(set)
    }

    pub fn invalidate(&self, document_id: &str) -> bool {
        self.write().remove(document_id).is_some()
    }
}
