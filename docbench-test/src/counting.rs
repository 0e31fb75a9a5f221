//! A [`Store`] wrapper that records which keys were written.
//!
//! ```
//! use docbench_store::InMemoryStore;
//! use docbench_test::counting::CountingStore;
//!
//! let store = CountingStore::new(InMemoryStore::new());
//! assert_eq!(store.writes("00000000000000000000"), 0);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use docbench_store::{
    Cas, Document, IndexedQuery, Store, StoreError, StoreResult, ViewRow,
};

#[derive(Debug, Default)]
struct Counts {
    creates: HashMap<String, usize>,
    replaces: HashMap<String, usize>,
}

/// Wraps another store and counts create and replace calls per key.
///
/// Keys listed via [`fail_key`](Self::fail_key) make `create` fail with a non-conflict error,
/// which is useful to exercise per-item error handling.
#[derive(Debug, Clone)]
pub struct CountingStore<S> {
    inner: S,
    counts: Arc<Mutex<Counts>>,
    failing: Arc<Mutex<Vec<String>>>,
}

impl<S> CountingStore<S> {
    /// Wraps `inner`.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            counts: Default::default(),
            failing: Default::default(),
        }
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Makes every create of `key` fail.
    pub fn fail_key(&self, key: impl Into<String>) {
        self.failing.lock().unwrap().push(key.into());
    }

    /// Number of create calls for `key`.
    pub fn creates(&self, key: &str) -> usize {
        let counts = self.counts.lock().unwrap();
        counts.creates.get(key).copied().unwrap_or_default()
    }

    /// Number of replace calls for `key`.
    pub fn replaces(&self, key: &str) -> usize {
        let counts = self.counts.lock().unwrap();
        counts.replaces.get(key).copied().unwrap_or_default()
    }

    /// Number of create and replace calls for `key`.
    pub fn writes(&self, key: &str) -> usize {
        self.creates(key) + self.replaces(key)
    }

    /// Number of distinct keys that saw a create.
    pub fn created_keys(&self) -> usize {
        self.counts.lock().unwrap().creates.len()
    }
}

#[async_trait::async_trait]
impl<S: Store> Store for CountingStore<S> {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn create(&self, key: &str, doc: &Document) -> StoreResult<Cas> {
        *self
            .counts
            .lock()
            .unwrap()
            .creates
            .entry(key.to_owned())
            .or_default() += 1;

        let fails = self.failing.lock().unwrap().iter().any(|k| k == key);
        if fails {
            return Err(StoreError::NotFound(format!("bucket for `{key}`")));
        }
        self.inner.create(key, doc).await
    }

    async fn replace(&self, key: &str, doc: &Document, cas: Cas) -> StoreResult<Cas> {
        *self
            .counts
            .lock()
            .unwrap()
            .replaces
            .entry(key.to_owned())
            .or_default() += 1;
        self.inner.replace(key, doc, cas).await
    }

    async fn upsert(&self, key: &str, doc: &Document) -> StoreResult<Cas> {
        self.inner.upsert(key, doc).await
    }

    async fn get(&self, key: &str) -> StoreResult<Document> {
        self.inner.get(key).await
    }

    async fn query_view(
        &self,
        design_doc: &str,
        view: &str,
        key: &str,
    ) -> StoreResult<Vec<ViewRow>> {
        self.inner.query_view(design_doc, view, key).await
    }

    async fn query_indexed(&self, query: &IndexedQuery) -> StoreResult<Vec<Document>> {
        self.inner.query_indexed(query).await
    }
}
