//! In-memory store for tests and dry runs.
//!
//! This provides a [`Store`] and [`IndexAdmin`] backed by a `HashMap`. Views and partitioned
//! indexes are recorded and evaluated on query. An indexed query only answers from the named
//! index, so an email outside that index's range finds nothing; this store never falls back to
//! the primary index the way a cluster's query planner may. The store is [`Clone`] so tests can
//! hold a handle for direct inspection while the driver owns a shared copy.
//!
//! Views cannot run their map source here. Every registered view projects
//! `email -> [key, name]`, which is the only view the driver creates.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{IndexAdmin, Store};
use crate::document::{Cas, Document, ViewRow};
use crate::error::{StoreError, StoreResult};
use crate::query::{IndexDefinition, IndexedQuery, ViewDefinition};

#[derive(Debug, Default)]
struct Inner {
    documents: HashMap<String, (Document, Cas)>,
    next_cas: u64,
    views: HashMap<(String, String), ViewDefinition>,
    primary_index: bool,
    indexes: HashMap<String, IndexDefinition>,
}

impl Inner {
    fn bump_cas(&mut self) -> Cas {
        self.next_cas += 1;
        Cas(self.next_cas)
    }
}

/// A `HashMap`-backed document store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a clone of the stored document and its conflict token, if present.
    pub fn get_stored(&self, key: &str) -> Option<(Document, Cas)> {
        self.inner.lock().unwrap().documents.get(key).cloned()
    }

    /// Returns the number of stored documents.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().documents.len()
    }

    /// Returns `true` if the store holds no documents.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once the primary index has been created.
    pub fn has_primary_index(&self) -> bool {
        self.inner.lock().unwrap().primary_index
    }

    /// Returns the definition of the named index, if it exists.
    pub fn index(&self, name: &str) -> Option<IndexDefinition> {
        self.inner.lock().unwrap().indexes.get(name).cloned()
    }

    /// Returns the definition of the given view, if it exists.
    pub fn view(&self, design_doc: &str, view: &str) -> Option<ViewDefinition> {
        let key = (design_doc.to_owned(), view.to_owned());
        self.inner.lock().unwrap().views.get(&key).cloned()
    }
}

#[async_trait::async_trait]
impl Store for InMemoryStore {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn create(&self, key: &str, doc: &Document) -> StoreResult<Cas> {
        let mut inner = self.inner.lock().unwrap();
        if let Some((_, cas)) = inner.documents.get(key) {
            return Err(StoreError::AlreadyExists {
                key: key.to_owned(),
                cas: Some(*cas),
            });
        }

        let cas = inner.bump_cas();
        inner.documents.insert(key.to_owned(), (doc.clone(), cas));
        Ok(cas)
    }

    async fn replace(&self, key: &str, doc: &Document, cas: Cas) -> StoreResult<Cas> {
        let mut inner = self.inner.lock().unwrap();
        let current = match inner.documents.get(key) {
            Some((_, current)) => *current,
            None => return Err(StoreError::NotFound(format!("document `{key}`"))),
        };
        if !cas.is_any() && cas != current {
            return Err(StoreError::CasMismatch {
                key: key.to_owned(),
            });
        }

        let cas = inner.bump_cas();
        inner.documents.insert(key.to_owned(), (doc.clone(), cas));
        Ok(cas)
    }

    async fn upsert(&self, key: &str, doc: &Document) -> StoreResult<Cas> {
        let mut inner = self.inner.lock().unwrap();
        let cas = inner.bump_cas();
        inner.documents.insert(key.to_owned(), (doc.clone(), cas));
        Ok(cas)
    }

    async fn get(&self, key: &str) -> StoreResult<Document> {
        let inner = self.inner.lock().unwrap();
        inner
            .documents
            .get(key)
            .map(|(doc, _)| doc.clone())
            .ok_or_else(|| StoreError::NotFound(format!("document `{key}`")))
    }

    async fn query_view(
        &self,
        design_doc: &str,
        view: &str,
        key: &str,
    ) -> StoreResult<Vec<ViewRow>> {
        let inner = self.inner.lock().unwrap();
        let view_key = (design_doc.to_owned(), view.to_owned());
        if !inner.views.contains_key(&view_key) {
            return Err(StoreError::NotFound(format!("view `{design_doc}/{view}`")));
        }

        let mut rows: Vec<_> = inner
            .documents
            .iter()
            .filter(|(_, (doc, _))| doc.email == key)
            .map(|(id, (doc, _))| ViewRow {
                id: id.clone(),
                key: doc.email.clone().into(),
                value: serde_json::json!([id, doc.name]),
            })
            .collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rows)
    }

    async fn query_indexed(&self, query: &IndexedQuery) -> StoreResult<Vec<Document>> {
        let inner = self.inner.lock().unwrap();
        let Some(index) = inner.indexes.get(&query.index) else {
            return Err(StoreError::NotFound(format!("index `{}`", query.index)));
        };
        if !index.covers(&query.email) {
            return Ok(Vec::new());
        }

        Ok(inner
            .documents
            .values()
            .filter(|(doc, _)| doc.email == query.email)
            .map(|(doc, _)| doc.clone())
            .collect())
    }
}

#[async_trait::async_trait]
impl IndexAdmin for InMemoryStore {
    async fn create_view(&self, _bucket: &str, view: &ViewDefinition) -> StoreResult<()> {
        let key = (view.design_doc.clone(), view.view.clone());
        self.inner.lock().unwrap().views.insert(key, view.clone());
        Ok(())
    }

    async fn create_primary_index(&self, _bucket: &str) -> StoreResult<()> {
        self.inner.lock().unwrap().primary_index = true;
        Ok(())
    }

    async fn drop_index(&self, _bucket: &str, name: &str) -> StoreResult<()> {
        self.inner.lock().unwrap().indexes.remove(name);
        Ok(())
    }

    async fn create_partitioned_index(
        &self,
        _bucket: &str,
        index: &IndexDefinition,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.indexes.contains_key(&index.name) {
            return Err(StoreError::Query {
                context: format!("creating index `{}`", index.name),
                code: 4300,
                message: "index already exists".into(),
            });
        }
        inner.indexes.insert(index.name.clone(), index.clone());
        Ok(())
    }
}
