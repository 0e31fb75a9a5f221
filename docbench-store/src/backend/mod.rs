use std::fmt::Debug;
use std::sync::Arc;

use crate::document::{Cas, Document, ViewRow};
use crate::error::StoreResult;
use crate::query::{IndexDefinition, IndexedQuery, ViewDefinition};

pub mod couchbase;
pub mod in_memory;

/// A type-erased [`Store`] shared by all workers.
pub type SharedStore = Arc<dyn Store>;

/// Document operations against a connected bucket.
///
/// Implementations must be safe to call concurrently from many workers. Each call is atomic on
/// its own; no locking happens on top of it.
#[async_trait::async_trait]
pub trait Store: Debug + Send + Sync + 'static {
    /// The backend name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Stores a new document, failing with [`StoreError::AlreadyExists`] if the key is taken.
    ///
    /// [`StoreError::AlreadyExists`]: crate::StoreError::AlreadyExists
    async fn create(&self, key: &str, doc: &Document) -> StoreResult<Cas>;

    /// Replaces an existing document if its version still matches `cas`.
    ///
    /// Passing [`Cas::ANY`] replaces unconditionally.
    async fn replace(&self, key: &str, doc: &Document, cas: Cas) -> StoreResult<Cas>;

    /// Stores the document whether or not the key exists.
    async fn upsert(&self, key: &str, doc: &Document) -> StoreResult<Cas>;

    /// Fetches a document by key.
    async fn get(&self, key: &str) -> StoreResult<Document>;

    /// Runs an exact-key query against a view.
    async fn query_view(&self, design_doc: &str, view: &str, key: &str)
    -> StoreResult<Vec<ViewRow>>;

    /// Runs a lookup constrained to a named index, returning the matching documents.
    async fn query_indexed(&self, query: &IndexedQuery) -> StoreResult<Vec<Document>>;
}

/// Administrative calls that create the secondary access paths of a bucket.
#[async_trait::async_trait]
pub trait IndexAdmin: Debug + Send + Sync + 'static {
    /// Creates or overwrites a view.
    async fn create_view(&self, bucket: &str, view: &ViewDefinition) -> StoreResult<()>;

    /// Creates the primary index of the bucket. Succeeds if it already exists.
    async fn create_primary_index(&self, bucket: &str) -> StoreResult<()>;

    /// Drops the named index. Succeeds if it does not exist.
    async fn drop_index(&self, bucket: &str, name: &str) -> StoreResult<()>;

    /// Creates a range-restricted index pinned to one node.
    async fn create_partitioned_index(
        &self,
        bucket: &str,
        index: &IndexDefinition,
    ) -> StoreResult<()>;
}
