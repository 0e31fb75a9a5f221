//! The store layer provides the document-store abstraction the benchmark driver talks to.
//!
//! The driver only needs a handful of opaque operations against the cluster: storing and
//! fetching documents, running a view query, running a query against a named index, and a few
//! administrative index calls. These are captured by the [`Store`] and [`IndexAdmin`] traits,
//! which are implemented by:
//!
//!  - [`InMemoryStore`]: a `HashMap`-backed store that also evaluates views and partitioned
//!    indexes. Used in tests and for dry runs.
//!  - [`CouchbaseStore`]: talks to the query and view services of a Couchbase cluster over HTTP.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod backend;
mod document;
mod error;
mod node;
mod query;

pub use backend::couchbase::{CouchbaseConfig, CouchbaseStore};
pub use backend::in_memory::InMemoryStore;
pub use backend::{IndexAdmin, SharedStore, Store};
pub use document::{Cas, Document, ViewRow};
pub use error::{StoreError, StoreResult};
pub use node::{EmptyNodesError, NodeAddress, Nodes};
pub use query::{IndexDefinition, IndexedQuery, ViewDefinition};
