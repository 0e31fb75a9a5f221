//! The interchangeable ways of fetching a document by email during the read test.
//!
//! Every strategy implements [`QueryStrategy`] and times only its store call, labelled with the
//! email so latencies can be broken down per key:
//!
//!  - [`ViewStrategy`] (`view_query:<email>`) queries the email view.
//!  - [`PartitionedStrategy`] (`n1ql_query:<email>`) routes to the per-node index owning the id.
//!  - [`KeyLookupStrategy`] (`get:<email>`) fetches by key, bypassing all indexes.

use std::fmt::Debug;

use docbench_store::{Document, IndexedQuery, Store, StoreError};
use thiserror::Error;

use crate::index::{DESIGN_DOC, VIEW_NAME};
use crate::keys::{self, DocId, InvalidEmail};
use crate::partition::PartitionPlan;
use crate::timer::timed;

/// Errors returned by a [`QueryStrategy`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// The store call failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The email does not carry a document key.
    #[error(transparent)]
    InvalidEmail(#[from] InvalidEmail),

    /// The query succeeded but returned no document.
    #[error("no document found for `{0}`")]
    NoMatch(String),

    /// A view row did not have the expected `[key, name]` shape.
    #[error("malformed view row for `{email}`")]
    MalformedRow {
        /// The email that was looked up.
        email: String,
        /// The decoding error.
        #[source]
        source: serde_json::Error,
    },
}

/// Fetches a document by its email address.
#[async_trait::async_trait]
pub trait QueryStrategy: Debug + Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Looks up the document whose `email` field equals `email`.
    async fn fetch(&self, store: &dyn Store, email: &str) -> Result<Document, FetchError>;
}

/// Exact-key lookup on the email view.
#[derive(Clone, Copy, Debug, Default)]
pub struct ViewStrategy;

#[async_trait::async_trait]
impl QueryStrategy for ViewStrategy {
    fn name(&self) -> &'static str {
        "view"
    }

    async fn fetch(&self, store: &dyn Store, email: &str) -> Result<Document, FetchError> {
        let rows = timed(
            format!("view_query:{email}"),
            store.query_view(DESIGN_DOC, VIEW_NAME, email),
        )
        .await?;

        let Some(row) = rows.into_iter().next() else {
            return Err(FetchError::NoMatch(email.to_owned()));
        };
        tracing::debug!(?row);

        let (_key, name): (String, String) =
            serde_json::from_value(row.value).map_err(|source| FetchError::MalformedRow {
                email: email.to_owned(),
                source,
            })?;
        Ok(Document {
            email: email.to_owned(),
            name,
        })
    }
}

/// Lookup through the per-node index that owns the email's id.
#[derive(Clone, Debug)]
pub struct PartitionedStrategy {
    bucket: String,
    plan: PartitionPlan,
}

impl PartitionedStrategy {
    /// Creates the strategy for `bucket`, routing with the same plan the indexes were built with.
    pub fn new(bucket: impl Into<String>, plan: PartitionPlan) -> Self {
        Self {
            bucket: bucket.into(),
            plan,
        }
    }

    /// Builds the query for `email`, constrained to the owning shard's index.
    pub fn query_for(&self, email: &str) -> Result<IndexedQuery, InvalidEmail> {
        let id = DocId::from_email(email)?;
        let shard = self.plan.route(id);

        Ok(IndexedQuery {
            bucket: self.bucket.clone(),
            index: shard.index_name(),
            email: email.to_owned(),
        })
    }
}

#[async_trait::async_trait]
impl QueryStrategy for PartitionedStrategy {
    fn name(&self) -> &'static str {
        "n1ql"
    }

    async fn fetch(&self, store: &dyn Store, email: &str) -> Result<Document, FetchError> {
        let query = self.query_for(email)?;
        tracing::debug!(%query);

        let rows = timed(format!("n1ql_query:{email}"), store.query_indexed(&query)).await?;
        let document = rows
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::NoMatch(email.to_owned()))?;
        tracing::debug!(?document);
        Ok(document)
    }
}

/// Point lookup by the key embedded in the email.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeyLookupStrategy;

#[async_trait::async_trait]
impl QueryStrategy for KeyLookupStrategy {
    fn name(&self) -> &'static str {
        "keys"
    }

    async fn fetch(&self, store: &dyn Store, email: &str) -> Result<Document, FetchError> {
        let key = keys::key_prefix(email)?;
        let document = timed(format!("get:{email}"), store.get(key)).await?;
        tracing::debug!(?document);
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use docbench_store::{IndexAdmin, InMemoryStore, Nodes};

    use super::*;
    use crate::index::{IndexBuilder, email_view};

    fn nodes(count: usize) -> Nodes {
        Nodes::try_from((0..count).map(|i| format!("node{i}")).collect::<Vec<_>>()).unwrap()
    }

    async fn seeded(total: u64) -> InMemoryStore {
        let store = InMemoryStore::new();
        for id in 0..total {
            let doc = Document {
                email: DocId(id).email(),
                name: format!("name{id}"),
            };
            store.create(&DocId(id).key(), &doc).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn view_strategy_decodes_row() {
        let store = seeded(10).await;
        store.create_view("benchmark", &email_view()).await.unwrap();

        let doc = ViewStrategy.fetch(&store, &DocId(4).email()).await.unwrap();
        assert_eq!(doc.email, DocId(4).email());
        assert_eq!(doc.name, "name4");
    }

    #[tokio::test]
    async fn view_strategy_reports_missing_row() {
        let store = seeded(10).await;
        store.create_view("benchmark", &email_view()).await.unwrap();

        let err = ViewStrategy.fetch(&store, &DocId(50).email()).await;
        assert!(matches!(err, Err(FetchError::NoMatch(_))));
    }

    #[tokio::test]
    async fn view_strategy_without_view_fails() {
        let store = seeded(10).await;
        let err = ViewStrategy.fetch(&store, &DocId(4).email()).await;
        assert!(matches!(err, Err(FetchError::Store(StoreError::NotFound(_)))));
    }

    #[test]
    fn partitioned_query_targets_owning_index() {
        let plan = PartitionPlan::new(100, &nodes(4)).unwrap();
        let strategy = PartitionedStrategy::new("benchmark", plan);

        let query = strategy.query_for(&DocId(80).email()).unwrap();
        assert_eq!(query.index, "byEmail3");
        assert_eq!(query.bucket, "benchmark");

        let query = strategy.query_for(&DocId(0).email()).unwrap();
        assert_eq!(query.index, "byEmail0");
    }

    #[tokio::test]
    async fn partitioned_strategy_finds_every_document() {
        let store = seeded(103).await;
        let nodes = nodes(4);
        IndexBuilder::new("benchmark")
            .build(&store, 103, &nodes)
            .await
            .unwrap();

        let plan = PartitionPlan::new(103, &nodes).unwrap();
        let strategy = PartitionedStrategy::new("benchmark", plan);

        // the in-memory index only answers inside its declared range, so the tail finds nothing
        for id in 0..100 {
            let doc = strategy.fetch(&store, &DocId(id).email()).await.unwrap();
            assert_eq!(doc.name, format!("name{id}"));
        }
        for id in 100..103 {
            let err = strategy.fetch(&store, &DocId(id).email()).await;
            assert!(matches!(err, Err(FetchError::NoMatch(_))));
        }
    }

    #[tokio::test]
    async fn partitioned_strategy_rejects_bad_email() {
        let store = seeded(1).await;
        let plan = PartitionPlan::new(10, &nodes(1)).unwrap();
        let err = PartitionedStrategy::new("benchmark", plan)
            .fetch(&store, "someone@joyent.com")
            .await;
        assert!(matches!(err, Err(FetchError::InvalidEmail(_))));
    }

    #[tokio::test]
    async fn key_lookup_returns_document() {
        let store = seeded(100).await;
        let doc = KeyLookupStrategy
            .fetch(&store, &DocId(7).email())
            .await
            .unwrap();
        assert_eq!(doc.email, "00000000000000000007@joyent.com");
    }

    #[tokio::test]
    async fn key_lookup_missing_is_store_error() {
        let store = seeded(10).await;
        let err = KeyLookupStrategy.fetch(&store, &DocId(11).email()).await;
        assert!(matches!(err, Err(FetchError::Store(StoreError::NotFound(_)))));
    }
}
