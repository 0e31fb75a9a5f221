//! Creation of the secondary access paths used by the query strategies.
//!
//! The build runs strictly in order, timing each step:
//!
//! 1. the `byEmail` view, mapping `email -> [key, name]`,
//! 2. the primary index of the bucket,
//! 3. one range index per node, covering exactly that node's shard of the id space.
//!
//! Any failure aborts the build. Per-node indexes are dropped before being recreated, ignoring
//! errors, so a build can be repeated against the same bucket.

use std::time::Duration;

use docbench_store::{IndexAdmin, IndexDefinition, Nodes, StoreError, ViewDefinition};
use thiserror::Error;

use crate::partition::{PartitionPlan, PlanError, Shard};
use crate::timer::timed;

/// Design document holding the email view.
pub const DESIGN_DOC: &str = "viewByEmail";

/// Name of the email view.
pub const VIEW_NAME: &str = "byEmail";

/// Map function of the email view.
pub const VIEW_MAP: &str = "function (doc, meta) {emit(doc.email, [meta.id, doc.name]);}";

/// Default time the store may take to build one per-node index.
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Errors that abort an index build.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The id space cannot be partitioned across the nodes.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// Creating the view failed.
    #[error("failed to create view `{DESIGN_DOC}/{VIEW_NAME}`")]
    View(#[source] StoreError),

    /// Creating the primary index failed.
    #[error("failed to create primary index")]
    PrimaryIndex(#[source] StoreError),

    /// Creating a per-node index failed.
    #[error("failed to create index `{name}` on node {node}")]
    Shard {
        /// Name of the failed index.
        name: String,
        /// The node the index was pinned to.
        node: String,
        /// The underlying store error.
        #[source]
        source: StoreError,
    },
}

/// The view the view strategy queries.
pub fn email_view() -> ViewDefinition {
    ViewDefinition {
        design_doc: DESIGN_DOC.to_owned(),
        view: VIEW_NAME.to_owned(),
        map: VIEW_MAP.to_owned(),
    }
}

/// The index definition covering `shard`.
pub fn shard_index(shard: &Shard, build_timeout: Duration) -> IndexDefinition {
    IndexDefinition {
        name: shard.index_name(),
        lower: shard.lower.email(),
        upper: shard.upper.email(),
        node: shard.node.clone(),
        build_timeout,
    }
}

/// Builds the view and indexes over one bucket.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    bucket: String,
    build_timeout: Duration,
}

impl IndexBuilder {
    /// Creates a builder for `bucket` with the default build timeout.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            build_timeout: DEFAULT_BUILD_TIMEOUT,
        }
    }

    /// Overrides how long each per-node index may take to build.
    pub fn build_timeout(mut self, build_timeout: Duration) -> Self {
        self.build_timeout = build_timeout;
        self
    }

    /// Creates the view, the primary index and one index per node over `[0, total_ids)`.
    pub async fn build(
        &self,
        admin: &dyn IndexAdmin,
        total_ids: u64,
        nodes: &Nodes,
    ) -> Result<(), BuildError> {
        let plan = PartitionPlan::new(total_ids, nodes)?;
        let bucket = self.bucket.as_str();

        tracing::info!(bucket, "creating view {DESIGN_DOC}/{VIEW_NAME}");
        timed("prepare_view", admin.create_view(bucket, &email_view()))
            .await
            .map_err(BuildError::View)?;

        tracing::info!(bucket, "creating primary index");
        timed("prepare_primary_index", admin.create_primary_index(bucket))
            .await
            .map_err(BuildError::PrimaryIndex)?;

        for shard in plan.shards() {
            self.build_shard(admin, shard).await?;
        }

        Ok(())
    }

    async fn build_shard(&self, admin: &dyn IndexAdmin, shard: &Shard) -> Result<(), BuildError> {
        let bucket = self.bucket.as_str();
        let index = shard_index(shard, self.build_timeout);

        if let Err(error) = admin.drop_index(bucket, &index.name).await {
            tracing::debug!(
                error = &error as &dyn std::error::Error,
                index = %index.name,
                "failed to drop existing index"
            );
        }

        tracing::info!(
            index = %index.name,
            node = %shard.node,
            lower = %index.lower,
            upper = %index.upper,
            "creating partitioned index"
        );
        timed(
            format!("prepare_index:{}", index.name),
            admin.create_partitioned_index(bucket, &index),
        )
        .await
        .map_err(|source| BuildError::Shard {
            name: index.name.clone(),
            node: shard.node.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use docbench_store::{InMemoryStore, StoreResult};

    use super::*;
    use crate::keys::DocId;

    fn nodes(count: usize) -> Nodes {
        Nodes::try_from((0..count).map(|i| format!("node{i}")).collect::<Vec<_>>()).unwrap()
    }

    #[tokio::test]
    async fn builds_view_and_one_index_per_node() {
        let store = InMemoryStore::new();
        IndexBuilder::new("benchmark")
            .build(&store, 100, &nodes(4))
            .await
            .unwrap();

        assert_eq!(store.view(DESIGN_DOC, VIEW_NAME).unwrap().map, VIEW_MAP);
        assert!(store.has_primary_index());

        let last = store.index("byEmail3").unwrap();
        assert_eq!(last.lower, DocId(75).email());
        assert_eq!(last.upper, DocId(100).email());
        assert_eq!(last.node.as_str(), "node3");
        assert_eq!(last.build_timeout, DEFAULT_BUILD_TIMEOUT);
        assert!(store.index("byEmail4").is_none());
    }

    #[tokio::test]
    async fn rebuild_replaces_existing_indexes() {
        let store = InMemoryStore::new();
        let builder = IndexBuilder::new("benchmark").build_timeout(Duration::from_secs(1));

        builder.build(&store, 100, &nodes(2)).await.unwrap();
        builder.build(&store, 200, &nodes(2)).await.unwrap();

        let first = store.index("byEmail0").unwrap();
        assert_eq!(first.upper, DocId(100).email());
        assert_eq!(first.build_timeout, Duration::from_secs(1));
    }

    #[derive(Debug)]
    struct FailingAdmin {
        inner: InMemoryStore,
        fail_index: &'static str,
    }

    #[async_trait::async_trait]
    impl IndexAdmin for FailingAdmin {
        async fn create_view(&self, bucket: &str, view: &ViewDefinition) -> StoreResult<()> {
            self.inner.create_view(bucket, view).await
        }

        async fn create_primary_index(&self, bucket: &str) -> StoreResult<()> {
            self.inner.create_primary_index(bucket).await
        }

        async fn drop_index(&self, _bucket: &str, name: &str) -> StoreResult<()> {
            Err(StoreError::NotFound(format!("index `{name}`")))
        }

        async fn create_partitioned_index(
            &self,
            bucket: &str,
            index: &IndexDefinition,
        ) -> StoreResult<()> {
            if index.name == self.fail_index {
                return Err(StoreError::NotFound(format!("node {}", index.node)));
            }
            self.inner.create_partitioned_index(bucket, index).await
        }
    }

    #[tokio::test]
    async fn shard_failure_aborts_remaining_shards() {
        let admin = FailingAdmin {
            inner: InMemoryStore::new(),
            fail_index: "byEmail1",
        };
        let err = IndexBuilder::new("benchmark")
            .build(&admin, 100, &nodes(4))
            .await
            .unwrap_err();

        let BuildError::Shard { name, node, .. } = err else {
            panic!("expected shard failure, got {err:?}");
        };
        assert_eq!(name, "byEmail1");
        assert_eq!(node, "node1");

        assert!(admin.inner.index("byEmail0").is_some());
        assert!(admin.inner.index("byEmail2").is_none());
        assert!(admin.inner.index("byEmail3").is_none());
    }

    #[tokio::test]
    async fn too_few_ids_fails_before_any_call() {
        let store = InMemoryStore::new();
        let err = IndexBuilder::new("benchmark")
            .build(&store, 2, &nodes(3))
            .await
            .unwrap_err();

        assert!(matches!(err, BuildError::Plan(_)));
        assert!(store.view(DESIGN_DOC, VIEW_NAME).is_none());
    }
}
