//! Range partitioning of the id space across cluster nodes.
//!
//! The id space `[0, total_ids)` is cut into one contiguous shard per node, each `step` ids
//! wide, where `step = total_ids / nodes` (truncating). The same [`PartitionPlan`] is used to
//! create the per-node indexes and to route lookups to them, so both always agree on which node
//! owns an id.
//!
//! Shard bounds are not clamped. With inexact division the last
//! `total_ids - step * nodes` ids fall outside every shard's declared range; [`PartitionPlan::route`]
//! still sends them to the last node.

use docbench_store::{NodeAddress, Nodes};
use thiserror::Error;

use crate::keys::DocId;

/// Errors from computing a [`PartitionPlan`].
#[derive(Debug, Error)]
pub enum PlanError {
    /// There are fewer ids than nodes, so shards would be empty.
    #[error("cannot partition {total_ids} ids across {nodes} nodes")]
    TooFewIds {
        /// Size of the id space.
        total_ids: u64,
        /// Number of nodes.
        nodes: usize,
    },
}

/// A contiguous id range owned by one node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shard {
    /// Position of the node in the node list.
    pub node_index: usize,
    /// Address of the owning node.
    pub node: NodeAddress,
    /// Inclusive lower bound.
    pub lower: DocId,
    /// Exclusive upper bound.
    pub upper: DocId,
}

impl Shard {
    /// Name of the index covering this shard.
    pub fn index_name(&self) -> String {
        format!("byEmail{}", self.node_index)
    }

    /// Returns `true` if `id` lies within the declared bounds.
    pub fn contains(&self, id: DocId) -> bool {
        self.lower <= id && id < self.upper
    }
}

/// One shard per node over the id space of a run.
#[derive(Clone, Debug)]
pub struct PartitionPlan {
    step: u64,
    shards: Vec<Shard>,
}

impl PartitionPlan {
    /// Partitions `[0, total_ids)` across `nodes` in node order.
    pub fn new(total_ids: u64, nodes: &Nodes) -> Result<Self, PlanError> {
        let step = total_ids / nodes.len() as u64;
        if step == 0 {
            return Err(PlanError::TooFewIds {
                total_ids,
                nodes: nodes.len(),
            });
        }

        let shards = nodes
            .iter()
            .enumerate()
            .map(|(node_index, node)| {
                let lower = node_index as u64 * step;
                Shard {
                    node_index,
                    node: node.clone(),
                    lower: DocId(lower),
                    upper: DocId(lower + step),
                }
            })
            .collect();

        Ok(Self { step, shards })
    }

    /// Width of every shard.
    pub fn step(&self) -> u64 {
        self.step
    }

    /// All shards, in node order.
    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    /// Position of the node owning `id`.
    ///
    /// Ids beyond the last shard are clamped to the last node.
    pub fn route_index(&self, id: DocId) -> usize {
        let index = id.0 / self.step;
        index.min(self.shards.len() as u64 - 1) as usize
    }

    /// The shard owning `id`.
    pub fn route(&self, id: DocId) -> &Shard {
        &self.shards[self.route_index(id)]
    }

    /// Number of ids in `[0, total_ids)` not covered by any shard's declared range.
    pub fn uncovered_tail(&self, total_ids: u64) -> u64 {
        total_ids.saturating_sub(self.step * self.shards.len() as u64)
    }
}
