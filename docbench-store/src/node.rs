use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reachable address of one storage-cluster member, without port.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeAddress(String);

impl NodeAddress {
    /// Creates a node address from a host name or IP.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Returns the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeAddress {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

/// Error returned when constructing [`Nodes`] from an empty list.
#[derive(Debug, Error)]
#[error("the node list must not be empty")]
pub struct EmptyNodesError;

/// The ordered, non-empty list of cluster nodes for a run.
///
/// Discovered once at startup and never mutated afterwards. Cloning is cheap and shares the
/// underlying list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nodes(Arc<[NodeAddress]>);

impl Nodes {
    /// Creates the node list, rejecting an empty one.
    pub fn new(nodes: Vec<NodeAddress>) -> Result<Self, EmptyNodesError> {
        if nodes.is_empty() {
            return Err(EmptyNodesError);
        }
        Ok(Self(nodes.into()))
    }

    /// The first node, used for administrative calls.
    pub fn first(&self) -> &NodeAddress {
        // non-empty by construction
        &self.0[0]
    }
}

impl Deref for Nodes {
    type Target = [NodeAddress];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<Vec<String>> for Nodes {
    type Error = EmptyNodesError;

    fn try_from(nodes: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(nodes.into_iter().map(NodeAddress::new).collect())
    }
}
