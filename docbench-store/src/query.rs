use std::fmt;
use std::time::Duration;

use crate::node::NodeAddress;

/// A map-phase view over a bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewDefinition {
    /// Name of the design document holding the view.
    pub design_doc: String,
    /// Name of the view inside the design document.
    pub view: String,
    /// Source of the map function.
    pub map: String,
}

/// A secondary index on the `email` attribute restricted to a half-open range and pinned to one
/// node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexDefinition {
    /// Name of the index.
    pub name: String,
    /// Inclusive lower bound of the indexed emails.
    pub lower: String,
    /// Exclusive upper bound of the indexed emails.
    pub upper: String,
    /// The node hosting the index.
    pub node: NodeAddress,
    /// How long the store may take to build the index.
    pub build_timeout: Duration,
}

impl IndexDefinition {
    /// Returns `true` if `email` falls into the indexed range.
    pub fn covers(&self, email: &str) -> bool {
        self.lower.as_str() <= email && email < self.upper.as_str()
    }
}

/// An exact-match email lookup constrained to one named index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexedQuery {
    /// The bucket to query.
    pub bucket: String,
    /// The index the query must use.
    pub index: String,
    /// The email to look up.
    pub email: String,
}

impl IndexedQuery {
    /// Renders the statement with the email as the named parameter `$email`.
    pub fn statement(&self) -> String {
        format!(
            "SELECT META(d).id AS id, d.email, d.name FROM `{}` AS d USE INDEX (`{}`) WHERE d.email = $email",
            self.bucket, self.index
        )
    }
}

impl fmt::Display for IndexedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [$email={:?}]", self.statement(), self.email)
    }
}
