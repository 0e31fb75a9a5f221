use std::fmt;

use serde::{Deserialize, Serialize};

/// The body of a benchmark document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// The derived email address, which is the secondary-index attribute.
    pub email: String,
    /// A random alphabetic name.
    pub name: String,
}

/// Opaque conflict token identifying a document's current version.
///
/// A replace carrying [`Cas::ANY`] is unconditional.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cas(pub u64);

impl Cas {
    /// Matches any version of the document.
    pub const ANY: Cas = Cas(0);

    /// Returns `true` if this token does not guard a specific version.
    pub fn is_any(self) -> bool {
        self == Self::ANY
    }
}

impl fmt::Display for Cas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row emitted by a view query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewRow {
    /// Key of the document that emitted the row.
    pub id: String,
    /// The emitted key.
    pub key: serde_json::Value,
    /// The emitted value.
    pub value: serde_json::Value,
}
