use thiserror::Error;

use crate::document::Cas;

/// Errors that can occur when talking to the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A create was attempted for a key that already holds a document.
    ///
    /// Carries the current conflict token of the stored document if the store reported one.
    #[error("document `{key}` already exists")]
    AlreadyExists {
        /// The conflicting key.
        key: String,
        /// The conflict token of the existing document, if known.
        cas: Option<Cas>,
    },

    /// The requested document, view or index does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// A conditional replace lost against a concurrent modification.
    #[error("conflict token mismatch for `{key}`")]
    CasMismatch {
        /// The key that was modified concurrently.
        key: String,
    },

    /// All errors stemming from the reqwest client.
    ///
    /// These are network errors or non-success HTTP statuses returned by the cluster's REST
    /// services.
    #[error("reqwest error: {context}")]
    Reqwest {
        /// What the store was doing when the request failed.
        context: String,
        /// The underlying client error.
        #[source]
        cause: reqwest::Error,
    },

    /// Errors related to de/serialization of documents and query results.
    #[error("serde error: {context}")]
    Serde {
        /// What was being de/serialized.
        context: String,
        /// The underlying serde error.
        #[source]
        cause: serde_json::Error,
    },

    /// The query service accepted the request but reported an error for the statement.
    #[error("query error {code} during {context}: {message}")]
    Query {
        /// What the store was doing when the statement failed.
        context: String,
        /// The numeric error code reported by the query service.
        code: u32,
        /// The message reported by the query service.
        message: String,
    },
}

impl StoreError {
    pub(crate) fn reqwest(context: impl Into<String>, cause: reqwest::Error) -> Self {
        Self::Reqwest {
            context: context.into(),
            cause,
        }
    }

    pub(crate) fn serde(context: impl Into<String>, cause: serde_json::Error) -> Self {
        Self::Serde {
            context: context.into(),
            cause,
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
