//! Discovery of the storage cluster's node addresses.
//!
//! Nodes are resolved once at startup, either from a static list or from the service catalog of a
//! Consul agent, and passed down as an immutable [`Nodes`] value.

use anyhow::{Context, Result};
use docbench_store::{NodeAddress, Nodes};
use serde::{Deserialize, Serialize};

/// Where the node list comes from.
///
/// The `type` field in YAML or `__TYPE` in environment variables determines which variant is used.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Discovery {
    /// Look up the nodes registered for a service in the Consul catalog (type `"consul"`).
    ///
    /// # Example
    ///
    /// ```yaml
    /// discovery:
    ///   type: consul
    ///   address: consul:8500
    ///   service: couchbase
    /// ```
    Consul {
        /// Host and port of the Consul HTTP API.
        address: String,
        /// Name of the service whose instances are the cluster nodes.
        service: String,
    },

    /// Use a fixed list of node addresses (type `"static"`).
    ///
    /// # Example
    ///
    /// ```yaml
    /// discovery:
    ///   type: static
    ///   nodes: [10.0.0.1, 10.0.0.2]
    /// ```
    Static {
        /// The node addresses, in order.
        nodes: Vec<String>,
    },
}

impl Default for Discovery {
    fn default() -> Self {
        Self::Consul {
            address: "consul:8500".into(),
            service: "couchbase".into(),
        }
    }
}

/// One entry of `GET /v1/catalog/service/<service>`.
#[derive(Debug, Deserialize)]
pub struct CatalogEntry {
    /// Address of the node the service runs on.
    #[serde(rename = "Address", default)]
    pub address: String,
    /// Address the service registered itself with, empty if it did not set one.
    #[serde(rename = "ServiceAddress", default)]
    pub service_address: String,
}

/// Resolves the node list of the cluster.
pub async fn discover(discovery: &Discovery) -> Result<Nodes> {
    match discovery {
        Discovery::Static { nodes } => {
            Nodes::try_from(nodes.clone()).context("no nodes configured for static discovery")
        }
        Discovery::Consul { address, service } => {
            let url = format!("http://{address}/v1/catalog/service/{service}");
            tracing::debug!(%url, "querying service catalog");

            let entries: Vec<CatalogEntry> = reqwest::get(&url)
                .await
                .and_then(|response| response.error_for_status())
                .with_context(|| format!("failed to query service catalog at {address}"))?
                .json()
                .await
                .context("failed to parse service catalog")?;

            nodes_from_catalog(entries, service)
        }
    }
}

/// Converts catalog entries into the node list, preserving their order.
pub fn nodes_from_catalog(entries: Vec<CatalogEntry>, service: &str) -> Result<Nodes> {
    let nodes = entries
        .into_iter()
        .map(|entry| {
            if entry.service_address.is_empty() {
                NodeAddress::new(entry.address)
            } else {
                NodeAddress::new(entry.service_address)
            }
        })
        .collect();

    Nodes::new(nodes).with_context(|| format!("no nodes found for service `{service}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_nodes_keep_order() {
        let discovery = Discovery::Static {
            nodes: vec!["10.0.0.2".into(), "10.0.0.1".into()],
        };
        let nodes = discover(&discovery).await.unwrap();
        assert_eq!(nodes.first().as_str(), "10.0.0.2");
        assert_eq!(nodes.len(), 2);
    }

    #[tokio::test]
    async fn empty_static_list_fails() {
        let discovery = Discovery::Static { nodes: vec![] };
        assert!(discover(&discovery).await.is_err());
    }

    #[test]
    fn catalog_prefers_service_address() {
        let entries: Vec<CatalogEntry> = serde_json::from_str(
            r#"[
                {"Node": "cb1", "Address": "10.0.0.1", "ServiceAddress": "192.168.0.1"},
                {"Node": "cb2", "Address": "10.0.0.2", "ServiceAddress": ""}
            ]"#,
        )
        .unwrap();

        let nodes = nodes_from_catalog(entries, "couchbase").unwrap();
        assert_eq!(nodes[0].as_str(), "192.168.0.1");
        assert_eq!(nodes[1].as_str(), "10.0.0.2");
    }

    #[test]
    fn empty_catalog_fails() {
        let err = nodes_from_catalog(vec![], "couchbase").unwrap_err();
        assert!(err.to_string().contains("couchbase"));
    }
}
