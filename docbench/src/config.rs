//! Configuration for the benchmark driver.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Command line flags
//! 2. Environment variables (prefixed with `DOCBENCH__`)
//! 3. YAML configuration file (specified via `--config`)
//! 4. Defaults
//!
//! See [`Config`] for a description of all configuration fields and their defaults.
//!
//! # Environment Variables
//!
//! Environment variables use `DOCBENCH__` as a prefix and double underscores (`__`) to denote
//! nested configuration structures. For example:
//!
//! - `DOCBENCH__TOTAL_DOCS=100000` sets the number of documents
//! - `DOCBENCH__DISCOVERY__TYPE=static` selects a static node list
//! - `DOCBENCH__DISCOVERY__NODES=[10.0.0.1,10.0.0.2]` sets the nodes
//!
//! # YAML Configuration File
//!
//! The above configuration in YAML format would look like this:
//!
//! ```yaml
//! total_docs: 100000
//!
//! discovery:
//!   type: static
//!   nodes: [10.0.0.1, 10.0.0.2]
//! ```

use std::fmt;
use std::path::Path;
use std::thread::available_parallelism;
use std::time::Duration;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use secrecy::{CloneableSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::discovery::Discovery;
use crate::index::DEFAULT_BUILD_TIMEOUT;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "DOCBENCH__";

/// REST API password of the cluster.
///
/// Only ever held inside a [`SecretBox`], which keeps it out of `Debug` output and zeroes it on
/// drop.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Password(String);

impl Password {
    /// Wraps `password` for storage in [`Config`].
    pub fn secret(password: impl Into<String>) -> SecretBox<Self> {
        SecretBox::new(Box::new(Self(password.into())))
    }

    /// The password as sent in basic authentication.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(..)")
    }
}

impl CloneableSecret for Password {}
impl SerializableSecret for Password {}
impl Zeroize for Password {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// Document store backend.
///
/// The `type` field in YAML or `__TYPE` in environment variables determines which variant is used.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Storage {
    /// A Couchbase cluster reached over its REST services (type `"couchbase"`).
    ///
    /// # Example
    ///
    /// ```yaml
    /// store:
    ///   type: couchbase
    ///   query_port: 8093
    ///   request_timeout: 30s
    /// ```
    Couchbase {
        /// Port of the cluster manager, used to pin indexes to nodes.
        ///
        /// # Default
        ///
        /// `8091`
        #[serde(default = "default_admin_port")]
        admin_port: u16,

        /// Port of the view service.
        ///
        /// # Default
        ///
        /// `8092`
        #[serde(default = "default_view_port")]
        view_port: u16,

        /// Port of the query service.
        ///
        /// # Default
        ///
        /// `8093`
        #[serde(default = "default_query_port")]
        query_port: u16,

        /// Timeout for document and query requests.
        ///
        /// # Default
        ///
        /// `30s`
        #[serde(default = "default_request_timeout", with = "humantime_serde")]
        request_timeout: Duration,
    },

    /// A process-local in-memory store (type `"memory"`).
    ///
    /// Its contents are lost when the process exits, so this is only useful to dry-run the load
    /// and index phases.
    Memory,
}

fn default_admin_port() -> u16 {
    8091
}

fn default_view_port() -> u16 {
    8092
}

fn default_query_port() -> u16 {
    8093
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for Storage {
    fn default() -> Self {
        Self::Couchbase {
            admin_port: default_admin_port(),
            view_port: default_view_port(),
            query_port: default_query_port(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Log output format.
///
/// Latency records are not affected by this; they are always written to stdout as plain
/// `<label>,<milliseconds>` lines.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    Pretty,

    /// Simplified plain text output.
    Simplified,

    /// Dump out JSON lines.
    Json,
}

/// (De)serializes a [`LevelFilter`] by its lowercase name, accepting any case on input.
mod level_name {
    use serde::de::{self, Unexpected};
    use serde::{Deserialize, Deserializer, Serializer};
    use tracing::level_filters::LevelFilter;

    pub fn serialize<S: Serializer>(level: &LevelFilter, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&level.to_string().to_ascii_lowercase())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<LevelFilter, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(|_| {
            de::Error::invalid_value(
                Unexpected::Str(&name),
                &"one of off, error, warn, info, debug, trace",
            )
        })
    }
}

/// Logging configuration.
///
/// Diagnostics are always written to stderr.
#[derive(Debug, Deserialize, Serialize)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// The `RUST_LOG` environment variable provides more granular control per module if needed.
    /// The `--debug` flag sets this to `DEBUG`.
    ///
    /// # Default
    ///
    /// `INFO`
    ///
    /// # Environment Variable
    ///
    /// `DOCBENCH__LOGGING__LEVEL`
    #[serde(with = "level_name")]
    pub level: LevelFilter,

    /// Log output format.
    ///
    /// # Default
    ///
    /// `Auto` (pretty for TTY, simplified otherwise)
    ///
    /// # Environment Variable
    ///
    /// `DOCBENCH__LOGGING__FORMAT`
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Runtime configuration for the Tokio async runtime.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Runtime {
    /// Number of worker threads driving the benchmark workers.
    ///
    /// # Default
    ///
    /// Defaults to the number of CPU cores on the host machine.
    ///
    /// # Environment Variable
    ///
    /// `DOCBENCH__RUNTIME__WORKER_THREADS`
    pub worker_threads: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            worker_threads: available_parallelism().map_or(1, |n| n.get()),
        }
    }
}

/// Main configuration struct for the benchmark driver.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Number of documents; ids range over `[0, total_docs)`.
    ///
    /// # Default
    ///
    /// `1000`
    ///
    /// # Environment Variable
    ///
    /// `DOCBENCH__TOTAL_DOCS`
    pub total_docs: u64,

    /// Number of concurrent workers in the load and read-test phases.
    ///
    /// # Default
    ///
    /// `10`
    ///
    /// # Environment Variable
    ///
    /// `DOCBENCH__CONCURRENCY`
    pub concurrency: usize,

    /// Name of the bucket holding the documents.
    ///
    /// # Default
    ///
    /// `"benchmark"`
    pub bucket: String,

    /// REST API user of the cluster.
    ///
    /// # Default
    ///
    /// `"Administrator"`
    pub username: String,

    /// REST API password of the cluster. Redacted from logs.
    ///
    /// # Default
    ///
    /// `"password"`
    ///
    /// # Environment Variable
    ///
    /// `DOCBENCH__PASSWORD`
    pub password: SecretBox<Password>,

    /// How long the store may take to build one per-node index.
    ///
    /// # Default
    ///
    /// `5m`
    #[serde(with = "humantime_serde")]
    pub index_build_timeout: Duration,

    /// Document store backend. See [`Storage`].
    pub store: Storage,

    /// Source of the cluster's node list. See [`Discovery`].
    pub discovery: Discovery,

    /// Logging configuration. See [`Logging`].
    pub logging: Logging,

    /// Runtime configuration. See [`Runtime`].
    pub runtime: Runtime,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            total_docs: 1000,
            concurrency: 10,
            bucket: "benchmark".into(),
            username: "Administrator".into(),
            password: Password::secret("password"),
            index_build_timeout: DEFAULT_BUILD_TIMEOUT,
            store: Storage::default(),
            discovery: Discovery::default(),
            logging: Logging::default(),
            runtime: Runtime::default(),
        }
    }
}

/// Values given on the command line, taking precedence over every other source.
#[derive(Debug, Default, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_docs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Config {
    /// Loads the configuration from defaults, `path`, the environment and `overrides`.
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Serialized::defaults(overrides))
            .extract()?;

        anyhow::ensure!(config.total_docs > 0, "total_docs must be positive");
        anyhow::ensure!(config.concurrency > 0, "concurrency must be positive");
        Ok(config)
    }
}
