use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use argh::FromArgs;
use docbench_store::{
    CouchbaseConfig, CouchbaseStore, InMemoryStore, IndexAdmin, Nodes, SharedStore,
};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::config::{Config, Overrides, Storage};
use crate::index::IndexBuilder;
use crate::partition::PartitionPlan;
use crate::strategy::{KeyLookupStrategy, PartitionedStrategy, ViewStrategy};
use crate::{discovery, load, observability, runner};

/// Load, index and query benchmark for a document store cluster.
///
/// Latency records are written to stdout as `<label>,<milliseconds>` lines, diagnostics to stderr.
#[derive(Debug, FromArgs)]
pub struct Args {
    /// path to the YAML configuration file
    #[argh(option)]
    pub config: Option<PathBuf>,

    /// number of documents
    #[argh(option, short = 'i')]
    pub docs: Option<u64>,

    /// number of concurrent workers
    #[argh(option, short = 'c')]
    pub concurrency: Option<usize>,

    /// name of the bucket
    #[argh(option, short = 'b')]
    pub bucket: Option<String>,

    /// REST API user
    #[argh(option, short = 'u')]
    pub username: Option<String>,

    /// REST API password
    #[argh(option, short = 'p')]
    pub password: Option<String>,

    /// enable debug logging
    #[argh(switch)]
    pub debug: bool,

    /// load documents into the bucket
    #[argh(switch)]
    pub load: bool,

    /// create the email view and the per-node indexes
    #[argh(switch)]
    pub index: bool,

    /// read test through the email view
    #[argh(switch)]
    pub view: bool,

    /// read test through the per-node indexes
    #[argh(switch)]
    pub n1ql: bool,

    /// read test through direct key lookups
    #[argh(switch)]
    pub keys: bool,
}

/// The phase a run executes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Bulk load of all documents.
    Load,
    /// Creation of the view and the per-node indexes.
    Index,
    /// Read test using [`ViewStrategy`].
    View,
    /// Read test using [`PartitionedStrategy`].
    N1ql,
    /// Read test using [`KeyLookupStrategy`].
    Keys,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = match self {
            Mode::Load => "--load",
            Mode::Index => "--index",
            Mode::View => "--view",
            Mode::N1ql => "--n1ql",
            Mode::Keys => "--keys",
        };
        f.write_str(flag)
    }
}

/// The command line did not select exactly one mode.
#[derive(Debug, Error)]
pub enum ModeError {
    /// No mode flag was given.
    #[error("one of --load, --index, --view, --n1ql or --keys is required")]
    Missing,
    /// More than one mode flag was given.
    #[error("only one mode may be given, got {first} and {second}")]
    Conflicting {
        /// The first mode flag.
        first: Mode,
        /// The second mode flag.
        second: Mode,
    },
}

impl Args {
    /// Returns the single mode selected on the command line.
    pub fn mode(&self) -> Result<Mode, ModeError> {
        let flags = [
            (self.load, Mode::Load),
            (self.index, Mode::Index),
            (self.view, Mode::View),
            (self.n1ql, Mode::N1ql),
            (self.keys, Mode::Keys),
        ];
        let mut selected = flags.into_iter().filter(|(set, _)| *set).map(|(_, mode)| mode);

        match (selected.next(), selected.next()) {
            (None, _) => Err(ModeError::Missing),
            (Some(mode), None) => Ok(mode),
            (Some(first), Some(second)) => Err(ModeError::Conflicting { first, second }),
        }
    }

    /// Configuration values given as flags.
    pub fn overrides(&self) -> Overrides {
        Overrides {
            total_docs: self.docs,
            concurrency: self.concurrency,
            bucket: self.bucket.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

/// Bootstrap the runtime and execute the selected mode.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();
    let mode = args.mode()?;

    let mut config = Config::load(args.config.as_deref(), &args.overrides())?;
    if args.debug {
        config.logging.level = LevelFilter::DEBUG;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("docbench-rt")
        .enable_all()
        .worker_threads(config.runtime.worker_threads)
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config.logging);
    tracing::debug!(?config);

    // the error is reported once, by `main`
    runtime.block_on(run(mode, config))
}

/// Discovers the cluster, connects to the store and runs `mode` to completion.
///
/// Read tests never complete.
pub async fn run(mode: Mode, config: Config) -> Result<()> {
    let nodes = discovery::discover(&config.discovery)
        .await
        .context("failed to discover cluster nodes")?;
    tracing::info!(nodes = nodes.len(), first = %nodes.first(), "discovered cluster");

    let backend = connect(&config, &nodes)?;
    tracing::info!(store = backend.store.name(), bucket = %config.bucket, "connected");
    let total_docs = config.total_docs;
    let workers = config.concurrency;

    match mode {
        Mode::Load => {
            let summary = load::load(backend.store, total_docs, workers).await;
            tracing::info!(
                created = summary.created,
                replaced = summary.replaced,
                failed = summary.failed,
                "load finished"
            );
            Ok(())
        }
        Mode::Index => {
            IndexBuilder::new(config.bucket.as_str())
                .build_timeout(config.index_build_timeout)
                .build(backend.admin.as_ref(), total_docs, &nodes)
                .await
                .context("failed to build indexes")?;
            tracing::info!(nodes = nodes.len(), "indexes built");
            Ok(())
        }
        Mode::View => runner::run(backend.store, ViewStrategy, total_docs, workers).await,
        Mode::N1ql => {
            let plan = PartitionPlan::new(total_docs, &nodes)?;
            let strategy = PartitionedStrategy::new(config.bucket.as_str(), plan);
            runner::run(backend.store, strategy, total_docs, workers).await
        }
        Mode::Keys => runner::run(backend.store, KeyLookupStrategy, total_docs, workers).await,
    }
}

/// The configured backend, seen through both of its interfaces.
#[derive(Debug)]
struct Backend {
    store: SharedStore,
    admin: Arc<dyn IndexAdmin>,
}

fn connect(config: &Config, nodes: &Nodes) -> Result<Backend> {
    match config.store {
        Storage::Couchbase {
            admin_port,
            view_port,
            query_port,
            request_timeout,
        } => {
            let store = CouchbaseStore::new(CouchbaseConfig {
                nodes: nodes.clone(),
                bucket: config.bucket.clone(),
                username: config.username.clone(),
                password: SecretString::from(config.password.expose_secret().as_str()),
                admin_port,
                view_port,
                query_port,
                request_timeout,
            })
            .context("failed to connect to cluster")?;

            let store = Arc::new(store);
            Ok(Backend {
                store: store.clone(),
                admin: store,
            })
        }
        Storage::Memory => {
            tracing::warn!("using the in-memory store, documents are lost on exit");
            let store = Arc::new(InMemoryStore::new());
            Ok(Backend {
                store: store.clone(),
                admin: store,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::from_args(&["docbench"], args).unwrap()
    }

    #[test]
    fn single_mode_is_selected() {
        assert_eq!(parse(&["--load"]).mode().unwrap(), Mode::Load);
        assert_eq!(parse(&["--index"]).mode().unwrap(), Mode::Index);
        assert_eq!(parse(&["--view"]).mode().unwrap(), Mode::View);
        assert_eq!(parse(&["--n1ql"]).mode().unwrap(), Mode::N1ql);
        assert_eq!(parse(&["--keys"]).mode().unwrap(), Mode::Keys);
    }

    #[test]
    fn missing_mode_is_rejected() {
        let err = parse(&["-i", "10"]).mode().unwrap_err();
        assert!(matches!(err, ModeError::Missing));
    }

    #[test]
    fn conflicting_modes_are_rejected() {
        let err = parse(&["--view", "--load"]).mode().unwrap_err();
        let ModeError::Conflicting { first, second } = err else {
            panic!("expected conflict, got {err:?}");
        };
        assert_eq!((first, second), (Mode::Load, Mode::View));
        assert_eq!(
            err_message(&["--n1ql", "--keys"]),
            "only one mode may be given, got --n1ql and --keys"
        );
    }

    fn err_message(args: &[&str]) -> String {
        parse(args).mode().unwrap_err().to_string()
    }

    #[test]
    fn flags_become_overrides() {
        let args = parse(&[
            "--keys", "-i", "5000", "-c", "32", "-b", "users", "-u", "admin", "-p", "secret",
            "--debug",
        ]);
        assert!(args.debug);

        let overrides = args.overrides();
        assert_eq!(overrides.total_docs, Some(5000));
        assert_eq!(overrides.concurrency, Some(32));
        assert_eq!(overrides.bucket.as_deref(), Some("users"));
        assert_eq!(overrides.username.as_deref(), Some("admin"));
        assert_eq!(overrides.password.as_deref(), Some("secret"));
    }

    #[test]
    fn unset_flags_do_not_override() {
        let overrides = parse(&["--load"]).overrides();
        assert!(overrides.total_docs.is_none());
        assert!(overrides.bucket.is_none());
    }

    #[tokio::test]
    async fn load_against_memory_store() {
        docbench_test::tracing::init();

        let config = Config {
            total_docs: 20,
            concurrency: 4,
            store: Storage::Memory,
            discovery: crate::discovery::Discovery::Static {
                nodes: vec!["10.0.0.1".into(), "10.0.0.2".into()],
            },
            ..Default::default()
        };
        run(Mode::Load, config).await.unwrap();
    }

    #[test]
    fn memory_backend_serves_both_interfaces() {
        let config = Config {
            store: Storage::Memory,
            ..Default::default()
        };
        let nodes = Nodes::try_from(vec!["10.0.0.1".to_owned()]).unwrap();

        let backend = connect(&config, &nodes).unwrap();
        assert_eq!(backend.store.name(), "in-memory");
    }

    #[tokio::test]
    async fn index_fails_with_too_few_documents() {
        let config = Config {
            total_docs: 1,
            store: Storage::Memory,
            discovery: crate::discovery::Discovery::Static {
                nodes: vec!["10.0.0.1".into(), "10.0.0.2".into()],
            },
            ..Default::default()
        };
        let error = run(Mode::Index, config).await.unwrap_err();
        assert_eq!(
            format!("{error:#}"),
            "failed to build indexes: cannot partition 1 ids across 2 nodes"
        );
    }
}
