//! Store implementation against the REST services of a Couchbase cluster.
//!
//! Document operations and index DDL go through the query service, views through the view
//! service. Both are plain HTTP with basic authentication, so the only client needed is
//! [`reqwest`].

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{IndexAdmin, Store};
use crate::document::{Cas, Document, ViewRow};
use crate::error::{StoreError, StoreResult};
use crate::node::{NodeAddress, Nodes};
use crate::query::{IndexDefinition, IndexedQuery, ViewDefinition};

/// User agent string used for outgoing requests.
const USER_AGENT: &str = concat!("docbench/", env!("CARGO_PKG_VERSION"));

/// Query service code for an `INSERT` hitting an existing key.
const DUPLICATE_KEY: u32 = 12009;
/// Query service code for creating an index that already exists.
const INDEX_EXISTS: u32 = 4300;
/// Query service code for dropping an index that does not exist.
const INDEX_NOT_FOUND: u32 = 12016;

/// Extra time granted to the HTTP request on top of an index build timeout.
const BUILD_TIMEOUT_SLACK: Duration = Duration::from_secs(10);

/// Connection settings for [`CouchbaseStore`].
#[derive(Debug)]
pub struct CouchbaseConfig {
    /// The cluster members. Queries are spread across all of them, DDL goes to the first.
    pub nodes: Nodes,
    /// The bucket holding the benchmark documents.
    pub bucket: String,
    /// REST API user.
    pub username: String,
    /// REST API password.
    pub password: SecretString,
    /// Port of the cluster manager, used to pin indexes to nodes.
    pub admin_port: u16,
    /// Port of the view service.
    pub view_port: u16,
    /// Port of the query service.
    pub query_port: u16,
    /// Timeout for regular requests.
    pub request_timeout: Duration,
}

/// A [`Store`] and [`IndexAdmin`] backed by a Couchbase cluster.
pub struct CouchbaseStore {
    client: reqwest::Client,
    config: CouchbaseConfig,
    next_node: AtomicUsize,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    errors: Vec<QueryErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct QueryErrorEntry {
    code: u32,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct CasRow {
    cas: Cas,
}

#[derive(Debug, Deserialize)]
struct ViewResponse {
    rows: Vec<ViewRow>,
}

impl CouchbaseStore {
    /// Creates the store and its HTTP client.
    pub fn new(config: CouchbaseConfig) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()
            .map_err(|cause| StoreError::reqwest("building http client", cause))?;

        Ok(Self {
            client,
            config,
            next_node: AtomicUsize::new(0),
        })
    }

    fn bucket(&self) -> &str {
        &self.config.bucket
    }

    /// Picks the next node for a query, round-robin.
    fn query_node(&self) -> &NodeAddress {
        let nodes = &self.config.nodes;
        let index = self.next_node.fetch_add(1, Ordering::Relaxed) % nodes.len();
        &nodes[index]
    }

    fn query_url(&self, node: &NodeAddress) -> String {
        format!("http://{node}:{}/query/service", self.config.query_port)
    }

    fn view_url(&self, node: &NodeAddress, path: &str) -> String {
        format!("http://{node}:{}/{}/{path}", self.config.view_port, self.bucket())
    }

    /// Runs a statement against the query service and returns its result rows.
    ///
    /// Named arguments are passed as `$name` form fields holding JSON values.
    async fn execute(
        &self,
        context: &str,
        node: &NodeAddress,
        statement: &str,
        args: &[(&str, Value)],
        timeout: Option<Duration>,
    ) -> StoreResult<Vec<Value>> {
        let form = form_fields(statement, args, timeout);
        let mut request = self
            .client
            .post(self.query_url(node))
            .basic_auth(
                &self.config.username,
                Some(self.config.password.expose_secret()),
            )
            .form(&form);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout + BUILD_TIMEOUT_SLACK);
        }

        let response = request
            .send()
            .await
            .map_err(|cause| StoreError::reqwest(context, cause))?;
        let body = response
            .bytes()
            .await
            .map_err(|cause| StoreError::reqwest(context, cause))?;
        tracing::trace!(context, body = %String::from_utf8_lossy(&body));

        parse_response(context, &body)
    }

    /// Runs a DDL statement against the first node.
    async fn execute_ddl(
        &self,
        context: &str,
        statement: &str,
        timeout: Option<Duration>,
    ) -> StoreResult<()> {
        tracing::debug!(statement, "executing index statement");
        let node = self.config.nodes.first();
        self.execute(context, node, statement, &[], timeout).await?;
        Ok(())
    }

    fn first_cas(context: &str, rows: Vec<Value>) -> StoreResult<Option<Cas>> {
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        let row: CasRow =
            serde_json::from_value(row).map_err(|cause| StoreError::serde(context, cause))?;
        Ok(Some(row.cas))
    }

    fn doc_value(context: &str, doc: &Document) -> StoreResult<Value> {
        serde_json::to_value(doc).map_err(|cause| StoreError::serde(context, cause))
    }
}

impl fmt::Debug for CouchbaseStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CouchbaseStore")
            .field("nodes", &self.config.nodes)
            .field("bucket", &self.config.bucket)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Store for CouchbaseStore {
    fn name(&self) -> &'static str {
        "couchbase"
    }

    #[tracing::instrument(level = "trace", skip(self, doc))]
    async fn create(&self, key: &str, doc: &Document) -> StoreResult<Cas> {
        let context = format!("inserting `{key}`");
        let statement = insert_statement(self.bucket());
        let args = [("key", json!(key)), ("doc", Self::doc_value(&context, doc)?)];

        let rows = self
            .execute(&context, self.query_node(), &statement, &args, None)
            .await
            .map_err(|error| conflict_on_duplicate(key, error))?;
        Ok(Self::first_cas(&context, rows)?.unwrap_or_default())
    }

    #[tracing::instrument(level = "trace", skip(self, doc))]
    async fn replace(&self, key: &str, doc: &Document, cas: Cas) -> StoreResult<Cas> {
        let context = format!("replacing `{key}`");
        let statement = replace_statement(self.bucket(), cas);
        let args = [
            ("key", json!(key)),
            ("email", json!(doc.email)),
            ("name", json!(doc.name)),
            ("cas", json!(cas.0)),
        ];

        let rows = self
            .execute(&context, self.query_node(), &statement, &args, None)
            .await?;
        match Self::first_cas(&context, rows)? {
            Some(cas) => Ok(cas),
            None if cas.is_any() => Err(StoreError::NotFound(format!("document `{key}`"))),
            None => Err(StoreError::CasMismatch {
                key: key.to_owned(),
            }),
        }
    }

    #[tracing::instrument(level = "trace", skip(self, doc))]
    async fn upsert(&self, key: &str, doc: &Document) -> StoreResult<Cas> {
        let context = format!("upserting `{key}`");
        let statement = upsert_statement(self.bucket());
        let args = [("key", json!(key)), ("doc", Self::doc_value(&context, doc)?)];

        let rows = self
            .execute(&context, self.query_node(), &statement, &args, None)
            .await?;
        Ok(Self::first_cas(&context, rows)?.unwrap_or_default())
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn get(&self, key: &str) -> StoreResult<Document> {
        let context = format!("getting `{key}`");
        let statement = format!(
            "SELECT d.email, d.name FROM `{}` AS d USE KEYS $key",
            self.bucket()
        );
        let args = [("key", json!(key))];

        let rows = self
            .execute(&context, self.query_node(), &statement, &args, None)
            .await?;
        let Some(row) = rows.into_iter().next() else {
            return Err(StoreError::NotFound(format!("document `{key}`")));
        };
        serde_json::from_value(row).map_err(|cause| StoreError::serde(context, cause))
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn query_view(
        &self,
        design_doc: &str,
        view: &str,
        key: &str,
    ) -> StoreResult<Vec<ViewRow>> {
        let context = format!("querying view `{design_doc}/{view}`");
        let url = self.view_url(
            self.query_node(),
            &format!("_design/{design_doc}/_view/{view}"),
        );
        let key = json!(key).to_string();

        let response = self
            .client
            .get(url)
            .basic_auth(
                &self.config.username,
                Some(self.config.password.expose_secret()),
            )
            .query(&[("key", key.as_str())])
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|cause| StoreError::reqwest(&context, cause))?;

        let response: ViewResponse = response
            .json()
            .await
            .map_err(|cause| StoreError::reqwest(&context, cause))?;
        Ok(response.rows)
    }

    #[tracing::instrument(level = "trace", skip(self), fields(index = %query.index))]
    async fn query_indexed(&self, query: &IndexedQuery) -> StoreResult<Vec<Document>> {
        let context = format!("querying index `{}`", query.index);
        let args = [("email", json!(query.email))];

        let rows = self
            .execute(&context, self.query_node(), &query.statement(), &args, None)
            .await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(|c| StoreError::serde(&context, c)))
            .collect()
    }
}

#[async_trait::async_trait]
impl IndexAdmin for CouchbaseStore {
    async fn create_view(&self, bucket: &str, view: &ViewDefinition) -> StoreResult<()> {
        let context = format!("creating view `{}/{}`", view.design_doc, view.view);
        let node = self.config.nodes.first();
        let url = format!(
            "http://{node}:{}/{bucket}/_design/{}",
            self.config.view_port, view.design_doc
        );
        let body = design_document(view);

        let response = self
            .client
            .put(url)
            .basic_auth(
                &self.config.username,
                Some(self.config.password.expose_secret()),
            )
            .json(&body)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|cause| StoreError::reqwest(&context, cause))?;

        let body = response
            .text()
            .await
            .map_err(|cause| StoreError::reqwest(&context, cause))?;
        tracing::debug!(%body, "created view");
        Ok(())
    }

    async fn create_primary_index(&self, bucket: &str) -> StoreResult<()> {
        let statement = format!("CREATE PRIMARY INDEX ON `{bucket}`");
        let result = self
            .execute_ddl("creating primary index", &statement, None)
            .await;
        tolerate(result, INDEX_EXISTS)
    }

    async fn drop_index(&self, bucket: &str, name: &str) -> StoreResult<()> {
        let statement = format!("DROP INDEX `{bucket}`.`{name}`");
        let result = self.execute_ddl("dropping index", &statement, None).await;
        tolerate(result, INDEX_NOT_FOUND)
    }

    async fn create_partitioned_index(
        &self,
        bucket: &str,
        index: &IndexDefinition,
    ) -> StoreResult<()> {
        let context = format!("creating index `{}`", index.name);
        let statement = partitioned_index_statement(bucket, index, self.config.admin_port);
        self.execute_ddl(&context, &statement, Some(index.build_timeout))
            .await
    }
}

fn insert_statement(bucket: &str) -> String {
    format!("INSERT INTO `{bucket}` (KEY, VALUE) VALUES ($key, $doc) RETURNING META().cas AS cas")
}

fn upsert_statement(bucket: &str) -> String {
    format!("UPSERT INTO `{bucket}` (KEY, VALUE) VALUES ($key, $doc) RETURNING META().cas AS cas")
}

/// The update is guarded by `$cas` unless `cas` is [`Cas::ANY`].
fn replace_statement(bucket: &str, cas: Cas) -> String {
    let guard = if cas.is_any() {
        ""
    } else {
        " WHERE META(d).cas = $cas"
    };
    format!(
        "UPDATE `{bucket}` AS d USE KEYS $key SET d.email = $email, d.name = $name{guard} RETURNING META(d).cas AS cas"
    )
}

/// Index over `email` restricted to the definition's range, built on its node only.
fn partitioned_index_statement(bucket: &str, index: &IndexDefinition, admin_port: u16) -> String {
    let with = json!({ "nodes": [format!("{}:{admin_port}", index.node)] });
    format!(
        "CREATE INDEX `{}` ON `{bucket}`(email) WHERE email >= {} AND email < {} WITH {with}",
        index.name,
        json!(index.lower),
        json!(index.upper),
    )
}

fn design_document(view: &ViewDefinition) -> Value {
    json!({ "views": { &view.view: { "map": &view.map } } })
}

/// Form body of a query service request: the statement, one `$name` field per argument holding
/// its JSON encoding, and the server-side timeout in whole seconds.
fn form_fields(
    statement: &str,
    args: &[(&str, Value)],
    timeout: Option<Duration>,
) -> Vec<(String, String)> {
    let mut form = vec![("statement".to_owned(), statement.to_owned())];
    for (name, value) in args {
        form.push((format!("${name}"), value.to_string()));
    }
    if let Some(timeout) = timeout {
        form.push(("timeout".to_owned(), format!("{}s", timeout.as_secs())));
    }
    form
}

/// Decodes a query service response, turning the first reported error into
/// [`StoreError::Query`].
fn parse_response(context: &str, body: &[u8]) -> StoreResult<Vec<Value>> {
    let response: QueryResponse =
        serde_json::from_slice(body).map_err(|cause| StoreError::serde(context, cause))?;
    if let Some(error) = response.errors.into_iter().next() {
        return Err(StoreError::Query {
            context: context.to_owned(),
            code: error.code,
            message: error.msg,
        });
    }
    Ok(response.results)
}

fn conflict_on_duplicate(key: &str, error: StoreError) -> StoreError {
    match error {
        StoreError::Query {
            code: DUPLICATE_KEY,
            ..
        } => StoreError::AlreadyExists {
            key: key.to_owned(),
            cas: None,
        },
        error => error,
    }
}

/// Treats a query error with `code` as success.
fn tolerate(result: StoreResult<()>, code: u32) -> StoreResult<()> {
    match result {
        Err(StoreError::Query { code: actual, .. }) if actual == code => {
            tracing::debug!(code, "ignoring tolerated query error");
            Ok(())
        }
        result => result,
    }
}
