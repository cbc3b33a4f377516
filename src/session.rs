use crate::base::ResultSet;
use crate::configuration::SessionConfiguration;
use crate::policies::{
    DefaultRetryPolicy, LoadBalancingPolicy, NoRequestObserver, ReconnectionPolicy,
    RequestObserver, RetryDecision, RetryPolicy, RoundRobinLoadBalancing, SchemaMetadata,
};
use crate::pool::{ExponentialReconnection, HostPool, PoolEvent};
use crate::prepared_cache::{CacheKey, PreparedStatementCache};
use crate::protocol::parts::{
    CqlValue, ErrorBody, ResultSetMetadata, ServerEvent,
};
use crate::protocol::{
    BatchChild, QueryParameters, Reply, Request, ResultKind, RowsPage,
};
use crate::routing::{Murmur3TokenFunction, TokenFunction};
use crate::statement::{
    wire_values_bound, wire_values_inferred, BatchChildStatement, BatchStatement,
    PreparedStatement, Statement,
};
use crate::{ConnectParams, CqlError, CqlResult, HostDistance, ProtocolVersion};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// One known host: its address and its connection pool.
#[derive(Debug)]
pub struct Node {
    address: SocketAddr,
    pool: HostPool,
}

impl Node {
    /// The address of the host.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub(crate) fn pool(&self) -> &HostPool {
        &self.pool
    }
}

/// The pluggable collaborators of a session.
#[derive(Clone, Debug)]
pub struct SessionPolicies {
    /// Produces query plans.
    pub load_balancing: Arc<dyn LoadBalancingPolicy>,
    /// Decides about retries.
    pub retry: Arc<dyn RetryPolicy>,
    /// Produces reconnection schedules.
    pub reconnection: Arc<dyn ReconnectionPolicy>,
    /// Hashes routing keys to tokens.
    pub token_function: Arc<dyn TokenFunction>,
    /// Supplies table metadata for routing-index derivation.
    pub schema: Option<Arc<dyn SchemaMetadata>>,
    /// Observes requests and per-node attempts.
    pub observer: Arc<dyn RequestObserver>,
}

impl Default for SessionPolicies {
    fn default() -> Self {
        Self {
            load_balancing: Arc::new(RoundRobinLoadBalancing::default()),
            retry: Arc::new(DefaultRetryPolicy),
            reconnection: Arc::new(ExponentialReconnection::default()),
            token_function: Arc::new(Murmur3TokenFunction),
            schema: None,
            observer: Arc::new(NoRequestObserver),
        }
    }
}

/// One page as the pipeline returns it.
#[derive(Debug)]
pub(crate) struct PageOutcome {
    pub(crate) metadata: Arc<ResultSetMetadata>,
    pub(crate) rows: Vec<Vec<Option<Vec<u8>>>>,
    pub(crate) paging_state: Option<Vec<u8>>,
    pub(crate) version: ProtocolVersion,
}

/// The entry point of the driver: holds the per-host pools, the prepared-
/// statement cache, and the request pipeline.
///
/// All operations are safe for concurrent use; a `Session` is usually
/// wrapped in an `Arc` and shared across the application.
#[derive(Debug)]
pub struct Session {
    core: Arc<SessionCore>,
    server_events: Mutex<Option<mpsc::UnboundedReceiver<ServerEvent>>>,
}

#[derive(Debug)]
pub(crate) struct SessionCore {
    id: u64,
    config: SessionConfiguration,
    policies: SessionPolicies,
    nodes: RwLock<Vec<Arc<Node>>>,
    keyspace: RwLock<Option<String>>,
    cache: PreparedStatementCache,
    tracking_ids: AtomicU64,
}

impl Session {
    /// Connects to the given contact points with default policies.
    pub async fn connect(
        contact_points: Vec<ConnectParams>,
        config: SessionConfiguration,
    ) -> CqlResult<Self> {
        Self::connect_with(contact_points, config, SessionPolicies::default()).await
    }

    /// Connects to the given contact points.
    ///
    /// Each contact point becomes one pooled host. At least one pool must
    /// come up for the call to succeed; the others keep reconnecting in the
    /// background.
    pub async fn connect_with(
        contact_points: Vec<ConnectParams>,
        config: SessionConfiguration,
        policies: SessionPolicies,
    ) -> CqlResult<Self> {
        if contact_points.is_empty() {
            return Err(CqlError::Usage("at least one contact point is required"));
        }
        let keyspace = contact_points[0].keyspace().map(ToString::to_string);
        let (pool_event_tx, mut pool_event_rx) = mpsc::unbounded_channel();
        let (server_event_tx, server_event_rx) = mpsc::unbounded_channel();

        let mut nodes = Vec::with_capacity(contact_points.len());
        let mut tried_hosts = HashMap::new();
        for params in contact_points {
            let address = match tokio::net::lookup_host(params.addr()).await {
                Ok(mut addrs) => match addrs.next() {
                    Some(address) => address,
                    None => continue,
                },
                Err(e) => {
                    warn!("cannot resolve {}: {e}", params.addr());
                    continue;
                }
            };
            let pool = HostPool::new(
                address,
                params,
                config.protocol.clone(),
                config.socket.clone(),
                config.pooling.clone(),
                policies.reconnection.clone(),
                policies.token_function.clone(),
                pool_event_tx.clone(),
                Some(server_event_tx.clone()),
            );
            nodes.push(Arc::new(Node { address, pool }));
        }

        let mut any_up = false;
        for node in &nodes {
            match node.pool.ensure_initialized().await {
                Ok(()) => any_up = true,
                Err(e) => {
                    warn!("pool of {} failed to initialize: {e}", node.address);
                    tried_hosts.insert(node.address, e);
                }
            }
        }
        if !any_up {
            return Err(CqlError::NoHostAvailable { tried_hosts });
        }

        // the owner of the topology listens on one connection per cluster
        for node in &nodes {
            if let Some(connection) = node.pool.connections().first() {
                if let Err(e) = connection.register_for_events().await {
                    debug!("event registration on {} failed: {e}", node.address);
                }
                break;
            }
        }

        // pool events only get logged here; reacting to them is the
        // topology layer's business
        tokio::spawn(async move {
            while let Some(event) = pool_event_rx.recv().await {
                match event {
                    PoolEvent::AllConnectionsClosed(address) => {
                        warn!("all connections to {address} are closed");
                    }
                }
            }
        });

        let core = Arc::new(SessionCore {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            config,
            policies,
            nodes: RwLock::new(nodes),
            keyspace: RwLock::new(keyspace),
            cache: PreparedStatementCache::default(),
            tracking_ids: AtomicU64::new(1),
        });
        Ok(Self {
            core,
            server_events: Mutex::new(Some(server_event_rx)),
        })
    }

    /// The receiver of server events (topology, status, schema); can be
    /// taken once.
    pub fn server_events(&self) -> Option<mpsc::UnboundedReceiver<ServerEvent>> {
        self.server_events.lock().unwrap().take()
    }

    /// The keyspace the session currently runs in.
    pub fn current_keyspace(&self) -> Option<String> {
        self.core.keyspace.read().unwrap().clone()
    }

    /// The known hosts.
    pub fn hosts(&self) -> Vec<SocketAddr> {
        self.core
            .nodes
            .read()
            .unwrap()
            .iter()
            .map(|node| node.address)
            .collect()
    }

    /// Applies a distance change to the pool of the given host; `Ignored`
    /// drains it. When a host comes back into use, the cached statements
    /// are re-prepared there (see
    /// [`QueryConfiguration::set_reprepare_on_up`](crate::QueryConfiguration::set_reprepare_on_up)).
    pub fn set_host_distance(&self, address: SocketAddr, distance: HostDistance) {
        let nodes = self.core.nodes.read().unwrap();
        let Some(node) = nodes.iter().find(|node| node.address == address) else {
            return;
        };
        node.pool.set_distance(distance);
        if matches!(distance, HostDistance::Local | HostDistance::Remote)
            && self.core.config.query.reprepare_on_up()
        {
            let node = node.clone();
            let core = self.core.clone();
            tokio::spawn(async move {
                for prepared in core.cache.all() {
                    let Some(connection) = node.pool().connections().first().cloned() else {
                        return;
                    };
                    if let Err(e) = crate::reprepare::on_connection(&connection, &prepared).await {
                        info!("repreparing on {} after host-up failed: {e}", node.address());
                        return;
                    }
                }
            });
        }
    }

    /// Runs a statement and returns the (lazily paged) result set.
    pub async fn query<S: Into<Statement>>(&self, statement: S) -> CqlResult<ResultSet> {
        let statement = statement.into();
        let outcome = self.core.clone().fetch_page(&statement, None).await?;
        Ok(ResultSet::new(self.core.clone(), statement, outcome))
    }

    /// Prepares a statement, with single-flight caching per
    /// (session, keyspace, CQL text).
    pub async fn prepare<S: Into<String>>(&self, cql: S) -> CqlResult<Arc<PreparedStatement>> {
        self.prepare_with_keyspace(cql, None).await
    }

    /// Prepares a statement against an explicit keyspace (protocol ≥ 5)
    /// instead of the session's current one.
    pub async fn prepare_with_keyspace<S: Into<String>>(
        &self,
        cql: S,
        keyspace_override: Option<String>,
    ) -> CqlResult<Arc<PreparedStatement>> {
        let cql = cql.into();
        let keyspace = keyspace_override
            .clone()
            .or_else(|| self.current_keyspace());
        let key = CacheKey {
            session_id: self.core.id,
            keyspace: keyspace.clone(),
            cql: cql.clone(),
        };
        let core = self.core.clone();
        self.core
            .cache
            .get_or_prepare(key, move || async move {
                core.prepare_uncached(cql, keyspace_override).await
            })
            .await
    }

    /// Binds values and executes the prepared statement.
    pub async fn execute(
        &self,
        prepared: &Arc<PreparedStatement>,
        values: Vec<CqlValue>,
    ) -> CqlResult<ResultSet> {
        self.query(prepared.bind(values)?).await
    }

    /// Executes a batch.
    pub async fn batch(&self, batch: BatchStatement) -> CqlResult<ResultSet> {
        self.query(batch).await
    }

    /// Closes all pools; pending requests fail with `ConnectionClosed`.
    pub async fn shutdown(&self) {
        let nodes = self.core.nodes.read().unwrap().clone();
        for node in nodes {
            node.pool.shutdown().await;
        }
    }
}

impl SessionCore {
    /// Fetches one page for the statement, walking the query plan with
    /// retries and (when configured and idempotent) speculative executions.
    pub(crate) async fn fetch_page(
        self: Arc<Self>,
        statement: &Statement,
        paging_state: Option<Vec<u8>>,
    ) -> CqlResult<PageOutcome> {
        let tracking_id = self.tracking_ids.fetch_add(1, Ordering::Relaxed);
        self.policies.observer.on_request_start(tracking_id);
        let result = self
            .clone()
            .fetch_page_inner(statement, paging_state, tracking_id)
            .await;
        match &result {
            Ok(_) => self.policies.observer.on_request_success(tracking_id),
            Err(e) => self.policies.observer.on_request_failure(tracking_id, e),
        }
        result
    }

    async fn fetch_page_inner(
        self: Arc<Self>,
        statement: &Statement,
        paging_state: Option<Vec<u8>>,
        tracking_id: u64,
    ) -> CqlResult<PageOutcome> {
        let speculative = self.config.speculative_execution.clone();
        match speculative {
            Some(speculative) if statement.is_idempotent() && speculative.max_attempts > 1 => {
                let mut join_set = tokio::task::JoinSet::new();
                for attempt in 0..speculative.max_attempts {
                    let core = self.clone();
                    let statement = statement.clone();
                    let paging_state = paging_state.clone();
                    let delay = speculative.delay * u32::try_from(attempt).unwrap_or(u32::MAX);
                    join_set.spawn(async move {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        core.drive_plan(&statement, paging_state, attempt, tracking_id)
                            .await
                    });
                }
                let mut last_error = None;
                while let Some(joined) = join_set.join_next().await {
                    match joined {
                        Ok(Ok(outcome)) => {
                            // first response wins, the laggards are cancelled
                            join_set.abort_all();
                            return Ok(outcome);
                        }
                        Ok(Err(e)) => last_error = Some(e),
                        Err(_cancelled) => {}
                    }
                }
                Err(last_error.unwrap_or(CqlError::NoHostAvailable {
                    tried_hosts: HashMap::new(),
                }))
            }
            _ => {
                self.drive_plan(statement, paging_state, 0, tracking_id)
                    .await
            }
        }
    }

    // One walk over the query plan, skipping the first `skip` hosts (used
    // by the speculative executions to fan out over different hosts).
    async fn drive_plan(
        self: Arc<Self>,
        statement: &Statement,
        paging_state: Option<Vec<u8>>,
        skip: usize,
        tracking_id: u64,
    ) -> CqlResult<PageOutcome> {
        let routing_key = statement.routing_key(ProtocolVersion::MAX);
        let nodes = self.nodes.read().unwrap().clone();
        let plan = self
            .policies
            .load_balancing
            .query_plan(routing_key.as_deref(), &nodes);
        let idempotent = statement.is_idempotent();
        let observer = &self.policies.observer;

        let mut tried_hosts = HashMap::new();
        for node in plan.into_iter().skip(skip) {
            observer.on_node_start(tracking_id, &node);
            let mut attempt: u32 = 0;
            let mut consistency_override = None;
            let error = loop {
                let result = self
                    .attempt_on_node(
                        &node,
                        statement,
                        routing_key.as_deref(),
                        paging_state.clone(),
                        consistency_override,
                    )
                    .await;
                match result {
                    Ok(outcome) => {
                        observer.on_node_success(tracking_id, &node);
                        return Ok(outcome);
                    }
                    Err(error) => {
                        observer.on_node_error(tracking_id, &node, &error);
                        match self.judge(&error, attempt, idempotent) {
                            Judgement::SameHost(new_consistency) => {
                                attempt += 1;
                                if let Some(cl) = new_consistency {
                                    consistency_override = Some(cl);
                                }
                            }
                            Judgement::NextHost => break error,
                            Judgement::Ignore => {
                                return Ok(PageOutcome {
                                    metadata: Arc::new(ResultSetMetadata::default()),
                                    rows: Vec::new(),
                                    paging_state: None,
                                    version: ProtocolVersion::MAX,
                                })
                            }
                            Judgement::Fail => return Err(error),
                        }
                    }
                }
            };
            tried_hosts.insert(node.address, error);
        }
        Err(CqlError::NoHostAvailable { tried_hosts })
    }

    // Applies the retry policy for server-reported conditions and the
    // idempotency rules for transport-level failures.
    fn judge(&self, error: &CqlError, attempt: u32, idempotent: bool) -> Judgement {
        match error {
            CqlError::ServerTimeout { .. } | CqlError::Unavailable { .. } => {
                match self.policies.retry.decide(error, attempt, idempotent) {
                    RetryDecision::RetrySameHost => Judgement::SameHost(None),
                    RetryDecision::RetryWithConsistency(cl) => Judgement::SameHost(Some(cl)),
                    RetryDecision::RetryNextHost => Judgement::NextHost,
                    RetryDecision::Ignore => Judgement::Ignore,
                    RetryDecision::Rethrow => Judgement::Fail,
                }
            }
            // refused before execution, safe on any host
            error if error.is_host_error() => Judgement::NextHost,
            // the request may or may not have been applied
            CqlError::Io { .. } | CqlError::RequestTimeout { .. } => {
                if idempotent {
                    Judgement::NextHost
                } else {
                    Judgement::Fail
                }
            }
            _ => Judgement::Fail,
        }
    }

    async fn attempt_on_node(
        &self,
        node: &Node,
        statement: &Statement,
        routing_key: Option<&[u8]>,
        paging_state: Option<Vec<u8>>,
        consistency_override: Option<crate::Consistency>,
    ) -> CqlResult<PageOutcome> {
        let connection = node.pool.borrow(routing_key, None).await?;
        let version = connection.version();
        let request =
            self.build_request(statement, version, paging_state.clone(), consistency_override)?;
        let reply = connection.send_request(&request).await?;
        match reply {
            Reply::Result(kind) => self.outcome(statement, version, kind),
            Reply::Error(ErrorBody::Unprepared { id, .. }) => {
                let prepared = find_unprepared_child(statement, &id).ok_or_else(|| {
                    CqlError::InternalDetailed(format!(
                        "server reports unknown prepared statement {}",
                        hex::encode(&id)
                    ))
                })?;
                debug!(
                    "{} lost prepared statement {}, repreparing",
                    node.address,
                    hex::encode(&id)
                );
                crate::reprepare::on_connection(&connection, prepared).await?;
                // one retry on the same host; a second UNPREPARED fails
                let request = self.build_request(
                    statement,
                    version,
                    paging_state,
                    consistency_override,
                )?;
                match connection.send_request(&request).await? {
                    Reply::Result(kind) => self.outcome(statement, version, kind),
                    Reply::Error(ErrorBody::Unprepared { .. }) => {
                        Err(CqlError::InternalDetailed(format!(
                            "{} keeps reporting statement {} as unprepared",
                            node.address,
                            hex::encode(prepared.query_id())
                        )))
                    }
                    Reply::Error(ErrorBody::Failed(error)) => Err(error),
                    reply => Err(unexpected_reply(&reply)),
                }
            }
            Reply::Error(ErrorBody::Failed(error)) => Err(error),
            reply => Err(unexpected_reply(&reply)),
        }
    }

    fn build_request(
        &self,
        statement: &Statement,
        version: ProtocolVersion,
        paging_state: Option<Vec<u8>>,
        consistency_override: Option<crate::Consistency>,
    ) -> CqlResult<Request> {
        let query_config = &self.config.query;
        let options = statement.options();
        let consistency = consistency_override
            .or(options.consistency())
            .unwrap_or(query_config.default_consistency());
        let serial_consistency = options.serial_consistency();
        let page_size = Some(
            options
                .page_size()
                .unwrap_or(query_config.default_page_size()),
        );
        let paging_state = paging_state.or_else(|| options.paging_state().map(<[u8]>::to_vec));
        let keyspace = options.keyspace().map(ToString::to_string);

        Ok(match statement {
            Statement::Simple(simple) => {
                let (values, names) = wire_values_inferred(simple.values(), version)?;
                Request::Query {
                    cql: simple.cql().to_string(),
                    parameters: QueryParameters {
                        consistency,
                        values,
                        names,
                        skip_metadata: false,
                        page_size,
                        paging_state,
                        serial_consistency,
                        timestamp: options.timestamp(),
                        keyspace,
                        now_in_seconds: None,
                    },
                }
            }
            Statement::Bound(bound) => {
                let prepared = bound.prepared();
                let values =
                    wire_values_bound(bound.values(), prepared.variables(), version)?;
                let result_metadata_id = if version.supports_result_metadata_id() {
                    Some(prepared.result_metadata_id().ok_or(CqlError::Internal(
                        "a statement prepared on protocol 5 must carry a result metadata id",
                    ))?)
                } else {
                    None
                };
                // with cached result metadata the server may omit its copy
                let skip_metadata = prepared.result_metadata().column_count() > 0;
                Request::Execute {
                    id: prepared.query_id().to_vec(),
                    result_metadata_id,
                    parameters: QueryParameters {
                        consistency,
                        values,
                        names: None,
                        skip_metadata,
                        page_size,
                        paging_state,
                        serial_consistency,
                        timestamp: options.timestamp(),
                        keyspace,
                        now_in_seconds: None,
                    },
                }
            }
            Statement::Batch(batch) => {
                let mut children = Vec::with_capacity(batch.children().len());
                for child in batch.children() {
                    children.push(match child {
                        BatchChildStatement::Simple(simple) => {
                            let (values, names) =
                                wire_values_inferred(simple.values(), version)?;
                            if names.is_some() {
                                return Err(CqlError::Usage(
                                    "named bind values are not allowed in batches",
                                ));
                            }
                            BatchChild::Query {
                                cql: simple.cql().to_string(),
                                values,
                            }
                        }
                        BatchChildStatement::Bound(bound) => BatchChild::Prepared {
                            id: bound.prepared().query_id().to_vec(),
                            values: wire_values_bound(
                                bound.values(),
                                bound.prepared().variables(),
                                version,
                            )?,
                        },
                    });
                }
                Request::Batch {
                    kind: batch.kind(),
                    children,
                    parameters: QueryParameters {
                        consistency,
                        serial_consistency,
                        timestamp: options.timestamp(),
                        keyspace,
                        ..QueryParameters::default()
                    },
                }
            }
        })
    }

    // Shapes a RESULT into a page; rotates the cached result metadata when
    // the server announced a new metadata id.
    fn outcome(
        &self,
        statement: &Statement,
        version: ProtocolVersion,
        kind: ResultKind,
    ) -> CqlResult<PageOutcome> {
        match kind {
            ResultKind::Rows(page) => Ok(self.rows_outcome(statement, version, page)),
            ResultKind::SetKeyspace(keyspace) => {
                debug!("keyspace is now {keyspace}");
                *self.keyspace.write().unwrap() = Some(keyspace);
                Ok(empty_outcome(version))
            }
            ResultKind::Void | ResultKind::SchemaChange(_) => Ok(empty_outcome(version)),
            ResultKind::Prepared(_) => Err(CqlError::Internal(
                "unsolicited Prepared result on the query path",
            )),
        }
    }

    fn rows_outcome(
        &self,
        statement: &Statement,
        version: ProtocolVersion,
        page: RowsPage,
    ) -> PageOutcome {
        let envelope = page.envelope;
        let cached = match statement {
            Statement::Bound(bound) => Some(bound.prepared()),
            _ => None,
        };
        let metadata = if envelope.no_metadata {
            cached.map_or_else(
                || Arc::new(ResultSetMetadata::default()),
                |prepared| prepared.result_metadata(),
            )
        } else {
            let metadata = Arc::new(envelope.metadata);
            if envelope.metadata_changed {
                if let Some(prepared) = cached {
                    prepared.rotate_result_metadata(metadata.clone());
                }
            }
            metadata
        };
        PageOutcome {
            metadata,
            rows: page.rows,
            paging_state: envelope.paging_state,
            version,
        }
    }

    // The network half of a cache miss: PREPARE on the first host of the
    // plan that answers, then fan out to the remaining hosts.
    async fn prepare_uncached(
        self: Arc<Self>,
        cql: String,
        keyspace_override: Option<String>,
    ) -> CqlResult<PreparedStatement> {
        let nodes = self.nodes.read().unwrap().clone();
        let plan = self.policies.load_balancing.query_plan(None, &nodes);
        let request = Request::Prepare {
            cql: cql.clone(),
            keyspace: keyspace_override.clone(),
        };

        let mut tried_hosts = HashMap::new();
        for node in plan {
            let connection = match node.pool.borrow(None, None).await {
                Ok(connection) => connection,
                Err(e) => {
                    tried_hosts.insert(node.address, e);
                    continue;
                }
            };
            match connection.send_request(&request).await {
                Ok(Reply::Result(ResultKind::Prepared(response))) => {
                    let pk_fallback = self.derive_pk_indexes(&response.variables);
                    let prepared = PreparedStatement::from_response(
                        response,
                        cql,
                        keyspace_override.or_else(|| self.keyspace.read().unwrap().clone()),
                        pk_fallback,
                    );
                    if self.config.query.prepare_on_all_hosts() {
                        let prepared = Arc::new(prepared);
                        crate::reprepare::on_all_hosts(&nodes, node.address, &prepared).await;
                        // the cache owns the statement; hand the value back
                        return Ok(Arc::try_unwrap(prepared).map_err(|_| {
                            CqlError::Internal("prepared statement escaped the fan-out")
                        })?);
                    }
                    return Ok(prepared);
                }
                Ok(Reply::Error(ErrorBody::Failed(error))) => return Err(error),
                Ok(reply) => return Err(unexpected_reply(&reply)),
                Err(e) => {
                    tried_hosts.insert(node.address, e);
                }
            }
        }
        Err(CqlError::NoHostAvailable { tried_hosts })
    }

    // When the server is too old to send partition-key indexes, they are
    // derived by matching variable names against the table's partition key.
    fn derive_pk_indexes(&self, variables: &ResultSetMetadata) -> Vec<u16> {
        let Some(schema) = &self.policies.schema else {
            return Vec::new();
        };
        let Some(first) = variables.columns().first() else {
            return Vec::new();
        };
        let Some(table) = schema.table(first.keyspace(), first.table()) else {
            return Vec::new();
        };
        let mut pk_indexes = Vec::with_capacity(table.partition_key.len());
        for key_column in &table.partition_key {
            match variables
                .columns()
                .iter()
                .position(|column| column.name() == key_column)
            {
                #[allow(clippy::cast_possible_truncation)]
                Some(index) => pk_indexes.push(index as u16),
                // a partition-key column is unbound: no routing possible
                None => return Vec::new(),
            }
        }
        pk_indexes
    }
}

enum Judgement {
    SameHost(Option<crate::Consistency>),
    NextHost,
    Ignore,
    Fail,
}

fn empty_outcome(version: ProtocolVersion) -> PageOutcome {
    PageOutcome {
        metadata: Arc::new(ResultSetMetadata::default()),
        rows: Vec::new(),
        paging_state: None,
        version,
    }
}

fn find_unprepared_child<'a>(
    statement: &'a Statement,
    id: &[u8],
) -> Option<&'a Arc<PreparedStatement>> {
    match statement {
        Statement::Bound(bound) if bound.prepared().query_id() == id => Some(bound.prepared()),
        Statement::Batch(batch) => batch.children().iter().find_map(|child| match child {
            BatchChildStatement::Bound(bound) if bound.prepared().query_id() == id => {
                Some(bound.prepared())
            }
            _ => None,
        }),
        _ => None,
    }
}

fn unexpected_reply(reply: &Reply) -> CqlError {
    CqlError::InternalDetailed(format!("unexpected reply: {reply:?}"))
}
