use crate::configuration::{PoolConfiguration, ProtocolConfiguration, SocketConfiguration};
use crate::conn::Connection;
use crate::policies::{HostDistance, ReconnectionPolicy};
use crate::pool::ShardingInfo;
use crate::protocol::parts::ServerEvent;
use crate::routing::TokenFunction;
use crate::{ConnectParams, CqlError, CqlResult};
use rand::Rng;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

// Bounded sample size of the global min-in-flight fallback.
const BORROW_SAMPLE: usize = 8;

// Hard cap for the drain delay of an ignored host.
const MAX_DRAIN_DELAY: Duration = Duration::from_secs(300);

/// Pool life-cycle phases. Allowed transitions: Init↔Closing,
/// Init→ShuttingDown, Closing→ShuttingDown, ShuttingDown→Shutdown.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum PoolPhase {
    Init,
    Closing,
    ShuttingDown,
    Shutdown,
}

/// What a pool reports to its owner.
#[derive(Debug)]
pub(crate) enum PoolEvent {
    /// The last open connection closed while the host was still usable.
    AllConnectionsClosed(SocketAddr),
}

/// The connection pool of one host. Shard-aware when the host advertises
/// sharding: connections are placed per shard and borrowing prefers the
/// shard derived from the routing key.
#[derive(Clone, Debug)]
pub(crate) struct HostPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    address: SocketAddr,
    params: ConnectParams,
    protocol_config: ProtocolConfiguration,
    socket_config: SocketConfiguration,
    pool_config: PoolConfiguration,
    reconnection: Arc<dyn ReconnectionPolicy>,
    token_function: Arc<dyn TokenFunction>,
    // copy-on-write snapshot; borrowers clone the Arc and never hold the lock
    conns: RwLock<Arc<Vec<Connection>>>,
    phase: Mutex<PoolPhase>,
    sharding: Mutex<Option<ShardingInfo>>,
    can_create_foreground: AtomicBool,
    // single-flight for connection opens
    open_lock: tokio::sync::Mutex<()>,
    resize_in_progress: AtomicBool,
    last_resize: Mutex<Option<Instant>>,
    reconnecting: AtomicBool,
    borrow_cursor: AtomicUsize,
    pool_event_tx: mpsc::UnboundedSender<PoolEvent>,
    server_event_tx: Option<mpsc::UnboundedSender<ServerEvent>>,
}

impl HostPool {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        address: SocketAddr,
        params: ConnectParams,
        protocol_config: ProtocolConfiguration,
        socket_config: SocketConfiguration,
        pool_config: PoolConfiguration,
        reconnection: Arc<dyn ReconnectionPolicy>,
        token_function: Arc<dyn TokenFunction>,
        pool_event_tx: mpsc::UnboundedSender<PoolEvent>,
        server_event_tx: Option<mpsc::UnboundedSender<ServerEvent>>,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                address,
                params,
                protocol_config,
                socket_config,
                pool_config,
                reconnection,
                token_function,
                conns: RwLock::new(Arc::new(Vec::new())),
                phase: Mutex::new(PoolPhase::Init),
                sharding: Mutex::new(None),
                can_create_foreground: AtomicBool::new(true),
                open_lock: tokio::sync::Mutex::new(()),
                resize_in_progress: AtomicBool::new(false),
                last_resize: Mutex::new(None),
                reconnecting: AtomicBool::new(false),
                borrow_cursor: AtomicUsize::new(0),
                pool_event_tx,
                server_event_tx,
            }),
        }
    }

    /// The address of the pooled host.
    pub(crate) fn address(&self) -> SocketAddr {
        self.inner.address
    }

    /// A snapshot of the current connections.
    pub(crate) fn connections(&self) -> Arc<Vec<Connection>> {
        self.inner.conns.read().unwrap().clone()
    }

    /// The sharding info learned from this host, if any.
    pub(crate) fn sharding_info(&self) -> Option<ShardingInfo> {
        self.inner.sharding.lock().unwrap().clone()
    }

    fn phase(&self) -> PoolPhase {
        *self.inner.phase.lock().unwrap()
    }

    /// Opens the core connections; the first one in the foreground, the
    /// remaining ones in the background.
    pub(crate) async fn ensure_initialized(&self) -> CqlResult<()> {
        if self.phase() != PoolPhase::Init {
            return Err(CqlError::ConnectionClosed);
        }
        if self.connections().is_empty() {
            self.create_open_connection(None, true).await?;
            self.inner
                .can_create_foreground
                .store(false, Ordering::Release);
        }
        let core = self.inner.pool_config.core_connections() * self.shard_factor();
        if self.connections().len() < core {
            let pool = self.clone();
            tokio::spawn(async move { pool.fill_to_core().await });
        }
        Ok(())
    }

    // nr_shards once known, 1 otherwise
    fn shard_factor(&self) -> usize {
        self.sharding_info()
            .map_or(1, |sharding| sharding.nr_shards() as usize)
    }

    async fn fill_to_core(&self) {
        let core = self.inner.pool_config.core_connections() * self.shard_factor();
        while self.phase() == PoolPhase::Init && self.connections().len() < core {
            let shard = self.missing_shard();
            if let Err(e) = self.create_open_connection(shard, false).await {
                debug!("background fill of pool {} stopped: {e}", self.inner.address);
                return;
            }
        }
    }

    // The shard a new connection should aim at, per the deterministic
    // least-populated rule.
    fn missing_shard(&self) -> Option<u32> {
        let sharding = self.sharding_info()?;
        if self.inner.pool_config.disable_shard_awareness() {
            return None;
        }
        let conns = self.connections();
        let mut per_shard = vec![0_usize; sharding.nr_shards() as usize];
        for conn in conns.iter() {
            if let Some(shard) = conn.shard() {
                if let Some(count) = per_shard.get_mut(shard as usize) {
                    *count += 1;
                }
            }
        }
        Some(sharding.least_populated_shard(
            &per_shard,
            self.inner.pool_config.core_connections().max(1),
        ))
    }

    /// Borrows the least loaded usable connection, preferring the shard the
    /// routing key (or the explicit hint) selects.
    pub(crate) async fn borrow(
        &self,
        routing_key: Option<&[u8]>,
        shard_hint: Option<u32>,
    ) -> CqlResult<Connection> {
        if self.phase() != PoolPhase::Init {
            return Err(CqlError::ConnectionClosed);
        }
        let mut conns = self.connections();
        if conns.is_empty() {
            if !self.inner.can_create_foreground.load(Ordering::Acquire) {
                return Err(CqlError::ConnectionClosed);
            }
            self.create_open_connection(None, true).await?;
            self.inner
                .can_create_foreground
                .store(false, Ordering::Release);
            conns = self.connections();
            if conns.is_empty() {
                return Err(CqlError::ConnectionClosed);
            }
        }

        let shard = self.resolve_shard(routing_key, shard_hint);
        let candidate = self.pick_connection(&conns, shard);
        let Some(candidate) = candidate else {
            return Err(CqlError::ConnectionClosed);
        };

        let max_inflight = self
            .inner
            .pool_config
            .max_requests_per_connection()
            .min(candidate.version().max_streams() - 1);
        if candidate.in_flight() >= max_inflight {
            return Err(CqlError::PoolBusy {
                host: self.inner.address,
                max_inflight,
                pool_len: conns.len(),
            });
        }

        self.maybe_grow(&conns, &candidate);
        Ok(candidate)
    }

    fn resolve_shard(&self, routing_key: Option<&[u8]>, shard_hint: Option<u32>) -> Option<u32> {
        if let Some(hint) = shard_hint {
            return Some(hint);
        }
        let sharding = self.sharding_info()?;
        if self.inner.pool_config.disable_shard_awareness() {
            return None;
        }
        match routing_key {
            Some(key) => {
                let token = self.inner.token_function.token(key);
                Some(sharding.shard_of_token(token))
            }
            None => Some(rand::thread_rng().gen_range(0..sharding.nr_shards())),
        }
    }

    // Minimum in-flight on the wanted shard; above the growth threshold or
    // without a shard-local connection, fall back to a bounded round-robin
    // sample across the whole pool.
    fn pick_connection(&self, conns: &[Connection], shard: Option<u32>) -> Option<Connection> {
        let threshold = self.inner.pool_config.max_inflight_threshold();
        let shard_local = shard.and_then(|shard| {
            conns
                .iter()
                .filter(|c| !c.is_closing() && c.shard() == Some(shard))
                .min_by_key(|c| c.in_flight())
                .cloned()
        });
        if let Some(conn) = &shard_local {
            if conn.in_flight() < threshold {
                return shard_local;
            }
        }

        let start = self.inner.borrow_cursor.fetch_add(1, Ordering::Relaxed);
        let sample = conns
            .iter()
            .cycle()
            .skip(start % conns.len().max(1))
            .take(BORROW_SAMPLE.min(conns.len()))
            .filter(|c| !c.is_closing())
            .min_by_key(|c| c.in_flight())
            .cloned();
        sample.or(shard_local)
    }

    // Background growth with a cool-down, at most one resize in progress.
    fn maybe_grow(&self, conns: &Arc<Vec<Connection>>, candidate: &Connection) {
        let config = &self.inner.pool_config;
        if candidate.in_flight() < config.max_inflight_threshold()
            || conns.len() >= config.max_connections() * self.shard_factor()
        {
            return;
        }
        {
            let last_resize = self.inner.last_resize.lock().unwrap();
            if let Some(last) = *last_resize {
                if last.elapsed() < config.resize_cool_down() {
                    return;
                }
            }
        }
        if self
            .inner
            .resize_in_progress
            .swap(true, Ordering::AcqRel)
        {
            return;
        }
        debug!("pool {} grows beyond {} connections", self.inner.address, conns.len());
        let pool = self.clone();
        tokio::spawn(async move {
            let shard = pool.missing_shard();
            if let Err(e) = pool.create_open_connection(shard, false).await {
                debug!("pool growth of {} failed: {e}", pool.inner.address);
            }
            *pool.inner.last_resize.lock().unwrap() = Some(Instant::now());
            pool.inner.resize_in_progress.store(false, Ordering::Release);
        });
    }

    // Opens one connection and adds it to the borrowable set. Holds the
    // open lock so concurrent callers do not open in parallel; callers that
    // were only waiting for *a* connection find it in the snapshot.
    async fn create_open_connection(
        &self,
        shard: Option<u32>,
        satisfied_if_any: bool,
    ) -> CqlResult<()> {
        let _single_flight = self.inner.open_lock.lock().await;
        if self.phase() != PoolPhase::Init {
            return Err(CqlError::ConnectionClosed);
        }
        if satisfied_if_any && !self.connections().is_empty() {
            // a concurrent caller already succeeded
            return Ok(());
        }

        let sharding = self.sharding_info();
        let (params, shard_target) = match (&sharding, shard) {
            (Some(sharding), Some(shard))
                if !self.inner.pool_config.disable_shard_awareness() =>
            {
                let shard_port = if self.inner.params.is_tls() {
                    sharding.shard_aware_port_ssl()
                } else {
                    sharding.shard_aware_port()
                };
                match shard_port {
                    Some(port) => (
                        self.inner.params.with_port(port),
                        Some((sharding.clone(), shard)),
                    ),
                    None => (self.inner.params.clone(), None),
                }
            }
            _ => (self.inner.params.clone(), None),
        };

        let (connection, open_info) = Connection::open(
            &params,
            &self.inner.protocol_config,
            &self.inner.socket_config,
            self.inner.pool_config.heartbeat_interval(),
            shard_target.as_ref().map(|(s, shard)| (s, *shard)),
            self.inner.server_event_tx.clone(),
        )
        .await?;

        if let Some(sharding_info) = open_info.sharding_info {
            self.inner
                .sharding
                .lock()
                .unwrap()
                .get_or_insert(sharding_info);
        }

        {
            let mut conns = self.inner.conns.write().unwrap();
            let mut next = (**conns).clone();
            next.push(connection.clone());
            *conns = Arc::new(next);
        }

        let pool = self.clone();
        tokio::spawn(async move { pool.monitor_connection(connection).await });
        Ok(())
    }

    // Waits for the connection to close, removes it from the set, and
    // triggers reconnection while the pool stays usable.
    async fn monitor_connection(&self, connection: Connection) {
        let mut closed = connection.closed();
        while !*closed.borrow() {
            if closed.changed().await.is_err() {
                break;
            }
        }
        {
            let mut conns = self.inner.conns.write().unwrap();
            let next: Vec<Connection> = conns
                .iter()
                .filter(|c| !c.same_as(&connection) && !c.is_closing())
                .cloned()
                .collect();
            *conns = Arc::new(next);
        }
        if self.phase() != PoolPhase::Init {
            return;
        }
        let remaining = self.connections().len();
        debug!(
            "connection of pool {} closed, {remaining} left",
            self.inner.address
        );
        if remaining == 0 {
            let _ = self
                .inner
                .pool_event_tx
                .send(PoolEvent::AllConnectionsClosed(self.inner.address));
        }
        self.start_reconnecting();
    }

    fn start_reconnecting(&self) {
        if self.inner.reconnecting.swap(true, Ordering::AcqRel) {
            return;
        }
        let pool = self.clone();
        tokio::spawn(async move {
            let mut schedule = pool.inner.reconnection.new_schedule();
            loop {
                let delay = schedule.next_delay();
                trace!(
                    "pool {} reconnects in {} ms",
                    pool.inner.address,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                if pool.phase() != PoolPhase::Init {
                    break;
                }
                match pool.create_open_connection(pool.missing_shard(), false).await {
                    Ok(()) => {
                        pool.fill_to_core().await;
                        break;
                    }
                    Err(e) => {
                        debug!("reconnect to {} failed: {e}", pool.inner.address);
                    }
                }
            }
            pool.inner.reconnecting.store(false, Ordering::Release);
        });
    }

    /// Applies a distance change: `Ignored` drains the pool, the other
    /// distances (re-)enable it.
    pub(crate) fn set_distance(&self, distance: HostDistance) {
        let mut phase = self.inner.phase.lock().unwrap();
        match (distance, *phase) {
            (HostDistance::Ignored, PoolPhase::Init) => {
                *phase = PoolPhase::Closing;
                drop(phase);
                self.drain();
            }
            (HostDistance::Local | HostDistance::Remote, PoolPhase::Closing) => {
                *phase = PoolPhase::Init;
                self.inner.can_create_foreground.store(true, Ordering::Release);
            }
            _ => {}
        }
    }

    // Removes all connections from the borrowable set; ongoing requests get
    // twice the read timeout to finish before the connections are closed.
    fn drain(&self) {
        let drained = {
            let mut conns = self.inner.conns.write().unwrap();
            std::mem::replace(&mut *conns, Arc::new(Vec::new()))
        };
        if drained.is_empty() {
            return;
        }
        let delay = (self.inner.socket_config.read_timeout() * 2).min(MAX_DRAIN_DELAY);
        debug!(
            "draining {} connections of {} after {} s",
            drained.len(),
            self.inner.address,
            delay.as_secs()
        );
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            for conn in drained.iter() {
                conn.close().await;
            }
        });
    }

    /// Terminal shutdown of the pool.
    pub(crate) async fn shutdown(&self) {
        {
            let mut phase = self.inner.phase.lock().unwrap();
            if matches!(*phase, PoolPhase::ShuttingDown | PoolPhase::Shutdown) {
                return;
            }
            *phase = PoolPhase::ShuttingDown;
        }
        let conns = {
            let mut conns = self.inner.conns.write().unwrap();
            std::mem::replace(&mut *conns, Arc::new(Vec::new()))
        };
        for conn in conns.iter() {
            conn.close().await;
        }
        *self.inner.phase.lock().unwrap() = PoolPhase::Shutdown;
    }
}
