use crate::configuration::{Compression, ProtocolConfiguration, SocketConfiguration};
use crate::conn::{handshake, StreamIdPool, TcpClient};
use crate::pool::ShardingInfo;
use crate::protocol::parts::{ErrorBody, ServerEvent};
use crate::protocol::{
    encode_request, read_frame, write_frame, Opcode, Reply, Request, FLAG_USE_BETA,
};
use crate::{CqlError, CqlResult, ConnectParams, ProtocolVersion};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot, watch};

type Responder = oneshot::Sender<CqlResult<(crate::protocol::FrameHeader, Vec<u8>)>>;

/// One multiplexed connection to a node.
///
/// Requests are assigned a stream id and written under a writer lock; a
/// dedicated reader task routes responses back by stream id. Responses on
/// different stream ids are not ordered with respect to each other.
#[derive(Clone, Debug)]
pub(crate) struct Connection {
    inner: Arc<ConnInner>,
}

/// What the connection learned while opening, needed by the owning pool.
#[derive(Debug)]
pub(crate) struct OpenInfo {
    pub(crate) sharding_info: Option<ShardingInfo>,
    pub(crate) shard: Option<u32>,
}

#[derive(Debug)]
struct ConnInner {
    address: SocketAddr,
    version: ProtocolVersion,
    compression: Compression,
    use_beta: bool,
    shard: Option<u32>,
    socket_config: SocketConfiguration,
    writer: tokio::sync::Mutex<WriteHalf<TcpClient>>,
    streams: StreamIdPool,
    pending: Mutex<Pending>,
    in_flight: AtomicUsize,
    closing: AtomicBool,
    // milliseconds since `created_at`, written on every frame in or out
    last_io_millis: AtomicU64,
    created_at: Instant,
    timed_out: Mutex<DecayingCounter>,
    closed_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
}

#[derive(Debug, Default)]
struct Pending {
    responders: HashMap<i16, Responder>,
    orphaned: HashSet<i16>,
}

impl Connection {
    /// Opens a connection: TCP (or TLS) connect, handshake with version
    /// negotiation, then reader and heartbeat tasks.
    pub(crate) async fn open(
        params: &ConnectParams,
        protocol_config: &ProtocolConfiguration,
        socket_config: &SocketConfiguration,
        heartbeat_interval: Duration,
        shard_target: Option<(&ShardingInfo, u32)>,
        event_tx: Option<mpsc::UnboundedSender<ServerEvent>>,
    ) -> CqlResult<(Self, OpenInfo)> {
        let outcome =
            handshake::perform(params, protocol_config, socket_config, shard_target).await?;
        let address = tokio::net::lookup_host(params.addr())
            .await?
            .next()
            .ok_or(CqlError::Internal("resolved address vanished"))?;

        let version = outcome.version;
        let (read_half, write_half) = tokio::io::split(outcome.tcp_client);
        let (closed_tx, closed_rx) = watch::channel(false);
        let inner = Arc::new(ConnInner {
            address,
            version,
            compression: outcome.compression,
            use_beta: protocol_config.use_beta(),
            shard: outcome.shard,
            socket_config: socket_config.clone(),
            writer: tokio::sync::Mutex::new(write_half),
            streams: StreamIdPool::new(version.max_streams()),
            pending: Mutex::new(Pending::default()),
            in_flight: AtomicUsize::new(0),
            closing: AtomicBool::new(false),
            last_io_millis: AtomicU64::new(0),
            created_at: Instant::now(),
            timed_out: Mutex::new(DecayingCounter::new(Duration::from_secs(60))),
            closed_tx,
            closed_rx,
        });

        let connection = Self {
            inner: inner.clone(),
        };
        tokio::spawn(reader_loop(inner.clone(), read_half, event_tx));
        tokio::spawn(heartbeat_loop(connection.clone(), heartbeat_interval));

        debug!(
            "connection to {address} is ready (protocol {version}, shard {:?})",
            outcome.shard
        );
        Ok((
            connection,
            OpenInfo {
                sharding_info: outcome.sharding_info,
                shard: outcome.shard,
            },
        ))
    }

    /// The peer address.
    pub(crate) fn address(&self) -> SocketAddr {
        self.inner.address
    }

    /// Whether two handles refer to the same connection.
    pub(crate) fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The negotiated protocol version.
    pub(crate) fn version(&self) -> ProtocolVersion {
        self.inner.version
    }

    /// The Scylla shard this connection landed on, if any.
    pub(crate) fn shard(&self) -> Option<u32> {
        self.inner.shard
    }

    /// Number of requests currently awaiting their response.
    pub(crate) fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Relaxed)
    }

    /// Whether the connection is (being) closed.
    pub(crate) fn is_closing(&self) -> bool {
        self.inner.closing.load(Ordering::Relaxed)
    }

    /// A receiver that flips to `true` once the connection is closed.
    pub(crate) fn closed(&self) -> watch::Receiver<bool> {
        self.inner.closed_rx.clone()
    }

    /// Sends a request and awaits its response, under the configured read
    /// timeout.
    pub(crate) async fn send_request(&self, request: &Request) -> CqlResult<Reply> {
        self.send_request_with_deadline(request, self.inner.socket_config.read_timeout())
            .await
    }

    pub(crate) async fn send_request_with_deadline(
        &self,
        request: &Request,
        deadline: Duration,
    ) -> CqlResult<Reply> {
        let inner = &self.inner;
        if inner.closing.load(Ordering::Acquire) {
            return Err(CqlError::ConnectionClosed);
        }
        let Some(stream) = inner.streams.allocate() else {
            return Err(CqlError::Internal("all stream ids of the connection in use"));
        };

        let (tx, rx) = oneshot::channel();
        inner
            .pending
            .lock()
            .unwrap()
            .responders
            .insert(stream, tx);
        inner.in_flight.fetch_add(1, Ordering::Relaxed);
        let _guard = InFlightGuard { inner };

        let result = self.write_and_await(request, stream, deadline, rx).await;
        match &result {
            Err(CqlError::RequestTimeout { .. }) => {
                // the id stays allocated until the late response is drained
                {
                    let mut pending = inner.pending.lock().unwrap();
                    if pending.responders.remove(&stream).is_some() {
                        pending.orphaned.insert(stream);
                    }
                }
                let decayed = inner
                    .timed_out
                    .lock()
                    .unwrap()
                    .record(Instant::now());
                #[allow(clippy::cast_precision_loss)]
                if decayed > f64::from(inner.socket_config.defunct_read_timeout_threshold()) {
                    warn!(
                        "connection to {} exceeded the defunct threshold, closing",
                        inner.address
                    );
                    self.defunct().await;
                }
            }
            Err(_) | Ok(_) => {}
        }
        result
    }

    async fn write_and_await(
        &self,
        request: &Request,
        stream: i16,
        deadline: Duration,
        rx: oneshot::Receiver<CqlResult<(crate::protocol::FrameHeader, Vec<u8>)>>,
    ) -> CqlResult<Reply> {
        let inner = &self.inner;
        let flags = if inner.use_beta { FLAG_USE_BETA } else { 0 };
        let frame = match request.emit(inner.version).and_then(|body| {
            encode_request(
                inner.version,
                flags,
                stream,
                request.opcode(),
                body,
                inner.compression,
            )
        }) {
            Ok(frame) => frame,
            Err(e) => {
                // nothing was written; free the stream right away
                inner.pending.lock().unwrap().responders.remove(&stream);
                inner.streams.release(stream);
                return Err(e);
            }
        };

        {
            let mut writer = inner.writer.lock().await;
            if let Err(e) = write_frame(&mut *writer, &frame).await {
                drop(writer);
                warn!("write to {} failed: {e}", inner.address);
                self.defunct().await;
                // nothing of the request reached the server; a retry on
                // another host is safe regardless of idempotency
                return Err(CqlError::ConnectionClosed);
            }
        }
        inner.touch();

        match tokio::time::timeout(deadline, rx).await {
            Err(_elapsed) => Err(CqlError::RequestTimeout {
                address: inner.address,
                after_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
            }),
            Ok(Err(_sender_gone)) => Err(CqlError::ConnectionClosed),
            Ok(Ok(result)) => {
                let (header, body) = result?;
                let (reply, _tracing_id) = Reply::parse(&header, &body, inner.version)?;
                Ok(reply)
            }
        }
    }

    /// Registers this connection for server events.
    pub(crate) async fn register_for_events(&self) -> CqlResult<()> {
        let reply = self
            .send_request(&Request::Register {
                event_types: vec![
                    "TOPOLOGY_CHANGE".to_string(),
                    "STATUS_CHANGE".to_string(),
                    "SCHEMA_CHANGE".to_string(),
                ],
            })
            .await?;
        match reply {
            Reply::Ready => Ok(()),
            Reply::Error(ErrorBody::Failed(error)) => Err(error),
            reply => Err(CqlError::InternalDetailed(format!(
                "expected READY for REGISTER, received {reply:?}"
            ))),
        }
    }

    /// Closes the connection; all pending responses fail with
    /// `ConnectionClosed`.
    pub(crate) async fn close(&self) {
        if self.inner.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("closing connection to {}", self.inner.address);
        self.fail_all_pending();
        let _ = self.inner.closed_tx.send(true);
        let mut writer = self.inner.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    async fn defunct(&self) {
        self.close().await;
    }

    fn fail_all_pending(&self) {
        let mut pending = self.inner.pending.lock().unwrap();
        for (stream, responder) in pending.responders.drain() {
            let _ = responder.send(Err(CqlError::ConnectionClosed));
            self.inner.streams.release(stream);
        }
        for stream in pending.orphaned.drain() {
            self.inner.streams.release(stream);
        }
    }

    // Sends a heartbeat when the connection has been silent for too long;
    // a failure defuncts the connection.
    async fn heartbeat(&self, interval: Duration) {
        if self.inner.idle_for() < interval {
            return;
        }
        trace!("sending heartbeat to {}", self.inner.address);
        match self.send_request(&Request::Options).await {
            Ok(Reply::Supported(_)) => {}
            Ok(reply) => {
                warn!(
                    "heartbeat to {} got an unexpected reply: {reply:?}",
                    self.inner.address
                );
                self.defunct().await;
            }
            Err(e) => {
                warn!("heartbeat to {} failed: {e}", self.inner.address);
                self.defunct().await;
            }
        }
    }
}

struct InFlightGuard<'a> {
    inner: &'a Arc<ConnInner>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.inner.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

impl ConnInner {
    fn touch(&self) {
        #[allow(clippy::cast_possible_truncation)]
        let millis = self.created_at.elapsed().as_millis() as u64;
        self.last_io_millis.store(millis, Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_io_millis.load(Ordering::Relaxed));
        self.created_at.elapsed().saturating_sub(last)
    }
}

async fn reader_loop(
    inner: Arc<ConnInner>,
    mut read_half: ReadHalf<TcpClient>,
    event_tx: Option<mpsc::UnboundedSender<ServerEvent>>,
) {
    loop {
        match read_frame(&mut read_half, inner.version).await {
            Ok((header, body)) => {
                inner.touch();
                if header.stream < 0 {
                    handle_server_frame(&inner, &header, &body, event_tx.as_ref());
                    continue;
                }
                let responder = {
                    let mut pending = inner.pending.lock().unwrap();
                    if pending.orphaned.remove(&header.stream) {
                        trace!(
                            "dropping late response on stream {} of {}",
                            header.stream,
                            inner.address
                        );
                        inner.streams.release(header.stream);
                        None
                    } else {
                        pending.responders.remove(&header.stream)
                    }
                };
                if let Some(responder) = responder {
                    inner.streams.release(header.stream);
                    let _ = responder.send(Ok((header, body)));
                }
            }
            Err(e) => {
                if !inner.closing.load(Ordering::Acquire) {
                    debug!("connection to {} broke: {e}", inner.address);
                }
                close_from_reader(&inner);
                return;
            }
        }
    }
}

fn handle_server_frame(
    inner: &Arc<ConnInner>,
    header: &crate::protocol::FrameHeader,
    body: &[u8],
    event_tx: Option<&mpsc::UnboundedSender<ServerEvent>>,
) {
    if header.opcode != Opcode::Event {
        warn!(
            "unexpected {:?} frame on server stream {} of {}",
            header.opcode, header.stream, inner.address
        );
        return;
    }
    match Reply::parse(header, body, inner.version) {
        Ok((Reply::Event(event), _)) => {
            trace!("server event from {}: {event:?}", inner.address);
            if let Some(event_tx) = event_tx {
                let _ = event_tx.send(event);
            }
        }
        Ok(_) | Err(_) => warn!("discarding unparseable event from {}", inner.address),
    }
}

// reader-side close path, without async writer shutdown
fn close_from_reader(inner: &Arc<ConnInner>) {
    inner.closing.store(true, Ordering::Release);
    let mut pending = inner.pending.lock().unwrap();
    for (stream, responder) in pending.responders.drain() {
        let _ = responder.send(Err(CqlError::ConnectionClosed));
        inner.streams.release(stream);
    }
    for stream in pending.orphaned.drain() {
        inner.streams.release(stream);
    }
    drop(pending);
    let _ = inner.closed_tx.send(true);
}

async fn heartbeat_loop(connection: Connection, interval: Duration) {
    if interval.is_zero() {
        return;
    }
    let mut closed = connection.closed();
    loop {
        let sleep = tokio::time::sleep(interval / 2);
        tokio::select! {
            () = sleep => {}
            _ = closed.changed() => return,
        }
        if connection.is_closing() {
            return;
        }
        connection.heartbeat(interval).await;
    }
}

// An exponentially decayed event count: each recorded event counts as 1 and
// halves once per half-life.
#[derive(Debug)]
struct DecayingCounter {
    value: f64,
    last: Option<Instant>,
    half_life: Duration,
}

impl DecayingCounter {
    fn new(half_life: Duration) -> Self {
        Self {
            value: 0.0,
            last: None,
            half_life,
        }
    }

    fn record(&mut self, now: Instant) -> f64 {
        if let Some(last) = self.last {
            let elapsed = now.saturating_duration_since(last).as_secs_f64();
            let halves = elapsed / self.half_life.as_secs_f64();
            self.value *= 0.5_f64.powf(halves);
        }
        self.last = Some(now);
        self.value += 1.0;
        self.value
    }
}
