use crate::protocol::ProtocolVersion;
use crate::protocol::parts::Consistency;
use std::time::Duration;

/// Body compression negotiated at STARTUP.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
pub enum Compression {
    /// No compression.
    #[default]
    None,
    /// LZ4 block compression with an explicit uncompressed-length prefix.
    Lz4,
}

/// Protocol-level configuration.
#[derive(Clone, Debug)]
pub struct ProtocolConfiguration {
    max_version: ProtocolVersion,
    compression: Compression,
    use_beta: bool,
}

impl Default for ProtocolConfiguration {
    fn default() -> Self {
        Self {
            max_version: ProtocolVersion::MAX,
            compression: Compression::default(),
            use_beta: false,
        }
    }
}

impl ProtocolConfiguration {
    /// Returns the highest protocol version negotiation may settle on.
    pub fn max_version(&self) -> ProtocolVersion {
        self.max_version
    }
    /// Caps the protocol version negotiation may settle on.
    pub fn set_max_version(&mut self, version: ProtocolVersion) {
        self.max_version = version;
    }
    /// Builder-method for capping the protocol version.
    #[must_use]
    pub fn with_max_version(mut self, version: ProtocolVersion) -> Self {
        self.max_version = version;
        self
    }

    /// Returns the configured body compression.
    pub fn compression(&self) -> Compression {
        self.compression
    }
    /// Sets the body compression.
    pub fn set_compression(&mut self, compression: Compression) {
        self.compression = compression;
    }
    /// Builder-method for setting the body compression.
    #[must_use]
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Whether the USE_BETA flag is set on every frame.
    pub fn use_beta(&self) -> bool {
        self.use_beta
    }
    /// Opts into server-side beta protocol features.
    pub fn set_use_beta(&mut self, use_beta: bool) {
        self.use_beta = use_beta;
    }
}

/// Socket-level configuration.
#[derive(Clone, Debug)]
pub struct SocketConfiguration {
    connect_timeout: Duration,
    read_timeout: Duration,
    defunct_read_timeout_threshold: u32,
    tcp_nodelay: bool,
    keep_alive: bool,
}

impl Default for SocketConfiguration {
    fn default() -> Self {
        Self {
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
            read_timeout: Self::DEFAULT_READ_TIMEOUT,
            defunct_read_timeout_threshold: Self::DEFAULT_DEFUNCT_READ_TIMEOUT_THRESHOLD,
            tcp_nodelay: true,
            keep_alive: true,
        }
    }
}

impl SocketConfiguration {
    /// Default timeout for establishing a TCP connection.
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Default deadline for one request round trip.
    pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(12);

    /// Default number of timed-out operations whose responses never arrived
    /// after which a connection is defuncted.
    pub const DEFAULT_DEFUNCT_READ_TIMEOUT_THRESHOLD: u32 = 64;

    /// Returns the timeout for establishing a TCP connection.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
    /// Sets the timeout for establishing a TCP connection.
    pub fn set_connect_timeout(&mut self, connect_timeout: Duration) {
        self.connect_timeout = connect_timeout;
    }

    /// Returns the per-request deadline.
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }
    /// Sets the per-request deadline.
    pub fn set_read_timeout(&mut self, read_timeout: Duration) {
        self.read_timeout = read_timeout;
    }
    /// Builder-method for setting the per-request deadline.
    #[must_use]
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Returns the defunct threshold (see
    /// [`DEFAULT_DEFUNCT_READ_TIMEOUT_THRESHOLD`](Self::DEFAULT_DEFUNCT_READ_TIMEOUT_THRESHOLD)).
    pub fn defunct_read_timeout_threshold(&self) -> u32 {
        self.defunct_read_timeout_threshold
    }
    /// Sets the defunct threshold.
    pub fn set_defunct_read_timeout_threshold(&mut self, threshold: u32) {
        self.defunct_read_timeout_threshold = threshold;
    }

    /// Whether Nagle's algorithm is disabled.
    pub fn tcp_nodelay(&self) -> bool {
        self.tcp_nodelay
    }
    /// En- or disables TCP_NODELAY.
    pub fn set_tcp_nodelay(&mut self, tcp_nodelay: bool) {
        self.tcp_nodelay = tcp_nodelay;
    }

    /// Whether TCP keepalive is requested.
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }
    /// En- or disables TCP keepalive.
    pub fn set_keep_alive(&mut self, keep_alive: bool) {
        self.keep_alive = keep_alive;
    }
}

/// Per-host connection pool configuration.
#[derive(Clone, Debug)]
pub struct PoolConfiguration {
    core_connections: usize,
    max_connections: usize,
    max_requests_per_connection: usize,
    max_inflight_threshold: usize,
    heartbeat_interval: Duration,
    resize_cool_down: Duration,
    disable_shard_awareness: bool,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            core_connections: Self::DEFAULT_CORE_CONNECTIONS,
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
            max_requests_per_connection: Self::DEFAULT_MAX_REQUESTS_PER_CONNECTION,
            max_inflight_threshold: Self::DEFAULT_MAX_INFLIGHT_THRESHOLD,
            heartbeat_interval: Self::DEFAULT_HEARTBEAT_INTERVAL,
            resize_cool_down: Self::DEFAULT_RESIZE_COOL_DOWN,
            disable_shard_awareness: false,
        }
    }
}

impl PoolConfiguration {
    /// Default number of connections a pool opens eagerly.
    pub const DEFAULT_CORE_CONNECTIONS: usize = 1;

    /// Default cap on the number of connections per pool (per shard on a
    /// sharded backend).
    pub const DEFAULT_MAX_CONNECTIONS: usize = 2;

    /// Default cap on concurrent requests per connection; borrow attempts
    /// beyond it fail with `PoolBusy`.
    pub const DEFAULT_MAX_REQUESTS_PER_CONNECTION: usize = 1024;

    /// Default in-flight level that makes the pool consider growing.
    pub const DEFAULT_MAX_INFLIGHT_THRESHOLD: usize = 128;

    /// Default interval after which an idle connection emits a heartbeat.
    pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

    /// Default cool-down between two pool-resize checks.
    pub const DEFAULT_RESIZE_COOL_DOWN: Duration = Duration::from_secs(2);

    /// Returns the number of connections the pool opens eagerly.
    pub fn core_connections(&self) -> usize {
        self.core_connections
    }
    /// Sets the number of connections the pool opens eagerly.
    pub fn set_core_connections(&mut self, core_connections: usize) {
        self.core_connections = core_connections.max(1);
    }
    /// Builder-method for setting the eager connection count.
    #[must_use]
    pub fn with_core_connections(mut self, core_connections: usize) -> Self {
        self.set_core_connections(core_connections);
        self
    }

    /// Returns the cap on connections per pool.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
    /// Sets the cap on connections per pool.
    pub fn set_max_connections(&mut self, max_connections: usize) {
        self.max_connections = max_connections.max(self.core_connections);
    }

    /// Returns the in-flight cap per connection.
    pub fn max_requests_per_connection(&self) -> usize {
        self.max_requests_per_connection
    }
    /// Sets the in-flight cap per connection.
    pub fn set_max_requests_per_connection(&mut self, max_requests: usize) {
        self.max_requests_per_connection = max_requests.max(1);
    }

    /// Returns the in-flight level that triggers pool growth.
    pub fn max_inflight_threshold(&self) -> usize {
        self.max_inflight_threshold
    }
    /// Sets the in-flight level that triggers pool growth.
    pub fn set_max_inflight_threshold(&mut self, threshold: usize) {
        self.max_inflight_threshold = threshold.max(1);
    }

    /// Returns the idle interval after which a heartbeat is sent.
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }
    /// Sets the idle interval after which a heartbeat is sent.
    pub fn set_heartbeat_interval(&mut self, heartbeat_interval: Duration) {
        self.heartbeat_interval = heartbeat_interval;
    }

    /// Returns the cool-down between two resize checks.
    pub fn resize_cool_down(&self) -> Duration {
        self.resize_cool_down
    }

    /// Whether shard-aware connection placement is disabled.
    pub fn disable_shard_awareness(&self) -> bool {
        self.disable_shard_awareness
    }
    /// Disables shard-aware connection placement.
    pub fn set_disable_shard_awareness(&mut self, disable: bool) {
        self.disable_shard_awareness = disable;
    }
}

/// Query-level defaults.
#[derive(Clone, Debug)]
pub struct QueryConfiguration {
    default_consistency: Consistency,
    default_serial_consistency: Consistency,
    default_page_size: i32,
    prepare_on_all_hosts: bool,
    reprepare_on_up: bool,
}

impl Default for QueryConfiguration {
    fn default() -> Self {
        Self {
            default_consistency: Consistency::default(),
            default_serial_consistency: Consistency::Serial,
            default_page_size: crate::DEFAULT_PAGE_SIZE,
            prepare_on_all_hosts: true,
            reprepare_on_up: true,
        }
    }
}

impl QueryConfiguration {
    /// Returns the consistency used when a statement sets none.
    pub fn default_consistency(&self) -> Consistency {
        self.default_consistency
    }
    /// Sets the consistency used when a statement sets none.
    pub fn set_default_consistency(&mut self, consistency: Consistency) {
        self.default_consistency = consistency;
    }

    /// Returns the serial consistency used for conditional statements.
    pub fn default_serial_consistency(&self) -> Consistency {
        self.default_serial_consistency
    }

    /// Returns the page size used when a statement sets none.
    pub fn default_page_size(&self) -> i32 {
        self.default_page_size
    }
    /// Sets the page size used when a statement sets none.
    pub fn set_default_page_size(&mut self, page_size: i32) {
        self.default_page_size = page_size.max(1);
    }

    /// Whether a fresh preparation is propagated to all reachable hosts.
    pub fn prepare_on_all_hosts(&self) -> bool {
        self.prepare_on_all_hosts
    }
    /// Defines whether a fresh preparation is propagated to all hosts.
    pub fn set_prepare_on_all_hosts(&mut self, prepare_on_all_hosts: bool) {
        self.prepare_on_all_hosts = prepare_on_all_hosts;
    }

    /// Whether cached statements are re-prepared on a host that came up.
    pub fn reprepare_on_up(&self) -> bool {
        self.reprepare_on_up
    }
    /// Defines whether cached statements are re-prepared on host-up.
    pub fn set_reprepare_on_up(&mut self, reprepare_on_up: bool) {
        self.reprepare_on_up = reprepare_on_up;
    }
}

/// Configuration of speculative executions for idempotent statements.
#[derive(Clone, Debug)]
pub struct SpeculativeExecutionConfiguration {
    /// Delay without a response after which the next host is tried in
    /// parallel.
    pub delay: Duration,
    /// Maximum number of parallel attempts, including the first one.
    pub max_attempts: usize,
}

impl Default for SpeculativeExecutionConfiguration {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(100),
            max_attempts: 2,
        }
    }
}

/// The aggregated configuration of a [`Session`](crate::Session).
#[derive(Clone, Debug, Default)]
pub struct SessionConfiguration {
    /// Protocol-level settings.
    pub protocol: ProtocolConfiguration,
    /// Socket-level settings.
    pub socket: SocketConfiguration,
    /// Per-host pool settings.
    pub pooling: PoolConfiguration,
    /// Query-level defaults.
    pub query: QueryConfiguration,
    /// Speculative execution; disabled when absent.
    pub speculative_execution: Option<SpeculativeExecutionConfiguration>,
}
