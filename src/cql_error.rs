use crate::protocol::parts::{Consistency, ServerError};
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use thiserror::Error;

/// A list specifying categories of [`CqlError`](crate::CqlError).
///
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CqlError {
    /// The runtime shape of a value is incompatible with the descriptor it
    /// was to be encoded with.
    #[error("Invalid type: {}", _0)]
    InvalidType(String),

    /// The wire bytes of a value cannot be decoded with the given descriptor.
    #[error("Invalid value: {}", _0)]
    InvalidValue(String),

    /// No descriptor can be inferred for the given runtime value.
    #[error("No CQL type can be inferred: {}", _0)]
    Unencodable(&'static str),

    /// A null value was found inside a list, set, or map during encoding.
    #[error("Null values cannot be encoded inside a collection")]
    NullInCollection,

    /// A numeric conversion exceeded the representable range of the target.
    #[error("Numeric overflow: {}", _0)]
    Overflow(String),

    /// Corrupt or truncated frame; fatal to the connection.
    #[error("Malformed frame: {}", _0)]
    FrameFormat(String),

    /// Server and client disagree on the protocol version.
    #[error("Protocol error (version {}): {}", version, message)]
    Protocol {
        /// Version the client attempted to use.
        version: u8,
        /// Server-provided message.
        message: String,
    },

    /// The server supports no protocol version the client can speak.
    #[error("The server does not support any protocol version the client can speak")]
    UnsupportedProtocolVersion,

    /// Authentication failed.
    #[error("Authentication failed: {}", _0)]
    Auth(String),

    /// TLS set up failed because the server name was not valid.
    #[error("TLS setup failed because the server name was not valid")]
    TlsServerName,

    /// TLS protocol error.
    #[error("TLS setup failed, after setting up the TCP connection; is the server prepared for TLS?")]
    TlsProtocol {
        /// The causing Error.
        #[from]
        source: rustls::Error,
    },

    /// Error occured in communication with the database.
    #[error(transparent)]
    Io {
        /// The causing Error.
        #[from]
        source: std::io::Error,
    },

    /// Decompression of a frame body failed.
    #[error("Decompression failed")]
    Decompression {
        /// The causing Error.
        #[from]
        source: lz4_flex::block::DecompressError,
    },

    /// Server-reported read or write timeout.
    #[error("Server-side {} timeout at consistency {:?}: {}/{} replicas answered", kind, consistency, received, required)]
    ServerTimeout {
        /// Whether a read or a write timed out.
        kind: TimeoutKind,
        /// Consistency level of the request.
        consistency: Consistency,
        /// Number of replicas that answered in time.
        received: i32,
        /// Number of replicas required by the consistency level.
        required: i32,
        /// Type of the timed-out write, absent for reads.
        write_type: Option<String>,
    },

    /// The caller's deadline elapsed before a response arrived.
    #[error("No response within {} ms from {}", after_ms, address)]
    RequestTimeout {
        /// The host that did not answer.
        address: SocketAddr,
        /// The elapsed deadline in milliseconds.
        after_ms: u64,
    },

    /// Not enough live replicas to satisfy the consistency level.
    #[error("Unavailable at consistency {:?}: {} required, {} alive", consistency, required, alive)]
    Unavailable {
        /// Consistency level of the request.
        consistency: Consistency,
        /// Number of replicas required.
        required: i32,
        /// Number of replicas alive.
        alive: i32,
    },

    /// The coordinator is overloaded.
    #[error("Server is overloaded")]
    Overloaded,

    /// The coordinator is still bootstrapping.
    #[error("Server is bootstrapping")]
    IsBootstrapping,

    /// A replica-side failure occurred during a read.
    #[error("Read failure at consistency {:?}: {} failures", consistency, num_failures)]
    ReadFailure {
        /// Consistency level of the request.
        consistency: Consistency,
        /// Number of replicas that answered.
        received: i32,
        /// Number of replicas required.
        required: i32,
        /// Number of replica failures.
        num_failures: i32,
    },

    /// A replica-side failure occurred during a write.
    #[error("Write failure at consistency {:?}: {} failures", consistency, num_failures)]
    WriteFailure {
        /// Consistency level of the request.
        consistency: Consistency,
        /// Number of replicas that answered.
        received: i32,
        /// Number of replicas required.
        required: i32,
        /// Number of replica failures.
        num_failures: i32,
        /// Type of the failed write.
        write_type: String,
    },

    /// Database server responded with an error;
    /// the contained `ServerError` describes the concrete reason.
    #[error("Database server responded with an error")]
    DbError {
        /// The causing Error.
        #[from]
        source: ServerError,
    },

    /// All connections of the target host's pool are at their in-flight cap.
    #[error("Connection pool of {} is busy: {} connections at {} in-flight requests each", host, pool_len, max_inflight)]
    PoolBusy {
        /// The host whose pool is saturated.
        host: SocketAddr,
        /// Configured in-flight cap per connection.
        max_inflight: usize,
        /// Number of connections in the pool.
        pool_len: usize,
    },

    /// The query plan was exhausted without obtaining a response.
    #[error("No host could be reached; {} hosts tried", tried_hosts.len())]
    NoHostAvailable {
        /// The error observed per tried host.
        tried_hosts: HashMap<SocketAddr, CqlError>,
    },

    /// A reprepare returned a different query id than originally cached.
    #[error("ID mismatch while re-preparing a statement: expected {}, received {}", hex::encode(expected_id), hex::encode(received_id))]
    PreparedStatementIdMismatch {
        /// The query id the cache holds.
        expected_id: Vec<u8>,
        /// The query id the server returned.
        received_id: Vec<u8>,
    },

    /// The connection was closed while requests were pending on it.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A concurrent preparation of the same statement failed; this error
    /// shares the leader's outcome.
    #[error("{}", _0)]
    SharedPrepare(Arc<CqlError>),

    /// Error caused by wrong usage.
    #[error("Wrong usage: {}", _0)]
    Usage(&'static str),

    /// Error caused by wrong usage.
    #[error("Wrong usage: {}", _0)]
    UsageDetailed(String),

    /// Implementation error.
    #[error("Implementation error: {}", _0)]
    Internal(&'static str),

    /// Implementation error.
    #[error("Implementation error: {}", _0)]
    InternalDetailed(String),
}

/// Whether a server-reported timeout occurred on the read or the write path.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TimeoutKind {
    /// A read timed out.
    Read,
    /// A write timed out.
    Write,
}

impl std::fmt::Display for TimeoutKind {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Read => write!(fmt, "read"),
            Self::Write => write!(fmt, "write"),
        }
    }
}

/// Abbreviation of `Result<T, CqlError>`.
pub type CqlResult<T> = std::result::Result<T, CqlError>;

impl CqlError {
    /// Returns the contained `ServerError`, if any.
    ///
    /// This method helps in case you need programmatic access to e.g. the
    /// server's raw error code.
    pub fn server_error(&self) -> Option<&ServerError> {
        match self {
            Self::DbError {
                source: server_error,
            } => Some(server_error),
            _ => None,
        }
    }

    /// Reveal the inner error.
    pub fn inner(&self) -> Option<&dyn std::error::Error> {
        match self {
            Self::TlsProtocol { source } => Some(source),
            Self::Io { source } => Some(source),
            Self::Decompression { source } => Some(source),
            Self::DbError { source } => Some(source),
            Self::SharedPrepare(source) => Some(&**source),
            _ => None,
        }
    }

    // Whether the request that produced this error may be replayed on
    // another host even when the statement's idempotency is unknown.
    pub(crate) fn is_host_error(&self) -> bool {
        matches!(
            self,
            Self::IsBootstrapping
                | Self::Overloaded
                | Self::ConnectionClosed
                | Self::PoolBusy { .. }
                | Self::UnsupportedProtocolVersion
        )
    }

}
