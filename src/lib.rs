//! A native driver core for Cassandra-compatible databases (Apache Cassandra
//! and Scylla), speaking the CQL binary protocol versions 1 through 5 over TCP,
//! optionally with TLS.
//!
//! The entry point is a [`Session`], built from one or more contact points via
//! [`ConnectParams`]. A session maintains a shard-aware connection pool per
//! host, a prepared-statement cache with single-flight preparation, and a
//! request pipeline that walks the query plan produced by the configured
//! load-balancing policy.
//!
//! ```rust,no_run
//! use cqlconnect::{ConnectParams, Session, SessionConfiguration};
//!
//! # async fn example() -> cqlconnect::CqlResult<()> {
//! let params = ConnectParams::builder()
//!     .hostname("db.example.com")
//!     .port(9042)
//!     .build()?;
//! let session = Session::connect(vec![params], SessionConfiguration::default()).await?;
//! let mut result_set = session.query("SELECT name, age FROM ks.users").await?;
//! while let Some(row) = result_set.next_row().await? {
//!     println!("{:?}", row.value(0)?);
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_debug_implementations)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate serde;

mod base;
mod configuration;
mod conn;
mod cql_error;
mod policies;
mod pool;
mod prepared_cache;
mod protocol;
mod reprepare;
mod routing;
mod row;
mod rows;
mod session;
mod statement;
mod types_impl;

pub use crate::conn::{
    AuthenticationProvider, ConnectParams, ConnectParamsBuilder, IntoConnectParams,
    PlainAuthenticationProvider, ServerCerts, Tls,
};

pub use crate::cql_error::{CqlError, CqlResult, TimeoutKind};

pub use crate::configuration::{
    Compression, PoolConfiguration, ProtocolConfiguration, QueryConfiguration,
    SessionConfiguration, SocketConfiguration, SpeculativeExecutionConfiguration,
};

pub use crate::base::ResultSet;
pub use crate::policies::{
    DefaultRetryPolicy, HostDistance, LoadBalancingPolicy, NoRequestObserver, ReconnectionPolicy,
    ReconnectionSchedule, RequestObserver, RetryDecision, RetryPolicy, RoundRobinLoadBalancing,
    SchemaMetadata, TableSpec,
};
pub use crate::pool::{ConstantReconnection, ExponentialReconnection, ShardingInfo};
pub use crate::protocol::parts::{
    ColumnMetadata, Consistency, CqlType, CqlValue, ResultSetMetadata, SchemaChange, ServerError,
    ServerEvent, StatusChange, TopologyChange,
};
pub use crate::protocol::ProtocolVersion;
pub use crate::routing::{Murmur3TokenFunction, TokenFunction};
pub use crate::session::{Node, Session, SessionPolicies};
pub use crate::statement::{
    BatchChildStatement, BatchKind, BatchStatement, BoundStatement, PreparedStatement,
    QueryValues, SimpleStatement, Statement, StatementOptions,
};
pub use crate::{row::Row, rows::Rows};

/// Non-standard value representations used within [`CqlValue`]s.
///
/// These types carry the raw wire representation of CQL temporal and duration
/// values; they span the full value range of the protocol, which exceeds what
/// common calendar types can express.
pub mod types {
    pub use crate::types_impl::{
        date::{CqlDate, CqlTime, CqlTimestamp},
        duration::CqlDuration,
    };
}

/// Default port of the CQL native protocol.
pub const DEFAULT_PORT: u16 = 9042;

/// Default value for the number of result rows that are requested with a
/// single page.
///
/// The value used at runtime can be changed with
/// [`StatementOptions::page_size`](crate::StatementOptions::page_size) or
/// [`QueryConfiguration::set_default_page_size`](crate::QueryConfiguration::set_default_page_size).
pub const DEFAULT_PAGE_SIZE: i32 = 5000;
