mod authentication;
mod connection;
mod handshake;
mod params;
mod stream_ids;
mod tcp_client;

pub use self::authentication::{AuthenticationProvider, PlainAuthenticationProvider};
pub(crate) use self::connection::{Connection, OpenInfo};
pub use self::params::{
    ConnectParams, ConnectParamsBuilder, IntoConnectParams, ServerCerts, Tls,
};
pub(crate) use self::stream_ids::StreamIdPool;
pub(crate) use self::tcp_client::TcpClient;
