use crate::configuration::SocketConfiguration;
use crate::pool::ShardingInfo;
use crate::{ConnectParams, CqlError, CqlResult};
use rustls::client::ServerName;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpSocket, TcpStream};
use tokio_rustls::{client::TlsStream, TlsConnector};

/// One established transport to a node, plain or TLS.
#[derive(Debug)]
pub(crate) enum TcpClient {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl TcpClient {
    /// Connects to `params.addr()`. When `shard_target` is given, the local
    /// source port is chosen such that `port mod nr_shards` selects the
    /// wanted shard; occupied ports are skipped to the next candidate.
    pub(crate) async fn try_new(
        params: &ConnectParams,
        socket_config: &SocketConfiguration,
        shard_target: Option<(&ShardingInfo, u32)>,
    ) -> CqlResult<Self> {
        let addr = resolve(params.addr()).await?;
        let stream = connect_tcp(addr, socket_config, shard_target).await?;
        stream.set_nodelay(socket_config.tcp_nodelay())?;

        if params.is_tls() {
            let a_client_config = Arc::new(params.rustls_clientconfig()?);
            let server_name = ServerName::try_from(params.host())
                .map_err(|_| CqlError::TlsServerName)?;
            let tls_connector = TlsConnector::from(a_client_config);
            let tls_stream = tls_connector.connect(server_name, stream).await?;
            Ok(TcpClient::Tls(Box::new(tls_stream)))
        } else {
            Ok(TcpClient::Plain(stream))
        }
    }
}

async fn resolve(addr: &str) -> CqlResult<SocketAddr> {
    tokio::net::lookup_host(addr)
        .await?
        .next()
        .ok_or_else(|| {
            CqlError::Io {
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no address found for {addr}"),
                ),
            }
        })
}

async fn connect_tcp(
    addr: SocketAddr,
    socket_config: &SocketConfiguration,
    shard_target: Option<(&ShardingInfo, u32)>,
) -> CqlResult<TcpStream> {
    match shard_target {
        None => connect_once(addr, socket_config, None).await,
        Some((sharding, shard)) => {
            let mut source_port = sharding.first_source_port(shard);
            loop {
                trace!("shard-aware connect to {addr} from source port {source_port}");
                match connect_once(addr, socket_config, Some(source_port)).await {
                    Ok(stream) => return Ok(stream),
                    Err(CqlError::Io { source })
                        if source.kind() == std::io::ErrorKind::AddrInUse =>
                    {
                        match sharding.next_source_port(source_port) {
                            Some(next) => source_port = next,
                            None => {
                                return Err(CqlError::Io {
                                    source: std::io::Error::new(
                                        std::io::ErrorKind::AddrInUse,
                                        format!("no free source port selects shard {shard}"),
                                    ),
                                })
                            }
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
        }
    }
}

async fn connect_once(
    addr: SocketAddr,
    socket_config: &SocketConfiguration,
    source_port: Option<u16>,
) -> CqlResult<TcpStream> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_keepalive(socket_config.keep_alive())?;
    if let Some(source_port) = source_port {
        socket.set_reuseaddr(true)?;
        let local: SocketAddr = if addr.is_ipv4() {
            (std::net::Ipv4Addr::UNSPECIFIED, source_port).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, source_port).into()
        };
        socket.bind(local)?;
    }
    let stream = tokio::time::timeout(socket_config.connect_timeout(), socket.connect(addr))
        .await
        .map_err(|_| CqlError::Io {
            source: std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connect to {addr} timed out"),
            ),
        })??;
    Ok(stream)
}

impl AsyncRead for TcpClient {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for TcpClient {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}
