//! The initial exchange on a fresh connection: OPTIONS / SUPPORTED,
//! version negotiation, STARTUP, the SASL round trips, and the initial
//! keyspace.

use crate::configuration::{Compression, ProtocolConfiguration, SocketConfiguration};
use crate::conn::TcpClient;
use crate::pool::ShardingInfo;
use crate::protocol::parts::{Consistency, ErrorBody};
use crate::protocol::{
    encode_request, read_frame, write_frame, QueryParameters, Reply, Request, ResultKind,
};
use crate::{ConnectParams, CqlError, CqlResult, ProtocolVersion};

/// What the handshake leaves behind: the ready transport, the negotiated
/// version, and what the SUPPORTED options revealed about sharding.
#[derive(Debug)]
pub(crate) struct HandshakeOutcome {
    pub(crate) tcp_client: TcpClient,
    pub(crate) version: ProtocolVersion,
    pub(crate) compression: Compression,
    pub(crate) sharding_info: Option<ShardingInfo>,
    pub(crate) shard: Option<u32>,
}

/// Performs the handshake, negotiating the protocol version downward when
/// the server rejects ours.
pub(crate) async fn perform(
    params: &ConnectParams,
    protocol_config: &ProtocolConfiguration,
    socket_config: &SocketConfiguration,
    shard_target: Option<(&ShardingInfo, u32)>,
) -> CqlResult<HandshakeOutcome> {
    let mut version = protocol_config.max_version();
    loop {
        match attempt(params, protocol_config, socket_config, shard_target, version).await {
            Ok(outcome) => return Ok(outcome),
            Err(CqlError::Protocol { message, .. }) => match version.predecessor() {
                Some(lower) => {
                    debug!(
                        "server rejected protocol {version} ({message}), retrying with {lower}"
                    );
                    version = lower;
                }
                None => return Err(CqlError::UnsupportedProtocolVersion),
            },
            Err(e) => return Err(e),
        }
    }
}

async fn attempt(
    params: &ConnectParams,
    protocol_config: &ProtocolConfiguration,
    socket_config: &SocketConfiguration,
    shard_target: Option<(&ShardingInfo, u32)>,
    version: ProtocolVersion,
) -> CqlResult<HandshakeOutcome> {
    let mut tcp_client = TcpClient::try_new(params, socket_config, shard_target).await?;
    trace!("handshake with {} on protocol {version}", params.addr());

    // the frames up to and including STARTUP travel uncompressed
    let supported = match roundtrip(
        &mut tcp_client,
        version,
        Compression::None,
        protocol_config.use_beta(),
        &Request::Options,
        socket_config,
    )
    .await?
    {
        Reply::Supported(supported) => supported,
        reply => return Err(unexpected("SUPPORTED", &reply)),
    };

    let mut compression = protocol_config.compression();
    if compression == Compression::Lz4
        && !supported
            .compression_algorithms()
            .iter()
            .any(|a| a == "lz4")
    {
        warn!(
            "server {} does not offer lz4, continuing uncompressed",
            params.addr()
        );
        compression = Compression::None;
    }
    let sharding_info = supported.sharding_info();
    let shard = supported.shard_of_connection();

    let startup_reply = roundtrip(
        &mut tcp_client,
        version,
        Compression::None,
        protocol_config.use_beta(),
        &Request::Startup { compression },
        socket_config,
    )
    .await?;

    match startup_reply {
        Reply::Ready => {}
        Reply::Authenticate { authenticator } => {
            authenticate(
                &mut tcp_client,
                params,
                version,
                compression,
                protocol_config.use_beta(),
                socket_config,
                &authenticator,
            )
            .await?;
        }
        reply => return Err(unexpected("READY or AUTHENTICATE", &reply)),
    }

    if let Some(keyspace) = params.keyspace() {
        use_keyspace(
            &mut tcp_client,
            version,
            compression,
            protocol_config.use_beta(),
            socket_config,
            keyspace,
        )
        .await?;
    }

    debug!(
        "handshake with {} done: protocol {version}, shard {shard:?}",
        params.addr()
    );
    Ok(HandshakeOutcome {
        tcp_client,
        version,
        compression,
        sharding_info,
        shard,
    })
}

async fn authenticate(
    tcp_client: &mut TcpClient,
    params: &ConnectParams,
    version: ProtocolVersion,
    compression: Compression,
    use_beta: bool,
    socket_config: &SocketConfiguration,
    authenticator: &str,
) -> CqlResult<()> {
    let provider = params.authentication().ok_or_else(|| {
        CqlError::Auth(format!(
            "server demands authentication ({authenticator}) but no credentials are configured"
        ))
    })?;
    let mut token = provider.initial_response(authenticator)?;
    loop {
        let reply = roundtrip(
            tcp_client,
            version,
            compression,
            use_beta,
            &Request::AuthResponse { token },
            socket_config,
        )
        .await?;
        match reply {
            Reply::AuthSuccess => return Ok(()),
            Reply::AuthChallenge { token: challenge } => {
                token = provider.evaluate_challenge(&challenge.unwrap_or_default())?;
            }
            reply => return Err(unexpected("AUTH_SUCCESS or AUTH_CHALLENGE", &reply)),
        }
    }
}

async fn use_keyspace(
    tcp_client: &mut TcpClient,
    version: ProtocolVersion,
    compression: Compression,
    use_beta: bool,
    socket_config: &SocketConfiguration,
    keyspace: &str,
) -> CqlResult<()> {
    let reply = roundtrip(
        tcp_client,
        version,
        compression,
        use_beta,
        &Request::Query {
            cql: format!("USE \"{keyspace}\""),
            parameters: QueryParameters {
                consistency: Consistency::One,
                ..QueryParameters::default()
            },
        },
        socket_config,
    )
    .await?;
    match reply {
        Reply::Result(ResultKind::SetKeyspace(current)) => {
            trace!("keyspace is now {current}");
            Ok(())
        }
        reply => Err(unexpected("SetKeyspace", &reply)),
    }
}

// One sequential request/response on the still-unshared transport; events
// cannot arrive here, the connection is not registered yet.
async fn roundtrip(
    tcp_client: &mut TcpClient,
    version: ProtocolVersion,
    compression: Compression,
    use_beta: bool,
    request: &Request,
    socket_config: &SocketConfiguration,
) -> CqlResult<Reply> {
    let body = request.emit(version)?;
    let flags = if use_beta {
        crate::protocol::FLAG_USE_BETA
    } else {
        0
    };
    let frame = encode_request(version, flags, 0, request.opcode(), body, compression)?;
    write_frame(tcp_client, &frame).await?;

    let (header, body) = tokio::time::timeout(
        socket_config.read_timeout(),
        read_frame(tcp_client, version),
    )
    .await
    .map_err(|_| CqlError::Io {
        source: std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "no handshake response within the read timeout",
        ),
    })??;

    let (reply, _tracing_id) = Reply::parse(&header, &body, version)?;
    match reply {
        Reply::Error(ErrorBody::Failed(error)) => Err(error),
        Reply::Error(ErrorBody::Unprepared { .. }) => Err(CqlError::FrameFormat(
            "UNPREPARED during handshake".to_string(),
        )),
        reply => Ok(reply),
    }
}

fn unexpected(expected: &str, reply: &Reply) -> CqlError {
    CqlError::InternalDetailed(format!("expected {expected}, received {reply:?}"))
}
