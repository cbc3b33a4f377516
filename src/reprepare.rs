//! Repreparing statements: on demand after a fresh preparation (so that
//! every reachable host knows the id before it is first executed there),
//! and synchronously when an EXECUTE comes back UNPREPARED.

use crate::conn::Connection;
use crate::protocol::parts::ErrorBody;
use crate::protocol::{Reply, Request, ResultKind};
use crate::session::Node;
use crate::statement::PreparedStatement;
use crate::{CqlError, CqlResult};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Semaphore;

// Upper bound on concurrently in-flight repreparations during the fan-out.
const MAX_CONCURRENT_REPREPARATIONS: usize = 64;

/// Reprepares the statement on every host except the originating one, using
/// only connections that already exist. Per-host failures are logged and do
/// not fail the fan-out.
pub(crate) async fn on_all_hosts(
    nodes: &[Arc<Node>],
    origin: SocketAddr,
    prepared: &Arc<PreparedStatement>,
) {
    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_REPREPARATIONS));
    let mut handles = Vec::new();
    for node in nodes {
        if node.address() == origin {
            continue;
        }
        // no new connections for repreparing; a host without any is skipped
        let Some(connection) = node.pool().connections().first().cloned() else {
            continue;
        };
        let prepared = prepared.clone();
        let semaphore = semaphore.clone();
        let address = node.address();
        handles.push(tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return;
            };
            if let Err(e) = on_connection(&connection, &prepared).await {
                info!("repreparing on {address} failed: {e}");
            }
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }
}

/// Reprepares the statement over the given connection and verifies that the
/// server hands back the id the cache already holds.
pub(crate) async fn on_connection(
    connection: &Connection,
    prepared: &Arc<PreparedStatement>,
) -> CqlResult<()> {
    debug!(
        "repreparing {} on {}",
        hex::encode(prepared.query_id()),
        connection.address()
    );
    let reply = connection
        .send_request(&Request::Prepare {
            cql: prepared.cql().to_string(),
            keyspace: prepared.keyspace_at_prepare().map(ToString::to_string),
        })
        .await?;
    match reply {
        Reply::Result(ResultKind::Prepared(response)) => {
            if response.id == prepared.query_id() {
                Ok(())
            } else {
                Err(CqlError::PreparedStatementIdMismatch {
                    expected_id: prepared.query_id().to_vec(),
                    received_id: response.id,
                })
            }
        }
        Reply::Error(ErrorBody::Failed(error)) => Err(error),
        reply => Err(CqlError::InternalDetailed(format!(
            "expected a Prepared result, received {reply:?}"
        ))),
    }
}
