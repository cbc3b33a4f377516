//! Contracts of the external collaborators the core consults: load
//! balancing, retry, reconnection, schema lookup, and request observation.
//! The default implementations keep the hot paths trivial.

use crate::protocol::parts::Consistency;
use crate::session::Node;
use crate::CqlError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How far away a host is, from the load-balancing policy's point of view;
/// drives per-distance pool sizing and drains pools of ignored hosts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HostDistance {
    /// Host in the local datacenter.
    Local,
    /// Host in a remote datacenter.
    Remote,
    /// Host to which no connections are maintained.
    Ignored,
}

/// Produces query plans: the ordered hosts a request should try.
pub trait LoadBalancingPolicy: Send + Sync + std::fmt::Debug {
    /// The distance of the given node.
    fn distance(&self, node: &Node) -> HostDistance;

    /// The hosts to try for one request, in order. The routing key of the
    /// statement, when present, may be used for token-aware ordering.
    fn query_plan(&self, routing_key: Option<&[u8]>, nodes: &[Arc<Node>]) -> Vec<Arc<Node>>;
}

/// Plain round-robin over all known hosts, everything local.
#[derive(Debug, Default)]
pub struct RoundRobinLoadBalancing {
    next: AtomicUsize,
}

impl LoadBalancingPolicy for RoundRobinLoadBalancing {
    fn distance(&self, _node: &Node) -> HostDistance {
        HostDistance::Local
    }

    fn query_plan(&self, _routing_key: Option<&[u8]>, nodes: &[Arc<Node>]) -> Vec<Arc<Node>> {
        if nodes.is_empty() {
            return Vec::new();
        }
        let start = self.next.fetch_add(1, Ordering::Relaxed) % nodes.len();
        let mut plan = Vec::with_capacity(nodes.len());
        plan.extend_from_slice(&nodes[start..]);
        plan.extend_from_slice(&nodes[..start]);
        plan
    }
}

/// What to do with a failed request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryDecision {
    /// Send the same request to the same host again.
    RetrySameHost,
    /// Move on to the next host of the query plan.
    RetryNextHost,
    /// Retry on the same host with a downgraded consistency.
    RetryWithConsistency(Consistency),
    /// Give up and surface the error.
    Rethrow,
    /// Swallow the error and report an empty result.
    Ignore,
}

/// Decides whether a failed request is retried, and where.
pub trait RetryPolicy: Send + Sync + std::fmt::Debug {
    /// The decision for the given error; `attempt` counts from 0 per host.
    fn decide(&self, error: &CqlError, attempt: u32, idempotent: bool) -> RetryDecision;
}

/// The default policy: a read timeout is retried once on the same host, an
/// unavailable error moves to the next host once, a write timeout is only
/// retried when the statement is idempotent.
#[derive(Debug, Default)]
pub struct DefaultRetryPolicy;

impl RetryPolicy for DefaultRetryPolicy {
    fn decide(&self, error: &CqlError, attempt: u32, idempotent: bool) -> RetryDecision {
        if attempt > 0 {
            return RetryDecision::Rethrow;
        }
        match error {
            CqlError::ServerTimeout {
                write_type: None, ..
            } => RetryDecision::RetrySameHost,
            CqlError::ServerTimeout {
                write_type: Some(_),
                ..
            } => {
                if idempotent {
                    RetryDecision::RetrySameHost
                } else {
                    RetryDecision::Rethrow
                }
            }
            CqlError::Unavailable { .. } => RetryDecision::RetryNextHost,
            _ => RetryDecision::Rethrow,
        }
    }
}

/// A single reconnection attempt series; owns the monotonic delay state.
pub trait ReconnectionSchedule: Send {
    /// Delay before the next attempt.
    fn next_delay(&mut self) -> Duration;
}

/// Factory for reconnection schedules.
pub trait ReconnectionPolicy: Send + Sync + std::fmt::Debug {
    /// A fresh schedule, starting at the policy's initial delay.
    fn new_schedule(&self) -> Box<dyn ReconnectionSchedule>;
}

/// Partition-key information of a table, as provided by the external schema
/// metadata collaborator.
#[derive(Clone, Debug)]
pub struct TableSpec {
    /// Names of the partition-key columns, in key order.
    pub partition_key: Vec<String>,
}

/// Read access to externally maintained schema metadata; used to derive
/// routing indexes when the server does not provide them.
pub trait SchemaMetadata: Send + Sync + std::fmt::Debug {
    /// The table description, when known.
    fn table(&self, keyspace: &str, table: &str) -> Option<TableSpec>;
}

/// Lifecycle hooks around requests and per-node attempts. All methods have
/// no-op defaults; implementations must be cheap, they run on the hot path.
#[allow(unused_variables)]
pub trait RequestObserver: Send + Sync + std::fmt::Debug {
    /// A request enters the pipeline; `tracking_id` identifies it in all
    /// later calls.
    fn on_request_start(&self, tracking_id: u64) {}
    /// The request completed successfully.
    fn on_request_success(&self, tracking_id: u64) {}
    /// The request failed terminally.
    fn on_request_failure(&self, tracking_id: u64, error: &CqlError) {}
    /// An attempt on one node starts.
    fn on_node_start(&self, tracking_id: u64, node: &Node) {}
    /// The attempt on the node succeeded.
    fn on_node_success(&self, tracking_id: u64, node: &Node) {}
    /// The attempt on the node failed.
    fn on_node_error(&self, tracking_id: u64, node: &Node, error: &CqlError) {}
}

/// The default observer: does nothing.
#[derive(Debug, Default)]
pub struct NoRequestObserver;

impl RequestObserver for NoRequestObserver {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cql_error::TimeoutKind;

    #[test]
    fn default_retry_policy_decisions() {
        let policy = DefaultRetryPolicy;
        let read_timeout = CqlError::ServerTimeout {
            kind: TimeoutKind::Read,
            consistency: Consistency::Quorum,
            received: 1,
            required: 2,
            write_type: None,
        };
        assert_eq!(
            policy.decide(&read_timeout, 0, false),
            RetryDecision::RetrySameHost
        );
        assert_eq!(policy.decide(&read_timeout, 1, false), RetryDecision::Rethrow);

        let unavailable = CqlError::Unavailable {
            consistency: Consistency::Quorum,
            required: 2,
            alive: 1,
        };
        assert_eq!(
            policy.decide(&unavailable, 0, false),
            RetryDecision::RetryNextHost
        );

        let write_timeout = CqlError::ServerTimeout {
            kind: TimeoutKind::Write,
            consistency: Consistency::Quorum,
            received: 1,
            required: 2,
            write_type: Some("SIMPLE".to_string()),
        };
        assert_eq!(
            policy.decide(&write_timeout, 0, false),
            RetryDecision::Rethrow
        );
        assert_eq!(
            policy.decide(&write_timeout, 0, true),
            RetryDecision::RetrySameHost
        );
    }
}
