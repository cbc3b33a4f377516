use crate::protocol::util_sync;
use crate::{CqlError, CqlResult};
use std::net::SocketAddr;

/// A topology change pushed by the server on the event stream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TopologyChange {
    /// A node joined the cluster.
    NewNode(SocketAddr),
    /// A node left the cluster.
    RemovedNode(SocketAddr),
}

/// A node status change pushed by the server on the event stream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StatusChange {
    /// The node is up.
    Up(SocketAddr),
    /// The node is down.
    Down(SocketAddr),
}

/// A schema change pushed by the server on the event stream, or returned as
/// the result of a DDL statement.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SchemaChange {
    /// CREATED, UPDATED or DROPPED.
    pub change_type: String,
    /// KEYSPACE, TABLE, TYPE, FUNCTION or AGGREGATE.
    pub target: String,
    /// The affected keyspace.
    pub keyspace: String,
    /// The affected object within the keyspace, empty for keyspace targets.
    pub name: String,
}

/// An unsolicited EVENT message; the server only sends these after a
/// REGISTER request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ServerEvent {
    /// A node joined or left.
    Topology(TopologyChange),
    /// A node went up or down.
    Status(StatusChange),
    /// The schema changed.
    Schema(SchemaChange),
}

impl ServerEvent {
    pub(crate) fn parse(rdr: &mut dyn std::io::Read) -> CqlResult<Self> {
        let event_type = util_sync::read_string(rdr)?;
        match event_type.as_str() {
            "TOPOLOGY_CHANGE" => {
                let change = util_sync::read_string(rdr)?;
                let addr = util_sync::read_inet(rdr)?;
                match change.as_str() {
                    "NEW_NODE" => Ok(Self::Topology(TopologyChange::NewNode(addr))),
                    "REMOVED_NODE" => Ok(Self::Topology(TopologyChange::RemovedNode(addr))),
                    // MOVED_NODE and friends concern the topology layer only
                    other => Err(CqlError::FrameFormat(format!(
                        "unknown topology change {other}"
                    ))),
                }
            }
            "STATUS_CHANGE" => {
                let change = util_sync::read_string(rdr)?;
                let addr = util_sync::read_inet(rdr)?;
                match change.as_str() {
                    "UP" => Ok(Self::Status(StatusChange::Up(addr))),
                    "DOWN" => Ok(Self::Status(StatusChange::Down(addr))),
                    other => Err(CqlError::FrameFormat(format!(
                        "unknown status change {other}"
                    ))),
                }
            }
            "SCHEMA_CHANGE" => Ok(Self::Schema(parse_schema_change(rdr)?)),
            other => Err(CqlError::FrameFormat(format!("unknown event type {other}"))),
        }
    }
}

pub(crate) fn parse_schema_change(rdr: &mut dyn std::io::Read) -> CqlResult<SchemaChange> {
    let change_type = util_sync::read_string(rdr)?;
    let target = util_sync::read_string(rdr)?;
    let keyspace = util_sync::read_string(rdr)?;
    let name = match target.as_str() {
        "KEYSPACE" => String::new(),
        "FUNCTION" | "AGGREGATE" => {
            let name = util_sync::read_string(rdr)?;
            // argument types follow; only their presence matters here
            let _arg_types = util_sync::read_string_list(rdr)?;
            name
        }
        _ => util_sync::read_string(rdr)?,
    };
    Ok(SchemaChange {
        change_type,
        target,
        keyspace,
        name,
    })
}

#[cfg(test)]
mod tests {
    use super::{ServerEvent, StatusChange};
    use crate::protocol::util_sync;
    use std::io::Cursor;

    #[test]
    fn status_change_round_trip() {
        let mut buf = Vec::new();
        util_sync::write_string("STATUS_CHANGE", &mut buf).unwrap();
        util_sync::write_string("DOWN", &mut buf).unwrap();
        buf.push(4);
        buf.extend_from_slice(&[10, 0, 0, 7]);
        util_sync::write_int(9042, &mut buf).unwrap();
        let event = ServerEvent::parse(&mut Cursor::new(buf)).unwrap();
        assert_eq!(
            event,
            ServerEvent::Status(StatusChange::Down("10.0.0.7:9042".parse().unwrap()))
        );
    }
}
