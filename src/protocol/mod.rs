//! The CQL binary protocol: framing, request/reply model, and the wire-level
//! parts they are made of.

mod frame;
mod opcode;
pub(crate) mod parts;
mod reply;
mod request;
pub(crate) mod util_sync;
mod version;

pub(crate) use self::frame::{
    encode_request, read_frame, write_frame, FrameHeader, FLAG_COMPRESSION, FLAG_CUSTOM_PAYLOAD,
    FLAG_TRACING, FLAG_USE_BETA, FLAG_WARNING,
};
pub(crate) use self::opcode::Opcode;
pub(crate) use self::reply::{Reply, ResultKind, RowsPage};
pub(crate) use self::request::{BatchChild, QueryParameters, Request, WireValue};
pub use self::version::ProtocolVersion;
