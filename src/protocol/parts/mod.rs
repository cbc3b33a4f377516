mod consistency;
mod cql_type;
mod cql_value;
mod prepared;
mod result_set_metadata;
mod server_error;
mod server_event;
mod supported;

pub use self::consistency::Consistency;
pub use self::cql_type::CqlType;
pub use self::cql_value::CqlValue;
pub(crate) use self::prepared::PreparedResponse;
pub(crate) use self::result_set_metadata::RowsMetadataEnvelope;
pub use self::result_set_metadata::{ColumnMetadata, ResultSetMetadata};
pub(crate) use self::server_error::{parse_error_body, ErrorBody};
pub(crate) use self::server_event::parse_schema_change;
pub use self::server_error::ServerError;
pub use self::server_event::{SchemaChange, ServerEvent, StatusChange, TopologyChange};
pub(crate) use self::supported::SupportedOptions;
