use crate::protocol::parts::ResultSetMetadata;
use crate::protocol::util_sync;
use crate::{CqlResult, ProtocolVersion};

/// The body of a RESULT::Prepared message.
#[derive(Debug)]
pub(crate) struct PreparedResponse {
    pub(crate) id: Vec<u8>,
    pub(crate) result_metadata_id: Option<Vec<u8>>,
    pub(crate) variables: ResultSetMetadata,
    pub(crate) pk_indexes: Vec<u16>,
    pub(crate) result_metadata: ResultSetMetadata,
}

impl PreparedResponse {
    pub(crate) fn parse(
        rdr: &mut dyn std::io::Read,
        version: ProtocolVersion,
    ) -> CqlResult<Self> {
        let id = util_sync::read_short_bytes(rdr)?;
        let result_metadata_id = if version.supports_result_metadata_id() {
            Some(util_sync::read_short_bytes(rdr)?)
        } else {
            None
        };
        let (variables, pk_indexes) =
            ResultSetMetadata::parse_for_prepared_variables(rdr, version)?;
        let mut result_metadata = ResultSetMetadata::parse_for_prepared_result(rdr, version)?;
        result_metadata.set_result_metadata_id(result_metadata_id.clone());
        Ok(Self {
            id,
            result_metadata_id,
            variables,
            pk_indexes,
            result_metadata,
        })
    }
}
