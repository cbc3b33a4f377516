use crate::protocol::parts::CqlType;
use crate::protocol::util_sync;
use crate::{CqlError, CqlResult, ProtocolVersion};

const FLAG_GLOBAL_TABLES_SPEC: i32 = 0x0001;
const FLAG_HAS_MORE_PAGES: i32 = 0x0002;
const FLAG_NO_METADATA: i32 = 0x0004;
const FLAG_METADATA_CHANGED: i32 = 0x0008;

/// Metadata of one column of a result set or of the bind variables of a
/// prepared statement.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ColumnMetadata {
    keyspace: String,
    table: String,
    name: String,
    cql_type: CqlType,
}

impl ColumnMetadata {
    /// Keyspace of the column's table.
    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    /// Table the column belongs to.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Name of the column.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type descriptor of the column.
    pub fn cql_type(&self) -> &CqlType {
        &self.cql_type
    }
}

/// Metadata of a result set: an ordered sequence of column descriptions,
/// plus the result-metadata id on protocol ≥ 5.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResultSetMetadata {
    columns: Vec<ColumnMetadata>,
    result_metadata_id: Option<Vec<u8>>,
}

/// What the server put around the column descriptions of one Rows result.
#[derive(Debug)]
pub(crate) struct RowsMetadataEnvelope {
    pub(crate) metadata: ResultSetMetadata,
    pub(crate) paging_state: Option<Vec<u8>>,
    /// The NO_METADATA flag was set; the cells must be interpreted with the
    /// metadata cached on the prepared statement.
    pub(crate) no_metadata: bool,
    /// Number of columns per row, also present when NO_METADATA is set.
    pub(crate) columns_count: usize,
    /// A new metadata id was announced (protocol ≥ 5, METADATA_CHANGED).
    pub(crate) metadata_changed: bool,
}

impl ResultSetMetadata {
    /// The columns, in server order.
    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Index of the column with the given name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// The result-metadata id, present on protocol ≥ 5.
    pub fn result_metadata_id(&self) -> Option<&[u8]> {
        self.result_metadata_id.as_deref()
    }

    pub(crate) fn set_result_metadata_id(&mut self, id: Option<Vec<u8>>) {
        self.result_metadata_id = id;
    }

    // Parses the metadata block of a RESULT::Rows body.
    pub(crate) fn parse_for_rows(
        rdr: &mut dyn std::io::Read,
        version: ProtocolVersion,
    ) -> CqlResult<RowsMetadataEnvelope> {
        let flags = util_sync::read_int(rdr)?;
        let columns_count = read_count(rdr)?;

        let metadata_changed = flags & FLAG_METADATA_CHANGED != 0;
        let result_metadata_id = if metadata_changed {
            if !version.supports_result_metadata_id() {
                return Err(CqlError::FrameFormat(format!(
                    "METADATA_CHANGED flag on protocol {version}"
                )));
            }
            Some(util_sync::read_short_bytes(rdr)?)
        } else {
            None
        };

        let paging_state = if flags & FLAG_HAS_MORE_PAGES == 0 {
            None
        } else {
            util_sync::read_bytes(rdr)?
        };

        let no_metadata = flags & FLAG_NO_METADATA != 0;
        let columns = if no_metadata {
            Vec::new()
        } else {
            parse_columns(rdr, version, flags, columns_count)?
        };

        Ok(RowsMetadataEnvelope {
            metadata: ResultSetMetadata {
                columns,
                result_metadata_id,
            },
            paging_state,
            no_metadata,
            columns_count,
            metadata_changed,
        })
    }

    // Parses the bind-variables metadata of a RESULT::Prepared body;
    // partition-key indexes are carried from protocol 4 on.
    pub(crate) fn parse_for_prepared_variables(
        rdr: &mut dyn std::io::Read,
        version: ProtocolVersion,
    ) -> CqlResult<(Self, Vec<u16>)> {
        let flags = util_sync::read_int(rdr)?;
        let columns_count = read_count(rdr)?;
        let pk_indexes = if version >= ProtocolVersion::V4 {
            let pk_count = read_count(rdr)?;
            let mut pk_indexes = Vec::with_capacity(pk_count);
            for _ in 0..pk_count {
                pk_indexes.push(util_sync::read_short(rdr)?);
            }
            pk_indexes
        } else {
            Vec::new()
        };
        let columns = parse_columns(rdr, version, flags, columns_count)?;
        Ok((
            Self {
                columns,
                result_metadata_id: None,
            },
            pk_indexes,
        ))
    }

    // Parses the result metadata of a RESULT::Prepared body.
    pub(crate) fn parse_for_prepared_result(
        rdr: &mut dyn std::io::Read,
        version: ProtocolVersion,
    ) -> CqlResult<Self> {
        let flags = util_sync::read_int(rdr)?;
        let columns_count = read_count(rdr)?;
        let columns = if flags & FLAG_NO_METADATA != 0 {
            Vec::new()
        } else {
            parse_columns(rdr, version, flags, columns_count)?
        };
        Ok(Self {
            columns,
            result_metadata_id: None,
        })
    }
}

fn read_count(rdr: &mut dyn std::io::Read) -> CqlResult<usize> {
    let count = util_sync::read_int(rdr)?;
    usize::try_from(count)
        .map_err(|_| CqlError::FrameFormat(format!("negative column count {count}")))
}

fn parse_columns(
    rdr: &mut dyn std::io::Read,
    version: ProtocolVersion,
    flags: i32,
    columns_count: usize,
) -> CqlResult<Vec<ColumnMetadata>> {
    let global_spec = if flags & FLAG_GLOBAL_TABLES_SPEC == 0 {
        None
    } else {
        let keyspace = util_sync::read_string(rdr)?;
        let table = util_sync::read_string(rdr)?;
        Some((keyspace, table))
    };
    let mut columns = Vec::with_capacity(columns_count);
    for _ in 0..columns_count {
        let (keyspace, table) = match &global_spec {
            Some((keyspace, table)) => (keyspace.clone(), table.clone()),
            None => {
                let keyspace = util_sync::read_string(rdr)?;
                let table = util_sync::read_string(rdr)?;
                (keyspace, table)
            }
        };
        let name = util_sync::read_string(rdr)?;
        let cql_type = CqlType::parse(rdr, version)?;
        columns.push(ColumnMetadata {
            keyspace,
            table,
            name,
            cql_type,
        });
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::ResultSetMetadata;
    use crate::protocol::util_sync;
    use crate::{CqlType, ProtocolVersion};
    use std::io::Cursor;

    fn rows_metadata_bytes(flags: i32, with_global_spec: bool) -> Vec<u8> {
        let mut buf = Vec::new();
        util_sync::write_int(flags, &mut buf).unwrap();
        util_sync::write_int(2, &mut buf).unwrap(); // columns
        if with_global_spec {
            util_sync::write_string("ks", &mut buf).unwrap();
            util_sync::write_string("tbl", &mut buf).unwrap();
        }
        for name in ["id", "name"] {
            if !with_global_spec {
                util_sync::write_string("ks", &mut buf).unwrap();
                util_sync::write_string("tbl", &mut buf).unwrap();
            }
            util_sync::write_string(name, &mut buf).unwrap();
            util_sync::write_short(if name == "id" { 0x0009 } else { 0x000D }, &mut buf)
                .unwrap();
        }
        buf
    }

    #[test]
    fn parses_global_and_per_column_specs() {
        for with_global_spec in [true, false] {
            let flags = i32::from(with_global_spec);
            let buf = rows_metadata_bytes(flags, with_global_spec);
            let envelope = ResultSetMetadata::parse_for_rows(
                &mut Cursor::new(buf),
                ProtocolVersion::V4,
            )
            .unwrap();
            assert!(!envelope.no_metadata);
            assert_eq!(envelope.columns_count, 2);
            assert_eq!(envelope.metadata.column_count(), 2);
            let columns = envelope.metadata.columns();
            assert_eq!(columns[0].keyspace(), "ks");
            assert_eq!(columns[0].table(), "tbl");
            assert_eq!(columns[0].name(), "id");
            assert_eq!(columns[0].cql_type(), &CqlType::Int);
            assert_eq!(columns[1].name(), "name");
            assert_eq!(columns[1].cql_type(), &CqlType::Text);
            assert_eq!(envelope.metadata.index_of("name"), Some(1));
        }
    }

    #[test]
    fn no_metadata_keeps_the_column_count() {
        let mut buf = Vec::new();
        util_sync::write_int(0x0004, &mut buf).unwrap();
        util_sync::write_int(3, &mut buf).unwrap();
        let envelope =
            ResultSetMetadata::parse_for_rows(&mut Cursor::new(buf), ProtocolVersion::V4)
                .unwrap();
        assert!(envelope.no_metadata);
        assert_eq!(envelope.columns_count, 3);
        assert_eq!(envelope.metadata.column_count(), 0);
    }
}
