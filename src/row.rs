use crate::protocol::parts::{CqlValue, ResultSetMetadata};
use crate::{CqlError, CqlResult, ProtocolVersion};
use std::sync::Arc;

/// A single line of a result set.
///
/// Cells are kept in their raw wire form and decoded on access, using the
/// metadata that was current when the row's page arrived.
#[derive(Clone, Debug)]
pub struct Row {
    metadata: Arc<ResultSetMetadata>,
    version: ProtocolVersion,
    cells: Vec<Option<Vec<u8>>>,
}

impl Row {
    pub(crate) fn new(
        metadata: Arc<ResultSetMetadata>,
        version: ProtocolVersion,
        cells: Vec<Option<Vec<u8>>>,
    ) -> Self {
        Self {
            metadata,
            version,
            cells,
        }
    }

    /// The metadata this row was decoded with.
    pub fn metadata(&self) -> &ResultSetMetadata {
        &self.metadata
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// The raw bytes of the i-th cell; `None` for NULL.
    pub fn raw(&self, index: usize) -> CqlResult<Option<&[u8]>> {
        self.cells
            .get(index)
            .map(Option::as_deref)
            .ok_or_else(|| self.no_such_column(index))
    }

    /// Decodes the i-th cell.
    pub fn value(&self, index: usize) -> CqlResult<CqlValue> {
        let cell = self
            .cells
            .get(index)
            .ok_or_else(|| self.no_such_column(index))?;
        match cell {
            None => Ok(CqlValue::Null),
            Some(bytes) => {
                let column = self
                    .metadata
                    .columns()
                    .get(index)
                    .ok_or_else(|| self.no_such_column(index))?;
                CqlValue::decode(bytes, column.cql_type(), self.version)
            }
        }
    }

    /// Decodes the cell of the named column.
    pub fn value_by_name(&self, name: &str) -> CqlResult<CqlValue> {
        let index = self
            .metadata
            .index_of(name)
            .ok_or_else(|| CqlError::UsageDetailed(format!("no column named {name:?}")))?;
        self.value(index)
    }

    fn no_such_column(&self, index: usize) -> CqlError {
        CqlError::UsageDetailed(format!(
            "column index {index} out of range, the row has {} columns",
            self.cells.len()
        ))
    }
}
