use crate::row::Row;
use crate::{CqlError, CqlResult};

/// A fully materialized sequence of rows, produced by draining a
/// [`ResultSet`](crate::ResultSet).
#[derive(Debug)]
pub struct Rows {
    rows: Vec<Row>,
}

impl Rows {
    pub(crate) fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// The rows, in server order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The only row; fails when there is none or more than one.
    pub fn single_row(mut self) -> CqlResult<Row> {
        match self.rows.len() {
            0 => Err(CqlError::Usage("result set is empty")),
            1 => Ok(self.rows.remove(0)),
            _ => Err(CqlError::Usage("result set has more than one row")),
        }
    }
}

impl IntoIterator for Rows {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}
