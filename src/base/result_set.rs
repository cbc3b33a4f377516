use crate::row::Row;
use crate::rows::Rows;
use crate::session::{PageOutcome, SessionCore};
use crate::statement::Statement;
use crate::CqlResult;
use std::sync::Arc;

/// The result of a query: a lazy, single-pass sequence of rows.
///
/// With `auto_page` (the default), exhausting the buffered page triggers a
/// fetch of the next one over the same pool — not necessarily the same
/// connection. With `auto_page` off, iteration stops at the buffered page
/// and [`paging_state`](Self::paging_state) yields the cursor to resume
/// from later.
///
/// On protocol 5, a schema change between two pages rotates the result
/// metadata: rows of earlier pages keep the shape they arrived with, rows
/// of later pages carry the new columns.
#[derive(Debug)]
pub struct ResultSet {
    core: Arc<SessionCore>,
    statement: Statement,
    next_rows: Vec<Row>,
    row_iter: std::vec::IntoIter<Row>,
    paging_state: Option<Vec<u8>>,
    auto_page: bool,
}

impl ResultSet {
    pub(crate) fn new(
        core: Arc<SessionCore>,
        statement: Statement,
        outcome: PageOutcome,
    ) -> Self {
        let auto_page = statement.options().auto_page();
        let mut result_set = Self {
            core,
            statement,
            next_rows: Vec::new(),
            row_iter: Vec::new().into_iter(),
            paging_state: None,
            auto_page,
        };
        result_set.buffer_page(outcome);
        result_set
    }

    fn buffer_page(&mut self, outcome: PageOutcome) {
        let metadata = outcome.metadata;
        self.next_rows = outcome
            .rows
            .into_iter()
            .map(|cells| Row::new(metadata.clone(), outcome.version, cells))
            .collect();
        self.paging_state = outcome.paging_state;
    }

    /// The next row, transparently fetching the next page when the buffered
    /// one is exhausted and `auto_page` is on.
    pub async fn next_row(&mut self) -> CqlResult<Option<Row>> {
        loop {
            if let Some(row) = self.row_iter.next() {
                return Ok(Some(row));
            }
            if self.next_rows.is_empty() {
                if !self.auto_page || self.paging_state.is_none() {
                    return Ok(None);
                }
                // a page may legitimately be empty while more pages follow
                self.fetch_next_page().await?;
                continue;
            }
            let mut tmp_vec = Vec::<Row>::new();
            std::mem::swap(&mut tmp_vec, &mut self.next_rows);
            self.row_iter = tmp_vec.into_iter();
        }
    }

    async fn fetch_next_page(&mut self) -> CqlResult<()> {
        trace!("fetching the next page");
        let paging_state = self.paging_state.take();
        let outcome = self
            .core
            .clone()
            .fetch_page(&self.statement, paging_state)
            .await?;
        self.buffer_page(outcome);
        Ok(())
    }

    /// The cursor to resume after the buffered page; `None` once the server
    /// reported the result set as complete.
    pub fn paging_state(&self) -> Option<&[u8]> {
        self.paging_state.as_deref()
    }

    /// Number of rows currently buffered.
    pub fn buffered_len(&self) -> usize {
        self.next_rows.len() + self.row_iter.len()
    }

    /// Drains the remaining rows (fetching pages as configured) into a
    /// fully materialized [`Rows`].
    pub async fn try_collect(mut self) -> CqlResult<Rows> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await? {
            rows.push(row);
        }
        Ok(Rows::new(rows))
    }

    /// Convenience for single-row results: drains the result set and fails
    /// unless it holds exactly one row.
    pub async fn single_row(self) -> CqlResult<Row> {
        self.try_collect().await?.single_row()
    }
}
