use crate::protocol::parts::Consistency;

/// Per-statement execution options; unset fields fall back to the session's
/// [`QueryConfiguration`](crate::QueryConfiguration).
#[derive(Clone, Debug)]
pub struct StatementOptions {
    consistency: Option<Consistency>,
    serial_consistency: Option<Consistency>,
    page_size: Option<i32>,
    paging_state: Option<Vec<u8>>,
    timestamp: Option<i64>,
    keyspace: Option<String>,
    idempotent: Option<bool>,
    routing_key: Option<Vec<u8>>,
    auto_page: bool,
}

impl Default for StatementOptions {
    fn default() -> Self {
        Self {
            consistency: None,
            serial_consistency: None,
            page_size: None,
            paging_state: None,
            timestamp: None,
            keyspace: None,
            idempotent: None,
            routing_key: None,
            auto_page: true,
        }
    }
}

impl StatementOptions {
    /// Returns the statement's consistency, if set.
    pub fn consistency(&self) -> Option<Consistency> {
        self.consistency
    }
    /// Sets the statement's consistency.
    pub fn set_consistency(&mut self, consistency: Consistency) {
        self.consistency = Some(consistency);
    }
    /// Builder-method for setting the statement's consistency.
    #[must_use]
    pub fn with_consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = Some(consistency);
        self
    }

    /// Returns the serial consistency, if set.
    pub fn serial_consistency(&self) -> Option<Consistency> {
        self.serial_consistency
    }
    /// Sets the serial consistency for the paxos phase of a conditional
    /// statement.
    pub fn set_serial_consistency(&mut self, serial_consistency: Consistency) {
        self.serial_consistency = Some(serial_consistency);
    }

    /// Returns the page size, if set.
    pub fn page_size(&self) -> Option<i32> {
        self.page_size
    }
    /// Sets the page size (at least 1).
    pub fn set_page_size(&mut self, page_size: i32) {
        self.page_size = Some(page_size.max(1));
    }
    /// Builder-method for setting the page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: i32) -> Self {
        self.set_page_size(page_size);
        self
    }

    /// Returns the paging state to resume from, if set.
    pub fn paging_state(&self) -> Option<&[u8]> {
        self.paging_state.as_deref()
    }
    /// Resumes a paged read at the given opaque server cursor.
    pub fn set_paging_state(&mut self, paging_state: Option<Vec<u8>>) {
        self.paging_state = paging_state;
    }
    /// Builder-method for resuming at a paging state.
    #[must_use]
    pub fn with_paging_state(mut self, paging_state: Option<Vec<u8>>) -> Self {
        self.paging_state = paging_state;
        self
    }

    /// Returns the client-side timestamp, if set.
    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }
    /// Sets the mutation timestamp in microseconds since the epoch.
    pub fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = Some(timestamp);
    }

    /// Returns the per-request keyspace, if set (protocol ≥ 5).
    pub fn keyspace(&self) -> Option<&str> {
        self.keyspace.as_deref()
    }
    /// Sets the keyspace this statement runs in (protocol ≥ 5).
    pub fn set_keyspace<S: Into<String>>(&mut self, keyspace: S) {
        self.keyspace = Some(keyspace.into());
    }

    /// Whether the statement was declared idempotent; `None` means unknown.
    pub fn idempotent(&self) -> Option<bool> {
        self.idempotent
    }
    /// Declares whether the statement can safely be applied twice.
    pub fn set_idempotent(&mut self, idempotent: bool) {
        self.idempotent = Some(idempotent);
    }
    /// Builder-method for declaring idempotency.
    #[must_use]
    pub fn with_idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = Some(idempotent);
        self
    }

    /// Returns the explicit routing key, if set.
    pub fn routing_key(&self) -> Option<&[u8]> {
        self.routing_key.as_deref()
    }
    /// Overrides the routing key used for token- and shard-aware placement.
    pub fn set_routing_key(&mut self, routing_key: Vec<u8>) {
        self.routing_key = Some(routing_key);
    }

    /// Whether the result set fetches further pages transparently.
    pub fn auto_page(&self) -> bool {
        self.auto_page
    }
    /// Defines whether the result set fetches further pages transparently;
    /// with `false`, iteration stops at the buffered page and
    /// [`ResultSet::paging_state`](crate::ResultSet::paging_state) can be
    /// used to resume.
    pub fn set_auto_page(&mut self, auto_page: bool) {
        self.auto_page = auto_page;
    }
    /// Builder-method for switching transparent paging.
    #[must_use]
    pub fn with_auto_page(mut self, auto_page: bool) -> Self {
        self.auto_page = auto_page;
        self
    }
}
