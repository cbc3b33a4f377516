use crate::protocol::parts::{CqlValue, PreparedResponse, ResultSetMetadata};
use crate::statement::BoundStatement;
use crate::CqlResult;
use std::sync::{Arc, RwLock};

/// A statement prepared on the server, referenced by its opaque query id.
///
/// The result metadata is a mutable slot: when an EXECUTE on protocol ≥ 5
/// announces a new result-metadata id (after a schema change), the slot is
/// replaced atomically; concurrent readers see the old or the new metadata,
/// never a mixture.
#[derive(Debug)]
pub struct PreparedStatement {
    query_id: Vec<u8>,
    cql: String,
    keyspace_at_prepare: Option<String>,
    variables: Arc<ResultSetMetadata>,
    pk_indexes: Vec<u16>,
    result_metadata: RwLock<Arc<ResultSetMetadata>>,
    is_lwt: bool,
}

impl PreparedStatement {
    pub(crate) fn from_response(
        response: PreparedResponse,
        cql: String,
        keyspace_at_prepare: Option<String>,
        pk_indexes_fallback: Vec<u16>,
    ) -> Self {
        let pk_indexes = if response.pk_indexes.is_empty() {
            pk_indexes_fallback
        } else {
            response.pk_indexes
        };
        // a conditional mutation; the server gives no flag for this, the
        // text is the only source
        let is_lwt = detect_lwt(&cql);
        Self {
            query_id: response.id,
            cql,
            keyspace_at_prepare,
            variables: Arc::new(response.variables),
            pk_indexes,
            result_metadata: RwLock::new(Arc::new(response.result_metadata)),
            is_lwt,
        }
    }

    /// The opaque server-side id of this statement.
    pub fn query_id(&self) -> &[u8] {
        &self.query_id
    }

    /// The CQL text the statement was prepared from.
    pub fn cql(&self) -> &str {
        &self.cql
    }

    /// The keyspace that was current when the statement was prepared.
    pub fn keyspace_at_prepare(&self) -> Option<&str> {
        self.keyspace_at_prepare.as_deref()
    }

    /// Metadata of the bind variables.
    pub fn variables(&self) -> &ResultSetMetadata {
        &self.variables
    }

    /// Indexes of the partition-key columns within the bind variables.
    pub fn partition_key_indexes(&self) -> &[u16] {
        &self.pk_indexes
    }

    /// Whether the statement is a lightweight transaction (a conditional
    /// mutation).
    pub fn is_lwt(&self) -> bool {
        self.is_lwt
    }

    /// A snapshot of the current result metadata.
    #[allow(clippy::missing_panics_doc)]
    pub fn result_metadata(&self) -> Arc<ResultSetMetadata> {
        self.result_metadata.read().unwrap().clone()
    }

    /// The current result-metadata id (protocol ≥ 5).
    pub fn result_metadata_id(&self) -> Option<Vec<u8>> {
        self.result_metadata
            .read()
            .unwrap()
            .result_metadata_id()
            .map(<[u8]>::to_vec)
    }

    // Replaces the result-metadata slot after the server rotated the id.
    pub(crate) fn rotate_result_metadata(&self, new_metadata: Arc<ResultSetMetadata>) {
        debug!(
            "rotate_result_metadata(): new id = {:?}",
            new_metadata.result_metadata_id().map(hex::encode)
        );
        *self.result_metadata.write().unwrap() = new_metadata;
    }

    /// Binds concrete values, yielding an executable statement. The number
    /// of values must match the number of bind variables.
    pub fn bind(self: &Arc<Self>, values: Vec<CqlValue>) -> CqlResult<BoundStatement> {
        BoundStatement::new(self.clone(), values)
    }
}

// UPDATE/INSERT/DELETE with an IF clause are paxos-backed; their result rows
// come back in a different shape, which callers may want to know up front.
fn detect_lwt(cql: &str) -> bool {
    let upper = cql.to_ascii_uppercase();
    let is_mutation = ["INSERT", "UPDATE", "DELETE"]
        .iter()
        .any(|kw| upper.trim_start().starts_with(kw));
    is_mutation
        && (upper.contains(" IF ")
            || upper.ends_with(" IF EXISTS")
            || upper.ends_with(" IF NOT EXISTS"))
}
