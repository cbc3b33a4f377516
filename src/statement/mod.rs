//! The statement model: simple, bound and batch statements, plus the
//! per-statement options.

mod options;
mod prepared_statement;

pub use self::options::StatementOptions;
pub use self::prepared_statement::PreparedStatement;

use crate::protocol::parts::{CqlValue, ResultSetMetadata};
use crate::protocol::WireValue;
use crate::{CqlError, CqlResult, ProtocolVersion};
use std::sync::Arc;

/// Kind of a batch, as the server interprets it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BatchKind {
    /// Atomic through the batch log.
    Logged = 0,
    /// No batch log; partitions may be applied independently.
    Unlogged = 1,
    /// For counter updates only.
    Counter = 2,
}

/// Bind values of a simple statement.
#[derive(Clone, Debug, Default)]
pub enum QueryValues {
    /// No bind markers.
    #[default]
    None,
    /// Values for positional `?` markers.
    Positional(Vec<CqlValue>),
    /// Values for named `:name` markers (protocol ≥ 3).
    Named(Vec<(String, CqlValue)>),
}

impl QueryValues {
    /// Whether there are no values.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::None => true,
            Self::Positional(values) => values.is_empty(),
            Self::Named(values) => values.is_empty(),
        }
    }
}

/// A CQL statement sent as plain text, parsed by the server on every
/// execution.
#[derive(Clone, Debug)]
pub struct SimpleStatement {
    cql: String,
    values: QueryValues,
    options: StatementOptions,
}

impl SimpleStatement {
    /// Creates a statement from its CQL text.
    pub fn new<S: Into<String>>(cql: S) -> Self {
        Self {
            cql: cql.into(),
            values: QueryValues::None,
            options: StatementOptions::default(),
        }
    }

    /// The CQL text.
    pub fn cql(&self) -> &str {
        &self.cql
    }

    /// Sets the bind values.
    #[must_use]
    pub fn with_values(mut self, values: QueryValues) -> Self {
        self.values = values;
        self
    }

    /// The bind values.
    pub fn values(&self) -> &QueryValues {
        &self.values
    }

    /// The statement options.
    pub fn options(&self) -> &StatementOptions {
        &self.options
    }

    /// Mutable access to the statement options.
    pub fn options_mut(&mut self) -> &mut StatementOptions {
        &mut self.options
    }

    /// Builder-method for replacing the options.
    #[must_use]
    pub fn with_options(mut self, options: StatementOptions) -> Self {
        self.options = options;
        self
    }
}

impl From<&str> for SimpleStatement {
    fn from(cql: &str) -> Self {
        Self::new(cql)
    }
}

impl From<String> for SimpleStatement {
    fn from(cql: String) -> Self {
        Self::new(cql)
    }
}

/// A prepared statement paired with concrete bind values.
#[derive(Clone, Debug)]
pub struct BoundStatement {
    prepared: Arc<PreparedStatement>,
    values: Vec<CqlValue>,
    options: StatementOptions,
}

impl BoundStatement {
    pub(crate) fn new(
        prepared: Arc<PreparedStatement>,
        values: Vec<CqlValue>,
    ) -> CqlResult<Self> {
        let expected = prepared.variables().column_count();
        if values.len() != expected {
            return Err(CqlError::UsageDetailed(format!(
                "statement has {expected} bind variables, {} values given",
                values.len()
            )));
        }
        Ok(Self {
            prepared,
            values,
            options: StatementOptions::default(),
        })
    }

    /// The underlying prepared statement.
    pub fn prepared(&self) -> &Arc<PreparedStatement> {
        &self.prepared
    }

    /// The bound values, aligned with the variables metadata.
    pub fn values(&self) -> &[CqlValue] {
        &self.values
    }

    /// The statement options.
    pub fn options(&self) -> &StatementOptions {
        &self.options
    }

    /// Mutable access to the statement options.
    pub fn options_mut(&mut self) -> &mut StatementOptions {
        &mut self.options
    }

    /// Builder-method for replacing the options.
    #[must_use]
    pub fn with_options(mut self, options: StatementOptions) -> Self {
        self.options = options;
        self
    }

    /// The routing key of this execution: an explicit option wins, otherwise
    /// it is derived from the serialized partition-key columns. Absent when
    /// any partition-key column is null or unset.
    pub fn routing_key(&self, version: ProtocolVersion) -> Option<Vec<u8>> {
        if let Some(key) = self.options.routing_key() {
            return Some(key.to_vec());
        }
        let pk_indexes = self.prepared.partition_key_indexes();
        if pk_indexes.is_empty() {
            return None;
        }
        let columns = self.prepared.variables().columns();
        let mut components = Vec::with_capacity(pk_indexes.len());
        for index in pk_indexes {
            let index = usize::from(*index);
            let value = self.values.get(index)?;
            if matches!(value, CqlValue::Null | CqlValue::Unset) {
                return None;
            }
            let column = columns.get(index)?;
            components.push(value.encode(column.cql_type(), version).ok()?);
        }
        crate::routing::compose_routing_key(&components)
    }
}

/// One child of a batch statement.
#[derive(Clone, Debug)]
pub enum BatchChildStatement {
    /// A simple statement with positional values.
    Simple(SimpleStatement),
    /// A bound statement.
    Bound(BoundStatement),
}

/// A batch of simple and bound statements, executed atomically by one
/// coordinator.
#[derive(Clone, Debug)]
pub struct BatchStatement {
    kind: BatchKind,
    children: Vec<BatchChildStatement>,
    options: StatementOptions,
}

impl BatchStatement {
    /// Creates an empty batch.
    pub fn new(kind: BatchKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
            options: StatementOptions::default(),
        }
    }

    /// Appends a simple statement.
    pub fn push_simple(&mut self, statement: SimpleStatement) {
        self.children.push(BatchChildStatement::Simple(statement));
    }

    /// Appends a bound statement.
    pub fn push_bound(&mut self, statement: BoundStatement) {
        self.children.push(BatchChildStatement::Bound(statement));
    }

    /// The kind of the batch.
    pub fn kind(&self) -> BatchKind {
        self.kind
    }

    /// The children, in execution order.
    pub fn children(&self) -> &[BatchChildStatement] {
        &self.children
    }

    /// The statement options.
    pub fn options(&self) -> &StatementOptions {
        &self.options
    }

    /// Mutable access to the statement options.
    pub fn options_mut(&mut self) -> &mut StatementOptions {
        &mut self.options
    }
}

/// Any executable statement.
#[derive(Clone, Debug)]
pub enum Statement {
    /// Plain CQL text.
    Simple(SimpleStatement),
    /// A prepared statement with values.
    Bound(BoundStatement),
    /// A batch.
    Batch(BatchStatement),
}

impl Statement {
    /// The options of the statement.
    pub fn options(&self) -> &StatementOptions {
        match self {
            Self::Simple(s) => s.options(),
            Self::Bound(s) => s.options(),
            Self::Batch(s) => s.options(),
        }
    }

    /// The routing key of the statement, when one can be determined.
    pub fn routing_key(&self, version: ProtocolVersion) -> Option<Vec<u8>> {
        match self {
            Self::Simple(s) => s.options().routing_key().map(<[u8]>::to_vec),
            Self::Bound(s) => s.routing_key(version),
            // first child with a key decides, like one coordinator does
            Self::Batch(s) => s.children().iter().find_map(|child| match child {
                BatchChildStatement::Simple(s) => s.options().routing_key().map(<[u8]>::to_vec),
                BatchChildStatement::Bound(s) => s.routing_key(version),
            }),
        }
    }

    /// Whether the statement was marked idempotent; unknown counts as no.
    pub fn is_idempotent(&self) -> bool {
        self.options().idempotent().unwrap_or(false)
    }
}

impl From<SimpleStatement> for Statement {
    fn from(statement: SimpleStatement) -> Self {
        Self::Simple(statement)
    }
}

impl From<&str> for Statement {
    fn from(cql: &str) -> Self {
        Self::Simple(SimpleStatement::new(cql))
    }
}

impl From<BoundStatement> for Statement {
    fn from(statement: BoundStatement) -> Self {
        Self::Bound(statement)
    }
}

impl From<BatchStatement> for Statement {
    fn from(statement: BatchStatement) -> Self {
        Self::Batch(statement)
    }
}

// Serializes simple-statement values; descriptors are inferred from the
// runtime values.
pub(crate) fn wire_values_inferred(
    values: &QueryValues,
    version: ProtocolVersion,
) -> CqlResult<(Vec<WireValue>, Option<Vec<String>>)> {
    match values {
        QueryValues::None => Ok((Vec::new(), None)),
        QueryValues::Positional(values) => {
            let mut wire = Vec::with_capacity(values.len());
            for value in values {
                wire.push(wire_value_inferred(value, version)?);
            }
            Ok((wire, None))
        }
        QueryValues::Named(values) => {
            let mut wire = Vec::with_capacity(values.len());
            let mut names = Vec::with_capacity(values.len());
            for (name, value) in values {
                names.push(name.clone());
                wire.push(wire_value_inferred(value, version)?);
            }
            Ok((wire, Some(names)))
        }
    }
}

fn wire_value_inferred(value: &CqlValue, version: ProtocolVersion) -> CqlResult<WireValue> {
    Ok(match value {
        CqlValue::Null => WireValue::Null,
        CqlValue::Unset => WireValue::Unset,
        value => WireValue::Bytes(value.encode(&value.infer_type()?, version)?),
    })
}

// Serializes bound values against the variables metadata of the prepared
// statement.
pub(crate) fn wire_values_bound(
    values: &[CqlValue],
    variables: &ResultSetMetadata,
    version: ProtocolVersion,
) -> CqlResult<Vec<WireValue>> {
    let mut wire = Vec::with_capacity(values.len());
    for (value, column) in values.iter().zip(variables.columns()) {
        wire.push(match value {
            CqlValue::Null => WireValue::Null,
            CqlValue::Unset => WireValue::Unset,
            value => WireValue::Bytes(value.encode(column.cql_type(), version)?),
        });
    }
    Ok(wire)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inferred_values_serialize() {
        let (wire, names) = wire_values_inferred(
            &QueryValues::Positional(vec![
                CqlValue::Int(7),
                CqlValue::Null,
                CqlValue::Text("x".to_string()),
            ]),
            ProtocolVersion::V4,
        )
        .unwrap();
        assert!(names.is_none());
        assert_eq!(wire.len(), 3);
        assert!(matches!(&wire[0], WireValue::Bytes(b) if b == &7_i32.to_be_bytes().to_vec()));
        assert!(matches!(&wire[1], WireValue::Null));
    }

    #[test]
    fn named_values_carry_names() {
        let (wire, names) = wire_values_inferred(
            &QueryValues::Named(vec![("id".to_string(), CqlValue::Int(1))]),
            ProtocolVersion::V4,
        )
        .unwrap();
        assert_eq!(names.unwrap(), ["id".to_string()]);
        assert_eq!(wire.len(), 1);
    }
}
