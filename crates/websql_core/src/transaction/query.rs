//! A statement bound to a transaction.

use crate::transaction::callbacks::StatementCallbacks;
use crate::types::{ConnectionId, QueryId};
use serde_json::{json, Value};
use websql_bridge::Invocation;

/// One submitted statement, tracked until its result is delivered.
///
/// The owning transaction keeps queries in its outstanding set; removing a
/// query from that set is what makes its completion single-fire.
#[derive(Debug)]
pub(crate) struct Query {
    id: QueryId,
    sql: String,
    params: Vec<Value>,
    pub(crate) callbacks: StatementCallbacks,
}

impl Query {
    pub(crate) fn new(sql: String, params: Vec<Value>, callbacks: StatementCallbacks) -> Self {
        Self {
            id: QueryId::new(),
            sql,
            params,
            callbacks,
        }
    }

    pub(crate) fn id(&self) -> QueryId {
        self.id
    }

    pub(crate) fn sql(&self) -> &str {
        &self.sql
    }

    /// `executeSql(connectionId, sql, params, queryId)`.
    pub(crate) fn invocation(&self, service: &str, connection: &ConnectionId) -> Invocation {
        statement_invocation(service, connection, &self.sql, &self.params, self.id)
    }
}

pub(crate) fn statement_invocation(
    service: &str,
    connection: &ConnectionId,
    sql: &str,
    params: &[Value],
    id: QueryId,
) -> Invocation {
    Invocation::new(
        service,
        "executeSql",
        vec![
            connection.as_value().clone(),
            json!(sql),
            Value::Array(params.to_vec()),
            json!(id.to_string()),
        ],
    )
}
