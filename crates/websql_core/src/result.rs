//! Statement result sets.

use crate::error::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

/// Rows returned by a statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    items: Vec<Value>,
}

impl Rows {
    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Row at `index`, as returned by the backend.
    #[must_use]
    pub fn item(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    /// Row at `index`, decoded into `T`.
    pub fn item_as<T: DeserializeOwned>(&self, index: usize) -> CoreResult<Option<T>> {
        self.items
            .get(index)
            .map(|row| T::deserialize(row).map_err(CoreError::from))
            .transpose()
    }

    /// Iterates over the rows.
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.items.iter()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultPayload {
    #[serde(default)]
    rows: Vec<Value>,
    #[serde(default)]
    rows_affected: u64,
    #[serde(default)]
    insert_id: Option<i64>,
}

/// The result of one successful statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    rows: Rows,
    rows_affected: u64,
    insert_id: Option<i64>,
}

impl ResultSet {
    /// Builds a result set from an `executeSql` response.
    ///
    /// Accepts a bare row array, `null` (no rows), or an object
    /// `{ "rows": [...], "rowsAffected": n, "insertId": n }`.
    pub fn from_backend(value: Value) -> CoreResult<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Array(items) => Ok(Self {
                rows: Rows { items },
                ..Self::default()
            }),
            Value::Object(_) => {
                let payload: ResultPayload = serde_json::from_value(value)
                    .map_err(|e| CoreError::invalid_response("executeSql", e.to_string()))?;
                Ok(Self {
                    rows: Rows {
                        items: payload.rows,
                    },
                    rows_affected: payload.rows_affected,
                    insert_id: payload.insert_id,
                })
            }
            other => Err(CoreError::invalid_response(
                "executeSql",
                format!("expected rows, got {other}"),
            )),
        }
    }

    /// The returned rows.
    #[must_use]
    pub fn rows(&self) -> &Rows {
        &self.rows
    }

    /// Rows changed by the statement, when the backend reports it.
    #[must_use]
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    /// Row id of the last insert, when the backend reports it.
    #[must_use]
    pub fn insert_id(&self) -> Option<i64> {
        self.insert_id
    }
}
