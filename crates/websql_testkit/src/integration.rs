//! Cross-crate integration helpers.
//!
//! Backends that plug into [`websql_bridge::Exec`] so the coordinator can
//! be exercised through the same dispatch path a real host uses.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use websql_bridge::{
    BridgeResult, Exec, ImmediateResult, NativeChannel, Plugin, Responder,
};

#[derive(Default)]
struct StorageState {
    next_connection: u64,
    /// Connection id to database name.
    connections: HashMap<u64, String>,
    /// Database name to `storage` table contents.
    tables: HashMap<String, BTreeMap<String, String>>,
    created: HashSet<String>,
}

/// An in-process `WebSql` service that understands the statements of the
/// key/value store and answers every other statement with no rows.
///
/// Answers are synchronous unless [`StoragePlugin::deferred`] is used, in
/// which case they are held until [`StoragePlugin::flush`].
#[derive(Default)]
pub struct StoragePlugin {
    state: Mutex<StorageState>,
    deferred: bool,
    held: Mutex<Vec<(Responder, Value)>>,
}

impl StoragePlugin {
    /// Plugin that answers inside `execute`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Plugin that holds answers until [`StoragePlugin::flush`].
    pub fn deferred() -> Self {
        Self {
            deferred: true,
            ..Self::default()
        }
    }

    /// Releases held answers, oldest first. Returns how many were sent.
    pub fn flush(&self) -> usize {
        let mut sent = 0;
        loop {
            let next = {
                let mut held = self.held.lock();
                if held.is_empty() {
                    None
                } else {
                    Some(held.remove(0))
                }
            };
            let Some((responder, value)) = next else {
                return sent;
            };
            responder.success(value);
            sent += 1;
        }
    }

    /// Snapshot of the `storage` table of `database`.
    pub fn table(&self, database: &str) -> BTreeMap<String, String> {
        self.state
            .lock()
            .tables
            .get(database)
            .cloned()
            .unwrap_or_default()
    }

    /// Builds an [`Exec`] with this plugin registered as `WebSql`.
    pub fn into_exec(self: Arc<Self>) -> Exec {
        let exec = Exec::new();
        exec.register_plugin("WebSql", self);
        exec
    }

    fn answer(&self, action: &str, args: &[Value]) -> Result<Value, String> {
        let mut state = self.state.lock();
        match action {
            "open" => {
                let name = arg_str(args, 0)?;
                Ok(Value::Bool(state.created.insert(name.to_string())))
            }
            "connect" => {
                let name = arg_str(args, 0)?.to_string();
                state.next_connection += 1;
                let id = state.next_connection;
                state.connections.insert(id, name);
                Ok(json!({ "connectionId": id }))
            }
            "removeDatabase" => {
                let name = arg_str(args, 0)?;
                state.tables.remove(name);
                state.created.remove(name);
                Ok(Value::Null)
            }
            "executeSql" => {
                let connection = args
                    .first()
                    .and_then(Value::as_u64)
                    .ok_or("missing connection id")?;
                let database = state
                    .connections
                    .get(&connection)
                    .cloned()
                    .ok_or("unknown connection")?;
                let sql = arg_str(args, 1)?.to_string();
                let params = args.get(2).and_then(Value::as_array).cloned().unwrap_or_default();
                let table = state.tables.entry(database).or_default();
                Ok(run_storage_sql(table, &sql, &params))
            }
            other => Err(format!("unknown action {other}")),
        }
    }
}

impl Plugin for StoragePlugin {
    fn execute(&self, action: &str, args: &[Value], responder: Responder) -> ImmediateResult {
        match self.answer(action, args) {
            Ok(value) if self.deferred => {
                self.held.lock().push((responder, value));
                ImmediateResult::no_result()
            }
            Ok(value) => ImmediateResult::ok(value),
            Err(message) => ImmediateResult::error(json!({ "message": message })),
        }
    }
}

fn arg_str(args: &[Value], index: usize) -> Result<&str, String> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("argument {index} must be a string"))
}

fn param_string(params: &[Value], index: usize) -> String {
    match params.get(index) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn run_storage_sql(table: &mut BTreeMap<String, String>, sql: &str, params: &[Value]) -> Value {
    if sql.starts_with("REPLACE INTO storage") {
        table.insert(param_string(params, 0), param_string(params, 1));
        json!({ "rows": [], "rowsAffected": 1 })
    } else if sql.starts_with("DELETE FROM storage where id=?") {
        let removed = table.remove(&param_string(params, 0)).is_some();
        json!({ "rows": [], "rowsAffected": u64::from(removed) })
    } else if sql.starts_with("DELETE FROM storage") {
        let removed = table.len();
        table.clear();
        json!({ "rows": [], "rowsAffected": removed })
    } else if sql.starts_with("SELECT * FROM storage") {
        let rows: Vec<Value> = table
            .iter()
            .map(|(id, body)| json!({ "id": id, "body": body }))
            .collect();
        Value::Array(rows)
    } else {
        json!([])
    }
}

/// A call received by a [`RecordingChannel`].
#[derive(Debug, Clone, PartialEq)]
pub struct NativeCall {
    /// Registry id to complete the call with.
    pub callback_id: String,
    /// Service name.
    pub service: String,
    /// Action name.
    pub action: String,
    /// Arguments, decoded.
    pub args: Vec<Value>,
}

/// A [`NativeChannel`] that records calls and leaves them pending.
///
/// Tests complete them through [`Exec::complete`] / [`Exec::fail`].
#[derive(Default)]
pub struct RecordingChannel {
    calls: Mutex<Vec<NativeCall>>,
}

impl RecordingChannel {
    /// Creates an empty channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls received so far.
    pub fn calls(&self) -> Vec<NativeCall> {
        self.calls.lock().clone()
    }

    /// The most recent call.
    pub fn last(&self) -> Option<NativeCall> {
        self.calls.lock().last().cloned()
    }
}

impl NativeChannel for RecordingChannel {
    fn call(
        &self,
        callback_id: &str,
        service: &str,
        action: &str,
        args_json: &str,
    ) -> BridgeResult<ImmediateResult> {
        let args: Vec<Value> = serde_json::from_str(args_json)?;
        self.calls.lock().push(NativeCall {
            callback_id: callback_id.to_string(),
            service: service.to_string(),
            action: action.to_string(),
            args,
        });
        Ok(ImmediateResult::no_result())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use websql_bridge::{BridgePort, Callbacks, Invocation};

    #[test]
    fn test_storage_sql() {
        let mut table = BTreeMap::new();
        run_storage_sql(
            &mut table,
            "REPLACE INTO storage (id, body) values(?,?)",
            &[json!("k"), json!("v")],
        );
        assert_eq!(
            run_storage_sql(&mut table, "SELECT * FROM storage", &[]),
            json!([{ "id": "k", "body": "v" }])
        );
        run_storage_sql(&mut table, "DELETE FROM storage where id=?", &[json!("k")]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_plugin_through_exec() {
        let exec = Arc::new(StoragePlugin::new()).into_exec();
        let seen = Arc::new(Mutex::new(None));
        let seen_in = Arc::clone(&seen);
        exec.invoke(
            Invocation::new("WebSql", "connect", vec![json!("db")]),
            Callbacks::new(move |v| *seen_in.lock() = Some(v), |_| {}),
        );
        assert_eq!(seen.lock().take(), Some(json!({ "connectionId": 1 })));
        assert_eq!(exec.registry().pending_count(), 0);
    }

    #[test]
    fn test_recording_channel() {
        let channel = Arc::new(RecordingChannel::new());
        let exec = Exec::with_native(channel.clone());
        exec.invoke(
            Invocation::new("WebSql", "open", vec![json!("db")]),
            Callbacks::none(),
        );
        let call = channel.last().unwrap();
        assert_eq!(call.action, "open");
        assert_eq!(call.args, vec![json!("db")]);
        assert!(exec.complete(&call.callback_id, json!(true)));
        assert!(!exec.complete(&call.callback_id, json!(true)));
    }
}
