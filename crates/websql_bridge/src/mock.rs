//! Scripted in-process backend.

use crate::error::BridgeError;
use crate::port::{BridgePort, Callbacks, Invocation};
use crate::status::ImmediateResult;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;

/// When a [`ScriptedBridge`] runs continuations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Inside `invoke`, before it returns.
    Immediate,
    /// Only when the test resolves the call.
    Deferred,
}

/// The scripted answer to one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Resolve with a value.
    Success(Value),
    /// Resolve with a backend error payload.
    Failure(Value),
    /// Never resolve on its own.
    Hang,
}

/// What the `open` action reports as its "created" flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenFlag {
    /// `true` only the first time a name is opened on this bridge.
    FirstOpenOnly,
    /// `true` on every open.
    Always,
    /// `false` on every open.
    Never,
}

/// A call observed by the bridge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedCall {
    /// Submission order, starting at 0.
    pub seq: u64,
    /// Service name.
    pub service: String,
    /// Action name.
    pub action: String,
    /// Arguments as submitted.
    pub args: Vec<Value>,
}

impl RecordedCall {
    /// SQL text of an `executeSql` call.
    #[must_use]
    pub fn sql(&self) -> Option<&str> {
        if self.action == "executeSql" {
            self.args.get(1).and_then(Value::as_str)
        } else {
            None
        }
    }

    /// Connection id argument of an `executeSql` call.
    #[must_use]
    pub fn connection(&self) -> Option<&Value> {
        if self.action == "executeSql" {
            self.args.first()
        } else {
            None
        }
    }
}

struct PendingCall {
    seq: u64,
    outcome: Outcome,
    callbacks: Callbacks,
}

struct ScriptState {
    resolution: Resolution,
    calls: Vec<RecordedCall>,
    pending: Vec<PendingCall>,
    sql_rules: Vec<(String, Outcome)>,
    connect_outcome: Option<Outcome>,
    open_outcome: Option<Outcome>,
    open_flag: OpenFlag,
    opened: HashSet<String>,
    next_connection: u64,
}

/// A [`BridgePort`] that answers `WebSql` actions from rules.
///
/// - `connect` answers `{"connectionId": n}` with n counting from 1
/// - `open` answers the created flag chosen by [`OpenFlag`]
/// - `executeSql` answers the first matching SQL rule, else an empty row set
/// - `removeDatabase` answers `null`
///
/// Every call is recorded. In [`Resolution::Deferred`] mode the test
/// decides when, and in which order, pending calls resolve.
pub struct ScriptedBridge {
    state: Mutex<ScriptState>,
}

impl ScriptedBridge {
    /// Creates a bridge that resolves inside `invoke`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_resolution(Resolution::Immediate)
    }

    /// Creates a bridge whose calls wait for the test.
    #[must_use]
    pub fn deferred() -> Self {
        Self::with_resolution(Resolution::Deferred)
    }

    /// Creates a bridge with the given resolution mode.
    #[must_use]
    pub fn with_resolution(resolution: Resolution) -> Self {
        Self {
            state: Mutex::new(ScriptState {
                resolution,
                calls: Vec::new(),
                pending: Vec::new(),
                sql_rules: Vec::new(),
                connect_outcome: None,
                open_outcome: None,
                open_flag: OpenFlag::FirstOpenOnly,
                opened: HashSet::new(),
                next_connection: 1,
            }),
        }
    }

    /// Changes the resolution mode for future calls.
    pub fn set_resolution(&self, resolution: Resolution) {
        self.state.lock().resolution = resolution;
    }

    /// Answers `executeSql` calls whose SQL contains `pattern`.
    ///
    /// Rules are checked in insertion order; the first match wins.
    pub fn on_sql(&self, pattern: impl Into<String>, outcome: Outcome) {
        self.state.lock().sql_rules.push((pattern.into(), outcome));
    }

    /// Answers matching statements with `rows`.
    pub fn rows_for(&self, pattern: impl Into<String>, rows: Vec<Value>) {
        self.on_sql(pattern, Outcome::Success(Value::Array(rows)));
    }

    /// Fails matching statements with `message`.
    pub fn fail_sql(&self, pattern: impl Into<String>, message: &str) {
        self.on_sql(pattern, Outcome::Failure(json!({ "message": message })));
    }

    /// Overrides the answer to `connect`.
    pub fn set_connect_outcome(&self, outcome: Outcome) {
        self.state.lock().connect_outcome = Some(outcome);
    }

    /// Overrides the answer to `open`.
    pub fn set_open_outcome(&self, outcome: Outcome) {
        self.state.lock().open_outcome = Some(outcome);
    }

    /// Chooses the created flag reported by `open`.
    pub fn set_open_flag(&self, flag: OpenFlag) {
        self.state.lock().open_flag = flag;
    }

    /// All calls seen so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    /// Calls of one action.
    #[must_use]
    pub fn calls_for(&self, action: &str) -> Vec<RecordedCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.action == action)
            .cloned()
            .collect()
    }

    /// SQL text of every `executeSql` call, in submission order.
    #[must_use]
    pub fn executed_sql(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| c.sql().map(str::to_string))
            .collect()
    }

    /// Sequence numbers of unresolved calls, oldest first.
    #[must_use]
    pub fn pending_seqs(&self) -> Vec<u64> {
        self.state.lock().pending.iter().map(|p| p.seq).collect()
    }

    /// Number of unresolved calls.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Resolves call `seq` with its scripted outcome.
    ///
    /// Returns `false` if the call is not pending or is scripted to hang.
    pub fn resolve(&self, seq: u64) -> bool {
        let taken = {
            let mut state = self.state.lock();
            match state.pending.iter().position(|p| p.seq == seq) {
                Some(pos) if state.pending[pos].outcome != Outcome::Hang => {
                    Some(state.pending.remove(pos))
                }
                _ => None,
            }
        };
        match taken {
            Some(call) => {
                fire(call.outcome, call.callbacks);
                true
            }
            None => false,
        }
    }

    /// Resolves call `seq` with `outcome`, ignoring the script.
    pub fn resolve_with(&self, seq: u64, outcome: Outcome) -> bool {
        let taken = {
            let mut state = self.state.lock();
            state
                .pending
                .iter()
                .position(|p| p.seq == seq)
                .map(|pos| state.pending.remove(pos))
        };
        match taken {
            Some(call) => {
                fire(outcome, call.callbacks);
                true
            }
            None => false,
        }
    }

    /// Resolves the oldest resolvable call.
    pub fn resolve_next(&self) -> bool {
        let next = self.resolvable_seqs().into_iter().next();
        next.is_some_and(|seq| self.resolve(seq))
    }

    /// Resolves the newest resolvable call.
    pub fn resolve_last(&self) -> bool {
        let last = self.resolvable_seqs().into_iter().last();
        last.is_some_and(|seq| self.resolve(seq))
    }

    /// Resolves calls oldest-first until only hanging ones remain.
    ///
    /// Returns the number of calls resolved.
    pub fn run_until_idle(&self) -> usize {
        let mut resolved = 0;
        while self.resolve_next() {
            resolved += 1;
        }
        resolved
    }

    /// Resolves calls newest-first until only hanging ones remain.
    pub fn run_until_idle_lifo(&self) -> usize {
        let mut resolved = 0;
        while self.resolve_last() {
            resolved += 1;
        }
        resolved
    }

    fn resolvable_seqs(&self) -> Vec<u64> {
        self.state
            .lock()
            .pending
            .iter()
            .filter(|p| p.outcome != Outcome::Hang)
            .map(|p| p.seq)
            .collect()
    }
}

impl Default for ScriptedBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptState {
    fn outcome_for(&mut self, invocation: &Invocation) -> Outcome {
        match invocation.action.as_str() {
            "connect" => self.connect_outcome.clone().unwrap_or_else(|| {
                let id = self.next_connection;
                self.next_connection += 1;
                Outcome::Success(json!({ "connectionId": id }))
            }),
            "open" => {
                if let Some(outcome) = &self.open_outcome {
                    return outcome.clone();
                }
                let name = invocation
                    .args
                    .first()
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let first = self.opened.insert(name);
                let created = match self.open_flag {
                    OpenFlag::FirstOpenOnly => first,
                    OpenFlag::Always => true,
                    OpenFlag::Never => false,
                };
                Outcome::Success(Value::Bool(created))
            }
            "executeSql" => {
                let sql = invocation.args.get(1).and_then(Value::as_str).unwrap_or("");
                self.sql_rules
                    .iter()
                    .find(|(pattern, _)| sql.contains(pattern.as_str()))
                    .map(|(_, outcome)| outcome.clone())
                    .unwrap_or_else(|| Outcome::Success(json!([])))
            }
            "removeDatabase" => {
                if let Some(name) = invocation.args.first().and_then(Value::as_str) {
                    self.opened.remove(name);
                }
                Outcome::Success(Value::Null)
            }
            other => Outcome::Failure(json!({ "message": format!("unknown action {other}") })),
        }
    }
}

fn fire(outcome: Outcome, callbacks: Callbacks) {
    match outcome {
        Outcome::Success(value) => callbacks.succeed(value),
        Outcome::Failure(payload) => callbacks.fail(BridgeError::rejected(payload)),
        Outcome::Hang => {}
    }
}

impl BridgePort for ScriptedBridge {
    fn invoke(&self, invocation: Invocation, callbacks: Callbacks) -> ImmediateResult {
        let immediate = {
            let mut state = self.state.lock();
            let seq = state.calls.len() as u64;
            let outcome = state.outcome_for(&invocation);
            tracing::trace!(seq, call = %invocation, ?outcome, "scripted call");
            state.calls.push(RecordedCall {
                seq,
                service: invocation.service,
                action: invocation.action,
                args: invocation.args,
            });
            if state.resolution == Resolution::Immediate && outcome != Outcome::Hang {
                Some((outcome, callbacks))
            } else {
                state.pending.push(PendingCall {
                    seq,
                    outcome,
                    callbacks,
                });
                None
            }
        };

        match immediate {
            Some((outcome, callbacks)) => {
                let result = match &outcome {
                    Outcome::Success(value) => ImmediateResult::ok(value.clone()),
                    Outcome::Failure(payload) => ImmediateResult::error(payload.clone()),
                    Outcome::Hang => ImmediateResult::no_result(),
                };
                fire(outcome, callbacks);
                result
            }
            None => ImmediateResult::no_result(),
        }
    }
}
