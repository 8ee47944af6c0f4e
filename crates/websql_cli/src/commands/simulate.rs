//! Simulate command implementation.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use websql_bridge::{
    BridgePort, Callbacks, ImmediateResult, Invocation, Resolution, ScriptedBridge,
};
use websql_core::{
    Config, CoreError, CoreResult, StatementCallbacks, Transaction, TransactionCallbacks, WebSql,
};

/// Errors raised while loading or running a scenario.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// The scenario file could not be read.
    #[error("failed to read scenario: {0}")]
    Io(#[from] std::io::Error),

    /// The scenario file is not valid JSON for a scenario.
    #[error("invalid scenario: {0}")]
    Parse(#[from] serde_json::Error),

    /// The coordinator refused the scenario.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Unknown `--format`.
    #[error("unknown output format {0:?} (expected text or json)")]
    Format(String),
}

/// When the scripted backend answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    /// Inside each call.
    #[default]
    Immediate,
    /// After all transactions are submitted, oldest call first.
    Fifo,
    /// After all transactions are submitted, newest call first.
    Lifo,
}

/// A scenario file.
#[derive(Debug, Deserialize)]
pub struct Scenario {
    /// Database to open.
    pub database: String,
    /// Backend answer order.
    #[serde(default)]
    pub order: Order,
    /// Coordinator configuration.
    #[serde(default)]
    pub config: Config,
    /// Root transactions, submitted in order.
    pub transactions: Vec<ScenarioTransaction>,
}

/// One root transaction of a scenario.
#[derive(Debug, Deserialize)]
pub struct ScenarioTransaction {
    /// Label used in the trace. Defaults to `tx<index>`.
    #[serde(default)]
    pub name: Option<String>,
    /// Submit as a read transaction.
    #[serde(default)]
    pub read_only: bool,
    /// Statements issued by the body.
    #[serde(default)]
    pub statements: Vec<ScenarioStatement>,
}

/// One statement of a scenario transaction.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioStatement {
    /// SQL text. Backend rules match on it by substring.
    pub sql: String,
    /// Bound parameters.
    #[serde(default)]
    pub params: Vec<Value>,
    /// Rows the backend returns.
    #[serde(default)]
    pub rows: Vec<Value>,
    /// The backend rejects this statement.
    #[serde(default)]
    pub fail: bool,
}

/// One observed event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEvent {
    /// A call reached the backend.
    Call {
        /// Action name.
        action: String,
        /// Arguments.
        args: Vec<Value>,
    },
    /// A statement callback ran.
    Statement {
        /// Transaction label.
        transaction: String,
        /// Statement index within the transaction.
        index: usize,
        /// Row count, or `None` on failure.
        rows: Option<usize>,
    },
    /// A transaction callback ran.
    Transaction {
        /// Transaction label.
        transaction: String,
        /// `success` or `error`.
        outcome: String,
        /// Error message for failures.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Everything observed while replaying a scenario.
#[derive(Debug, Default, Serialize)]
pub struct Trace {
    /// Events in observation order.
    pub events: Vec<TraceEvent>,
    /// Transactions that succeeded.
    pub succeeded: usize,
    /// Transactions that failed.
    pub failed: usize,
}

type Sink = Arc<Mutex<Vec<TraceEvent>>>;

/// A port that records each call into the trace before forwarding it.
struct TracingPort {
    inner: Arc<ScriptedBridge>,
    sink: Sink,
}

impl BridgePort for TracingPort {
    fn invoke(&self, invocation: Invocation, callbacks: Callbacks) -> ImmediateResult {
        self.sink.lock().push(TraceEvent::Call {
            action: invocation.action.clone(),
            args: invocation.args.clone(),
        });
        self.inner.invoke(invocation, callbacks)
    }
}

/// Runs the simulate command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if format != "text" && format != "json" {
        return Err(ScenarioError::Format(format.to_string()).into());
    }
    let scenario = load(path)?;
    let trace = simulate(&scenario)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&trace)?);
    } else {
        print_text(&trace);
    }
    Ok(())
}

/// Reads a scenario file.
pub fn load(path: &Path) -> Result<Scenario, ScenarioError> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Replays `scenario` and returns the trace.
pub fn simulate(scenario: &Scenario) -> Result<Trace, ScenarioError> {
    let resolution = match scenario.order {
        Order::Immediate => Resolution::Immediate,
        Order::Fifo | Order::Lifo => Resolution::Deferred,
    };
    let bridge = Arc::new(ScriptedBridge::with_resolution(resolution));
    for statement in scenario.transactions.iter().flat_map(|t| &t.statements) {
        if statement.fail {
            bridge.fail_sql(statement.sql.clone(), "scripted failure");
        } else if !statement.rows.is_empty() {
            bridge.rows_for(statement.sql.clone(), statement.rows.clone());
        }
    }

    let sink: Sink = Arc::default();
    let port = TracingPort {
        inner: Arc::clone(&bridge),
        sink: Arc::clone(&sink),
    };
    let websql = WebSql::with_config(port, scenario.config.clone());
    let db = websql.open_database(&scenario.database, "1.0", &scenario.database, 0)?;

    for (index, transaction) in scenario.transactions.iter().enumerate() {
        let label = transaction
            .name
            .clone()
            .unwrap_or_else(|| format!("tx{index}"));
        tracing::debug!(transaction = %label, statements = transaction.statements.len(), "submitting");

        let statements = transaction.statements.clone();
        let body_sink = Arc::clone(&sink);
        let body_label = label.clone();
        let body = move |tx: &Transaction| -> CoreResult<()> {
            for (index, statement) in statements.into_iter().enumerate() {
                let (ok, err) = (Arc::clone(&body_sink), Arc::clone(&body_sink));
                let (ok_label, err_label) = (body_label.clone(), body_label.clone());
                tx.execute_sql(
                    statement.sql,
                    statement.params,
                    StatementCallbacks::new()
                        .on_success(move |_, rs| {
                            ok.lock().push(TraceEvent::Statement {
                                transaction: ok_label,
                                index,
                                rows: Some(rs.rows().len()),
                            });
                        })
                        .on_error(move |_, _| {
                            err.lock().push(TraceEvent::Statement {
                                transaction: err_label,
                                index,
                                rows: None,
                            });
                        }),
                )?;
            }
            Ok(())
        };

        let callbacks = outcome_callbacks(&sink, &label);
        if transaction.read_only {
            db.read_transaction(body, callbacks);
        } else {
            db.transaction(body, callbacks);
        }
    }

    match scenario.order {
        Order::Immediate => {}
        Order::Fifo => {
            bridge.run_until_idle();
        }
        Order::Lifo => {
            bridge.run_until_idle_lifo();
        }
    }

    let events = sink.lock().clone();
    let succeeded = events
        .iter()
        .filter(|e| matches!(e, TraceEvent::Transaction { outcome, .. } if outcome == "success"))
        .count();
    let failed = events
        .iter()
        .filter(|e| matches!(e, TraceEvent::Transaction { outcome, .. } if outcome == "error"))
        .count();
    Ok(Trace {
        events,
        succeeded,
        failed,
    })
}

fn outcome_callbacks(sink: &Sink, label: &str) -> TransactionCallbacks {
    let (ok, err) = (Arc::clone(sink), Arc::clone(sink));
    let (ok_label, err_label) = (label.to_string(), label.to_string());
    TransactionCallbacks::new()
        .on_success(move || {
            ok.lock().push(TraceEvent::Transaction {
                transaction: ok_label,
                outcome: "success".to_string(),
                error: None,
            });
        })
        .on_error(move |error| {
            err.lock().push(TraceEvent::Transaction {
                transaction: err_label,
                outcome: "error".to_string(),
                error: Some(error.to_string()),
            });
        })
}

fn print_text(trace: &Trace) {
    for event in &trace.events {
        match event {
            TraceEvent::Call { action, args } => {
                let args: Vec<String> = args.iter().map(Value::to_string).collect();
                println!("  call  {}({})", action, args.join(", "));
            }
            TraceEvent::Statement {
                transaction,
                index,
                rows: Some(rows),
            } => println!("  stmt  {}[{}] ok, {} rows", transaction, index, rows),
            TraceEvent::Statement {
                transaction,
                index,
                rows: None,
            } => println!("  stmt  {}[{}] failed", transaction, index),
            TraceEvent::Transaction {
                transaction,
                outcome,
                error,
            } => match error {
                Some(error) => println!("✗ {} {}: {}", transaction, outcome, error),
                None => println!("✓ {} {}", transaction, outcome),
            },
        }
    }
    println!();
    println!("{} succeeded, {} failed", trace.succeeded, trace.failed);
}
