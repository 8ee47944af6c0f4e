//! Database facade.

use crate::config::Config;
use crate::error::CoreResult;
use crate::queue::TransactionQueue;
use crate::transaction::{Transaction, TransactionCallbacks, TransactionInner};
use crate::types::TransactionId;
use std::fmt;
use std::sync::Arc;
use websql_bridge::BridgePort;

/// State shared by a database handle and its transactions.
pub(crate) struct DatabaseShared {
    pub(crate) name: String,
    pub(crate) version: String,
    pub(crate) display_name: String,
    pub(crate) estimated_size: u64,
    pub(crate) bridge: Arc<dyn BridgePort>,
    pub(crate) config: Arc<Config>,
    pub(crate) queue: Arc<TransactionQueue>,
}

/// A logical database handle.
///
/// Obtained from [`WebSql::open_database`](crate::WebSql::open_database).
/// Root transactions submitted through one handle run strictly one after
/// another: the next one asks for a connection only after the previous
/// one's terminal callback has run.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use websql_core::{TransactionCallbacks, WebSql};
/// use websql_core::websql_bridge::ScriptedBridge;
///
/// let websql = WebSql::new(Arc::new(ScriptedBridge::new()));
/// let db = websql.open_database("notes", "1.0", "Notes", 1024).unwrap();
///
/// db.transaction(
///     |tx| {
///         tx.execute("CREATE TABLE IF NOT EXISTS notes (body TEXT)", vec![])?;
///         Ok(())
///     },
///     TransactionCallbacks::new().on_success(|| println!("created")),
/// );
/// ```
#[derive(Clone)]
pub struct Database {
    shared: Arc<DatabaseShared>,
}

impl Database {
    pub(crate) fn new(shared: DatabaseShared) -> Self {
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Version string given at open. Not enforced.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.shared.version
    }

    /// Display name given at open. Not enforced.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.shared.display_name
    }

    /// Size hint given at open. Not enforced.
    #[must_use]
    pub fn estimated_size(&self) -> u64 {
        self.shared.estimated_size
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Queues a read/write transaction.
    ///
    /// Returns immediately. The body runs once the transaction reaches the
    /// head of the queue and its savepoint is in place; the outcome arrives
    /// through `callbacks`.
    pub fn transaction<F>(&self, body: F, callbacks: TransactionCallbacks) -> TransactionId
    where
        F: FnOnce(&Transaction) -> CoreResult<()> + Send + 'static,
    {
        self.submit(Box::new(body), callbacks, false)
    }

    /// Queues a read transaction.
    ///
    /// Shares the queue with read/write transactions.
    pub fn read_transaction<F>(&self, body: F, callbacks: TransactionCallbacks) -> TransactionId
    where
        F: FnOnce(&Transaction) -> CoreResult<()> + Send + 'static,
    {
        self.submit(Box::new(body), callbacks, true)
    }

    /// Returns true while a root transaction is between start and its
    /// terminal callback.
    #[must_use]
    pub fn is_queue_active(&self) -> bool {
        self.shared.queue.is_active()
    }

    /// Root transactions waiting behind the active one.
    #[must_use]
    pub fn pending_transactions(&self) -> usize {
        self.shared.queue.pending_len()
    }

    fn submit(
        &self,
        body: crate::transaction::TransactionBody,
        callbacks: TransactionCallbacks,
        read_only: bool,
    ) -> TransactionId {
        let inner = TransactionInner::root(Arc::clone(&self.shared), body, callbacks, read_only);
        let id = inner.id();
        tracing::debug!(db = %self.shared.name, tx = %id, read_only, "transaction queued");
        self.shared.queue.enqueue(Box::new(move || inner.start_root()));
        id
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.shared.name)
            .field("version", &self.shared.version)
            .field("queue_active", &self.is_queue_active())
            .field("pending", &self.pending_transactions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::transaction::{StatementCallbacks, TransactionPhase};
    use parking_lot::Mutex;
    use serde_json::json;
    use websql_bridge::{Outcome, ScriptedBridge};

    type Log = Arc<Mutex<Vec<String>>>;

    fn open(bridge: &Arc<ScriptedBridge>, config: Config) -> Database {
        Database::new(DatabaseShared {
            name: "test".into(),
            version: "1.0".into(),
            display_name: "Test".into(),
            estimated_size: 0,
            bridge: Arc::clone(bridge) as Arc<dyn BridgePort>,
            config: Arc::new(config),
            queue: Arc::new(TransactionQueue::new()),
        })
    }

    fn recording(log: &Log, tag: &str) -> TransactionCallbacks {
        let (ok, err) = (Arc::clone(log), Arc::clone(log));
        let (t1, t2) = (tag.to_string(), tag.to_string());
        TransactionCallbacks::new()
            .on_success(move || ok.lock().push(format!("{t1} success")))
            .on_error(move |e| err.lock().push(format!("{t2} error: {e}")))
    }

    #[test]
    fn accessors() {
        let db = open(&Arc::new(ScriptedBridge::new()), Config::default());
        assert_eq!(db.name(), "test");
        assert_eq!(db.version(), "1.0");
        assert_eq!(db.display_name(), "Test");
        assert_eq!(db.estimated_size(), 0);
        assert!(!db.is_queue_active());
    }

    #[test]
    fn immediate_transaction_succeeds() {
        let bridge = Arc::new(ScriptedBridge::new());
        let db = open(&bridge, Config::default());
        let log: Log = Arc::default();

        let id = db.transaction(
            |tx| {
                tx.execute("INSERT INTO t VALUES (1)", vec![])?;
                tx.execute("INSERT INTO t VALUES (2)", vec![])?;
                Ok(())
            },
            recording(&log, "t"),
        );

        assert_eq!(*log.lock(), vec!["t success"]);
        assert_eq!(
            bridge.executed_sql(),
            vec![
                format!("SAVEPOINT {}", id.savepoint_name("trx")),
                "INSERT INTO t VALUES (1)".to_string(),
                "INSERT INTO t VALUES (2)".to_string(),
            ]
        );
        assert!(!db.is_queue_active());
    }

    #[test]
    fn statements_run_on_assigned_connection() {
        let bridge = Arc::new(ScriptedBridge::new());
        bridge.set_connect_outcome(Outcome::Success(json!({ "connectionId": "c-7" })));
        let db = open(&bridge, Config::default());

        db.transaction(|tx| tx.execute("SELECT 1", vec![]).map(|_| ()), TransactionCallbacks::new());

        for call in bridge.calls_for("executeSql") {
            assert_eq!(call.connection(), Some(&json!("c-7")));
        }
        assert_eq!(bridge.calls_for("connect")[0].args, vec![json!("test")]);
    }

    #[test]
    fn second_transaction_waits_for_first() {
        let bridge = Arc::new(ScriptedBridge::deferred());
        let db = open(&bridge, Config::default());
        let log: Log = Arc::default();

        db.transaction(|_| Ok(()), recording(&log, "a"));
        db.transaction(|_| Ok(()), recording(&log, "b"));

        assert_eq!(bridge.calls_for("connect").len(), 1);
        assert_eq!(db.pending_transactions(), 1);

        bridge.resolve_next(); // connect a
        assert_eq!(bridge.calls_for("connect").len(), 1);
        bridge.resolve_next(); // savepoint a
        assert_eq!(*log.lock(), vec!["a success"]);
        assert_eq!(bridge.calls_for("connect").len(), 2);

        bridge.run_until_idle();
        assert_eq!(*log.lock(), vec!["a success", "b success"]);
    }

    #[test]
    fn failed_statement_fails_transaction_once() {
        let bridge = Arc::new(ScriptedBridge::deferred());
        bridge.fail_sql("BAD", "syntax error");
        let db = open(&bridge, Config::default());
        let log: Log = Arc::default();
        let rows: Log = Arc::default();

        let rows_in = Arc::clone(&rows);
        db.transaction(
            move |tx| {
                for sql in ["GOOD 1", "BAD", "GOOD 2"] {
                    let (ok, err) = (Arc::clone(&rows_in), Arc::clone(&rows_in));
                    tx.execute_sql(
                        sql,
                        vec![],
                        StatementCallbacks::new()
                            .on_success(move |_, _| ok.lock().push(format!("{sql} ok")))
                            .on_error(move |_, _| err.lock().push(format!("{sql} err"))),
                    )?;
                }
                Ok(())
            },
            recording(&log, "t"),
        );

        bridge.resolve_next(); // connect
        bridge.resolve_next(); // savepoint
        let pending = bridge.pending_seqs();
        assert_eq!(pending.len(), 3);
        bridge.resolve(pending[1]); // BAD
        bridge.run_until_idle();

        assert_eq!(*rows.lock(), vec!["BAD err"]);
        assert_eq!(log.lock().len(), 1);
        assert!(log.lock()[0].starts_with("t error: statement failed (BAD)"));
        assert!(!db.is_queue_active());
    }

    #[test]
    fn body_error_is_passed_through() {
        let bridge = Arc::new(ScriptedBridge::new());
        let db = open(&bridge, Config::default());
        let seen = Arc::new(Mutex::new(None));

        let seen_in = Arc::clone(&seen);
        db.transaction(
            |_| Err(CoreError::body_failed("nope")),
            TransactionCallbacks::new().on_error(move |e| *seen_in.lock() = Some(e)),
        );

        assert!(matches!(
            seen.lock().take(),
            Some(CoreError::BodyFailed { reason }) if reason == "nope"
        ));
    }

    #[test]
    fn body_panic_becomes_body_failure_and_queue_moves_on() {
        let bridge = Arc::new(ScriptedBridge::new());
        let db = open(&bridge, Config::default());
        let log: Log = Arc::default();

        db.transaction(|_| panic!("kaboom"), recording(&log, "a"));
        db.transaction(|_| Ok(()), recording(&log, "b"));

        let log = log.lock();
        assert_eq!(log.len(), 2);
        assert!(log[0].contains("panicked: kaboom"));
        assert_eq!(log[1], "b success");
    }

    #[test]
    fn panicking_success_callback_does_not_stall_queue() {
        let bridge = Arc::new(ScriptedBridge::new());
        let db = open(&bridge, Config::default());
        let log: Log = Arc::default();

        db.transaction(
            |_| Ok(()),
            TransactionCallbacks::new().on_success(|| panic!("user bug")),
        );
        db.transaction(|_| Ok(()), recording(&log, "b"));

        assert_eq!(*log.lock(), vec!["b success"]);
    }

    #[test]
    fn connection_failure() {
        let bridge = Arc::new(ScriptedBridge::new());
        bridge.set_connect_outcome(Outcome::Success(json!({ "connectionId": null })));
        let db = open(&bridge, Config::default());
        let seen = Arc::new(Mutex::new(None));
        let ran = Arc::new(Mutex::new(false));

        let (seen_in, ran_in) = (Arc::clone(&seen), Arc::clone(&ran));
        db.transaction(
            move |_| {
                *ran_in.lock() = true;
                Ok(())
            },
            TransactionCallbacks::new().on_error(move |e| *seen_in.lock() = Some(e)),
        );

        assert!(!*ran.lock());
        assert!(seen.lock().as_ref().is_some_and(CoreError::is_begin_failure));
        assert!(bridge.executed_sql().is_empty());
    }

    #[test]
    fn savepoint_failure_skips_body() {
        let bridge = Arc::new(ScriptedBridge::new());
        bridge.fail_sql("SAVEPOINT", "locked");
        let db = open(&bridge, Config::default());
        let seen = Arc::new(Mutex::new(None));

        let seen_in = Arc::clone(&seen);
        db.transaction(
            |_| panic!("body must not run"),
            TransactionCallbacks::new().on_error(move |e| *seen_in.lock() = Some(e)),
        );

        assert!(matches!(
            seen.lock().take(),
            Some(CoreError::SavepointFailed { .. })
        ));
    }

    #[test]
    fn release_and_rollback_statements() {
        let bridge = Arc::new(ScriptedBridge::new());
        bridge.fail_sql("BAD", "boom");
        let config = Config::new()
            .release_on_success(true)
            .rollback_on_failure(true);
        let db = open(&bridge, config);

        let ok = db.transaction(|tx| tx.execute("GOOD", vec![]).map(|_| ()), TransactionCallbacks::new());
        let bad = db.transaction(|tx| tx.execute("BAD", vec![]).map(|_| ()), TransactionCallbacks::new());

        assert_eq!(
            bridge.executed_sql(),
            vec![
                format!("SAVEPOINT {}", ok.savepoint_name("trx")),
                "GOOD".to_string(),
                format!("RELEASE SAVEPOINT {}", ok.savepoint_name("trx")),
                format!("SAVEPOINT {}", bad.savepoint_name("trx")),
                "BAD".to_string(),
                format!("ROLLBACK TO SAVEPOINT {}", bad.savepoint_name("trx")),
            ]
        );
    }

    #[test]
    fn finished_transaction_rejects_statements() {
        let bridge = Arc::new(ScriptedBridge::new());
        let db = open(&bridge, Config::default());
        let kept = Arc::new(Mutex::new(None));

        let kept_in = Arc::clone(&kept);
        db.transaction(
            move |tx| {
                *kept_in.lock() = Some(tx.clone());
                Ok(())
            },
            TransactionCallbacks::new(),
        );

        let tx = kept.lock().take().unwrap();
        assert_eq!(tx.phase(), TransactionPhase::Succeeded);
        assert!(matches!(
            tx.execute("SELECT 1", vec![]),
            Err(CoreError::InvalidState { .. })
        ));
    }
}
