//! Test fixtures and coordinator helpers.
//!
//! Provides a harness that wires a [`ScriptedBridge`] to a [`WebSql`]
//! entry point and an [`EventLog`] that records callbacks in the order
//! they fire.

use parking_lot::Mutex;
use std::sync::{Arc, Once};
use websql_bridge::{Resolution, ScriptedBridge};
use websql_core::{Config, Database, StatementCallbacks, TransactionCallbacks, WebSql};

static LOGGING: Once = Once::new();

/// Installs a `tracing` subscriber for tests.
///
/// Honors `RUST_LOG`; defaults to `warn`. Safe to call from every test.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Ordered record of callback events, shared between closures.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    /// Snapshot of all events.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// Number of events equal to `event`.
    pub fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }

    /// Number of events starting with `prefix`.
    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    /// Returns true if `event` was recorded.
    pub fn contains(&self, event: &str) -> bool {
        self.count(event) > 0
    }

    /// Position of the first `event`.
    pub fn position(&self, event: &str) -> Option<usize> {
        self.events.lock().iter().position(|e| e == event)
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Transaction callbacks that record `"<tag> success"` and
    /// `"<tag> error: <message>"`.
    pub fn transaction_callbacks(&self, tag: &str) -> TransactionCallbacks {
        let (ok, err) = (self.clone(), self.clone());
        let (ok_tag, err_tag) = (tag.to_string(), tag.to_string());
        TransactionCallbacks::new()
            .on_success(move || ok.push(format!("{ok_tag} success")))
            .on_error(move |e| err.push(format!("{err_tag} error: {e}")))
    }

    /// Statement callbacks that record `"<tag> rows <n>"` and
    /// `"<tag> failed"`.
    pub fn statement_callbacks(&self, tag: &str) -> StatementCallbacks {
        let (ok, err) = (self.clone(), self.clone());
        let (ok_tag, err_tag) = (tag.to_string(), tag.to_string());
        StatementCallbacks::new()
            .on_success(move |_, rs| ok.push(format!("{ok_tag} rows {}", rs.rows().len())))
            .on_error(move |_, _| err.push(format!("{err_tag} failed")))
    }
}

/// A coordinator wired to a scripted backend.
pub struct TestHarness {
    /// The scripted backend.
    pub bridge: Arc<ScriptedBridge>,
    /// The entry point under test.
    pub websql: WebSql,
    /// Callback log.
    pub log: EventLog,
}

impl TestHarness {
    /// Backend that answers inside `invoke`.
    pub fn immediate() -> Self {
        Self::with_config(Resolution::Immediate, Config::default())
    }

    /// Backend whose answers the test releases.
    pub fn deferred() -> Self {
        Self::with_config(Resolution::Deferred, Config::default())
    }

    /// Backend with the given resolution and coordinator configuration.
    pub fn with_config(resolution: Resolution, config: Config) -> Self {
        init_test_logging();
        let bridge = Arc::new(ScriptedBridge::with_resolution(resolution));
        let websql = WebSql::with_config(Arc::clone(&bridge), config);
        Self {
            bridge,
            websql,
            log: EventLog::new(),
        }
    }

    /// Opens `name` and, in deferred mode, lets the `open` call settle.
    pub fn open(&self, name: &str) -> Database {
        let db = self
            .websql
            .open_database(name, "1.0", name, 1024 * 1024)
            .expect("Failed to open database");
        for call in self.bridge.calls_for("open") {
            self.bridge.resolve(call.seq);
        }
        db
    }

    /// Submits a transaction that issues `statements` and records its
    /// outcome under `tag`.
    pub fn submit(&self, db: &Database, tag: &str, statements: &[&str]) {
        let log = self.log.clone();
        let statements: Vec<String> = statements.iter().map(|s| s.to_string()).collect();
        let tag_owned = tag.to_string();
        db.transaction(
            move |tx| {
                for (i, sql) in statements.into_iter().enumerate() {
                    tx.execute_sql(
                        sql,
                        vec![],
                        log.statement_callbacks(&format!("{tag_owned}.{i}")),
                    )?;
                }
                Ok(())
            },
            self.log.transaction_callbacks(tag),
        );
    }

    /// SQL sent to the backend, without savepoint markers.
    pub fn user_sql(&self) -> Vec<String> {
        self.bridge
            .executed_sql()
            .into_iter()
            .filter(|sql| !sql.starts_with("SAVEPOINT"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_log() {
        let log = EventLog::new();
        assert!(log.is_empty());
        log.push("a");
        log.push("b");
        log.push("a");
        assert_eq!(log.len(), 3);
        assert_eq!(log.count("a"), 2);
        assert_eq!(log.position("b"), Some(1));
        assert!(!log.contains("c"));
    }

    #[test]
    fn test_harness_submit() {
        let harness = TestHarness::immediate();
        let db = harness.open("fixture");
        harness.submit(&db, "t", &["SELECT 1", "SELECT 2"]);
        assert_eq!(
            harness.log.events(),
            vec!["t.0 rows 0", "t.1 rows 0", "t success"]
        );
        assert_eq!(harness.user_sql(), vec!["SELECT 1", "SELECT 2"]);
    }
}
