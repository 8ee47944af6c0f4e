//! Key/value storage on top of the coordinator.
//!
//! Keeps every entry of table `storage(id, body)` in a local cache. Reads
//! are served from the cache; writes update it at once and are persisted
//! in their own transaction.

use crate::database::Database;
use crate::error::CoreResult;
use crate::transaction::TransactionCallbacks;
use crate::websql::WebSql;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

const CREATE_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS storage (id VARCHAR(40) PRIMARY KEY, body VARCHAR(255))";

/// Size hint passed to `open_database`.
const STORE_SIZE: u64 = 2_621_440;

#[derive(Deserialize)]
struct StoredEntry {
    id: String,
    body: Option<String>,
}

/// Local view of the table.
///
/// Until `loaded`, removals and clears are remembered so the initial load
/// does not bring back entries that are already being deleted.
#[derive(Default)]
struct Cache {
    entries: BTreeMap<String, String>,
    removed: HashSet<String>,
    cleared: bool,
    loaded: bool,
}

impl Cache {
    fn merge_loaded(&mut self, id: String, body: Option<String>) {
        if self.cleared || self.removed.contains(&id) {
            return;
        }
        // Writes made while loading win.
        self.entries.entry(id).or_insert_with(|| body.unwrap_or_default());
    }

    fn finish_load(&mut self) {
        self.loaded = true;
        self.removed.clear();
        self.cleared = false;
    }
}

/// A string key/value store backed by one database.
///
/// Loading starts at [`KeyValueStore::open`] and finishes asynchronously;
/// until [`KeyValueStore::is_ready`] returns true, reads only see values
/// written through this handle.
///
/// ```rust
/// use websql_core::{KeyValueStore, WebSql};
/// use websql_core::websql_bridge::ScriptedBridge;
///
/// let websql = WebSql::new(ScriptedBridge::new());
/// let store = KeyValueStore::open(&websql, "prefs").unwrap();
/// store.set_item("theme", "dark");
/// assert_eq!(store.get_item("theme").as_deref(), Some("dark"));
/// ```
#[derive(Clone)]
pub struct KeyValueStore {
    db: Database,
    cache: Arc<Mutex<Cache>>,
}

impl KeyValueStore {
    /// Opens database `name`, creates the table if needed and starts
    /// loading it.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidDatabaseName`](crate::CoreError::InvalidDatabaseName)
    /// if `name` is empty.
    pub fn open(websql: &WebSql, name: &str) -> CoreResult<Self> {
        let db = websql.open_database(name, "1.0", name, STORE_SIZE)?;
        let store = Self {
            db,
            cache: Arc::new(Mutex::new(Cache::default())),
        };
        store.load();
        Ok(store)
    }

    fn load(&self) {
        let cache = Arc::clone(&self.cache);
        let name = self.db.name().to_string();

        self.db.transaction(
            move |tx| {
                tx.execute(r#"PRAGMA encoding = "UTF-8""#, vec![])?;
                tx.execute(CREATE_TABLE, vec![])?;
                tx.query("SELECT * FROM storage", vec![], move |_, result| {
                    let rows = result.rows();
                    let mut cache = cache.lock();
                    for index in 0..rows.len() {
                        match rows.item_as::<StoredEntry>(index) {
                            Ok(Some(StoredEntry { id, body })) => cache.merge_loaded(id, body),
                            Ok(None) => {}
                            Err(error) => tracing::warn!(%error, index, "skipping storage row"),
                        }
                    }
                    cache.finish_load();
                })?;
                Ok(())
            },
            TransactionCallbacks::new()
                .on_error(move |error| tracing::error!(db = %name, %error, "storage load failed")),
        );
    }

    /// Returns true once existing entries have been loaded.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.cache.lock().loaded
    }

    /// The underlying database.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.lock().entries.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.lock().entries.is_empty()
    }

    /// Value stored under `key`.
    #[must_use]
    pub fn get_item(&self, key: &str) -> Option<String> {
        self.cache.lock().entries.get(key).cloned()
    }

    /// Key at `index`, in key order.
    #[must_use]
    pub fn key(&self, index: usize) -> Option<String> {
        self.cache.lock().entries.keys().nth(index).cloned()
    }

    /// Stores `value` under `key`.
    pub fn set_item(&self, key: &str, value: &str) {
        self.cache
            .lock()
            .entries
            .insert(key.to_string(), value.to_string());
        self.persist(
            "REPLACE INTO storage (id, body) values(?,?)",
            vec![json!(key), json!(value)],
        );
    }

    /// Removes `key`.
    pub fn remove_item(&self, key: &str) {
        {
            let mut cache = self.cache.lock();
            cache.entries.remove(key);
            if !cache.loaded {
                cache.removed.insert(key.to_string());
            }
        }
        self.persist("DELETE FROM storage where id=?", vec![json!(key)]);
    }

    /// Removes every entry.
    pub fn clear(&self) {
        {
            let mut cache = self.cache.lock();
            cache.entries.clear();
            if !cache.loaded {
                cache.cleared = true;
            }
        }
        self.persist("DELETE FROM storage", vec![]);
    }

    fn persist(&self, sql: &'static str, params: Vec<serde_json::Value>) {
        let name = self.db.name().to_string();
        self.db.transaction(
            move |tx| tx.execute(sql, params).map(|_| ()),
            TransactionCallbacks::new().on_error(move |error| {
                tracing::error!(db = %name, %error, "storage write failed");
            }),
        );
    }
}

impl std::fmt::Debug for KeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyValueStore")
            .field("database", &self.db.name())
            .field("len", &self.len())
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use websql_bridge::ScriptedBridge;

    #[test]
    fn loads_existing_rows() {
        let bridge = Arc::new(ScriptedBridge::new());
        bridge.rows_for(
            "SELECT * FROM storage",
            vec![
                json!({ "id": "b", "body": "2" }),
                json!({ "id": "a", "body": "1" }),
            ],
        );
        let websql = WebSql::new(Arc::clone(&bridge));
        let store = KeyValueStore::open(&websql, "kv").unwrap();

        assert!(store.is_ready());
        assert_eq!(store.len(), 2);
        assert_eq!(store.get_item("a").as_deref(), Some("1"));
        assert_eq!(store.key(0).as_deref(), Some("a"));
        assert_eq!(store.key(1).as_deref(), Some("b"));
        assert_eq!(store.key(2), None);

        let sql = bridge.executed_sql();
        assert_eq!(sql[1], r#"PRAGMA encoding = "UTF-8""#);
        assert_eq!(sql[2], CREATE_TABLE);
        assert_eq!(sql[3], "SELECT * FROM storage");
    }

    #[test]
    fn writes_go_through() {
        let bridge = Arc::new(ScriptedBridge::new());
        let websql = WebSql::new(Arc::clone(&bridge));
        let store = KeyValueStore::open(&websql, "kv").unwrap();

        store.set_item("k", "v");
        store.remove_item("missing");
        store.clear();
        assert!(store.is_empty());

        let writes: Vec<_> = bridge
            .calls_for("executeSql")
            .into_iter()
            .filter(|c| !c.sql().unwrap_or_default().starts_with("SAVEPOINT"))
            .skip(3)
            .map(|c| (c.sql().unwrap_or_default().to_string(), c.args[2].clone()))
            .collect();
        assert_eq!(
            writes,
            vec![
                ("REPLACE INTO storage (id, body) values(?,?)".to_string(), json!(["k", "v"])),
                ("DELETE FROM storage where id=?".to_string(), json!(["missing"])),
                ("DELETE FROM storage".to_string(), json!([])),
            ]
        );
    }

    #[test]
    fn local_writes_survive_late_load() {
        let bridge = Arc::new(ScriptedBridge::deferred());
        bridge.rows_for("SELECT * FROM storage", vec![json!({ "id": "k", "body": "old" })]);
        let websql = WebSql::new(Arc::clone(&bridge));
        let store = KeyValueStore::open(&websql, "kv").unwrap();

        store.set_item("k", "new");
        assert!(!store.is_ready());
        bridge.run_until_idle();

        assert!(store.is_ready());
        assert_eq!(store.get_item("k").as_deref(), Some("new"));
    }

    #[test]
    fn removals_survive_late_load() {
        let bridge = Arc::new(ScriptedBridge::deferred());
        bridge.rows_for(
            "SELECT * FROM storage",
            vec![
                json!({ "id": "k", "body": "old" }),
                json!({ "id": "j", "body": "kept" }),
            ],
        );
        let websql = WebSql::new(Arc::clone(&bridge));
        let store = KeyValueStore::open(&websql, "kv").unwrap();

        store.remove_item("k");
        bridge.run_until_idle();

        assert!(store.is_ready());
        assert_eq!(store.get_item("k"), None);
        assert_eq!(store.get_item("j").as_deref(), Some("kept"));
        assert_eq!(store.len(), 1);

        // Once loaded, a removed key can be written again.
        store.set_item("k", "again");
        store.remove_item("j");
        bridge.run_until_idle();
        assert_eq!(store.get_item("k").as_deref(), Some("again"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn clear_survives_late_load() {
        let bridge = Arc::new(ScriptedBridge::deferred());
        bridge.rows_for("SELECT * FROM storage", vec![json!({ "id": "k", "body": "old" })]);
        let websql = WebSql::new(Arc::clone(&bridge));
        let store = KeyValueStore::open(&websql, "kv").unwrap();

        store.clear();
        store.set_item("fresh", "1");
        bridge.run_until_idle();

        assert!(store.is_ready());
        assert_eq!(store.get_item("k"), None);
        assert_eq!(store.key(0).as_deref(), Some("fresh"));
        assert_eq!(store.len(), 1);
    }
}
