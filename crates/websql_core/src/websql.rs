//! Entry point: opening and removing databases.

use crate::config::{Config, CreationSignal, QueueScope};
use crate::database::{Database, DatabaseShared};
use crate::error::{CoreError, CoreResult};
use crate::guard;
use crate::queue::TransactionQueue;
use crate::types::truthy;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use websql_bridge::{BridgePort, Callbacks, Invocation};

/// Opens logical databases over one bridge.
///
/// ```rust
/// use std::sync::Arc;
/// use websql_core::{Config, WebSql};
/// use websql_core::websql_bridge::ScriptedBridge;
///
/// let websql = WebSql::with_config(ScriptedBridge::new(), Config::new().savepoint_prefix("sp"));
/// let db = websql.open_database("notes", "1.0", "Notes", 5 * 1024 * 1024).unwrap();
/// assert_eq!(db.name(), "notes");
/// assert!(websql.open_database("", "1.0", "", 0).is_err());
/// ```
pub struct WebSql {
    bridge: Arc<dyn BridgePort>,
    config: Arc<Config>,
    /// Shared queues for [`QueueScope::PerName`].
    queues: Mutex<HashMap<String, Weak<TransactionQueue>>>,
    /// Names whose creation callback already fired.
    announced: Arc<Mutex<HashSet<String>>>,
}

impl WebSql {
    /// Creates an entry point with the default configuration.
    pub fn new<B: BridgePort + 'static>(bridge: B) -> Self {
        Self::with_config(bridge, Config::default())
    }

    /// Creates an entry point with a custom configuration.
    pub fn with_config<B: BridgePort + 'static>(bridge: B, config: Config) -> Self {
        Self {
            bridge: Arc::new(bridge),
            config: Arc::new(config),
            queues: Mutex::new(HashMap::new()),
            announced: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Opens (or creates) a database.
    ///
    /// Every call returns a new handle; the backend is asked to open the
    /// same physical database each time. `version`, `display_name` and
    /// `estimated_size` are recorded but not enforced.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidDatabaseName`] if `name` is empty.
    pub fn open_database(
        &self,
        name: &str,
        version: &str,
        display_name: &str,
        estimated_size: u64,
    ) -> CoreResult<Database> {
        let db = self.handle(name, version, display_name, estimated_size)?;
        self.send_open(&db, None);
        Ok(db)
    }

    /// Opens a database and runs `on_created` if the backend reports that
    /// it was freshly created.
    ///
    /// The callback runs when the backend answers, never more than once.
    /// See [`CreationSignal`] for how "freshly created" is decided.
    ///
    /// Timing follows the bridge: with a bridge that answers later the
    /// callback runs after this method returns, but with one that answers
    /// inside `invoke` it runs before this method returns. Code that must
    /// see the returned handle first should not rely on the callback being
    /// asynchronous.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidDatabaseName`] if `name` is empty.
    pub fn open_database_with_callback<F>(
        &self,
        name: &str,
        version: &str,
        display_name: &str,
        estimated_size: u64,
        on_created: F,
    ) -> CoreResult<Database>
    where
        F: FnOnce(&Database) + Send + 'static,
    {
        let db = self.handle(name, version, display_name, estimated_size)?;
        self.send_open(&db, Some(Box::new(on_created)));
        Ok(db)
    }

    /// Asks the backend to delete a database.
    ///
    /// Fire-and-forget: a backend error is logged. Existing handles are not
    /// invalidated.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidDatabaseName`] if `name` is empty.
    pub fn remove_database(&self, name: &str) -> CoreResult<()> {
        if name.is_empty() {
            return Err(CoreError::InvalidDatabaseName);
        }
        self.announced.lock().remove(name);
        tracing::debug!(db = name, "removing database");

        let db = name.to_string();
        self.bridge.invoke(
            Invocation::new(&self.config.service, "removeDatabase", vec![json!(name)]),
            Callbacks::new(
                |_| {},
                move |error| tracing::warn!(db = %db, %error, "removeDatabase failed"),
            ),
        );
        Ok(())
    }

    fn handle(
        &self,
        name: &str,
        version: &str,
        display_name: &str,
        estimated_size: u64,
    ) -> CoreResult<Database> {
        if name.is_empty() {
            return Err(CoreError::InvalidDatabaseName);
        }
        tracing::debug!(db = name, version, "opening database");

        Ok(Database::new(DatabaseShared {
            name: name.to_string(),
            version: version.to_string(),
            display_name: display_name.to_string(),
            estimated_size,
            bridge: Arc::clone(&self.bridge),
            config: Arc::clone(&self.config),
            queue: self.queue_for(name),
        }))
    }

    fn queue_for(&self, name: &str) -> Arc<TransactionQueue> {
        match self.config.queue_scope {
            QueueScope::PerHandle => Arc::new(TransactionQueue::new()),
            QueueScope::PerName => {
                let mut queues = self.queues.lock();
                queues.retain(|_, queue| queue.strong_count() > 0);
                if let Some(queue) = queues.get(name).and_then(Weak::upgrade) {
                    return queue;
                }
                let queue = Arc::new(TransactionQueue::new());
                queues.insert(name.to_string(), Arc::downgrade(&queue));
                queue
            }
        }
    }

    fn send_open(&self, db: &Database, on_created: Option<Box<dyn FnOnce(&Database) + Send>>) {
        let name = db.name().to_string();
        let invocation = Invocation::new(&self.config.service, "open", vec![json!(name)]);

        let signal = self.config.creation_signal;
        let announced = Arc::clone(&self.announced);
        let handle = db.clone();
        let on_success = move |created: Value| {
            let Some(on_created) = on_created else {
                return;
            };
            if !truthy(&created) {
                return;
            }
            if signal == CreationSignal::FirstOpenInProcess
                && !announced.lock().insert(handle.name().to_string())
            {
                tracing::debug!(db = handle.name(), "creation already announced");
                return;
            }
            guard::guarded("creation callback", || on_created(&handle));
        };

        self.bridge.invoke(
            invocation,
            Callbacks::new(on_success, move |error| {
                tracing::warn!(db = %name, %error, "open failed");
            }),
        );
    }
}

impl std::fmt::Debug for WebSql {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSql")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
