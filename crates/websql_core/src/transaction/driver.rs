//! Transaction state machine driven by bridge continuations.
//!
//! Every transition takes the transaction lock, updates state, releases the
//! lock and only then talks to the bridge or runs user code. Bridges may
//! resolve inside `invoke`, so no lock is ever held across a call out.

use crate::config::Config;
use crate::database::DatabaseShared;
use crate::error::{CoreError, CoreResult};
use crate::guard;
use crate::result::ResultSet;
use crate::transaction::callbacks::{Hook, StatementCallbacks, TransactionBody, TransactionCallbacks};
use crate::transaction::query::{statement_invocation, Query};
use crate::transaction::state::{Completion, TransactionPhase, TransactionState};
use crate::transaction::Transaction;
use crate::types::{ConnectionId, QueryId, TransactionId};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::{Arc, Weak};
use websql_bridge::{BridgeError, Callbacks, Invocation};

/// Everything handed out when a transaction succeeds.
type SuccessParts = (Option<Hook>, Option<Hook>, Option<Completion>);

/// Shared core of a transaction. [`Transaction`] is a handle to this.
pub(crate) struct TransactionInner {
    id: TransactionId,
    db: Arc<DatabaseShared>,
    read_only: bool,
    nested: bool,
    state: Mutex<TransactionState>,
}

impl TransactionInner {
    /// Creates a root transaction that will wait in the database queue.
    pub(crate) fn root(
        db: Arc<DatabaseShared>,
        body: TransactionBody,
        callbacks: TransactionCallbacks,
        read_only: bool,
    ) -> Arc<Self> {
        let completion = Completion::Root(Arc::clone(&db.queue));
        Arc::new(Self {
            id: TransactionId::new(),
            db,
            read_only,
            nested: false,
            state: Mutex::new(TransactionState::new(
                TransactionPhase::Queued,
                body,
                callbacks,
                completion,
            )),
        })
    }

    fn child(
        parent: &Arc<Self>,
        body: TransactionBody,
        callbacks: TransactionCallbacks,
        read_only: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: TransactionId::new(),
            db: Arc::clone(&parent.db),
            read_only,
            nested: true,
            state: Mutex::new(TransactionState::new(
                TransactionPhase::Beginning,
                body,
                callbacks,
                Completion::Nested(Arc::clone(parent)),
            )),
        })
    }

    pub(crate) fn id(&self) -> TransactionId {
        self.id
    }

    pub(crate) fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn is_nested(&self) -> bool {
        self.nested
    }

    pub(crate) fn database_name(&self) -> &str {
        &self.db.name
    }

    pub(crate) fn phase(&self) -> TransactionPhase {
        self.state.lock().phase
    }

    pub(crate) fn connection(&self) -> Option<ConnectionId> {
        self.state.lock().connection.clone()
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.state.lock().outstanding.len()
    }

    fn config(&self) -> &Config {
        &self.db.config
    }

    fn savepoint(&self) -> String {
        self.id.savepoint_name(&self.config().savepoint_prefix)
    }

    fn handle(self: &Arc<Self>) -> Transaction {
        Transaction::from_inner(Arc::clone(self))
    }

    /// Queued -> Connecting. Called by the database queue.
    pub(crate) fn start_root(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if state.phase != TransactionPhase::Queued {
                return;
            }
            state.phase = TransactionPhase::Connecting;
        }
        tracing::debug!(db = %self.db.name, tx = %self.id, read_only = self.read_only, "connecting");

        let invocation = Invocation::new(
            &self.config().service,
            "connect",
            vec![json!(self.db.name)],
        );
        let (ok, err) = (Arc::clone(self), Arc::clone(self));
        self.db.bridge.invoke(
            invocation,
            Callbacks::new(
                move |response| ok.on_connected(&response),
                move |error| {
                    let error = CoreError::connection_failed(&err.db.name, error.reason());
                    err.fail(error);
                },
            ),
        );
    }

    fn on_connected(self: &Arc<Self>, response: &Value) {
        match ConnectionId::from_response(response) {
            Some(connection) => self.begin(connection),
            None => self.fail(CoreError::connection_failed(
                &self.db.name,
                format!("no connection id in {response}"),
            )),
        }
    }

    /// -> Beginning: issue the savepoint marker on `connection`.
    fn begin(self: &Arc<Self>, connection: ConnectionId) {
        {
            let mut state = self.state.lock();
            if state.failed {
                return;
            }
            state.connection = Some(connection.clone());
            state.phase = TransactionPhase::Beginning;
        }
        let savepoint = self.savepoint();
        tracing::debug!(
            db = %self.db.name,
            tx = %self.id,
            connection = %connection,
            savepoint = %savepoint,
            "beginning"
        );

        self.submit_control(
            &connection,
            format!("SAVEPOINT {savepoint}"),
            |tx| tx.run_body(),
            move |tx, error| tx.fail(CoreError::savepoint_failed(savepoint, error.reason())),
        );
    }

    /// Beginning -> Running: run preflight and the body.
    fn run_body(self: &Arc<Self>) {
        let (body, preflight) = {
            let mut state = self.state.lock();
            if state.failed || state.phase != TransactionPhase::Beginning {
                return;
            }
            state.phase = TransactionPhase::Running;
            (state.body.take(), state.callbacks.preflight.take())
        };
        tracing::debug!(db = %self.db.name, tx = %self.id, "running body");

        let handle = self.handle();
        let outcome = guard::catch(move || -> CoreResult<()> {
            if let Some(preflight) = preflight {
                preflight();
            }
            match body {
                Some(body) => body(&handle),
                None => Ok(()),
            }
        });
        self.state.lock().body_returned = true;

        match outcome {
            Ok(Ok(())) => self.evaluate(),
            Ok(Err(error)) => self.fail(error),
            Err(panic) => self.fail(CoreError::body_failed(format!("panicked: {panic}"))),
        }
    }

    /// Registers and submits a statement.
    pub(crate) fn execute_sql(
        self: &Arc<Self>,
        sql: String,
        params: Vec<Value>,
        callbacks: StatementCallbacks,
    ) -> CoreResult<QueryId> {
        let query = Query::new(sql, params, callbacks);
        let id = query.id();
        let invocation = {
            let mut state = self.state.lock();
            Self::ensure_accepting(&state)?;
            let connection = state
                .connection
                .clone()
                .ok_or_else(|| CoreError::invalid_state("transaction has no connection"))?;
            let invocation = query.invocation(&self.config().service, &connection);
            state.outstanding.insert(id, query);
            invocation
        };
        tracing::debug!(
            db = %self.db.name,
            tx = %self.id,
            query = %id,
            sql = ?invocation.args.get(1),
            "submitting statement"
        );

        let (ok, err) = (Arc::clone(self), Arc::clone(self));
        self.db.bridge.invoke(
            invocation,
            Callbacks::new(
                move |value| ok.query_succeeded(id, value),
                move |error| err.query_failed(id, error.reason()),
            ),
        );
        Ok(id)
    }

    /// Starts a nested transaction on this transaction's connection.
    pub(crate) fn spawn_nested(
        self: &Arc<Self>,
        body: TransactionBody,
        callbacks: TransactionCallbacks,
        read_only: bool,
    ) -> CoreResult<TransactionId> {
        let connection = {
            let mut state = self.state.lock();
            Self::ensure_accepting(&state)?;
            let connection = state
                .connection
                .clone()
                .ok_or_else(|| CoreError::invalid_state("transaction has no connection"))?;
            state.children += 1;
            connection
        };
        let child = Self::child(self, body, callbacks, read_only);
        {
            let mut state = self.state.lock();
            state.nested.retain(|c| c.strong_count() > 0);
            state.nested.push(Arc::downgrade(&child));
        }
        tracing::debug!(
            db = %self.db.name,
            parent = %self.id,
            tx = %child.id,
            "starting nested transaction"
        );
        child.begin(connection);
        Ok(child.id)
    }

    fn ensure_accepting(state: &TransactionState) -> CoreResult<()> {
        if state.failed {
            Err(CoreError::invalid_state("transaction has failed"))
        } else if !state.phase.accepts_statements() {
            Err(CoreError::invalid_state(format!(
                "transaction is {:?}",
                state.phase
            )))
        } else {
            Ok(())
        }
    }

    fn query_succeeded(self: &Arc<Self>, id: QueryId, value: Value) {
        let result_set = match ResultSet::from_backend(value) {
            Ok(result_set) => result_set,
            Err(error) => return self.query_failed(id, error.to_string()),
        };

        let callback = {
            let mut state = self.state.lock();
            match state.outstanding.get_mut(&id) {
                Some(query) => query.callbacks.on_success.take(),
                None => {
                    tracing::debug!(tx = %self.id, query = %id, "discarding result of abandoned statement");
                    return;
                }
            }
        };

        // The query stays outstanding while its callback runs, so statements
        // chained from the callback keep the transaction open.
        if let Some(callback) = callback {
            let handle = self.handle();
            guard::guarded("statement success callback", || callback(&handle, result_set));
        }

        self.state.lock().outstanding.remove(&id);
        self.evaluate();
    }

    fn query_failed(self: &Arc<Self>, id: QueryId, reason: String) {
        let taken = {
            let mut state = self.state.lock();
            match state.outstanding.remove(&id) {
                Some(query) => {
                    let discarded = state.outstanding.len();
                    state.mark_failed();
                    Some((query, discarded))
                }
                None => None,
            }
        };
        let Some((query, discarded)) = taken else {
            tracing::debug!(tx = %self.id, query = %id, "discarding error of abandoned statement");
            return;
        };

        let error = CoreError::statement_failed(query.sql(), reason);
        tracing::warn!(
            db = %self.db.name,
            tx = %self.id,
            query = %id,
            discarded,
            %error,
            "statement failed"
        );
        if let Some(callback) = query.callbacks.on_error {
            let handle = self.handle();
            guard::guarded("statement error callback", || callback(&handle, &error));
        }
        self.abort(error);
    }

    /// Fails the transaction unless it already failed or finished.
    fn fail(self: &Arc<Self>, error: CoreError) {
        if !self.state.lock().mark_failed() {
            tracing::debug!(tx = %self.id, %error, "ignoring failure of finished transaction");
            return;
        }
        tracing::warn!(db = %self.db.name, tx = %self.id, %error, "transaction failed");
        self.abort(error);
    }

    /// Failed transactions end here, after `mark_failed`.
    fn abort(self: &Arc<Self>, error: CoreError) {
        self.cancel_children();
        let rollback = {
            let mut state = self.state.lock();
            state.error = Some(error);
            let savepoint_open = matches!(
                state.phase,
                TransactionPhase::Running | TransactionPhase::Finishing
            );
            match state.connection.clone() {
                Some(connection) if savepoint_open && self.config().rollback_on_failure => {
                    state.phase = TransactionPhase::Finishing;
                    Some(connection)
                }
                _ => None,
            }
        };

        match rollback {
            Some(connection) => self.submit_control(
                &connection,
                format!("ROLLBACK TO SAVEPOINT {}", self.savepoint()),
                |tx| tx.finish_failure(),
                |tx, error| {
                    tracing::warn!(tx = %tx.id, %error, "rollback to savepoint failed");
                    tx.finish_failure();
                },
            ),
            None => self.finish_failure(),
        }
    }

    /// Fails live nested transactions without touching the connection.
    /// Runs before this transaction's terminal callback.
    fn cancel_children(&self) {
        let nested = std::mem::take(&mut self.state.lock().nested);
        for child in nested.iter().filter_map(Weak::upgrade) {
            child.cancel(CoreError::invalid_state(format!(
                "parent transaction {} failed",
                self.id
            )));
        }
    }

    fn cancel(self: &Arc<Self>, error: CoreError) {
        {
            let mut state = self.state.lock();
            if !state.mark_failed() {
                return;
            }
            state.error = Some(error);
        }
        tracing::debug!(db = %self.db.name, tx = %self.id, "cancelled with parent");
        self.cancel_children();
        self.finish_failure();
    }

    /// Fires success once the body returned and everything drained.
    fn evaluate(self: &Arc<Self>) {
        enum Next {
            Release(ConnectionId),
            Deliver(SuccessParts),
        }

        let next = {
            let mut state = self.state.lock();
            if !state.is_drained() {
                return;
            }
            match state.connection.clone() {
                Some(connection) if self.config().release_on_success => {
                    state.phase = TransactionPhase::Finishing;
                    Next::Release(connection)
                }
                _ => Next::Deliver(Self::seal_success(&mut state)),
            }
        };

        match next {
            Next::Release(connection) => {
                let sql = format!("RELEASE SAVEPOINT {}", self.savepoint());
                self.submit_control(
                    &connection,
                    sql.clone(),
                    |tx| tx.finish_release(),
                    move |tx, error| tx.fail(CoreError::statement_failed(sql, error.reason())),
                );
            }
            Next::Deliver(parts) => self.deliver_success(parts),
        }
    }

    fn finish_release(self: &Arc<Self>) {
        let parts = {
            let mut state = self.state.lock();
            if state.failed || state.phase != TransactionPhase::Finishing {
                return;
            }
            Self::seal_success(&mut state)
        };
        self.deliver_success(parts);
    }

    fn seal_success(state: &mut TransactionState) -> SuccessParts {
        state.phase = TransactionPhase::Succeeded;
        (
            state.callbacks.postflight.take(),
            state.callbacks.on_success.take(),
            state.completion.take(),
        )
    }

    fn deliver_success(&self, (postflight, on_success, completion): SuccessParts) {
        tracing::debug!(db = %self.db.name, tx = %self.id, "transaction succeeded");
        if let Some(postflight) = postflight {
            guard::guarded("postflight", postflight);
        }
        if let Some(on_success) = on_success {
            guard::guarded("transaction success callback", on_success);
        }
        Self::complete(completion);
    }

    fn finish_failure(self: &Arc<Self>) {
        let (error, on_error, completion) = {
            let mut state = self.state.lock();
            if state.phase.is_terminal() {
                return;
            }
            state.phase = TransactionPhase::Failed;
            (
                state.error.take(),
                state.callbacks.on_error.take(),
                state.completion.take(),
            )
        };
        let error = error
            .unwrap_or_else(|| CoreError::invalid_state("transaction failed without an error"));

        match on_error {
            Some(on_error) => {
                guard::guarded("transaction error callback", || on_error(error));
            }
            None => {
                tracing::warn!(
                    db = %self.db.name,
                    tx = %self.id,
                    %error,
                    "transaction failed with no error callback"
                );
            }
        }
        Self::complete(completion);
    }

    fn complete(completion: Option<Completion>) {
        match completion {
            Some(Completion::Root(queue)) => queue.advance(),
            Some(Completion::Nested(parent)) => parent.child_finished(),
            None => {}
        }
    }

    fn child_finished(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            state.children = state.children.saturating_sub(1);
        }
        self.evaluate();
    }

    /// Submits a coordinator-issued statement (savepoint, release, rollback).
    fn submit_control<S, E>(
        self: &Arc<Self>,
        connection: &ConnectionId,
        sql: String,
        on_success: S,
        on_error: E,
    ) where
        S: FnOnce(&Arc<Self>) + Send + 'static,
        E: FnOnce(&Arc<Self>, BridgeError) + Send + 'static,
    {
        let invocation =
            statement_invocation(&self.config().service, connection, &sql, &[], QueryId::new());
        let (ok, err) = (Arc::clone(self), Arc::clone(self));
        self.db.bridge.invoke(
            invocation,
            Callbacks::new(move |_| on_success(&ok), move |error| on_error(&err, error)),
        );
    }
}
