//! Transaction state.

use crate::error::CoreError;
use crate::queue::TransactionQueue;
use crate::transaction::callbacks::{TransactionBody, TransactionCallbacks};
use crate::transaction::driver::TransactionInner;
use crate::transaction::query::Query;
use crate::types::{ConnectionId, QueryId};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Lifecycle phase of a transaction.
///
/// ```text
/// Queued -> Connecting -> Beginning -> Running -> Succeeded
///                |            |           |   \-> Finishing -> Succeeded | Failed
///                \------------\-----------\-----> Failed
/// ```
///
/// Nested transactions skip `Queued` and `Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionPhase {
    /// Waiting in the database queue.
    Queued,
    /// Waiting for the backend to assign a connection.
    Connecting,
    /// Waiting for the savepoint marker.
    Beginning,
    /// Body running or statements outstanding.
    Running,
    /// Waiting for a release or rollback statement.
    Finishing,
    /// Success callback has run.
    Succeeded,
    /// Error callback has run.
    Failed,
}

impl TransactionPhase {
    /// Returns true once a terminal callback has fired.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Returns true if statements and nested transactions may be issued.
    #[must_use]
    pub fn accepts_statements(&self) -> bool {
        *self == Self::Running
    }
}

/// What happens after the terminal callback.
pub(crate) enum Completion {
    /// Root transaction: let the queue start the next one.
    Root(Arc<TransactionQueue>),
    /// Nested transaction: let the parent re-check completion.
    Nested(Arc<TransactionInner>),
}

/// Mutable part of a transaction, guarded by the transaction's lock.
pub(crate) struct TransactionState {
    pub(crate) phase: TransactionPhase,
    pub(crate) connection: Option<ConnectionId>,
    pub(crate) outstanding: HashMap<QueryId, Query>,
    /// Nested transactions that have not reached a terminal phase.
    pub(crate) children: usize,
    /// Handles to nested transactions, cancelled if this one fails.
    pub(crate) nested: Vec<Weak<TransactionInner>>,
    pub(crate) body_returned: bool,
    /// Set by the first failure; later results are discarded.
    pub(crate) failed: bool,
    pub(crate) error: Option<CoreError>,
    pub(crate) body: Option<TransactionBody>,
    pub(crate) callbacks: TransactionCallbacks,
    pub(crate) completion: Option<Completion>,
}

impl TransactionState {
    pub(crate) fn new(
        phase: TransactionPhase,
        body: TransactionBody,
        callbacks: TransactionCallbacks,
        completion: Completion,
    ) -> Self {
        Self {
            phase,
            connection: None,
            outstanding: HashMap::new(),
            children: 0,
            nested: Vec::new(),
            body_returned: false,
            failed: false,
            error: None,
            body: Some(body),
            callbacks,
            completion: Some(completion),
        }
    }

    /// Success condition: body returned, nothing outstanding, never failed.
    pub(crate) fn is_drained(&self) -> bool {
        self.phase == TransactionPhase::Running
            && !self.failed
            && self.body_returned
            && self.outstanding.is_empty()
            && self.children == 0
    }

    /// Records the first failure and discards outstanding queries.
    ///
    /// Returns false if the transaction had already failed or finished.
    pub(crate) fn mark_failed(&mut self) -> bool {
        if self.failed || self.phase.is_terminal() {
            return false;
        }
        self.failed = true;
        self.outstanding.clear();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::callbacks::StatementCallbacks;

    fn state() -> TransactionState {
        TransactionState::new(
            TransactionPhase::Running,
            Box::new(|_| Ok(())),
            TransactionCallbacks::new(),
            Completion::Root(Arc::new(TransactionQueue::new())),
        )
    }

    #[test]
    fn terminal_phases() {
        assert!(TransactionPhase::Succeeded.is_terminal());
        assert!(TransactionPhase::Failed.is_terminal());
        assert!(!TransactionPhase::Finishing.is_terminal());
        assert!(TransactionPhase::Running.accepts_statements());
        assert!(!TransactionPhase::Beginning.accepts_statements());
    }

    #[test]
    fn drained_requires_body_return() {
        let mut s = state();
        assert!(!s.is_drained());
        s.body_returned = true;
        assert!(s.is_drained());
    }

    #[test]
    fn drained_requires_empty_outstanding_and_children() {
        let mut s = state();
        s.body_returned = true;
        let q = Query::new("SELECT 1".into(), vec![], StatementCallbacks::new());
        s.outstanding.insert(q.id(), q);
        assert!(!s.is_drained());
        s.outstanding.clear();
        s.children = 1;
        assert!(!s.is_drained());
    }

    #[test]
    fn mark_failed_once() {
        let mut s = state();
        let q = Query::new("SELECT 1".into(), vec![], StatementCallbacks::new());
        s.outstanding.insert(q.id(), q);

        assert!(s.mark_failed());
        assert!(s.outstanding.is_empty());
        assert!(!s.mark_failed());
        s.body_returned = true;
        assert!(!s.is_drained());
    }

    #[test]
    fn mark_failed_after_terminal_is_ignored() {
        let mut s = state();
        s.phase = TransactionPhase::Succeeded;
        assert!(!s.mark_failed());
    }
}
