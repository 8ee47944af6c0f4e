//! Per-database FIFO of root transactions.

use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;

/// Starts a queued root transaction.
pub(crate) type Runner = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Runner>,
    /// A root transaction is between start and terminal callback.
    active: bool,
    /// Some thread is inside `drain`.
    draining: bool,
}

/// Serializes root transactions of one database.
///
/// At most one runner is active at a time; the next one starts only after
/// [`TransactionQueue::advance`] reports that the active transaction has
/// fired its terminal callback.
///
/// Runners that complete synchronously (bridges that resolve inside
/// `invoke`) are started from a loop rather than recursively, so a long
/// queue does not grow the stack.
#[derive(Default)]
pub(crate) struct TransactionQueue {
    state: Mutex<QueueState>,
}

impl TransactionQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends `runner`, starting it now if the queue is idle.
    pub(crate) fn enqueue(&self, runner: Runner) {
        self.state.lock().pending.push_back(runner);
        self.drain();
    }

    /// Marks the active transaction finished and starts the next one.
    pub(crate) fn advance(&self) {
        self.state.lock().active = false;
        self.drain();
    }

    /// True while a root transaction is executing.
    pub(crate) fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// Number of root transactions waiting for their turn.
    pub(crate) fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    fn drain(&self) {
        let mut state = self.state.lock();
        if state.draining {
            return;
        }
        state.draining = true;
        while !state.active {
            let Some(runner) = state.pending.pop_front() else {
                break;
            };
            state.active = true;
            MutexGuard::unlocked(&mut state, runner);
        }
        state.draining = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording(log: &Log, name: &str) -> Runner {
        let log = Arc::clone(log);
        let name = name.to_string();
        Box::new(move || log.lock().push(name))
    }

    #[test]
    fn idle_queue_runs_immediately() {
        let queue = TransactionQueue::new();
        let log = Log::default();
        queue.enqueue(recording(&log, "a"));
        assert_eq!(*log.lock(), vec!["a"]);
        assert!(queue.is_active());
    }

    #[test]
    fn active_queue_waits_for_advance() {
        let queue = TransactionQueue::new();
        let log = Log::default();
        queue.enqueue(recording(&log, "a"));
        queue.enqueue(recording(&log, "b"));
        queue.enqueue(recording(&log, "c"));
        assert_eq!(*log.lock(), vec!["a"]);
        assert_eq!(queue.pending_len(), 2);

        queue.advance();
        assert_eq!(*log.lock(), vec!["a", "b"]);
        queue.advance();
        queue.advance();
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
        assert!(!queue.is_active());
        assert_eq!(queue.pending_len(), 0);
    }

    #[test]
    fn synchronous_completion_drains_in_order() {
        let queue = Arc::new(TransactionQueue::new());
        let log = Log::default();
        for i in 0..1000 {
            let q = Arc::clone(&queue);
            let log = Arc::clone(&log);
            queue.enqueue(Box::new(move || {
                log.lock().push(i.to_string());
                q.advance();
            }));
        }
        let log = log.lock();
        assert_eq!(log.len(), 1000);
        assert_eq!(log[0], "0");
        assert_eq!(log[999], "999");
        assert!(!queue.is_active());
    }

    #[test]
    fn enqueue_from_inside_runner_is_deferred() {
        let queue = Arc::new(TransactionQueue::new());
        let log = Log::default();
        let (q, l) = (Arc::clone(&queue), Arc::clone(&log));
        queue.enqueue(Box::new(move || {
            q.enqueue(recording(&l, "inner"));
            l.lock().push("outer".to_string());
            q.advance();
        }));
        assert_eq!(*log.lock(), vec!["outer", "inner"]);
    }
}
