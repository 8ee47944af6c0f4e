//! Stress runs for the coordinator.
//!
//! These verify callback accounting under many transactions and under
//! concurrent submitters sharing one database handle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use websql_core::{CoreError, Database, TransactionCallbacks};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Transactions submitted.
    pub submitted: usize,
    /// Success callbacks observed.
    pub succeeded: usize,
    /// Error callbacks observed.
    pub failed: usize,
    /// Total duration.
    pub duration: Duration,
    /// Transactions per second.
    pub tx_per_second: f64,
}

impl StressTestResult {
    fn new(submitted: usize, counters: &Counters, duration: Duration) -> Self {
        let tx_per_second = if duration.as_secs_f64() > 0.0 {
            submitted as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            submitted,
            succeeded: counters.succeeded.load(Ordering::SeqCst),
            failed: counters.failed.load(Ordering::SeqCst),
            duration,
            tx_per_second,
        }
    }

    /// Every submitted transaction fired exactly one terminal callback.
    pub fn is_balanced(&self) -> bool {
        self.succeeded + self.failed == self.submitted
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Submitted: {}", self.submitted);
        println!("Succeeded: {}", self.succeeded);
        println!("Failed: {}", self.failed);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} tx/sec", self.tx_per_second);
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of transactions to submit.
    pub transactions: usize,
    /// Statements per transaction.
    pub statements: usize,
    /// Number of submitting threads (for concurrent runs).
    pub threads: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            transactions: 1_000,
            statements: 4,
            threads: 4,
        }
    }
}

#[derive(Default)]
struct Counters {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

fn counting(counters: &Arc<Counters>) -> TransactionCallbacks {
    let (ok, err) = (Arc::clone(counters), Arc::clone(counters));
    TransactionCallbacks::new()
        .on_success(move || {
            ok.succeeded.fetch_add(1, Ordering::SeqCst);
        })
        .on_error(move |_| {
            err.failed.fetch_add(1, Ordering::SeqCst);
        })
}

fn submit(db: &Database, counters: &Arc<Counters>, statements: usize, fail: bool) {
    db.transaction(
        move |tx| {
            for i in 0..statements {
                tx.execute(format!("INSERT INTO stress VALUES ({i})"), vec![])?;
            }
            if fail {
                return Err(CoreError::body_failed("intentional"));
            }
            Ok(())
        },
        counting(counters),
    );
}

/// Submits transactions one after another from a single thread.
pub fn stress_sequential_transactions(db: &Database, config: &StressConfig) -> StressTestResult {
    let counters = Arc::new(Counters::default());
    let start = Instant::now();

    for _ in 0..config.transactions {
        submit(db, &counters, config.statements, false);
    }

    StressTestResult::new(config.transactions, &counters, start.elapsed())
}

/// Submits transactions where every other body fails.
pub fn stress_transaction_failures(db: &Database, config: &StressConfig) -> StressTestResult {
    let counters = Arc::new(Counters::default());
    let start = Instant::now();

    for i in 0..config.transactions {
        submit(db, &counters, config.statements, i % 2 == 0);
    }

    StressTestResult::new(config.transactions, &counters, start.elapsed())
}

/// Submits transactions from several threads to one handle.
pub fn stress_concurrent_submitters(db: &Database, config: &StressConfig) -> StressTestResult {
    let counters = Arc::new(Counters::default());
    let per_thread = config.transactions / config.threads.max(1);
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let db = db.clone();
            let counters = Arc::clone(&counters);
            let statements = config.statements;
            thread::spawn(move || {
                for _ in 0..per_thread {
                    submit(&db, &counters, statements, false);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(per_thread * config.threads, &counters, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestHarness;

    #[test]
    fn test_sequential_transactions() {
        let harness = TestHarness::immediate();
        let db = harness.open("stress");
        let config = StressConfig {
            transactions: 500,
            ..Default::default()
        };

        let result = stress_sequential_transactions(&db, &config);
        assert_eq!(result.succeeded, 500);
        assert_eq!(result.failed, 0);
        assert!(!db.is_queue_active());
    }

    #[test]
    fn test_transaction_failures() {
        let harness = TestHarness::immediate();
        let db = harness.open("stress");
        let config = StressConfig {
            transactions: 100,
            ..Default::default()
        };

        let result = stress_transaction_failures(&db, &config);
        assert_eq!(result.succeeded, 50);
        assert_eq!(result.failed, 50);
    }

    #[test]
    fn test_concurrent_submitters() {
        let harness = TestHarness::immediate();
        let db = harness.open("stress");
        let config = StressConfig {
            transactions: 400,
            statements: 2,
            threads: 4,
        };

        let result = stress_concurrent_submitters(&db, &config);
        assert!(result.is_balanced());
        assert_eq!(result.succeeded, 400);
        assert_eq!(harness.bridge.calls_for("connect").len(), 400);
    }
}
