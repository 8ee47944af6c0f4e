//! Property-based test generators using proptest.
//!
//! Strategies produce transaction plans together with the order in which
//! the backend answers, so completion-order properties can be checked
//! across arbitrary interleavings.

use proptest::prelude::*;

/// Statements of one transaction, optionally with a failing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementPlan {
    /// Number of statements issued by the body.
    pub statements: usize,
    /// Index of the statement the backend rejects.
    pub fail_at: Option<usize>,
}

impl StatementPlan {
    /// SQL text of statement `index`. Failing statements contain `FAIL`.
    pub fn sql(&self, index: usize) -> String {
        if self.fail_at == Some(index) {
            format!("FAIL {index}")
        } else {
            format!("STMT {index}")
        }
    }

    /// Returns true if the transaction is expected to succeed.
    pub fn succeeds(&self) -> bool {
        self.fail_at.is_none()
    }
}

/// Strategy for statement plans with up to `max` statements.
pub fn statement_plan_strategy(max: usize) -> impl Strategy<Value = StatementPlan> {
    (0..=max).prop_flat_map(|statements| {
        let fail_at = if statements == 0 {
            Just(None).boxed()
        } else {
            prop_oneof![Just(None), (0..statements).prop_map(Some)].boxed()
        };
        fail_at.prop_map(move |fail_at| StatementPlan {
            statements,
            fail_at,
        })
    })
}

/// Strategy for a plan that always fails, with at least one statement.
pub fn failing_plan_strategy(max: usize) -> impl Strategy<Value = StatementPlan> {
    (1..=max.max(1)).prop_flat_map(|statements| {
        (0..statements).prop_map(move |index| StatementPlan {
            statements,
            fail_at: Some(index),
        })
    })
}

/// Strategy for a permutation of `0..len`.
pub fn completion_order_strategy(len: usize) -> impl Strategy<Value = Vec<usize>> {
    Just((0..len).collect::<Vec<_>>()).prop_shuffle()
}

/// Strategy for a batch of root transactions.
pub fn transaction_batch_strategy(
    max_transactions: usize,
    max_statements: usize,
) -> impl Strategy<Value = Vec<StatementPlan>> {
    prop::collection::vec(statement_plan_strategy(max_statements), 1..=max_transactions)
}

/// Strategy for the choice between oldest-first and newest-first
/// resolution of pending backend calls.
pub fn lifo_strategy() -> impl Strategy<Value = bool> {
    any::<bool>()
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn plans_are_consistent(plan in statement_plan_strategy(8)) {
            prop_assert!(plan.statements <= 8);
            if let Some(index) = plan.fail_at {
                prop_assert!(index < plan.statements);
                prop_assert!(plan.sql(index).starts_with("FAIL"));
            }
        }

        #[test]
        fn failing_plans_fail(plan in failing_plan_strategy(5)) {
            prop_assert!(!plan.succeeds());
            prop_assert!(plan.statements >= 1);
        }

        #[test]
        fn orders_are_permutations(order in completion_order_strategy(6)) {
            let mut sorted = order.clone();
            sorted.sort_unstable();
            prop_assert_eq!(sorted, (0..6).collect::<Vec<_>>());
        }
    }
}
