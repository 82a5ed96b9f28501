//! Per-operation instrumentation
//!
//! Every public ledger operation is counted and timed under a fixed label.
//! Counters are lock-free and shared by clones of the service, so the HTTP
//! layer can expose a snapshot while requests are in flight.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Upper bounds (inclusive, in milliseconds) of the latency histogram
/// buckets. A final unbounded bucket catches everything slower.
pub const LATENCY_BUCKETS_MS: [u64; 7] = [1, 5, 10, 50, 100, 500, 1000];

/// The instrumented ledger operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateAccount,
    ListAccounts,
    ListPaymentTransactions,
    Deposit,
    SendPayment,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::CreateAccount,
        Operation::ListAccounts,
        Operation::ListPaymentTransactions,
        Operation::Deposit,
        Operation::SendPayment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateAccount => "create_account",
            Operation::ListAccounts => "list_accounts",
            Operation::ListPaymentTransactions => "list_payment_transactions",
            Operation::Deposit => "deposit",
            Operation::SendPayment => "send_payment",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

#[derive(Debug, Default)]
struct OperationStats {
    calls: AtomicU64,
    failures: AtomicU64,
    total_latency_us: AtomicU64,
    max_latency_us: AtomicU64,
    // one slot per bound plus the overflow bucket
    buckets: [AtomicU64; LATENCY_BUCKETS_MS.len() + 1],
}

/// Call counters and latency histograms, one set per [`Operation`]
#[derive(Debug, Default)]
pub struct OperationMetrics {
    stats: [OperationStats; Operation::ALL.len()],
}

impl OperationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished call
    pub fn record(&self, operation: Operation, elapsed: Duration, succeeded: bool) {
        let stats = &self.stats[operation.index()];
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);

        stats.calls.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            stats.failures.fetch_add(1, Ordering::Relaxed);
        }
        stats.total_latency_us.fetch_add(micros, Ordering::Relaxed);
        stats.max_latency_us.fetch_max(micros, Ordering::Relaxed);

        let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let bucket = LATENCY_BUCKETS_MS
            .iter()
            .position(|bound| millis <= *bound)
            .unwrap_or(LATENCY_BUCKETS_MS.len());
        stats.buckets[bucket].fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters of one operation
    pub fn operation(&self, operation: Operation) -> OperationSnapshot {
        let stats = &self.stats[operation.index()];
        let buckets = stats
            .buckets
            .iter()
            .enumerate()
            .map(|(i, count)| LatencyBucket {
                le_ms: LATENCY_BUCKETS_MS.get(i).copied(),
                count: count.load(Ordering::Relaxed),
            })
            .collect();

        OperationSnapshot {
            operation: operation.as_str(),
            calls: stats.calls.load(Ordering::Relaxed),
            failures: stats.failures.load(Ordering::Relaxed),
            total_latency_us: stats.total_latency_us.load(Ordering::Relaxed),
            max_latency_us: stats.max_latency_us.load(Ordering::Relaxed),
            latency_buckets: buckets,
        }
    }

    /// Snapshot of every operation, in [`Operation::ALL`] order
    pub fn snapshot(&self) -> Vec<OperationSnapshot> {
        Operation::ALL.iter().map(|op| self.operation(*op)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatencyBucket {
    /// `None` for the overflow bucket
    pub le_ms: Option<u64>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationSnapshot {
    pub operation: &'static str,
    pub calls: u64,
    pub failures: u64,
    pub total_latency_us: u64,
    pub max_latency_us: u64,
    pub latency_buckets: Vec<LatencyBucket>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts_calls_and_failures() {
        let metrics = OperationMetrics::new();
        metrics.record(Operation::Deposit, Duration::from_millis(3), true);
        metrics.record(Operation::Deposit, Duration::from_millis(40), false);

        let deposit = metrics.operation(Operation::Deposit);
        assert_eq!(deposit.operation, "deposit");
        assert_eq!(deposit.calls, 2);
        assert_eq!(deposit.failures, 1);
        assert_eq!(deposit.total_latency_us, 43_000);
        assert_eq!(deposit.max_latency_us, 40_000);

        // Other operations untouched
        assert_eq!(metrics.operation(Operation::SendPayment).calls, 0);
    }

    #[test]
    fn test_latency_buckets() {
        let metrics = OperationMetrics::new();
        metrics.record(Operation::SendPayment, Duration::from_micros(800), true);
        metrics.record(Operation::SendPayment, Duration::from_millis(5), true);
        metrics.record(Operation::SendPayment, Duration::from_secs(3), true);

        let buckets = metrics.operation(Operation::SendPayment).latency_buckets;
        assert_eq!(buckets.len(), LATENCY_BUCKETS_MS.len() + 1);
        assert_eq!(buckets[0], LatencyBucket { le_ms: Some(1), count: 1 });
        assert_eq!(buckets[1], LatencyBucket { le_ms: Some(5), count: 1 });
        assert_eq!(buckets.last().unwrap(), &LatencyBucket { le_ms: None, count: 1 });
    }

    #[test]
    fn test_snapshot_lists_every_operation() {
        let labels: Vec<&str> = OperationMetrics::new()
            .snapshot()
            .iter()
            .map(|s| s.operation)
            .collect();
        assert_eq!(
            labels,
            vec![
                "create_account",
                "list_accounts",
                "list_payment_transactions",
                "deposit",
                "send_payment"
            ]
        );
    }
}
