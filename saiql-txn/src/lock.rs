//! Lock manager with hierarchical lock modes
//!
//! Per resource the manager holds an ordered list of active locks.
//! Acquisition purges expired locks, short-circuits re-entrant requests,
//! computes the blocker set under the standard compatibility matrix, and
//! waits on a condition variable co-located with the lock table. Release
//! broadcasts to all waiters; signal-only wakeups would miss graph
//! changes. Lock conversion/escalation is not implemented.

use crate::deadlock::{DeadlockDetector, WaitForGraph};
use saiql_core::TransactionId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

// ============================================================================
// LOCK MODES
// ============================================================================

/// Lock granularity and modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockMode {
    /// Read lock
    Shared,
    /// Write lock
    Exclusive,
    /// Intent to read at finer granularity
    IntentShared,
    /// Intent to write at finer granularity
    IntentExclusive,
    /// Read with intent to write
    SharedIntentExclusive,
}

impl LockMode {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            LockMode::Shared => "S",
            LockMode::Exclusive => "X",
            LockMode::IntentShared => "IS",
            LockMode::IntentExclusive => "IX",
            LockMode::SharedIntentExclusive => "SIX",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, LockModeParseError> {
        match s {
            "S" => Ok(LockMode::Shared),
            "X" => Ok(LockMode::Exclusive),
            "IS" => Ok(LockMode::IntentShared),
            "IX" => Ok(LockMode::IntentExclusive),
            "SIX" => Ok(LockMode::SharedIntentExclusive),
            _ => Err(LockModeParseError(s.to_string())),
        }
    }

    /// Standard hierarchical compatibility matrix:
    ///
    /// ```text
    ///      IS    IX    S     SIX   X
    /// IS   T     T     T     T     F
    /// IX   T     T     F     F     F
    /// S    T     F     T     F     F
    /// SIX  T     F     F     F     F
    /// X    F     F     F     F     F
    /// ```
    pub fn compatible_with(&self, other: LockMode) -> bool {
        use LockMode::*;
        matches!(
            (*self, other),
            (IntentShared, IntentShared)
                | (IntentShared, IntentExclusive)
                | (IntentShared, Shared)
                | (IntentShared, SharedIntentExclusive)
                | (IntentExclusive, IntentShared)
                | (IntentExclusive, IntentExclusive)
                | (Shared, IntentShared)
                | (Shared, Shared)
                | (SharedIntentExclusive, IntentShared)
        )
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for LockMode {
    type Err = LockModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid lock mode string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockModeParseError(pub String);

impl fmt::Display for LockModeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid lock mode: {}", self.0)
    }
}

impl std::error::Error for LockModeParseError {}

// ============================================================================
// LOCK RECORD
// ============================================================================

/// One granted lock on a resource.
#[derive(Debug, Clone)]
pub struct Lock {
    pub resource_id: String,
    pub mode: LockMode,
    pub transaction_id: TransactionId,
    pub acquired_at: Instant,
    /// Absolute expiry; `None` means the lock lives until release.
    pub expires_at: Option<Instant>,
}

impl Lock {
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expiry| now >= expiry)
    }
}

// ============================================================================
// LOCK MANAGER
// ============================================================================

type LockTable = HashMap<String, Vec<Lock>>;
type DeadlockHandler = Box<dyn Fn(&[TransactionId]) + Send + Sync>;

/// Lock manager with an embedded wait-for graph and background deadlock
/// detection. The resolution handler is registered by the transaction
/// manager after construction.
pub struct LockManager {
    table: Mutex<LockTable>,
    condvar: Condvar,
    graph: Arc<WaitForGraph>,
    handler: Arc<Mutex<Option<DeadlockHandler>>>,
    detector: DeadlockDetector,
}

impl LockManager {
    pub fn new(detection_interval: Duration) -> Self {
        let graph = Arc::new(WaitForGraph::new());
        let handler: Arc<Mutex<Option<DeadlockHandler>>> = Arc::new(Mutex::new(None));

        let handler_slot = Arc::clone(&handler);
        let detector = DeadlockDetector::start(
            Arc::clone(&graph),
            detection_interval,
            move |cycle: Vec<TransactionId>| {
                let guard = handler_slot.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(handler) = guard.as_ref() {
                    handler(&cycle);
                }
            },
        );

        Self {
            table: Mutex::new(HashMap::new()),
            condvar: Condvar::new(),
            graph,
            handler,
            detector,
        }
    }

    /// Register the deadlock resolution handler (the transaction
    /// manager's youngest-victim resolver).
    pub fn set_deadlock_handler<F>(&self, handler: F)
    where
        F: Fn(&[TransactionId]) + Send + Sync + 'static,
    {
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(handler));
    }

    fn table(&self) -> MutexGuard<'_, LockTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquire a lock, blocking up to `timeout`. Returns false on timeout.
    ///
    /// Wait edges added while blocked are removed again on success and on
    /// timeout; the graph only ever shows transactions that are currently
    /// waiting.
    pub fn acquire(
        &self,
        resource: &str,
        mode: LockMode,
        transaction_id: TransactionId,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        let mut blockers: HashSet<TransactionId> = HashSet::new();
        let mut table = self.table();

        loop {
            let now = Instant::now();
            let locks = table.entry(resource.to_string()).or_default();
            locks.retain(|lock| !lock.is_expired(now));

            // Re-entrant request for a mode already held.
            if locks
                .iter()
                .any(|lock| lock.transaction_id == transaction_id && lock.mode == mode)
            {
                self.clear_edges_to(transaction_id, &blockers);
                return true;
            }

            // Every *other* transaction holding an incompatible lock.
            let current: HashSet<TransactionId> = locks
                .iter()
                .filter(|lock| {
                    lock.transaction_id != transaction_id && !mode.compatible_with(lock.mode)
                })
                .map(|lock| lock.transaction_id)
                .collect();

            if current.is_empty() {
                locks.push(Lock {
                    resource_id: resource.to_string(),
                    mode,
                    transaction_id,
                    acquired_at: now,
                    expires_at: None,
                });
                self.clear_edges_to(transaction_id, &blockers);
                debug!(resource, mode = %mode, tx = %transaction_id, "lock acquired");
                return true;
            }

            // Reconcile wait edges with the current blocker set.
            for stale in blockers.difference(&current) {
                self.graph.remove_edge(transaction_id, *stale);
            }
            for fresh in current.difference(&blockers) {
                self.graph.add_edge(transaction_id, *fresh);
            }
            blockers = current;

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.clear_edges_to(transaction_id, &blockers);
                debug!(resource, tx = %transaction_id, "lock acquisition timed out");
                return false;
            }

            // Bounded wait slices keep the loop responsive to graph
            // changes even if a wakeup is missed.
            let slice = remaining.min(Duration::from_millis(100));
            let (guard, _) = self
                .condvar
                .wait_timeout(table, slice)
                .unwrap_or_else(PoisonError::into_inner);
            table = guard;
        }
    }

    fn clear_edges_to(&self, transaction_id: TransactionId, blockers: &HashSet<TransactionId>) {
        for blocker in blockers {
            self.graph.remove_edge(transaction_id, *blocker);
        }
    }

    /// Release the transaction's locks on one resource and wake all
    /// waiters.
    pub fn release(&self, resource: &str, transaction_id: TransactionId) {
        let mut table = self.table();
        if let Some(locks) = table.get_mut(resource) {
            locks.retain(|lock| lock.transaction_id != transaction_id);
            if locks.is_empty() {
                table.remove(resource);
            }
        }
        self.condvar.notify_all();
    }

    /// Release every lock the transaction holds and wake all waiters.
    pub fn release_all(&self, transaction_id: TransactionId) {
        let mut table = self.table();
        table.retain(|_, locks| {
            locks.retain(|lock| lock.transaction_id != transaction_id);
            !locks.is_empty()
        });
        self.condvar.notify_all();
    }

    /// Drop every wait-for edge involving the transaction.
    pub fn clear_wait_edges(&self, transaction_id: TransactionId) {
        self.graph.clear_transaction(transaction_id);
    }

    /// Resources on which the transaction currently holds locks.
    pub fn resources_held_by(&self, transaction_id: TransactionId) -> Vec<String> {
        self.table()
            .iter()
            .filter(|(_, locks)| {
                locks
                    .iter()
                    .any(|lock| lock.transaction_id == transaction_id)
            })
            .map(|(resource, _)| resource.clone())
            .collect()
    }

    pub fn total_locks(&self) -> usize {
        self.table().values().map(Vec::len).sum()
    }

    pub fn graph(&self) -> &WaitForGraph {
        &self.graph
    }

    /// Stop the background detector.
    pub fn shutdown(&self) {
        self.detector.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> LockManager {
        LockManager::new(Duration::from_millis(50))
    }

    fn tx() -> TransactionId {
        TransactionId::now_v7()
    }

    #[test]
    fn test_compatibility_matrix_matches_canonical_table() {
        use LockMode::*;
        let modes = [
            IntentShared,
            IntentExclusive,
            Shared,
            SharedIntentExclusive,
            Exclusive,
        ];
        // Canonical table, row = requested, column = held.
        let expected = [
            [true, true, true, true, false],     // IS
            [true, true, false, false, false],   // IX
            [true, false, true, false, false],   // S
            [true, false, false, false, false],  // SIX
            [false, false, false, false, false], // X
        ];
        for (i, row_mode) in modes.iter().enumerate() {
            for (j, col_mode) in modes.iter().enumerate() {
                assert_eq!(
                    row_mode.compatible_with(*col_mode),
                    expected[i][j],
                    "({}, {})",
                    row_mode,
                    col_mode
                );
            }
        }
    }

    #[test]
    fn test_lock_mode_roundtrip() {
        use LockMode::*;
        for mode in [Shared, Exclusive, IntentShared, IntentExclusive, SharedIntentExclusive] {
            assert_eq!(LockMode::from_db_str(mode.as_db_str()), Ok(mode));
        }
        assert!(LockMode::from_db_str("Z").is_err());
    }

    #[test]
    fn test_shared_locks_coexist() {
        let lm = manager();
        let (t1, t2) = (tx(), tx());
        assert!(lm.acquire("r", LockMode::Shared, t1, Duration::from_millis(100)));
        assert!(lm.acquire("r", LockMode::Shared, t2, Duration::from_millis(100)));
        assert_eq!(lm.total_locks(), 2);
        lm.shutdown();
    }

    #[test]
    fn test_exclusive_blocks_until_timeout() {
        let lm = manager();
        let (t1, t2) = (tx(), tx());
        assert!(lm.acquire("r", LockMode::Exclusive, t1, Duration::from_millis(100)));

        let started = Instant::now();
        assert!(!lm.acquire("r", LockMode::Exclusive, t2, Duration::from_millis(150)));
        assert!(started.elapsed() >= Duration::from_millis(150));

        // Wait edges from the failed request must be gone.
        assert!(!lm.graph().is_waiting(t2));
        lm.shutdown();
    }

    #[test]
    fn test_reentrant_same_mode_succeeds() {
        let lm = manager();
        let t1 = tx();
        assert!(lm.acquire("r", LockMode::Exclusive, t1, Duration::from_millis(100)));
        assert!(lm.acquire("r", LockMode::Exclusive, t1, Duration::from_millis(100)));
        assert_eq!(lm.total_locks(), 1);
        lm.shutdown();
    }

    #[test]
    fn test_release_wakes_waiter() {
        use std::thread;

        let lm = Arc::new(manager());
        let (t1, t2) = (tx(), tx());
        assert!(lm.acquire("r", LockMode::Exclusive, t1, Duration::from_millis(100)));

        let lm2 = Arc::clone(&lm);
        let waiter = thread::spawn(move || {
            lm2.acquire("r", LockMode::Exclusive, t2, Duration::from_secs(5))
        });

        thread::sleep(Duration::from_millis(50));
        lm.release_all(t1);
        assert!(waiter.join().expect("waiter thread should not panic"));
        assert_eq!(lm.resources_held_by(t2), vec!["r".to_string()]);
        lm.shutdown();
    }

    #[test]
    fn test_release_all_clears_every_resource() {
        let lm = manager();
        let t1 = tx();
        assert!(lm.acquire("a", LockMode::Shared, t1, Duration::from_millis(100)));
        assert!(lm.acquire("b", LockMode::Exclusive, t1, Duration::from_millis(100)));
        lm.release_all(t1);
        assert_eq!(lm.total_locks(), 0);
        assert!(lm.resources_held_by(t1).is_empty());
        lm.shutdown();
    }

    #[test]
    fn test_intent_locks_follow_matrix_at_runtime() {
        let lm = manager();
        let (t1, t2) = (tx(), tx());
        assert!(lm.acquire("r", LockMode::IntentShared, t1, Duration::from_millis(100)));
        assert!(lm.acquire("r", LockMode::SharedIntentExclusive, t2, Duration::from_millis(100)));
        // X is incompatible with everything.
        let t3 = tx();
        assert!(!lm.acquire("r", LockMode::Exclusive, t3, Duration::from_millis(120)));
        lm.shutdown();
    }
}
