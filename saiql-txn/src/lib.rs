//! SAIQL Transaction Layer
//!
//! ACID transaction management over pluggable storage:
//!
//! - [`lock`]: shared/exclusive/intent locks with the hierarchical
//!   compatibility matrix and condition-variable waits
//! - [`deadlock`]: wait-for graph, DFS cycle detection, and the background
//!   detector thread
//! - [`transaction`]: transaction records, isolation levels, operation log
//! - [`manager`]: the serializable surface API (begin / execute / commit /
//!   abort) with youngest-victim deadlock resolution
//!
//! The layer is deliberately synchronous: parallel threads over shared
//! registries, no cooperative suspension in the public API.

pub mod deadlock;
pub mod lock;
pub mod manager;
pub mod transaction;

pub use deadlock::{DeadlockDetector, WaitForGraph};
pub use lock::{Lock, LockManager, LockMode};
pub use manager::{TransactionManager, TxnStats};
pub use transaction::{IsolationLevel, OpKind, Operation, Transaction, TxnState};
