//! Transaction records, isolation levels, and the operation log

use crate::lock::LockMode;
use chrono::{DateTime, Utc};
use saiql_core::TransactionId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// SQL standard isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ_UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ_COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE_READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transaction lifecycle states. Transitions are monotonic along
/// `Active → Preparing → Prepared → Committing → Committed` or branch to
/// `Aborting → Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxnState {
    Active,
    Preparing,
    Prepared,
    Committing,
    Committed,
    Aborting,
    Aborted,
}

impl TxnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxnState::Active => "ACTIVE",
            TxnState::Preparing => "PREPARING",
            TxnState::Prepared => "PREPARED",
            TxnState::Committing => "COMMITTING",
            TxnState::Committed => "COMMITTED",
            TxnState::Aborting => "ABORTING",
            TxnState::Aborted => "ABORTED",
        }
    }
}

impl fmt::Display for TxnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Operation kinds in the transaction log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    Read,
    Write,
    Update,
    Delete,
    Insert,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Read => "READ",
            OpKind::Write => "WRITE",
            OpKind::Update => "UPDATE",
            OpKind::Delete => "DELETE",
            OpKind::Insert => "INSERT",
        }
    }

    pub fn is_write(&self) -> bool {
        !matches!(self, OpKind::Read)
    }

    /// Lock mode required by the operation: reads take S, everything
    /// else takes X.
    pub fn lock_mode(&self) -> LockMode {
        if self.is_write() {
            LockMode::Exclusive
        } else {
            LockMode::Shared
        }
    }
}

/// One logged operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OpKind,
    pub resource: String,
    pub data: Option<serde_json::Value>,
    pub at: DateTime<Utc>,
}

/// A transaction with its log, read/write sets, and held locks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub isolation: IsolationLevel,
    pub state: TxnState,
    pub started_at: DateTime<Utc>,

    /// Ordered operation log, appended in call order.
    pub operations: Vec<Operation>,
    pub read_set: HashSet<String>,
    pub write_set: HashSet<String>,
    pub locks_held: HashSet<String>,
}

impl Transaction {
    pub fn new(id: TransactionId, isolation: IsolationLevel) -> Self {
        Self {
            id,
            isolation,
            state: TxnState::Active,
            started_at: Utc::now(),
            operations: Vec::new(),
            read_set: HashSet::new(),
            write_set: HashSet::new(),
            locks_held: HashSet::new(),
        }
    }

    /// Append an operation and track it in the read or write set.
    pub fn add_operation(&mut self, kind: OpKind, resource: &str, data: Option<serde_json::Value>) {
        self.operations.push(Operation {
            kind,
            resource: resource.to_string(),
            data,
            at: Utc::now(),
        });
        if kind.is_write() {
            self.write_set.insert(resource.to_string());
        } else {
            self.read_set.insert(resource.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_kind_lock_modes() {
        assert_eq!(OpKind::Read.lock_mode(), LockMode::Shared);
        for kind in [OpKind::Write, OpKind::Update, OpKind::Delete, OpKind::Insert] {
            assert_eq!(kind.lock_mode(), LockMode::Exclusive);
        }
    }

    #[test]
    fn test_operations_logged_in_call_order() {
        let mut txn = Transaction::new(TransactionId::now_v7(), IsolationLevel::ReadCommitted);
        txn.add_operation(OpKind::Read, "a", None);
        txn.add_operation(OpKind::Write, "b", Some(serde_json::json!({"v": 1})));
        txn.add_operation(OpKind::Read, "c", None);

        let resources: Vec<_> = txn.operations.iter().map(|op| op.resource.as_str()).collect();
        assert_eq!(resources, vec!["a", "b", "c"]);
        assert!(txn.read_set.contains("a"));
        assert!(txn.read_set.contains("c"));
        assert!(txn.write_set.contains("b"));
    }
}
