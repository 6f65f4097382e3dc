//! Execution context, query results, and pipeline phases

use crate::{Dialect, SessionId, TraceId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// One result row: column name → JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Observability phases a query passes through inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryPhase {
    Preparation,
    SymbolResolution,
    TypeValidation,
    MemoryAllocation,
    Execution,
    ResultProcessing,
    Cleanup,
}

impl QueryPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryPhase::Preparation => "preparation",
            QueryPhase::SymbolResolution => "symbol_resolution",
            QueryPhase::TypeValidation => "type_validation",
            QueryPhase::MemoryAllocation => "memory_allocation",
            QueryPhase::Execution => "execution",
            QueryPhase::ResultProcessing => "result_processing",
            QueryPhase::Cleanup => "cleanup",
        }
    }
}

/// Firewall guard verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuardAction {
    Allow,
    Block,
    Redact,
}

/// Caller-supplied context for a query execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Existing session to run under; `None` creates one.
    pub session_id: Option<SessionId>,
    /// Caller identity. Part of the cache fingerprint so users never share
    /// cache entries.
    pub user_id: Option<String>,
    /// Query budget; enforced at the engine-adapter boundary.
    pub timeout: Duration,
    pub max_memory_mb: u64,
    pub debug: bool,
    /// Batch execution stops at the first failure when set.
    pub fail_fast: bool,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            session_id: None,
            user_id: None,
            timeout: Duration::from_secs(300),
            max_memory_mb: 1024,
            debug: false,
            fail_fast: false,
            metadata: HashMap::new(),
        }
    }
}

impl ExecutionContext {
    /// Context for a named user.
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }
}

/// Unified result object for SAIQL query executions.
///
/// Every execution returns one of these; on failure `success` is false,
/// `data` is empty, and `error_message`/`error_phase`/`error_code` describe
/// what went wrong. Timings accumulated before the failure are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub success: bool,
    pub data: Vec<Row>,
    pub execution_time: Duration,
    pub query: String,
    pub sql_generated: String,
    pub rows_affected: u64,
    pub session_id: SessionId,
    pub trace_id: TraceId,

    // Per-phase timings
    pub lexing_time: Duration,
    pub parsing_time: Duration,
    pub compilation_time: Duration,
    pub database_time: Duration,

    // Optimization and analysis
    pub optimizations_applied: Vec<String>,
    pub complexity_score: u64,
    pub cache_hit: bool,

    // Error information
    pub error_message: Option<String>,
    pub error_phase: Option<String>,
    pub error_code: Option<String>,
    pub warnings: Vec<String>,

    // Security
    pub firewall_decision: Option<GuardAction>,
    pub redactions: Vec<String>,

    pub target_dialect: Option<Dialect>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl QueryResult {
    /// Fresh, not-yet-successful result for a query under a session.
    pub fn pending(query: impl Into<String>, session_id: SessionId, trace_id: TraceId) -> Self {
        Self {
            success: false,
            data: Vec::new(),
            execution_time: Duration::ZERO,
            query: query.into(),
            sql_generated: String::new(),
            rows_affected: 0,
            session_id,
            trace_id,
            lexing_time: Duration::ZERO,
            parsing_time: Duration::ZERO,
            compilation_time: Duration::ZERO,
            database_time: Duration::ZERO,
            optimizations_applied: Vec::new(),
            complexity_score: 0,
            cache_hit: false,
            error_message: None,
            error_phase: None,
            error_code: None,
            warnings: Vec::new(),
            firewall_decision: None,
            redactions: Vec::new(),
            target_dialect: None,
            metadata: HashMap::new(),
        }
    }

    /// Mark this result failed with a phase tag and error code.
    pub fn fail(&mut self, phase: &str, message: impl Into<String>, code: &'static str) {
        self.success = false;
        self.data.clear();
        self.error_message = Some(message.into());
        self.error_phase = Some(phase.to_string());
        self.error_code = Some(code.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_clears_data_and_tags_phase() {
        let mut result =
            QueryResult::pending("*3[users]::*>>oQ", SessionId::now_v7(), TraceId::new_v4());
        result.data.push(Row::new());
        result.fail("parsing", "unexpected token", "SYNTAX_ERROR");

        assert!(!result.success);
        assert!(result.data.is_empty());
        assert_eq!(result.error_phase.as_deref(), Some("parsing"));
        assert_eq!(result.error_code.as_deref(), Some("SYNTAX_ERROR"));
    }

    #[test]
    fn test_result_survives_json_roundtrip() {
        let result = QueryResult::pending("$1", SessionId::now_v7(), TraceId::new_v4());
        let json = serde_json::to_string(&result).expect("result should serialize");
        let back: QueryResult = serde_json::from_str(&json).expect("result should deserialize");
        assert_eq!(result, back);
    }
}
