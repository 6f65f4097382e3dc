//! Error types for SAIQL operations
//!
//! Every subsystem raises one of the enums below; the engine maps them to a
//! stable [`ErrorCode`] at its boundary so callers never see raw errors.

use crate::{SessionId, TransactionId};
use thiserror::Error;

/// Stable machine-readable error codes reported on failed query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Unknown,
    SyntaxError,
    CompilationError,
    SafetyViolation,
    SecurityError,
    StorageError,
    RuntimeError,
    Timeout,
    NotFound,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unknown => "UNKNOWN_ERROR",
            ErrorCode::SyntaxError => "SYNTAX_ERROR",
            ErrorCode::CompilationError => "COMPILATION_ERROR",
            ErrorCode::SafetyViolation => "SAFETY_VIOLATION",
            ErrorCode::SecurityError => "SECURITY_ERROR",
            ErrorCode::StorageError => "STORAGE_ERROR",
            ErrorCode::RuntimeError => "RUNTIME_ERROR",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::NotFound => "NOT_FOUND",
        }
    }
}

/// Lexer failure. Lexing does not recover; the first unrecognized
/// character is fatal for the query.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("lexical error at {line}:{column} - {message}")]
pub struct LexError {
    pub message: String,
    pub position: usize,
    pub line: usize,
    pub column: usize,
}

/// Parser failure, carrying the offending token's lexeme and location.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("parse error at {line}:{column} near '{lexeme}' - {message}")]
pub struct ParseError {
    pub message: String,
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
}

/// Semantic analysis or code generation failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("semantic analysis failed: {}", .errors.join("; "))]
    SemanticAnalysis { errors: Vec<String> },

    #[error("unknown aggregate function: {name}. Supported: {supported}")]
    UnknownAggregate { name: String, supported: String },

    #[error("no SQL emission rule for {query_type} queries")]
    UnsupportedQuery { query_type: String },

    #[error("code generation failed: {reason}")]
    CodeGeneration { reason: String },
}

/// Safety policy rejected the query before execution.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SafetyViolation {
    #[error("write operation '{query_type}' forbidden by read-only policy")]
    WriteForbidden { query_type: String },

    #[error("{query_type} requires a WHERE clause under the current safety policy")]
    MissingWhereClause { query_type: String },

    #[error("access to table '{table}' is forbidden by policy")]
    ForbiddenTable { table: String },

    #[error("access to column '{column}' is forbidden by policy")]
    ForbiddenColumn { column: String },

    #[error("query joins {count} tables, policy allows at most {max}")]
    TooManyJoins { count: usize, max: usize },
}

/// Firewall decision surfaced as an error at the engine boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SecurityError {
    #[error("firewall blocked query: {}", .reasons.join(", "))]
    InputBlocked { reasons: Vec<String> },

    #[error("firewall blocked output: {}", .reasons.join(", "))]
    OutputBlocked { reasons: Vec<String> },
}

/// Adapter-reported failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("table not found: {table}")]
    TableNotFound { table: String },

    #[error("statement execution failed: {reason}")]
    ExecutionFailed { reason: String },

    #[error("adapter connection closed")]
    ConnectionClosed,
}

/// Transaction and lock layer failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TxnError {
    #[error("transaction not found: {id}")]
    NotFound { id: TransactionId },

    #[error("transaction {id} is not active (state: {state})")]
    NotActive { id: TransactionId, state: String },

    #[error("lock acquisition timed out on resource '{resource}' for transaction {id}")]
    LockTimeout { id: TransactionId, resource: String },

    #[error("isolation conflict on resource '{resource}' for transaction {id}")]
    IsolationConflict { id: TransactionId, resource: String },

    #[error("transaction {id} was aborted")]
    Aborted { id: TransactionId },
}

/// Session registry failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session not found: {id}")]
    NotFound { id: SessionId },
}

/// Configuration, legend, and firewall-rule loading failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Master error type for all SAIQL failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SaiqlError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Safety(#[from] SafetyViolation),

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("transaction error: {0}")]
    Txn(#[from] TxnError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("operation timed out: {operation}")]
    Timeout { operation: String },

    #[error("runtime error: {reason}")]
    Runtime { reason: String },
}

impl SaiqlError {
    /// Map to the stable error code exposed on query results.
    pub fn code(&self) -> ErrorCode {
        match self {
            SaiqlError::Lex(_) | SaiqlError::Parse(_) => ErrorCode::SyntaxError,
            SaiqlError::Compile(_) => ErrorCode::CompilationError,
            SaiqlError::Safety(_) => ErrorCode::SafetyViolation,
            SaiqlError::Security(_) => ErrorCode::SecurityError,
            SaiqlError::Storage(_) => ErrorCode::StorageError,
            SaiqlError::Txn(TxnError::NotFound { .. }) => ErrorCode::NotFound,
            SaiqlError::Txn(TxnError::LockTimeout { .. }) => ErrorCode::Timeout,
            SaiqlError::Txn(_) => ErrorCode::RuntimeError,
            SaiqlError::Session(SessionError::NotFound { .. }) => ErrorCode::NotFound,
            SaiqlError::Config(_) => ErrorCode::RuntimeError,
            SaiqlError::Timeout { .. } => ErrorCode::Timeout,
            SaiqlError::Runtime { .. } => ErrorCode::RuntimeError,
        }
    }
}

/// Result type alias for SAIQL operations.
pub type SaiqlResult<T> = Result<T, SaiqlError>;
