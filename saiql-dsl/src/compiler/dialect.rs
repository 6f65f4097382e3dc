//! Dialect capability matrix
//!
//! Each target dialect declares its quoting rules, identifier limits,
//! parameter placeholder style, and feature support. The code generator
//! consults this matrix instead of branching on the dialect directly.

use saiql_core::Dialect;

/// Identifier case behavior of the dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseSensitivity {
    Sensitive,
    Insensitive,
}

/// Parameter placeholder style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStyle {
    /// `?`
    QMark,
    /// `$1`, `$2`, ...
    Numeric,
    /// `%s`
    Format,
}

impl ParamStyle {
    /// Placeholder for the 1-based parameter `index`.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            ParamStyle::QMark => "?".to_string(),
            ParamStyle::Numeric => format!("${}", index),
            ParamStyle::Format => "%s".to_string(),
        }
    }
}

/// Capability matrix for one SQL dialect.
#[derive(Debug, Clone, PartialEq)]
pub struct DialectConfig {
    pub quote_char: char,
    pub max_identifier_length: usize,
    pub case_sensitivity: CaseSensitivity,
    pub param_style: ParamStyle,
    pub supports_cte: bool,
    pub supports_window_functions: bool,
    pub supports_returning: bool,
    pub supports_merge: bool,
    pub supports_check_constraints: bool,
    pub supports_json: bool,
    pub supports_arrays: bool,
}

const SQLITE: DialectConfig = DialectConfig {
    quote_char: '"',
    max_identifier_length: 1024,
    case_sensitivity: CaseSensitivity::Insensitive,
    param_style: ParamStyle::QMark,
    supports_cte: true,
    supports_window_functions: true,
    supports_returning: true,
    supports_merge: false,
    supports_check_constraints: true,
    supports_json: true, // via the JSON1 extension
    supports_arrays: false,
};

const POSTGRES: DialectConfig = DialectConfig {
    quote_char: '"',
    max_identifier_length: 63,
    case_sensitivity: CaseSensitivity::Sensitive,
    param_style: ParamStyle::Numeric,
    supports_cte: true,
    supports_window_functions: true,
    supports_returning: true,
    supports_merge: true, // via INSERT ON CONFLICT
    supports_check_constraints: true,
    supports_json: true, // JSONB
    supports_arrays: true,
};

const MYSQL: DialectConfig = DialectConfig {
    quote_char: '`',
    max_identifier_length: 64,
    case_sensitivity: CaseSensitivity::Insensitive,
    param_style: ParamStyle::Format,
    supports_cte: true,              // MySQL 8.0+
    supports_window_functions: true, // MySQL 8.0+
    supports_returning: false,
    supports_merge: false, // via ON DUPLICATE KEY UPDATE
    supports_check_constraints: true,
    supports_json: true,
    supports_arrays: false, // JSON arrays only
};

impl DialectConfig {
    /// The capability matrix for a dialect.
    pub fn of(dialect: Dialect) -> &'static DialectConfig {
        match dialect {
            Dialect::Sqlite => &SQLITE,
            Dialect::Postgres => &POSTGRES,
            Dialect::MySql => &MYSQL,
        }
    }
}
