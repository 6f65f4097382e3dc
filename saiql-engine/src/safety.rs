//! Safety policy
//!
//! Per-query resource and access constraints enforced against the parsed
//! AST, before any SQL is generated or executed. A violation halts the
//! pipeline.

use saiql_core::SafetyViolation;
use saiql_dsl::parser::ast::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Configuration for query safety guardrails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyPolicy {
    pub name: String,

    // Resource limits (enforced at the engine-adapter boundary)
    pub max_rows_scanned: u64,
    pub max_rows_returned: u64,
    pub max_execution_time: Duration,
    pub max_memory_mb: u64,

    // Query constraints
    /// Applies to UPDATE/DELETE queries only.
    pub require_where_clause: bool,
    pub require_limit_clause: bool,
    pub max_joins: usize,

    // Forbidden items (matched case-insensitively)
    pub forbidden_tables: HashSet<String>,
    pub forbidden_columns: HashSet<String>,
    pub read_only: bool,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            name: "custom".to_string(),
            max_rows_scanned: 100_000,
            max_rows_returned: 1000,
            max_execution_time: Duration::from_secs(5),
            max_memory_mb: 512,
            require_where_clause: true,
            require_limit_clause: false,
            max_joins: 3,
            forbidden_tables: HashSet::new(),
            forbidden_columns: HashSet::new(),
            read_only: false,
        }
    }
}

impl SafetyPolicy {
    /// Strict policy for production and untrusted input.
    pub fn strict() -> Self {
        Self {
            name: "strict".to_string(),
            max_rows_returned: 100,
            require_where_clause: true,
            require_limit_clause: true,
            read_only: true,
            ..Self::default()
        }
    }

    /// Relaxed policy for development.
    pub fn development() -> Self {
        Self {
            name: "development".to_string(),
            max_rows_scanned: 1_000_000,
            max_rows_returned: 10_000,
            require_where_clause: false,
            read_only: false,
            ..Self::default()
        }
    }

    /// Validate an AST against this policy.
    pub fn validate_query(&self, ast: &AstNode) -> Result<(), SafetyViolation> {
        let query = match ast.as_query() {
            Some(query) => query,
            None => return Ok(()),
        };

        if self.read_only && !query.query_type.is_read_only() {
            return Err(SafetyViolation::WriteForbidden {
                query_type: query.query_type.to_string(),
            });
        }

        if self.require_where_clause
            && matches!(query.query_type, QueryType::Update | QueryType::Delete)
            && query.conditions.is_empty()
        {
            return Err(SafetyViolation::MissingWhereClause {
                query_type: query.query_type.to_string(),
            });
        }

        if query.query_type == QueryType::Join {
            let table_count = collect_tables(ast).len();
            let join_count = table_count.saturating_sub(1);
            if join_count > self.max_joins {
                return Err(SafetyViolation::TooManyJoins {
                    count: join_count,
                    max: self.max_joins,
                });
            }
        }

        if !self.forbidden_tables.is_empty() {
            let forbidden: HashSet<String> = self
                .forbidden_tables
                .iter()
                .map(|t| t.to_lowercase())
                .collect();
            for table in collect_tables(ast) {
                if forbidden.contains(&table.to_lowercase()) {
                    return Err(SafetyViolation::ForbiddenTable { table });
                }
            }
        }

        if !self.forbidden_columns.is_empty() {
            let forbidden: HashSet<String> = self
                .forbidden_columns
                .iter()
                .map(|c| c.to_lowercase())
                .collect();
            for column in collect_columns(ast) {
                // Match both the full (possibly dotted) name and its
                // final segment, so forbidding `ssn` also catches
                // `users.ssn`.
                let lowered = column.to_lowercase();
                let segment = lowered.rsplit('.').next().unwrap_or(&lowered);
                if forbidden.contains(&lowered) || forbidden.contains(segment) {
                    return Err(SafetyViolation::ForbiddenColumn { column });
                }
            }
        }

        Ok(())
    }
}

/// All table names referenced anywhere in the tree.
pub fn collect_tables(node: &AstNode) -> HashSet<String> {
    let mut tables = HashSet::new();
    walk_tables(node, &mut tables);
    tables
}

fn walk_tables(node: &AstNode, tables: &mut HashSet<String>) {
    match node {
        AstNode::Query(query) => {
            if let Some(operation) = &query.operation {
                walk_tables(operation, tables);
            }
            if let Some(target) = &query.target {
                walk_tables(target, tables);
            }
            for condition in &query.conditions {
                walk_tables(condition, tables);
            }
        }
        AstNode::Container(container) => {
            for content in &container.contents {
                walk_tables(content, tables);
            }
        }
        AstNode::TableRef(table) => {
            tables.insert(table.table_name.clone());
        }
        AstNode::BinaryOp(op) => {
            walk_tables(&op.left, tables);
            walk_tables(&op.right, tables);
        }
        AstNode::Join(join) => {
            if let Some(condition) = &join.condition {
                walk_tables(condition, tables);
            }
        }
        AstNode::FunctionCall(func) => {
            for arg in &func.arguments {
                walk_tables(arg, tables);
            }
        }
        AstNode::ColumnRef(_)
        | AstNode::ColumnList(_)
        | AstNode::Literal(_)
        | AstNode::Schema(_)
        | AstNode::Transaction(_) => {}
    }
}

/// All column names referenced anywhere in the tree. The wildcard is not
/// a column.
pub fn collect_columns(node: &AstNode) -> HashSet<String> {
    let mut columns = HashSet::new();
    walk_columns(node, &mut columns);
    columns
}

fn walk_columns(node: &AstNode, columns: &mut HashSet<String>) {
    match node {
        AstNode::Query(query) => {
            if let Some(operation) = &query.operation {
                walk_columns(operation, columns);
            }
            if let Some(target) = &query.target {
                walk_columns(target, columns);
            }
            for condition in &query.conditions {
                walk_columns(condition, columns);
            }
            if let Some(output) = &query.output {
                walk_columns(output, columns);
            }
        }
        AstNode::Container(container) => {
            for content in &container.contents {
                walk_columns(content, columns);
            }
            if let Some(list) = &container.columns {
                for column in &list.columns {
                    if column != "*" {
                        columns.insert(column.clone());
                    }
                }
            }
        }
        AstNode::ColumnList(list) => {
            for column in &list.columns {
                if column != "*" {
                    columns.insert(column.clone());
                }
            }
        }
        AstNode::ColumnRef(column) => {
            columns.insert(column.column_name.clone());
        }
        AstNode::BinaryOp(op) => {
            walk_columns(&op.left, columns);
            walk_columns(&op.right, columns);
        }
        AstNode::Join(join) => {
            if let Some(condition) = &join.condition {
                walk_columns(condition, columns);
            }
        }
        AstNode::FunctionCall(func) => {
            for arg in &func.arguments {
                walk_columns(arg, columns);
            }
        }
        AstNode::TableRef(_) | AstNode::Literal(_) | AstNode::Schema(_) | AstNode::Transaction(_) => {
        }
    }
}
