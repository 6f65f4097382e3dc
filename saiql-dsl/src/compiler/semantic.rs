//! Semantic analysis - first compilation phase
//!
//! Walks the AST populating a scoped symbol table and validating:
//! referenced function symbols exist in the legend (when one is loaded),
//! identifiers are well-formed (every dotted segment non-empty and valid),
//! and binary-operation operand types are compatible. Produces an
//! (errors, warnings) pair; any error prevents compilation.

use super::symbols::{Symbol, SymbolKind, SymbolTable};
use crate::parser::ast::*;
use saiql_core::Legend;

/// Outcome of a semantic analysis run.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub symbols: SymbolTable,
}

impl Analysis {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct SemanticAnalyzer<'a> {
    legend: Option<&'a Legend>,
    symbols: SymbolTable,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl<'a> SemanticAnalyzer<'a> {
    pub fn new(legend: Option<&'a Legend>) -> Self {
        let mut symbols = SymbolTable::new();
        for builtin in ["string", "integer", "decimal", "boolean", "date", "timestamp"] {
            symbols.define(Symbol::new(builtin, SymbolKind::Type, builtin, "builtin"));
        }
        Self {
            legend,
            symbols,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Analyze the AST, consuming the analyzer.
    pub fn analyze(mut self, ast: &AstNode) -> Analysis {
        self.visit(ast);
        Analysis {
            errors: self.errors,
            warnings: self.warnings,
            symbols: self.symbols,
        }
    }

    fn visit(&mut self, node: &AstNode) {
        match node {
            AstNode::Query(query) => self.visit_query(query),
            AstNode::FunctionCall(func) => self.visit_function_call(func),
            AstNode::BinaryOp(op) => self.visit_binary_op(op),
            AstNode::Container(container) => {
                // Table definitions are query-global; containers do not
                // open a scope of their own.
                for content in &container.contents {
                    self.visit(content);
                }
                if let Some(columns) = &container.columns {
                    self.visit_column_list(columns);
                }
            }
            AstNode::TableRef(table) => {
                if !is_valid_identifier(&table.table_name) {
                    self.errors
                        .push(format!("invalid table name: {}", table.table_name));
                }
                self.symbols.define(Symbol::new(
                    table.table_name.clone(),
                    SymbolKind::Table,
                    "table",
                    "global",
                ));
            }
            AstNode::ColumnRef(column) => {
                if !is_valid_identifier(&column.column_name) {
                    self.errors
                        .push(format!("invalid column name: {}", column.column_name));
                }
            }
            AstNode::ColumnList(columns) => self.visit_column_list(columns),
            AstNode::Literal(_) => {}
            AstNode::Join(join) => {
                if let Some(condition) = &join.condition {
                    self.visit(condition);
                }
            }
            // Schema and transaction operations carry no analyzable body.
            AstNode::Schema(_) | AstNode::Transaction(_) => {}
        }
    }

    fn visit_query(&mut self, query: &QueryNode) {
        if let Some(operation) = &query.operation {
            self.visit(operation);
        }
        if let Some(target) = &query.target {
            self.visit(target);
        }
        for condition in &query.conditions {
            self.visit(condition);
        }
        if let Some(output) = &query.output {
            self.visit(output);
        }

        if query.query_type == QueryType::Select && query.output.is_none() {
            self.warnings
                .push("SELECT query missing output specification".to_string());
        }
    }

    fn visit_function_call(&mut self, func: &FunctionCallNode) {
        if let Some(legend) = self.legend {
            if legend.lookup(&func.name).is_none() {
                self.errors.push(format!("unknown function: {}", func.name));
            } else {
                self.symbols.define(Symbol::new(
                    func.name.clone(),
                    SymbolKind::Function,
                    "function",
                    "global",
                ));
            }
        }
        for arg in &func.arguments {
            self.visit(arg);
        }
    }

    fn visit_binary_op(&mut self, op: &BinaryOpNode) {
        self.visit(&op.left);
        self.visit(&op.right);

        let left_type = operand_type(&op.left);
        let right_type = operand_type(&op.right);

        match op.operator.as_str() {
            "=" | "==" | "===" => {
                if left_type != "unknown" && right_type != "unknown" && left_type != right_type {
                    self.warnings.push(format!(
                        "type mismatch in equality: {} {} {}",
                        left_type, op.operator, right_type
                    ));
                }
            }
            "+" | "-" | "*" | "/" => {
                for (side, ty) in [("left", left_type), ("right", right_type)] {
                    if ty != "unknown" && !is_numeric_type(ty) {
                        self.errors.push(format!(
                            "{} operand of {} must be numeric, got {}",
                            side, op.operator, ty
                        ));
                    }
                }
            }
            _ => {}
        }
    }

    fn visit_column_list(&mut self, columns: &ColumnListNode) {
        for column in &columns.columns {
            if column == "*" {
                continue;
            }
            if !is_valid_identifier(column) {
                self.errors.push(format!("invalid column name: {}", column));
            }
        }
    }
}

/// Structural operand type for the simplified checker. Columns and nested
/// expressions are `unknown` until a schema catalog exists.
fn operand_type(node: &AstNode) -> &'static str {
    match node {
        AstNode::Literal(literal) => literal.value.type_name(),
        AstNode::BinaryOp(op) => match op.meta.folded {
            Some(FoldedValue::Int(_)) => "integer",
            Some(FoldedValue::Float(_)) => "float",
            None => "unknown",
        },
        _ => "unknown",
    }
}

fn is_numeric_type(ty: &str) -> bool {
    matches!(ty, "integer" | "float" | "decimal" | "number")
}

/// Dotted identifiers are valid when every segment is non-empty, starts
/// with a letter or underscore, and continues with word characters.
pub fn is_valid_identifier(identifier: &str) -> bool {
    if identifier.is_empty() {
        return false;
    }
    identifier.split('.').all(|segment| {
        let mut chars = segment.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}
