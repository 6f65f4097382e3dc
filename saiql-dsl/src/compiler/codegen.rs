//! Code generation - third compilation phase
//!
//! Walks the optimized AST and emits a single SQL statement for the
//! target dialect. Every identifier is quoted with the dialect quote
//! character (embedded quotes doubled); string literals are single-quoted
//! with single-quote doubling; the bare wildcard `*` is never quoted.

use super::dialect::DialectConfig;
use crate::parser::ast::*;
use saiql_core::{CompileError, Dialect};

/// Closed aggregate symbol set. Unknown aggregate symbols are fatal, not
/// silently passed through.
const AGGREGATE_FUNCTIONS: &[(&str, &str)] = &[
    ("*COUNT", "COUNT"),
    ("*SUM", "SUM"),
    ("*AVG", "AVG"),
    ("*MIN", "MIN"),
    ("*MAX", "MAX"),
];

pub struct CodeGenerator {
    config: &'static DialectConfig,
}

impl CodeGenerator {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            config: DialectConfig::of(dialect),
        }
    }

    /// Emit SQL for the query, trailing semicolon ensured.
    pub fn generate(&self, ast: &AstNode) -> Result<String, CompileError> {
        let query = ast.as_query().ok_or_else(|| CompileError::CodeGeneration {
            reason: "top-level node must be a query".to_string(),
        })?;

        let sql = match query.query_type {
            QueryType::Select => self.gen_select(query)?,
            QueryType::Join => self.gen_join(query)?,
            QueryType::Aggregate => self.gen_aggregate(query)?,
            QueryType::Transaction => self.gen_transaction(query),
            other => {
                return Err(CompileError::UnsupportedQuery {
                    query_type: other.as_str().to_string(),
                })
            }
        };

        let trimmed = sql.trim();
        if trimmed.ends_with(';') {
            Ok(trimmed.to_string())
        } else {
            Ok(format!("{};", trimmed))
        }
    }

    fn gen_select(&self, query: &QueryNode) -> Result<String, CompileError> {
        let columns = self.projection(query);
        let tables = self.target_tables(query)?;

        let mut sql = format!("SELECT {} FROM {}", columns, tables.join(", "));
        if !query.conditions.is_empty() {
            let parts = query
                .conditions
                .iter()
                .map(|c| self.expression(c))
                .collect::<Result<Vec<_>, _>>()?;
            sql.push_str(&format!(" WHERE {}", parts.join(" AND ")));
        }
        Ok(sql)
    }

    fn gen_join(&self, query: &QueryNode) -> Result<String, CompileError> {
        let join = match query.operation.as_deref() {
            Some(AstNode::Join(join)) => join,
            _ => {
                return Err(CompileError::CodeGeneration {
                    reason: "join query without a join operation".to_string(),
                })
            }
        };
        let tables = self.target_tables(query)?;
        if tables.len() < 2 {
            return Err(CompileError::CodeGeneration {
                reason: format!("join requires two tables, found {}", tables.len()),
            });
        }

        // No explicit condition yields the trivial true predicate.
        let condition = match query
            .conditions
            .first()
            .or(join.condition.as_deref())
        {
            Some(node) => self.expression(node)?,
            None => "1=1".to_string(),
        };

        Ok(format!(
            "SELECT * FROM {} {} JOIN {} ON {}",
            tables[0],
            join.join_kind.sql_keyword(),
            tables[1],
            condition
        ))
    }

    fn gen_aggregate(&self, query: &QueryNode) -> Result<String, CompileError> {
        let name = match query.operation.as_deref() {
            Some(AstNode::FunctionCall(func)) => func.name.as_str(),
            _ => {
                return Err(CompileError::CodeGeneration {
                    reason: "aggregate query without a function operation".to_string(),
                })
            }
        };

        let sql_function = AGGREGATE_FUNCTIONS
            .iter()
            .find(|(symbol, _)| *symbol == name)
            .map(|(_, sql)| *sql)
            .ok_or_else(|| CompileError::UnknownAggregate {
                name: name.to_string(),
                supported: AGGREGATE_FUNCTIONS
                    .iter()
                    .map(|(symbol, _)| *symbol)
                    .collect::<Vec<_>>()
                    .join(", "),
            })?;

        let tables = self.target_tables(query)?;
        Ok(format!("SELECT {}(*) FROM {}", sql_function, tables[0]))
    }

    fn gen_transaction(&self, query: &QueryNode) -> String {
        let node = match query.operation.as_deref() {
            Some(AstNode::Transaction(t)) => Some(t),
            _ => None,
        };

        let hint = node
            .and_then(|t| t.symbol.as_ref())
            .map(|s| s.sql_hint.to_uppercase());
        match hint.as_deref() {
            Some("COMMIT") => "COMMIT".to_string(),
            Some("ROLLBACK") => "ROLLBACK".to_string(),
            Some("BEGIN") => "BEGIN TRANSACTION".to_string(),
            _ => match node.map(|t| t.operation.as_str()) {
                Some("$2") => "COMMIT".to_string(),
                Some("$3") => "ROLLBACK".to_string(),
                _ => "BEGIN TRANSACTION".to_string(),
            },
        }
    }

    /// Projection list: attached columns or `*`.
    fn projection(&self, query: &QueryNode) -> String {
        let columns = match query.target.as_deref() {
            Some(AstNode::Container(container)) => {
                container.columns.as_ref().map(|c| c.columns.as_slice())
            }
            Some(AstNode::ColumnList(list)) => Some(list.columns.as_slice()),
            _ => None,
        };

        match columns {
            Some(columns) if !columns.is_empty() => columns
                .iter()
                .map(|c| self.quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", "),
            _ => "*".to_string(),
        }
    }

    /// Quoted table names from the query target, in source order.
    fn target_tables(&self, query: &QueryNode) -> Result<Vec<String>, CompileError> {
        let mut tables = Vec::new();
        if let Some(AstNode::Container(container)) = query.target.as_deref() {
            for content in &container.contents {
                if let AstNode::TableRef(table) = content {
                    tables.push(self.quote_identifier(&table.table_name));
                }
            }
        }
        if tables.is_empty() {
            return Err(CompileError::CodeGeneration {
                reason: "query has no table target".to_string(),
            });
        }
        Ok(tables)
    }

    /// Quote an identifier for safe interpolation.
    ///
    /// - `*` stays unquoted
    /// - dotted identifiers quote each segment (`users.id` → `"users"."id"`),
    ///   and a qualified wildcard quotes only the prefix (`users.*`)
    /// - embedded quote characters are escaped by doubling
    fn quote_identifier(&self, identifier: &str) -> String {
        if identifier == "*" {
            return "*".to_string();
        }

        let quote = self.config.quote_char;
        let quote_segment = |segment: &str| -> String {
            if segment == "*" {
                return "*".to_string();
            }
            let doubled: String = format!("{}{}", quote, quote);
            let escaped = segment.replace(quote, &doubled);
            format!("{}{}{}", quote, escaped, quote)
        };

        if identifier.contains('.') {
            identifier
                .split('.')
                .map(quote_segment)
                .collect::<Vec<_>>()
                .join(".")
        } else {
            quote_segment(identifier)
        }
    }

    /// Single-quoted string literal with single-quote doubling.
    fn string_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    fn literal_sql(&self, literal: &LiteralNode) -> String {
        if literal.is_null {
            return "NULL".to_string();
        }
        match &literal.value {
            LiteralValue::Str(s) => self.string_literal(s),
            LiteralValue::Int(v) => v.to_string(),
            LiteralValue::Float(v) => v.to_string(),
            LiteralValue::Bool(v) => if *v { "TRUE" } else { "FALSE" }.to_string(),
            LiteralValue::Null => "NULL".to_string(),
        }
    }

    /// Compile a condition expression. Folded binary nodes emit their
    /// computed value; unfolded ones emit the full parenthesized form.
    fn expression(&self, node: &AstNode) -> Result<String, CompileError> {
        match node {
            AstNode::BinaryOp(op) => {
                if let Some(folded) = op.meta.folded {
                    return Ok(folded.to_string());
                }
                let left = self.expression(&op.left)?;
                let right = self.expression(&op.right)?;
                let sql_op = match op.operator.as_str() {
                    "==" | "===" => "=",
                    "!=" => "<>",
                    "&&" => "AND",
                    "||" => "OR",
                    other => other,
                };
                Ok(format!("({} {} {})", left, sql_op, right))
            }
            AstNode::ColumnRef(column) => Ok(self.quote_identifier(&column.column_name)),
            AstNode::Literal(literal) => Ok(self.literal_sql(literal)),
            other => Err(CompileError::CodeGeneration {
                reason: format!("node is not a condition expression: {:?}", other.span()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{Lexer, Span};
    use crate::parser::Parser;
    use saiql_core::Legend;

    fn generate(query: &str, dialect: Dialect) -> Result<String, CompileError> {
        let tokens = Lexer::new(Legend::core())
            .tokenize(query)
            .expect("should lex");
        let ast = Parser::parse(tokens).expect("should parse");
        CodeGenerator::new(dialect).generate(&ast)
    }

    #[test]
    fn test_select_query_sqlite() {
        let sql = generate("*3[users]::name,email>>oQ", Dialect::Sqlite).expect("should generate");
        assert_eq!(sql, r#"SELECT "name", "email" FROM "users";"#);
    }

    #[test]
    fn test_join_without_condition_emits_trivial_predicate() {
        let sql = generate("=J[users+orders]::>>oQ", Dialect::Sqlite).expect("should generate");
        assert_eq!(sql, r#"SELECT * FROM "users" INNER JOIN "orders" ON 1=1;"#);
    }

    #[test]
    fn test_join_with_condition() {
        let sql = generate("=J[users+orders]::users.id=orders.user_id>>oQ", Dialect::Sqlite)
            .expect("should generate");
        assert_eq!(
            sql,
            r#"SELECT * FROM "users" INNER JOIN "orders" ON ("users"."id" = "orders"."user_id");"#
        );
    }

    #[test]
    fn test_left_join_keyword() {
        let sql = generate("=L[users+orders]::>>oQ", Dialect::Sqlite).expect("should generate");
        assert!(sql.starts_with(r#"SELECT * FROM "users" LEFT JOIN"#));
    }

    #[test]
    fn test_count_aggregate() {
        let sql = generate("*COUNT[sales]::*>>oQ", Dialect::Sqlite).expect("should generate");
        assert_eq!(sql, r#"SELECT COUNT(*) FROM "sales";"#);
    }

    #[test]
    fn test_transaction_statements() {
        assert_eq!(generate("$1", Dialect::Sqlite).unwrap(), "BEGIN TRANSACTION;");
        assert_eq!(generate("$2", Dialect::Sqlite).unwrap(), "COMMIT;");
        assert_eq!(generate("$3", Dialect::Sqlite).unwrap(), "ROLLBACK;");
    }

    #[test]
    fn test_mysql_uses_backtick_quoting() {
        let sql = generate("*3[users]::name>>oQ", Dialect::MySql).expect("should generate");
        assert_eq!(sql, "SELECT `name` FROM `users`;");
    }

    #[test]
    fn test_embedded_quote_is_doubled() {
        let gen = CodeGenerator::new(Dialect::Sqlite);
        assert_eq!(gen.quote_identifier(r#"we"ird"#), r#""we""ird""#);

        let gen = CodeGenerator::new(Dialect::MySql);
        assert_eq!(gen.quote_identifier("we`ird"), "`we``ird`");
    }

    #[test]
    fn test_qualified_wildcard_quotes_only_prefix() {
        let gen = CodeGenerator::new(Dialect::Sqlite);
        assert_eq!(gen.quote_identifier("users.*"), r#""users".*"#);
        assert_eq!(gen.quote_identifier("*"), "*");
    }

    #[test]
    fn test_string_literal_doubling() {
        let gen = CodeGenerator::new(Dialect::Sqlite);
        assert_eq!(gen.string_literal("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn test_unknown_aggregate_is_fatal() {
        let ast = AstNode::Query(QueryNode {
            query_type: QueryType::Aggregate,
            operation: Some(Box::new(AstNode::FunctionCall(FunctionCallNode {
                name: "*MEDIAN".to_string(),
                arguments: Vec::new(),
                symbol: None,
                span: Span::default(),
                meta: NodeMeta::default(),
            }))),
            target: Some(Box::new(AstNode::Container(ContainerNode {
                container_type: '[',
                contents: vec![AstNode::TableRef(TableRefNode {
                    table_name: "sales".to_string(),
                    alias: None,
                    span: Span::default(),
                    meta: NodeMeta::default(),
                })],
                columns: None,
                span: Span::default(),
                meta: NodeMeta::default(),
            }))),
            output: None,
            conditions: Vec::new(),
            span: Span::default(),
            meta: NodeMeta::default(),
        });

        let err = CodeGenerator::new(Dialect::Sqlite).generate(&ast).unwrap_err();
        assert!(matches!(err, CompileError::UnknownAggregate { .. }));
    }

    #[test]
    fn test_update_shape_has_no_emission_rule() {
        let err = generate("*4[users]::name>>oQ", Dialect::Sqlite).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedQuery { .. }));
    }
}
