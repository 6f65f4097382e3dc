//! Parser implementation
//!
//! Recursive descent over the token stream with precedence climbing for
//! binary expressions. Grammar root:
//!
//! ```text
//! query     := operation ['[' target ']'] ['::' (wildcard | column_list) [condition]] ['>>' output]
//! operation := function_symbol | join_symbol | schema_op | transaction
//! target    := table_ref ( '+' table_ref )*
//! condition := expr (comparison expr)*
//! ```
//!
//! Parse errors are fatal for the query; no recovery is attempted.

use super::ast::*;
use crate::lexer::*;
use saiql_core::ParseError;

/// SAIQL syntax parser. One-shot: consumes a token stream, produces a
/// [`QueryNode`] root.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    /// Parse a token stream into an AST. The stream must be terminated by
    /// an EOF token (the lexer guarantees this); trailing tokens after the
    /// query production are an error.
    pub fn parse(tokens: Vec<Token>) -> Result<AstNode, ParseError> {
        if tokens.is_empty() {
            return Err(ParseError {
                message: "empty token stream".to_string(),
                lexeme: String::new(),
                line: 1,
                column: 1,
            });
        }
        let mut parser = Parser { tokens, pos: 0 };
        let query = parser.parse_query()?;

        if !parser.check(TokenKind::Eof) {
            return Err(parser.error(format!(
                "unexpected trailing token: '{}'",
                parser.current().lexeme
            )));
        }

        Ok(AstNode::Query(query))
    }

    // === Cursor helpers ===

    fn current(&self) -> &Token {
        // The stream always ends with EOF; clamp to it.
        self.tokens
            .get(self.pos)
            .unwrap_or_else(|| &self.tokens[self.tokens.len() - 1])
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn check_any(&self, kinds: &[TokenKind]) -> bool {
        kinds.contains(&self.current().kind)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if !self.check(kind) {
            return Err(self.error(format!(
                "expected {}, got {}",
                kind.as_str(),
                self.current().kind.as_str()
            )));
        }
        Ok(self.advance())
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let token = self.current();
        ParseError {
            message: message.into(),
            lexeme: token.lexeme.clone(),
            line: token.span.line,
            column: token.span.column,
        }
    }

    // === Grammar productions ===

    fn parse_query(&mut self) -> Result<QueryNode, ParseError> {
        let span = self.current().span;

        // A query must start with an operation token.
        if !self.check_any(&[
            TokenKind::FunctionSymbol,
            TokenKind::JoinSymbol,
            TokenKind::SchemaOp,
            TokenKind::Transaction,
        ]) {
            return Err(self.error("expected operation (*, =J, @, $)"));
        }
        let operation = self.parse_operation()?;

        let mut target = if self.check(TokenKind::ContainerOpen) {
            Some(Box::new(AstNode::Container(self.parse_container()?)))
        } else {
            None
        };

        let mut conditions = Vec::new();
        let mut columns_node = None;
        if self.check(TokenKind::NamespaceSep) {
            self.advance();
            columns_node = self.parse_column_segment(&mut conditions)?;
        }

        // Attach columns to a container target; a bare column list becomes
        // the target itself.
        if let Some(cols) = columns_node {
            match target.as_deref_mut() {
                Some(AstNode::Container(container)) => container.columns = Some(cols),
                Some(_) => {}
                None => target = Some(Box::new(AstNode::ColumnList(cols))),
            }
        }

        let output = if self.check(TokenKind::OutputOp) {
            self.advance();
            Some(Box::new(self.parse_output()?))
        } else {
            None
        };

        let query_type = classify_operation(&operation);

        Ok(QueryNode {
            query_type,
            operation: Some(Box::new(operation)),
            target,
            output,
            conditions,
            span,
            meta: NodeMeta::default(),
        })
    }

    fn parse_operation(&mut self) -> Result<AstNode, ParseError> {
        match self.current().kind {
            TokenKind::FunctionSymbol => {
                let token = self.advance();
                Ok(AstNode::FunctionCall(FunctionCallNode {
                    name: token.lexeme,
                    arguments: Vec::new(),
                    symbol: token.symbol,
                    span: token.span,
                    meta: NodeMeta::default(),
                }))
            }
            TokenKind::JoinSymbol => {
                let token = self.advance();
                Ok(AstNode::Join(JoinNode {
                    join_kind: JoinKind::from_symbol(&token.lexeme),
                    condition: None,
                    span: token.span,
                    meta: NodeMeta::default(),
                }))
            }
            TokenKind::SchemaOp => {
                let token = self.advance();
                Ok(AstNode::Schema(SchemaNode {
                    operation: token.lexeme,
                    symbol: token.symbol,
                    span: token.span,
                    meta: NodeMeta::default(),
                }))
            }
            TokenKind::Transaction => {
                let token = self.advance();
                Ok(AstNode::Transaction(TransactionNode {
                    operation: token.lexeme,
                    symbol: token.symbol,
                    span: token.span,
                    meta: NodeMeta::default(),
                }))
            }
            _ => Err(self.error("expected operation (function, join, schema, or transaction)")),
        }
    }

    /// `[table]` or `[table1+table2]`.
    fn parse_container(&mut self) -> Result<ContainerNode, ParseError> {
        let open = self.expect(TokenKind::ContainerOpen)?;

        let mut contents = Vec::new();
        while !self.check(TokenKind::ContainerClose) && !self.check(TokenKind::Eof) {
            match self.current().kind {
                TokenKind::Identifier => {
                    let token = self.advance();
                    contents.push(AstNode::TableRef(TableRefNode {
                        table_name: token.lexeme,
                        alias: None,
                        span: token.span,
                        meta: NodeMeta::default(),
                    }));
                }
                TokenKind::ArithmeticOp if self.current().lexeme == "+" => {
                    // Separator between joined tables.
                    self.advance();
                }
                _ => contents.push(self.parse_expression()?),
            }
        }
        self.expect(TokenKind::ContainerClose)?;

        Ok(ContainerNode {
            container_type: '[',
            contents,
            columns: None,
            span: open.span,
            meta: NodeMeta::default(),
        })
    }

    /// The segment after `::`: a wildcard or a column list, optionally
    /// followed by a condition expression.
    ///
    /// Whitespace fragments column lists - `name, email` lexes as
    /// `COLUMN_LIST("name,")` + `IDENTIFIER("email")` - so any contiguous
    /// run of identifier/comma-list tokens is coalesced into one ordered
    /// list, dropping empty segments.
    fn parse_column_segment(
        &mut self,
        conditions: &mut Vec<AstNode>,
    ) -> Result<Option<ColumnListNode>, ParseError> {
        let span = self.current().span;

        if self.check(TokenKind::Wildcard) {
            self.advance();
            return Ok(Some(ColumnListNode {
                columns: vec!["*".to_string()],
                span,
                meta: NodeMeta::default(),
            }));
        }

        let mut columns: Vec<String> = Vec::new();
        loop {
            match self.current().kind {
                TokenKind::Identifier => {
                    columns.push(self.advance().lexeme);
                }
                TokenKind::ColumnList => {
                    let lexeme = self.advance().lexeme;
                    columns.extend(
                        lexeme
                            .split(',')
                            .map(str::trim)
                            .filter(|part| !part.is_empty())
                            .map(str::to_string),
                    );
                }
                _ => break,
            }
        }

        // A comparison after the column run starts a condition whose left
        // side is the last collected identifier: `::users.id=orders.user_id`.
        if self.check_any(&[TokenKind::ComparisonOp, TokenKind::AssignmentOp]) {
            if let Some(column_name) = columns.pop() {
                let left = AstNode::ColumnRef(ColumnRefNode {
                    column_name,
                    span,
                    meta: NodeMeta::default(),
                });
                let condition = self.parse_binary_from(left, 0)?;
                conditions.push(condition);
            } else {
                return Err(self.error("condition operator without a left-hand column"));
            }
        }

        if columns.is_empty() {
            Ok(None)
        } else {
            Ok(Some(ColumnListNode {
                columns,
                span,
                meta: NodeMeta::default(),
            }))
        }
    }

    fn parse_output(&mut self) -> Result<AstNode, ParseError> {
        if self.check(TokenKind::DataType) {
            let token = self.advance();
            let mut meta = NodeMeta::default();
            if let Some(info) = &token.symbol {
                meta.extra.insert(
                    "output_type".to_string(),
                    serde_json::Value::String(info.sql_hint.clone()),
                );
            }
            return Ok(AstNode::Literal(LiteralNode {
                value: LiteralValue::Str(token.lexeme),
                is_null: false,
                span: token.span,
                meta,
            }));
        }
        self.parse_expression()
    }

    // === Expressions ===

    fn parse_expression(&mut self) -> Result<AstNode, ParseError> {
        let left = self.parse_primary()?;
        self.parse_binary_from(left, 0)
    }

    /// Precedence climbing with an already-parsed left operand.
    fn parse_binary_from(&mut self, mut left: AstNode, min_prec: u8) -> Result<AstNode, ParseError> {
        while self.check_any(&[
            TokenKind::ArithmeticOp,
            TokenKind::AssignmentOp,
            TokenKind::ComparisonOp,
        ]) {
            let prec = operator_precedence(&self.current().lexeme);
            if prec < min_prec || prec == 0 {
                break;
            }
            let op_token = self.advance();
            let right_first = self.parse_primary()?;
            let right = self.parse_binary_from(right_first, prec + 1)?;
            left = AstNode::BinaryOp(BinaryOpNode {
                operator: op_token.lexeme,
                left: Box::new(left),
                right: Box::new(right),
                span: op_token.span,
                meta: NodeMeta::default(),
            });
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<AstNode, ParseError> {
        match self.current().kind {
            TokenKind::StringLiteral => {
                let token = self.advance();
                // Strip the surrounding quotes; escapes stay raw.
                let inner = token.lexeme[1..token.lexeme.len() - 1].to_string();
                Ok(AstNode::Literal(LiteralNode {
                    value: LiteralValue::Str(inner),
                    is_null: false,
                    span: token.span,
                    meta: NodeMeta::default(),
                }))
            }
            TokenKind::NumberLiteral => {
                let token = self.advance();
                let value = if token.lexeme.contains('.') {
                    token
                        .lexeme
                        .parse::<f64>()
                        .map(LiteralValue::Float)
                        .map_err(|e| self.error(format!("invalid number literal: {}", e)))?
                } else {
                    token
                        .lexeme
                        .parse::<i64>()
                        .map(LiteralValue::Int)
                        .map_err(|e| self.error(format!("invalid number literal: {}", e)))?
                };
                Ok(AstNode::Literal(LiteralNode {
                    value,
                    is_null: false,
                    span: token.span,
                    meta: NodeMeta::default(),
                }))
            }
            TokenKind::BooleanLiteral => {
                let token = self.advance();
                Ok(AstNode::Literal(LiteralNode {
                    value: LiteralValue::Bool(token.lexeme.eq_ignore_ascii_case("true")),
                    is_null: false,
                    span: token.span,
                    meta: NodeMeta::default(),
                }))
            }
            TokenKind::NullLiteral => {
                let token = self.advance();
                Ok(AstNode::Literal(LiteralNode {
                    value: LiteralValue::Null,
                    is_null: true,
                    span: token.span,
                    meta: NodeMeta::default(),
                }))
            }
            TokenKind::Identifier => {
                let token = self.advance();
                Ok(AstNode::ColumnRef(ColumnRefNode {
                    column_name: token.lexeme,
                    span: token.span,
                    meta: NodeMeta::default(),
                }))
            }
            kind => Err(self.error(format!("unexpected token in expression: {}", kind.as_str()))),
        }
    }
}

/// Binary-operator precedence (low → high). `::` and `>>` are structural
/// separators, never infix operators.
fn operator_precedence(lexeme: &str) -> u8 {
    match lexeme {
        "=" | "==" | "===" | "<" | ">" | "<=" | ">=" | "!=" => 1,
        "+" | "++" => 2,
        _ => 0,
    }
}

/// Query classification. The matched symbol's SQL hint decides first, so a
/// legend can introduce write verbs; the `*3`/`*4`/`*COUNT` prefix rules
/// are the fallback.
fn classify_operation(operation: &AstNode) -> QueryType {
    match operation {
        AstNode::FunctionCall(func) => {
            if let Some(info) = &func.symbol {
                let hint = info.sql_hint.to_uppercase();
                match hint.as_str() {
                    "COUNT" | "SUM" | "AVG" | "MIN" | "MAX" => return QueryType::Aggregate,
                    h if h.starts_with("SELECT") => return QueryType::Select,
                    h if h.starts_with("INSERT") => return QueryType::Insert,
                    h if h.starts_with("UPDATE") => return QueryType::Update,
                    h if h.starts_with("DELETE") => return QueryType::Delete,
                    _ => {}
                }
            }
            if func.name.starts_with("*COUNT") {
                QueryType::Aggregate
            } else if func.name.starts_with("*3") {
                QueryType::Select
            } else if func.name.starts_with("*4") {
                QueryType::Update
            } else {
                QueryType::Unknown
            }
        }
        AstNode::Join(_) => QueryType::Join,
        AstNode::Schema(_) => QueryType::Schema,
        AstNode::Transaction(_) => QueryType::Transaction,
        _ => QueryType::Unknown,
    }
}
