//! Lexer token types

use saiql_core::SymbolInfo;
use std::fmt;

/// Token kinds for SAIQL.
///
/// Symbol kinds (`FunctionSymbol`, `DataType`, ...) come from the legend
/// family of the matched symbol; structural kinds come from the fixed
/// operator tables. `Identifier` is reclassified by the parser based on
/// context (table vs column position).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Legend symbol kinds
    FunctionSymbol, // *3, *COUNT, ...
    DataType,       // o, oQ, oo, ...
    ArithmeticOp,   // +, ++, ...
    AssignmentOp,   // ==, ===
    Constraint,     // !!, !1, ...
    SchemaOp,       // @1, @2, ...
    IndexOp,        // ##, #1, ...
    Transaction,    // $1, $2, $3

    // Structural elements
    NamespaceSep, // ::
    OutputOp,     // >>
    Wildcard,     // standalone *
    JoinSymbol,   // =J, =L, =R, ...
    ComparisonOp, // =, <, >

    // Containers and delimiters
    ContainerOpen,  // [
    ContainerClose, // ]
    BlockOpen,      // {
    BlockClose,     // }
    ParamOpen,      // (
    ParamClose,     // )

    // Literals and identifiers
    Identifier,     // users, name, users.id
    ColumnList,     // name,email  (comma inside one lexeme)
    StringLiteral,  // 'hello', "world"
    NumberLiteral,  // 123, 45.67, -89
    BooleanLiteral, // true, false
    NullLiteral,    // null

    // Elidable tokens
    Comment,
    Whitespace,

    Eof,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::FunctionSymbol => "FUNCTION_SYMBOL",
            TokenKind::DataType => "DATA_TYPE",
            TokenKind::ArithmeticOp => "ARITHMETIC_OP",
            TokenKind::AssignmentOp => "ASSIGNMENT_OP",
            TokenKind::Constraint => "CONSTRAINT",
            TokenKind::SchemaOp => "SCHEMA_OP",
            TokenKind::IndexOp => "INDEX_OP",
            TokenKind::Transaction => "TRANSACTION",
            TokenKind::NamespaceSep => "NAMESPACE_SEP",
            TokenKind::OutputOp => "OUTPUT_OP",
            TokenKind::Wildcard => "WILDCARD",
            TokenKind::JoinSymbol => "JOIN_SYMBOL",
            TokenKind::ComparisonOp => "COMPARISON_OP",
            TokenKind::ContainerOpen => "CONTAINER_OPEN",
            TokenKind::ContainerClose => "CONTAINER_CLOSE",
            TokenKind::BlockOpen => "BLOCK_OPEN",
            TokenKind::BlockClose => "BLOCK_CLOSE",
            TokenKind::ParamOpen => "PARAM_OPEN",
            TokenKind::ParamClose => "PARAM_CLOSE",
            TokenKind::Identifier => "IDENTIFIER",
            TokenKind::ColumnList => "COLUMN_LIST",
            TokenKind::StringLiteral => "STRING_LITERAL",
            TokenKind::NumberLiteral => "NUMBER_LITERAL",
            TokenKind::BooleanLiteral => "BOOLEAN_LITERAL",
            TokenKind::NullLiteral => "NULL_LITERAL",
            TokenKind::Comment => "COMMENT",
            TokenKind::Whitespace => "WHITESPACE",
            TokenKind::Eof => "EOF",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Byte span and source location of a token or AST node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
    /// 1-based line of the first character.
    pub line: usize,
    /// 1-based column of the first character.
    pub column: usize,
}

impl Span {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A single classified token. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Exact source text of the token.
    pub lexeme: String,
    pub span: Span,
    /// Legend metadata when the token matched a legend symbol.
    pub symbol: Option<SymbolInfo>,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            span,
            symbol: None,
        }
    }

    pub fn with_symbol(mut self, symbol: SymbolInfo) -> Self {
        self.symbol = Some(symbol);
        self
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token({}, '{}', {}:{})",
            self.kind, self.lexeme, self.span.line, self.span.column
        )
    }
}
