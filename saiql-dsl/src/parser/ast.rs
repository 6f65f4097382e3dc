//! Abstract syntax tree for SAIQL queries
//!
//! The AST is a closed tagged variant; each pass is a function family over
//! an exhaustive `match`. Node ownership is strictly tree-shaped: the
//! parser constructs nodes, the optimizer is the only mutator, and every
//! later phase borrows.

use crate::lexer::Span;
use saiql_core::SymbolInfo;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Physical join algorithm recommended by the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinAlgorithm {
    NestedLoop,
    Hash,
    Merge,
}

impl JoinAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinAlgorithm::NestedLoop => "nested_loop",
            JoinAlgorithm::Hash => "hash",
            JoinAlgorithm::Merge => "merge",
        }
    }
}

/// Value computed by constant folding. The folded node keeps its binary
/// shape; this lives in [`NodeMeta`] so downstream passes can consume the
/// node as either a literal or a binary op.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FoldedValue {
    Int(i64),
    Float(f64),
}

impl fmt::Display for FoldedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FoldedValue::Int(v) => write!(f, "{}", v),
            FoldedValue::Float(v) => write!(f, "{}", v),
        }
    }
}

/// Typed, open-ended node annotations: the known optimizer fields plus a
/// free-form map for anything else.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeMeta {
    pub folded: Option<FoldedValue>,
    pub recommended_algorithm: Option<JoinAlgorithm>,
    pub extra: HashMap<String, Value>,
}

/// Query classification derived from the operation symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryType {
    Select,
    Insert,
    Update,
    Delete,
    Aggregate,
    Join,
    Schema,
    Transaction,
    Unknown,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Select => "SELECT",
            QueryType::Insert => "INSERT",
            QueryType::Update => "UPDATE",
            QueryType::Delete => "DELETE",
            QueryType::Aggregate => "AGGREGATE",
            QueryType::Join => "JOIN",
            QueryType::Schema => "SCHEMA",
            QueryType::Transaction => "TRANSACTION",
            QueryType::Unknown => "UNKNOWN",
        }
    }

    /// Pure reads; the safety policy permits these under read-only mode.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            QueryType::Select | QueryType::Join | QueryType::Aggregate | QueryType::Unknown
        )
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// SQL join kinds reachable from the `=J|=L|=R|=F|=C|=S|=N|=U` symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    FullOuter,
    Cross,
    SelfJoin,
    Natural,
    Union,
}

impl JoinKind {
    /// Map a join symbol lexeme; unknown symbols fall back to INNER.
    pub fn from_symbol(symbol: &str) -> Self {
        match symbol {
            "=J" => JoinKind::Inner,
            "=L" => JoinKind::Left,
            "=R" => JoinKind::Right,
            "=F" => JoinKind::FullOuter,
            "=C" => JoinKind::Cross,
            "=S" => JoinKind::SelfJoin,
            "=N" => JoinKind::Natural,
            "=U" => JoinKind::Union,
            _ => JoinKind::Inner,
        }
    }

    pub fn sql_keyword(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER",
            JoinKind::Left => "LEFT",
            JoinKind::Right => "RIGHT",
            JoinKind::FullOuter => "FULL OUTER",
            JoinKind::Cross => "CROSS",
            JoinKind::SelfJoin => "SELF",
            JoinKind::Natural => "NATURAL",
            JoinKind::Union => "UNION",
        }
    }
}

/// Typed literal values with an explicit null flag for three-valued logic.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl LiteralValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            LiteralValue::Str(_) => "string",
            LiteralValue::Int(_) => "integer",
            LiteralValue::Float(_) => "float",
            LiteralValue::Bool(_) => "boolean",
            LiteralValue::Null => "null",
        }
    }
}

// ============================================================================
// NODE STRUCTS
// ============================================================================

/// Root node for a SAIQL query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryNode {
    pub query_type: QueryType,
    pub operation: Option<Box<AstNode>>,
    pub target: Option<Box<AstNode>>,
    pub output: Option<Box<AstNode>>,
    /// Ordered condition expressions (WHERE / join ON).
    pub conditions: Vec<AstNode>,
    pub span: Span,
    pub meta: NodeMeta,
}

/// Function symbol operation (`*3`, `*COUNT`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCallNode {
    pub name: String,
    pub arguments: Vec<AstNode>,
    pub symbol: Option<SymbolInfo>,
    pub span: Span,
    pub meta: NodeMeta,
}

/// Binary operation. A folded node keeps this shape and exposes its value
/// through `meta.folded`.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOpNode {
    pub operator: String,
    pub left: Box<AstNode>,
    pub right: Box<AstNode>,
    pub span: Span,
    pub meta: NodeMeta,
}

/// `[table]` / `[a+b]` container. Column lists parsed after `::` attach
/// here when a container target exists.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerNode {
    pub container_type: char,
    pub contents: Vec<AstNode>,
    pub columns: Option<ColumnListNode>,
    pub span: Span,
    pub meta: NodeMeta,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRefNode {
    pub table_name: String,
    pub alias: Option<String>,
    pub span: Span,
    pub meta: NodeMeta,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRefNode {
    /// Possibly dotted (`users.id`).
    pub column_name: String,
    pub span: Span,
    pub meta: NodeMeta,
}

/// Ordered column projection, source order preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnListNode {
    pub columns: Vec<String>,
    pub span: Span,
    pub meta: NodeMeta,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiteralNode {
    pub value: LiteralValue,
    /// Explicit flag for three-valued logic handling.
    pub is_null: bool,
    pub span: Span,
    pub meta: NodeMeta,
}

/// Join operation. The joined tables live in the query target container.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinNode {
    pub join_kind: JoinKind,
    pub condition: Option<Box<AstNode>>,
    pub span: Span,
    pub meta: NodeMeta,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    pub operation: String,
    pub symbol: Option<SymbolInfo>,
    pub span: Span,
    pub meta: NodeMeta,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionNode {
    pub operation: String,
    pub symbol: Option<SymbolInfo>,
    pub span: Span,
    pub meta: NodeMeta,
}

/// Closed AST variant. Passes match exhaustively; adding a node kind is a
/// compile-time event for every pass.
#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    Query(QueryNode),
    FunctionCall(FunctionCallNode),
    BinaryOp(BinaryOpNode),
    Container(ContainerNode),
    TableRef(TableRefNode),
    ColumnRef(ColumnRefNode),
    ColumnList(ColumnListNode),
    Literal(LiteralNode),
    Join(JoinNode),
    Schema(SchemaNode),
    Transaction(TransactionNode),
}

impl AstNode {
    pub fn span(&self) -> Span {
        match self {
            AstNode::Query(n) => n.span,
            AstNode::FunctionCall(n) => n.span,
            AstNode::BinaryOp(n) => n.span,
            AstNode::Container(n) => n.span,
            AstNode::TableRef(n) => n.span,
            AstNode::ColumnRef(n) => n.span,
            AstNode::ColumnList(n) => n.span,
            AstNode::Literal(n) => n.span,
            AstNode::Join(n) => n.span,
            AstNode::Schema(n) => n.span,
            AstNode::Transaction(n) => n.span,
        }
    }

    pub fn meta(&self) -> &NodeMeta {
        match self {
            AstNode::Query(n) => &n.meta,
            AstNode::FunctionCall(n) => &n.meta,
            AstNode::BinaryOp(n) => &n.meta,
            AstNode::Container(n) => &n.meta,
            AstNode::TableRef(n) => &n.meta,
            AstNode::ColumnRef(n) => &n.meta,
            AstNode::ColumnList(n) => &n.meta,
            AstNode::Literal(n) => &n.meta,
            AstNode::Join(n) => &n.meta,
            AstNode::Schema(n) => &n.meta,
            AstNode::Transaction(n) => &n.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut NodeMeta {
        match self {
            AstNode::Query(n) => &mut n.meta,
            AstNode::FunctionCall(n) => &mut n.meta,
            AstNode::BinaryOp(n) => &mut n.meta,
            AstNode::Container(n) => &mut n.meta,
            AstNode::TableRef(n) => &mut n.meta,
            AstNode::ColumnRef(n) => &mut n.meta,
            AstNode::ColumnList(n) => &mut n.meta,
            AstNode::Literal(n) => &mut n.meta,
            AstNode::Join(n) => &mut n.meta,
            AstNode::Schema(n) => &mut n.meta,
            AstNode::Transaction(n) => &mut n.meta,
        }
    }

    /// Total node count including this node, used for complexity scoring.
    pub fn node_count(&self) -> u64 {
        let children: u64 = match self {
            AstNode::Query(n) => {
                n.operation.as_deref().map_or(0, AstNode::node_count)
                    + n.target.as_deref().map_or(0, AstNode::node_count)
                    + n.output.as_deref().map_or(0, AstNode::node_count)
                    + n.conditions.iter().map(AstNode::node_count).sum::<u64>()
            }
            AstNode::FunctionCall(n) => n.arguments.iter().map(AstNode::node_count).sum(),
            AstNode::BinaryOp(n) => n.left.node_count() + n.right.node_count(),
            AstNode::Container(n) => {
                n.contents.iter().map(AstNode::node_count).sum::<u64>()
                    + n.columns.as_ref().map_or(0, |_| 1)
            }
            AstNode::Join(n) => n.condition.as_deref().map_or(0, AstNode::node_count),
            AstNode::TableRef(_)
            | AstNode::ColumnRef(_)
            | AstNode::ColumnList(_)
            | AstNode::Literal(_)
            | AstNode::Schema(_)
            | AstNode::Transaction(_) => 0,
        };
        1 + children
    }

    /// The query root, when this node is one.
    pub fn as_query(&self) -> Option<&QueryNode> {
        match self {
            AstNode::Query(q) => Some(q),
            _ => None,
        }
    }
}
