//! Abstract syntax tree for the Cypher dialect.
//!
//! The tree is produced by the parser over stripped text and annotated
//! in place by the semantic phase: identifier, pattern, and aggregation
//! nodes carry an `Option<Symbol>` that planning and evaluation read.

use crate::query::symbol::Symbol;
use crate::query::typed_value::TypedValue;
pub use crate::storage::Direction;

#[derive(Debug, Clone)]
pub struct CypherQuery {
    pub explain: bool,
    pub single: SingleQuery,
    /// `UNION [ALL]` tails in source order.
    pub unions: Vec<UnionPart>,
}

#[derive(Debug, Clone)]
pub struct UnionPart {
    pub all: bool,
    pub single: SingleQuery,
}

#[derive(Debug, Clone)]
pub struct SingleQuery {
    pub clauses: Vec<Clause>,
}

#[derive(Debug, Clone)]
pub enum Clause {
    Match(MatchClause),
    Merge(MergeClause),
    Create(CreateClause),
    Set(Vec<SetItem>),
    Remove(Vec<RemoveItem>),
    Delete(DeleteClause),
    With(ProjectionBody),
    Return(ProjectionBody),
    Unwind(UnwindClause),
    Foreach(ForeachClause),
    CreateIndex(CreateIndexClause),
}

#[derive(Debug, Clone)]
pub struct MatchClause {
    pub optional: bool,
    pub patterns: Vec<Pattern>,
    pub where_clause: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct MergeClause {
    pub pattern: Pattern,
    pub on_match: Vec<SetItem>,
    pub on_create: Vec<SetItem>,
}

#[derive(Debug, Clone)]
pub struct CreateClause {
    pub patterns: Vec<Pattern>,
}

#[derive(Debug, Clone)]
pub struct DeleteClause {
    pub detach: bool,
    pub expressions: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub struct UnwindClause {
    pub expression: Expr,
    pub name: String,
    pub token_position: usize,
    pub symbol: Option<Symbol>,
}

#[derive(Debug, Clone)]
pub struct ForeachClause {
    pub name: String,
    pub token_position: usize,
    pub symbol: Option<Symbol>,
    pub expression: Expr,
    pub clauses: Vec<Clause>,
}

#[derive(Debug, Clone)]
pub struct CreateIndexClause {
    pub label: String,
    pub property: String,
}

/// `RETURN`/`WITH` body with its trailing modifiers.
#[derive(Debug, Clone)]
pub struct ProjectionBody {
    pub distinct: bool,
    pub items: Vec<NamedExpression>,
    pub order_by: Vec<OrderItem>,
    pub skip: Option<Expr>,
    pub limit: Option<Expr>,
    /// Only meaningful after `WITH`.
    pub where_clause: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct NamedExpression {
    /// Alias when one was given, otherwise the source slice of the
    /// expression.
    pub name: String,
    pub expression: Expr,
    /// Token index of the expression start when unaliased.
    pub token_position: Option<usize>,
    pub symbol: Option<Symbol>,
}

#[derive(Debug, Clone)]
pub struct OrderItem {
    pub expression: Expr,
    pub ascending: bool,
}

#[derive(Debug, Clone)]
pub struct Pattern {
    /// Path name for `p = (...)-[...]-(...)`.
    pub name: Option<String>,
    pub name_token_position: Option<usize>,
    pub path_symbol: Option<Symbol>,
    pub start: NodeAtom,
    pub steps: Vec<(EdgeAtom, NodeAtom)>,
}

#[derive(Debug, Clone)]
pub struct NodeAtom {
    pub name: Option<String>,
    pub token_position: Option<usize>,
    pub symbol: Option<Symbol>,
    pub labels: Vec<String>,
    pub properties: Vec<(String, Expr)>,
}

#[derive(Debug, Clone)]
pub struct EdgeAtom {
    pub name: Option<String>,
    pub token_position: Option<usize>,
    pub symbol: Option<Symbol>,
    pub direction: Direction,
    pub edge_types: Vec<String>,
    pub properties: Vec<(String, Expr)>,
    pub range: Option<EdgeRange>,
}

/// Variable-length specifier `*lo..hi`, optionally breadth-first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRange {
    pub breadth_first: bool,
    pub lower: Option<u64>,
    pub upper: Option<u64>,
}

#[derive(Debug, Clone)]
pub enum SetItem {
    /// `SET n.prop = expr`
    Property { target: Box<Expr>, value: Expr },
    /// `SET n = expr` or `SET n += expr`
    AllProperties {
        name: String,
        token_position: usize,
        symbol: Option<Symbol>,
        value: Expr,
        update: bool,
    },
    /// `SET n:Label1:Label2`
    Labels {
        name: String,
        token_position: usize,
        symbol: Option<Symbol>,
        labels: Vec<String>,
    },
}

#[derive(Debug, Clone)]
pub enum RemoveItem {
    /// `REMOVE n.prop`
    Property { target: Box<Expr> },
    /// `REMOVE n:Label1:Label2`
    Labels {
        name: String,
        token_position: usize,
        symbol: Option<Symbol>,
        labels: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    Xor,
    And,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Minus,
    Plus,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationOp {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Collect,
}

impl AggregationOp {
    pub fn name(self) -> &'static str {
        match self {
            AggregationOp::Count => "count",
            AggregationOp::Sum => "sum",
            AggregationOp::Avg => "avg",
            AggregationOp::Min => "min",
            AggregationOp::Max => "max",
            AggregationOp::Collect => "collect",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(TypedValue),
    Parameter {
        name: String,
    },
    Identifier {
        name: String,
        token_position: usize,
        symbol: Option<Symbol>,
    },
    PropertyLookup {
        expression: Box<Expr>,
        property: String,
    },
    /// `n:Label` predicate.
    LabelsTest {
        expression: Box<Expr>,
        labels: Vec<String>,
    },
    Function {
        name: String,
        args: Vec<Expr>,
    },
    Aggregation {
        op: AggregationOp,
        /// `None` for `count(*)`.
        expression: Option<Box<Expr>>,
        distinct: bool,
        symbol: Option<Symbol>,
    },
    ListLiteral(Vec<Expr>),
    MapLiteral(Vec<(String, Expr)>),
    ListComprehension {
        name: String,
        token_position: usize,
        symbol: Option<Symbol>,
        list: Box<Expr>,
        where_clause: Option<Box<Expr>>,
        output: Option<Box<Expr>>,
    },
    Unary {
        op: UnaryOp,
        expression: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    /// Whether any aggregation appears in this expression tree.
    pub fn contains_aggregation(&self) -> bool {
        match self {
            Expr::Aggregation { .. } => true,
            Expr::Literal(_) | Expr::Parameter { .. } | Expr::Identifier { .. } => false,
            Expr::PropertyLookup { expression, .. } => expression.contains_aggregation(),
            Expr::LabelsTest { expression, .. } => expression.contains_aggregation(),
            Expr::Function { args, .. } => args.iter().any(Expr::contains_aggregation),
            Expr::ListLiteral(items) => items.iter().any(Expr::contains_aggregation),
            Expr::MapLiteral(entries) => entries.iter().any(|(_, e)| e.contains_aggregation()),
            Expr::ListComprehension {
                list,
                where_clause,
                output,
                ..
            } => {
                list.contains_aggregation()
                    || where_clause.as_deref().is_some_and(Expr::contains_aggregation)
                    || output.as_deref().is_some_and(Expr::contains_aggregation)
            }
            Expr::Unary { expression, .. } => expression.contains_aggregation(),
            Expr::Binary { left, right, .. } => {
                left.contains_aggregation() || right.contains_aggregation()
            }
        }
    }
}
