//! Logical plan operators.
//!
//! The plan is a strict tree of operator variants; every path through it
//! terminates in the `Once` leaf. Ownership of children is exclusive,
//! and branching operators (`Optional`, `Merge`, `Cartesian`) own their
//! branch subtrees. Traversal is an exhaustive match; each operator's
//! runtime lives in its cursor (see [`cursor`]).

pub mod cursor;
pub mod planner;
pub mod pretty;

use crate::query::ast::Expr;
use crate::query::symbol::{Symbol, SymbolTable};
use crate::storage::{Direction, EdgeTypeId, LabelId, PropertyId};

pub use cursor::Cursor;
pub use planner::{plan_query, PlannerInputs};
pub use pretty::pretty_print;

/// One aggregation computed by [`LogicalOperator::Aggregate`].
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub op: crate::query::ast::AggregationOp,
    /// `None` for `count(*)`.
    pub expression: Option<Expr>,
    pub distinct: bool,
    pub output_symbol: Symbol,
}

/// Inclusive or exclusive bound of an indexed range scan.
#[derive(Debug, Clone)]
pub struct RangeBound {
    pub expression: Expr,
    pub inclusive: bool,
}

/// What a `CreateNode` or the far end of a `CreateExpand` materializes.
#[derive(Debug, Clone)]
pub struct NodeCreationInfo {
    pub symbol: Symbol,
    pub labels: Vec<LabelId>,
    pub properties: Vec<(PropertyId, Expr)>,
}

/// Edge half of a `CreateExpand`.
#[derive(Debug, Clone)]
pub struct EdgeCreationInfo {
    pub symbol: Symbol,
    pub edge_type: EdgeTypeId,
    pub properties: Vec<(PropertyId, Expr)>,
    pub direction: Direction,
}

/// Projection item evaluated by `Produce`.
#[derive(Debug, Clone)]
pub struct OutputExpression {
    pub name: String,
    pub expression: Expr,
    pub output_symbol: Symbol,
    /// Token index used to recover the original source text for headers.
    pub token_position: Option<usize>,
}

#[derive(Debug, Clone)]
pub enum LogicalOperator {
    /// Leaf that yields a single empty row.
    Once,
    ScanAll {
        input: Box<LogicalOperator>,
        output_symbol: Symbol,
    },
    ScanAllByLabel {
        input: Box<LogicalOperator>,
        output_symbol: Symbol,
        label: LabelId,
    },
    /// Equality probe into a label+property index; the expression is
    /// evaluated once per input row.
    ScanAllByLabelPropertyValue {
        input: Box<LogicalOperator>,
        output_symbol: Symbol,
        label: LabelId,
        property: PropertyId,
        expression: Expr,
    },
    /// Range scan over a label+property index; a missing or null bound
    /// leaves that side open.
    ScanAllByLabelPropertyRange {
        input: Box<LogicalOperator>,
        output_symbol: Symbol,
        label: LabelId,
        property: PropertyId,
        lower: Option<RangeBound>,
        upper: Option<RangeBound>,
    },
    Expand {
        input: Box<LogicalOperator>,
        input_symbol: Symbol,
        edge_symbol: Symbol,
        node_symbol: Symbol,
        direction: Direction,
        edge_types: Vec<EdgeTypeId>,
        /// The far node was bound before this operator; match against it
        /// instead of writing it.
        existing_node: bool,
    },
    ExpandVariable {
        input: Box<LogicalOperator>,
        input_symbol: Symbol,
        edge_symbol: Symbol,
        node_symbol: Symbol,
        direction: Direction,
        edge_types: Vec<EdgeTypeId>,
        lower: u64,
        upper: Option<u64>,
        breadth_first: bool,
        existing_node: bool,
    },
    /// Collects previously bound pattern elements into a path value.
    ConstructNamedPath {
        input: Box<LogicalOperator>,
        path_symbol: Symbol,
        elements: Vec<Symbol>,
    },
    Filter {
        input: Box<LogicalOperator>,
        expression: Expr,
    },
    /// Enforces edge distinctness within one pattern comprehension; null
    /// edges pass.
    ExpandUniquenessFilter {
        input: Box<LogicalOperator>,
        expand_symbol: Symbol,
        previous_symbols: Vec<Symbol>,
    },
    Optional {
        input: Box<LogicalOperator>,
        optional: Box<LogicalOperator>,
        optional_symbols: Vec<Symbol>,
    },
    Merge {
        input: Box<LogicalOperator>,
        merge_match: Box<LogicalOperator>,
        merge_create: Box<LogicalOperator>,
    },
    Produce {
        input: Box<LogicalOperator>,
        named_expressions: Vec<OutputExpression>,
    },
    Aggregate {
        input: Box<LogicalOperator>,
        aggregations: Vec<Aggregation>,
        group_by: Vec<Expr>,
        remember: Vec<Symbol>,
    },
    Skip {
        input: Box<LogicalOperator>,
        expression: Expr,
    },
    Limit {
        input: Box<LogicalOperator>,
        expression: Expr,
    },
    OrderBy {
        input: Box<LogicalOperator>,
        order_by: Vec<(Expr, bool)>,
        symbols: Vec<Symbol>,
    },
    Distinct {
        input: Box<LogicalOperator>,
        symbols: Vec<Symbol>,
    },
    Unwind {
        input: Box<LogicalOperator>,
        expression: Expr,
        output_symbol: Symbol,
    },
    CreateNode {
        input: Box<LogicalOperator>,
        node_info: NodeCreationInfo,
    },
    CreateExpand {
        input: Box<LogicalOperator>,
        input_symbol: Symbol,
        node_info: NodeCreationInfo,
        edge_info: EdgeCreationInfo,
        existing_node: bool,
    },
    SetProperty {
        input: Box<LogicalOperator>,
        object: Expr,
        property: PropertyId,
        expression: Expr,
    },
    SetProperties {
        input: Box<LogicalOperator>,
        input_symbol: Symbol,
        expression: Expr,
        update: bool,
    },
    SetLabels {
        input: Box<LogicalOperator>,
        input_symbol: Symbol,
        labels: Vec<LabelId>,
    },
    RemoveProperty {
        input: Box<LogicalOperator>,
        object: Expr,
        property: PropertyId,
    },
    RemoveLabels {
        input: Box<LogicalOperator>,
        input_symbol: Symbol,
        labels: Vec<LabelId>,
    },
    Delete {
        input: Box<LogicalOperator>,
        expressions: Vec<Expr>,
        detach: bool,
    },
    /// Materializes its child before later operators run; optionally
    /// advances the command counter so they observe prior writes.
    Accumulate {
        input: Box<LogicalOperator>,
        symbols: Vec<Symbol>,
        advance_command: bool,
    },
    /// Nested-loop product; the right side re-opens per left row. Left
    /// and right symbol sets must be disjoint.
    Cartesian {
        left: Box<LogicalOperator>,
        right: Box<LogicalOperator>,
        left_symbols: Vec<Symbol>,
        right_symbols: Vec<Symbol>,
    },
    /// Schema mutation leaf; runs during the first pull.
    CreateIndex { label: LabelId, property: PropertyId },
    /// Renders the plan below it instead of executing it.
    Explain {
        input: Box<LogicalOperator>,
        output_symbol: Symbol,
    },
}

impl LogicalOperator {
    /// Symbols this plan exposes to the result stream. Operators without
    /// a projection expose none, which the interpreter reads as a
    /// side-effect-only plan.
    pub fn output_symbols(&self, symbol_table: &SymbolTable) -> Vec<Symbol> {
        match self {
            LogicalOperator::Produce {
                named_expressions, ..
            } => named_expressions
                .iter()
                .map(|item| item.output_symbol.clone())
                .collect(),
            LogicalOperator::Skip { input, .. }
            | LogicalOperator::Limit { input, .. }
            | LogicalOperator::OrderBy { input, .. }
            | LogicalOperator::Distinct { input, .. }
            | LogicalOperator::Accumulate { input, .. } => input.output_symbols(symbol_table),
            LogicalOperator::Explain { output_symbol, .. } => vec![output_symbol.clone()],
            _ => Vec::new(),
        }
    }

    /// Symbols any operator in this subtree writes into the frame.
    pub fn modified_symbols(&self) -> Vec<Symbol> {
        let mut symbols = Vec::new();
        self.collect_modified(&mut symbols);
        symbols
    }

    fn collect_modified(&self, out: &mut Vec<Symbol>) {
        let mut push = |symbol: &Symbol| {
            if !out.iter().any(|s| s.position == symbol.position) {
                out.push(symbol.clone());
            }
        };
        match self {
            LogicalOperator::Once | LogicalOperator::CreateIndex { .. } => {}
            LogicalOperator::ScanAll {
                input,
                output_symbol,
            }
            | LogicalOperator::ScanAllByLabel {
                input,
                output_symbol,
                ..
            }
            | LogicalOperator::ScanAllByLabelPropertyValue {
                input,
                output_symbol,
                ..
            }
            | LogicalOperator::ScanAllByLabelPropertyRange {
                input,
                output_symbol,
                ..
            } => {
                push(output_symbol);
                input.collect_modified(out);
            }
            LogicalOperator::Expand {
                input,
                edge_symbol,
                node_symbol,
                existing_node,
                ..
            }
            | LogicalOperator::ExpandVariable {
                input,
                edge_symbol,
                node_symbol,
                existing_node,
                ..
            } => {
                push(edge_symbol);
                if !existing_node {
                    push(node_symbol);
                }
                input.collect_modified(out);
            }
            LogicalOperator::ConstructNamedPath {
                input, path_symbol, ..
            } => {
                push(path_symbol);
                input.collect_modified(out);
            }
            LogicalOperator::Filter { input, .. }
            | LogicalOperator::ExpandUniquenessFilter { input, .. }
            | LogicalOperator::Skip { input, .. }
            | LogicalOperator::Limit { input, .. }
            | LogicalOperator::OrderBy { input, .. }
            | LogicalOperator::Distinct { input, .. }
            | LogicalOperator::SetProperty { input, .. }
            | LogicalOperator::SetProperties { input, .. }
            | LogicalOperator::SetLabels { input, .. }
            | LogicalOperator::RemoveProperty { input, .. }
            | LogicalOperator::RemoveLabels { input, .. }
            | LogicalOperator::Delete { input, .. }
            | LogicalOperator::Accumulate { input, .. } => input.collect_modified(out),
            LogicalOperator::Optional {
                input, optional, ..
            } => {
                optional.collect_modified(out);
                input.collect_modified(out);
            }
            LogicalOperator::Merge {
                input,
                merge_match,
                merge_create,
            } => {
                merge_match.collect_modified(out);
                merge_create.collect_modified(out);
                input.collect_modified(out);
            }
            LogicalOperator::Produce {
                input,
                named_expressions,
            } => {
                for item in named_expressions {
                    push(&item.output_symbol);
                }
                input.collect_modified(out);
            }
            LogicalOperator::Aggregate {
                input,
                aggregations,
                remember,
                ..
            } => {
                for aggregation in aggregations {
                    push(&aggregation.output_symbol);
                }
                for symbol in remember {
                    push(symbol);
                }
                input.collect_modified(out);
            }
            LogicalOperator::Unwind {
                input,
                output_symbol,
                ..
            } => {
                push(output_symbol);
                input.collect_modified(out);
            }
            LogicalOperator::CreateNode { input, node_info } => {
                push(&node_info.symbol);
                input.collect_modified(out);
            }
            LogicalOperator::CreateExpand {
                input,
                node_info,
                edge_info,
                existing_node,
                ..
            } => {
                push(&edge_info.symbol);
                if !existing_node {
                    push(&node_info.symbol);
                }
                input.collect_modified(out);
            }
            LogicalOperator::Cartesian { left, right, .. } => {
                left.collect_modified(out);
                right.collect_modified(out);
            }
            LogicalOperator::Explain { output_symbol, .. } => push(output_symbol),
        }
    }
}
