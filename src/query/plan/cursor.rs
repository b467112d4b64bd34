//! Pull-based cursor implementations for every logical operator.
//!
//! Cursors are single-threaded and cooperative: a parent pulls its
//! child until the child returns `false`. Each operator variant gets
//! its own iteration state; `pull` dispatches by variant. `reset`
//! returns a cursor chain to its fresh state so branch operators can
//! re-run subtrees per input row.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{QueryError, Result};
use crate::query::ast::{AggregationOp, Expr};
use crate::query::context::ExecutionContext;
use crate::query::eval::eval;
use crate::query::frame::Frame;
use crate::query::plan::{
    Aggregation, EdgeCreationInfo, LogicalOperator, NodeCreationInfo, OutputExpression, RangeBound,
};
use crate::query::symbol::Symbol;
use crate::query::typed_value::{Path, TypedValue, ValueKey};
use crate::storage::{
    Direction, EdgeId, EdgeTypeId, Expansion, LabelId, PropertyId, PropertyKey, PropertyValue,
    RecordKey, VertexId,
};

impl LogicalOperator {
    pub fn make_cursor(&self) -> Cursor<'_> {
        match self {
            LogicalOperator::Once => Cursor::Once { pulled: false },
            LogicalOperator::ScanAll {
                input,
                output_symbol,
            } => Cursor::Scan(ScanCursor {
                input: Box::new(input.make_cursor()),
                output_symbol,
                kind: ScanKind::All,
                buffer: None,
                index: 0,
            }),
            LogicalOperator::ScanAllByLabel {
                input,
                output_symbol,
                label,
            } => Cursor::Scan(ScanCursor {
                input: Box::new(input.make_cursor()),
                output_symbol,
                kind: ScanKind::ByLabel(*label),
                buffer: None,
                index: 0,
            }),
            LogicalOperator::ScanAllByLabelPropertyValue {
                input,
                output_symbol,
                label,
                property,
                expression,
            } => Cursor::Scan(ScanCursor {
                input: Box::new(input.make_cursor()),
                output_symbol,
                kind: ScanKind::ByValue {
                    label: *label,
                    property: *property,
                    expression,
                },
                buffer: None,
                index: 0,
            }),
            LogicalOperator::ScanAllByLabelPropertyRange {
                input,
                output_symbol,
                label,
                property,
                lower,
                upper,
            } => Cursor::Scan(ScanCursor {
                input: Box::new(input.make_cursor()),
                output_symbol,
                kind: ScanKind::ByRange {
                    label: *label,
                    property: *property,
                    lower: lower.as_ref(),
                    upper: upper.as_ref(),
                },
                buffer: None,
                index: 0,
            }),
            LogicalOperator::Expand {
                input,
                input_symbol,
                edge_symbol,
                node_symbol,
                direction,
                edge_types,
                existing_node,
            } => Cursor::Expand(ExpandCursor {
                input: Box::new(input.make_cursor()),
                input_symbol,
                edge_symbol,
                node_symbol,
                direction: *direction,
                edge_types,
                existing_node: *existing_node,
                buffer: None,
                index: 0,
            }),
            LogicalOperator::ExpandVariable {
                input,
                input_symbol,
                edge_symbol,
                node_symbol,
                direction,
                edge_types,
                lower,
                upper,
                breadth_first,
                existing_node,
            } => Cursor::ExpandVariable(ExpandVariableCursor {
                input: Box::new(input.make_cursor()),
                input_symbol,
                edge_symbol,
                node_symbol,
                direction: *direction,
                edge_types,
                lower: *lower,
                upper: *upper,
                breadth_first: *breadth_first,
                existing_node: *existing_node,
                buffer: None,
                index: 0,
            }),
            LogicalOperator::ConstructNamedPath {
                input,
                path_symbol,
                elements,
            } => Cursor::ConstructNamedPath {
                input: Box::new(input.make_cursor()),
                path_symbol,
                elements,
            },
            LogicalOperator::Filter { input, expression } => Cursor::Filter {
                input: Box::new(input.make_cursor()),
                expression,
            },
            LogicalOperator::ExpandUniquenessFilter {
                input,
                expand_symbol,
                previous_symbols,
            } => Cursor::ExpandUniquenessFilter {
                input: Box::new(input.make_cursor()),
                expand_symbol,
                previous_symbols,
            },
            LogicalOperator::Optional {
                input,
                optional,
                optional_symbols,
            } => Cursor::Optional(OptionalCursor {
                input: Box::new(input.make_cursor()),
                branch: Box::new(optional.make_cursor()),
                optional_symbols,
                active: false,
                yielded: false,
            }),
            LogicalOperator::Merge {
                input,
                merge_match,
                merge_create,
            } => Cursor::Merge(MergeCursor {
                input: Box::new(input.make_cursor()),
                match_cursor: Box::new(merge_match.make_cursor()),
                create_cursor: Box::new(merge_create.make_cursor()),
                active: false,
                creating: false,
                matched: false,
            }),
            LogicalOperator::Produce {
                input,
                named_expressions,
            } => Cursor::Produce {
                input: Box::new(input.make_cursor()),
                named_expressions,
            },
            LogicalOperator::Aggregate {
                input,
                aggregations,
                group_by,
                remember,
            } => Cursor::Aggregate(AggregateCursor {
                input: Box::new(input.make_cursor()),
                aggregations,
                group_by,
                remember,
                output: None,
                index: 0,
            }),
            LogicalOperator::Skip { input, expression } => Cursor::Skip {
                input: Box::new(input.make_cursor()),
                expression,
                to_skip: None,
            },
            LogicalOperator::Limit { input, expression } => Cursor::Limit {
                input: Box::new(input.make_cursor()),
                expression,
                remaining: None,
            },
            LogicalOperator::OrderBy {
                input, order_by, ..
            } => Cursor::OrderBy(OrderByCursor {
                input: Box::new(input.make_cursor()),
                order_by,
                sorted: None,
                index: 0,
            }),
            LogicalOperator::Distinct { input, symbols } => Cursor::Distinct {
                input: Box::new(input.make_cursor()),
                symbols,
                seen: HashSet::new(),
            },
            LogicalOperator::Unwind {
                input,
                expression,
                output_symbol,
            } => Cursor::Unwind {
                input: Box::new(input.make_cursor()),
                expression,
                output_symbol,
                buffer: Vec::new(),
                index: 0,
            },
            LogicalOperator::CreateNode { input, node_info } => Cursor::CreateNode {
                input: Box::new(input.make_cursor()),
                node_info,
            },
            LogicalOperator::CreateExpand {
                input,
                input_symbol,
                node_info,
                edge_info,
                existing_node,
            } => Cursor::CreateExpand {
                input: Box::new(input.make_cursor()),
                input_symbol,
                node_info,
                edge_info,
                existing_node: *existing_node,
            },
            LogicalOperator::SetProperty {
                input,
                object,
                property,
                expression,
            } => Cursor::SetProperty {
                input: Box::new(input.make_cursor()),
                object,
                property: *property,
                expression,
            },
            LogicalOperator::SetProperties {
                input,
                input_symbol,
                expression,
                update,
            } => Cursor::SetProperties {
                input: Box::new(input.make_cursor()),
                input_symbol,
                expression,
                update: *update,
            },
            LogicalOperator::SetLabels {
                input,
                input_symbol,
                labels,
            } => Cursor::SetLabels {
                input: Box::new(input.make_cursor()),
                input_symbol,
                labels,
            },
            LogicalOperator::RemoveProperty {
                input,
                object,
                property,
            } => Cursor::RemoveProperty {
                input: Box::new(input.make_cursor()),
                object,
                property: *property,
            },
            LogicalOperator::RemoveLabels {
                input,
                input_symbol,
                labels,
            } => Cursor::RemoveLabels {
                input: Box::new(input.make_cursor()),
                input_symbol,
                labels,
            },
            LogicalOperator::Delete {
                input,
                expressions,
                detach,
            } => Cursor::Delete {
                input: Box::new(input.make_cursor()),
                expressions,
                detach: *detach,
            },
            LogicalOperator::Accumulate {
                input,
                symbols,
                advance_command,
            } => Cursor::Accumulate(AccumulateCursor {
                input: Box::new(input.make_cursor()),
                symbols,
                advance_command: *advance_command,
                rows: None,
                index: 0,
            }),
            LogicalOperator::Cartesian { left, right, .. } => Cursor::Cartesian {
                left: Box::new(left.make_cursor()),
                right: Box::new(right.make_cursor()),
                left_active: false,
            },
            LogicalOperator::CreateIndex { label, property } => Cursor::CreateIndex {
                label: *label,
                property: *property,
                done: false,
            },
            LogicalOperator::Explain {
                input,
                output_symbol,
            } => Cursor::Explain {
                plan: input,
                output_symbol,
                lines: None,
                index: 0,
            },
        }
    }
}

pub enum Cursor<'p> {
    Once {
        pulled: bool,
    },
    Scan(ScanCursor<'p>),
    Expand(ExpandCursor<'p>),
    ExpandVariable(ExpandVariableCursor<'p>),
    ConstructNamedPath {
        input: Box<Cursor<'p>>,
        path_symbol: &'p Symbol,
        elements: &'p [Symbol],
    },
    Filter {
        input: Box<Cursor<'p>>,
        expression: &'p Expr,
    },
    ExpandUniquenessFilter {
        input: Box<Cursor<'p>>,
        expand_symbol: &'p Symbol,
        previous_symbols: &'p [Symbol],
    },
    Optional(OptionalCursor<'p>),
    Merge(MergeCursor<'p>),
    Produce {
        input: Box<Cursor<'p>>,
        named_expressions: &'p [OutputExpression],
    },
    Aggregate(AggregateCursor<'p>),
    Skip {
        input: Box<Cursor<'p>>,
        expression: &'p Expr,
        to_skip: Option<i64>,
    },
    Limit {
        input: Box<Cursor<'p>>,
        expression: &'p Expr,
        remaining: Option<i64>,
    },
    OrderBy(OrderByCursor<'p>),
    Distinct {
        input: Box<Cursor<'p>>,
        symbols: &'p [Symbol],
        seen: HashSet<Vec<ValueKey>>,
    },
    Unwind {
        input: Box<Cursor<'p>>,
        expression: &'p Expr,
        output_symbol: &'p Symbol,
        buffer: Vec<TypedValue>,
        index: usize,
    },
    CreateNode {
        input: Box<Cursor<'p>>,
        node_info: &'p NodeCreationInfo,
    },
    CreateExpand {
        input: Box<Cursor<'p>>,
        input_symbol: &'p Symbol,
        node_info: &'p NodeCreationInfo,
        edge_info: &'p EdgeCreationInfo,
        existing_node: bool,
    },
    SetProperty {
        input: Box<Cursor<'p>>,
        object: &'p Expr,
        property: PropertyId,
        expression: &'p Expr,
    },
    SetProperties {
        input: Box<Cursor<'p>>,
        input_symbol: &'p Symbol,
        expression: &'p Expr,
        update: bool,
    },
    SetLabels {
        input: Box<Cursor<'p>>,
        input_symbol: &'p Symbol,
        labels: &'p [LabelId],
    },
    RemoveProperty {
        input: Box<Cursor<'p>>,
        object: &'p Expr,
        property: PropertyId,
    },
    RemoveLabels {
        input: Box<Cursor<'p>>,
        input_symbol: &'p Symbol,
        labels: &'p [LabelId],
    },
    Delete {
        input: Box<Cursor<'p>>,
        expressions: &'p [Expr],
        detach: bool,
    },
    Accumulate(AccumulateCursor<'p>),
    Cartesian {
        left: Box<Cursor<'p>>,
        right: Box<Cursor<'p>>,
        left_active: bool,
    },
    CreateIndex {
        label: LabelId,
        property: PropertyId,
        done: bool,
    },
    Explain {
        plan: &'p LogicalOperator,
        output_symbol: &'p Symbol,
        lines: Option<Vec<String>>,
        index: usize,
    },
}

impl<'p> Cursor<'p> {
    /// Produces the next row into `frame`. Returns `false` when
    /// exhausted; repeated pulls after exhaustion stay `false`.
    pub fn pull(&mut self, frame: &mut Frame, ctx: &ExecutionContext) -> Result<bool> {
        match self {
            Cursor::Once { pulled } => {
                if *pulled {
                    Ok(false)
                } else {
                    *pulled = true;
                    Ok(true)
                }
            }
            Cursor::Scan(cursor) => cursor.pull(frame, ctx),
            Cursor::Expand(cursor) => cursor.pull(frame, ctx),
            Cursor::ExpandVariable(cursor) => cursor.pull(frame, ctx),
            Cursor::ConstructNamedPath {
                input,
                path_symbol,
                elements,
            } => {
                if !input.pull(frame, ctx)? {
                    return Ok(false);
                }
                let path = build_path(frame, elements, ctx)?;
                frame[*path_symbol] = path;
                Ok(true)
            }
            Cursor::Filter { input, expression } => loop {
                if !input.pull(frame, ctx)? {
                    return Ok(false);
                }
                match eval(expression, frame, ctx)? {
                    TypedValue::Bool(true) => return Ok(true),
                    TypedValue::Bool(false) | TypedValue::Null => continue,
                    other => {
                        return Err(QueryError::runtime(format!(
                            "predicate evaluated to a {}",
                            other.type_name()
                        )))
                    }
                }
            },
            Cursor::ExpandUniquenessFilter {
                input,
                expand_symbol,
                previous_symbols,
            } => loop {
                if !input.pull(frame, ctx)? {
                    return Ok(false);
                }
                let current = &frame[*expand_symbol];
                if current.is_null() {
                    return Ok(true);
                }
                let collides = previous_symbols
                    .iter()
                    .any(|symbol| uniqueness_collides(current, &frame[symbol]));
                if !collides {
                    return Ok(true);
                }
            },
            Cursor::Optional(cursor) => cursor.pull(frame, ctx),
            Cursor::Merge(cursor) => cursor.pull(frame, ctx),
            Cursor::Produce {
                input,
                named_expressions,
            } => {
                if !input.pull(frame, ctx)? {
                    return Ok(false);
                }
                for item in named_expressions.iter() {
                    let value = eval(&item.expression, frame, ctx)?;
                    frame[&item.output_symbol] = value;
                }
                Ok(true)
            }
            Cursor::Aggregate(cursor) => cursor.pull(frame, ctx),
            Cursor::Skip {
                input,
                expression,
                to_skip,
            } => {
                if to_skip.is_none() {
                    *to_skip = Some(eval_count(expression, frame, ctx, "SKIP")?);
                }
                loop {
                    if !input.pull(frame, ctx)? {
                        return Ok(false);
                    }
                    match to_skip {
                        Some(n) if *n > 0 => *n -= 1,
                        _ => return Ok(true),
                    }
                }
            }
            Cursor::Limit {
                input,
                expression,
                remaining,
            } => {
                if remaining.is_none() {
                    *remaining = Some(eval_count(expression, frame, ctx, "LIMIT")?);
                }
                match remaining {
                    Some(n) if *n > 0 => {
                        if input.pull(frame, ctx)? {
                            *n -= 1;
                            Ok(true)
                        } else {
                            *n = 0;
                            Ok(false)
                        }
                    }
                    _ => Ok(false),
                }
            }
            Cursor::OrderBy(cursor) => cursor.pull(frame, ctx),
            Cursor::Distinct {
                input,
                symbols,
                seen,
            } => loop {
                if !input.pull(frame, ctx)? {
                    return Ok(false);
                }
                let key: Vec<ValueKey> = symbols
                    .iter()
                    .map(|symbol| ValueKey(frame[symbol].clone()))
                    .collect();
                if seen.insert(key) {
                    return Ok(true);
                }
            },
            Cursor::Unwind {
                input,
                expression,
                output_symbol,
                buffer,
                index,
            } => loop {
                if *index < buffer.len() {
                    frame[*output_symbol] = buffer[*index].clone();
                    *index += 1;
                    return Ok(true);
                }
                if !input.pull(frame, ctx)? {
                    return Ok(false);
                }
                match eval(expression, frame, ctx)? {
                    TypedValue::Null => continue,
                    TypedValue::List(items) => {
                        *buffer = items;
                        *index = 0;
                    }
                    other => {
                        return Err(QueryError::runtime(format!(
                            "UNWIND expects a list, got a {}",
                            other.type_name()
                        )))
                    }
                }
            },
            Cursor::CreateNode { input, node_info } => {
                if !input.pull(frame, ctx)? {
                    return Ok(false);
                }
                let vertex = create_node(node_info, frame, ctx)?;
                frame[&node_info.symbol] = TypedValue::Vertex(vertex);
                Ok(true)
            }
            Cursor::CreateExpand {
                input,
                input_symbol,
                node_info,
                edge_info,
                existing_node,
            } => {
                if !input.pull(frame, ctx)? {
                    return Ok(false);
                }
                let from = expect_vertex(&frame[*input_symbol], "create an edge from")?;
                let to = if *existing_node {
                    expect_vertex(&frame[&node_info.symbol], "create an edge to")?
                } else {
                    let vertex = create_node(node_info, frame, ctx)?;
                    frame[&node_info.symbol] = TypedValue::Vertex(vertex);
                    vertex
                };
                let mut properties = std::collections::BTreeMap::new();
                for (property, expression) in &edge_info.properties {
                    let value = eval(expression, frame, ctx)?;
                    if !value.is_null() {
                        properties.insert(*property, PropertyValue::try_from(value)?);
                    }
                }
                let (source, target) = match edge_info.direction {
                    Direction::In => (to, from),
                    _ => (from, to),
                };
                let edge = ctx
                    .accessor
                    .create_edge(source, target, edge_info.edge_type, properties)?;
                frame[&edge_info.symbol] = TypedValue::Edge(edge);
                Ok(true)
            }
            Cursor::SetProperty {
                input,
                object,
                property,
                expression,
            } => {
                if !input.pull(frame, ctx)? {
                    return Ok(false);
                }
                if let Some(key) = record_key(&eval(object, frame, ctx)?, "SET")? {
                    let value = eval(expression, frame, ctx)?;
                    let value = if value.is_null() {
                        None
                    } else {
                        Some(PropertyValue::try_from(value)?)
                    };
                    ctx.accessor.set_property(key, *property, value)?;
                }
                Ok(true)
            }
            Cursor::SetProperties {
                input,
                input_symbol,
                expression,
                update,
            } => {
                if !input.pull(frame, ctx)? {
                    return Ok(false);
                }
                set_all_properties(frame, ctx, input_symbol, expression, *update)?;
                Ok(true)
            }
            Cursor::SetLabels {
                input,
                input_symbol,
                labels,
            } => {
                if !input.pull(frame, ctx)? {
                    return Ok(false);
                }
                match &frame[*input_symbol] {
                    TypedValue::Null => {}
                    TypedValue::Vertex(id) => ctx.accessor.add_labels(*id, labels)?,
                    other => {
                        return Err(QueryError::runtime(format!(
                            "cannot set labels on a {}",
                            other.type_name()
                        )))
                    }
                }
                Ok(true)
            }
            Cursor::RemoveProperty {
                input,
                object,
                property,
            } => {
                if !input.pull(frame, ctx)? {
                    return Ok(false);
                }
                if let Some(key) = record_key(&eval(object, frame, ctx)?, "REMOVE")? {
                    ctx.accessor.set_property(key, *property, None)?;
                }
                Ok(true)
            }
            Cursor::RemoveLabels {
                input,
                input_symbol,
                labels,
            } => {
                if !input.pull(frame, ctx)? {
                    return Ok(false);
                }
                match &frame[*input_symbol] {
                    TypedValue::Null => {}
                    TypedValue::Vertex(id) => ctx.accessor.remove_labels(*id, labels)?,
                    other => {
                        return Err(QueryError::runtime(format!(
                            "cannot remove labels from a {}",
                            other.type_name()
                        )))
                    }
                }
                Ok(true)
            }
            Cursor::Delete {
                input,
                expressions,
                detach,
            } => {
                if !input.pull(frame, ctx)? {
                    return Ok(false);
                }
                for expression in expressions.iter() {
                    match eval(expression, frame, ctx)? {
                        TypedValue::Null => {}
                        TypedValue::Vertex(id) => ctx.accessor.delete_vertex(id, *detach)?,
                        TypedValue::Edge(id) => ctx.accessor.delete_edge(id)?,
                        other => {
                            return Err(QueryError::runtime(format!(
                                "DELETE expects vertices and edges, got a {}",
                                other.type_name()
                            )))
                        }
                    }
                }
                Ok(true)
            }
            Cursor::Accumulate(cursor) => cursor.pull(frame, ctx),
            Cursor::Cartesian {
                left,
                right,
                left_active,
            } => loop {
                if !*left_active {
                    if !left.pull(frame, ctx)? {
                        return Ok(false);
                    }
                    *left_active = true;
                    right.reset();
                }
                if right.pull(frame, ctx)? {
                    return Ok(true);
                }
                *left_active = false;
            },
            Cursor::CreateIndex {
                label,
                property,
                done,
            } => {
                if *done {
                    return Ok(false);
                }
                *done = true;
                if ctx.in_explicit_transaction {
                    return Err(QueryError::runtime(
                        "index creation is not allowed in explicit transactions",
                    ));
                }
                ctx.accessor.build_index(*label, *property);
                ctx.is_index_created.set(true);
                Ok(false)
            }
            Cursor::Explain {
                plan,
                output_symbol,
                lines,
                index,
            } => {
                if lines.is_none() {
                    *lines = Some(
                        super::pretty::pretty_print(plan, ctx.accessor)
                            .lines()
                            .map(str::to_owned)
                            .collect(),
                    );
                    *index = 0;
                }
                let rendered = lines.as_ref().map(|l| l.as_slice()).unwrap_or_default();
                if *index < rendered.len() {
                    frame[*output_symbol] = TypedValue::String(rendered[*index].clone());
                    *index += 1;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Returns the cursor chain to its fresh state.
    pub fn reset(&mut self) {
        match self {
            Cursor::Once { pulled } => *pulled = false,
            Cursor::Scan(cursor) => {
                cursor.input.reset();
                cursor.buffer = None;
                cursor.index = 0;
            }
            Cursor::Expand(cursor) => {
                cursor.input.reset();
                cursor.buffer = None;
                cursor.index = 0;
            }
            Cursor::ExpandVariable(cursor) => {
                cursor.input.reset();
                cursor.buffer = None;
                cursor.index = 0;
            }
            Cursor::ConstructNamedPath { input, .. } => input.reset(),
            Cursor::Filter { input, .. } => input.reset(),
            Cursor::ExpandUniquenessFilter { input, .. } => input.reset(),
            Cursor::Optional(cursor) => {
                cursor.input.reset();
                cursor.branch.reset();
                cursor.active = false;
                cursor.yielded = false;
            }
            Cursor::Merge(cursor) => {
                cursor.input.reset();
                cursor.match_cursor.reset();
                cursor.create_cursor.reset();
                cursor.active = false;
                cursor.creating = false;
                cursor.matched = false;
            }
            Cursor::Produce { input, .. } => input.reset(),
            Cursor::Aggregate(cursor) => {
                cursor.input.reset();
                cursor.output = None;
                cursor.index = 0;
            }
            Cursor::Skip { input, to_skip, .. } => {
                input.reset();
                *to_skip = None;
            }
            Cursor::Limit {
                input, remaining, ..
            } => {
                input.reset();
                *remaining = None;
            }
            Cursor::OrderBy(cursor) => {
                cursor.input.reset();
                cursor.sorted = None;
                cursor.index = 0;
            }
            Cursor::Distinct { input, seen, .. } => {
                input.reset();
                seen.clear();
            }
            Cursor::Unwind {
                input,
                buffer,
                index,
                ..
            } => {
                input.reset();
                buffer.clear();
                *index = 0;
            }
            Cursor::CreateNode { input, .. } => input.reset(),
            Cursor::CreateExpand { input, .. } => input.reset(),
            Cursor::SetProperty { input, .. } => input.reset(),
            Cursor::SetProperties { input, .. } => input.reset(),
            Cursor::SetLabels { input, .. } => input.reset(),
            Cursor::RemoveProperty { input, .. } => input.reset(),
            Cursor::RemoveLabels { input, .. } => input.reset(),
            Cursor::Delete { input, .. } => input.reset(),
            Cursor::Accumulate(cursor) => {
                cursor.input.reset();
                cursor.rows = None;
                cursor.index = 0;
            }
            Cursor::Cartesian {
                left,
                right,
                left_active,
            } => {
                left.reset();
                right.reset();
                *left_active = false;
            }
            Cursor::CreateIndex { done, .. } => *done = false,
            Cursor::Explain { lines, index, .. } => {
                *lines = None;
                *index = 0;
            }
        }
    }
}

// ---- scans ----------------------------------------------------------

enum ScanKind<'p> {
    All,
    ByLabel(LabelId),
    ByValue {
        label: LabelId,
        property: PropertyId,
        expression: &'p Expr,
    },
    ByRange {
        label: LabelId,
        property: PropertyId,
        lower: Option<&'p RangeBound>,
        upper: Option<&'p RangeBound>,
    },
}

pub struct ScanCursor<'p> {
    input: Box<Cursor<'p>>,
    output_symbol: &'p Symbol,
    kind: ScanKind<'p>,
    buffer: Option<Vec<VertexId>>,
    index: usize,
}

impl<'p> ScanCursor<'p> {
    fn pull(&mut self, frame: &mut Frame, ctx: &ExecutionContext) -> Result<bool> {
        loop {
            if let Some(buffer) = &self.buffer {
                if self.index < buffer.len() {
                    frame[self.output_symbol] = TypedValue::Vertex(buffer[self.index]);
                    self.index += 1;
                    return Ok(true);
                }
            }
            if !self.input.pull(frame, ctx)? {
                return Ok(false);
            }
            self.buffer = Some(self.fetch(frame, ctx)?);
            self.index = 0;
        }
    }

    fn fetch(&self, frame: &mut Frame, ctx: &ExecutionContext) -> Result<Vec<VertexId>> {
        match &self.kind {
            ScanKind::All => Ok(ctx.accessor.vertices(None)),
            ScanKind::ByLabel(label) => Ok(ctx.accessor.vertices(Some(*label))),
            ScanKind::ByValue {
                label,
                property,
                expression,
            } => {
                let value = eval(expression, frame, ctx)?;
                if value.is_null() {
                    return Ok(Vec::new());
                }
                let key = PropertyKey(PropertyValue::try_from(value)?);
                Ok(ctx.accessor.index_lookup_value(*label, *property, &key))
            }
            ScanKind::ByRange {
                label,
                property,
                lower,
                upper,
            } => {
                let lower = eval_bound(lower.as_deref(), frame, ctx)?;
                let upper = eval_bound(upper.as_deref(), frame, ctx)?;
                Ok(ctx
                    .accessor
                    .index_lookup_range(*label, *property, lower, upper))
            }
        }
    }
}

fn eval_bound(
    bound: Option<&RangeBound>,
    frame: &mut Frame,
    ctx: &ExecutionContext,
) -> Result<std::ops::Bound<PropertyKey>> {
    use std::ops::Bound;
    let Some(bound) = bound else {
        return Ok(Bound::Unbounded);
    };
    let value = eval(&bound.expression, frame, ctx)?;
    // A null bound leaves that side of the range open.
    if value.is_null() {
        return Ok(Bound::Unbounded);
    }
    let key = PropertyKey(PropertyValue::try_from(value)?);
    Ok(if bound.inclusive {
        Bound::Included(key)
    } else {
        Bound::Excluded(key)
    })
}

// ---- expansions -----------------------------------------------------

pub struct ExpandCursor<'p> {
    input: Box<Cursor<'p>>,
    input_symbol: &'p Symbol,
    edge_symbol: &'p Symbol,
    node_symbol: &'p Symbol,
    direction: Direction,
    edge_types: &'p [EdgeTypeId],
    existing_node: bool,
    buffer: Option<Vec<Expansion>>,
    index: usize,
}

impl<'p> ExpandCursor<'p> {
    fn pull(&mut self, frame: &mut Frame, ctx: &ExecutionContext) -> Result<bool> {
        loop {
            if let Some(buffer) = &self.buffer {
                while self.index < buffer.len() {
                    let expansion = buffer[self.index];
                    self.index += 1;
                    if self.existing_node {
                        let same = TypedValue::Vertex(expansion.other)
                            .tri_eq(&frame[self.node_symbol]);
                        if !matches!(same, TypedValue::Bool(true)) {
                            continue;
                        }
                    } else {
                        frame[self.node_symbol] = TypedValue::Vertex(expansion.other);
                    }
                    frame[self.edge_symbol] = TypedValue::Edge(expansion.edge);
                    return Ok(true);
                }
            }
            if !self.input.pull(frame, ctx)? {
                return Ok(false);
            }
            match &frame[self.input_symbol] {
                // A null input comes from a failed optional; propagate
                // one null row without touching the graph.
                TypedValue::Null => {
                    self.buffer = None;
                    frame[self.edge_symbol] = TypedValue::Null;
                    if !self.existing_node {
                        frame[self.node_symbol] = TypedValue::Null;
                    }
                    return Ok(true);
                }
                TypedValue::Vertex(id) => {
                    self.buffer =
                        Some(ctx.accessor.expansions(*id, self.direction, self.edge_types));
                    self.index = 0;
                }
                other => {
                    return Err(QueryError::runtime(format!(
                        "cannot expand from a {}",
                        other.type_name()
                    )))
                }
            }
        }
    }
}

pub struct ExpandVariableCursor<'p> {
    input: Box<Cursor<'p>>,
    input_symbol: &'p Symbol,
    edge_symbol: &'p Symbol,
    node_symbol: &'p Symbol,
    direction: Direction,
    edge_types: &'p [EdgeTypeId],
    lower: u64,
    upper: Option<u64>,
    breadth_first: bool,
    existing_node: bool,
    /// `None` until an input row arrives; one entry per candidate path.
    buffer: Option<Vec<(Vec<EdgeId>, VertexId)>>,
    index: usize,
}

impl<'p> ExpandVariableCursor<'p> {
    fn pull(&mut self, frame: &mut Frame, ctx: &ExecutionContext) -> Result<bool> {
        loop {
            if let Some(buffer) = &self.buffer {
                while self.index < buffer.len() {
                    let (edges, end) = &buffer[self.index];
                    self.index += 1;
                    if self.existing_node {
                        let same = TypedValue::Vertex(*end).tri_eq(&frame[self.node_symbol]);
                        if !matches!(same, TypedValue::Bool(true)) {
                            continue;
                        }
                    } else {
                        frame[self.node_symbol] = TypedValue::Vertex(*end);
                    }
                    frame[self.edge_symbol] =
                        TypedValue::List(edges.iter().map(|&e| TypedValue::Edge(e)).collect());
                    return Ok(true);
                }
            }
            if !self.input.pull(frame, ctx)? {
                return Ok(false);
            }
            ctx.check_abort()?;
            match &frame[self.input_symbol] {
                TypedValue::Null => {
                    self.buffer = None;
                    frame[self.edge_symbol] = TypedValue::Null;
                    if !self.existing_node {
                        frame[self.node_symbol] = TypedValue::Null;
                    }
                    return Ok(true);
                }
                TypedValue::Vertex(id) => {
                    let upper = self.upper.unwrap_or(u64::MAX);
                    let mut buffer = Vec::new();
                    if self.breadth_first {
                        self.enumerate_bfs(*id, upper, ctx, &mut buffer);
                    } else {
                        if self.lower == 0 {
                            buffer.push((Vec::new(), *id));
                        }
                        let mut path = Vec::new();
                        self.enumerate_dfs(*id, upper, ctx, &mut path, &mut buffer);
                    }
                    self.buffer = Some(buffer);
                    self.index = 0;
                }
                other => {
                    return Err(QueryError::runtime(format!(
                        "cannot expand from a {}",
                        other.type_name()
                    )))
                }
            }
        }
    }

    /// Depth-first enumeration of simple paths (edge-distinct) with
    /// length in `[lower, upper]`, shorter prefixes first.
    fn enumerate_dfs(
        &self,
        vertex: VertexId,
        upper: u64,
        ctx: &ExecutionContext,
        path: &mut Vec<Expansion>,
        out: &mut Vec<(Vec<EdgeId>, VertexId)>,
    ) {
        if path.len() as u64 >= upper {
            return;
        }
        for expansion in ctx
            .accessor
            .expansions(vertex, self.direction, self.edge_types)
        {
            if path.iter().any(|step| step.edge == expansion.edge) {
                continue;
            }
            path.push(expansion);
            if path.len() as u64 >= self.lower {
                out.push((path.iter().map(|step| step.edge).collect(), expansion.other));
            }
            self.enumerate_dfs(expansion.other, upper, ctx, path, out);
            path.pop();
        }
    }

    /// Breadth-first search returning one shortest path per reached
    /// vertex. Ties between equal-length paths break toward the
    /// smallest edge id at each step.
    fn enumerate_bfs(
        &self,
        source: VertexId,
        upper: u64,
        ctx: &ExecutionContext,
        out: &mut Vec<(Vec<EdgeId>, VertexId)>,
    ) {
        let lower = self.lower.max(1);
        let mut parents: HashMap<VertexId, (VertexId, EdgeId)> = HashMap::new();
        let mut depths: HashMap<VertexId, u64> = HashMap::new();
        depths.insert(source, 0);
        let mut queue = VecDeque::from([source]);
        while let Some(vertex) = queue.pop_front() {
            let depth = depths[&vertex];
            if depth >= upper {
                continue;
            }
            let mut expansions = ctx
                .accessor
                .expansions(vertex, self.direction, self.edge_types);
            expansions.sort_by_key(|expansion| expansion.edge);
            for expansion in expansions {
                if depths.contains_key(&expansion.other) {
                    continue;
                }
                depths.insert(expansion.other, depth + 1);
                parents.insert(expansion.other, (vertex, expansion.edge));
                queue.push_back(expansion.other);
                if depth + 1 >= lower {
                    let mut edges = Vec::new();
                    let mut current = expansion.other;
                    while let Some(&(previous, edge)) = parents.get(&current) {
                        edges.push(edge);
                        current = previous;
                    }
                    edges.reverse();
                    out.push((edges, expansion.other));
                }
            }
        }
    }
}

// ---- optional and merge ---------------------------------------------

pub struct OptionalCursor<'p> {
    input: Box<Cursor<'p>>,
    branch: Box<Cursor<'p>>,
    optional_symbols: &'p [Symbol],
    active: bool,
    yielded: bool,
}

impl<'p> OptionalCursor<'p> {
    fn pull(&mut self, frame: &mut Frame, ctx: &ExecutionContext) -> Result<bool> {
        loop {
            if !self.active {
                if !self.input.pull(frame, ctx)? {
                    return Ok(false);
                }
                self.branch.reset();
                self.active = true;
                self.yielded = false;
            }
            if self.branch.pull(frame, ctx)? {
                self.yielded = true;
                return Ok(true);
            }
            self.active = false;
            if !self.yielded {
                for symbol in self.optional_symbols {
                    frame[symbol] = TypedValue::Null;
                }
                return Ok(true);
            }
        }
    }
}

pub struct MergeCursor<'p> {
    input: Box<Cursor<'p>>,
    match_cursor: Box<Cursor<'p>>,
    create_cursor: Box<Cursor<'p>>,
    active: bool,
    creating: bool,
    matched: bool,
}

impl<'p> MergeCursor<'p> {
    fn pull(&mut self, frame: &mut Frame, ctx: &ExecutionContext) -> Result<bool> {
        loop {
            if !self.active {
                if !self.input.pull(frame, ctx)? {
                    return Ok(false);
                }
                self.match_cursor.reset();
                self.create_cursor.reset();
                self.active = true;
                self.creating = false;
                self.matched = false;
            }
            if !self.creating {
                if self.match_cursor.pull(frame, ctx)? {
                    self.matched = true;
                    return Ok(true);
                }
                if self.matched {
                    self.active = false;
                    continue;
                }
                self.creating = true;
            }
            if self.create_cursor.pull(frame, ctx)? {
                return Ok(true);
            }
            self.active = false;
        }
    }
}

// ---- aggregate, order by, accumulate --------------------------------

struct AggregateValue {
    count: i64,
    value: TypedValue,
    collected: Vec<TypedValue>,
    seen: Option<HashSet<ValueKey>>,
}

struct Group {
    remembered: Vec<TypedValue>,
    values: Vec<AggregateValue>,
}

pub struct AggregateCursor<'p> {
    input: Box<Cursor<'p>>,
    aggregations: &'p [Aggregation],
    group_by: &'p [Expr],
    remember: &'p [Symbol],
    output: Option<Vec<Group>>,
    index: usize,
}

impl<'p> AggregateCursor<'p> {
    fn pull(&mut self, frame: &mut Frame, ctx: &ExecutionContext) -> Result<bool> {
        if self.output.is_none() {
            self.output = Some(self.consume(frame, ctx)?);
            self.index = 0;
        }
        let groups = self.output.as_ref().map(|g| g.as_slice()).unwrap_or_default();
        if self.index >= groups.len() {
            return Ok(false);
        }
        let group = &groups[self.index];
        self.index += 1;
        for (symbol, value) in self.remember.iter().zip(group.remembered.iter()) {
            frame[symbol] = value.clone();
        }
        for (aggregation, value) in self.aggregations.iter().zip(group.values.iter()) {
            frame[&aggregation.output_symbol] = finalize(aggregation.op, value);
        }
        Ok(true)
    }

    fn consume(&mut self, frame: &mut Frame, ctx: &ExecutionContext) -> Result<Vec<Group>> {
        let mut order: HashMap<Vec<ValueKey>, usize> = HashMap::new();
        let mut groups: Vec<Group> = Vec::new();
        while self.input.pull(frame, ctx)? {
            ctx.check_abort()?;
            let mut key = Vec::with_capacity(self.group_by.len());
            for expression in self.group_by {
                key.push(ValueKey(eval(expression, frame, ctx)?));
            }
            let slot = match order.get(&key) {
                Some(&slot) => slot,
                None => {
                    order.insert(key, groups.len());
                    groups.push(Group {
                        remembered: self
                            .remember
                            .iter()
                            .map(|symbol| frame[symbol].clone())
                            .collect(),
                        values: self
                            .aggregations
                            .iter()
                            .map(|aggregation| AggregateValue {
                                count: 0,
                                value: TypedValue::Null,
                                collected: Vec::new(),
                                seen: aggregation.distinct.then(HashSet::new),
                            })
                            .collect(),
                    });
                    groups.len() - 1
                }
            };
            for (aggregation, state) in self.aggregations.iter().zip(&mut groups[slot].values) {
                accumulate(aggregation, state, frame, ctx)?;
            }
        }
        // No grouping and no rows still aggregates to identity values.
        if groups.is_empty() && self.group_by.is_empty() {
            groups.push(Group {
                remembered: vec![TypedValue::Null; self.remember.len()],
                values: self
                    .aggregations
                    .iter()
                    .map(|_| AggregateValue {
                        count: 0,
                        value: TypedValue::Null,
                        collected: Vec::new(),
                        seen: None,
                    })
                    .collect(),
            });
        }
        Ok(groups)
    }
}

fn accumulate(
    aggregation: &Aggregation,
    state: &mut AggregateValue,
    frame: &mut Frame,
    ctx: &ExecutionContext,
) -> Result<()> {
    let input = match &aggregation.expression {
        Some(expression) => eval(expression, frame, ctx)?,
        // count(*) counts rows.
        None => {
            state.count += 1;
            return Ok(());
        }
    };
    if aggregation.op != AggregationOp::Collect && input.is_null() {
        return Ok(());
    }
    if let Some(seen) = &mut state.seen {
        if !seen.insert(ValueKey(input.clone())) {
            return Ok(());
        }
    }
    state.count += 1;
    match aggregation.op {
        AggregationOp::Count => {}
        AggregationOp::Collect => state.collected.push(input),
        AggregationOp::Sum | AggregationOp::Avg => {
            if !matches!(input, TypedValue::Int(_) | TypedValue::Double(_)) {
                return Err(QueryError::runtime(format!(
                    "{}() expects numeric input, got a {}",
                    aggregation.op.name(),
                    input.type_name()
                )));
            }
            state.value = if state.count == 1 {
                input
            } else {
                state.value.add(&input)?
            };
        }
        AggregationOp::Min => {
            state.value = if state.count == 1 {
                input
            } else {
                match state.value.tri_cmp(&input) {
                    Some(ordering) if ordering.is_gt() => input,
                    Some(_) => state.value.clone(),
                    None => {
                        return Err(QueryError::runtime(
                            "min() got values of incomparable types",
                        ))
                    }
                }
            };
        }
        AggregationOp::Max => {
            state.value = if state.count == 1 {
                input
            } else {
                match state.value.tri_cmp(&input) {
                    Some(ordering) if ordering.is_lt() => input,
                    Some(_) => state.value.clone(),
                    None => {
                        return Err(QueryError::runtime(
                            "max() got values of incomparable types",
                        ))
                    }
                }
            };
        }
    }
    Ok(())
}

fn finalize(op: AggregationOp, state: &AggregateValue) -> TypedValue {
    match op {
        AggregationOp::Count => TypedValue::Int(state.count),
        AggregationOp::Collect => TypedValue::List(state.collected.clone()),
        AggregationOp::Sum | AggregationOp::Min | AggregationOp::Max => {
            if state.count == 0 {
                TypedValue::Null
            } else {
                state.value.clone()
            }
        }
        AggregationOp::Avg => {
            if state.count == 0 {
                TypedValue::Null
            } else {
                let sum = match &state.value {
                    TypedValue::Int(v) => *v as f64,
                    TypedValue::Double(v) => *v,
                    _ => return TypedValue::Null,
                };
                TypedValue::Double(sum / state.count as f64)
            }
        }
    }
}

pub struct OrderByCursor<'p> {
    input: Box<Cursor<'p>>,
    order_by: &'p [(Expr, bool)],
    sorted: Option<Vec<Frame>>,
    index: usize,
}

impl<'p> OrderByCursor<'p> {
    fn pull(&mut self, frame: &mut Frame, ctx: &ExecutionContext) -> Result<bool> {
        if self.sorted.is_none() {
            let mut rows: Vec<(Vec<TypedValue>, Frame)> = Vec::new();
            while self.input.pull(frame, ctx)? {
                ctx.check_abort()?;
                let mut keys = Vec::with_capacity(self.order_by.len());
                for (expression, _) in self.order_by {
                    keys.push(eval(expression, frame, ctx)?);
                }
                rows.push((keys, frame.clone()));
            }
            let directions: Vec<bool> = self.order_by.iter().map(|(_, asc)| *asc).collect();
            rows.sort_by(|(a, _), (b, _)| compare_order_keys(a, b, &directions));
            self.sorted = Some(rows.into_iter().map(|(_, frame)| frame).collect());
            self.index = 0;
        }
        let sorted = self.sorted.as_ref().map(|s| s.as_slice()).unwrap_or_default();
        if self.index >= sorted.len() {
            return Ok(false);
        }
        frame.clone_from(&sorted[self.index]);
        self.index += 1;
        Ok(true)
    }
}

/// Stable multi-key comparison; nulls order last ascending and first
/// descending.
fn compare_order_keys(
    a: &[TypedValue],
    b: &[TypedValue],
    ascending: &[bool],
) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    for ((x, y), &asc) in a.iter().zip(b.iter()).zip(ascending.iter()) {
        let ordering = match (x.is_null(), y.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => {
                if asc {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
            (false, true) => {
                if asc {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            }
            (false, false) => {
                let ordering = x.total_cmp(y);
                if asc {
                    ordering
                } else {
                    ordering.reverse()
                }
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

pub struct AccumulateCursor<'p> {
    input: Box<Cursor<'p>>,
    symbols: &'p [Symbol],
    advance_command: bool,
    rows: Option<Vec<Vec<TypedValue>>>,
    index: usize,
}

impl<'p> AccumulateCursor<'p> {
    fn pull(&mut self, frame: &mut Frame, ctx: &ExecutionContext) -> Result<bool> {
        if self.rows.is_none() {
            let mut rows = Vec::new();
            while self.input.pull(frame, ctx)? {
                ctx.check_abort()?;
                rows.push(
                    self.symbols
                        .iter()
                        .map(|symbol| frame[symbol].clone())
                        .collect(),
                );
            }
            if self.advance_command {
                ctx.accessor.advance_command();
            }
            self.rows = Some(rows);
            self.index = 0;
        }
        let rows = self.rows.as_ref().map(|r| r.as_slice()).unwrap_or_default();
        if self.index >= rows.len() {
            return Ok(false);
        }
        for (symbol, value) in self.symbols.iter().zip(rows[self.index].iter()) {
            frame[symbol] = value.clone();
        }
        self.index += 1;
        Ok(true)
    }
}

// ---- helpers --------------------------------------------------------

fn expect_vertex(value: &TypedValue, action: &str) -> Result<VertexId> {
    match value {
        TypedValue::Vertex(id) => Ok(*id),
        other => Err(QueryError::runtime(format!(
            "cannot {action} a {}",
            other.type_name()
        ))),
    }
}

fn create_node(
    info: &NodeCreationInfo,
    frame: &mut Frame,
    ctx: &ExecutionContext,
) -> Result<VertexId> {
    let mut properties = std::collections::BTreeMap::new();
    for (property, expression) in &info.properties {
        let value = eval(expression, frame, ctx)?;
        if !value.is_null() {
            properties.insert(*property, PropertyValue::try_from(value)?);
        }
    }
    Ok(ctx.accessor.create_vertex(info.labels.clone(), properties))
}

fn record_key(value: &TypedValue, action: &str) -> Result<Option<RecordKey>> {
    match value {
        TypedValue::Null => Ok(None),
        TypedValue::Vertex(id) => Ok(Some(RecordKey::Vertex(*id))),
        TypedValue::Edge(id) => Ok(Some(RecordKey::Edge(*id))),
        other => Err(QueryError::runtime(format!(
            "{action} expects a vertex or an edge, got a {}",
            other.type_name()
        ))),
    }
}

fn set_all_properties(
    frame: &mut Frame,
    ctx: &ExecutionContext,
    input_symbol: &Symbol,
    expression: &Expr,
    update: bool,
) -> Result<()> {
    let Some(key) = record_key(&frame[input_symbol].clone(), "SET")? else {
        return Ok(());
    };
    let source = eval(expression, frame, ctx)?;
    let properties = match source {
        TypedValue::Null => return Ok(()),
        TypedValue::Map(entries) => {
            let catalog = &ctx.accessor.store().catalog;
            let mut properties = std::collections::BTreeMap::new();
            for (name, value) in entries {
                let property = catalog.property(&name);
                if value.is_null() {
                    if update {
                        ctx.accessor.set_property(key, property, None)?;
                    }
                    continue;
                }
                properties.insert(property, PropertyValue::try_from(value)?);
            }
            properties
        }
        TypedValue::Vertex(id) => ctx.accessor.vertex_properties(id),
        TypedValue::Edge(id) => ctx
            .accessor
            .edge_data(id)
            .map(|data| data.properties)
            .unwrap_or_default(),
        other => {
            return Err(QueryError::runtime(format!(
                "SET expects a map, vertex, or edge, got a {}",
                other.type_name()
            )))
        }
    };
    ctx.accessor.set_properties(key, properties, !update)?;
    Ok(())
}

/// Collision test for the uniqueness filter: plain values compare by
/// grouping equality, variable-length edge lists collide on any shared
/// element.
fn uniqueness_collides(current: &TypedValue, previous: &TypedValue) -> bool {
    match (current, previous) {
        (_, TypedValue::Null) => false,
        (TypedValue::List(a), TypedValue::List(b)) => a
            .iter()
            .any(|x| b.iter().any(|y| x.equals_grouping(y))),
        (TypedValue::List(items), other) | (other, TypedValue::List(items)) => {
            items.iter().any(|item| item.equals_grouping(other))
        }
        (a, b) => a.equals_grouping(b),
    }
}

fn eval_count(
    expression: &Expr,
    frame: &mut Frame,
    ctx: &ExecutionContext,
    clause: &str,
) -> Result<i64> {
    match eval(expression, frame, ctx)? {
        TypedValue::Int(n) if n >= 0 => Ok(n),
        TypedValue::Int(n) => Err(QueryError::runtime(format!(
            "{clause} must not be negative, got {n}"
        ))),
        other => Err(QueryError::runtime(format!(
            "{clause} expects a non-negative integer, got a {}",
            other.type_name()
        ))),
    }
}

fn build_path(
    frame: &Frame,
    elements: &[Symbol],
    ctx: &ExecutionContext,
) -> Result<TypedValue> {
    let mut vertices: Vec<VertexId> = Vec::new();
    let mut edges: Vec<EdgeId> = Vec::new();
    let mut current = match &frame[&elements[0]] {
        TypedValue::Null => return Ok(TypedValue::Null),
        TypedValue::Vertex(id) => *id,
        other => {
            return Err(QueryError::runtime(format!(
                "path starts with a {}",
                other.type_name()
            )))
        }
    };
    vertices.push(current);
    let follow = |edge: EdgeId, current: VertexId| -> Result<VertexId> {
        let data = ctx
            .accessor
            .edge_data(edge)
            .ok_or_else(|| QueryError::runtime("path edge no longer visible"))?;
        Ok(if data.from == current { data.to } else { data.from })
    };
    for pair in elements[1..].chunks(2) {
        let edge_value = &frame[&pair[0]];
        match edge_value {
            TypedValue::Null => return Ok(TypedValue::Null),
            TypedValue::Edge(edge) => {
                edges.push(*edge);
                current = follow(*edge, current)?;
                vertices.push(current);
            }
            TypedValue::List(items) => {
                for item in items {
                    match item {
                        TypedValue::Edge(edge) => {
                            edges.push(*edge);
                            current = follow(*edge, current)?;
                            vertices.push(current);
                        }
                        TypedValue::Null => return Ok(TypedValue::Null),
                        other => {
                            return Err(QueryError::runtime(format!(
                                "path segment contains a {}",
                                other.type_name()
                            )))
                        }
                    }
                }
            }
            other => {
                return Err(QueryError::runtime(format!(
                    "path segment is a {}",
                    other.type_name()
                )))
            }
        }
    }
    Ok(TypedValue::Path(Path { vertices, edges }))
}
