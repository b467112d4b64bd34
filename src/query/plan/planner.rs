//! Lowering from the AST to the logical operator tree.
//!
//! Pattern matching compiles to a scan rooted at one pattern node,
//! chained expansions, filters placed as soon as their symbols are
//! bound, and an edge-uniqueness filter per expansion. Index-backed
//! scans are chosen whenever a label/property filter lines up with an
//! existing index. With the cost planner enabled the root scan is the
//! one with the smallest cardinality estimate and patterns run in
//! ascending cardinality order; ties break by source position.

use std::collections::HashSet;

use crate::config::Config;
use crate::error::{QueryError, Result};
use crate::query::ast::{
    BinaryOp, Clause, CreateClause, CypherQuery, EdgeAtom, Expr, MatchClause, MergeClause,
    NodeAtom, Pattern, ProjectionBody, RemoveItem, SetItem, SingleQuery,
};
use crate::query::plan::{
    Aggregation, EdgeCreationInfo, LogicalOperator, NodeCreationInfo, OutputExpression, RangeBound,
};
use crate::query::symbol::{Symbol, SymbolTable, SymbolType};
use crate::storage::{Direction, GraphAccessor};

pub struct PlannerInputs<'a> {
    pub accessor: &'a GraphAccessor,
    pub config: &'a Config,
}

/// Produces the logical plan and its cost estimate.
pub fn plan_query(
    query: &CypherQuery,
    symbol_table: &mut SymbolTable,
    inputs: PlannerInputs<'_>,
) -> Result<(LogicalOperator, f64)> {
    if !query.unions.is_empty() {
        return Err(QueryError::semantic("UNION is not supported"));
    }
    let mut root = {
        let mut builder = PlanBuilder {
            accessor: inputs.accessor,
            config: inputs.config,
            symbol_table: &*symbol_table,
            bound: HashSet::new(),
            write_pending: false,
        };
        builder.plan_single(&query.single)?
    };
    if query.explain {
        let output_symbol =
            symbol_table.create_symbol("QUERY PLAN", false, SymbolType::Any, None);
        root = LogicalOperator::Explain {
            input: Box::new(root),
            output_symbol,
        };
    }
    let cost = estimate_cost(&root, inputs.accessor).1;
    Ok((root, cost))
}

struct PlanBuilder<'a> {
    accessor: &'a GraphAccessor,
    config: &'a Config,
    symbol_table: &'a SymbolTable,
    bound: HashSet<usize>,
    write_pending: bool,
}

/// A WHERE conjunct (or one synthesized from a pattern atom) waiting to
/// be placed as soon as all symbols it reads are bound.
struct PendingFilter {
    expression: Expr,
    used: HashSet<usize>,
    shape: FilterShape,
}

enum FilterShape {
    Generic,
    /// `sym.prop = value`
    PropertyEq {
        symbol: usize,
        property: String,
        value: Expr,
        value_symbols: HashSet<usize>,
    },
    /// `sym.prop < value` and friends, normalized so the property is on
    /// the left.
    PropertyCmp {
        symbol: usize,
        property: String,
        op: BinaryOp,
        value: Expr,
        value_symbols: HashSet<usize>,
    },
    /// `sym:Label1:Label2`
    Labels { symbol: usize },
}

impl<'a> PlanBuilder<'a> {
    fn plan_single(&mut self, single: &SingleQuery) -> Result<LogicalOperator> {
        if let [Clause::CreateIndex(clause)] = single.clauses.as_slice() {
            let catalog = &self.accessor.store().catalog;
            return Ok(LogicalOperator::CreateIndex {
                label: catalog.label(&clause.label),
                property: catalog.property(&clause.property),
            });
        }
        let mut op = LogicalOperator::Once;
        for clause in &single.clauses {
            op = match clause {
                Clause::Match(clause) => self.plan_match(op, clause)?,
                Clause::Merge(clause) => self.plan_merge(op, clause)?,
                Clause::Create(clause) => self.plan_create(op, clause)?,
                Clause::Set(items) => self.plan_set(op, items)?,
                Clause::Remove(items) => self.plan_remove(op, items)?,
                Clause::Delete(clause) => {
                    self.write_pending = true;
                    LogicalOperator::Delete {
                        input: Box::new(op),
                        expressions: clause.expressions.clone(),
                        detach: clause.detach,
                    }
                }
                Clause::With(body) => self.plan_projection(op, body)?,
                Clause::Return(body) => self.plan_projection(op, body)?,
                Clause::Unwind(clause) => {
                    let output_symbol = required(&clause.symbol, &clause.name)?;
                    self.bound.insert(output_symbol.position);
                    LogicalOperator::Unwind {
                        input: Box::new(op),
                        expression: clause.expression.clone(),
                        output_symbol,
                    }
                }
                Clause::Foreach(_) => {
                    return Err(QueryError::semantic("FOREACH is not supported"))
                }
                Clause::CreateIndex(_) => {
                    return Err(QueryError::semantic(
                        "CREATE INDEX cannot be combined with other clauses",
                    ))
                }
            };
        }
        Ok(op)
    }

    // ---- match ------------------------------------------------------

    fn plan_match(&mut self, input: LogicalOperator, clause: &MatchClause) -> Result<LogicalOperator> {
        if clause.optional {
            let before: HashSet<usize> = self.bound.clone();
            let branch = self.plan_match_body(LogicalOperator::Once, clause)?;
            let optional_symbols: Vec<Symbol> = branch
                .modified_symbols()
                .into_iter()
                .filter(|symbol| !before.contains(&symbol.position))
                .collect();
            Ok(LogicalOperator::Optional {
                input: Box::new(input),
                optional: Box::new(branch),
                optional_symbols,
            })
        } else {
            self.plan_match_body(input, clause)
        }
    }

    fn plan_match_body(
        &mut self,
        input: LogicalOperator,
        clause: &MatchClause,
    ) -> Result<LogicalOperator> {
        let mut pending = Vec::new();
        if let Some(where_clause) = &clause.where_clause {
            collect_conjuncts(where_clause, &mut pending);
        }
        for pattern in &clause.patterns {
            self.pattern_filters(pattern, &mut pending)?;
        }

        let mut order: Vec<usize> = (0..clause.patterns.len()).collect();
        if self.config.query_cost_planner {
            let estimates: Vec<f64> = clause
                .patterns
                .iter()
                .map(|pattern| self.pattern_root_estimate(pattern, &pending))
                .collect::<Result<_>>()?;
            order.sort_by(|&a, &b| {
                estimates[a]
                    .partial_cmp(&estimates[b])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        let mut op = input;
        let mut clause_edges: Vec<Symbol> = Vec::new();
        for index in order {
            op = self.plan_pattern(op, &clause.patterns[index], &mut pending, &mut clause_edges)?;
        }
        // Whatever could not be pushed down lands here.
        op = self.emit_ready_filters(op, &mut pending, true);
        Ok(op)
    }

    /// Synthesizes pending filters from node/edge labels and property
    /// maps so they take part in index selection and pushdown.
    fn pattern_filters(&mut self, pattern: &Pattern, pending: &mut Vec<PendingFilter>) -> Result<()> {
        let node = |atom: &NodeAtom, pending: &mut Vec<PendingFilter>| -> Result<()> {
            let symbol = required(&atom.symbol, atom.name.as_deref().unwrap_or("node"))?;
            if !atom.labels.is_empty() {
                pending.push(PendingFilter {
                    expression: Expr::LabelsTest {
                        expression: Box::new(ident(&symbol)),
                        labels: atom.labels.clone(),
                    },
                    used: HashSet::from([symbol.position]),
                    shape: FilterShape::Labels {
                        symbol: symbol.position,
                    },
                });
            }
            for (property, value) in &atom.properties {
                let value_symbols = expr_symbols(value);
                let mut used = value_symbols.clone();
                used.insert(symbol.position);
                pending.push(PendingFilter {
                    expression: Expr::Binary {
                        op: BinaryOp::Eq,
                        left: Box::new(Expr::PropertyLookup {
                            expression: Box::new(ident(&symbol)),
                            property: property.clone(),
                        }),
                        right: Box::new(value.clone()),
                    },
                    used,
                    shape: FilterShape::PropertyEq {
                        symbol: symbol.position,
                        property: property.clone(),
                        value: value.clone(),
                        value_symbols,
                    },
                });
            }
            Ok(())
        };
        node(&pattern.start, pending)?;
        for (edge, far) in &pattern.steps {
            node(far, pending)?;
            let symbol = required(&edge.symbol, edge.name.as_deref().unwrap_or("edge"))?;
            if edge.range.is_some() && !edge.properties.is_empty() {
                return Err(QueryError::semantic(
                    "property maps on variable-length edges are not supported",
                ));
            }
            for (property, value) in &edge.properties {
                let mut used = expr_symbols(value);
                used.insert(symbol.position);
                pending.push(PendingFilter {
                    expression: Expr::Binary {
                        op: BinaryOp::Eq,
                        left: Box::new(Expr::PropertyLookup {
                            expression: Box::new(ident(&symbol)),
                            property: property.clone(),
                        }),
                        right: Box::new(value.clone()),
                    },
                    used,
                    shape: FilterShape::Generic,
                });
            }
        }
        Ok(())
    }

    fn plan_pattern(
        &mut self,
        input: LogicalOperator,
        pattern: &Pattern,
        pending: &mut Vec<PendingFilter>,
        clause_edges: &mut Vec<Symbol>,
    ) -> Result<LogicalOperator> {
        let atoms = pattern_atoms(pattern);
        let root = self.choose_root(pattern, &atoms, pending)?;

        let mut op = input;
        let root_symbol = required(&atoms[root].symbol, "node")?;
        if !self.bound.contains(&root_symbol.position) {
            op = self.make_scan(op, atoms[root], pending)?;
            self.bound.insert(root_symbol.position);
        }
        op = self.emit_ready_filters(op, pending, false);

        // Walk left of the root with flipped directions, then right.
        let mut expansions: Vec<(usize, &EdgeAtom, usize, bool)> = Vec::new();
        for i in (0..root).rev() {
            expansions.push((i + 1, &pattern.steps[i].0, i, true));
        }
        for i in root..pattern.steps.len() {
            expansions.push((i, &pattern.steps[i].0, i + 1, false));
        }
        for (near, edge, far, reversed) in expansions {
            op = self.plan_expansion(op, atoms[near], edge, atoms[far], reversed, clause_edges)?;
            op = self.emit_ready_filters(op, pending, false);
        }

        if let Some(path_symbol) = &pattern.path_symbol {
            let mut elements = vec![required(&pattern.start.symbol, "node")?];
            for (edge, node) in &pattern.steps {
                elements.push(required(&edge.symbol, "edge")?);
                elements.push(required(&node.symbol, "node")?);
            }
            self.bound.insert(path_symbol.position);
            op = LogicalOperator::ConstructNamedPath {
                input: Box::new(op),
                path_symbol: path_symbol.clone(),
                elements,
            };
        }
        Ok(op)
    }

    /// Root selection: source order roots at the first atom unless an
    /// atom is already bound; the cost planner roots at the cheapest
    /// scan.
    fn choose_root(
        &self,
        pattern: &Pattern,
        atoms: &[&NodeAtom],
        pending: &[PendingFilter],
    ) -> Result<usize> {
        for (index, atom) in atoms.iter().enumerate() {
            let symbol = required(&atom.symbol, "node")?;
            if self.bound.contains(&symbol.position) {
                return Ok(index);
            }
        }
        if !self.config.query_cost_planner || pattern.steps.is_empty() {
            return Ok(0);
        }
        let mut best = 0;
        let mut best_estimate = f64::INFINITY;
        for (index, atom) in atoms.iter().enumerate() {
            let estimate = self.scan_estimate(atom, pending)?;
            if estimate < best_estimate {
                best = index;
                best_estimate = estimate;
            }
        }
        Ok(best)
    }

    fn pattern_root_estimate(
        &self,
        pattern: &Pattern,
        pending: &[PendingFilter],
    ) -> Result<f64> {
        let atoms = pattern_atoms(pattern);
        let mut best = f64::INFINITY;
        for atom in &atoms {
            let symbol = required(&atom.symbol, "node")?;
            let estimate = if self.bound.contains(&symbol.position) {
                1.0
            } else {
                self.scan_estimate(atom, pending)?
            };
            if estimate < best {
                best = estimate;
            }
        }
        Ok(best)
    }

    /// Expected cardinality of the best scan available for this atom.
    fn scan_estimate(&self, atom: &NodeAtom, pending: &[PendingFilter]) -> Result<f64> {
        let symbol = required(&atom.symbol, "node")?;
        let catalog = &self.accessor.store().catalog;
        let mut best = self.accessor.vertices_approx_count() as f64;
        for label_name in &atom.labels {
            let label = catalog.label(label_name);
            best = best.min(self.accessor.label_approx_count(label) as f64);
            for filter in pending {
                match &filter.shape {
                    FilterShape::PropertyEq {
                        symbol: filter_symbol,
                        property,
                        value_symbols,
                        ..
                    } if *filter_symbol == symbol.position
                        && value_symbols.iter().all(|p| self.bound.contains(p)) =>
                    {
                        let property = catalog.property(property);
                        if let Some(stats) = self.accessor.property_index_stats(label, property) {
                            best = best.min(stats.average_group_size());
                        }
                    }
                    FilterShape::PropertyCmp {
                        symbol: filter_symbol,
                        property,
                        value_symbols,
                        ..
                    } if *filter_symbol == symbol.position
                        && value_symbols.iter().all(|p| self.bound.contains(p)) =>
                    {
                        let property = catalog.property(property);
                        if let Some(stats) = self.accessor.property_index_stats(label, property) {
                            best = best.min(stats.entries as f64 / 2.0);
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(best)
    }

    /// Picks the scan operator for an unbound pattern node, consuming
    /// the pending filters the scan subsumes.
    fn make_scan(
        &mut self,
        input: LogicalOperator,
        atom: &NodeAtom,
        pending: &mut Vec<PendingFilter>,
    ) -> Result<LogicalOperator> {
        let symbol = required(&atom.symbol, "node")?;
        let catalog = &self.accessor.store().catalog;
        let single_label = atom.labels.len() == 1;

        for label_name in &atom.labels {
            let label = catalog.label(label_name);
            // Equality probe wins over a range scan.
            let probe = pending.iter().position(|filter| match &filter.shape {
                FilterShape::PropertyEq {
                    symbol: filter_symbol,
                    property,
                    value_symbols,
                    ..
                } => {
                    *filter_symbol == symbol.position
                        && value_symbols.iter().all(|p| self.bound.contains(p))
                        && self
                            .accessor
                            .has_property_index(label, catalog.property(property))
                }
                _ => false,
            });
            if let Some(index) = probe {
                let filter = pending.remove(index);
                let FilterShape::PropertyEq {
                    property, value, ..
                } = filter.shape
                else {
                    unreachable!()
                };
                if single_label {
                    consume_label_filter(pending, symbol.position);
                }
                return Ok(LogicalOperator::ScanAllByLabelPropertyValue {
                    input: Box::new(input),
                    output_symbol: symbol,
                    label,
                    property: catalog.property(&property),
                    expression: value,
                });
            }

            let mut lower: Option<(usize, RangeBound, String)> = None;
            let mut upper: Option<(usize, RangeBound, String)> = None;
            for (index, filter) in pending.iter().enumerate() {
                let FilterShape::PropertyCmp {
                    symbol: filter_symbol,
                    property,
                    op,
                    value,
                    value_symbols,
                } = &filter.shape
                else {
                    continue;
                };
                if *filter_symbol != symbol.position
                    || !value_symbols.iter().all(|p| self.bound.contains(p))
                    || !self
                        .accessor
                        .has_property_index(label, catalog.property(property))
                {
                    continue;
                }
                if let Some((_, _, existing)) = lower.as_ref().or(upper.as_ref()) {
                    if existing != property {
                        continue;
                    }
                }
                let bound = RangeBound {
                    expression: value.clone(),
                    inclusive: matches!(op, BinaryOp::GtEq | BinaryOp::LtEq),
                };
                match op {
                    BinaryOp::Gt | BinaryOp::GtEq if lower.is_none() => {
                        lower = Some((index, bound, property.clone()))
                    }
                    BinaryOp::Lt | BinaryOp::LtEq if upper.is_none() => {
                        upper = Some((index, bound, property.clone()))
                    }
                    _ => {}
                }
            }
            if lower.is_some() || upper.is_some() {
                let property_name = lower
                    .as_ref()
                    .or(upper.as_ref())
                    .map(|(_, _, name)| name.clone())
                    .unwrap_or_default();
                let mut consumed: Vec<usize> = lower
                    .iter()
                    .chain(upper.iter())
                    .map(|(index, _, _)| *index)
                    .collect();
                consumed.sort_unstable_by(|a, b| b.cmp(a));
                for index in consumed {
                    pending.remove(index);
                }
                if single_label {
                    consume_label_filter(pending, symbol.position);
                }
                return Ok(LogicalOperator::ScanAllByLabelPropertyRange {
                    input: Box::new(input),
                    output_symbol: symbol,
                    label,
                    property: catalog.property(&property_name),
                    lower: lower.map(|(_, bound, _)| bound),
                    upper: upper.map(|(_, bound, _)| bound),
                });
            }
        }

        if let Some(label_name) = atom.labels.first() {
            let label = catalog.label(label_name);
            if single_label {
                consume_label_filter(pending, symbol.position);
            }
            return Ok(LogicalOperator::ScanAllByLabel {
                input: Box::new(input),
                output_symbol: symbol,
                label,
            });
        }
        Ok(LogicalOperator::ScanAll {
            input: Box::new(input),
            output_symbol: symbol,
        })
    }

    fn plan_expansion(
        &mut self,
        input: LogicalOperator,
        near: &NodeAtom,
        edge: &EdgeAtom,
        far: &NodeAtom,
        reversed: bool,
        clause_edges: &mut Vec<Symbol>,
    ) -> Result<LogicalOperator> {
        let catalog = &self.accessor.store().catalog;
        let input_symbol = required(&near.symbol, "node")?;
        let edge_symbol = required(&edge.symbol, "edge")?;
        let node_symbol = required(&far.symbol, "node")?;
        let existing_node = self.bound.contains(&node_symbol.position);
        let direction = if reversed {
            flip(edge.direction)
        } else {
            edge.direction
        };
        let edge_types = edge
            .edge_types
            .iter()
            .map(|name| catalog.edge_type(name))
            .collect();

        let op = match &edge.range {
            None => LogicalOperator::Expand {
                input: Box::new(input),
                input_symbol,
                edge_symbol: edge_symbol.clone(),
                node_symbol: node_symbol.clone(),
                direction,
                edge_types,
                existing_node,
            },
            Some(range) => LogicalOperator::ExpandVariable {
                input: Box::new(input),
                input_symbol,
                edge_symbol: edge_symbol.clone(),
                node_symbol: node_symbol.clone(),
                direction,
                edge_types,
                lower: range.lower.unwrap_or(1),
                upper: range.upper,
                breadth_first: range.breadth_first,
                existing_node,
            },
        };
        self.bound.insert(edge_symbol.position);
        self.bound.insert(node_symbol.position);

        let op = if clause_edges.is_empty() {
            op
        } else {
            LogicalOperator::ExpandUniquenessFilter {
                input: Box::new(op),
                expand_symbol: edge_symbol.clone(),
                previous_symbols: clause_edges.clone(),
            }
        };
        clause_edges.push(edge_symbol);
        Ok(op)
    }

    fn emit_ready_filters(
        &mut self,
        input: LogicalOperator,
        pending: &mut Vec<PendingFilter>,
        force: bool,
    ) -> LogicalOperator {
        let mut ready = Vec::new();
        let mut index = 0;
        while index < pending.len() {
            if force || pending[index].used.iter().all(|p| self.bound.contains(p)) {
                ready.push(pending.remove(index));
            } else {
                index += 1;
            }
        }
        let Some(expression) = ready
            .into_iter()
            .map(|filter| filter.expression)
            .reduce(|left, right| Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
            })
        else {
            return input;
        };
        LogicalOperator::Filter {
            input: Box::new(input),
            expression,
        }
    }

    // ---- merge and create -------------------------------------------

    fn plan_merge(&mut self, input: LogicalOperator, clause: &MergeClause) -> Result<LogicalOperator> {
        let before = self.bound.clone();
        let match_clause = MatchClause {
            optional: false,
            patterns: vec![clause.pattern.clone()],
            where_clause: None,
        };
        let mut merge_match = self.plan_match_body(LogicalOperator::Once, &match_clause)?;
        merge_match = self.plan_set(merge_match, &clause.on_match)?;
        let after = std::mem::replace(&mut self.bound, before);

        let create_clause = CreateClause {
            patterns: vec![clause.pattern.clone()],
        };
        let mut merge_create = self.plan_create(LogicalOperator::Once, &create_clause)?;
        merge_create = self.plan_set(merge_create, &clause.on_create)?;
        self.bound = after;
        self.write_pending = true;

        Ok(LogicalOperator::Merge {
            input: Box::new(input),
            merge_match: Box::new(merge_match),
            merge_create: Box::new(merge_create),
        })
    }

    fn plan_create(&mut self, input: LogicalOperator, clause: &CreateClause) -> Result<LogicalOperator> {
        let catalog = &self.accessor.store().catalog;
        let mut op = input;
        self.write_pending = true;
        for pattern in &clause.patterns {
            let start_symbol = required(&pattern.start.symbol, "node")?;
            if !self.bound.contains(&start_symbol.position) {
                op = LogicalOperator::CreateNode {
                    input: Box::new(op),
                    node_info: node_creation_info(&pattern.start, catalog)?,
                };
                self.bound.insert(start_symbol.position);
            }
            let mut near = &pattern.start;
            for (edge, far) in &pattern.steps {
                let input_symbol = required(&near.symbol, "node")?;
                let edge_symbol = required(&edge.symbol, "edge")?;
                let far_symbol = required(&far.symbol, "node")?;
                let existing_node = self.bound.contains(&far_symbol.position);
                op = LogicalOperator::CreateExpand {
                    input: Box::new(op),
                    input_symbol,
                    node_info: node_creation_info(far, catalog)?,
                    edge_info: EdgeCreationInfo {
                        symbol: edge_symbol.clone(),
                        edge_type: catalog.edge_type(&edge.edge_types[0]),
                        properties: edge
                            .properties
                            .iter()
                            .map(|(name, value)| (catalog.property(name), value.clone()))
                            .collect(),
                        direction: edge.direction,
                    },
                    existing_node,
                };
                self.bound.insert(edge_symbol.position);
                self.bound.insert(far_symbol.position);
                near = far;
            }
        }
        Ok(op)
    }

    // ---- mutations --------------------------------------------------

    fn plan_set(&mut self, input: LogicalOperator, items: &[SetItem]) -> Result<LogicalOperator> {
        let catalog = &self.accessor.store().catalog;
        let mut op = input;
        for item in items {
            self.write_pending = true;
            op = match item {
                SetItem::Property { target, value } => {
                    let Expr::PropertyLookup {
                        expression,
                        property,
                    } = target.as_ref()
                    else {
                        return Err(QueryError::semantic("SET expects a property lookup"));
                    };
                    LogicalOperator::SetProperty {
                        input: Box::new(op),
                        object: (**expression).clone(),
                        property: catalog.property(property),
                        expression: value.clone(),
                    }
                }
                SetItem::AllProperties {
                    name,
                    symbol,
                    value,
                    update,
                    ..
                } => LogicalOperator::SetProperties {
                    input: Box::new(op),
                    input_symbol: required(symbol, name)?,
                    expression: value.clone(),
                    update: *update,
                },
                SetItem::Labels {
                    name,
                    symbol,
                    labels,
                    ..
                } => LogicalOperator::SetLabels {
                    input: Box::new(op),
                    input_symbol: required(symbol, name)?,
                    labels: labels.iter().map(|label| catalog.label(label)).collect(),
                },
            };
        }
        Ok(op)
    }

    fn plan_remove(&mut self, input: LogicalOperator, items: &[RemoveItem]) -> Result<LogicalOperator> {
        let catalog = &self.accessor.store().catalog;
        let mut op = input;
        for item in items {
            self.write_pending = true;
            op = match item {
                RemoveItem::Property { target } => {
                    let Expr::PropertyLookup {
                        expression,
                        property,
                    } = target.as_ref()
                    else {
                        return Err(QueryError::semantic("REMOVE expects a property lookup"));
                    };
                    LogicalOperator::RemoveProperty {
                        input: Box::new(op),
                        object: (**expression).clone(),
                        property: catalog.property(property),
                    }
                }
                RemoveItem::Labels {
                    name,
                    symbol,
                    labels,
                    ..
                } => LogicalOperator::RemoveLabels {
                    input: Box::new(op),
                    input_symbol: required(symbol, name)?,
                    labels: labels.iter().map(|label| catalog.label(label)).collect(),
                },
            };
        }
        Ok(op)
    }

    // ---- projections -------------------------------------------------

    fn plan_projection(
        &mut self,
        input: LogicalOperator,
        body: &ProjectionBody,
    ) -> Result<LogicalOperator> {
        let mut op = input;
        // A projection after writes must observe all of them.
        if self.write_pending {
            let mut symbols: Vec<usize> = self.bound.iter().copied().collect();
            symbols.sort_unstable();
            op = LogicalOperator::Accumulate {
                input: Box::new(op),
                symbols: symbols
                    .into_iter()
                    .map(|position| self.symbol_at(position))
                    .collect::<Result<_>>()?,
                advance_command: true,
            };
            self.write_pending = false;
        }

        let mut aggregations = Vec::new();
        for item in &body.items {
            collect_aggregations(&item.expression, &mut aggregations)?;
        }
        if !aggregations.is_empty() {
            let group_by: Vec<Expr> = body
                .items
                .iter()
                .filter(|item| !item.expression.contains_aggregation())
                .map(|item| item.expression.clone())
                .collect();
            let mut remember_positions = HashSet::new();
            for item in &body.items {
                collect_symbols_outside_aggregations(&item.expression, &mut remember_positions);
            }
            for item in &body.order_by {
                collect_symbols_outside_aggregations(&item.expression, &mut remember_positions);
            }
            let remember = {
                let mut positions: Vec<usize> = remember_positions.into_iter().collect();
                positions.sort_unstable();
                positions
                    .into_iter()
                    .map(|position| self.symbol_at(position))
                    .collect::<Result<Vec<_>>>()?
            };
            op = LogicalOperator::Aggregate {
                input: Box::new(op),
                aggregations,
                group_by,
                remember,
            };
        }

        let mut named_expressions = Vec::new();
        let mut output_symbols = Vec::new();
        for item in &body.items {
            let output_symbol = required(&item.symbol, &item.name)?;
            output_symbols.push(output_symbol.clone());
            named_expressions.push(OutputExpression {
                name: item.name.clone(),
                expression: item.expression.clone(),
                output_symbol,
                token_position: item.token_position,
            });
        }
        op = LogicalOperator::Produce {
            input: Box::new(op),
            named_expressions,
        };
        self.bound = output_symbols.iter().map(|s| s.position).collect();

        if let Some(where_clause) = &body.where_clause {
            op = LogicalOperator::Filter {
                input: Box::new(op),
                expression: where_clause.clone(),
            };
        }
        if body.distinct {
            op = LogicalOperator::Distinct {
                input: Box::new(op),
                symbols: output_symbols.clone(),
            };
        }
        if !body.order_by.is_empty() {
            op = LogicalOperator::OrderBy {
                input: Box::new(op),
                order_by: body
                    .order_by
                    .iter()
                    .map(|item| (item.expression.clone(), item.ascending))
                    .collect(),
                symbols: output_symbols,
            };
        }
        if let Some(skip) = &body.skip {
            op = LogicalOperator::Skip {
                input: Box::new(op),
                expression: skip.clone(),
            };
        }
        if let Some(limit) = &body.limit {
            op = LogicalOperator::Limit {
                input: Box::new(op),
                expression: limit.clone(),
            };
        }
        Ok(op)
    }

    fn symbol_at(&self, position: usize) -> Result<Symbol> {
        Ok(self.symbol_table.at(position).clone())
    }
}

fn consume_label_filter(pending: &mut Vec<PendingFilter>, symbol: usize) {
    pending.retain(
        |filter| !matches!(&filter.shape, FilterShape::Labels { symbol: s } if *s == symbol),
    );
}

fn pattern_atoms(pattern: &Pattern) -> Vec<&NodeAtom> {
    let mut atoms = vec![&pattern.start];
    for (_, node) in &pattern.steps {
        atoms.push(node);
    }
    atoms
}

fn flip(direction: Direction) -> Direction {
    match direction {
        Direction::Out => Direction::In,
        Direction::In => Direction::Out,
        Direction::Both => Direction::Both,
    }
}

fn ident(symbol: &Symbol) -> Expr {
    Expr::Identifier {
        name: symbol.name.clone(),
        token_position: symbol.token_position.unwrap_or(0),
        symbol: Some(symbol.clone()),
    }
}

fn required(symbol: &Option<Symbol>, name: &str) -> Result<Symbol> {
    symbol
        .clone()
        .ok_or_else(|| QueryError::runtime(format!("internal: '{name}' has no symbol")))
}

fn node_creation_info(
    atom: &NodeAtom,
    catalog: &crate::storage::Catalog,
) -> Result<NodeCreationInfo> {
    Ok(NodeCreationInfo {
        symbol: required(&atom.symbol, atom.name.as_deref().unwrap_or("node"))?,
        labels: atom.labels.iter().map(|label| catalog.label(label)).collect(),
        properties: atom
            .properties
            .iter()
            .map(|(name, value)| (catalog.property(name), value.clone()))
            .collect(),
    })
}

/// Splits a WHERE expression on top-level ANDs and classifies each
/// conjunct for index selection.
fn collect_conjuncts(expression: &Expr, pending: &mut Vec<PendingFilter>) {
    if let Expr::Binary {
        op: BinaryOp::And,
        left,
        right,
    } = expression
    {
        collect_conjuncts(left, pending);
        collect_conjuncts(right, pending);
        return;
    }
    let used = expr_symbols(expression);
    let shape = classify(expression);
    pending.push(PendingFilter {
        expression: expression.clone(),
        used,
        shape,
    });
}

fn classify(expression: &Expr) -> FilterShape {
    let property_side = |expr: &Expr| -> Option<(usize, String)> {
        let Expr::PropertyLookup {
            expression,
            property,
        } = expr
        else {
            return None;
        };
        let Expr::Identifier {
            symbol: Some(symbol),
            ..
        } = expression.as_ref()
        else {
            return None;
        };
        Some((symbol.position, property.clone()))
    };
    match expression {
        Expr::LabelsTest {
            expression: inner, ..
        } => {
            if let Expr::Identifier {
                symbol: Some(symbol),
                ..
            } = inner.as_ref()
            {
                FilterShape::Labels {
                    symbol: symbol.position,
                }
            } else {
                FilterShape::Generic
            }
        }
        Expr::Binary { op, left, right } => {
            let flipped = |op: BinaryOp| match op {
                BinaryOp::Lt => BinaryOp::Gt,
                BinaryOp::LtEq => BinaryOp::GtEq,
                BinaryOp::Gt => BinaryOp::Lt,
                BinaryOp::GtEq => BinaryOp::LtEq,
                other => other,
            };
            match op {
                BinaryOp::Eq => {
                    if let Some((symbol, property)) = property_side(left) {
                        FilterShape::PropertyEq {
                            symbol,
                            property,
                            value: (**right).clone(),
                            value_symbols: expr_symbols(right),
                        }
                    } else if let Some((symbol, property)) = property_side(right) {
                        FilterShape::PropertyEq {
                            symbol,
                            property,
                            value: (**left).clone(),
                            value_symbols: expr_symbols(left),
                        }
                    } else {
                        FilterShape::Generic
                    }
                }
                BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
                    if let Some((symbol, property)) = property_side(left) {
                        FilterShape::PropertyCmp {
                            symbol,
                            property,
                            op: *op,
                            value: (**right).clone(),
                            value_symbols: expr_symbols(right),
                        }
                    } else if let Some((symbol, property)) = property_side(right) {
                        FilterShape::PropertyCmp {
                            symbol,
                            property,
                            op: flipped(*op),
                            value: (**left).clone(),
                            value_symbols: expr_symbols(left),
                        }
                    } else {
                        FilterShape::Generic
                    }
                }
                _ => FilterShape::Generic,
            }
        }
        _ => FilterShape::Generic,
    }
}

/// Frame slots an expression reads; comprehension-local symbols are
/// excluded.
fn expr_symbols(expression: &Expr) -> HashSet<usize> {
    let mut symbols = HashSet::new();
    let mut locals = HashSet::new();
    walk_symbols(expression, &mut symbols, &mut locals, false);
    symbols
}

fn collect_symbols_outside_aggregations(expression: &Expr, out: &mut HashSet<usize>) {
    let mut locals = HashSet::new();
    walk_symbols(expression, out, &mut locals, true);
}

fn walk_symbols(
    expression: &Expr,
    out: &mut HashSet<usize>,
    locals: &mut HashSet<usize>,
    skip_aggregations: bool,
) {
    match expression {
        Expr::Literal(_) | Expr::Parameter { .. } => {}
        Expr::Identifier { symbol, .. } => {
            if let Some(symbol) = symbol {
                if !locals.contains(&symbol.position) {
                    out.insert(symbol.position);
                }
            }
        }
        Expr::PropertyLookup { expression, .. } | Expr::LabelsTest { expression, .. } => {
            walk_symbols(expression, out, locals, skip_aggregations)
        }
        Expr::Function { args, .. } => {
            for arg in args {
                walk_symbols(arg, out, locals, skip_aggregations);
            }
        }
        Expr::Aggregation { expression, .. } => {
            if skip_aggregations {
                return;
            }
            if let Some(operand) = expression {
                walk_symbols(operand, out, locals, skip_aggregations);
            }
        }
        Expr::ListLiteral(items) => {
            for item in items {
                walk_symbols(item, out, locals, skip_aggregations);
            }
        }
        Expr::MapLiteral(entries) => {
            for (_, value) in entries {
                walk_symbols(value, out, locals, skip_aggregations);
            }
        }
        Expr::ListComprehension {
            symbol,
            list,
            where_clause,
            output,
            ..
        } => {
            walk_symbols(list, out, locals, skip_aggregations);
            let added = symbol
                .as_ref()
                .map(|s| locals.insert(s.position))
                .unwrap_or(false);
            if let Some(where_clause) = where_clause {
                walk_symbols(where_clause, out, locals, skip_aggregations);
            }
            if let Some(output) = output {
                walk_symbols(output, out, locals, skip_aggregations);
            }
            if added {
                if let Some(s) = symbol {
                    locals.remove(&s.position);
                }
            }
        }
        Expr::Unary { expression, .. } => walk_symbols(expression, out, locals, skip_aggregations),
        Expr::Binary { left, right, .. } => {
            walk_symbols(left, out, locals, skip_aggregations);
            walk_symbols(right, out, locals, skip_aggregations);
        }
    }
}

fn collect_aggregations(expression: &Expr, out: &mut Vec<Aggregation>) -> Result<()> {
    match expression {
        Expr::Aggregation {
            op,
            expression,
            distinct,
            symbol,
        } => {
            out.push(Aggregation {
                op: *op,
                expression: expression.as_deref().cloned(),
                distinct: *distinct,
                output_symbol: required(symbol, op.name())?,
            });
            Ok(())
        }
        Expr::Literal(_) | Expr::Parameter { .. } | Expr::Identifier { .. } => Ok(()),
        Expr::PropertyLookup { expression, .. } | Expr::LabelsTest { expression, .. } => {
            collect_aggregations(expression, out)
        }
        Expr::Function { args, .. } => {
            for arg in args {
                collect_aggregations(arg, out)?;
            }
            Ok(())
        }
        Expr::ListLiteral(items) => {
            for item in items {
                collect_aggregations(item, out)?;
            }
            Ok(())
        }
        Expr::MapLiteral(entries) => {
            for (_, value) in entries {
                collect_aggregations(value, out)?;
            }
            Ok(())
        }
        Expr::ListComprehension {
            list,
            where_clause,
            output,
            ..
        } => {
            collect_aggregations(list, out)?;
            if let Some(where_clause) = where_clause {
                collect_aggregations(where_clause, out)?;
            }
            if let Some(output) = output {
                collect_aggregations(output, out)?;
            }
            Ok(())
        }
        Expr::Unary { expression, .. } => collect_aggregations(expression, out),
        Expr::Binary { left, right, .. } => {
            collect_aggregations(left, out)?;
            collect_aggregations(right, out)
        }
    }
}

// ---- cost estimation ------------------------------------------------

// Coefficients for the plan cost estimate.
const COST_SCAN_ROW: f64 = 1.0;
const FILTER_SELECTIVITY: f64 = 0.25;
const UNIQUENESS_SELECTIVITY: f64 = 0.95;
const EXPAND_FANOUT: f64 = 3.0;
const UNWIND_FACTOR: f64 = 1.3;

/// Bottom-up (cardinality, cost) estimate.
fn estimate_cost(op: &LogicalOperator, accessor: &GraphAccessor) -> (f64, f64) {
    use LogicalOperator::*;
    match op {
        Once | CreateIndex { .. } => (1.0, 0.0),
        ScanAll { input, .. } => {
            let (card, cost) = estimate_cost(input, accessor);
            let rows = accessor.vertices_approx_count() as f64;
            (card * rows, cost + card * rows * COST_SCAN_ROW)
        }
        ScanAllByLabel { input, label, .. } => {
            let (card, cost) = estimate_cost(input, accessor);
            let rows = accessor.label_approx_count(*label) as f64;
            (card * rows, cost + card * rows * COST_SCAN_ROW)
        }
        ScanAllByLabelPropertyValue {
            input,
            label,
            property,
            ..
        } => {
            let (card, cost) = estimate_cost(input, accessor);
            let rows = accessor
                .property_index_stats(*label, *property)
                .map(|stats| stats.average_group_size())
                .unwrap_or(1.0);
            (card * rows, cost + card * rows * COST_SCAN_ROW)
        }
        ScanAllByLabelPropertyRange {
            input,
            label,
            property,
            ..
        } => {
            let (card, cost) = estimate_cost(input, accessor);
            let rows = accessor
                .property_index_stats(*label, *property)
                .map(|stats| stats.entries as f64 / 2.0)
                .unwrap_or(1.0);
            (card * rows, cost + card * rows * COST_SCAN_ROW)
        }
        Expand { input, .. } | ExpandVariable { input, .. } => {
            let (card, cost) = estimate_cost(input, accessor);
            (card * EXPAND_FANOUT, cost + card * EXPAND_FANOUT)
        }
        Filter { input, .. } => {
            let (card, cost) = estimate_cost(input, accessor);
            (card * FILTER_SELECTIVITY, cost + card)
        }
        ExpandUniquenessFilter { input, .. } => {
            let (card, cost) = estimate_cost(input, accessor);
            (card * UNIQUENESS_SELECTIVITY, cost + card)
        }
        Unwind { input, .. } => {
            let (card, cost) = estimate_cost(input, accessor);
            (card * UNWIND_FACTOR, cost + card * UNWIND_FACTOR)
        }
        Optional {
            input, optional, ..
        } => {
            let (card, cost) = estimate_cost(input, accessor);
            let (branch_card, branch_cost) = estimate_cost(optional, accessor);
            (card * branch_card.max(1.0), cost + card * branch_cost.max(1.0))
        }
        Merge {
            input,
            merge_match,
            merge_create,
        } => {
            let (card, cost) = estimate_cost(input, accessor);
            let (match_card, match_cost) = estimate_cost(merge_match, accessor);
            let (_, create_cost) = estimate_cost(merge_create, accessor);
            (
                card * match_card.max(1.0),
                cost + card * (match_cost + create_cost).max(1.0),
            )
        }
        Cartesian { left, right, .. } => {
            let (left_card, left_cost) = estimate_cost(left, accessor);
            let (right_card, right_cost) = estimate_cost(right, accessor);
            (
                left_card * right_card,
                left_cost + left_card * right_cost.max(1.0),
            )
        }
        Aggregate { input, .. } => {
            let (card, cost) = estimate_cost(input, accessor);
            (card.sqrt().max(1.0), cost + card)
        }
        Skip { input, .. } | Limit { input, .. } => {
            let (card, cost) = estimate_cost(input, accessor);
            (card, cost)
        }
        OrderBy { input, .. } | Distinct { input, .. } | Accumulate { input, .. } => {
            let (card, cost) = estimate_cost(input, accessor);
            (card, cost + card)
        }
        Produce { input, .. }
        | ConstructNamedPath { input, .. }
        | CreateNode { input, .. }
        | CreateExpand { input, .. }
        | SetProperty { input, .. }
        | SetProperties { input, .. }
        | SetLabels { input, .. }
        | RemoveProperty { input, .. }
        | RemoveLabels { input, .. }
        | Delete { input, .. } => {
            let (card, cost) = estimate_cost(input, accessor);
            (card, cost + card)
        }
        Explain { .. } => (1.0, 1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse;
    use crate::query::semantic::SymbolGenerator;
    use crate::storage::GraphStore;
    use std::sync::Arc;

    fn plan(source: &str) -> (LogicalOperator, SymbolTable) {
        let store = Arc::new(GraphStore::new());
        let accessor = store.access();
        let config = Config::default();
        let mut query = parse(source).unwrap();
        let mut table = SymbolTable::new();
        SymbolGenerator::new(&mut table)
            .visit_query(&mut query)
            .unwrap();
        let (root, _) = plan_query(
            &query,
            &mut table,
            PlannerInputs {
                accessor: &accessor,
                config: &config,
            },
        )
        .unwrap();
        (root, table)
    }

    #[test]
    fn match_lowers_to_scan_expand_produce() {
        let (root, _) = plan("MATCH (n:L)-[r]->(m) RETURN n");
        let LogicalOperator::Produce { input, .. } = &root else {
            panic!("expected Produce at the root");
        };
        let LogicalOperator::Expand {
            input, direction, ..
        } = input.as_ref()
        else {
            panic!("expected Expand under Produce");
        };
        assert_eq!(*direction, Direction::Out);
        assert!(matches!(
            input.as_ref(),
            LogicalOperator::ScanAllByLabel { .. }
        ));
    }

    #[test]
    fn second_expansion_gets_a_uniqueness_filter() {
        let (root, _) = plan("MATCH (a)-[r1]->(b)-[r2]->(c) RETURN a");
        let mut found = false;
        let mut op = &root;
        loop {
            if let LogicalOperator::ExpandUniquenessFilter {
                previous_symbols, ..
            } = op
            {
                assert_eq!(previous_symbols.len(), 1);
                found = true;
            }
            op = match op {
                LogicalOperator::Produce { input, .. }
                | LogicalOperator::ExpandUniquenessFilter { input, .. }
                | LogicalOperator::Expand { input, .. }
                | LogicalOperator::ScanAll { input, .. } => input,
                _ => break,
            };
        }
        assert!(found);
    }

    #[test]
    fn optional_match_wraps_its_branch() {
        let (root, _) = plan("MATCH (n) OPTIONAL MATCH (n)-[r]->(m) RETURN n, r, m");
        let LogicalOperator::Produce { input, .. } = &root else {
            panic!("expected Produce at the root");
        };
        let LogicalOperator::Optional {
            optional_symbols, ..
        } = input.as_ref()
        else {
            panic!("expected Optional under Produce");
        };
        // The edge and far node are nulled when the branch is empty.
        assert_eq!(optional_symbols.len(), 2);
    }

    #[test]
    fn writes_before_a_projection_get_an_accumulate_barrier() {
        let (root, _) = plan("CREATE (n:L) RETURN n");
        let LogicalOperator::Produce { input, .. } = &root else {
            panic!("expected Produce at the root");
        };
        assert!(matches!(
            input.as_ref(),
            LogicalOperator::Accumulate {
                advance_command: true,
                ..
            }
        ));
    }

    #[test]
    fn merge_compiles_to_two_branches() {
        let (root, _) = plan("MERGE (n:L {v: 1})");
        let LogicalOperator::Merge {
            merge_match,
            merge_create,
            ..
        } = &root
        else {
            panic!("expected Merge at the root");
        };
        assert!(matches!(
            merge_match.as_ref(),
            LogicalOperator::Filter { .. }
        ));
        assert!(matches!(
            merge_create.as_ref(),
            LogicalOperator::CreateNode { .. }
        ));
    }

    #[test]
    fn every_written_symbol_fits_the_frame() {
        for source in [
            "MATCH (n:L)-[r*1..2]->(m) WHERE m.v > 1 RETURN n, count(m) ORDER BY n.v SKIP 1",
            "MATCH p = (a)-->(b) OPTIONAL MATCH (b)-->(c) RETURN p, c",
            "MERGE (n:L {v: 1}) ON CREATE SET n.fresh = true RETURN n",
            "UNWIND [1, 2] AS x CREATE (:L {v: x})",
        ] {
            let (root, table) = plan(source);
            for symbol in root.modified_symbols() {
                assert!(symbol.position < table.max_position(), "{source}");
            }
        }
    }
}
