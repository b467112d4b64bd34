//! Depth-indented textual rendering of a plan.
//!
//! Every operator prints one `*` line; branching operators render their
//! non-input children behind a `|\` marker with increased indent. The
//! `Once` leaf is implicit and not printed.

use std::fmt::Write;

use crate::query::plan::LogicalOperator;
use crate::query::symbol::Symbol;
use crate::storage::{Direction, GraphAccessor};

pub fn pretty_print(plan: &LogicalOperator, accessor: &GraphAccessor) -> String {
    let mut printer = Printer {
        accessor,
        out: String::new(),
        depth: 0,
    };
    printer.visit(plan);
    printer.out
}

struct Printer<'a> {
    accessor: &'a GraphAccessor,
    out: String,
    depth: usize,
}

impl<'a> Printer<'a> {
    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push(' ');
        }
        let _ = writeln!(self.out, "* {text}");
    }

    fn branch(&mut self, child: &LogicalOperator, name: Option<&str>) {
        for _ in 0..self.depth {
            self.out.push(' ');
        }
        match name {
            Some(name) => {
                let _ = writeln!(self.out, "|\\ {name}");
            }
            None => self.out.push_str("|\\\n"),
        }
        self.depth += 1;
        self.visit(child);
        self.depth -= 1;
    }

    fn names(symbols: &[Symbol]) -> String {
        symbols
            .iter()
            .map(|symbol| symbol.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn expand_detail(
        &self,
        input_symbol: &Symbol,
        edge_symbol: &Symbol,
        node_symbol: &Symbol,
        direction: Direction,
    ) -> String {
        format!(
            "({}){}[{}]{}({})",
            input_symbol.name,
            if direction == Direction::In { "<-" } else { "-" },
            edge_symbol.name,
            if direction == Direction::Out { "->" } else { "-" },
            node_symbol.name,
        )
    }

    fn visit(&mut self, op: &LogicalOperator) {
        use LogicalOperator::*;
        match op {
            Once => {}
            ScanAll {
                input,
                output_symbol,
            } => {
                self.line(&format!("ScanAll ({})", output_symbol.name));
                self.visit(input);
            }
            ScanAllByLabel {
                input,
                output_symbol,
                label,
            } => {
                self.line(&format!(
                    "ScanAllByLabel ({} :{})",
                    output_symbol.name,
                    self.accessor.store().catalog.label_name(*label)
                ));
                self.visit(input);
            }
            ScanAllByLabelPropertyValue {
                input,
                output_symbol,
                label,
                property,
                ..
            } => {
                self.line(&format!(
                    "ScanAllByLabelPropertyValue ({} :{} {{{}}})",
                    output_symbol.name,
                    self.accessor.store().catalog.label_name(*label),
                    self.accessor.store().catalog.property_name(*property)
                ));
                self.visit(input);
            }
            ScanAllByLabelPropertyRange {
                input,
                output_symbol,
                label,
                property,
                ..
            } => {
                self.line(&format!(
                    "ScanAllByLabelPropertyRange ({} :{} {{{}}})",
                    output_symbol.name,
                    self.accessor.store().catalog.label_name(*label),
                    self.accessor.store().catalog.property_name(*property)
                ));
                self.visit(input);
            }
            Expand {
                input,
                input_symbol,
                edge_symbol,
                node_symbol,
                direction,
                ..
            } => {
                let detail =
                    self.expand_detail(input_symbol, edge_symbol, node_symbol, *direction);
                self.line(&format!("Expand {detail}"));
                self.visit(input);
            }
            ExpandVariable {
                input,
                input_symbol,
                edge_symbol,
                node_symbol,
                direction,
                ..
            } => {
                let detail =
                    self.expand_detail(input_symbol, edge_symbol, node_symbol, *direction);
                self.line(&format!("ExpandVariable {detail}"));
                self.visit(input);
            }
            ConstructNamedPath { input, .. } => {
                self.line("ConstructNamedPath");
                self.visit(input);
            }
            Filter { input, .. } => {
                self.line("Filter");
                self.visit(input);
            }
            ExpandUniquenessFilter { input, .. } => {
                self.line("ExpandUniquenessFilter");
                self.visit(input);
            }
            Optional {
                input, optional, ..
            } => {
                self.line("Optional");
                self.branch(optional, None);
                self.visit(input);
            }
            Merge {
                input,
                merge_match,
                merge_create,
            } => {
                self.line("Merge");
                self.branch(merge_match, Some("On Match"));
                self.branch(merge_create, Some("On Create"));
                self.visit(input);
            }
            Produce {
                input,
                named_expressions,
            } => {
                let names = named_expressions
                    .iter()
                    .map(|item| item.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                self.line(&format!("Produce {{{names}}}"));
                self.visit(input);
            }
            Aggregate {
                input,
                aggregations,
                remember,
                ..
            } => {
                let outputs = aggregations
                    .iter()
                    .map(|aggregation| aggregation.output_symbol.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                self.line(&format!(
                    "Aggregate {{{outputs}}} {{{}}}",
                    Self::names(remember)
                ));
                self.visit(input);
            }
            Skip { input, .. } => {
                self.line("Skip");
                self.visit(input);
            }
            Limit { input, .. } => {
                self.line("Limit");
                self.visit(input);
            }
            OrderBy { input, symbols, .. } => {
                self.line(&format!("OrderBy {{{}}}", Self::names(symbols)));
                self.visit(input);
            }
            Distinct { input, .. } => {
                self.line("Distinct");
                self.visit(input);
            }
            Unwind { input, .. } => {
                self.line("Unwind");
                self.visit(input);
            }
            CreateNode { input, .. } => {
                self.line("CreateNode");
                self.visit(input);
            }
            CreateExpand { input, .. } => {
                self.line("CreateExpand");
                self.visit(input);
            }
            SetProperty { input, .. } => {
                self.line("SetProperty");
                self.visit(input);
            }
            SetProperties { input, .. } => {
                self.line("SetProperties");
                self.visit(input);
            }
            SetLabels { input, .. } => {
                self.line("SetLabels");
                self.visit(input);
            }
            RemoveProperty { input, .. } => {
                self.line("RemoveProperty");
                self.visit(input);
            }
            RemoveLabels { input, .. } => {
                self.line("RemoveLabels");
                self.visit(input);
            }
            Delete { input, .. } => {
                self.line("Delete");
                self.visit(input);
            }
            Accumulate { input, .. } => {
                self.line("Accumulate");
                self.visit(input);
            }
            Cartesian {
                left,
                right,
                left_symbols,
                right_symbols,
            } => {
                self.line(&format!(
                    "Cartesian {{{} : {}}}",
                    Self::names(left_symbols),
                    Self::names(right_symbols)
                ));
                self.branch(right, None);
                self.visit(left);
            }
            CreateIndex { .. } => self.line("CreateIndex"),
            Explain {
                input,
                output_symbol,
            } => {
                self.line(&format!("Explain {{{}}}", output_symbol.name));
                self.visit(input);
            }
        }
    }
}
