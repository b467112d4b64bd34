//! Semantic phase: binds every name to a symbol slot.
//!
//! A single pass over the AST declares a symbol at each first binding,
//! reuses symbols on later references, enforces `WITH` visibility
//! scoping, and rejects aggregations outside projection items. The pass
//! annotates the AST in place; the planner and evaluator only read the
//! resolved symbols.

use std::collections::HashMap;

use crate::error::{QueryError, Result};
use crate::query::ast::*;
use crate::query::symbol::{Symbol, SymbolTable, SymbolType};

pub struct SymbolGenerator<'a> {
    table: &'a mut SymbolTable,
    scope: HashMap<String, Symbol>,
    anon: usize,
}

impl<'a> SymbolGenerator<'a> {
    pub fn new(table: &'a mut SymbolTable) -> Self {
        Self {
            table,
            scope: HashMap::new(),
            anon: 0,
        }
    }

    pub fn visit_query(&mut self, query: &mut CypherQuery) -> Result<()> {
        self.visit_single(&mut query.single)?;
        for part in &mut query.unions {
            self.scope.clear();
            self.visit_single(&mut part.single)?;
        }
        Ok(())
    }

    fn visit_single(&mut self, single: &mut SingleQuery) -> Result<()> {
        let clause_count = single.clauses.len();
        for (index, clause) in single.clauses.iter_mut().enumerate() {
            let is_last = index + 1 == clause_count;
            match clause {
                Clause::Match(m) => self.visit_match(m)?,
                Clause::Merge(m) => self.visit_merge(m)?,
                Clause::Create(c) => self.visit_create(c)?,
                Clause::Set(items) => self.visit_set_items(items)?,
                Clause::Remove(items) => self.visit_remove_items(items)?,
                Clause::Delete(d) => {
                    for expression in &mut d.expressions {
                        self.visit_expr(expression, false)?;
                    }
                }
                Clause::With(body) => self.visit_projection(body)?,
                Clause::Return(body) => {
                    if !is_last {
                        return Err(QueryError::semantic(
                            "RETURN must be the last clause of a query",
                        ));
                    }
                    self.visit_projection(body)?
                }
                Clause::Unwind(unwind) => self.visit_unwind(unwind)?,
                Clause::Foreach(foreach) => self.visit_foreach(foreach)?,
                Clause::CreateIndex(_) => {
                    if clause_count != 1 {
                        return Err(QueryError::semantic(
                            "CREATE INDEX cannot be combined with other clauses",
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    // ---- bindings ---------------------------------------------------

    fn anon_symbol(&mut self, symbol_type: SymbolType) -> Symbol {
        self.anon += 1;
        self.table
            .create_symbol(format!("anon{}", self.anon), false, symbol_type, None)
    }

    fn declare(
        &mut self,
        name: &str,
        symbol_type: SymbolType,
        token_position: Option<usize>,
    ) -> Symbol {
        let symbol = self
            .table
            .create_symbol(name, true, symbol_type, token_position);
        self.scope.insert(name.to_owned(), symbol.clone());
        symbol
    }

    /// Reuses an existing binding or declares a new one.
    fn bind(
        &mut self,
        name: &str,
        symbol_type: SymbolType,
        token_position: Option<usize>,
    ) -> Result<Symbol> {
        if let Some(existing) = self.scope.get(name) {
            if !existing.symbol_type.compatible(symbol_type) {
                return Err(QueryError::semantic(format!(
                    "'{name}' is already bound with a different type"
                )));
            }
            return Ok(existing.clone());
        }
        Ok(self.declare(name, symbol_type, token_position))
    }

    fn lookup(&self, name: &str) -> Result<Symbol> {
        self.scope
            .get(name)
            .cloned()
            .ok_or_else(|| QueryError::semantic(format!("unbound variable '{name}'")))
    }

    // ---- clauses ----------------------------------------------------

    fn visit_match(&mut self, clause: &mut MatchClause) -> Result<()> {
        for pattern in &mut clause.patterns {
            self.visit_pattern(pattern, false)?;
        }
        if let Some(where_clause) = &mut clause.where_clause {
            self.visit_expr(where_clause, false)?;
        }
        Ok(())
    }

    fn visit_merge(&mut self, clause: &mut MergeClause) -> Result<()> {
        for (edge, _) in &clause.pattern.steps {
            validate_create_edge(edge)?;
        }
        self.visit_pattern(&mut clause.pattern, false)?;
        self.visit_set_items(&mut clause.on_match)?;
        self.visit_set_items(&mut clause.on_create)?;
        Ok(())
    }

    fn visit_create(&mut self, clause: &mut CreateClause) -> Result<()> {
        for pattern in &mut clause.patterns {
            if pattern.name.is_some() {
                return Err(QueryError::semantic("CREATE cannot name a path"));
            }
            for (edge, _) in &pattern.steps {
                validate_create_edge(edge)?;
            }
            self.visit_pattern(pattern, true)?;
        }
        Ok(())
    }

    fn visit_pattern(&mut self, pattern: &mut Pattern, creating: bool) -> Result<()> {
        self.visit_node_atom(&mut pattern.start, creating)?;
        for (edge, node) in &mut pattern.steps {
            self.visit_edge_atom(edge)?;
            self.visit_node_atom(node, creating)?;
        }
        if let Some(name) = pattern.name.clone() {
            if self.scope.contains_key(&name) {
                return Err(QueryError::semantic(format!(
                    "path name '{name}' is already bound"
                )));
            }
            pattern.path_symbol =
                Some(self.declare(&name, SymbolType::Path, pattern.name_token_position));
        }
        Ok(())
    }

    fn visit_node_atom(&mut self, atom: &mut NodeAtom, creating: bool) -> Result<()> {
        for (_, value) in &mut atom.properties {
            self.visit_expr(value, false)?;
        }
        let symbol = match atom.name.clone() {
            Some(name) => {
                let already_bound = self.scope.contains_key(&name);
                if creating && already_bound && !(atom.labels.is_empty() && atom.properties.is_empty())
                {
                    return Err(QueryError::semantic(format!(
                        "bound node '{name}' cannot carry labels or properties in CREATE"
                    )));
                }
                self.bind(&name, SymbolType::Vertex, atom.token_position)?
            }
            None => self.anon_symbol(SymbolType::Vertex),
        };
        atom.symbol = Some(symbol);
        Ok(())
    }

    fn visit_edge_atom(&mut self, atom: &mut EdgeAtom) -> Result<()> {
        for (_, value) in &mut atom.properties {
            self.visit_expr(value, false)?;
        }
        let symbol = match atom.name.clone() {
            Some(name) => {
                if self.scope.contains_key(&name) {
                    return Err(QueryError::semantic(format!(
                        "edge variable '{name}' is already bound"
                    )));
                }
                self.declare(&name, SymbolType::Edge, atom.token_position)
            }
            None => self.anon_symbol(SymbolType::Edge),
        };
        atom.symbol = Some(symbol);
        Ok(())
    }

    fn visit_set_items(&mut self, items: &mut [SetItem]) -> Result<()> {
        for item in items {
            match item {
                SetItem::Property { target, value } => {
                    self.visit_expr(target, false)?;
                    self.visit_expr(value, false)?;
                }
                SetItem::AllProperties {
                    name,
                    symbol,
                    value,
                    ..
                } => {
                    *symbol = Some(self.lookup(name)?);
                    self.visit_expr(value, false)?;
                }
                SetItem::Labels { name, symbol, .. } => {
                    *symbol = Some(self.lookup(name)?);
                }
            }
        }
        Ok(())
    }

    fn visit_remove_items(&mut self, items: &mut [RemoveItem]) -> Result<()> {
        for item in items {
            match item {
                RemoveItem::Property { target } => self.visit_expr(target, false)?,
                RemoveItem::Labels { name, symbol, .. } => {
                    *symbol = Some(self.lookup(name)?);
                }
            }
        }
        Ok(())
    }

    fn visit_projection(&mut self, body: &mut ProjectionBody) -> Result<()> {
        let mut names = Vec::new();
        for item in &mut body.items {
            self.visit_expr(&mut item.expression, true)?;
            if names.contains(&item.name) {
                return Err(QueryError::semantic(format!(
                    "multiple result columns named '{}'",
                    item.name
                )));
            }
            names.push(item.name.clone());
        }
        for expression in body.skip.iter_mut().chain(body.limit.iter_mut()) {
            ensure_no_identifiers(expression)?;
            self.visit_expr(expression, false)?;
        }
        // Names imported by the projection are the only ones visible
        // afterwards.
        let old_scope = std::mem::take(&mut self.scope);
        for item in &mut body.items {
            let symbol_type = match &item.expression {
                Expr::Identifier {
                    symbol: Some(symbol),
                    ..
                } => symbol.symbol_type,
                _ => SymbolType::Any,
            };
            let symbol =
                self.table
                    .create_symbol(item.name.as_str(), true, symbol_type, item.token_position);
            self.scope.insert(item.name.clone(), symbol.clone());
            item.symbol = Some(symbol);
        }
        // ORDER BY additionally sees the pre-projection names; aliases
        // shadow them.
        let new_scope = self.scope.clone();
        let mut merged = old_scope;
        merged.extend(new_scope.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.scope = merged;
        for order_item in &mut body.order_by {
            if order_item.expression.contains_aggregation() {
                return Err(QueryError::semantic(
                    "aggregation functions are not allowed in ORDER BY",
                ));
            }
            self.visit_expr(&mut order_item.expression, false)?;
        }
        self.scope = new_scope;
        if let Some(where_clause) = &mut body.where_clause {
            self.visit_expr(where_clause, false)?;
        }
        Ok(())
    }

    fn visit_unwind(&mut self, clause: &mut UnwindClause) -> Result<()> {
        self.visit_expr(&mut clause.expression, false)?;
        if self.scope.contains_key(&clause.name) {
            return Err(QueryError::semantic(format!(
                "'{}' is already bound",
                clause.name
            )));
        }
        clause.symbol = Some(self.declare(
            &clause.name,
            SymbolType::Any,
            Some(clause.token_position),
        ));
        Ok(())
    }

    fn visit_foreach(&mut self, clause: &mut ForeachClause) -> Result<()> {
        self.visit_expr(&mut clause.expression, false)?;
        let shadowed = self.scope.get(&clause.name).cloned();
        let symbol = self.table.create_symbol(
            clause.name.as_str(),
            true,
            SymbolType::Any,
            Some(clause.token_position),
        );
        self.scope.insert(clause.name.clone(), symbol.clone());
        clause.symbol = Some(symbol);
        for inner in &mut clause.clauses {
            match inner {
                Clause::Create(c) => self.visit_create(c)?,
                Clause::Merge(m) => self.visit_merge(m)?,
                Clause::Set(items) => self.visit_set_items(items)?,
                Clause::Remove(items) => self.visit_remove_items(items)?,
                Clause::Delete(d) => {
                    for expression in &mut d.expressions {
                        self.visit_expr(expression, false)?;
                    }
                }
                Clause::Foreach(f) => self.visit_foreach(f)?,
                _ => {
                    return Err(QueryError::semantic(
                        "FOREACH may only contain update clauses",
                    ))
                }
            }
        }
        match shadowed {
            Some(symbol) => self.scope.insert(clause.name.clone(), symbol),
            None => self.scope.remove(&clause.name),
        };
        Ok(())
    }

    // ---- expressions ------------------------------------------------

    fn visit_expr(&mut self, expression: &mut Expr, allow_aggregation: bool) -> Result<()> {
        match expression {
            Expr::Literal(_) | Expr::Parameter { .. } => Ok(()),
            Expr::Identifier { name, symbol, .. } => {
                *symbol = Some(self.lookup(name)?);
                Ok(())
            }
            Expr::PropertyLookup { expression, .. } => self.visit_expr(expression, false),
            Expr::LabelsTest { expression, .. } => self.visit_expr(expression, false),
            Expr::Function { args, .. } => {
                for arg in args {
                    self.visit_expr(arg, allow_aggregation)?;
                }
                Ok(())
            }
            Expr::Aggregation {
                op,
                expression,
                symbol,
                ..
            } => {
                if !allow_aggregation {
                    return Err(QueryError::semantic(format!(
                        "{}() is only allowed in RETURN and WITH projections",
                        op.name()
                    )));
                }
                if let Some(operand) = expression {
                    self.visit_expr(operand, false)?;
                }
                *symbol = Some(self.anon_symbol(SymbolType::Any));
                Ok(())
            }
            Expr::ListLiteral(items) => {
                for item in items {
                    self.visit_expr(item, allow_aggregation)?;
                }
                Ok(())
            }
            Expr::MapLiteral(entries) => {
                for (_, value) in entries {
                    self.visit_expr(value, allow_aggregation)?;
                }
                Ok(())
            }
            Expr::ListComprehension {
                name,
                token_position,
                symbol,
                list,
                where_clause,
                output,
            } => {
                self.visit_expr(list, false)?;
                let shadowed = self.scope.get(name).cloned();
                let inner = self.table.create_symbol(
                    name.as_str(),
                    true,
                    SymbolType::Any,
                    Some(*token_position),
                );
                self.scope.insert(name.clone(), inner.clone());
                *symbol = Some(inner);
                if let Some(where_clause) = where_clause {
                    self.visit_expr(where_clause, false)?;
                }
                if let Some(output) = output {
                    self.visit_expr(output, false)?;
                }
                match shadowed {
                    Some(previous) => self.scope.insert(name.clone(), previous),
                    None => self.scope.remove(name),
                };
                Ok(())
            }
            Expr::Unary { expression, .. } => self.visit_expr(expression, allow_aggregation),
            Expr::Binary { left, right, .. } => {
                self.visit_expr(left, allow_aggregation)?;
                self.visit_expr(right, allow_aggregation)
            }
        }
    }
}

fn validate_create_edge(edge: &EdgeAtom) -> Result<()> {
    if edge.range.is_some() {
        return Err(QueryError::semantic(
            "variable-length edges cannot be created",
        ));
    }
    if edge.edge_types.len() != 1 {
        return Err(QueryError::semantic(
            "creating an edge requires exactly one edge type",
        ));
    }
    if edge.direction == Direction::Both {
        return Err(QueryError::semantic(
            "creating an edge requires a direction",
        ));
    }
    Ok(())
}

fn ensure_no_identifiers(expression: &Expr) -> Result<()> {
    let ok = match expression {
        Expr::Identifier { .. } => false,
        Expr::Literal(_) | Expr::Parameter { .. } => true,
        Expr::Unary { expression, .. } => return ensure_no_identifiers(expression),
        Expr::Binary { left, right, .. } => {
            ensure_no_identifiers(left)?;
            return ensure_no_identifiers(right);
        }
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(QueryError::semantic(
            "SKIP and LIMIT may only use literals and parameters",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse;

    fn analyze(source: &str) -> Result<(CypherQuery, SymbolTable)> {
        let mut query = parse(source)?;
        let mut table = SymbolTable::new();
        SymbolGenerator::new(&mut table).visit_query(&mut query)?;
        Ok((query, table))
    }

    #[test]
    fn pattern_names_share_symbols() {
        let (query, table) = analyze("MATCH (n)-->(m), (n)-->(k) RETURN n").unwrap();
        let Clause::Match(m) = &query.single.clauses[0] else {
            panic!("expected MATCH");
        };
        let first = m.patterns[0].start.symbol.as_ref().unwrap();
        let second = m.patterns[1].start.symbol.as_ref().unwrap();
        assert_eq!(first.position, second.position);
        // n, m, k plus two anonymous edges and the RETURN projection.
        assert_eq!(table.max_position(), 6);
    }

    #[test]
    fn unbound_reference_is_rejected() {
        let err = analyze("MATCH (n) RETURN m").unwrap_err();
        assert!(matches!(err, QueryError::Semantic(_)));
    }

    #[test]
    fn with_limits_visibility() {
        assert!(analyze("MATCH (n)-->(m) WITH n RETURN n").is_ok());
        let err = analyze("MATCH (n)-->(m) WITH n RETURN m").unwrap_err();
        assert!(matches!(err, QueryError::Semantic(_)));
    }

    #[test]
    fn aggregation_outside_projection_is_rejected() {
        let err = analyze("MATCH (n) WHERE count(n) > 1 RETURN n").unwrap_err();
        assert!(matches!(err, QueryError::Semantic(_)));
        assert!(analyze("MATCH (n) RETURN count(n)").is_ok());
    }

    #[test]
    fn edge_variables_cannot_rebind() {
        let err = analyze("MATCH (a)-[r]->(b)-[r]->(c) RETURN a").unwrap_err();
        assert!(matches!(err, QueryError::Semantic(_)));
    }

    #[test]
    fn skip_limit_reject_variables() {
        let err = analyze("MATCH (n) RETURN n LIMIT n.x").unwrap_err();
        assert!(matches!(err, QueryError::Semantic(_)));
    }

    #[test]
    fn duplicate_output_names_are_rejected() {
        let err = analyze("MATCH (n) RETURN n.a AS x, n.b AS x").unwrap_err();
        assert!(matches!(err, QueryError::Semantic(_)));
    }

    #[test]
    fn return_must_be_last() {
        let err = analyze("RETURN 1 MATCH (n) RETURN n").unwrap_err();
        assert!(matches!(err, QueryError::Semantic(_)));
    }

    #[test]
    fn create_requires_directed_single_type_edges() {
        assert!(analyze("CREATE (a)-[:E]->(b)").is_ok());
        assert!(analyze("CREATE (a)-[:E]-(b)").is_err());
        assert!(analyze("CREATE (a)-->(b)").is_err());
    }

    #[test]
    fn foreach_scopes_its_variable() {
        assert!(analyze("FOREACH (x IN [1, 2] | CREATE (:L {v: x}))").is_ok());
        let err = analyze("FOREACH (x IN [1] | CREATE (n)) RETURN x").unwrap_err();
        assert!(matches!(err, QueryError::Semantic(_)));
    }
}
