//! Recursive-descent parser with Pratt expression parsing.
//!
//! The parser runs over stripped text, so literal positions surface as
//! `$Ln` parameter tokens. Token indexes recorded in the AST refer to
//! the stripped token stream and line up with the maps produced by the
//! stripper.

use crate::error::{QueryError, Result};
use crate::query::ast::*;
use crate::query::lexer::{tokenize, Token, TokenKind};
use crate::query::typed_value::TypedValue;
use crate::storage::Direction;

// Binding powers, higher binds tighter.
const BP_OR: u8 = 1;
const BP_XOR: u8 = 2;
const BP_AND: u8 = 3;
const BP_NOT: u8 = 4;
const BP_CMP: u8 = 5;
const BP_IN: u8 = 6;
const BP_ADD: u8 = 7;
const BP_MUL: u8 = 8;
const BP_POW: u8 = 9;
const BP_PREFIX: u8 = 10;
const BP_POSTFIX: u8 = 11;

/// Parses a (stripped) query into an AST.
pub fn parse(source: &str) -> Result<CypherQuery> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
    };
    parser.parse_query()
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

fn describe(kind: &TokenKind) -> String {
    use TokenKind::*;
    match kind {
        Integer(v) => format!("integer {v}"),
        Float(v) => format!("float {v}"),
        Str(_) => "string literal".into(),
        Ident(name) => format!("'{name}'"),
        Param(name) => format!("parameter ${name}"),
        other => format!("{other:?}").to_uppercase(),
    }
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek() == Some(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.error_here(format!("expected {what}")))
        }
    }

    fn error_here(&self, message: impl Into<String>) -> QueryError {
        let message = message.into();
        match self.tokens.get(self.pos) {
            Some(token) => QueryError::syntax(
                format!("{message}, found {}", describe(&token.kind)),
                token.line,
                token.column,
            ),
            None => {
                let (line, column) = self
                    .tokens
                    .last()
                    .map(|t| (t.line, t.column))
                    .unwrap_or((1, 1));
                QueryError::syntax(format!("{message}, found end of query"), line, column)
            }
        }
    }

    /// Accepts an identifier or any word keyword as a name.
    fn name(&mut self, what: &str) -> Result<String> {
        match self.tokens.get(self.pos) {
            Some(token) => {
                let text = &self.source[token.start..token.end];
                let is_word = matches!(token.kind, TokenKind::Ident(_))
                    || text
                        .chars()
                        .next()
                        .is_some_and(|c| c.is_alphabetic() || c == '_');
                if is_word && !matches!(token.kind, TokenKind::Param(_)) {
                    let name = match &token.kind {
                        TokenKind::Ident(name) => name.clone(),
                        _ => text.to_owned(),
                    };
                    self.pos += 1;
                    Ok(name)
                } else {
                    Err(self.error_here(format!("expected {what}")))
                }
            }
            None => Err(self.error_here(format!("expected {what}"))),
        }
    }

    fn slice(&self, from: usize, to: usize) -> String {
        let start = self.tokens[from].start;
        let end = self.tokens[to].end;
        self.source[start..end].trim().to_owned()
    }

    // ---- query structure --------------------------------------------

    fn parse_query(&mut self) -> Result<CypherQuery> {
        let explain = self.eat(&TokenKind::Explain);
        let single = self.parse_single_query()?;
        let mut unions = Vec::new();
        while self.eat(&TokenKind::Union) {
            let all = self.eat(&TokenKind::All);
            unions.push(UnionPart {
                all,
                single: self.parse_single_query()?,
            });
        }
        self.eat(&TokenKind::Semicolon);
        if self.pos < self.tokens.len() {
            return Err(self.error_here("expected end of query"));
        }
        Ok(CypherQuery {
            explain,
            single,
            unions,
        })
    }

    fn parse_single_query(&mut self) -> Result<SingleQuery> {
        let mut clauses = Vec::new();
        loop {
            match self.peek() {
                None | Some(TokenKind::Semicolon) | Some(TokenKind::Union) => break,
                _ => clauses.push(self.parse_clause()?),
            }
        }
        if clauses.is_empty() {
            return Err(self.error_here("expected a clause"));
        }
        Ok(SingleQuery { clauses })
    }

    fn parse_clause(&mut self) -> Result<Clause> {
        match self.peek() {
            Some(TokenKind::Match) => {
                self.advance();
                self.parse_match(false)
            }
            Some(TokenKind::Optional) => {
                self.advance();
                self.expect(&TokenKind::Match, "MATCH after OPTIONAL")?;
                self.parse_match(true)
            }
            Some(TokenKind::Merge) => {
                self.advance();
                self.parse_merge()
            }
            Some(TokenKind::Create) => {
                self.advance();
                if self.check(&TokenKind::Index) {
                    self.parse_create_index()
                } else {
                    let patterns = self.parse_patterns()?;
                    Ok(Clause::Create(CreateClause { patterns }))
                }
            }
            Some(TokenKind::Set) => {
                self.advance();
                Ok(Clause::Set(self.parse_set_items()?))
            }
            Some(TokenKind::Remove) => {
                self.advance();
                Ok(Clause::Remove(self.parse_remove_items()?))
            }
            Some(TokenKind::Delete) => {
                self.advance();
                self.parse_delete(false)
            }
            Some(TokenKind::Detach) => {
                self.advance();
                self.expect(&TokenKind::Delete, "DELETE after DETACH")?;
                self.parse_delete(true)
            }
            Some(TokenKind::With) => {
                self.advance();
                let body = self.parse_projection_body(true)?;
                Ok(Clause::With(body))
            }
            Some(TokenKind::Return) => {
                self.advance();
                let body = self.parse_projection_body(false)?;
                Ok(Clause::Return(body))
            }
            Some(TokenKind::Unwind) => {
                self.advance();
                self.parse_unwind()
            }
            Some(TokenKind::Foreach) => {
                self.advance();
                self.parse_foreach()
            }
            _ => Err(self.error_here("expected a clause keyword")),
        }
    }

    fn parse_match(&mut self, optional: bool) -> Result<Clause> {
        let patterns = self.parse_patterns()?;
        let where_clause = if self.eat(&TokenKind::Where) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };
        Ok(Clause::Match(MatchClause {
            optional,
            patterns,
            where_clause,
        }))
    }

    fn parse_merge(&mut self) -> Result<Clause> {
        let pattern = self.parse_pattern()?;
        let mut on_match = Vec::new();
        let mut on_create = Vec::new();
        while self.eat(&TokenKind::On) {
            match self.peek() {
                Some(TokenKind::Match) => {
                    self.advance();
                    self.expect(&TokenKind::Set, "SET after ON MATCH")?;
                    on_match.extend(self.parse_set_items()?);
                }
                Some(TokenKind::Create) => {
                    self.advance();
                    self.expect(&TokenKind::Set, "SET after ON CREATE")?;
                    on_create.extend(self.parse_set_items()?);
                }
                _ => return Err(self.error_here("expected MATCH or CREATE after ON")),
            }
        }
        Ok(Clause::Merge(MergeClause {
            pattern,
            on_match,
            on_create,
        }))
    }

    fn parse_create_index(&mut self) -> Result<Clause> {
        self.expect(&TokenKind::Index, "INDEX")?;
        self.expect(&TokenKind::On, "ON")?;
        self.expect(&TokenKind::Colon, "':'")?;
        let label = self.name("a label name")?;
        self.expect(&TokenKind::LParen, "'('")?;
        let property = self.name("a property name")?;
        self.expect(&TokenKind::RParen, "')'")?;
        Ok(Clause::CreateIndex(CreateIndexClause { label, property }))
    }

    fn parse_delete(&mut self, detach: bool) -> Result<Clause> {
        let mut expressions = vec![self.parse_expr(0)?];
        while self.eat(&TokenKind::Comma) {
            expressions.push(self.parse_expr(0)?);
        }
        Ok(Clause::Delete(DeleteClause {
            detach,
            expressions,
        }))
    }

    fn parse_unwind(&mut self) -> Result<Clause> {
        let expression = self.parse_expr(0)?;
        self.expect(&TokenKind::As, "AS after UNWIND expression")?;
        let token_position = self.pos;
        let name = self.name("a name")?;
        Ok(Clause::Unwind(UnwindClause {
            expression,
            name,
            token_position,
            symbol: None,
        }))
    }

    fn parse_foreach(&mut self) -> Result<Clause> {
        self.expect(&TokenKind::LParen, "'('")?;
        let token_position = self.pos;
        let name = self.name("a loop variable")?;
        self.expect(&TokenKind::In, "IN")?;
        let expression = self.parse_expr(0)?;
        self.expect(&TokenKind::Pipe, "'|'")?;
        let mut clauses = Vec::new();
        while !self.check(&TokenKind::RParen) {
            clauses.push(self.parse_clause()?);
        }
        self.expect(&TokenKind::RParen, "')'")?;
        if clauses.is_empty() {
            return Err(self.error_here("FOREACH requires at least one update clause"));
        }
        Ok(Clause::Foreach(ForeachClause {
            name,
            token_position,
            symbol: None,
            expression,
            clauses,
        }))
    }

    fn parse_set_items(&mut self) -> Result<Vec<SetItem>> {
        let mut items = vec![self.parse_set_item()?];
        while self.eat(&TokenKind::Comma) {
            items.push(self.parse_set_item()?);
        }
        Ok(items)
    }

    fn parse_set_item(&mut self) -> Result<SetItem> {
        let token_position = self.pos;
        let name = self.name("a name")?;
        match self.peek() {
            Some(TokenKind::Colon) => {
                let mut labels = Vec::new();
                while self.eat(&TokenKind::Colon) {
                    labels.push(self.name("a label name")?);
                }
                Ok(SetItem::Labels {
                    name,
                    token_position,
                    symbol: None,
                    labels,
                })
            }
            Some(TokenKind::Dot) => {
                self.advance();
                let property = self.name("a property name")?;
                self.expect(&TokenKind::Eq, "'='")?;
                let value = self.parse_expr(0)?;
                Ok(SetItem::Property {
                    target: Box::new(Expr::PropertyLookup {
                        expression: Box::new(Expr::Identifier {
                            name,
                            token_position,
                            symbol: None,
                        }),
                        property,
                    }),
                    value,
                })
            }
            Some(TokenKind::Eq) => {
                self.advance();
                let value = self.parse_expr(0)?;
                Ok(SetItem::AllProperties {
                    name,
                    token_position,
                    symbol: None,
                    value,
                    update: false,
                })
            }
            Some(TokenKind::PlusEq) => {
                self.advance();
                let value = self.parse_expr(0)?;
                Ok(SetItem::AllProperties {
                    name,
                    token_position,
                    symbol: None,
                    value,
                    update: true,
                })
            }
            _ => Err(self.error_here("expected ':', '.', '=', or '+=' in SET")),
        }
    }

    fn parse_remove_items(&mut self) -> Result<Vec<RemoveItem>> {
        let mut items = vec![self.parse_remove_item()?];
        while self.eat(&TokenKind::Comma) {
            items.push(self.parse_remove_item()?);
        }
        Ok(items)
    }

    fn parse_remove_item(&mut self) -> Result<RemoveItem> {
        let token_position = self.pos;
        let name = self.name("a name")?;
        match self.peek() {
            Some(TokenKind::Colon) => {
                let mut labels = Vec::new();
                while self.eat(&TokenKind::Colon) {
                    labels.push(self.name("a label name")?);
                }
                Ok(RemoveItem::Labels {
                    name,
                    token_position,
                    symbol: None,
                    labels,
                })
            }
            Some(TokenKind::Dot) => {
                self.advance();
                let property = self.name("a property name")?;
                Ok(RemoveItem::Property {
                    target: Box::new(Expr::PropertyLookup {
                        expression: Box::new(Expr::Identifier {
                            name,
                            token_position,
                            symbol: None,
                        }),
                        property,
                    }),
                })
            }
            _ => Err(self.error_here("expected ':' or '.' in REMOVE")),
        }
    }

    fn parse_projection_body(&mut self, is_with: bool) -> Result<ProjectionBody> {
        let distinct = self.eat(&TokenKind::Distinct);
        if self.check(&TokenKind::Star) {
            return Err(self.error_here("'*' projections are not supported"));
        }
        let mut items = vec![self.parse_named_expression()?];
        while self.eat(&TokenKind::Comma) {
            items.push(self.parse_named_expression()?);
        }
        let mut order_by = Vec::new();
        if self.eat(&TokenKind::Order) {
            self.expect(&TokenKind::By, "BY after ORDER")?;
            loop {
                let expression = self.parse_expr(0)?;
                let ascending = if self.eat(&TokenKind::Desc) {
                    false
                } else {
                    self.eat(&TokenKind::Asc);
                    true
                };
                order_by.push(OrderItem {
                    expression,
                    ascending,
                });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let skip = if self.eat(&TokenKind::Skip) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };
        let limit = if self.eat(&TokenKind::Limit) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };
        let where_clause = if is_with && self.eat(&TokenKind::Where) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };
        Ok(ProjectionBody {
            distinct,
            items,
            order_by,
            skip,
            limit,
            where_clause,
        })
    }

    fn parse_named_expression(&mut self) -> Result<NamedExpression> {
        let start = self.pos;
        let expression = self.parse_expr(0)?;
        if self.eat(&TokenKind::As) {
            let name = self.name("an alias")?;
            Ok(NamedExpression {
                name,
                expression,
                token_position: None,
                symbol: None,
            })
        } else {
            Ok(NamedExpression {
                name: self.slice(start, self.pos - 1),
                expression,
                token_position: Some(start),
                symbol: None,
            })
        }
    }

    // ---- patterns ---------------------------------------------------

    fn parse_patterns(&mut self) -> Result<Vec<Pattern>> {
        let mut patterns = vec![self.parse_pattern()?];
        while self.eat(&TokenKind::Comma) {
            patterns.push(self.parse_pattern()?);
        }
        Ok(patterns)
    }

    fn parse_pattern(&mut self) -> Result<Pattern> {
        let mut name = None;
        let mut name_token_position = None;
        if matches!(self.peek(), Some(TokenKind::Ident(_)))
            && self.peek_at(1) == Some(&TokenKind::Eq)
        {
            name_token_position = Some(self.pos);
            name = Some(self.name("a path name")?);
            self.advance();
        }
        let start = self.parse_node_atom()?;
        let mut steps = Vec::new();
        while matches!(self.peek(), Some(TokenKind::Lt) | Some(TokenKind::Minus)) {
            let edge = self.parse_edge_atom()?;
            let node = self.parse_node_atom()?;
            steps.push((edge, node));
        }
        Ok(Pattern {
            name,
            name_token_position,
            path_symbol: None,
            start,
            steps,
        })
    }

    fn parse_node_atom(&mut self) -> Result<NodeAtom> {
        self.expect(&TokenKind::LParen, "'(' to start a node pattern")?;
        let mut name = None;
        let mut token_position = None;
        if matches!(self.peek(), Some(TokenKind::Ident(_))) {
            token_position = Some(self.pos);
            name = Some(self.name("a name")?);
        }
        let mut labels = Vec::new();
        while self.eat(&TokenKind::Colon) {
            labels.push(self.name("a label name")?);
        }
        let properties = if self.check(&TokenKind::LBrace) {
            self.parse_property_map()?
        } else {
            Vec::new()
        };
        self.expect(&TokenKind::RParen, "')' to close a node pattern")?;
        Ok(NodeAtom {
            name,
            token_position,
            symbol: None,
            labels,
            properties,
        })
    }

    fn parse_edge_atom(&mut self) -> Result<EdgeAtom> {
        let left_arrow = self.eat(&TokenKind::Lt);
        self.expect(&TokenKind::Minus, "'-' in an edge pattern")?;
        let mut name = None;
        let mut token_position = None;
        let mut edge_types = Vec::new();
        let mut properties = Vec::new();
        let mut range = None;
        if self.eat(&TokenKind::LBracket) {
            if matches!(self.peek(), Some(TokenKind::Ident(_))) {
                token_position = Some(self.pos);
                name = Some(self.name("a name")?);
            }
            if self.eat(&TokenKind::Colon) {
                edge_types.push(self.name("an edge type")?);
                while self.eat(&TokenKind::Pipe) {
                    self.eat(&TokenKind::Colon);
                    edge_types.push(self.name("an edge type")?);
                }
            }
            if self.eat(&TokenKind::Star) {
                range = Some(self.parse_edge_range()?);
            }
            if self.check(&TokenKind::LBrace) {
                properties = self.parse_property_map()?;
            }
            self.expect(&TokenKind::RBracket, "']' to close an edge pattern")?;
        }
        self.expect(&TokenKind::Minus, "'-' in an edge pattern")?;
        let right_arrow = self.eat(&TokenKind::Gt);
        let direction = match (left_arrow, right_arrow) {
            (true, false) => Direction::In,
            (false, true) => Direction::Out,
            (false, false) => Direction::Both,
            (true, true) => {
                return Err(self.error_here("an edge cannot point in both directions"))
            }
        };
        Ok(EdgeAtom {
            name,
            token_position,
            symbol: None,
            direction,
            edge_types,
            properties,
            range,
        })
    }

    fn parse_edge_range(&mut self) -> Result<EdgeRange> {
        let breadth_first = match self.peek() {
            Some(TokenKind::Ident(word)) if word.eq_ignore_ascii_case("bfs") => {
                self.advance();
                true
            }
            _ => false,
        };
        let mut lower = None;
        if let Some(TokenKind::Integer(v)) = self.peek() {
            lower = Some(*v as u64);
            self.advance();
        }
        let upper = if self.eat(&TokenKind::DotDot) {
            match self.peek() {
                Some(TokenKind::Integer(v)) => {
                    let v = *v as u64;
                    self.advance();
                    Some(v)
                }
                _ => None,
            }
        } else {
            // A single bound fixes the depth.
            lower
        };
        Ok(EdgeRange {
            breadth_first,
            lower,
            upper,
        })
    }

    fn parse_property_map(&mut self) -> Result<Vec<(String, Expr)>> {
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut entries = Vec::new();
        if !self.check(&TokenKind::RBrace) {
            loop {
                let key = self.name("a property name")?;
                self.expect(&TokenKind::Colon, "':' after a property name")?;
                let value = self.parse_expr(0)?;
                entries.push((key, value));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(entries)
    }

    // ---- expressions ------------------------------------------------

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expr> {
        let mut lhs = match self.peek() {
            Some(TokenKind::Not) if BP_NOT >= min_bp => {
                self.advance();
                let operand = self.parse_expr(BP_NOT + 1)?;
                Expr::Unary {
                    op: UnaryOp::Not,
                    expression: Box::new(operand),
                }
            }
            Some(TokenKind::Minus) => {
                self.advance();
                let operand = self.parse_expr(BP_PREFIX)?;
                Expr::Unary {
                    op: UnaryOp::Minus,
                    expression: Box::new(operand),
                }
            }
            Some(TokenKind::Plus) => {
                self.advance();
                let operand = self.parse_expr(BP_PREFIX)?;
                Expr::Unary {
                    op: UnaryOp::Plus,
                    expression: Box::new(operand),
                }
            }
            _ => self.parse_primary()?,
        };
        loop {
            let (op, lbp, rbp) = match self.peek() {
                Some(TokenKind::Or) => (BinaryOp::Or, BP_OR, BP_OR + 1),
                Some(TokenKind::Xor) => (BinaryOp::Xor, BP_XOR, BP_XOR + 1),
                Some(TokenKind::And) => (BinaryOp::And, BP_AND, BP_AND + 1),
                Some(TokenKind::Eq) => (BinaryOp::Eq, BP_CMP, BP_CMP + 1),
                Some(TokenKind::NotEq) => (BinaryOp::NotEq, BP_CMP, BP_CMP + 1),
                Some(TokenKind::Lt) => (BinaryOp::Lt, BP_CMP, BP_CMP + 1),
                Some(TokenKind::LtEq) => (BinaryOp::LtEq, BP_CMP, BP_CMP + 1),
                Some(TokenKind::Gt) => (BinaryOp::Gt, BP_CMP, BP_CMP + 1),
                Some(TokenKind::GtEq) => (BinaryOp::GtEq, BP_CMP, BP_CMP + 1),
                Some(TokenKind::In) => (BinaryOp::In, BP_IN, BP_IN + 1),
                Some(TokenKind::Plus) => (BinaryOp::Add, BP_ADD, BP_ADD + 1),
                Some(TokenKind::Minus) => (BinaryOp::Sub, BP_ADD, BP_ADD + 1),
                Some(TokenKind::Star) => (BinaryOp::Mul, BP_MUL, BP_MUL + 1),
                Some(TokenKind::Slash) => (BinaryOp::Div, BP_MUL, BP_MUL + 1),
                Some(TokenKind::Percent) => (BinaryOp::Mod, BP_MUL, BP_MUL + 1),
                Some(TokenKind::Caret) => (BinaryOp::Pow, BP_POW, BP_POW),
                Some(TokenKind::Is) if BP_CMP >= min_bp => {
                    self.advance();
                    let negated = self.eat(&TokenKind::Not);
                    self.expect(&TokenKind::Null, "NULL after IS")?;
                    lhs = Expr::Unary {
                        op: if negated {
                            UnaryOp::IsNotNull
                        } else {
                            UnaryOp::IsNull
                        },
                        expression: Box::new(lhs),
                    };
                    continue;
                }
                Some(TokenKind::Dot) if BP_POSTFIX >= min_bp => {
                    self.advance();
                    let property = self.name("a property name")?;
                    lhs = Expr::PropertyLookup {
                        expression: Box::new(lhs),
                        property,
                    };
                    continue;
                }
                Some(TokenKind::Colon)
                    if BP_POSTFIX >= min_bp && matches!(lhs, Expr::Identifier { .. }) =>
                {
                    let mut labels = Vec::new();
                    while self.eat(&TokenKind::Colon) {
                        labels.push(self.name("a label name")?);
                    }
                    lhs = Expr::LabelsTest {
                        expression: Box::new(lhs),
                        labels,
                    };
                    continue;
                }
                _ => break,
            };
            if lbp < min_bp {
                break;
            }
            self.advance();
            let rhs = self.parse_expr(rbp)?;
            lhs = Expr::Binary {
                op,
                left: Box::new(lhs),
                right: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.peek().cloned() {
            Some(TokenKind::Integer(v)) => {
                self.advance();
                Ok(Expr::Literal(TypedValue::Int(v)))
            }
            Some(TokenKind::Float(v)) => {
                self.advance();
                Ok(Expr::Literal(TypedValue::Double(v)))
            }
            Some(TokenKind::Str(v)) => {
                self.advance();
                Ok(Expr::Literal(TypedValue::String(v)))
            }
            Some(TokenKind::True) => {
                self.advance();
                Ok(Expr::Literal(TypedValue::Bool(true)))
            }
            Some(TokenKind::False) => {
                self.advance();
                Ok(Expr::Literal(TypedValue::Bool(false)))
            }
            Some(TokenKind::Null) => {
                self.advance();
                Ok(Expr::Literal(TypedValue::Null))
            }
            Some(TokenKind::Param(name)) => {
                self.advance();
                Ok(Expr::Parameter { name })
            }
            Some(TokenKind::LParen) => {
                self.advance();
                let inner = self.parse_expr(0)?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            Some(TokenKind::LBrace) => {
                let entries = self.parse_property_map()?;
                Ok(Expr::MapLiteral(entries))
            }
            Some(TokenKind::LBracket) => self.parse_list_or_comprehension(),
            Some(TokenKind::Ident(name)) => {
                let token_position = self.pos;
                self.advance();
                if self.check(&TokenKind::LParen) {
                    self.parse_call(name)
                } else {
                    Ok(Expr::Identifier {
                        name,
                        token_position,
                        symbol: None,
                    })
                }
            }
            _ => Err(self.error_here("expected an expression")),
        }
    }

    fn parse_list_or_comprehension(&mut self) -> Result<Expr> {
        self.expect(&TokenKind::LBracket, "'['")?;
        if matches!(self.peek(), Some(TokenKind::Ident(_))) && self.peek_at(1) == Some(&TokenKind::In)
        {
            let token_position = self.pos;
            let name = self.name("a name")?;
            self.advance();
            let list = self.parse_expr(0)?;
            let where_clause = if self.eat(&TokenKind::Where) {
                Some(Box::new(self.parse_expr(0)?))
            } else {
                None
            };
            let output = if self.eat(&TokenKind::Pipe) {
                Some(Box::new(self.parse_expr(0)?))
            } else {
                None
            };
            self.expect(&TokenKind::RBracket, "']'")?;
            return Ok(Expr::ListComprehension {
                name,
                token_position,
                symbol: None,
                list: Box::new(list),
                where_clause,
                output,
            });
        }
        let mut items = Vec::new();
        if !self.check(&TokenKind::RBracket) {
            loop {
                items.push(self.parse_expr(0)?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RBracket, "']'")?;
        Ok(Expr::ListLiteral(items))
    }

    fn parse_call(&mut self, name: String) -> Result<Expr> {
        self.expect(&TokenKind::LParen, "'('")?;
        let aggregation = match name.to_ascii_lowercase().as_str() {
            "count" => Some(AggregationOp::Count),
            "sum" => Some(AggregationOp::Sum),
            "avg" => Some(AggregationOp::Avg),
            "min" => Some(AggregationOp::Min),
            "max" => Some(AggregationOp::Max),
            "collect" => Some(AggregationOp::Collect),
            _ => None,
        };
        if let Some(op) = aggregation {
            if op == AggregationOp::Count && self.eat(&TokenKind::Star) {
                self.expect(&TokenKind::RParen, "')'")?;
                return Ok(Expr::Aggregation {
                    op,
                    expression: None,
                    distinct: false,
                    symbol: None,
                });
            }
            let distinct = self.eat(&TokenKind::Distinct);
            let expression = self.parse_expr(0)?;
            self.expect(&TokenKind::RParen, "')'")?;
            return Ok(Expr::Aggregation {
                op,
                expression: Some(Box::new(expression)),
                distinct,
                symbol: None,
            });
        }
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expr(0)?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        Ok(Expr::Function { name, args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(source: &str) -> SingleQuery {
        parse(source).unwrap().single
    }

    #[test]
    fn parses_match_return() {
        let query = single("MATCH (n:Person {id: 1}) RETURN n");
        assert_eq!(query.clauses.len(), 2);
        let Clause::Match(m) = &query.clauses[0] else {
            panic!("expected MATCH");
        };
        assert!(!m.optional);
        assert_eq!(m.patterns[0].start.name.as_deref(), Some("n"));
        assert_eq!(m.patterns[0].start.labels, ["Person"]);
        assert_eq!(m.patterns[0].start.properties.len(), 1);
    }

    #[test]
    fn parses_edge_directions() {
        let query = single("MATCH (a)-[r:KNOWS]->(b), (a)<-[:LIKES]-(c), (a)-[]-(d) RETURN a");
        let Clause::Match(m) = &query.clauses[0] else {
            panic!("expected MATCH");
        };
        assert_eq!(m.patterns[0].steps[0].0.direction, Direction::Out);
        assert_eq!(m.patterns[1].steps[0].0.direction, Direction::In);
        assert_eq!(m.patterns[2].steps[0].0.direction, Direction::Both);
        assert_eq!(m.patterns[0].steps[0].0.edge_types, ["KNOWS"]);
    }

    #[test]
    fn parses_variable_length_and_bfs() {
        let query = single("MATCH (a)-[*1..3]->(b), (a)-[*bfs..5]->(c), (a)-[*2]->(d) RETURN a");
        let Clause::Match(m) = &query.clauses[0] else {
            panic!("expected MATCH");
        };
        assert_eq!(
            m.patterns[0].steps[0].0.range,
            Some(EdgeRange {
                breadth_first: false,
                lower: Some(1),
                upper: Some(3),
            })
        );
        assert_eq!(
            m.patterns[1].steps[0].0.range,
            Some(EdgeRange {
                breadth_first: true,
                lower: None,
                upper: Some(5),
            })
        );
        assert_eq!(
            m.patterns[2].steps[0].0.range,
            Some(EdgeRange {
                breadth_first: false,
                lower: Some(2),
                upper: Some(2),
            })
        );
    }

    #[test]
    fn parses_named_path() {
        let query = single("MATCH p = (a)-->(b) RETURN p");
        let Clause::Match(m) = &query.clauses[0] else {
            panic!("expected MATCH");
        };
        assert_eq!(m.patterns[0].name.as_deref(), Some("p"));
    }

    #[test]
    fn parses_projection_modifiers() {
        let query = single("MATCH (n) RETURN DISTINCT n.a AS a ORDER BY a DESC SKIP 1 LIMIT 2");
        let Clause::Return(body) = &query.clauses[1] else {
            panic!("expected RETURN");
        };
        assert!(body.distinct);
        assert_eq!(body.items[0].name, "a");
        assert!(body.items[0].token_position.is_none());
        assert!(!body.order_by[0].ascending);
        assert!(body.skip.is_some() && body.limit.is_some());
    }

    #[test]
    fn unaliased_projection_keeps_source_text_and_position() {
        let query = single("MATCH (n) RETURN n.name");
        let Clause::Return(body) = &query.clauses[1] else {
            panic!("expected RETURN");
        };
        assert_eq!(body.items[0].name, "n.name");
        assert_eq!(body.items[0].token_position, Some(5));
    }

    #[test]
    fn parses_merge_with_on_clauses() {
        let query =
            single("MERGE (n:Person {id: 1}) ON CREATE SET n.created = true ON MATCH SET n.seen = 2");
        let Clause::Merge(m) = &query.clauses[0] else {
            panic!("expected MERGE");
        };
        assert_eq!(m.on_create.len(), 1);
        assert_eq!(m.on_match.len(), 1);
    }

    #[test]
    fn parses_set_variants() {
        let query = single("MATCH (n) SET n.a = 1, n:Extra, n += {b: 2}, n = {c: 3}");
        let Clause::Set(items) = &query.clauses[1] else {
            panic!("expected SET");
        };
        assert!(matches!(items[0], SetItem::Property { .. }));
        assert!(matches!(items[1], SetItem::Labels { .. }));
        assert!(matches!(
            items[2],
            SetItem::AllProperties { update: true, .. }
        ));
        assert!(matches!(
            items[3],
            SetItem::AllProperties { update: false, .. }
        ));
    }

    #[test]
    fn parses_unwind_delete_foreach() {
        let query = single(
            "UNWIND [1, 2] AS x MATCH (n) DETACH DELETE n FOREACH (m IN [1] | CREATE (:L))",
        );
        assert!(matches!(query.clauses[0], Clause::Unwind(_)));
        assert!(matches!(
            query.clauses[2],
            Clause::Delete(DeleteClause { detach: true, .. })
        ));
        assert!(matches!(query.clauses[3], Clause::Foreach(_)));
    }

    #[test]
    fn parses_create_index() {
        let query = single("CREATE INDEX ON :Person(id)");
        let Clause::CreateIndex(ci) = &query.clauses[0] else {
            panic!("expected CREATE INDEX");
        };
        assert_eq!(ci.label, "Person");
        assert_eq!(ci.property, "id");
    }

    #[test]
    fn parses_expressions_with_precedence() {
        let query = single("RETURN 1 + 2 * 3 < 10 AND NOT false OR x IN [1]");
        let Clause::Return(body) = &query.clauses[0] else {
            panic!("expected RETURN");
        };
        // Top node must be OR.
        assert!(matches!(
            body.items[0].expression,
            Expr::Binary {
                op: BinaryOp::Or,
                ..
            }
        ));
    }

    #[test]
    fn parses_aggregations_and_comprehensions() {
        let query = single("RETURN count(*), sum(x), collect(DISTINCT y), [z IN [1] WHERE z > 0 | z]");
        let Clause::Return(body) = &query.clauses[0] else {
            panic!("expected RETURN");
        };
        assert!(matches!(
            body.items[0].expression,
            Expr::Aggregation {
                op: AggregationOp::Count,
                expression: None,
                ..
            }
        ));
        assert!(matches!(
            body.items[2].expression,
            Expr::Aggregation { distinct: true, .. }
        ));
        assert!(matches!(
            body.items[3].expression,
            Expr::ListComprehension { .. }
        ));
    }

    #[test]
    fn parses_union() {
        let query = parse("RETURN 1 AS x UNION ALL RETURN 2 AS x").unwrap();
        assert_eq!(query.unions.len(), 1);
        assert!(query.unions[0].all);
    }

    #[test]
    fn parses_explain_prefix() {
        assert!(parse("EXPLAIN MATCH (n) RETURN n").unwrap().explain);
    }

    #[test]
    fn syntax_errors_carry_location() {
        let err = parse("MATCH (n RETURN n").unwrap_err();
        let QueryError::Syntax { line, column, .. } = err else {
            panic!("expected syntax error");
        };
        assert_eq!(line, 1);
        assert!(column > 1);
    }

    #[test]
    fn is_null_binds_like_comparison() {
        let query = single("RETURN x IS NULL AND y IS NOT NULL");
        let Clause::Return(body) = &query.clauses[0] else {
            panic!("expected RETURN");
        };
        assert!(matches!(
            body.items[0].expression,
            Expr::Binary {
                op: BinaryOp::And,
                ..
            }
        ));
    }
}
