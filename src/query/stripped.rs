//! Query stripping: literal tokens are replaced with generated
//! parameter placeholders so structurally identical queries share one
//! cache entry.
//!
//! The stripped text preserves every byte outside the replaced literal
//! spans, so token positions recorded by the parser line up with the
//! maps produced here. Placeholders are named `$Ln` where `n` is the
//! token index of the placeholder in the stripped token stream.

use std::collections::HashMap;

use xxhash_rust::xxh64::xxh64;

use crate::error::Result;
use crate::query::lexer::{tokenize, Token, TokenKind};
use crate::query::typed_value::TypedValue;

#[derive(Debug, Clone)]
pub struct StrippedQuery {
    stripped: String,
    hash: u64,
    /// Placeholder name (without `$`) to the literal it replaced.
    literals: HashMap<String, TypedValue>,
    /// User-supplied parameter names, in order of first appearance.
    parameters: Vec<String>,
    /// Token index of an unaliased `RETURN`/`WITH` projection to its
    /// original source text, for header generation.
    named_expressions: HashMap<usize, String>,
}

impl StrippedQuery {
    pub fn new(query: &str) -> Result<Self> {
        let tokens = tokenize(query)?;
        let mut stripped = String::with_capacity(query.len());
        let mut literals = HashMap::new();
        let mut parameters: Vec<String> = Vec::new();
        // Kind and original span of every token in the stripped stream.
        let mut out_tokens: Vec<(TokenKind, usize, usize)> = Vec::new();

        let mut prev_end = 0;
        let mut index = 0;
        while index < tokens.len() {
            let token = &tokens[index];
            stripped.push_str(&query[prev_end..token.start]);
            let out_index = out_tokens.len();

            // Integers adjacent to `*` or `..` are variable-length
            // bounds, not values.
            let is_range_bound = matches!(token.kind, TokenKind::Integer(_))
                && (matches!(
                    index
                        .checked_sub(1)
                        .and_then(|i| tokens.get(i))
                        .map(|t| &t.kind),
                    Some(TokenKind::Star) | Some(TokenKind::DotDot)
                ) || tokens.get(index + 1).map(|t| &t.kind) == Some(&TokenKind::DotDot));
            if is_range_bound {
                stripped.push_str(&query[token.start..token.end]);
                out_tokens.push((token.kind.clone(), token.start, token.end));
                prev_end = token.end;
                index += 1;
                continue;
            }

            if token.kind == TokenKind::LBracket {
                if let Some((value, last)) = literal_list(&tokens, index) {
                    let name = format!("L{out_index}");
                    stripped.push('$');
                    stripped.push_str(&name);
                    out_tokens.push((
                        TokenKind::Param(name.clone()),
                        token.start,
                        tokens[last].end,
                    ));
                    literals.insert(name, value);
                    prev_end = tokens[last].end;
                    index = last + 1;
                    continue;
                }
            }

            match &token.kind {
                kind if kind.is_literal() => {
                    let value = match kind {
                        TokenKind::Integer(v) => TypedValue::Int(*v),
                        TokenKind::Float(v) => TypedValue::Double(*v),
                        TokenKind::Str(v) => TypedValue::String(v.clone()),
                        TokenKind::True => TypedValue::Bool(true),
                        TokenKind::False => TypedValue::Bool(false),
                        _ => unreachable!(),
                    };
                    let name = format!("L{out_index}");
                    stripped.push('$');
                    stripped.push_str(&name);
                    out_tokens.push((TokenKind::Param(name.clone()), token.start, token.end));
                    literals.insert(name, value);
                }
                TokenKind::Param(name) => {
                    if !parameters.contains(name) {
                        parameters.push(name.clone());
                    }
                    stripped.push_str(&query[token.start..token.end]);
                    out_tokens.push((token.kind.clone(), token.start, token.end));
                }
                _ => {
                    stripped.push_str(&query[token.start..token.end]);
                    out_tokens.push((token.kind.clone(), token.start, token.end));
                }
            }
            prev_end = token.end;
            index += 1;
        }
        stripped.push_str(&query[prev_end..]);

        let named_expressions = collect_named_expressions(query, &out_tokens);
        let hash = xxh64(stripped.as_bytes(), 0);
        Ok(Self {
            stripped,
            hash,
            literals,
            parameters,
            named_expressions,
        })
    }

    /// Canonical text with literals replaced by placeholders.
    pub fn query(&self) -> &str {
        &self.stripped
    }

    /// Stable fingerprint of the canonical text.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn literals(&self) -> &HashMap<String, TypedValue> {
        &self.literals
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn named_expressions(&self) -> &HashMap<usize, String> {
        &self.named_expressions
    }
}

/// Recognizes a bracketed list consisting solely of literals (with
/// optional sign on numbers) and returns its value with the index of the
/// closing bracket.
fn literal_list(tokens: &[Token], start: usize) -> Option<(TypedValue, usize)> {
    fn element(tokens: &[Token], mut i: usize) -> Option<(TypedValue, usize)> {
        let mut negate = false;
        if tokens.get(i)?.kind == TokenKind::Minus {
            negate = true;
            i += 1;
        }
        let value = match &tokens.get(i)?.kind {
            TokenKind::Integer(v) => TypedValue::Int(if negate { -v } else { *v }),
            TokenKind::Float(v) => TypedValue::Double(if negate { -v } else { *v }),
            TokenKind::Str(v) if !negate => TypedValue::String(v.clone()),
            TokenKind::True if !negate => TypedValue::Bool(true),
            TokenKind::False if !negate => TypedValue::Bool(false),
            TokenKind::Null if !negate => TypedValue::Null,
            TokenKind::LBracket if !negate => return literal_list(tokens, i),
            _ => return None,
        };
        Some((value, i))
    }

    debug_assert_eq!(tokens[start].kind, TokenKind::LBracket);
    let mut items = Vec::new();
    let mut i = start + 1;
    if tokens.get(i)?.kind == TokenKind::RBracket {
        return Some((TypedValue::List(items), i));
    }
    loop {
        let (value, last) = element(tokens, i)?;
        items.push(value);
        i = last + 1;
        match &tokens.get(i)?.kind {
            TokenKind::Comma => i += 1,
            TokenKind::RBracket => return Some((TypedValue::List(items), i)),
            _ => return None,
        }
    }
}

/// Records the original text of every `RETURN`/`WITH` projection that
/// has no `AS` alias, keyed by the token index where it starts.
fn collect_named_expressions(
    query: &str,
    out_tokens: &[(TokenKind, usize, usize)],
) -> HashMap<usize, String> {
    use TokenKind::*;
    let ends_clause = |kind: &TokenKind| {
        matches!(
            kind,
            Match | Optional | Merge | Create | Set | Remove | Delete | Detach | With | Return
                | Unwind | Foreach | Union | Where | Order | Skip | Limit | Semicolon
        )
    };

    let mut named = HashMap::new();
    let mut i = 0;
    while i < out_tokens.len() {
        if !matches!(out_tokens[i].0, Return | With) {
            i += 1;
            continue;
        }
        i += 1;
        if matches!(out_tokens.get(i).map(|t| &t.0), Some(Distinct)) {
            i += 1;
        }
        // Walk the projection list.
        loop {
            let start = i;
            let mut depth = 0usize;
            let mut aliased = false;
            let mut end = start;
            while i < out_tokens.len() {
                let kind = &out_tokens[i].0;
                match kind {
                    LParen | LBracket | LBrace => depth += 1,
                    RParen | RBracket | RBrace => depth = depth.saturating_sub(1),
                    As if depth == 0 => {
                        aliased = true;
                        break;
                    }
                    Comma if depth == 0 => break,
                    kind if depth == 0 && ends_clause(kind) => break,
                    _ => {}
                }
                end = i;
                i += 1;
            }
            if !aliased && end >= start && start < out_tokens.len() {
                let span_start = out_tokens[start].1;
                let span_end = out_tokens[end].2;
                if span_end > span_start {
                    named.insert(start, query[span_start..span_end].trim().to_owned());
                }
            }
            // Skip past the alias or on to the next projection.
            while i < out_tokens.len() {
                let kind = &out_tokens[i].0;
                if *kind == Comma {
                    i += 1;
                    break;
                }
                if ends_clause(kind) {
                    break;
                }
                i += 1;
            }
            if i >= out_tokens.len() || ends_clause(&out_tokens[i].0) {
                break;
            }
        }
    }
    named
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_values_do_not_change_the_hash() {
        let a = StrippedQuery::new("RETURN 1").unwrap();
        let b = StrippedQuery::new("RETURN 2").unwrap();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.query(), b.query());
    }

    #[test]
    fn placeholders_are_named_by_token_position() {
        let stripped = StrippedQuery::new("RETURN 1").unwrap();
        assert_eq!(stripped.query(), "RETURN $L1");
        assert_eq!(
            stripped.literals().get("L1"),
            Some(&TypedValue::Int(1))
        );
    }

    #[test]
    fn strings_booleans_and_lists_are_stripped() {
        let stripped =
            StrippedQuery::new("RETURN 'x', true, [1, -2.5, 'y']").unwrap();
        assert_eq!(stripped.query(), "RETURN $L1, $L3, $L5");
        assert_eq!(stripped.literals().len(), 3);
        assert_eq!(
            stripped.literals().get("L5"),
            Some(&TypedValue::List(vec![
                TypedValue::Int(1),
                TypedValue::Double(-2.5),
                TypedValue::String("y".into()),
            ]))
        );
    }

    #[test]
    fn mixed_lists_strip_each_element() {
        let stripped = StrippedQuery::new("RETURN [1, x]").unwrap();
        assert_eq!(stripped.query(), "RETURN [$L2, x]");
    }

    #[test]
    fn variable_length_bounds_are_not_stripped() {
        let stripped = StrippedQuery::new("MATCH (a)-[*1..3]->(b) RETURN a").unwrap();
        assert_eq!(stripped.query(), "MATCH (a)-[*1..3]->(b) RETURN a");
        assert!(stripped.literals().is_empty());

        let named = StrippedQuery::new("MATCH (a)-[r *bfs..3]->(b), (a)-[*2]->(c) RETURN a")
            .unwrap();
        assert_eq!(
            named.query(),
            "MATCH (a)-[r *bfs..3]->(b), (a)-[*2]->(c) RETURN a"
        );
        assert!(named.literals().is_empty());
    }

    #[test]
    fn user_parameters_are_recorded_and_preserved() {
        let stripped = StrippedQuery::new("MATCH (n) WHERE n.id = $id RETURN n").unwrap();
        assert_eq!(stripped.parameters(), ["id".to_owned()]);
        assert!(stripped.query().contains("$id"));
    }

    #[test]
    fn unaliased_projections_keep_their_source_text() {
        let stripped = StrippedQuery::new("MATCH (n) RETURN n.name, n.age AS age, 1").unwrap();
        let texts: Vec<_> = stripped.named_expressions().values().cloned().collect();
        assert!(texts.contains(&"n.name".to_owned()));
        assert!(texts.contains(&"1".to_owned()));
        assert!(!texts.iter().any(|t| t.contains("age AS")));
        assert_eq!(stripped.named_expressions().len(), 2);
    }

    #[test]
    fn whitespace_and_comments_are_preserved() {
        let stripped = StrippedQuery::new("RETURN /* c */ 1  ,2").unwrap();
        assert_eq!(stripped.query(), "RETURN /* c */ $L1  ,$L3");
    }
}
