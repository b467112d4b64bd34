//! Expression evaluation against a frame.
//!
//! Aggregation nodes are not computed here: the `Aggregate` operator
//! fills their output slots, and evaluation just reads them back.

use std::collections::BTreeMap;

use crate::error::{QueryError, Result};
use crate::query::ast::{BinaryOp, Expr, UnaryOp};
use crate::query::context::ExecutionContext;
use crate::query::frame::Frame;
use crate::query::typed_value::TypedValue;

pub fn eval(expression: &Expr, frame: &mut Frame, ctx: &ExecutionContext) -> Result<TypedValue> {
    match expression {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Parameter { name } => ctx
            .parameters
            .get(name)
            .cloned()
            .ok_or_else(|| QueryError::UnprovidedParameter(name.clone())),
        Expr::Identifier { name, symbol, .. } => match symbol {
            Some(symbol) => Ok(frame[symbol].clone()),
            None => Err(QueryError::runtime(format!(
                "variable '{name}' was not resolved"
            ))),
        },
        Expr::PropertyLookup {
            expression,
            property,
        } => {
            let value = eval(expression, frame, ctx)?;
            property_lookup(&value, property, ctx)
        }
        Expr::LabelsTest { expression, labels } => {
            let value = eval(expression, frame, ctx)?;
            match value {
                TypedValue::Null => Ok(TypedValue::Null),
                TypedValue::Vertex(id) => {
                    let catalog = &ctx.accessor.store().catalog;
                    let present = ctx.accessor.vertex_labels(id);
                    let all = labels
                        .iter()
                        .all(|name| present.contains(&catalog.label(name)));
                    Ok(TypedValue::Bool(all))
                }
                other => Err(QueryError::runtime(format!(
                    "label test on a {}",
                    other.type_name()
                ))),
            }
        }
        Expr::Function { name, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, frame, ctx)?);
            }
            call_function(name, values, ctx)
        }
        Expr::Aggregation { op, symbol, .. } => match symbol {
            Some(symbol) => Ok(frame[symbol].clone()),
            None => Err(QueryError::runtime(format!(
                "{}() was not resolved",
                op.name()
            ))),
        },
        Expr::ListLiteral(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval(item, frame, ctx)?);
            }
            Ok(TypedValue::List(values))
        }
        Expr::MapLiteral(entries) => {
            let mut map = BTreeMap::new();
            for (key, value) in entries {
                map.insert(key.clone(), eval(value, frame, ctx)?);
            }
            Ok(TypedValue::Map(map))
        }
        Expr::ListComprehension {
            symbol,
            list,
            where_clause,
            output,
            name,
            ..
        } => {
            let symbol = symbol.as_ref().ok_or_else(|| {
                QueryError::runtime(format!("comprehension variable '{name}' was not resolved"))
            })?;
            let input = eval(list, frame, ctx)?;
            let items = match input {
                TypedValue::Null => return Ok(TypedValue::Null),
                TypedValue::List(items) => items,
                other => {
                    return Err(QueryError::runtime(format!(
                        "list comprehension over a {}",
                        other.type_name()
                    )))
                }
            };
            let saved = frame[symbol].clone();
            let mut result = Vec::new();
            for item in items {
                frame[symbol] = item.clone();
                if let Some(predicate) = where_clause {
                    let keep = eval(predicate, frame, ctx)?;
                    if !matches!(keep, TypedValue::Bool(true)) {
                        continue;
                    }
                }
                let value = match output {
                    Some(output) => eval(output, frame, ctx)?,
                    None => item,
                };
                result.push(value);
            }
            frame[symbol] = saved;
            Ok(TypedValue::List(result))
        }
        Expr::Unary { op, expression } => {
            let value = eval(expression, frame, ctx)?;
            match op {
                UnaryOp::Not => match value {
                    TypedValue::Null => Ok(TypedValue::Null),
                    TypedValue::Bool(v) => Ok(TypedValue::Bool(!v)),
                    other => Err(QueryError::runtime(format!(
                        "NOT applied to a {}",
                        other.type_name()
                    ))),
                },
                UnaryOp::Minus => value.neg(),
                UnaryOp::Plus => match value {
                    TypedValue::Null | TypedValue::Int(_) | TypedValue::Double(_) => Ok(value),
                    other => Err(QueryError::runtime(format!(
                        "unary '+' applied to a {}",
                        other.type_name()
                    ))),
                },
                UnaryOp::IsNull => Ok(TypedValue::Bool(value.is_null())),
                UnaryOp::IsNotNull => Ok(TypedValue::Bool(!value.is_null())),
            }
        }
        Expr::Binary { op, left, right } => eval_binary(*op, left, right, frame, ctx),
    }
}

fn eval_binary(
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    frame: &mut Frame,
    ctx: &ExecutionContext,
) -> Result<TypedValue> {
    use TypedValue::*;
    let a = eval(left, frame, ctx)?;
    // Logic operators get their own short-circuit-free three-valued
    // treatment; everything else evaluates both sides up front.
    let b = eval(right, frame, ctx)?;
    match op {
        BinaryOp::And => match (bool_or_null(&a, "AND")?, bool_or_null(&b, "AND")?) {
            (Some(false), _) | (_, Some(false)) => Ok(Bool(false)),
            (Some(true), Some(true)) => Ok(Bool(true)),
            _ => Ok(Null),
        },
        BinaryOp::Or => match (bool_or_null(&a, "OR")?, bool_or_null(&b, "OR")?) {
            (Some(true), _) | (_, Some(true)) => Ok(Bool(true)),
            (Some(false), Some(false)) => Ok(Bool(false)),
            _ => Ok(Null),
        },
        BinaryOp::Xor => match (bool_or_null(&a, "XOR")?, bool_or_null(&b, "XOR")?) {
            (Some(x), Some(y)) => Ok(Bool(x ^ y)),
            _ => Ok(Null),
        },
        BinaryOp::Eq => Ok(a.tri_eq(&b)),
        BinaryOp::NotEq => match a.tri_eq(&b) {
            Bool(v) => Ok(Bool(!v)),
            other => Ok(other),
        },
        BinaryOp::Lt => Ok(cmp_result(&a, &b, |o| o.is_lt())),
        BinaryOp::LtEq => Ok(cmp_result(&a, &b, |o| o.is_le())),
        BinaryOp::Gt => Ok(cmp_result(&a, &b, |o| o.is_gt())),
        BinaryOp::GtEq => Ok(cmp_result(&a, &b, |o| o.is_ge())),
        BinaryOp::In => match b {
            Null => Ok(Null),
            List(items) => {
                let mut saw_null = false;
                for item in &items {
                    match a.tri_eq(item) {
                        Bool(true) => return Ok(Bool(true)),
                        Null => saw_null = true,
                        _ => {}
                    }
                }
                Ok(if saw_null { Null } else { Bool(false) })
            }
            other => Err(QueryError::runtime(format!(
                "IN expects a list, got a {}",
                other.type_name()
            ))),
        },
        BinaryOp::Add => a.add(&b),
        BinaryOp::Sub => a.sub(&b),
        BinaryOp::Mul => a.mul(&b),
        BinaryOp::Div => a.div(&b),
        BinaryOp::Mod => a.rem(&b),
        BinaryOp::Pow => match (&a, &b) {
            (Null, _) | (_, Null) => Ok(Null),
            _ => match (number(&a), number(&b)) {
                (Some(x), Some(y)) => Ok(Double(x.powf(y))),
                _ => Err(QueryError::runtime(format!(
                    "cannot raise a {} to a {}",
                    a.type_name(),
                    b.type_name()
                ))),
            },
        },
    }
}

fn number(value: &TypedValue) -> Option<f64> {
    match value {
        TypedValue::Int(v) => Some(*v as f64),
        TypedValue::Double(v) => Some(*v),
        _ => None,
    }
}

fn bool_or_null(value: &TypedValue, op: &str) -> Result<Option<bool>> {
    match value {
        TypedValue::Null => Ok(None),
        TypedValue::Bool(v) => Ok(Some(*v)),
        other => Err(QueryError::runtime(format!(
            "{op} applied to a {}",
            other.type_name()
        ))),
    }
}

fn cmp_result(
    a: &TypedValue,
    b: &TypedValue,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> TypedValue {
    match a.tri_cmp(b) {
        Some(ordering) => TypedValue::Bool(accept(ordering)),
        None => TypedValue::Null,
    }
}

fn property_lookup(
    value: &TypedValue,
    property: &str,
    ctx: &ExecutionContext,
) -> Result<TypedValue> {
    match value {
        TypedValue::Null => Ok(TypedValue::Null),
        TypedValue::Vertex(id) => {
            let property = ctx.accessor.store().catalog.property(property);
            Ok(ctx
                .accessor
                .vertex_property(*id, property)
                .map(TypedValue::from)
                .unwrap_or(TypedValue::Null))
        }
        TypedValue::Edge(id) => {
            let property = ctx.accessor.store().catalog.property(property);
            Ok(ctx
                .accessor
                .edge_property(*id, property)
                .map(TypedValue::from)
                .unwrap_or(TypedValue::Null))
        }
        TypedValue::Map(entries) => Ok(entries.get(property).cloned().unwrap_or(TypedValue::Null)),
        other => Err(QueryError::runtime(format!(
            "property lookup on a {}",
            other.type_name()
        ))),
    }
}

fn call_function(name: &str, args: Vec<TypedValue>, ctx: &ExecutionContext) -> Result<TypedValue> {
    use TypedValue::*;
    let arity = |expected: usize| {
        if args.len() == expected {
            Ok(())
        } else {
            Err(QueryError::runtime(format!(
                "{name}() expects {expected} argument(s), got {}",
                args.len()
            )))
        }
    };
    match name.to_ascii_lowercase().as_str() {
        "id" => {
            arity(1)?;
            match &args[0] {
                Null => Ok(Null),
                Vertex(id) => Ok(Int(id.0 as i64)),
                Edge(id) => Ok(Int(id.0 as i64)),
                other => Err(QueryError::runtime(format!(
                    "id() expects a vertex or an edge, got a {}",
                    other.type_name()
                ))),
            }
        }
        "type" => {
            arity(1)?;
            match &args[0] {
                Null => Ok(Null),
                Edge(id) => {
                    let data = ctx
                        .accessor
                        .edge_data(*id)
                        .ok_or_else(|| QueryError::runtime("edge no longer visible"))?;
                    Ok(String(ctx.accessor.store().catalog.edge_type_name(data.edge_type)))
                }
                other => Err(QueryError::runtime(format!(
                    "type() expects an edge, got a {}",
                    other.type_name()
                ))),
            }
        }
        "labels" => {
            arity(1)?;
            match &args[0] {
                Null => Ok(Null),
                Vertex(id) => {
                    let catalog = &ctx.accessor.store().catalog;
                    Ok(List(
                        ctx.accessor
                            .vertex_labels(*id)
                            .into_iter()
                            .map(|label| String(catalog.label_name(label)))
                            .collect(),
                    ))
                }
                other => Err(QueryError::runtime(format!(
                    "labels() expects a vertex, got a {}",
                    other.type_name()
                ))),
            }
        }
        "keys" => {
            arity(1)?;
            let catalog = &ctx.accessor.store().catalog;
            match &args[0] {
                Null => Ok(Null),
                Vertex(id) => Ok(List(
                    ctx.accessor
                        .vertex_properties(*id)
                        .keys()
                        .map(|&prop| String(catalog.property_name(prop)))
                        .collect(),
                )),
                Edge(id) => Ok(List(
                    ctx.accessor
                        .edge_data(*id)
                        .map(|data| data.properties)
                        .unwrap_or_default()
                        .keys()
                        .map(|&prop| String(catalog.property_name(prop)))
                        .collect(),
                )),
                Map(entries) => Ok(List(entries.keys().cloned().map(String).collect())),
                other => Err(QueryError::runtime(format!(
                    "keys() expects a vertex, edge, or map, got a {}",
                    other.type_name()
                ))),
            }
        }
        "size" => {
            arity(1)?;
            match &args[0] {
                Null => Ok(Null),
                List(items) => Ok(Int(items.len() as i64)),
                String(text) => Ok(Int(text.chars().count() as i64)),
                Map(entries) => Ok(Int(entries.len() as i64)),
                other => Err(QueryError::runtime(format!(
                    "size() expects a list, string, or map, got a {}",
                    other.type_name()
                ))),
            }
        }
        "coalesce" => Ok(args.into_iter().find(|v| !v.is_null()).unwrap_or(Null)),
        "abs" => {
            arity(1)?;
            match &args[0] {
                Null => Ok(Null),
                Int(v) => Ok(Int(v.abs())),
                Double(v) => Ok(Double(v.abs())),
                other => Err(QueryError::runtime(format!(
                    "abs() expects a number, got a {}",
                    other.type_name()
                ))),
            }
        }
        "sqrt" => {
            arity(1)?;
            match number(&args[0]) {
                Some(v) => Ok(Double(v.sqrt())),
                None if args[0].is_null() => Ok(Null),
                None => Err(QueryError::runtime("sqrt() expects a number")),
            }
        }
        "tostring" => {
            arity(1)?;
            match &args[0] {
                Null => Ok(Null),
                String(v) => Ok(String(v.clone())),
                Int(v) => Ok(String(v.to_string())),
                Double(v) => Ok(String(v.to_string())),
                Bool(v) => Ok(String(v.to_string())),
                other => Err(QueryError::runtime(format!(
                    "toString() cannot convert a {}",
                    other.type_name()
                ))),
            }
        }
        "tointeger" => {
            arity(1)?;
            match &args[0] {
                Null => Ok(Null),
                Int(v) => Ok(Int(*v)),
                Double(v) => Ok(Int(*v as i64)),
                String(v) => Ok(v.trim().parse::<i64>().map(Int).unwrap_or(Null)),
                other => Err(QueryError::runtime(format!(
                    "toInteger() cannot convert a {}",
                    other.type_name()
                ))),
            }
        }
        "tofloat" => {
            arity(1)?;
            match &args[0] {
                Null => Ok(Null),
                Int(v) => Ok(Double(*v as f64)),
                Double(v) => Ok(Double(*v)),
                String(v) => Ok(v.trim().parse::<f64>().map(Double).unwrap_or(Null)),
                other => Err(QueryError::runtime(format!(
                    "toFloat() cannot convert a {}",
                    other.type_name()
                ))),
            }
        }
        "startnode" | "endnode" => {
            arity(1)?;
            match &args[0] {
                Null => Ok(Null),
                Edge(id) => {
                    let data = ctx
                        .accessor
                        .edge_data(*id)
                        .ok_or_else(|| QueryError::runtime("edge no longer visible"))?;
                    Ok(Vertex(if name.eq_ignore_ascii_case("startnode") {
                        data.from
                    } else {
                        data.to
                    }))
                }
                other => Err(QueryError::runtime(format!(
                    "{name}() expects an edge, got a {}",
                    other.type_name()
                ))),
            }
        }
        "nodes" => {
            arity(1)?;
            match &args[0] {
                Null => Ok(Null),
                Path(path) => Ok(List(path.vertices.iter().map(|&v| Vertex(v)).collect())),
                other => Err(QueryError::runtime(format!(
                    "nodes() expects a path, got a {}",
                    other.type_name()
                ))),
            }
        }
        "relationships" => {
            arity(1)?;
            match &args[0] {
                Null => Ok(Null),
                Path(path) => Ok(List(path.edges.iter().map(|&e| Edge(e)).collect())),
                other => Err(QueryError::runtime(format!(
                    "relationships() expects a path, got a {}",
                    other.type_name()
                ))),
            }
        }
        "range" => {
            if args.len() < 2 || args.len() > 3 {
                return Err(QueryError::runtime("range() expects two or three arguments"));
            }
            let as_int = |v: &TypedValue| match v {
                Int(v) => Ok(*v),
                other => Err(QueryError::runtime(format!(
                    "range() expects integers, got a {}",
                    other.type_name()
                ))),
            };
            let lo = as_int(&args[0])?;
            let hi = as_int(&args[1])?;
            let step = if args.len() == 3 { as_int(&args[2])? } else { 1 };
            if step == 0 {
                return Err(QueryError::runtime("range() step cannot be zero"));
            }
            let mut items = Vec::new();
            let mut v = lo;
            while (step > 0 && v <= hi) || (step < 0 && v >= hi) {
                items.push(Int(v));
                v += step;
            }
            Ok(List(items))
        }
        other => Err(QueryError::runtime(format!("unknown function '{other}'"))),
    }
}
