//! Evaluation of native filter, sort and projection documents.
//!
//! Supports the subset of the query language produced by the translators:
//! `$and`, `$or`, implicit equality, `$eq`, `$ne`, `$gt`, `$gte`, `$lt`,
//! `$lte`, `$in`, `$nin`, `$exists`, `$regex` with `$options`, and
//! `$elemMatch`. Dotted paths descend into sub-documents and across arrays.

use std::cmp::Ordering;

use bson::{Bson, Document};
use regex::{Regex, RegexBuilder};

use crate::error::BackendError;

/// Returns `true` if `doc` satisfies `filter`.
pub(crate) fn matches(doc: &Document, filter: &Document) -> Result<bool, BackendError> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(doc, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for clause in clauses(key, condition)? {
                    if matches(doc, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            op if op.starts_with('$') => return Err(unsupported(op)),
            path => field_matches(&resolve(doc, path), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(op: &str, condition: &'a Bson) -> Result<Vec<&'a Document>, BackendError> {
    let Bson::Array(items) = condition else {
        return Err(query_error(format!("{} expects an array", op)));
    };
    items
        .iter()
        .map(|item| match item {
            Bson::Document(clause) => Ok(clause),
            _ => Err(query_error(format!("{} expects documents", op))),
        })
        .collect()
}

/// Collects the values reached by a dotted path.
///
/// Arrays met along the path are traversed element by element. An empty
/// result means the field is missing.
pub(crate) fn resolve<'a>(doc: &'a Document, path: &str) -> Vec<&'a Bson> {
    let parts: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some(value) = doc.get(parts[0]) {
        resolve_value(value, &parts[1..], &mut out);
    }
    out
}

fn resolve_value<'a>(value: &'a Bson, parts: &[&str], out: &mut Vec<&'a Bson>) {
    let Some((head, rest)) = parts.split_first() else {
        out.push(value);
        return;
    };
    match value {
        Bson::Document(doc) => {
            if let Some(next) = doc.get(*head) {
                resolve_value(next, rest, out);
            }
        }
        Bson::Array(items) => {
            if let Ok(index) = head.parse::<usize>() {
                if let Some(next) = items.get(index) {
                    resolve_value(next, rest, out);
                }
                return;
            }
            for item in items {
                if let Bson::Document(_) = item {
                    resolve_value(item, parts, out);
                }
            }
        }
        _ => {}
    }
}

fn is_operator_doc(doc: &Document) -> bool {
    !doc.is_empty() && doc.keys().all(|k| k.starts_with('$'))
}

fn field_matches(values: &[&Bson], condition: &Bson) -> Result<bool, BackendError> {
    match condition {
        Bson::Document(ops) if is_operator_doc(ops) => operators_match(values, ops),
        _ => Ok(equals_any(values, condition)),
    }
}

fn operators_match(values: &[&Bson], ops: &Document) -> Result<bool, BackendError> {
    for (op, operand) in ops {
        let ok = match op.as_str() {
            "$eq" => equals_any(values, operand),
            "$ne" => !equals_any(values, operand),
            "$gt" => compares_any(values, operand, |o| o == Ordering::Greater),
            "$gte" => compares_any(values, operand, |o| o != Ordering::Less),
            "$lt" => compares_any(values, operand, |o| o == Ordering::Less),
            "$lte" => compares_any(values, operand, |o| o != Ordering::Greater),
            "$in" => in_list(values, op, operand)?,
            "$nin" => !in_list(values, op, operand)?,
            "$exists" => truthy(operand) == !values.is_empty(),
            "$regex" => {
                let options = match ops.get("$options") {
                    Some(Bson::String(options)) => options.as_str(),
                    _ => "",
                };
                let re = compile_regex(operand, options)?;
                expand(values)
                    .into_iter()
                    .any(|v| matches!(v, Bson::String(s) if re.is_match(s)))
            }
            "$options" => true,
            "$elemMatch" => elem_match(values, operand)?,
            other => return Err(unsupported(other)),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Values plus the elements of array values, as compared by element-wise operators.
fn expand<'a>(values: &[&'a Bson]) -> Vec<&'a Bson> {
    let mut out = Vec::with_capacity(values.len());
    for &value in values {
        out.push(value);
        if let Bson::Array(items) = value {
            out.extend(items.iter());
        }
    }
    out
}

fn equals_any(values: &[&Bson], target: &Bson) -> bool {
    if values.is_empty() {
        return matches!(target, Bson::Null);
    }
    expand(values).into_iter().any(|v| values_equal(v, target))
}

fn compares_any(values: &[&Bson], target: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    expand(values)
        .into_iter()
        .any(|v| compare_values(v, target).is_some_and(&accept))
}

fn in_list(values: &[&Bson], op: &str, operand: &Bson) -> Result<bool, BackendError> {
    let Bson::Array(candidates) = operand else {
        return Err(query_error(format!("{} expects an array", op)));
    };
    Ok(candidates.iter().any(|c| equals_any(values, c)))
}

fn elem_match(values: &[&Bson], operand: &Bson) -> Result<bool, BackendError> {
    let Bson::Document(condition) = operand else {
        return Err(query_error("$elemMatch expects a document".to_string()));
    };
    for value in values {
        let Bson::Array(items) = value else {
            continue;
        };
        for item in items {
            let ok = if is_operator_doc(condition) {
                operators_match(&[item], condition)?
            } else {
                match item {
                    Bson::Document(element) => matches(element, condition)?,
                    _ => false,
                }
            };
            if ok {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn compile_regex(pattern: &Bson, options: &str) -> Result<Regex, BackendError> {
    let (pattern, options) = match pattern {
        Bson::String(p) => (p.as_str(), options),
        Bson::RegularExpression(re) => (re.pattern.as_str(), re.options.as_str()),
        _ => return Err(query_error("$regex expects a string".to_string())),
    };
    RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
        .map_err(|e| query_error(format!("invalid $regex: {}", e)))
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null => false,
        other => as_f64(other).is_none_or(|n| n != 0.0),
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Double(f64),
}

impl Number {
    fn is_nan(self) -> bool {
        matches!(self, Number::Double(d) if d.is_nan())
    }
}

fn as_number(value: &Bson) -> Option<Number> {
    match value {
        Bson::Int32(n) => Some(Number::Int(i64::from(*n))),
        Bson::Int64(n) => Some(Number::Int(*n)),
        Bson::Double(n) => Some(Number::Double(*n)),
        _ => None,
    }
}

/// Total order on numbers: integers compare exactly, NaN sorts below every number.
fn compare_numbers(a: Number, b: Number) -> Ordering {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => x.cmp(&y),
        (Number::Double(x), Number::Double(y)) => compare_doubles(x, y),
        (Number::Int(x), Number::Double(y)) => compare_int_double(x, y),
        (Number::Double(x), Number::Int(y)) => compare_int_double(y, x).reverse(),
    }
}

fn compare_doubles(x: f64, y: f64) -> Ordering {
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        // -0.0 and 0.0 are equal
        (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
    }
}

/// Compares an integer with a double without rounding the integer.
fn compare_int_double(i: i64, d: f64) -> Ordering {
    // 2^63, exactly representable
    const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

    if d.is_nan() {
        return Ordering::Greater;
    }
    if d >= I64_BOUND {
        return Ordering::Less;
    }
    if d < -I64_BOUND {
        return Ordering::Greater;
    }
    let whole = d.trunc();
    match i.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0_f64
            .partial_cmp(&(d - whole))
            .unwrap_or(Ordering::Equal),
        other => other,
    }
}

/// Equality with numbers compared across their representations.
pub(crate) fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => compare_numbers(x, y) == Ordering::Equal,
        _ => a == b,
    }
}

/// Orders two values of comparable types, `None` otherwise.
///
/// NaN only compares with NaN, so range operators never match it against a number.
fn compare_values(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        if x.is_nan() != y.is_nan() {
            return None;
        }
        return Some(compare_numbers(x, y));
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn type_rank(value: Option<&Bson>) -> u8 {
    match value {
        None | Some(Bson::Null) | Some(Bson::Undefined) => 1,
        Some(Bson::Int32(_)) | Some(Bson::Int64(_)) | Some(Bson::Double(_)) => 2,
        Some(Bson::String(_)) | Some(Bson::Symbol(_)) => 3,
        Some(Bson::Document(_)) => 4,
        Some(Bson::Array(_)) => 5,
        Some(Bson::Binary(_)) => 6,
        Some(Bson::ObjectId(_)) => 7,
        Some(Bson::Boolean(_)) => 8,
        Some(Bson::DateTime(_)) => 9,
        Some(Bson::Timestamp(_)) => 10,
        Some(Bson::RegularExpression(_)) => 11,
        Some(_) => 12,
    }
}

fn as_text(value: &Bson) -> Option<&str> {
    match value {
        Bson::String(s) | Bson::Symbol(s) => Some(s),
        _ => None,
    }
}

/// Total order used for sorting: by type rank, then by value within a rank.
fn sort_cmp(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    type_rank(a).cmp(&type_rank(b)).then_with(|| {
        let (Some(x), Some(y)) = (a, b) else {
            return Ordering::Equal;
        };
        if let (Some(m), Some(n)) = (as_number(x), as_number(y)) {
            return compare_numbers(m, n);
        }
        if let (Some(s), Some(t)) = (as_text(x), as_text(y)) {
            return s.cmp(t);
        }
        compare_values(x, y).unwrap_or(Ordering::Equal)
    })
}

/// Sorts documents in place by a native sort document.
///
/// The sort is stable, so documents with equal keys keep their order.
pub(crate) fn sort_documents(docs: &mut [Document], sort: &Document) {
    if sort.is_empty() {
        return;
    }
    let keys: Vec<(&str, bool)> = sort
        .iter()
        .map(|(field, direction)| (field.as_str(), as_f64(direction).is_some_and(|d| d < 0.0)))
        .collect();
    docs.sort_by(|a, b| {
        for (field, descending) in &keys {
            let left = resolve(a, field).first().copied();
            let right = resolve(b, field).first().copied();
            let ordering = sort_cmp(left, right);
            let ordering = if *descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// Applies an inclusion projection on top-level fields. `_id` is kept unless excluded.
pub(crate) fn project(doc: Document, projection: &Document) -> Document {
    let keep_id = projection.get("_id").is_none_or(truthy);
    doc.into_iter()
        .filter(|(key, _)| {
            if key == "_id" {
                keep_id
            } else {
                projection.get(key).is_some_and(truthy)
            }
        })
        .collect()
}

fn unsupported(op: &str) -> BackendError {
    query_error(format!("unsupported operator {}", op))
}

fn query_error(message: String) -> BackendError {
    BackendError::QueryError { message }
}
