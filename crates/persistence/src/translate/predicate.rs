//! Predicate translation into native filter documents.
//!
//! Each [`Expression`] becomes one key of the filter document. Expressions
//! sharing a predicate are an implicit conjunction, so when two of them
//! produce the same key the translator merges them without weakening the
//! filter: operator documents with disjoint operators are combined
//! (`{f: {$gt: 1, $lt: 5}}`), anything else is moved under `$and`.

use bson::{Bson, Document, doc};

use crate::error::QueryError;
use crate::types::{Expression, Operand, Predicate};

use super::field::FieldMapper;

const AND_OPERATOR: &str = "$and";
const OR_OPERATOR: &str = "$or";

/// Translates a predicate into a native filter document.
///
/// An empty predicate yields an empty document, which matches every item.
/// Any expression without a native form, at any depth, fails the whole
/// translation with [`QueryError::UnsupportedExpression`].
///
/// # Examples
///
/// ```
/// use bson::doc;
/// use resource_persistence::translate::{FieldMapper, translate_predicate};
/// use resource_persistence::types::{Expression, Predicate};
///
/// let predicate = Predicate::new([
///     Expression::equal("id", "foo"),
///     Expression::greater_than("age", 18),
/// ]);
/// let filter = translate_predicate(&predicate, &FieldMapper::default()).unwrap();
/// assert_eq!(filter, doc! { "_id": "foo", "age": { "$gt": 18 } });
/// ```
pub fn translate_predicate(
    predicate: &Predicate,
    fields: &FieldMapper,
) -> Result<Document, QueryError> {
    translate_expressions(predicate.expressions(), fields)
}

fn translate_expressions(
    expressions: &[Expression],
    fields: &FieldMapper,
) -> Result<Document, QueryError> {
    let mut filter = Document::new();
    for expression in expressions {
        let (key, value) = translate_expression(expression, fields)?;
        merge_clause(&mut filter, key, value);
    }
    Ok(filter)
}

fn translate_operand(operand: &Operand, fields: &FieldMapper) -> Result<Bson, QueryError> {
    let translated = match operand {
        Operand::Expression(expression) => {
            translate_expressions(std::slice::from_ref(expression), fields)?
        }
        Operand::Predicate(predicate) => translate_expressions(predicate.expressions(), fields)?,
    };
    Ok(Bson::Document(translated))
}

fn translate_operands(operands: &[Operand], fields: &FieldMapper) -> Result<Bson, QueryError> {
    let clauses = operands
        .iter()
        .map(|operand| translate_operand(operand, fields))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Bson::Array(clauses))
}

fn translate_expression(
    expression: &Expression,
    fields: &FieldMapper,
) -> Result<(String, Bson), QueryError> {
    let clause = match expression {
        Expression::Equal { field, value } => (fields.map(field).into_owned(), value.clone()),
        Expression::NotEqual { field, value } => operator(fields, field, "$ne", value.clone()),
        Expression::GreaterThan { field, value } => operator(fields, field, "$gt", value.clone()),
        Expression::GreaterOrEqual { field, value } => {
            operator(fields, field, "$gte", value.clone())
        }
        Expression::LowerThan { field, value } => operator(fields, field, "$lt", value.clone()),
        Expression::LowerOrEqual { field, value } => {
            operator(fields, field, "$lte", value.clone())
        }
        Expression::In { field, values } => {
            operator(fields, field, "$in", Bson::Array(values.clone()))
        }
        Expression::NotIn { field, values } => {
            operator(fields, field, "$nin", Bson::Array(values.clone()))
        }
        Expression::Exist { field } => operator(fields, field, "$exists", Bson::Boolean(true)),
        Expression::NotExist { field } => operator(fields, field, "$exists", Bson::Boolean(false)),
        Expression::Regex {
            field,
            pattern,
            options,
        } => {
            let mut regex = doc! { "$regex": pattern.as_str() };
            if let Some(options) = options.as_deref().filter(|o| !o.is_empty()) {
                regex.insert("$options", options);
            }
            (fields.map(field).into_owned(), Bson::Document(regex))
        }
        Expression::And(operands) => (
            AND_OPERATOR.to_string(),
            translate_operands(operands, fields)?,
        ),
        Expression::Or(operands) => (
            OR_OPERATOR.to_string(),
            translate_operands(operands, fields)?,
        ),
        Expression::ElemMatch { field, expressions } => {
            let element = translate_expressions(expressions, &FieldMapper::element())?;
            (
                fields.map(field).into_owned(),
                Bson::Document(doc! { "$elemMatch": element }),
            )
        }
        Expression::Unsupported { kind } => {
            return Err(QueryError::UnsupportedExpression { kind: kind.clone() });
        }
    };
    Ok(clause)
}

fn operator(fields: &FieldMapper, field: &str, op: &str, value: Bson) -> (String, Bson) {
    let mut clause = Document::new();
    clause.insert(op, value);
    (fields.map(field).into_owned(), Bson::Document(clause))
}

fn merge_clause(filter: &mut Document, key: String, value: Bson) {
    match filter.get_mut(&key) {
        None => {
            filter.insert(key, value);
        }
        Some(Bson::Array(clauses)) if key == AND_OPERATOR => match value {
            Bson::Array(more) => clauses.extend(more),
            other => clauses.push(other),
        },
        Some(Bson::Document(current)) if can_merge_operators(current, &value) => {
            if let Bson::Document(more) = value {
                for (op, operand) in more {
                    current.insert(op, operand);
                }
            }
        }
        Some(_) => {
            let mut clause = Document::new();
            clause.insert(key, value);
            match filter.get_mut(AND_OPERATOR) {
                Some(Bson::Array(clauses)) => clauses.push(Bson::Document(clause)),
                _ => {
                    filter.insert(AND_OPERATOR, Bson::Array(vec![Bson::Document(clause)]));
                }
            }
        }
    }
}

fn can_merge_operators(current: &Document, value: &Bson) -> bool {
    let Bson::Document(more) = value else {
        return false;
    };
    let is_operators = |d: &Document| !d.is_empty() && d.keys().all(|k| k.starts_with('$'));
    is_operators(current) && is_operators(more) && more.keys().all(|k| !current.contains_key(k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::DocumentLayout;
    use regex::Regex;

    fn translate(predicate: Predicate) -> Document {
        translate_predicate(&predicate, &FieldMapper::default()).unwrap()
    }

    // ========================================================================
    // Single expressions
    // ========================================================================

    #[test]
    fn test_translate_simple_expressions() {
        let cases: Vec<(Predicate, Document)> = vec![
            (Expression::equal("id", "foo").into(), doc! { "_id": "foo" }),
            (Expression::equal("f", "foo").into(), doc! { "f": "foo" }),
            (
                Predicate::new([Expression::equal("f", "foo"), Expression::equal("g", "baz")]),
                doc! { "f": "foo", "g": "baz" },
            ),
            (
                Expression::not_equal("f", "foo").into(),
                doc! { "f": { "$ne": "foo" } },
            ),
            (
                Expression::exists("f").into(),
                doc! { "f": { "$exists": true } },
            ),
            (
                Expression::not_exists("f").into(),
                doc! { "f": { "$exists": false } },
            ),
            (
                Expression::greater_than("f", 1.0).into(),
                doc! { "f": { "$gt": 1.0 } },
            ),
            (
                Expression::greater_or_equal("f", 1.0).into(),
                doc! { "f": { "$gte": 1.0 } },
            ),
            (
                Expression::lower_than("f", 1.0).into(),
                doc! { "f": { "$lt": 1.0 } },
            ),
            (
                Expression::lower_or_equal("f", 1.0).into(),
                doc! { "f": { "$lte": 1.0 } },
            ),
            (
                Expression::is_in("f", ["foo", "bar"]).into(),
                doc! { "f": { "$in": ["foo", "bar"] } },
            ),
            (
                Expression::not_in("f", ["foo", "bar"]).into(),
                doc! { "f": { "$nin": ["foo", "bar"] } },
            ),
            (
                Expression::regex("f", Regex::new("fo[o]{1}.+is.+some").unwrap()).into(),
                doc! { "f": { "$regex": "fo[o]{1}.+is.+some" } },
            ),
        ];

        for (predicate, want) in cases {
            let got = translate(predicate.clone());
            assert_eq!(got, want, "predicate: {:?}", predicate);
        }
    }

    #[test]
    fn test_translate_regex_options() {
        let got = translate(
            Expression::regex_with_options("f", Regex::new("^smi").unwrap(), "i").into(),
        );
        assert_eq!(got, doc! { "f": { "$regex": "^smi", "$options": "i" } });

        let got =
            translate(Expression::regex_with_options("f", Regex::new("^smi").unwrap(), "").into());
        assert_eq!(got, doc! { "f": { "$regex": "^smi" } });
    }

    #[test]
    fn test_translate_elem_match() {
        let got = translate(
            Expression::elem_match(
                "f",
                [Expression::equal("a", "foo"), Expression::equal("b", "bar")],
            )
            .into(),
        );
        assert_eq!(
            got,
            doc! { "f": { "$elemMatch": { "a": "foo", "b": "bar" } } }
        );
    }

    // ========================================================================
    // Boolean combinations
    // ========================================================================

    #[test]
    fn test_translate_and_expressions() {
        let got = translate(
            Expression::and([
                Expression::equal("f", "foo"),
                Expression::and([Expression::equal("f", "bar"), Expression::equal("g", "baz")]),
            ])
            .into(),
        );
        assert_eq!(
            got,
            doc! {
                "$and": [
                    { "f": "foo" },
                    { "$and": [{ "f": "bar" }, { "g": "baz" }] },
                ]
            }
        );
    }

    #[test]
    fn test_translate_and_predicates() {
        let got = translate(
            Expression::and([
                Predicate::new([Expression::regex("f", Regex::new("^b??$").unwrap())]),
                Predicate::new([Expression::equal("f", "bar"), Expression::equal("g", "baz")]),
            ])
            .into(),
        );
        assert_eq!(
            got,
            doc! {
                "$and": [
                    { "f": { "$regex": "^b??$" } },
                    { "f": "bar", "g": "baz" },
                ]
            }
        );
    }

    #[test]
    fn test_translate_or_expressions() {
        let got = translate(
            Expression::or([
                Expression::equal("f", "foo"),
                Expression::and([Expression::equal("f", "bar"), Expression::equal("g", "baz")]),
            ])
            .into(),
        );
        assert_eq!(
            got,
            doc! {
                "$or": [
                    { "f": "foo" },
                    { "$and": [{ "f": "bar" }, { "g": "baz" }] },
                ]
            }
        );
    }

    #[test]
    fn test_translate_or_predicates() {
        let got = translate(
            Expression::or([
                Predicate::new([Expression::equal("f", "foo")]),
                Predicate::new([Expression::equal("f", "bar"), Expression::equal("g", "baz")]),
            ])
            .into(),
        );
        assert_eq!(
            got,
            doc! { "$or": [{ "f": "foo" }, { "f": "bar", "g": "baz" }] }
        );
    }

    // ========================================================================
    // Key collisions
    // ========================================================================

    #[test]
    fn test_same_field_operators_are_combined() {
        let got = translate(Predicate::new([
            Expression::greater_than("age", 18),
            Expression::lower_than("age", 65),
        ]));
        assert_eq!(got, doc! { "age": { "$gt": 18, "$lt": 65 } });
    }

    #[test]
    fn test_conflicting_clauses_move_under_and() {
        let got = translate(Predicate::new([
            Expression::equal("f", "foo"),
            Expression::equal("f", "bar"),
        ]));
        assert_eq!(got, doc! { "f": "foo", "$and": [{ "f": "bar" }] });

        let got = translate(Predicate::new([
            Expression::greater_than("f", 1),
            Expression::greater_than("f", 2),
        ]));
        assert_eq!(
            got,
            doc! { "f": { "$gt": 1 }, "$and": [{ "f": { "$gt": 2 } }] }
        );
    }

    #[test]
    fn test_sibling_and_expressions_are_concatenated() {
        let got = translate(Predicate::new([
            Expression::and([Expression::equal("a", 1)]),
            Expression::and([Expression::equal("b", 2)]),
        ]));
        assert_eq!(got, doc! { "$and": [{ "a": 1 }, { "b": 2 }] });
    }

    #[test]
    fn test_sibling_or_expressions_are_both_kept() {
        let got = translate(Predicate::new([
            Expression::or([Expression::equal("a", 1), Expression::equal("a", 2)]),
            Expression::or([Expression::equal("b", 1), Expression::equal("b", 2)]),
        ]));
        assert_eq!(
            got,
            doc! {
                "$or": [{ "a": 1 }, { "a": 2 }],
                "$and": [{ "$or": [{ "b": 1 }, { "b": 2 }] }],
            }
        );
    }

    // ========================================================================
    // Layout and failures
    // ========================================================================

    #[test]
    fn test_nested_layout_prefixes_fields() {
        let fields = FieldMapper::new(DocumentLayout::nested("data"));
        let predicate = Predicate::new([
            Expression::equal("id", 1),
            Expression::equal("name", "x"),
            Expression::elem_match("tags", [Expression::equal("label", "a")]),
        ]);
        let got = translate_predicate(&predicate, &fields).unwrap();
        assert_eq!(
            got,
            doc! {
                "_id": 1,
                "data.name": "x",
                "data.tags": { "$elemMatch": { "label": "a" } },
            }
        );
    }

    #[test]
    fn test_empty_predicate_matches_everything() {
        assert_eq!(translate(Predicate::default()), Document::new());
    }

    #[test]
    fn test_translate_unsupported() {
        let cases: Vec<Predicate> = vec![
            Expression::unsupported("near").into(),
            Expression::and([Expression::unsupported("near")]).into(),
            Expression::or([Expression::unsupported("near")]).into(),
            Expression::or([
                Operand::from(Expression::equal("f", 1)),
                Operand::from(Predicate::new([
                    Expression::equal("g", 1),
                    Expression::unsupported("near"),
                ])),
            ])
            .into(),
            Expression::elem_match("f", [Expression::unsupported("near")]).into(),
        ];

        for predicate in cases {
            let err = translate_predicate(&predicate, &FieldMapper::default()).unwrap_err();
            assert!(
                matches!(err, QueryError::UnsupportedExpression { ref kind } if kind == "near"),
                "predicate: {:?}",
                predicate
            );
        }
    }
}
