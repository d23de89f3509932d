//! Query model.
//!
//! A [`Query`] combines a [`Predicate`] (the filter), an ordered list of
//! [`SortField`]s and an optional [`Window`]. Field names are the logical
//! names of the resource; mapping them to stored names happens during
//! translation, so a query can be reused against any document layout.

use bson::Bson;
use regex::Regex;

use crate::error::QueryError;

/// A single filter expression.
// Variant fields are described by the variant docs
#[allow(missing_docs)]
#[derive(Debug, Clone)]
pub enum Expression {
    /// `field == value`
    Equal { field: String, value: Bson },
    /// `field != value`
    NotEqual { field: String, value: Bson },
    /// `field > value`
    GreaterThan { field: String, value: Bson },
    /// `field >= value`
    GreaterOrEqual { field: String, value: Bson },
    /// `field < value`
    LowerThan { field: String, value: Bson },
    /// `field <= value`
    LowerOrEqual { field: String, value: Bson },
    /// `field` is one of `values`
    In { field: String, values: Vec<Bson> },
    /// `field` is none of `values`
    NotIn { field: String, values: Vec<Bson> },
    /// `field` is present
    Exist { field: String },
    /// `field` is absent
    NotExist { field: String },
    /// `field` matches `pattern`, with optional store-side regex options
    Regex {
        field: String,
        pattern: Regex,
        options: Option<String>,
    },
    /// Every operand holds.
    And(Vec<Operand>),
    /// At least one operand holds.
    Or(Vec<Operand>),
    /// At least one element of the array `field` satisfies all `expressions`.
    ///
    /// Field names inside `expressions` are relative to the array element.
    ElemMatch {
        field: String,
        expressions: Vec<Expression>,
    },
    /// An expression kind the store has no native form for.
    Unsupported { kind: String },
}

impl Expression {
    /// `field == value`
    pub fn equal(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Expression::Equal {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `field != value`
    pub fn not_equal(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Expression::NotEqual {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `field > value`
    pub fn greater_than(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Expression::GreaterThan {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `field >= value`
    pub fn greater_or_equal(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Expression::GreaterOrEqual {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `field < value`
    pub fn lower_than(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Expression::LowerThan {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `field <= value`
    pub fn lower_or_equal(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Expression::LowerOrEqual {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `field` is one of `values`
    pub fn is_in<V: Into<Bson>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Expression::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `field` is none of `values`
    pub fn not_in<V: Into<Bson>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Expression::NotIn {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `field` is present
    pub fn exists(field: impl Into<String>) -> Self {
        Expression::Exist {
            field: field.into(),
        }
    }

    /// `field` is absent
    pub fn not_exists(field: impl Into<String>) -> Self {
        Expression::NotExist {
            field: field.into(),
        }
    }

    /// `field` matches `pattern`
    pub fn regex(field: impl Into<String>, pattern: Regex) -> Self {
        Expression::Regex {
            field: field.into(),
            pattern,
            options: None,
        }
    }

    /// `field` matches `pattern` with the given store-side options (e.g. `"i"`).
    pub fn regex_with_options(
        field: impl Into<String>,
        pattern: Regex,
        options: impl Into<String>,
    ) -> Self {
        Expression::Regex {
            field: field.into(),
            pattern,
            options: Some(options.into()),
        }
    }

    /// Conjunction of `operands`.
    pub fn and<O: Into<Operand>>(operands: impl IntoIterator<Item = O>) -> Self {
        Expression::And(operands.into_iter().map(Into::into).collect())
    }

    /// Disjunction of `operands`.
    pub fn or<O: Into<Operand>>(operands: impl IntoIterator<Item = O>) -> Self {
        Expression::Or(operands.into_iter().map(Into::into).collect())
    }

    /// Element match on the array `field`.
    pub fn elem_match(
        field: impl Into<String>,
        expressions: impl IntoIterator<Item = Expression>,
    ) -> Self {
        Expression::ElemMatch {
            field: field.into(),
            expressions: expressions.into_iter().collect(),
        }
    }

    /// An expression with no native form.
    pub fn unsupported(kind: impl Into<String>) -> Self {
        Expression::Unsupported { kind: kind.into() }
    }

    /// Returns a short name of the expression kind.
    pub fn kind(&self) -> &str {
        match self {
            Expression::Equal { .. } => "equal",
            Expression::NotEqual { .. } => "not-equal",
            Expression::GreaterThan { .. } => "greater-than",
            Expression::GreaterOrEqual { .. } => "greater-or-equal",
            Expression::LowerThan { .. } => "lower-than",
            Expression::LowerOrEqual { .. } => "lower-or-equal",
            Expression::In { .. } => "in",
            Expression::NotIn { .. } => "not-in",
            Expression::Exist { .. } => "exist",
            Expression::NotExist { .. } => "not-exist",
            Expression::Regex { .. } => "regex",
            Expression::And(_) => "and",
            Expression::Or(_) => "or",
            Expression::ElemMatch { .. } => "elem-match",
            Expression::Unsupported { kind } => kind,
        }
    }
}

/// An operand of [`Expression::And`] or [`Expression::Or`].
#[derive(Debug, Clone)]
pub enum Operand {
    /// A single expression.
    Expression(Expression),
    /// An implicit conjunction of expressions.
    Predicate(Predicate),
}

impl From<Expression> for Operand {
    fn from(expression: Expression) -> Self {
        Operand::Expression(expression)
    }
}

impl From<Predicate> for Operand {
    fn from(predicate: Predicate) -> Self {
        Operand::Predicate(predicate)
    }
}

/// An implicit conjunction of expressions. The empty predicate matches everything.
#[derive(Debug, Clone, Default)]
pub struct Predicate(pub Vec<Expression>);

impl Predicate {
    /// Creates a predicate from its expressions.
    pub fn new(expressions: impl IntoIterator<Item = Expression>) -> Self {
        Predicate(expressions.into_iter().collect())
    }

    /// Returns `true` if the predicate has no expression.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the expressions.
    pub fn expressions(&self) -> &[Expression] {
        &self.0
    }
}

impl From<Expression> for Predicate {
    fn from(expression: Expression) -> Self {
        Predicate(vec![expression])
    }
}

impl FromIterator<Expression> for Predicate {
    fn from_iter<T: IntoIterator<Item = Expression>>(iter: T) -> Self {
        Predicate(iter.into_iter().collect())
    }
}

/// A sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    /// Logical field name.
    pub name: String,
    /// Sort descending when `true`.
    pub reversed: bool,
}

impl SortField {
    /// Ascending sort on `name`.
    pub fn asc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reversed: false,
        }
    }

    /// Descending sort on `name`.
    pub fn desc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reversed: true,
        }
    }

    /// Parses a sort key, a leading `-` meaning descending.
    pub fn parse(s: &str) -> Self {
        match s.strip_prefix('-') {
            Some(stripped) => Self::desc(stripped),
            None => Self::asc(s),
        }
    }
}

/// Offset/limit pair applied to a query.
///
/// A limit of zero selects no item; `None` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Window {
    /// Number of items to skip.
    pub offset: u64,
    /// Maximum number of items, `None` for unbounded.
    pub limit: Option<u64>,
}

impl Window {
    /// Creates a window.
    pub fn new(offset: u64, limit: Option<u64>) -> Self {
        Self { offset, limit }
    }

    /// Creates a window from wire values where a limit of `-1` is unbounded.
    pub fn from_raw(offset: i64, limit: i64) -> Result<Self, QueryError> {
        let offset = u64::try_from(offset).map_err(|_| QueryError::InvalidWindow {
            message: format!("negative offset {}", offset),
        })?;
        let limit = match limit {
            -1 => None,
            n => Some(u64::try_from(n).map_err(|_| QueryError::InvalidWindow {
                message: format!("invalid limit {}", n),
            })?),
        };
        Ok(Self { offset, limit })
    }

    /// Returns `true` if the window selects nothing.
    pub fn is_empty(&self) -> bool {
        self.limit == Some(0)
    }
}

/// A query against a collection.
///
/// # Examples
///
/// ```
/// use resource_persistence::types::{Expression, Query, SortField, Window};
///
/// let query = Query::new()
///     .with_predicate(Expression::equal("status", "active"))
///     .with_sort(SortField::parse("-created"))
///     .with_window(Window::new(20, Some(10)));
///
/// assert_eq!(query.sort[0].name, "created");
/// assert!(query.sort[0].reversed);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// The filter.
    pub predicate: Predicate,
    /// Sort keys, most significant first.
    pub sort: Vec<SortField>,
    /// Optional offset/limit.
    pub window: Option<Window>,
}

impl Query {
    /// Creates a query matching every item.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the predicate.
    pub fn with_predicate(mut self, predicate: impl Into<Predicate>) -> Self {
        self.predicate = predicate.into();
        self
    }

    /// Appends a sort key.
    pub fn with_sort(mut self, sort: SortField) -> Self {
        self.sort.push(sort);
        self
    }

    /// Sets the window.
    pub fn with_window(mut self, window: Window) -> Self {
        self.window = Some(window);
        self
    }
}
