// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Backend-agnostic filter predicates for store queries.
//!
//! A [`Query`] is a list of [`Operator`]s (implicitly AND-ed) plus ordering,
//! skip and limit modifiers. [`Operator::matches`] defines the semantics;
//! the in-memory store evaluates it directly and the Firestore store
//! translates the same tree into a structured query.

use serde_json::{Number, Value};
use std::cmp::Ordering;

/// A single filter predicate over a (possibly dotted) field path.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Equal(String, Value),
    /// Matches documents where the field exists and differs from the value.
    NotEqual(String, Value),
    GreaterThan(String, Value),
    GreaterThanOrEqual(String, Value),
    LessThan(String, Value),
    LessThanOrEqual(String, Value),
    In(String, Vec<Value>),
    /// `true`: field present and non-null. `false`: absent or null.
    Exists(String, bool),
    And(Vec<Operator>),
    Or(Vec<Operator>),
}

impl Operator {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Operator::Equal(field.into(), value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Operator::NotEqual(field.into(), value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Operator::GreaterThan(field.into(), value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Operator::GreaterThanOrEqual(field.into(), value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Operator::LessThan(field.into(), value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Operator::LessThanOrEqual(field.into(), value.into())
    }

    pub fn is_in<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Operator::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Operator::Exists(field.into(), true)
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Operator::Exists(field.into(), false)
    }

    pub fn and(operators: impl IntoIterator<Item = Operator>) -> Self {
        Operator::And(operators.into_iter().collect())
    }

    pub fn or(operators: impl IntoIterator<Item = Operator>) -> Self {
        Operator::Or(operators.into_iter().collect())
    }

    /// Evaluate this predicate against a JSON document.
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Operator::Equal(field, expected) => {
                lookup(doc, field).is_some_and(|actual| values_equal(actual, expected))
            }
            Operator::NotEqual(field, expected) => {
                lookup(doc, field).is_some_and(|actual| !values_equal(actual, expected))
            }
            Operator::GreaterThan(field, bound) => {
                compare_field(doc, field, bound) == Some(Ordering::Greater)
            }
            Operator::GreaterThanOrEqual(field, bound) => matches!(
                compare_field(doc, field, bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Operator::LessThan(field, bound) => {
                compare_field(doc, field, bound) == Some(Ordering::Less)
            }
            Operator::LessThanOrEqual(field, bound) => matches!(
                compare_field(doc, field, bound),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Operator::In(field, candidates) => lookup(doc, field)
                .is_some_and(|actual| candidates.iter().any(|c| values_equal(actual, c))),
            Operator::Exists(field, wanted) => lookup(doc, field).is_some() == *wanted,
            Operator::And(operators) => operators.iter().all(|op| op.matches(doc)),
            Operator::Or(operators) => operators.iter().any(|op| op.matches(doc)),
        }
    }
}

/// Sort direction for [`Query::order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A filter list plus ordering and paging modifiers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Operator>,
    pub order: Vec<(String, Direction)>,
    pub limit: Option<u32>,
    pub skip: Option<u32>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, operator: Operator) -> Self {
        self.filters.push(operator);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order.push((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u32) -> Self {
        self.skip = Some(skip);
        self
    }

    /// True if every filter matches.
    pub fn matches(&self, doc: &Value) -> bool {
        self.filters.iter().all(|op| op.matches(doc))
    }

    /// Apply filters, ordering, skip and limit to a set of documents.
    pub fn apply(&self, docs: impl IntoIterator<Item = Value>) -> Vec<Value> {
        let mut selected: Vec<Value> = docs.into_iter().filter(|d| self.matches(d)).collect();

        if !self.order.is_empty() {
            selected.sort_by(|a, b| {
                for (field, direction) in &self.order {
                    let ordering = order_values(lookup(a, field), lookup(b, field));
                    let ordering = match direction {
                        Direction::Ascending => ordering,
                        Direction::Descending => ordering.reverse(),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        let skip = self.skip.unwrap_or(0) as usize;
        let limit = self.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        selected.into_iter().skip(skip).take(limit).collect()
    }
}

/// Resolve a dotted field path. Null values count as absent.
fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    (!current.is_null()).then_some(current)
}

fn compare_field(doc: &Value, field: &str, bound: &Value) -> Option<Ordering> {
    compare_values(lookup(doc, field)?, bound)
}

/// Compare two scalars of the same kind. Mixed kinds are incomparable.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Integers compare exactly; anything involving a float goes through `f64`.
fn compare_numbers(x: &Number, y: &Number) -> Option<Ordering> {
    match (x.as_i64(), y.as_i64(), x.as_u64(), y.as_u64()) {
        (Some(a), Some(b), _, _) => Some(a.cmp(&b)),
        (_, _, Some(a), Some(b)) => Some(a.cmp(&b)),
        // One side is a negative i64 and the other exceeds i64::MAX.
        (Some(_), None, _, Some(_)) => Some(Ordering::Less),
        (None, Some(_), Some(_), _) => Some(Ordering::Greater),
        _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match compare_values(a, b) {
        Some(ordering) => ordering == Ordering::Equal,
        None => a == b,
    }
}

/// Total order used for sorting: missing values first, incomparable kept stable.
fn order_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
    }
}
