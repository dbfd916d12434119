/// Collection queries evaluated over field maps
use crate::store::{patch::parse_timestamp, Document, Fields};
use serde_json::Value;
use std::cmp::Ordering;

/// Filter applied to a single field
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(String, Value),
    ArrayContains(String, Value),
    Gte(String, Value),
}

impl Predicate {
    fn matches(&self, fields: &Fields) -> bool {
        match self {
            Predicate::Eq(field, expected) => fields
                .get(field)
                .map_or(false, |v| compare_values(v, expected) == Some(Ordering::Equal)),
            Predicate::ArrayContains(field, element) => match fields.get(field) {
                Some(Value::Array(items)) => items.contains(element),
                _ => false,
            },
            Predicate::Gte(field, bound) => fields.get(field).map_or(false, |v| {
                matches!(
                    compare_values(v, bound),
                    Some(Ordering::Greater) | Some(Ordering::Equal)
                )
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Query over the direct children of one collection
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub predicates: Vec<Predicate>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            predicates: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.predicates
            .push(Predicate::Eq(field.to_string(), value.into()));
        self
    }

    pub fn where_array_contains(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.predicates
            .push(Predicate::ArrayContains(field.to_string(), value.into()));
        self
    }

    pub fn where_gte(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.predicates
            .push(Predicate::Gte(field.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        self.predicates.iter().all(|p| p.matches(fields))
    }

    /// Filter, order and truncate documents already scoped to the collection
    ///
    /// Without an explicit order documents are returned by path. Documents
    /// lacking the order field are excluded.
    pub fn apply(&self, docs: Vec<Document>) -> Vec<Document> {
        let mut selected: Vec<Document> = docs
            .into_iter()
            .filter(|d| d.path.collection() == self.collection && self.matches(&d.fields))
            .collect();

        match &self.order_by {
            Some((field, direction)) => {
                selected.retain(|d| d.fields.get(field).map_or(false, |v| !v.is_null()));
                selected.sort_by(|a, b| {
                    let ord = match (a.fields.get(field), b.fields.get(field)) {
                        (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
                        _ => Ordering::Equal,
                    };
                    let ord = ord.then_with(|| a.path.cmp(&b.path));
                    match direction {
                        Direction::Asc => ord,
                        Direction::Desc => ord.reverse(),
                    }
                });
            }
            None => selected.sort_by(|a, b| a.path.cmp(&b.path)),
        }

        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }

        selected
    }
}

/// Compare two field values of the same kind
///
/// Strings that both parse as RFC 3339 timestamps compare chronologically.
/// Values of different kinds are incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => match (parse_timestamp(a), parse_timestamp(b)) {
            (Some(tx), Some(ty)) => Some(tx.cmp(&ty)),
            _ => Some(x.cmp(y)),
        },
        (x, y) if x == y => Some(Ordering::Equal),
        _ => None,
    }
}
