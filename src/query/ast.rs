//! Query expression AST
//!
//! Queries arrive as JSON-shaped trees and are parsed into a tagged
//! expression type before evaluation, so the evaluator can match
//! exhaustively instead of re-inspecting runtime shapes at every node.
//!
//! Node shapes:
//!
//! - array -> union of sub-queries
//! - `"all"` -> every document id
//! - `"<decimal>"` -> a single document id
//! - mapping -> operator node; the first recognized key among `eq`, `has`,
//!   `n`, `c`, `int-from`, `int from` selects the operator, the remaining
//!   keys are its modifiers (`in`, `limit`, `int-to`)
//! - any other literal -> no-op (ignored, by contract)

use std::fmt;

use serde_json::{Map, Number, Value};

use crate::index::DocId;

use super::errors::{QueryError, QueryResult};

/// A parsed query expression.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryExpr {
    /// Union of sub-queries, evaluated into a shared accumulator
    Union(Vec<QueryExpr>),
    /// Every document id in the collection
    AllIds,
    /// A single literal document id
    DocId(DocId),
    /// Equality lookup through a hash index, re-verified against documents
    Eq {
        value: Value,
        path: Vec<String>,
        limit: usize,
    },
    /// Path-existence scan over a whole index
    Has { path: Vec<String>, limit: usize },
    /// Intersection of sub-query results
    Intersect(Vec<QueryExpr>),
    /// Running symmetric-difference fold over sub-query results
    Complement(Vec<QueryExpr>),
    /// Inclusive integer range, one hash probe per value
    IntRange {
        from: i64,
        to: i64,
        path: Vec<String>,
        limit: usize,
    },
    /// Unrecognized literal shape; evaluates to success without effect
    Nop,
}

impl QueryExpr {
    /// Parses a JSON-shaped query tree.
    ///
    /// Structural problems (missing or malformed modifiers, operator-less
    /// mappings, bad document-id strings) are rejected here; whether a path
    /// is actually indexed is checked at evaluation time.
    pub fn parse(query: &Value) -> QueryResult<Self> {
        match query {
            Value::Array(children) => {
                let parsed: QueryResult<Vec<QueryExpr>> =
                    children.iter().map(Self::parse).collect();
                Ok(QueryExpr::Union(parsed?))
            }
            Value::String(s) => {
                if s == "all" {
                    Ok(QueryExpr::AllIds)
                } else {
                    // Only plain decimal digits name a document; integer
                    // parsing alone would also admit a leading `+`.
                    if s.starts_with('+') {
                        return Err(QueryError::InvalidDocId { query: s.clone() });
                    }
                    let id: DocId = s.parse().map_err(|_| QueryError::InvalidDocId {
                        query: s.clone(),
                    })?;
                    Ok(QueryExpr::DocId(id))
                }
            }
            Value::Object(fields) => Self::parse_operator(fields, query),
            _ => Ok(QueryExpr::Nop),
        }
    }

    fn parse_operator(fields: &Map<String, Value>, whole: &Value) -> QueryResult<Self> {
        if let Some(value) = fields.get("eq") {
            let path = parse_required_path(fields, whole)?;
            let limit = parse_limit(fields, whole)?;
            Ok(QueryExpr::Eq {
                value: value.clone(),
                path,
                limit,
            })
        } else if let Some(path) = fields.get("has") {
            let path = parse_path(path, whole)?;
            let limit = parse_limit(fields, whole)?;
            Ok(QueryExpr::Has { path, limit })
        } else if let Some(subs) = fields.get("n") {
            Ok(QueryExpr::Intersect(parse_sub_queries(subs, whole)?))
        } else if let Some(subs) = fields.get("c") {
            Ok(QueryExpr::Complement(parse_sub_queries(subs, whole)?))
        } else if let Some(from) = fields.get("int-from") {
            Self::parse_range(from, fields, whole)
        } else if let Some(from) = fields.get("int from") {
            Self::parse_range(from, fields, whole)
        } else {
            Err(QueryError::NoOperator {
                query: printed(whole),
            })
        }
    }

    fn parse_range(
        from: &Value,
        fields: &Map<String, Value>,
        whole: &Value,
    ) -> QueryResult<Self> {
        let path = parse_required_path(fields, whole)?;
        let limit = parse_limit(fields, whole)?;
        let from = parse_int_bound(from, "int-from", whole)?;
        let to = fields
            .get("int-to")
            .or_else(|| fields.get("int to"))
            .ok_or_else(|| QueryError::MissingRangeEnd {
                query: printed(whole),
            })?;
        let to = parse_int_bound(to, "int-to", whole)?;
        Ok(QueryExpr::IntRange {
            from,
            to,
            path,
            limit,
        })
    }

    /// Renders the expression back into its JSON query shape.
    ///
    /// Used for error messages and log lines, so users see the fragment
    /// they wrote rather than an internal representation.
    pub fn to_value(&self) -> Value {
        match self {
            QueryExpr::Union(children) => {
                Value::Array(children.iter().map(QueryExpr::to_value).collect())
            }
            QueryExpr::AllIds => Value::String("all".to_string()),
            QueryExpr::DocId(id) => Value::String(id.to_string()),
            QueryExpr::Eq { value, path, limit } => {
                let mut fields = Map::new();
                fields.insert("eq".to_string(), value.clone());
                fields.insert("in".to_string(), path_value(path));
                insert_limit(&mut fields, *limit);
                Value::Object(fields)
            }
            QueryExpr::Has { path, limit } => {
                let mut fields = Map::new();
                fields.insert("has".to_string(), path_value(path));
                insert_limit(&mut fields, *limit);
                Value::Object(fields)
            }
            QueryExpr::Intersect(children) => {
                let mut fields = Map::new();
                fields.insert(
                    "n".to_string(),
                    Value::Array(children.iter().map(QueryExpr::to_value).collect()),
                );
                Value::Object(fields)
            }
            QueryExpr::Complement(children) => {
                let mut fields = Map::new();
                fields.insert(
                    "c".to_string(),
                    Value::Array(children.iter().map(QueryExpr::to_value).collect()),
                );
                Value::Object(fields)
            }
            QueryExpr::IntRange {
                from,
                to,
                path,
                limit,
            } => {
                let mut fields = Map::new();
                fields.insert("int-from".to_string(), Value::from(*from));
                fields.insert("int-to".to_string(), Value::from(*to));
                fields.insert("in".to_string(), path_value(path));
                insert_limit(&mut fields, *limit);
                Value::Object(fields)
            }
            QueryExpr::Nop => Value::Null,
        }
    }
}

impl fmt::Display for QueryExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

fn printed(value: &Value) -> String {
    value.to_string()
}

fn path_value(path: &[String]) -> Value {
    Value::Array(path.iter().map(|s| Value::String(s.clone())).collect())
}

fn insert_limit(fields: &mut Map<String, Value>, limit: usize) {
    if limit > 0 {
        fields.insert("limit".to_string(), Value::from(limit as u64));
    }
}

fn parse_required_path(fields: &Map<String, Value>, whole: &Value) -> QueryResult<Vec<String>> {
    let path = fields.get("in").ok_or_else(|| QueryError::MissingPath {
        query: printed(whole),
    })?;
    parse_path(path, whole)
}

fn parse_path(path: &Value, whole: &Value) -> QueryResult<Vec<String>> {
    match path {
        Value::Array(segments) => Ok(segments
            .iter()
            .map(crate::index::canonical_str)
            .collect()),
        _ => Err(QueryError::PathNotVector {
            query: printed(whole),
        }),
    }
}

fn parse_sub_queries(subs: &Value, whole: &Value) -> QueryResult<Vec<QueryExpr>> {
    match subs {
        Value::Array(children) => children.iter().map(QueryExpr::parse).collect(),
        _ => Err(QueryError::SubQueriesNotVector {
            query: printed(whole),
        }),
    }
}

/// `limit == 0` means unlimited; absent means unlimited.
fn parse_limit(fields: &Map<String, Value>, whole: &Value) -> QueryResult<usize> {
    match fields.get("limit") {
        None => Ok(0),
        Some(Value::Number(n)) => Ok(number_as_limit(n)),
        Some(_) => Err(QueryError::LimitNotNumeric {
            query: printed(whole),
        }),
    }
}

fn number_as_limit(n: &Number) -> usize {
    if let Some(v) = n.as_u64() {
        v as usize
    } else {
        // Fractional or negative limits truncate toward zero, floor 0.
        n.as_f64().unwrap_or(0.0).max(0.0) as usize
    }
}

fn parse_int_bound(value: &Value, key: &'static str, whole: &Value) -> QueryResult<i64> {
    match value {
        Value::Number(n) => Ok(n
            .as_i64()
            .unwrap_or_else(|| n.as_f64().unwrap_or(0.0) as i64)),
        _ => Err(QueryError::BoundNotInteger {
            key,
            query: printed(whole),
        }),
    }
}
