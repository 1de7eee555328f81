//! Attribute path resolution over document trees.
//!
//! A path is an ordered sequence of attribute names. Resolution descends one
//! segment at a time: objects descend by key, arrays apply the remaining
//! path to every element and flatten the results. Arrays are transparent on
//! purpose: indexing and lookup treat every element as a candidate.

use serde_json::Value;

/// Resolves `path` against `doc`, returning every reachable leaf value.
///
/// - an object descends into the value at the current segment; a missing
///   key yields nothing for that branch
/// - an array maps the remaining path across its elements and flattens
/// - a scalar reached before the path is exhausted yields nothing
/// - when the path is exhausted, an array leaf yields its elements (one
///   level deep); any other value is yielded as-is
pub fn resolve<'a>(doc: &'a Value, path: &[String]) -> Vec<&'a Value> {
    let mut leaves = Vec::new();
    collect(doc, path, &mut leaves);
    leaves
}

fn collect<'a>(node: &'a Value, path: &[String], leaves: &mut Vec<&'a Value>) {
    match node {
        Value::Array(elements) => {
            if path.is_empty() {
                leaves.extend(elements.iter());
            } else {
                for element in elements {
                    collect(element, path, leaves);
                }
            }
        }
        Value::Object(fields) => match path.split_first() {
            Some((segment, rest)) => {
                if let Some(child) = fields.get(segment) {
                    collect(child, rest, leaves);
                }
            }
            None => leaves.push(node),
        },
        scalar => {
            if path.is_empty() {
                leaves.push(scalar);
            }
        }
    }
}
