//! Recursive query evaluator.
//!
//! The evaluator walks a parsed expression tree and folds document ids into
//! a caller-owned accumulator. Leaf operators translate into hash-index
//! probes; combinators recurse with transient accumulators and fold the
//! partial sets back. Evaluation never mutates the collection.
//!
//! Concurrency envelope: a probe holds one index partition's reader lock
//! for the duration of one lookup; the existence scan holds one partition's
//! reader lock per partition iteration. No two partition locks are ever
//! held at once, so evaluation cannot deadlock against writers. A query
//! racing a writer may observe a document in one partition and miss it in
//! another; the equality re-read filter drops ids whose documents cannot
//! be read back.

use std::collections::HashSet;

use serde_json::Value;

use crate::collection::CollectionResult;
use crate::index::{canonical_str, join_path, str_hash, DocId, PartitionedIndex};
use crate::observability::Logger;

use super::ast::QueryExpr;
use super::errors::{QueryError, QueryResult};
use super::path::resolve;

/// Result accumulator: a set of document ids.
pub type IdSet = HashSet<DocId>;

/// Existence scans aim to collect roughly this many ids per chunk.
const SCAN_CHUNK_TARGET: usize = 4000;

/// Ranges wider than this log a one-time inefficiency warning.
const RANGE_WARN_WIDTH: i128 = 1000;

/// The narrow contract the evaluator consumes from a collection.
pub trait QuerySource {
    /// Fetches a document by id. Errors mean "not present or unreadable"
    /// and are treated as skips by the equality filter.
    fn read_doc(&self, id: DocId) -> CollectionResult<Value>;

    /// Visits every live document id in stable order until the visitor
    /// returns false.
    fn for_each_doc_id(&self, visit: &mut dyn FnMut(DocId) -> bool);

    /// Approximate number of live documents, used only for scan chunking.
    fn approx_doc_count(&self) -> usize;

    /// Number of index partitions (shared by every index of the source).
    fn num_parts(&self) -> usize;

    /// Whether `joined_path` has an index.
    fn is_indexed(&self, joined_path: &str) -> bool;

    /// The hash index over `joined_path`, when one exists.
    fn hash_index(&self, joined_path: &str) -> Option<&PartitionedIndex>;
}

/// Evaluates query expressions against a [`QuerySource`].
pub struct QueryEvaluator<'a, S: QuerySource> {
    src: &'a S,
}

impl<'a, S: QuerySource> QueryEvaluator<'a, S> {
    /// Creates an evaluator over `src`.
    pub fn new(src: &'a S) -> Self {
        Self { src }
    }

    /// Evaluates `expr`, adding selected ids to `result`.
    ///
    /// On error the accumulator's contents are unspecified and should be
    /// discarded.
    pub fn evaluate(&self, expr: &QueryExpr, result: &mut IdSet) -> QueryResult<()> {
        match expr {
            QueryExpr::Union(children) => self.eval_union(children, result),
            QueryExpr::AllIds => {
                self.eval_all_ids(result);
                Ok(())
            }
            QueryExpr::DocId(id) => {
                result.insert(*id);
                Ok(())
            }
            QueryExpr::Eq { value, path, limit } => {
                self.eval_lookup(value, path, *limit, expr, result)
            }
            QueryExpr::Has { path, limit } => {
                self.eval_existence(path, *limit, expr, result)
            }
            QueryExpr::Intersect(children) => self.eval_intersect(children, result),
            QueryExpr::Complement(children) => self.eval_complement(children, result),
            QueryExpr::IntRange {
                from,
                to,
                path,
                limit,
            } => self.eval_int_range(*from, *to, path, *limit, expr, result),
            QueryExpr::Nop => Ok(()),
        }
    }

    /// Union: children share the caller's accumulator.
    fn eval_union(&self, children: &[QueryExpr], result: &mut IdSet) -> QueryResult<()> {
        for child in children {
            self.evaluate(child, result)?;
        }
        Ok(())
    }

    fn eval_all_ids(&self, result: &mut IdSet) {
        self.src.for_each_doc_id(&mut |id| {
            result.insert(id);
            true
        });
    }

    /// Equality lookup: one hash probe plus a re-read filter.
    ///
    /// Index entries are keyed by hash, so every candidate is verified by
    /// reading the document and re-resolving the path; ids whose documents
    /// cannot be read are dropped silently.
    fn eval_lookup(
        &self,
        value: &Value,
        path: &[String],
        limit: usize,
        expr: &QueryExpr,
        result: &mut IdSet,
    ) -> QueryResult<()> {
        let joined = join_path(path);
        let index = self.index_for(&joined, expr)?;

        let lookup_str = canonical_str(value);
        let candidates = index.probe(str_hash(&lookup_str), limit);
        for id in candidates {
            let Ok(doc) = self.src.read_doc(id) else {
                continue;
            };
            if resolve(&doc, path)
                .iter()
                .any(|leaf| canonical_str(leaf) == lookup_str)
            {
                result.insert(id);
            }
        }
        Ok(())
    }

    /// Existence scan: every id present anywhere in the path's index.
    ///
    /// Trusts the index without re-reading documents; stale or
    /// collision-sourced ids may appear. One partition reader lock is held
    /// at a time, for the duration of that partition's chunk sweep.
    fn eval_existence(
        &self,
        path: &[String],
        limit: usize,
        expr: &QueryExpr,
        result: &mut IdSet,
    ) -> QueryResult<()> {
        let joined = join_path(path);
        let index = self.index_for(&joined, expr)?;

        let num_parts = self.src.num_parts();
        let part_div = (self.src.approx_doc_count() / num_parts / SCAN_CHUNK_TARGET).max(1);
        let mut counter = 0usize;
        for part_no in 0..num_parts {
            let part = index.partition(part_no).read().unwrap();
            for chunk_no in 0..part_div {
                let (_, ids) = part.chunk(chunk_no, part_div);
                for id in ids {
                    result.insert(id);
                    counter += 1;
                    if counter == limit {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    /// Intersection fold: the first child's result replaces the
    /// accumulator, every further child intersects into it.
    fn eval_intersect(&self, children: &[QueryExpr], result: &mut IdSet) -> QueryResult<()> {
        let mut first = true;
        for child in children {
            let mut sub = IdSet::new();
            self.evaluate(child, &mut sub)?;
            if first {
                *result = sub;
                first = false;
            } else {
                result.retain(|id| sub.contains(id));
            }
        }
        Ok(())
    }

    /// Running symmetric-difference fold: after each child with result S,
    /// the accumulator becomes (S \ acc) ∪ (acc \ S).
    fn eval_complement(&self, children: &[QueryExpr], result: &mut IdSet) -> QueryResult<()> {
        for child in children {
            let mut sub = IdSet::new();
            self.evaluate(child, &mut sub)?;
            *result = result.symmetric_difference(&sub).copied().collect();
        }
        Ok(())
    }

    /// Integer range: one equality probe per value in the inclusive range,
    /// ascending when `from < to`, descending otherwise. Range probes do
    /// not re-verify documents.
    fn eval_int_range(
        &self,
        from: i64,
        to: i64,
        path: &[String],
        limit: usize,
        expr: &QueryExpr,
        result: &mut IdSet,
    ) -> QueryResult<()> {
        let joined = join_path(path);
        let index = self.index_for(&joined, expr)?;

        let width = (i128::from(to) - i128::from(from)).abs();
        if width > RANGE_WARN_WIDTH {
            let query = expr.to_string();
            let values = (width + 1).to_string();
            Logger::warn_no_repeat(
                "QUERY_RANGE_WIDE",
                &[("query", query.as_str()), ("values", values.as_str())],
            );
        }

        let mut counter = 0usize;
        if from < to {
            for value in from..=to {
                if !self.range_probe(index, value, limit, &mut counter, result) {
                    break;
                }
            }
        } else {
            for value in (to..=from).rev() {
                if !self.range_probe(index, value, limit, &mut counter, result) {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Probes one range value; returns false once the limit is reached.
    fn range_probe(
        &self,
        index: &PartitionedIndex,
        value: i64,
        limit: usize,
        counter: &mut usize,
        result: &mut IdSet,
    ) -> bool {
        let key = str_hash(&value.to_string());
        for id in index.probe(key, limit) {
            if limit > 0 && *counter == limit {
                return false;
            }
            result.insert(id);
            *counter += 1;
        }
        limit == 0 || *counter < limit
    }

    fn index_for(&self, joined: &str, expr: &QueryExpr) -> QueryResult<&'a PartitionedIndex> {
        if !self.src.is_indexed(joined) {
            return Err(QueryError::UnindexedPath {
                path: joined.to_string(),
                query: expr.to_string(),
            });
        }
        self.src
            .hash_index(joined)
            .ok_or_else(|| QueryError::UnindexedPath {
                path: joined.to_string(),
                query: expr.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionError;
    use serde_json::json;
    use std::collections::HashMap;

    /// Mock source with direct control over documents and index contents
    struct MockSource {
        num_parts: usize,
        docs: HashMap<DocId, Value>,
        failing: Vec<DocId>,
        indexes: HashMap<String, PartitionedIndex>,
    }

    impl MockSource {
        fn new(num_parts: usize) -> Self {
            Self {
                num_parts,
                docs: HashMap::new(),
                failing: Vec::new(),
                indexes: HashMap::new(),
            }
        }

        fn with_index(mut self, joined: &str) -> Self {
            self.indexes
                .insert(joined.to_string(), PartitionedIndex::new(self.num_parts));
            self
        }

        fn add_doc(&mut self, id: DocId, doc: Value) {
            self.docs.insert(id, doc);
        }

        /// Puts an index entry exactly as the index builder would.
        fn index_entry(&mut self, joined: &str, value: &Value, id: DocId) {
            let key = str_hash(&canonical_str(value));
            self.indexes.get(joined).unwrap().put(key, id);
        }

        fn mark_failing(&mut self, id: DocId) {
            self.failing.push(id);
        }
    }

    impl QuerySource for MockSource {
        fn read_doc(&self, id: DocId) -> CollectionResult<Value> {
            if self.failing.contains(&id) {
                return Err(CollectionError::NotFound { id });
            }
            self.docs
                .get(&id)
                .cloned()
                .ok_or(CollectionError::NotFound { id })
        }

        fn for_each_doc_id(&self, visit: &mut dyn FnMut(DocId) -> bool) {
            let mut ids: Vec<DocId> = self.docs.keys().copied().collect();
            ids.sort_unstable();
            for id in ids {
                if !visit(id) {
                    break;
                }
            }
        }

        fn approx_doc_count(&self) -> usize {
            self.docs.len()
        }

        fn num_parts(&self) -> usize {
            self.num_parts
        }

        fn is_indexed(&self, joined_path: &str) -> bool {
            self.indexes.contains_key(joined_path)
        }

        fn hash_index(&self, joined_path: &str) -> Option<&PartitionedIndex> {
            self.indexes.get(joined_path)
        }
    }

    fn run(src: &MockSource, query: serde_json::Value) -> QueryResult<IdSet> {
        let expr = QueryExpr::parse(&query)?;
        let mut result = IdSet::new();
        QueryEvaluator::new(src).evaluate(&expr, &mut result)?;
        Ok(result)
    }

    fn ids(raw: &[DocId]) -> IdSet {
        raw.iter().copied().collect()
    }

    #[test]
    fn test_eq_filters_hash_collisions() {
        let mut src = MockSource::new(2).with_index("a");
        src.add_doc(1, json!({"a": 7}));
        src.add_doc(2, json!({"a": 99}));
        src.index_entry("a", &json!(7), 1);
        // A colliding entry: id 2 sits under 7's hash key but its document
        // does not hold 7 at the path.
        src.index_entry("a", &json!(7), 2);

        let result = run(&src, json!({"eq": 7, "in": ["a"]})).unwrap();
        assert_eq!(result, ids(&[1]));
    }

    #[test]
    fn test_eq_skips_unreadable_candidates() {
        let mut src = MockSource::new(2).with_index("a");
        src.add_doc(1, json!({"a": 7}));
        src.add_doc(2, json!({"a": 7}));
        src.index_entry("a", &json!(7), 1);
        src.index_entry("a", &json!(7), 2);
        src.mark_failing(2);

        let result = run(&src, json!({"eq": 7, "in": ["a"]})).unwrap();
        assert_eq!(result, ids(&[1]));
    }

    #[test]
    fn test_eq_unindexed_path_leaves_result_untouched() {
        let src = MockSource::new(2);
        let expr = QueryExpr::parse(&json!({"eq": 7, "in": ["a"]})).unwrap();
        let mut result = ids(&[55]);
        let err = QueryEvaluator::new(&src)
            .evaluate(&expr, &mut result)
            .unwrap_err();

        assert!(matches!(err, QueryError::UnindexedPath { .. }));
        assert_eq!(result, ids(&[55]));
    }

    #[test]
    fn test_has_trusts_index() {
        let mut src = MockSource::new(2).with_index("a");
        src.add_doc(1, json!({"a": 1}));
        src.index_entry("a", &json!(1), 1);
        // Stale entry for a document that no longer exists.
        src.index_entry("a", &json!(2), 77);

        let result = run(&src, json!({"has": ["a"]})).unwrap();
        assert_eq!(result, ids(&[1, 77]));
    }

    #[test]
    fn test_has_limit() {
        let mut src = MockSource::new(2).with_index("a");
        for id in 1..=20 {
            src.add_doc(id, json!({"a": id}));
            src.index_entry("a", &json!(id), id);
        }

        let result = run(&src, json!({"has": ["a"], "limit": 5})).unwrap();
        assert_eq!(result.len(), 5);
    }

    #[test]
    fn test_all_ids() {
        let mut src = MockSource::new(2);
        src.add_doc(3, json!({"x": 1}));
        src.add_doc(9, json!({"x": 2}));

        let result = run(&src, json!("all")).unwrap();
        assert_eq!(result, ids(&[3, 9]));
    }

    #[test]
    fn test_doc_id_literal() {
        let src = MockSource::new(2);
        let result = run(&src, json!("41")).unwrap();
        assert_eq!(result, ids(&[41]));
    }

    #[test]
    fn test_nop_literal_has_no_effect() {
        let src = MockSource::new(2);
        let expr = QueryExpr::parse(&json!(3.5)).unwrap();
        let mut result = ids(&[8]);
        QueryEvaluator::new(&src).evaluate(&expr, &mut result).unwrap();
        assert_eq!(result, ids(&[8]));
    }

    #[test]
    fn test_intersect_replaces_prior_accumulator() {
        let src = MockSource::new(2);
        let expr = QueryExpr::parse(&json!({"n": ["1", "2"]})).unwrap();
        // Pre-existing content is replaced by the first child's result.
        let mut result = ids(&[99]);
        QueryEvaluator::new(&src).evaluate(&expr, &mut result).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_intersect_empty_children_untouched() {
        let src = MockSource::new(2);
        let expr = QueryExpr::parse(&json!({"n": []})).unwrap();
        let mut result = ids(&[4]);
        QueryEvaluator::new(&src).evaluate(&expr, &mut result).unwrap();
        assert_eq!(result, ids(&[4]));
    }

    #[test]
    fn test_complement_fold_three_children() {
        let src = MockSource::new(2);
        // {1,2} xor {2,3} = {1,3}; {1,3} xor {3,4} = {1,4}
        let result = run(
            &src,
            json!({"c": [["1", "2"], ["2", "3"], ["3", "4"]]}),
        )
        .unwrap();
        assert_eq!(result, ids(&[1, 4]));
    }

    #[test]
    fn test_int_range_descending() {
        let mut src = MockSource::new(2).with_index("n");
        for (id, n) in [(1, 5), (2, 6), (3, 7)] {
            src.add_doc(id, json!({"n": n}));
            src.index_entry("n", &json!(n), id);
        }

        let result = run(&src, json!({"int-from": 7, "int-to": 5, "in": ["n"]})).unwrap();
        assert_eq!(result, ids(&[1, 2, 3]));
    }

    #[test]
    fn test_int_range_limit_caps_inserts() {
        let mut src = MockSource::new(2).with_index("n");
        for id in 1..=10 {
            src.add_doc(id, json!({"n": 4}));
            src.index_entry("n", &json!(4), id);
        }

        let result = run(
            &src,
            json!({"int-from": 4, "int-to": 6, "in": ["n"], "limit": 3}),
        )
        .unwrap();
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_int_range_wide_still_evaluates() {
        let src = MockSource::new(2).with_index("n");
        let result = run(
            &src,
            json!({"int-from": 0, "int-to": 1500, "in": ["n"]}),
        )
        .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_union_error_short_circuits() {
        let src = MockSource::new(2);
        let err = run(&src, json!([{"eq": 1, "in": ["zz"]}, "all"])).unwrap_err();
        assert!(matches!(err, QueryError::UnindexedPath { .. }));
    }
}
