//! Collection subsystem for nestdb
//!
//! A collection stores JSON object documents under monotonically allocated
//! ids and maintains a partitioned hash index per indexed attribute path.
//!
//! # Design Principles
//!
//! - Documents are opaque trees; the collection imposes no schema
//! - Index shape is fixed at setup: creating or dropping an index takes
//!   `&mut self`, document traffic takes `&self`
//! - Mutators hold the document lock and partition locks strictly one at a
//!   time, the same deadlock rule the query side follows
//!
//! # Invariants
//!
//! - Every leaf value at an indexed path is recorded in that index under
//!   its canonical hash before the mutation returns
//! - Document ids are stable for the lifetime of the document

mod errors;

pub use errors::{CollectionError, CollectionResult};

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::index::{canonical_str, join_path, str_hash, DocId, PartitionedIndex};
use crate::query::{IdSet, QueryEvaluator, QueryExpr, QueryResult, QuerySource};

/// Collection tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Number of partitions per hash index.
    pub num_parts: usize,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        let num_parts = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self { num_parts }
    }
}

/// One secondary index: the resolved path plus its partitioned table.
#[derive(Debug)]
struct SecondaryIndex {
    path: Vec<String>,
    table: PartitionedIndex,
}

/// An in-memory collection of JSON documents with hash indexes.
#[derive(Debug)]
pub struct Collection {
    num_parts: usize,
    next_id: AtomicU64,
    docs: RwLock<BTreeMap<DocId, Value>>,
    /// Keyed by joined path; shape fixed outside of `&mut self` setup calls.
    indexes: HashMap<String, SecondaryIndex>,
}

impl Collection {
    /// Creates an empty collection.
    pub fn new(config: CollectionConfig) -> Self {
        Self {
            num_parts: config.num_parts.max(1),
            next_id: AtomicU64::new(1),
            docs: RwLock::new(BTreeMap::new()),
            indexes: HashMap::new(),
        }
    }

    /// Stores a new document and returns its id.
    pub fn insert(&self, doc: Value) -> CollectionResult<DocId> {
        if !doc.is_object() {
            return Err(CollectionError::NotAnObject);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        // Index entries go in first; a concurrent equality probe that sees
        // the entry before the document drops the id in its read filter.
        for index in self.indexes.values() {
            Self::index_doc(index, &doc, id);
        }
        self.docs.write().unwrap().insert(id, doc);
        Ok(id)
    }

    /// Fetches a copy of the document under `id`.
    pub fn read(&self, id: DocId) -> CollectionResult<Value> {
        self.docs
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(CollectionError::NotFound { id })
    }

    /// Replaces the document under `id`, keeping the id.
    pub fn update(&self, id: DocId, doc: Value) -> CollectionResult<()> {
        if !doc.is_object() {
            return Err(CollectionError::NotAnObject);
        }
        let old = {
            let mut docs = self.docs.write().unwrap();
            let Some(slot) = docs.get_mut(&id) else {
                return Err(CollectionError::NotFound { id });
            };
            std::mem::replace(slot, doc.clone())
        };
        for index in self.indexes.values() {
            Self::unindex_doc(index, &old, id);
            Self::index_doc(index, &doc, id);
        }
        Ok(())
    }

    /// Removes the document under `id` and all its index entries.
    pub fn delete(&self, id: DocId) -> CollectionResult<()> {
        let old = self
            .docs
            .write()
            .unwrap()
            .remove(&id)
            .ok_or(CollectionError::NotFound { id })?;
        for index in self.indexes.values() {
            Self::unindex_doc(index, &old, id);
        }
        Ok(())
    }

    /// Indexes an attribute path, back-filling from existing documents.
    pub fn create_index(&mut self, path: &[&str]) -> CollectionResult<()> {
        let segments: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        let joined = join_path(&segments);
        if self.indexes.contains_key(&joined) {
            return Err(CollectionError::DuplicateIndex { path: joined });
        }
        let index = SecondaryIndex {
            path: segments,
            table: PartitionedIndex::new(self.num_parts),
        };
        for (id, doc) in self.docs.read().unwrap().iter() {
            Self::index_doc(&index, doc, *id);
        }
        self.indexes.insert(joined, index);
        Ok(())
    }

    /// Drops the index over an attribute path.
    pub fn drop_index(&mut self, path: &[&str]) -> CollectionResult<()> {
        let segments: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        let joined = join_path(&segments);
        match self.indexes.remove(&joined) {
            Some(_) => Ok(()),
            None => Err(CollectionError::UnknownIndex { path: joined }),
        }
    }

    /// Joined forms of every indexed path, sorted.
    pub fn indexed_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.indexes.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Number of live documents.
    pub fn len(&self) -> usize {
        self.docs.read().unwrap().len()
    }

    /// Returns true when the collection holds no documents.
    pub fn is_empty(&self) -> bool {
        self.docs.read().unwrap().is_empty()
    }

    /// Parses and evaluates a JSON-shaped query, adding matching ids to
    /// `result`.
    pub fn query(&self, query: &Value, result: &mut IdSet) -> QueryResult<()> {
        let expr = QueryExpr::parse(query)?;
        QueryEvaluator::new(self).evaluate(&expr, result)
    }

    fn index_doc(index: &SecondaryIndex, doc: &Value, id: DocId) {
        for leaf in crate::query::resolve(doc, &index.path) {
            index.table.put(str_hash(&canonical_str(leaf)), id);
        }
    }

    fn unindex_doc(index: &SecondaryIndex, doc: &Value, id: DocId) {
        for leaf in crate::query::resolve(doc, &index.path) {
            index.table.remove(str_hash(&canonical_str(leaf)), id);
        }
    }
}

impl QuerySource for Collection {
    fn read_doc(&self, id: DocId) -> CollectionResult<Value> {
        self.read(id)
    }

    fn for_each_doc_id(&self, visit: &mut dyn FnMut(DocId) -> bool) {
        for id in self.docs.read().unwrap().keys() {
            if !visit(*id) {
                break;
            }
        }
    }

    fn approx_doc_count(&self) -> usize {
        self.len()
    }

    fn num_parts(&self) -> usize {
        self.num_parts
    }

    fn is_indexed(&self, joined_path: &str) -> bool {
        self.indexes.contains_key(joined_path)
    }

    fn hash_index(&self, joined_path: &str) -> Option<&PartitionedIndex> {
        self.indexes.get(joined_path).map(|index| &index.table)
    }
}
