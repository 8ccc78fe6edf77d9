//! Compiled scripts keyed by exact source text.

use std::rc::Rc;

use indexmap::IndexMap;
use quire_types::ast::script::Script;

pub const DEFAULT_EXECUTOR_CACHE_CAPACITY: usize = 256;

/// A bounded cache that evicts in insertion order. Hits do not refresh an
/// entry's position. A capacity of zero disables caching.
#[derive(Debug)]
pub struct ExecutorCache {
    entries: IndexMap<String, Rc<Script>>,
    capacity: usize,
}

impl Default for ExecutorCache {
    fn default() -> Self {
        Self::new(DEFAULT_EXECUTOR_CACHE_CAPACITY)
    }
}

impl ExecutorCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            capacity,
        }
    }

    pub fn get(&self, source: &str) -> Option<Rc<Script>> {
        self.entries.get(source).cloned()
    }

    pub fn insert(&mut self, source: &str, script: Rc<Script>) {
        if self.capacity == 0 || self.entries.contains_key(source) {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.shift_remove_index(0);
        }
        self.entries.insert(source.to_string(), script);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
