//! Bounded tool_use/tool_result correlation map (§4.C, §8 property 2).
//!
//! Keyed by `tool_id`; evicts the oldest entry by insertion order once the
//! cap is reached. Parsing proceeds strictly forward through an
//! append-only file, so insertion order and `executed_at` order coincide —
//! a `HashMap` plus a `VecDeque` of keys gives O(1) eviction without
//! pulling in a sorted-map crate, per the design note that a plain hash
//! map with opportunistic sweep is acceptable provided worst case memory
//! is bounded.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde_json::Value;

pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Clone)]
pub struct PendingToolUse {
    pub tool_id: String,
    pub tool_name: String,
    pub input: Value,
    pub conversation_id: String,
    pub working_directory: Option<String>,
    pub git_branch: Option<String>,
    pub executed_at: DateTime<Utc>,
}

pub struct InflightMap {
    max_entries: usize,
    order: VecDeque<String>,
    entries: HashMap<String, PendingToolUse>,
    pub evicted: usize,
}

impl InflightMap {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            order: VecDeque::new(),
            entries: HashMap::new(),
            evicted: 0,
        }
    }

    /// Insert a new pending tool_use; returns the evicted tool_id, if any.
    pub fn insert(&mut self, entry: PendingToolUse) -> Option<String> {
        let id = entry.tool_id.clone();
        if self.entries.insert(id.clone(), entry).is_none() {
            self.order.push_back(id);
        }

        if self.entries.len() > self.max_entries {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
                self.evicted += 1;
                return Some(oldest);
            }
        }
        None
    }

    /// Remove and return a pending tool_use on pairing with its tool_result.
    pub fn take(&mut self, tool_id: &str) -> Option<PendingToolUse> {
        let entry = self.entries.remove(tool_id)?;
        self.order.retain(|id| id != tool_id);
        Some(entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> PendingToolUse {
        PendingToolUse {
            tool_id: id.into(),
            tool_name: "Bash".into(),
            input: serde_json::json!({}),
            conversation_id: "c".into(),
            working_directory: None,
            git_branch: None,
            executed_at: Utc::now(),
        }
    }

    #[test]
    fn evicts_oldest_once_over_cap() {
        let mut map = InflightMap::new(2);
        assert_eq!(map.insert(entry("a")), None);
        assert_eq!(map.insert(entry("b")), None);
        assert_eq!(map.insert(entry("c")), Some("a".to_string()));
        assert_eq!(map.len(), 2);
        assert!(map.take("a").is_none());
        assert!(map.take("b").is_some());
    }

    #[test]
    fn twenty_thousand_dangling_entries_peak_at_cap() {
        let mut map = InflightMap::new(DEFAULT_MAX_ENTRIES);
        for i in 0..20_000 {
            map.insert(entry(&format!("t{i}")));
        }
        assert!(map.len() <= DEFAULT_MAX_ENTRIES);
        assert_eq!(map.len(), DEFAULT_MAX_ENTRIES);
    }
}
