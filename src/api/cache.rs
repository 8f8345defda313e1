//! Small in-memory response caches for the synchronous detect endpoints.
//!
//! Keyed on the (truncated) input text; a hit skips the LM slot entirely.
//! Bounded by a simple size cap: the cache clears when full rather than
//! tracking recency.

use dashmap::DashMap;
use serde_json::Value;

const CACHE_MAX_ENTRIES: usize = 256;

/// One text-keyed response cache.
#[derive(Debug, Default)]
pub struct TextCache {
    entries: DashMap<String, Value>,
}

impl TextCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, text: &str) -> Option<Value> {
        self.entries.get(&key(text)).map(|v| v.clone())
    }

    pub fn set(&self, text: &str, value: Value) {
        if self.entries.len() >= CACHE_MAX_ENTRIES {
            self.entries.clear();
        }
        self.entries.insert(key(text), value);
    }
}

fn key(text: &str) -> String {
    format!("{:x}", md5::compute(text.trim().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cache_roundtrip() {
        let cache = TextCache::new();
        assert!(cache.get("文本").is_none());
        cache.set("文本", json!({"score": 50}));
        assert_eq!(cache.get("文本").unwrap()["score"], 50);
        // Trimmed variants share the key.
        assert!(cache.get(" 文本 ").is_some());
    }
}
