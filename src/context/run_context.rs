//! Per-run store for values captured during execution
//!
//! Keys are `(origin_tcid, variable_name)`. Writes come from check `save_as`
//! outcomes and DIFF snapshots; reads come from `${tcid.variable}` references
//! in templates. Many virtual users may read and write concurrently; the last
//! writer wins and there is no ordering across users.

use std::collections::BTreeMap;
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct RunContext {
    values: DashMap<(String, String), String>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, replacing any previous one for the same key
    pub fn set(&self, origin: &str, key: &str, value: impl Into<String>) {
        self.values.insert((origin.to_string(), key.to_string()), value.into());
    }

    pub fn get(&self, origin: &str, key: &str) -> Option<String> {
        self.values
            .get(&(origin.to_string(), key.to_string()))
            .map(|entry| entry.value().clone())
    }

    pub fn contains(&self, origin: &str, key: &str) -> bool {
        self.values.contains_key(&(origin.to_string(), key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Point-in-time copy, rendered as `origin.key`, sorted
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .map(|entry| {
                let (origin, key) = entry.key();
                (format!("{}.{}", origin, key), entry.value().clone())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_set_get_overwrite() {
        let ctx = RunContext::new();
        assert!(ctx.is_empty());

        ctx.set("T1", "token", "abc");
        assert_eq!(ctx.get("T1", "token").as_deref(), Some("abc"));

        ctx.set("T1", "token", "def");
        assert_eq!(ctx.get("T1", "token").as_deref(), Some("def"));
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_keys_are_scoped_by_origin() {
        let ctx = RunContext::new();
        ctx.set("T1", "id", "1");
        ctx.set("T2", "id", "2");

        assert_eq!(ctx.get("T1", "id").as_deref(), Some("1"));
        assert_eq!(ctx.get("T2", "id").as_deref(), Some("2"));
        assert_eq!(ctx.get("T3", "id"), None);
        assert!(!ctx.contains("T3", "id"));
    }

    #[test]
    fn test_snapshot() {
        let ctx = RunContext::new();
        ctx.set("T2", "b", "2");
        ctx.set("T1", "a", "1");

        let snapshot = ctx.snapshot();
        let keys: Vec<_> = snapshot.keys().cloned().collect();
        assert_eq!(keys, vec!["T1.a", "T2.b"]);
    }

    #[test]
    fn test_concurrent_writers() {
        let ctx = Arc::new(RunContext::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ctx = ctx.clone();
                std::thread::spawn(move || {
                    for j in 0..100 {
                        ctx.set("T1", &format!("k{}", j % 10), format!("{}-{}", i, j));
                        let _ = ctx.get("T1", "k0");
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ctx.len(), 10);
    }
}
