use std::collections::HashMap;

use codebin_core::{model::Snippet, model::SnippetId, traits::Storage};
use parking_lot::RwLock;
use thiserror::Error;

/// Uninhabited: no in-memory operation can fail.
#[derive(Debug, Error)]
pub enum EphemeralError {}

/// In-memory backend. Everything is lost on process exit.
pub struct EphemeralStorage {
    map: RwLock<HashMap<SnippetId, Snippet>>,
}

impl EphemeralStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

impl Default for EphemeralStorage {
    fn default() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }
}

impl Storage for EphemeralStorage {
    type Error = EphemeralError;

    fn put(&self, snippet: &Snippet) -> Result<(), Self::Error> {
        let mut map = self.map.write();
        map.insert(snippet.id.clone(), snippet.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Snippet>, Self::Error> {
        let map = self.map.read();
        Ok(map.get(id).cloned())
    }

    fn remove(&self, id: &str) -> Result<bool, Self::Error> {
        let mut map = self.map.write();
        Ok(map.remove(id).is_some())
    }

    fn list_all(&self) -> Result<Vec<Snippet>, Self::Error> {
        let map = self.map.read();
        Ok(map.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_remove_roundtrip() {
        let storage = EphemeralStorage::new();
        let s = Snippet::new("let x = 1;");
        let id = s.id.clone();
        storage.put(&s).unwrap();
        let got = storage.get(&id).unwrap().unwrap();
        assert_eq!(got, s);
        assert!(storage.remove(&id).unwrap());
        assert!(storage.get(&id).unwrap().is_none());
    }

    #[test]
    fn remove_missing_is_noop() {
        let storage = EphemeralStorage::new();
        assert!(!storage.remove("no-such-id").unwrap());
    }

    #[test]
    fn put_is_idempotent_per_id() {
        let storage = EphemeralStorage::new();
        let mut s = Snippet::new("v1");
        storage.put(&s).unwrap();
        s.record_view();
        storage.put(&s).unwrap();
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.get(&s.id).unwrap().unwrap().views, 1);
    }

    #[test]
    fn list_all_is_a_fresh_snapshot() {
        let storage = EphemeralStorage::new();
        let a = Snippet::new("a");
        let b = Snippet::new("b");
        let c = Snippet::new("c");
        for s in [&a, &b, &c] {
            storage.put(s).unwrap();
        }
        let ids = |v: Vec<Snippet>| {
            let mut ids: Vec<_> = v.into_iter().map(|s| s.id).collect();
            ids.sort();
            ids
        };
        let mut expected = vec![a.id.clone(), b.id.clone(), c.id.clone()];
        expected.sort();
        assert_eq!(ids(storage.list_all().unwrap()), expected);

        storage.remove(&b.id).unwrap();
        assert_eq!(storage.list_all().unwrap().len(), 2);
    }
}
