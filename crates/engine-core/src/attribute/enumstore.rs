//! String dictionary shared by enumerated string attributes (spec §3
//! "optional enumStore", §5 "enum stores protected by a read-write
//! mutex").
//!
//! Spec §9 flags the cyclic reference between an attribute, its enum
//! guard, and its dictionary as something to redesign away from
//! source-style shared/weak pointers. As with [`super::column_store`],
//! this is modeled with a generation-counted `Arc` behind a lock: interning
//! a new value copies the dictionary (copy-on-write), publishes it, and
//! any [`AttributeEnumGuard`] taken before that keeps the old dictionary
//! (and therefore every id it ever handed out) alive for as long as the
//! guard lives.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;

pub type EnumId = u32;

#[derive(Default)]
struct EnumDict {
    by_value: IndexMap<String, EnumId>,
    by_id: Vec<String>,
}

/// Read-side handle pinning one generation of the dictionary alive,
/// mirroring [`super::column_store::AttributeGuard`] but for the enum
/// store (spec's `getAttributeStableEnum`).
pub struct AttributeEnumGuard {
    dict: Arc<EnumDict>,
}

impl AttributeEnumGuard {
    pub fn resolve(&self, id: EnumId) -> Option<&str> {
        self.dict.by_id.get(id as usize).map(|s| s.as_str())
    }

    pub fn lookup(&self, value: &str) -> Option<EnumId> {
        self.dict.by_value.get(value).copied()
    }
}

pub struct EnumStore {
    dict: RwLock<Arc<EnumDict>>,
    /// Reference counts per enum id across the *working* generation,
    /// used so a value can be dropped from the dictionary once nothing
    /// in the working attribute refers to it anymore. Older generations
    /// pinned by a guard keep their own `Arc<EnumDict>` regardless.
    refcounts: HashMap<EnumId, u32>,
}

impl Default for EnumStore {
    fn default() -> Self {
        EnumStore { dict: RwLock::new(Arc::new(EnumDict::default())), refcounts: HashMap::new() }
    }
}

impl EnumStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `value`, returning its stable id. Existing ids never
    /// change meaning; a brand-new value triggers a copy-on-write publish
    /// of the dictionary.
    pub fn intern(&mut self, value: &str) -> EnumId {
        {
            let dict = self.dict.read().unwrap();
            if let Some(&id) = dict.by_value.get(value) {
                *self.refcounts.entry(id).or_insert(0) += 1;
                return id;
            }
        }
        let mut dict = self.dict.read().unwrap().as_ref().clone_dict();
        let id = dict.by_id.len() as EnumId;
        dict.by_id.push(value.to_string());
        dict.by_value.insert(value.to_string(), id);
        *self.dict.write().unwrap() = Arc::new(dict);
        self.refcounts.insert(id, 1);
        id
    }

    pub fn release(&mut self, id: EnumId) {
        if let Some(count) = self.refcounts.get_mut(&id) {
            *count = count.saturating_sub(1);
        }
    }

    pub fn guard(&self) -> AttributeEnumGuard {
        AttributeEnumGuard { dict: self.dict.read().unwrap().clone() }
    }

    pub fn resolve(&self, id: EnumId) -> Option<String> {
        self.dict.read().unwrap().by_id.get(id as usize).cloned()
    }

    pub fn lookup(&self, value: &str) -> Option<EnumId> {
        self.dict.read().unwrap().by_value.get(value).copied()
    }

    pub fn len(&self) -> usize {
        self.dict.read().unwrap().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EnumDict {
    fn clone_dict(&self) -> EnumDict {
        EnumDict { by_value: self.by_value.clone(), by_id: self.by_id.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent_for_same_value() {
        let mut store = EnumStore::new();
        let a = store.intern("hello");
        let b = store.intern("hello");
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn guard_keeps_old_dictionary_visible() {
        let mut store = EnumStore::new();
        let id = store.intern("alpha");
        let guard = store.guard();
        store.intern("beta");
        assert_eq!(guard.resolve(id), Some("alpha"));
        assert_eq!(guard.lookup("beta"), None, "guard predates beta's insertion");
        assert_eq!(store.lookup("beta"), Some(1));
    }
}
