// Named definitions stored in a slotmap, looked up by name at load time and by
// key everywhere else.

use std::collections::HashMap;

use slotmap::{Key, SlotMap};

use crate::data::DataNode;
use crate::diagnostic::{Diagnostics, RefKind};

#[derive(Debug, Clone)]
pub struct Registry<K: Key, V> {
    kind: RefKind,
    items: SlotMap<K, V>,
    names: HashMap<String, K>,
    key_names: slotmap::SecondaryMap<K, String>,
}

impl<K: Key, V: Default> Registry<K, V> {
    pub fn new(kind: RefKind) -> Self {
        Self {
            kind,
            items: SlotMap::with_key(),
            names: HashMap::new(),
            key_names: slotmap::SecondaryMap::new(),
        }
    }

    /// Key for `name`, creating an empty definition if none exists yet.
    pub fn get_or_insert(&mut self, name: &str) -> K {
        if let Some(&key) = self.names.get(name) {
            return key;
        }
        let key = self.items.insert(V::default());
        self.names.insert(name.to_string(), key);
        self.key_names.insert(key, name.to_string());
        key
    }
}

impl<K: Key, V> Registry<K, V> {
    pub fn get(&self, name: &str) -> Option<K> {
        self.names.get(name).copied()
    }

    /// Like [`Registry::get`], but a miss is reported against `node`.
    pub fn lookup(&self, name: &str, node: &DataNode, diagnostics: &mut Diagnostics) -> Option<K> {
        let key = self.get(name);
        if key.is_none() {
            diagnostics.unknown(node, self.kind, name);
        }
        key
    }

    pub fn def(&self, key: K) -> Option<&V> {
        self.items.get(key)
    }

    pub fn def_mut(&mut self, key: K) -> Option<&mut V> {
        self.items.get_mut(key)
    }

    pub fn name_of(&self, key: K) -> Option<&str> {
        self.key_names.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Outfit, OutfitId};

    #[test]
    fn get_or_insert_is_stable_per_name() {
        let mut outfits: Registry<OutfitId, Outfit> = Registry::new(RefKind::Outfit);
        let a = outfits.get_or_insert("Laser Rifle");
        let b = outfits.get_or_insert("Laser Rifle");
        let c = outfits.get_or_insert("Blaster");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(outfits.len(), 2);
        assert_eq!(outfits.name_of(c), Some("Blaster"));
    }

    #[test]
    fn lookup_miss_is_reported_not_fatal() {
        let outfits: Registry<OutfitId, Outfit> = Registry::new(RefKind::Outfit);
        let node = DataNode::new(vec!["Ghost Gun".into()], 4);
        let mut diagnostics = Diagnostics::new();

        assert_eq!(outfits.lookup("Ghost Gun", &node, &mut diagnostics), None);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics.as_slice()[0].line(), 4);
    }
}
