// Item sets and per-item overrides for what a location sells.
//
// Both containers are generic over the item key so that outfits today and
// other item kinds later can share them.

use std::collections::{BTreeMap, BTreeSet};

use slotmap::Key;

use crate::data::DataNode;
use crate::diagnostic::Diagnostics;
use crate::registry::Registry;
use crate::sold::{Sold, Visibility};

// ============================================================================
// Catalog - a plain set of items
// ============================================================================

/// The set of items available somewhere. Membership only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog<K: Key + Ord> {
    items: BTreeSet<K>,
}

impl<K: Key + Ord> Default for Catalog<K> {
    fn default() -> Self {
        Self {
            items: BTreeSet::new(),
        }
    }
}

impl<K: Key + Ord> Catalog<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a block of entries:
    /// - `clear` or `remove` alone empties the catalog
    /// - `remove <name>` drops one item
    /// - `add <name>` or a bare `<name>` inserts one item
    pub fn load<V>(&mut self, node: &DataNode, items: &Registry<K, V>, diagnostics: &mut Diagnostics) {
        for child in node {
            let token = child.token(0);
            let remove = token == "clear" || token == "remove";
            if remove && child.size() == 1 {
                self.clear();
            } else if remove {
                if let Some(item) = items.lookup(child.token(1), child, diagnostics) {
                    self.remove(item);
                }
            } else if token == "add" && child.size() >= 2 {
                if let Some(item) = items.lookup(child.token(1), child, diagnostics) {
                    self.insert(item);
                }
            } else if let Some(item) = items.lookup(token, child, diagnostics) {
                self.insert(item);
            }
        }
    }

    /// Union with `other`.
    pub fn add(&mut self, other: &Catalog<K>) {
        self.items.extend(other.items.iter().copied());
    }

    /// Replace the contents with exactly the items `overlay` has records for.
    /// Whatever the catalog held before is discarded.
    pub fn set_from_overlay(&mut self, overlay: &ItemOverlay<K>) {
        self.items = overlay.keys().collect();
    }

    pub fn has(&self, item: K) -> bool {
        self.items.contains(&item)
    }

    pub fn insert(&mut self, item: K) -> bool {
        self.items.insert(item)
    }

    pub fn remove(&mut self, item: K) -> bool {
        self.items.remove(&item)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = K> + '_ {
        self.items.iter().copied()
    }
}

impl<K: Key + Ord> FromIterator<K> for Catalog<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<K: Key + Ord> Extend<K> for Catalog<K> {
    fn extend<I: IntoIterator<Item = K>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}

impl<K: Key + Ord> From<&ItemOverlay<K>> for Catalog<K> {
    fn from(overlay: &ItemOverlay<K>) -> Self {
        overlay.keys().collect()
    }
}

// ============================================================================
// ItemOverlay - per-item cost and visibility overrides
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ItemOverlay<K: Key + Ord> {
    items: BTreeMap<K, Sold>,
}

impl<K: Key + Ord> Default for ItemOverlay<K> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }
}

impl<K: Key + Ord> ItemOverlay<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a block of entries:
    /// - `clear` or `remove` alone empties the overlay, `remove <name>` drops one item
    /// - `[add] <name> [cost] [visibility]` sets one record
    /// - an `import` or `hidden` heading sets the visibility of every entry under it
    ///
    /// A bad entry is reported and skipped; the rest of the block still loads.
    pub fn load<V>(&mut self, node: &DataNode, items: &Registry<K, V>, diagnostics: &mut Diagnostics) {
        for child in node {
            self.load_entry(child, None, items, diagnostics);
        }
    }

    fn load_entry<V>(
        &mut self,
        child: &DataNode,
        heading: Option<Visibility>,
        items: &Registry<K, V>,
        diagnostics: &mut Diagnostics,
    ) {
        let token = child.token(0);
        let remove = token == "clear" || token == "remove";
        if remove && child.size() == 1 {
            self.clear();
        } else if remove {
            if let Some(item) = items.lookup(child.token(1), child, diagnostics) {
                self.remove(item);
            }
        } else if heading.is_none()
            && child.size() == 1
            && child.has_children()
            && matches!(token, "import" | "hidden")
        {
            let shown = Visibility::from_token(token);
            for grand in child {
                self.load_entry(grand, shown, items, diagnostics);
            }
        } else {
            let name_index = usize::from(token == "add" && child.size() >= 2);
            self.load_record(child, name_index, heading, items, diagnostics);
        }
    }

    fn load_record<V>(
        &mut self,
        child: &DataNode,
        name_index: usize,
        heading: Option<Visibility>,
        items: &Registry<K, V>,
        diagnostics: &mut Diagnostics,
    ) {
        let cost_index = name_index + 1;
        let shown_index = name_index + 2;

        let cost = if child.size() > cost_index {
            match child.value(cost_index) {
                Some(cost) => cost,
                None => {
                    diagnostics.invalid_number(child, cost_index);
                    return;
                }
            }
        } else {
            0.
        };

        let shown = match heading {
            Some(shown) => {
                if child.size() > shown_index {
                    diagnostics.ignored(child, "visibility under a heading is taken from the heading");
                }
                shown
            }
            None => match Visibility::from_token(child.token(shown_index)) {
                Some(shown) => shown,
                None => {
                    diagnostics.unrecognized(child, "visibility");
                    return;
                }
            },
        };

        if child.size() > shown_index + 1 {
            diagnostics.ignored(child, "extra tokens after visibility");
        }

        if let Some(item) = items.lookup(child.token(name_index), child, diagnostics) {
            self.items.entry(item).or_default().set_base(cost, shown);
        }
    }

    /// Merge `other` into `self` item by item: on equal visibility the higher
    /// cost is kept, otherwise the higher visibility wins with its own cost.
    /// Merging an overlay into itself changes nothing, and the result does not
    /// depend on the order in which `other` is walked.
    pub fn add(&mut self, other: &ItemOverlay<K>) {
        for (&item, &sold) in &other.items {
            self.items
                .entry(item)
                .and_modify(|ours| ours.merge(sold))
                .or_insert(sold);
        }
    }

    pub fn sold(&self, item: K) -> Option<&Sold> {
        self.items.get(&item)
    }

    pub fn has(&self, item: K) -> bool {
        self.items.contains_key(&item)
    }

    pub fn insert(&mut self, item: K, sold: Sold) -> Option<Sold> {
        self.items.insert(item, sold)
    }

    pub fn remove(&mut self, item: K) -> Option<Sold> {
        self.items.remove(&item)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.items.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &Sold)> + '_ {
        self.items.iter().map(|(k, v)| (*k, v))
    }
}
