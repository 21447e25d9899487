// Custom sales: conditional price overlays on top of the base outfit costs.
//
// An overlay holds relative prices and offsets keyed either by outfit or by
// outfitter (a group of outfits). Overlays authored in data files are folded
// into one overlay per planet when a price is asked for, and the folded
// overlay answers the query.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::DataNode;
use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::predicate::{ConditionSet, ConditionStore, LocationFilter};
use crate::sale::Catalog;
use crate::types::{OutfitId, OutfitterId, Planet, PlanetId};
use crate::world::{Definitions, Outfitters};

/// Overlay-wide availability. Variants are in priority order: when two
/// overlays are folded, one with a later variant replaces the other outright.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SellType {
    #[default]
    Default,
    Import,
}

impl SellType {
    /// Whether an overlay of this type replaces one of `other` when folded.
    pub fn supersedes(self, other: SellType) -> bool {
        self > other
    }

    /// The visibility token shops use for this sell type.
    pub fn shown_token(self) -> &'static str {
        match self {
            SellType::Default => "",
            SellType::Import => "import",
        }
    }
}

/// Which keys the entries of a `custom sale` block address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Outfits,
    Outfitters,
}

impl Mode {
    pub fn from_token(token: &str) -> Option<Mode> {
        match token {
            "outfits" => Some(Mode::Outfits),
            "outfitters" => Some(Mode::Outfitters),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Value,
    Offset,
}

#[derive(Debug, Clone, Default)]
pub struct PricingOverlay {
    sell_type: SellType,

    outfit_prices: BTreeMap<OutfitId, f64>,
    outfit_offsets: BTreeMap<OutfitId, f64>,
    outfitter_prices: BTreeMap<OutfitterId, f64>,
    outfitter_offsets: BTreeMap<OutfitterId, f64>,

    /// Exact planet; when set the filter is not consulted.
    location: Option<PlanetId>,
    location_filter: LocationFilter,
    conditions: ConditionSet,

    // Every outfit any of the four maps touches. Rebuilt on demand.
    seen: Catalog<OutfitId>,
    seen_valid: bool,
}

impl PricingOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a `custom sale <mode>` block. The mode token decides whether
    /// entries name outfits or outfitters. Bad entries are reported and
    /// skipped; everything else still loads.
    pub fn load(&mut self, node: &DataNode, defs: &Definitions, diagnostics: &mut Diagnostics) {
        self.seen_valid = false;
        let mode = Mode::from_token(node.token(1));
        if mode.is_none() {
            diagnostics.unrecognized(node, "sale mode");
        }

        for child in node {
            let token = child.token(0);
            let remove = token == "remove";
            let add = token == "add";
            let key = child.token(usize::from(add || remove));

            if remove && child.size() == 1 {
                self.clear();
            } else if remove {
                self.load_removal(child, key, defs, diagnostics);
            } else if add && key == "location" {
                if child.size() == 2 && child.has_children() {
                    self.location_filter.load(child, &defs.planets, diagnostics);
                } else {
                    diagnostics.unrecognized(child, "location extension");
                }
            } else if add && key == "conditions" {
                self.conditions.load(child, diagnostics);
            } else if !add && key == "default" {
                self.sell_type = SellType::Default;
            } else if !add && key == "import" {
                self.sell_type = SellType::Import;
            } else if !add && key == "location" {
                self.load_location(child, defs, diagnostics);
            } else if !add && key == "conditions" {
                // A plain `conditions` block replaces, it does not extend.
                self.conditions = ConditionSet::default();
                self.conditions.load(child, diagnostics);
            } else if let Some(mode) = mode {
                let heading = match token {
                    "value" => Some(Axis::Value),
                    "offset" => Some(Axis::Offset),
                    _ => None,
                };
                match heading {
                    Some(axis) if child.has_children() => {
                        for grand in child {
                            self.load_entry(mode, axis, grand, defs, diagnostics);
                        }
                    }
                    Some(_) => diagnostics.unrecognized(child, "empty heading"),
                    // Entries outside a heading are values.
                    None => self.load_entry(mode, Axis::Value, child, defs, diagnostics),
                }
            } else {
                diagnostics.unrecognized(child, "attribute");
            }
        }
    }

    fn load_removal(&mut self, child: &DataNode, key: &str, defs: &Definitions, diagnostics: &mut Diagnostics) {
        match key {
            "outfit" if child.size() >= 3 => {
                if let Some(outfit) = defs.outfits.lookup(child.token(2), child, diagnostics) {
                    self.outfit_prices.remove(&outfit);
                    self.outfit_offsets.remove(&outfit);
                }
            }
            "outfit" => {
                self.outfit_prices.clear();
                self.outfit_offsets.clear();
            }
            "outfitter" if child.size() >= 3 => {
                if let Some(outfitter) = defs.outfitters.lookup(child.token(2), child, diagnostics) {
                    self.outfitter_prices.remove(&outfitter);
                    self.outfitter_offsets.remove(&outfitter);
                }
            }
            "outfitter" => {
                self.outfitter_prices.clear();
                self.outfitter_offsets.clear();
            }
            "location" => {
                self.location = None;
                self.location_filter = LocationFilter::default();
            }
            "conditions" => self.conditions = ConditionSet::default(),
            _ => diagnostics.unrecognized(child, "removal"),
        }
    }

    fn load_location(&mut self, child: &DataNode, defs: &Definitions, diagnostics: &mut Diagnostics) {
        match child.size() {
            // A whole filter.
            1 => {
                self.location = None;
                self.location_filter = LocationFilter::default();
                self.location_filter.load(child, &defs.planets, diagnostics);
            }
            // Just a planet. An unknown planet matches nowhere.
            2 => {
                self.location = defs.planets.lookup(child.token(1), child, diagnostics);
                self.location_filter = match self.location {
                    Some(_) => LocationFilter::default(),
                    None => LocationFilter::nowhere(),
                };
                if self.location.is_some() && child.has_children() {
                    diagnostics.ignored(child, "location filter ignored due to use of explicit planet");
                }
            }
            _ => diagnostics.ignored(child, "use a location filter to choose from multiple planets"),
        }
    }

    fn load_entry(
        &mut self,
        mode: Mode,
        axis: Axis,
        line: &DataNode,
        defs: &Definitions,
        diagnostics: &mut Diagnostics,
    ) {
        let is_add = line.token(0) == "add" && line.size() >= 2;
        let name = line.token(usize::from(is_add));

        match mode {
            Mode::Outfits => {
                let Some(outfit) = defs.outfits.lookup(name, line, diagnostics) else {
                    return;
                };
                let base_cost = defs.outfits.def(outfit).map_or(0., |o| o.cost);
                let Some(amount) = parse_value_or_offset(line, is_add, Some(base_cost), diagnostics) else {
                    return;
                };
                let map = match axis {
                    Axis::Value => &mut self.outfit_prices,
                    Axis::Offset => &mut self.outfit_offsets,
                };
                store(map, outfit, amount, is_add);
            }
            Mode::Outfitters => {
                let Some(outfitter) = defs.outfitters.lookup(name, line, diagnostics) else {
                    return;
                };
                // Groups have no single base cost, so their values are always relative.
                let Some(amount) = parse_value_or_offset(line, is_add, None, diagnostics) else {
                    return;
                };
                let map = match axis {
                    Axis::Value => &mut self.outfitter_prices,
                    Axis::Offset => &mut self.outfitter_offsets,
                };
                store(map, outfitter, amount, is_add);
            }
        }
    }

    /// Fold `other` into this overlay for a query at `planet` under `store`.
    ///
    /// If this overlay no longer applies there it is reset first. If `other`
    /// does not apply, nothing else happens and `false` is returned. A higher
    /// sell type replaces this overlay outright; otherwise prices keep the
    /// maximum per key and offsets add up.
    pub fn add(&mut self, other: &PricingOverlay, id: PlanetId, planet: &Planet, store: &ConditionStore) -> bool {
        self.seen_valid = false;
        let reset = !self.matches(id, planet, store);
        if reset {
            self.clear();
        }
        if !other.matches(id, planet, store) {
            trace_fold("skipped", reset, planet);
            return false;
        }

        if other.sell_type.supersedes(self.sell_type) {
            *self = other.clone();
            self.seen_valid = false;
            trace_fold("replaced", reset, planet);
            return true;
        }

        merge_max(&mut self.outfitter_prices, &other.outfitter_prices);
        merge_sum(&mut self.outfitter_offsets, &other.outfitter_offsets);
        merge_max(&mut self.outfit_prices, &other.outfit_prices);
        merge_sum(&mut self.outfit_offsets, &other.outfit_offsets);
        trace_fold("merged", reset, planet);
        true
    }

    /// Multiplier for `outfit`'s base cost under this overlay.
    ///
    /// An outfit price beats any outfitter price; among outfitters the first
    /// one (in key order) containing the outfit supplies the price. Offsets
    /// from the outfit and from every containing outfitter add up, and the
    /// total is applied as a fraction of the chosen price, not of the base
    /// cost. With no override at all the result is `1.0`.
    pub fn relative_cost(&self, outfit: OutfitId, outfitters: &Outfitters) -> f64 {
        let price = self.outfit_prices.get(&outfit).copied().or_else(|| {
            self.outfitter_prices
                .iter()
                .find(|(group, _)| contains(outfitters, **group, outfit))
                .map(|(_, price)| *price)
        });

        let mut offset = self.outfit_offsets.get(&outfit).copied();
        for (group, group_offset) in &self.outfitter_offsets {
            if contains(outfitters, *group, outfit) {
                *offset.get_or_insert(0.) += group_offset;
            }
        }

        match (price, offset) {
            (Some(price), Some(offset)) => price + price * offset,
            (Some(price), None) => price,
            (None, Some(offset)) => 1. + offset,
            (None, None) => 1.,
        }
    }

    pub fn sell_type(&self) -> SellType {
        self.sell_type
    }

    /// Every outfit this overlay touches, directly or through an outfitter.
    /// Cached until the next mutation.
    pub fn covered_items(&mut self, outfitters: &Outfitters) -> &Catalog<OutfitId> {
        if !self.seen_valid {
            self.seen.clear();
            self.seen.extend(self.outfit_prices.keys().copied());
            self.seen.extend(self.outfit_offsets.keys().copied());
            for group in self.outfitter_prices.keys().chain(self.outfitter_offsets.keys()) {
                if let Some(catalog) = outfitters.def(*group) {
                    self.seen.add(catalog);
                }
            }
            self.seen_valid = true;
        }
        &self.seen
    }

    pub fn is_empty(&mut self, outfitters: &Outfitters) -> bool {
        self.covered_items(outfitters).is_empty()
    }

    /// Whether this overlay touches `outfit`. Does not build the cache.
    pub fn has(&self, outfit: OutfitId, outfitters: &Outfitters) -> bool {
        self.outfit_prices.contains_key(&outfit)
            || self.outfit_offsets.contains_key(&outfit)
            || self
                .outfitter_prices
                .keys()
                .chain(self.outfitter_offsets.keys())
                .any(|group| contains(outfitters, *group, outfit))
    }

    /// Whether this overlay applies at `planet` under `store`.
    pub fn matches(&self, id: PlanetId, planet: &Planet, store: &ConditionStore) -> bool {
        let here = match self.location {
            Some(location) => location == id,
            None => self.location_filter.matches(id, planet),
        };
        here && (self.conditions.is_empty() || self.conditions.test(store))
    }

    pub fn clear(&mut self) {
        *self = PricingOverlay::default();
    }

    // === Direct access ===

    pub fn outfit_price(&self, outfit: OutfitId) -> Option<f64> {
        self.outfit_prices.get(&outfit).copied()
    }

    pub fn outfit_offset(&self, outfit: OutfitId) -> Option<f64> {
        self.outfit_offsets.get(&outfit).copied()
    }

    pub fn outfitter_price(&self, outfitter: OutfitterId) -> Option<f64> {
        self.outfitter_prices.get(&outfitter).copied()
    }

    pub fn outfitter_offset(&self, outfitter: OutfitterId) -> Option<f64> {
        self.outfitter_offsets.get(&outfitter).copied()
    }

    pub fn location(&self) -> Option<PlanetId> {
        self.location
    }

    pub fn set_sell_type(&mut self, sell_type: SellType) {
        self.sell_type = sell_type;
    }

    pub fn set_outfit_price(&mut self, outfit: OutfitId, price: f64) {
        self.seen_valid = false;
        self.outfit_prices.insert(outfit, price);
    }

    pub fn set_outfit_offset(&mut self, outfit: OutfitId, offset: f64) {
        self.seen_valid = false;
        self.outfit_offsets.insert(outfit, offset);
    }

    pub fn set_outfitter_price(&mut self, outfitter: OutfitterId, price: f64) {
        self.seen_valid = false;
        self.outfitter_prices.insert(outfitter, price);
    }

    pub fn set_outfitter_offset(&mut self, outfitter: OutfitterId, offset: f64) {
        self.seen_valid = false;
        self.outfitter_offsets.insert(outfitter, offset);
    }

    pub fn set_location(&mut self, location: Option<PlanetId>) {
        self.location = location;
    }

    pub fn set_location_filter(&mut self, filter: LocationFilter) {
        self.location_filter = filter;
    }

    pub fn set_conditions(&mut self, conditions: ConditionSet) {
        self.conditions = conditions;
    }
}

/// Read the amount of a value/offset entry: `[add] <name> [number [%]]`.
///
/// With no number the amount is `1.0`. A number without `%` is an absolute
/// price and is divided by `base_cost`; with `%`, or when there is no base
/// cost to divide by (outfitters), it is already relative.
fn parse_value_or_offset(
    line: &DataNode,
    is_add: bool,
    base_cost: Option<f64>,
    diagnostics: &mut Diagnostics,
) -> Option<f64> {
    let index = 1 + usize::from(is_add);
    if line.size() <= index {
        return Some(1.);
    }
    let Some(amount) = line.value(index) else {
        diagnostics.invalid_number(line, index);
        return None;
    };

    let absolute = line.token(index + 1) != "%";
    match base_cost {
        Some(cost) if absolute => {
            if cost == 0. {
                diagnostics.report(Diagnostic::ZeroBaseCost {
                    line: line.line(),
                    name: line.token(index - 1).to_string(),
                });
                None
            } else {
                Some(amount / cost)
            }
        }
        _ => Some(amount),
    }
}

fn store<K: Ord>(map: &mut BTreeMap<K, f64>, key: K, amount: f64, accumulate: bool) {
    if accumulate {
        *map.entry(key).or_insert(0.) += amount;
    } else {
        map.insert(key, amount);
    }
}

fn merge_max<K: Ord + Copy>(ours: &mut BTreeMap<K, f64>, theirs: &BTreeMap<K, f64>) {
    for (&key, &value) in theirs {
        let entry = ours.entry(key).or_insert(value);
        if *entry < value {
            *entry = value;
        }
    }
}

fn merge_sum<K: Ord + Copy>(ours: &mut BTreeMap<K, f64>, theirs: &BTreeMap<K, f64>) {
    for (&key, &value) in theirs {
        ours.entry(key)
            .and_modify(|v| *v += value)
            .or_insert(value);
    }
}

fn contains(outfitters: &Outfitters, group: OutfitterId, outfit: OutfitId) -> bool {
    outfitters.def(group).is_some_and(|catalog| catalog.has(outfit))
}

#[allow(unused_variables)]
fn trace_fold(outcome: &'static str, reset: bool, planet: &Planet) {
    #[cfg(feature = "instrument")]
    tracing::info!(
        target: "overlay_fold",
        outcome = outcome,
        reset = reset,
        planet = planet.name.as_str(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataFile;

    struct Fixture {
        defs: Definitions,
        laser: OutfitId,
        blaster: OutfitId,
        shield: OutfitId,
        weapons: OutfitterId,
        earth: PlanetId,
        mars: PlanetId,
    }

    fn fixture() -> Fixture {
        let mut defs = Definitions::new();
        let laser = defs.add_outfit("Laser Rifle", 1000.);
        let blaster = defs.add_outfit("Blaster", 400.);
        let shield = defs.add_outfit("Shield", 0.);
        let weapons = defs.add_outfitter("Weapons", [laser, blaster]);
        let earth = defs.add_planet("Earth", ["core"]);
        let mars = defs.add_planet("Mars", ["frontier"]);
        Fixture {
            defs,
            laser,
            blaster,
            shield,
            weapons,
            earth,
            mars,
        }
    }

    fn load(f: &Fixture, text: &str) -> (PricingOverlay, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let file = DataFile::parse(text, &mut diagnostics);
        let mut overlay = PricingOverlay::new();
        overlay.load(&file.nodes[0], &f.defs, &mut diagnostics);
        (overlay, diagnostics)
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    impl Fixture {
        fn planet(&self, id: PlanetId) -> &Planet {
            self.defs.planets.def(id).unwrap()
        }
    }

    #[test]
    fn absolute_values_are_divided_by_base_cost() {
        let f = fixture();
        let (overlay, diagnostics) = load(&f, "sale outfits\n\t\"Laser Rifle\" 1500\n\tBlaster 80 %\n");
        assert!(diagnostics.is_empty());
        assert!(approx(overlay.outfit_price(f.laser).unwrap(), 1.5));
        assert!(approx(overlay.outfit_price(f.blaster).unwrap(), 80.));
    }

    #[test]
    fn bare_entry_defaults_to_one() {
        let f = fixture();
        let (overlay, _) = load(&f, "sale outfits\n\tBlaster\n");
        assert_eq!(overlay.outfit_price(f.blaster), Some(1.));
    }

    #[test]
    fn outfitter_values_are_always_relative() {
        let f = fixture();
        let (overlay, diagnostics) = load(&f, "sale outfitters\n\tvalue\n\t\tWeapons 2\n\toffset\n\t\tWeapons 0.25 %\n");
        assert!(diagnostics.is_empty());
        assert_eq!(overlay.outfitter_price(f.weapons), Some(2.));
        assert_eq!(overlay.outfitter_offset(f.weapons), Some(0.25));
    }

    #[test]
    fn add_prefix_accumulates_from_zero() {
        let f = fixture();
        let (overlay, diagnostics) = load(
            &f,
            "sale outfits\n\toffset\n\t\tadd Blaster 0.1 %\n\t\tadd Blaster 0.2 %\n\t\tadd \"Laser Rifle\"\n",
        );
        assert!(diagnostics.is_empty());
        assert!(approx(overlay.outfit_offset(f.blaster).unwrap(), 0.3));
        assert_eq!(overlay.outfit_offset(f.laser), Some(1.));
    }

    #[test]
    fn add_prefix_divides_only_the_delta() {
        let f = fixture();
        let (overlay, _) = load(&f, "sale outfits\n\tBlaster 1 %\n\tadd Blaster 200\n");
        assert!(approx(overlay.outfit_price(f.blaster).unwrap(), 1.5));
    }

    #[test]
    fn zero_base_cost_needs_a_relative_value() {
        let f = fixture();
        let (overlay, diagnostics) = load(&f, "sale outfits\n\tShield 300\n\tBlaster 2 %\n");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics.as_slice()[0].kind(), "zero-base-cost");
        assert_eq!(overlay.outfit_price(f.shield), None);
        assert_eq!(overlay.outfit_price(f.blaster), Some(2.));
    }

    #[test]
    fn sell_type_location_and_conditions_directives() {
        let f = fixture();
        let (overlay, diagnostics) = load(
            &f,
            "sale outfits\n\timport\n\tlocation Mars\n\tconditions\n\t\thas war\n\tBlaster 1 %\n",
        );
        assert!(diagnostics.is_empty());
        assert_eq!(overlay.sell_type(), SellType::Import);
        assert_eq!(overlay.location(), Some(f.mars));

        let war = ConditionStore::new().with("war", 1);
        assert!(overlay.matches(f.mars, f.planet(f.mars), &war));
        assert!(!overlay.matches(f.mars, f.planet(f.mars), &ConditionStore::new()));
        assert!(!overlay.matches(f.earth, f.planet(f.earth), &war));
    }

    #[test]
    fn explicit_planet_wins_over_nested_filter() {
        let f = fixture();
        let (overlay, diagnostics) = load(&f, "sale outfits\n\tlocation Mars\n\t\tattributes core\n");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics.as_slice()[0].kind(), "ignored");
        assert!(overlay.matches(f.mars, f.planet(f.mars), &ConditionStore::new()));
        assert!(!overlay.matches(f.earth, f.planet(f.earth), &ConditionStore::new()));
    }

    #[test]
    fn location_filter_and_add_location() {
        let f = fixture();
        let (overlay, diagnostics) = load(
            &f,
            "sale outfits\n\tlocation\n\t\tattributes core frontier\n\tadd location\n\t\tnot planet Earth\n",
        );
        assert!(diagnostics.is_empty());
        let none = ConditionStore::new();
        assert!(overlay.matches(f.mars, f.planet(f.mars), &none));
        assert!(!overlay.matches(f.earth, f.planet(f.earth), &none));
    }

    #[test]
    fn conditions_replace_but_add_conditions_extends() {
        let f = fixture();
        let (replaced, _) = load(
            &f,
            "sale outfits\n\tconditions\n\t\thas war\n\tconditions\n\t\thas peace\n",
        );
        let peace = ConditionStore::new().with("peace", 1);
        assert!(replaced.matches(f.earth, f.planet(f.earth), &peace));

        let (extended, _) = load(
            &f,
            "sale outfits\n\tconditions\n\t\thas war\n\tadd conditions\n\t\thas peace\n",
        );
        assert!(!extended.matches(f.earth, f.planet(f.earth), &peace));
        assert!(extended.matches(f.earth, f.planet(f.earth), &peace.with("war", 1)));
    }

    #[test]
    fn removals_clear_one_axis() {
        let f = fixture();
        let (overlay, diagnostics) = load(
            &f,
            "sale outfits\n\tBlaster 1 %\n\t\"Laser Rifle\" 2 %\n\toffset\n\t\tBlaster 0.5 %\n\tremove outfit Blaster\n\tlocation Mars\n\tremove location\n",
        );
        assert!(diagnostics.is_empty());
        assert_eq!(overlay.outfit_price(f.blaster), None);
        assert_eq!(overlay.outfit_offset(f.blaster), None);
        assert_eq!(overlay.outfit_price(f.laser), Some(2.));
        assert_eq!(overlay.location(), None);

        let (cleared, _) = load(&f, "sale outfits\n\tBlaster 1 %\n\timport\n\tremove\n");
        assert_eq!(cleared.outfit_price(f.blaster), None);
        assert_eq!(cleared.sell_type(), SellType::Default);
    }

    #[test]
    fn outfit_removal_without_a_name_clears_every_outfit() {
        let f = fixture();
        let (overlay, diagnostics) = load(
            &f,
            "sale outfits\n\tBlaster 1 %\n\t\"Laser Rifle\" 2 %\n\toffset\n\t\tShield 0.5 %\n\tremove outfit\n\tBlaster 3 %\n",
        );
        assert!(diagnostics.is_empty());
        assert_eq!(overlay.outfit_price(f.laser), None);
        assert_eq!(overlay.outfit_offset(f.shield), None);
        // Entries after the removal still load.
        assert_eq!(overlay.outfit_price(f.blaster), Some(3.));
    }

    #[test]
    fn outfitter_removals_clear_one_group_or_all() {
        let mut f = fixture();
        let shields = f.defs.add_outfitter("Shields", [f.shield]);
        let text = "sale outfitters\n\tWeapons 2\n\tShields 3\n\toffset\n\t\tWeapons 0.1\n\t\tShields 0.2\n";

        let (one, diagnostics) = load(&f, &format!("{text}\tremove outfitter Weapons\n"));
        assert!(diagnostics.is_empty());
        assert_eq!(one.outfitter_price(f.weapons), None);
        assert_eq!(one.outfitter_offset(f.weapons), None);
        assert_eq!(one.outfitter_price(shields), Some(3.));
        assert_eq!(one.outfitter_offset(shields), Some(0.2));

        let (all, diagnostics) = load(&f, &format!("{text}\tremove outfitter\n"));
        assert!(diagnostics.is_empty());
        for group in [f.weapons, shields] {
            assert_eq!(all.outfitter_price(group), None);
            assert_eq!(all.outfitter_offset(group), None);
        }

        let (unknown, diagnostics) = load(&f, &format!("{text}\tremove outfitter Armory\n"));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(unknown.outfitter_price(f.weapons), Some(2.));
    }

    #[test]
    fn condition_removal_lets_the_sale_apply_again() {
        let f = fixture();
        let none = ConditionStore::new();
        let (gated, _) = load(&f, "sale outfits\n\tconditions\n\t\thas war\n\tBlaster 2 %\n");
        assert!(!gated.matches(f.earth, f.planet(f.earth), &none));

        let (open, diagnostics) = load(
            &f,
            "sale outfits\n\tconditions\n\t\thas war\n\tremove conditions\n\tBlaster 2 %\n",
        );
        assert!(diagnostics.is_empty());
        assert!(open.matches(f.earth, f.planet(f.earth), &none));
        assert!(open.matches(f.mars, f.planet(f.mars), &none));
    }

    #[test]
    fn unknown_entries_do_not_stop_the_load() {
        let f = fixture();
        let (overlay, diagnostics) = load(
            &f,
            "sale outfits\n\t\"Ghost Gun\" 5\n\tremove starship\n\tlocation Earth Mars\n\tBlaster 2 %\n",
        );
        assert_eq!(diagnostics.len(), 3);
        assert_eq!(overlay.outfit_price(f.blaster), Some(2.));
    }

    #[test]
    fn unknown_location_matches_nowhere() {
        let f = fixture();
        let (overlay, diagnostics) = load(&f, "sale outfits\n\tlocation Vulcan\n\tBlaster 2 %\n");
        assert_eq!(diagnostics.len(), 1);
        let none = ConditionStore::new();
        assert!(!overlay.matches(f.earth, f.planet(f.earth), &none));
        assert!(!overlay.matches(f.mars, f.planet(f.mars), &none));
    }

    #[test]
    fn unknown_mode_still_reads_directives() {
        let f = fixture();
        let (overlay, diagnostics) = load(&f, "sale ships\n\timport\n\tBlaster 2\n");
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(overlay.sell_type(), SellType::Import);
        assert_eq!(overlay.outfit_price(f.blaster), None);
    }

    #[test]
    fn resolution_formula() {
        let f = fixture();
        let mut overlay = PricingOverlay::new();
        overlay.set_outfit_price(f.laser, 2.);
        overlay.set_outfit_offset(f.laser, 0.1);
        overlay.set_outfit_offset(f.blaster, 0.1);

        let outfitters = &f.defs.outfitters;
        assert!(approx(overlay.relative_cost(f.laser, outfitters), 2.2));
        assert!(approx(overlay.relative_cost(f.blaster, outfitters), 1.1));
        assert_eq!(overlay.relative_cost(f.shield, outfitters), 1.);
    }

    #[test]
    fn outfit_price_beats_outfitter_price() {
        let f = fixture();
        let mut overlay = PricingOverlay::new();
        overlay.set_outfit_price(f.laser, 0.5);
        overlay.set_outfitter_price(f.weapons, 3.);

        let outfitters = &f.defs.outfitters;
        assert_eq!(overlay.relative_cost(f.laser, outfitters), 0.5);
        assert_eq!(overlay.relative_cost(f.blaster, outfitters), 3.);
        assert_eq!(overlay.relative_cost(f.shield, outfitters), 1.);
    }

    #[test]
    fn every_containing_outfitter_offset_counts() {
        let mut f = fixture();
        let lasers = f.defs.add_outfitter("Lasers", [f.laser]);
        let mut overlay = PricingOverlay::new();
        overlay.set_outfitter_offset(f.weapons, 0.1);
        overlay.set_outfitter_offset(lasers, 0.2);
        overlay.set_outfit_offset(f.laser, 0.05);

        let outfitters = &f.defs.outfitters;
        assert!(approx(overlay.relative_cost(f.laser, outfitters), 1.35));
        assert!(approx(overlay.relative_cost(f.blaster, outfitters), 1.1));
    }

    #[test]
    fn group_offset_scenario() {
        let f = fixture();
        let mut overlay = PricingOverlay::new();
        overlay.set_outfitter_offset(f.weapons, 0.2);
        overlay.set_outfit_price(f.laser, 3.);

        let outfitters = &f.defs.outfitters;
        assert!(approx(overlay.relative_cost(f.laser, outfitters), 3.6));
        assert!(approx(overlay.relative_cost(f.blaster, outfitters), 1.2));
    }

    #[test]
    fn fold_takes_max_price_and_sums_offsets() {
        let f = fixture();
        let mut a = PricingOverlay::new();
        a.set_outfit_price(f.laser, 1.2);
        a.set_outfit_offset(f.laser, 0.1);
        a.set_outfitter_price(f.weapons, 0.9);
        let mut b = PricingOverlay::new();
        b.set_outfit_price(f.laser, 1.5);
        b.set_outfit_offset(f.laser, 0.2);
        b.set_outfitter_price(f.weapons, 0.7);
        b.set_outfitter_offset(f.weapons, -0.1);

        let none = ConditionStore::new();
        assert!(a.add(&b, f.earth, f.planet(f.earth), &none));
        assert_eq!(a.outfit_price(f.laser), Some(1.5));
        assert!(approx(a.outfit_offset(f.laser).unwrap(), 0.3));
        assert_eq!(a.outfitter_price(f.weapons), Some(0.9));
        assert_eq!(a.outfitter_offset(f.weapons), Some(-0.1));
    }

    #[test]
    fn higher_sell_type_replaces_everything() {
        let f = fixture();
        let mut base = PricingOverlay::new();
        base.set_outfit_price(f.laser, 5.);
        base.set_outfit_offset(f.blaster, 0.4);
        let mut import = PricingOverlay::new();
        import.set_sell_type(SellType::Import);
        import.set_outfit_price(f.blaster, 0.8);

        let none = ConditionStore::new();
        assert!(base.add(&import, f.earth, f.planet(f.earth), &none));
        assert_eq!(base.sell_type(), SellType::Import);
        assert_eq!(base.outfit_price(f.laser), None);
        assert_eq!(base.outfit_offset(f.blaster), None);
        assert_eq!(base.outfit_price(f.blaster), Some(0.8));

        // A default overlay folded onto an import one merges instead.
        let mut default = PricingOverlay::new();
        default.set_outfit_price(f.blaster, 2.);
        assert!(base.add(&default, f.earth, f.planet(f.earth), &none));
        assert_eq!(base.sell_type(), SellType::Import);
        assert_eq!(base.outfit_price(f.blaster), Some(2.));
    }

    #[test]
    fn non_matching_other_is_a_no_op() {
        let f = fixture();
        let mut folded = PricingOverlay::new();
        folded.set_outfit_price(f.laser, 2.);
        let mut elsewhere = PricingOverlay::new();
        elsewhere.set_location(Some(f.mars));
        elsewhere.set_outfit_price(f.laser, 9.);

        assert!(!folded.add(&elsewhere, f.earth, f.planet(f.earth), &ConditionStore::new()));
        assert_eq!(folded.outfit_price(f.laser), Some(2.));
    }

    #[test]
    fn stale_receiver_is_reset_before_folding() {
        let f = fixture();
        let mut folded = PricingOverlay::new();
        folded.set_location(Some(f.mars));
        folded.set_outfit_price(f.laser, 4.);

        let nothing = PricingOverlay::new();
        let none = ConditionStore::new();
        assert!(!folded.matches(f.earth, f.planet(f.earth), &none));
        assert!(folded.add(&nothing, f.earth, f.planet(f.earth), &none));
        assert_eq!(folded.outfit_price(f.laser), None);
        assert_eq!(folded.location(), None);
    }

    #[test]
    fn covered_items_cache_follows_mutation() {
        let f = fixture();
        let outfitters = &f.defs.outfitters;
        let mut overlay = PricingOverlay::new();
        assert!(overlay.is_empty(outfitters));

        overlay.set_outfit_price(f.shield, 1.);
        let first = overlay.covered_items(outfitters).clone();
        let second = overlay.covered_items(outfitters).clone();
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);

        let mut other = PricingOverlay::new();
        other.set_outfitter_offset(f.weapons, 0.1);
        overlay.add(&other, f.earth, f.planet(f.earth), &ConditionStore::new());
        let after_add = overlay.covered_items(outfitters).clone();
        assert_eq!(after_add.len(), 3);
        assert!(after_add.has(f.laser) && after_add.has(f.blaster) && after_add.has(f.shield));

        overlay.clear();
        assert!(overlay.covered_items(outfitters).is_empty());
    }

    #[test]
    fn has_matches_covered_items() {
        let f = fixture();
        let outfitters = &f.defs.outfitters;
        let mut overlay = PricingOverlay::new();
        overlay.set_outfitter_price(f.weapons, 1.1);

        assert!(overlay.has(f.laser, outfitters));
        assert!(!overlay.has(f.shield, outfitters));
        let covered = overlay.covered_items(outfitters).clone();
        for id in [f.laser, f.blaster, f.shield] {
            assert_eq!(covered.has(id), overlay.has(id, outfitters));
        }
    }

    #[test]
    fn shown_tokens() {
        assert_eq!(SellType::Default.shown_token(), "");
        assert_eq!(SellType::Import.shown_token(), "import");
        assert!(SellType::Import.supersedes(SellType::Default));
        assert!(!SellType::Default.supersedes(SellType::Default));
    }
}
