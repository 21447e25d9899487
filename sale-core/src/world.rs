// World state for sale resolution: the definitions every overlay refers to,
// the overlays loaded from data, and the per-planet folded overlay.

use std::collections::HashMap;

use crate::data::{DataFile, DataNode};
use crate::diagnostic::{Diagnostics, RefKind};
use crate::overlay::{PricingOverlay, SellType};
use crate::predicate::ConditionStore;
use crate::registry::Registry;
use crate::sale::Catalog;
use crate::types::{Outfit, OutfitId, OutfitterId, Planet, PlanetId};

/// Outfitters are named groups of outfits.
pub type Outfitters = Registry<OutfitterId, Catalog<OutfitId>>;

/// Everything a data file can define by name.
#[derive(Debug, Clone)]
pub struct Definitions {
    pub outfits: Registry<OutfitId, Outfit>,
    pub outfitters: Outfitters,
    pub planets: Registry<PlanetId, Planet>,
}

impl Default for Definitions {
    fn default() -> Self {
        Self::new()
    }
}

impl Definitions {
    pub fn new() -> Self {
        Self {
            outfits: Registry::new(RefKind::Outfit),
            outfitters: Registry::new(RefKind::Outfitter),
            planets: Registry::new(RefKind::Planet),
        }
    }

    pub fn add_outfit(&mut self, name: &str, cost: f64) -> OutfitId {
        let id = self.outfits.get_or_insert(name);
        if let Some(outfit) = self.outfits.def_mut(id) {
            outfit.name = name.to_string();
            outfit.cost = cost;
        }
        id
    }

    pub fn add_outfitter(&mut self, name: &str, outfits: impl IntoIterator<Item = OutfitId>) -> OutfitterId {
        let id = self.outfitters.get_or_insert(name);
        if let Some(catalog) = self.outfitters.def_mut(id) {
            catalog.extend(outfits);
        }
        id
    }

    pub fn add_planet<'a>(&mut self, name: &str, attributes: impl IntoIterator<Item = &'a str>) -> PlanetId {
        let id = self.planets.get_or_insert(name);
        if let Some(planet) = self.planets.def_mut(id) {
            planet.name = name.to_string();
            planet.attributes.extend(attributes.into_iter().map(str::to_string));
        }
        id
    }
}

/// One outfit's local terms at a planet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub outfit: OutfitId,
    pub relative_cost: f64,
    pub price: f64,
    pub sell_type: SellType,
}

/// Complete state of the sale data
#[derive(Debug, Clone, Default)]
pub struct World {
    pub defs: Definitions,
    /// Overlays in load order, rebuilt from `sale_nodes` after every load.
    pub custom_sales: Vec<PricingOverlay>,
    sale_nodes: Vec<DataNode>,
    local: HashMap<PlanetId, PricingOverlay>,
    /// Syntax and definition problems, kept across loads.
    definition_diagnostics: Diagnostics,
    /// `definition_diagnostics` followed by the latest sale diagnostics.
    diagnostics: Diagnostics,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    // === Loading ===

    /// Parse and load a data file. Returns how many diagnostics it produced.
    pub fn load_text(&mut self, text: &str) -> usize {
        let before = self.definition_diagnostics.len();
        let file = DataFile::parse(text, &mut self.definition_diagnostics);
        let parsed = self.definition_diagnostics.len() - before;
        parsed + self.load(&file)
    }

    /// Load every root entry of `file` on top of what is already loaded and
    /// return how many diagnostics the file produced.
    ///
    /// Names are registered first so that entries may refer to definitions
    /// further down the file. Sales are then re-read from every file loaded
    /// so far, so they always see the latest definitions and base costs
    /// whatever order the files came in.
    pub fn load(&mut self, file: &DataFile) -> usize {
        for node in file {
            if node.size() < 2 {
                continue;
            }
            match node.token(0) {
                "outfit" => {
                    let id = self.defs.outfits.get_or_insert(node.token(1));
                    if let Some(outfit) = self.defs.outfits.def_mut(id) {
                        outfit.name = node.token(1).to_string();
                    }
                }
                "outfitter" => {
                    self.defs.outfitters.get_or_insert(node.token(1));
                }
                "planet" => {
                    let id = self.defs.planets.get_or_insert(node.token(1));
                    if let Some(planet) = self.defs.planets.def_mut(id) {
                        planet.name = node.token(1).to_string();
                    }
                }
                _ => {}
            }
        }

        let before = self.definition_diagnostics.len();
        let first_new = self.sale_nodes.len();
        for node in file {
            match (node.token(0), node.size()) {
                ("outfit", 2) => self.load_outfit(node),
                ("outfitter", 2) => {
                    if let Some(id) = self.defs.outfitters.get(node.token(1)) {
                        if let Some(catalog) = self.defs.outfitters.def_mut(id) {
                            catalog.load(node, &self.defs.outfits, &mut self.definition_diagnostics);
                        }
                    }
                }
                ("planet", 2) => self.load_planet(node),
                ("custom sale", 2) => self.sale_nodes.push(node.clone()),
                _ => self.definition_diagnostics.unrecognized(node, "root entry"),
            }
        }
        let defined = self.definition_diagnostics.len() - before;

        defined + self.reload_sales(first_new)
    }

    /// Rebuild every overlay from its source block. Problems in blocks from
    /// earlier loads were already reported, so only blocks from `first_new`
    /// on emit events and count towards the returned total.
    fn reload_sales(&mut self, first_new: usize) -> usize {
        let mut earlier = Diagnostics::muted();
        let mut fresh = Diagnostics::new();

        self.custom_sales.clear();
        for (index, node) in self.sale_nodes.iter().enumerate() {
            let sink = if index < first_new { &mut earlier } else { &mut fresh };
            let mut overlay = PricingOverlay::new();
            overlay.load(node, &self.defs, sink);
            self.custom_sales.push(overlay);
        }
        self.local.clear();

        self.diagnostics = self.definition_diagnostics.clone();
        self.diagnostics.append(&earlier);
        self.diagnostics.append(&fresh);
        fresh.len()
    }

    fn load_outfit(&mut self, node: &DataNode) {
        let Some(id) = self.defs.outfits.get(node.token(1)) else {
            return;
        };
        for child in node {
            match (child.token(0), child.value(1)) {
                ("cost", Some(cost)) if child.size() == 2 => {
                    if let Some(outfit) = self.defs.outfits.def_mut(id) {
                        outfit.cost = cost;
                    }
                }
                ("cost", _) => self.definition_diagnostics.invalid_number(child, 1),
                _ => self.definition_diagnostics.unrecognized(child, "outfit attribute"),
            }
        }
    }

    fn load_planet(&mut self, node: &DataNode) {
        let Some(id) = self.defs.planets.get(node.token(1)) else {
            return;
        };
        for child in node {
            match child.token(0) {
                "attributes" => {
                    if let Some(planet) = self.defs.planets.def_mut(id) {
                        planet.attributes.extend(child.tokens()[1..].iter().cloned());
                    }
                }
                "outfitter" => {
                    for name in &child.tokens()[1..] {
                        let Some(outfitter) = self.defs.outfitters.lookup(name, child, &mut self.definition_diagnostics)
                        else {
                            continue;
                        };
                        if let Some(planet) = self.defs.planets.def_mut(id) {
                            if !planet.outfitters.contains(&outfitter) {
                                planet.outfitters.push(outfitter);
                            }
                        }
                    }
                }
                _ => self.definition_diagnostics.unrecognized(child, "planet attribute"),
            }
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    // === Queries ===

    /// Fold every loaded overlay that applies at `planet` under `store` into
    /// the planet's own overlay and return it. The fold starts from scratch on
    /// every call so repeated queries never double-count offsets.
    pub fn local_overlay(&mut self, planet: PlanetId, store: &ConditionStore) -> Option<&mut PricingOverlay> {
        fold(&self.defs, &self.custom_sales, &mut self.local, planet, store)
    }

    /// Multiplier on `outfit`'s base cost at `planet`. `1.0` when nothing
    /// applies or the planet is unknown.
    pub fn local_relative_price(&mut self, planet: PlanetId, outfit: OutfitId, store: &ConditionStore) -> f64 {
        let relative = match fold(&self.defs, &self.custom_sales, &mut self.local, planet, store) {
            Some(local) => local.relative_cost(outfit, &self.defs.outfitters),
            None => 1.,
        };
        trace_quote(&self.defs, planet, outfit, relative);
        relative
    }

    /// Credits `outfit` costs at `planet`.
    pub fn local_price(&mut self, planet: PlanetId, outfit: OutfitId, store: &ConditionStore) -> f64 {
        base_cost(&self.defs, outfit) * self.local_relative_price(planet, outfit, store)
    }

    /// How `outfit` is offered at `planet`: the folded overlay's sell type if
    /// it covers the outfit, otherwise `Default`.
    pub fn availability(&mut self, planet: PlanetId, outfit: OutfitId, store: &ConditionStore) -> SellType {
        match fold(&self.defs, &self.custom_sales, &mut self.local, planet, store) {
            Some(local) => offered_as(local, outfit, &self.defs.outfitters),
            None => SellType::Default,
        }
    }

    /// Everything on offer at `planet`: the stock of its outfitters plus every
    /// outfit an applicable overlay touches.
    pub fn outfitter_stock(&mut self, planet: PlanetId, store: &ConditionStore) -> Catalog<OutfitId> {
        let mut stock = planet_catalog(&self.defs, planet);
        if let Some(local) = fold(&self.defs, &self.custom_sales, &mut self.local, planet, store) {
            stock.add(local.covered_items(&self.defs.outfitters));
        }
        stock
    }

    /// Local terms for everything in [`World::outfitter_stock`], from a single
    /// fold. Empty for an unknown planet.
    pub fn price_list(&mut self, planet: PlanetId, store: &ConditionStore) -> Vec<Quote> {
        let Some(local) = fold(&self.defs, &self.custom_sales, &mut self.local, planet, store) else {
            return Vec::new();
        };
        let mut stock = planet_catalog(&self.defs, planet);
        stock.add(local.covered_items(&self.defs.outfitters));
        let local = &*local;

        stock
            .iter()
            .map(|outfit| {
                let relative_cost = local.relative_cost(outfit, &self.defs.outfitters);
                trace_quote(&self.defs, planet, outfit, relative_cost);
                Quote {
                    outfit,
                    relative_cost,
                    price: base_cost(&self.defs, outfit) * relative_cost,
                    sell_type: offered_as(local, outfit, &self.defs.outfitters),
                }
            })
            .collect()
    }
}

fn fold<'a>(
    defs: &Definitions,
    custom_sales: &[PricingOverlay],
    local: &'a mut HashMap<PlanetId, PricingOverlay>,
    planet: PlanetId,
    store: &ConditionStore,
) -> Option<&'a mut PricingOverlay> {
    let def = defs.planets.def(planet)?;
    let folded = local.entry(planet).or_default();
    folded.clear();
    for sale in custom_sales {
        folded.add(sale, planet, def, store);
    }
    Some(folded)
}

/// Union of the catalogs of every outfitter on `planet`.
fn planet_catalog(defs: &Definitions, planet: PlanetId) -> Catalog<OutfitId> {
    let mut stock = Catalog::new();
    if let Some(def) = defs.planets.def(planet) {
        for outfitter in &def.outfitters {
            if let Some(catalog) = defs.outfitters.def(*outfitter) {
                stock.add(catalog);
            }
        }
    }
    stock
}

fn base_cost(defs: &Definitions, outfit: OutfitId) -> f64 {
    defs.outfits.def(outfit).map_or(0., |o| o.cost)
}

fn offered_as(local: &PricingOverlay, outfit: OutfitId, outfitters: &Outfitters) -> SellType {
    if local.has(outfit, outfitters) {
        local.sell_type()
    } else {
        SellType::Default
    }
}

#[cfg_attr(not(feature = "instrument"), allow(unused_variables))]
fn trace_quote(defs: &Definitions, planet: PlanetId, outfit: OutfitId, relative: f64) {
    #[cfg(feature = "instrument")]
    tracing::info!(
        target: "price_quote",
        planet = defs.planets.name_of(planet).unwrap_or(""),
        outfit = defs.outfits.name_of(outfit).unwrap_or(""),
        relative_cost = relative,
    );
}
