use serde::{Deserialize, Serialize};
use tsify_next::Tsify;
use wasm_bindgen::prelude::*;

pub mod data;
pub mod diagnostic;
pub mod overlay;
pub mod predicate;
pub mod registry;
pub mod sale;
pub mod sold;
pub mod types;
pub mod world;

pub use data::{DataFile, DataNode};
pub use diagnostic::{Diagnostic, Diagnostics, RefKind};
pub use overlay::{Mode, PricingOverlay, SellType};
pub use predicate::{ConditionSet, ConditionStore, LocationFilter};
pub use registry::Registry;
pub use sale::{Catalog, ItemOverlay};
pub use sold::{Sold, Visibility};
pub use types::*;
pub use world::{Definitions, Outfitters, Quote, World};

// ============================================================================
// WASM API - PriceBook
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct DiagnosticSnapshot {
    pub line: usize,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct DiagnosticsSnapshot {
    pub diagnostics: Vec<DiagnosticSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct StockEntrySnapshot {
    pub id: u64,
    pub name: String,
    pub price: f64,
    pub shown: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct StockSnapshot {
    pub planet: String,
    pub outfits: Vec<StockEntrySnapshot>,
}

#[wasm_bindgen]
pub struct PriceBook {
    world: World,
}

impl Default for PriceBook {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl PriceBook {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        // Better panic messages in browser console
        console_error_panic_hook::set_once();

        Self { world: World::new() }
    }

    /// Load a data file on top of whatever is already loaded. Returns the
    /// number of diagnostics the file produced.
    #[wasm_bindgen]
    pub fn load(&mut self, text: &str) -> usize {
        self.world.load_text(text)
    }

    /// Price multiplier for `outfit` at `planet`. `conditions_json` is an
    /// object of condition name to integer; anything unparsable is treated as
    /// an empty store.
    #[wasm_bindgen]
    pub fn relative_price(&mut self, planet: &str, outfit: &str, conditions_json: &str) -> f64 {
        let Some((planet, outfit)) = self.resolve(planet, outfit) else {
            return 1.;
        };
        let store = parse_conditions(conditions_json);
        self.world.local_relative_price(planet, outfit, &store)
    }

    /// Price in credits. Unknown outfits cost nothing; unknown planets sell at
    /// the base cost.
    #[wasm_bindgen]
    pub fn price(&mut self, planet: &str, outfit: &str, conditions_json: &str) -> f64 {
        let Some(outfit_id) = self.world.defs.outfits.get(outfit) else {
            return 0.;
        };
        let base = self.world.defs.outfits.def(outfit_id).map_or(0., |o| o.cost);
        base * self.relative_price(planet, outfit, conditions_json)
    }

    /// Shown token (`""` or `"import"`) for `outfit` at `planet`.
    #[wasm_bindgen]
    pub fn availability(&mut self, planet: &str, outfit: &str, conditions_json: &str) -> String {
        let sell_type = match self.resolve(planet, outfit) {
            Some((planet, outfit)) => {
                let store = parse_conditions(conditions_json);
                self.world.availability(planet, outfit, &store)
            }
            None => SellType::Default,
        };
        sell_type.shown_token().to_string()
    }

    /// Everything on offer at `planet` with its local price and shown token.
    /// Empty for an unknown planet.
    #[wasm_bindgen]
    pub fn stock(&mut self, planet: &str, conditions_json: &str) -> StockSnapshot {
        let mut snapshot = StockSnapshot {
            planet: planet.to_string(),
            outfits: Vec::new(),
        };
        let Some(planet_id) = self.world.defs.planets.get(planet) else {
            return snapshot;
        };
        let store = parse_conditions(conditions_json);

        for quote in self.world.price_list(planet_id, &store) {
            snapshot.outfits.push(StockEntrySnapshot {
                id: quote.outfit.to_u64(),
                name: self.world.defs.outfits.name_of(quote.outfit).unwrap_or("").to_string(),
                price: quote.price,
                shown: quote.sell_type.shown_token().to_string(),
            });
        }
        snapshot
    }

    /// Every diagnostic reported so far, oldest first.
    #[wasm_bindgen]
    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            diagnostics: self
                .world
                .diagnostics()
                .iter()
                .map(|d| DiagnosticSnapshot {
                    line: d.line(),
                    kind: d.kind().to_string(),
                    message: d.to_string(),
                })
                .collect(),
        }
    }
}

impl PriceBook {
    fn resolve(&self, planet: &str, outfit: &str) -> Option<(PlanetId, OutfitId)> {
        Some((self.world.defs.planets.get(planet)?, self.world.defs.outfits.get(outfit)?))
    }
}

fn parse_conditions(json: &str) -> ConditionStore {
    if json.trim().is_empty() {
        return ConditionStore::new();
    }
    serde_json::from_str(json).unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================
