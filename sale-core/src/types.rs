use slotmap::new_key_type;

// ============================================================================
// IDs - Using slotmap for generational indices
// ============================================================================

new_key_type! {
    /// A single sellable outfit.
    pub struct OutfitId;
    /// A named group of outfits, usually an outfitter's stock list.
    pub struct OutfitterId;
    /// A location that can host an outfitter.
    pub struct PlanetId;
}

/// Trait for converting SlotMap keys to u64 for WASM boundary
pub trait KeyToU64 {
    fn to_u64(self) -> u64;
}

impl KeyToU64 for OutfitId {
    fn to_u64(self) -> u64 {
        self.0.as_ffi()
    }
}

// ============================================================================
// Definitions - owned by the World, referenced everywhere else by id
// ============================================================================

/// An outfit definition. `cost` is the canonical base price that relative
/// prices multiply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outfit {
    pub name: String,
    pub cost: f64,
}

/// The parts of a planet that sales care about.
#[derive(Debug, Clone, Default)]
pub struct Planet {
    pub name: String,
    pub attributes: std::collections::BTreeSet<String>,
    /// Outfitters whose stock this planet sells.
    pub outfitters: Vec<OutfitterId>,
}

impl Planet {
    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes.contains(attribute)
    }
}
