use serde::{Deserialize, Serialize};

/// How an item is shown in a shop.
///
/// Variants are declared in priority order: when two overlays disagree about
/// an item, the later variant wins. `None < Default < Import < Hidden`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Visibility {
    /// Lowest rank, below anything a data file can say. Never parsed.
    None,
    #[default]
    Default,
    Import,
    Hidden,
}

impl Visibility {
    /// Parse a data-file visibility token. The empty token is `Default`;
    /// an unrecognized token yields no visibility and is the caller's to reject.
    pub fn from_token(token: &str) -> Option<Visibility> {
        match token {
            "" => Some(Visibility::Default),
            "import" => Some(Visibility::Import),
            "hidden" => Some(Visibility::Hidden),
            _ => None,
        }
    }

    /// Whether `self` takes precedence over `other` when merging.
    pub fn outranks(self, other: Visibility) -> bool {
        self > other
    }
}

/// A per-item override: a relative cost and how the item is shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Sold {
    cost: f64,
    shown: Visibility,
}

impl Sold {
    pub fn new(cost: f64, shown: Visibility) -> Self {
        Self { cost, shown }
    }

    pub fn set_base(&mut self, cost: f64, shown: Visibility) {
        self.cost = cost;
        self.shown = shown;
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn shown(&self) -> Visibility {
        self.shown
    }

    /// Fold `other` into `self`: the higher visibility wins outright, and on
    /// equal visibility the higher cost is kept.
    pub fn merge(&mut self, other: Sold) {
        if self.shown == other.shown {
            self.cost = self.cost.max(other.cost);
        } else if other.shown.outranks(self.shown) {
            *self = other;
        }
    }
}
