// Gating predicates for sales: where an overlay applies and under which
// world-state conditions.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::data::DataNode;
use crate::diagnostic::Diagnostics;
use crate::registry::Registry;
use crate::types::{Planet, PlanetId};

// ============================================================================
// LocationFilter
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Clause {
    Planets(BTreeSet<PlanetId>),
    Attributes(BTreeSet<String>),
    Not(Box<Clause>),
}

impl Clause {
    fn matches(&self, id: PlanetId, planet: &Planet) -> bool {
        match self {
            Clause::Planets(ids) => ids.contains(&id),
            Clause::Attributes(wanted) => wanted.iter().any(|a| planet.has_attribute(a)),
            Clause::Not(inner) => !inner.matches(id, planet),
        }
    }
}

/// A set of clauses a location must all satisfy. An empty filter matches
/// every location.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationFilter {
    clauses: Vec<Clause>,
}

impl LocationFilter {
    /// Append the clauses under `node`:
    /// - `planet <name>...` (more names may follow on child lines)
    /// - `attributes <attribute>...`, satisfied by any one of them
    /// - `not <clause>`
    pub fn load(
        &mut self,
        node: &DataNode,
        planets: &Registry<PlanetId, Planet>,
        diagnostics: &mut Diagnostics,
    ) {
        for child in node {
            if let Some(clause) = parse_clause(child, 0, planets, diagnostics) {
                self.clauses.push(clause);
            }
        }
    }

    /// A filter no location satisfies.
    pub fn nowhere() -> Self {
        Self {
            clauses: vec![Clause::Planets(BTreeSet::new())],
        }
    }

    pub fn matches(&self, id: PlanetId, planet: &Planet) -> bool {
        self.clauses.iter().all(|c| c.matches(id, planet))
    }
}

fn parse_clause(
    child: &DataNode,
    offset: usize,
    planets: &Registry<PlanetId, Planet>,
    diagnostics: &mut Diagnostics,
) -> Option<Clause> {
    // Operands come from the rest of the line plus every child line.
    let operands = || {
        child.tokens()[(offset + 1).min(child.size())..]
            .iter()
            .chain(child.children().flat_map(|c| c.tokens().iter()))
    };

    match child.token(offset) {
        "planet" => Some(Clause::Planets(
            operands()
                .filter_map(|name| planets.lookup(name, child, diagnostics))
                .collect(),
        )),
        "attributes" => Some(Clause::Attributes(operands().cloned().collect())),
        "not" if child.size() > offset + 1 => {
            parse_clause(child, offset + 1, planets, diagnostics).map(|c| Clause::Not(Box::new(c)))
        }
        _ => {
            diagnostics.unrecognized(child, "location filter");
            None
        }
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// Named integer world-state values. Unset names read as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionStore {
    values: HashMap<String, i64>,
}

impl ConditionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> i64 {
        self.values.get(name).copied().unwrap_or(0)
    }

    pub fn set(&mut self, name: impl Into<String>, value: i64) {
        self.values.insert(name.into(), value);
    }

    pub fn with(mut self, name: impl Into<String>, value: i64) -> Self {
        self.set(name, value);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Comparison {
    fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "==" => Comparison::Eq,
            "!=" => Comparison::Ne,
            "<" => Comparison::Lt,
            ">" => Comparison::Gt,
            "<=" => Comparison::Le,
            ">=" => Comparison::Ge,
            _ => return None,
        })
    }

    fn holds(self, lhs: i64, rhs: i64) -> bool {
        match self {
            Comparison::Eq => lhs == rhs,
            Comparison::Ne => lhs != rhs,
            Comparison::Lt => lhs < rhs,
            Comparison::Gt => lhs > rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Ge => lhs >= rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Never,
    Has(String),
    Lacks(String),
    Compare {
        name: String,
        op: Comparison,
        value: i64,
    },
    All(Vec<Expr>),
    Any(Vec<Expr>),
}

impl Expr {
    fn test(&self, store: &ConditionStore) -> bool {
        match self {
            Expr::Never => false,
            Expr::Has(name) => store.get(name) != 0,
            Expr::Lacks(name) => store.get(name) == 0,
            Expr::Compare { name, op, value } => op.holds(store.get(name), *value),
            Expr::All(exprs) => exprs.iter().all(|e| e.test(store)),
            Expr::Any(exprs) => exprs.iter().any(|e| e.test(store)),
        }
    }
}

/// A conjunction of condition expressions tested against a [`ConditionStore`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionSet {
    exprs: Vec<Expr>,
}

impl ConditionSet {
    /// Append the expressions under `node`:
    /// `never`, `has <name>`, `not <name>`, `<name> <op> <number>`, and
    /// `and` / `or` blocks.
    pub fn load(&mut self, node: &DataNode, diagnostics: &mut Diagnostics) {
        self.exprs.extend(parse_block(node, diagnostics));
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    pub fn test(&self, store: &ConditionStore) -> bool {
        self.exprs.iter().all(|e| e.test(store))
    }
}

fn parse_block(node: &DataNode, diagnostics: &mut Diagnostics) -> Vec<Expr> {
    node.children()
        .filter_map(|child| parse_expr(child, diagnostics))
        .collect()
}

fn parse_expr(child: &DataNode, diagnostics: &mut Diagnostics) -> Option<Expr> {
    let expr = match (child.token(0), child.size()) {
        ("never", 1) => Some(Expr::Never),
        ("has", 2) => Some(Expr::Has(child.token(1).to_string())),
        ("not", 2) => Some(Expr::Lacks(child.token(1).to_string())),
        ("and", 1) if child.has_children() => Some(Expr::All(parse_block(child, diagnostics))),
        ("or", 1) if child.has_children() => Some(Expr::Any(parse_block(child, diagnostics))),
        (name, 3) => match Comparison::parse(child.token(1)) {
            Some(op) => return parse_comparison(name, op, child, diagnostics),
            None => None,
        },
        _ => None,
    };
    if expr.is_none() {
        diagnostics.unrecognized(child, "condition");
    }
    expr
}

/// Condition values are integers. A fraction is reported, not truncated.
fn parse_comparison(name: &str, op: Comparison, child: &DataNode, diagnostics: &mut Diagnostics) -> Option<Expr> {
    match child.value(2).filter(|value| value.fract() == 0.) {
        Some(value) => Some(Expr::Compare {
            name: name.to_string(),
            op,
            value: value as i64,
        }),
        None => {
            diagnostics.invalid_number(child, 2);
            None
        }
    }
}
