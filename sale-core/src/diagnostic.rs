// Load-time diagnostics. Nothing here is fatal: a reported entry is skipped
// and loading carries on with the next one.

use std::fmt;

use crate::data::DataNode;

/// The kind of definition a name failed to resolve against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Outfit,
    Outfitter,
    Planet,
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RefKind::Outfit => "outfit",
            RefKind::Outfitter => "outfitter",
            RefKind::Planet => "planet",
        })
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Diagnostic {
    #[error("line {line}: skipping unrecognized {what}: {context}")]
    Unrecognized {
        line: usize,
        what: &'static str,
        context: String,
    },

    #[error("line {line}: unknown {kind} \"{name}\"")]
    UnknownReference {
        line: usize,
        kind: RefKind,
        name: String,
    },

    #[error("line {line}: {reason}: {context}")]
    Ignored {
        line: usize,
        reason: &'static str,
        context: String,
    },

    #[error("line {line}: token {index} is not a number: {context}")]
    InvalidNumber {
        line: usize,
        index: usize,
        context: String,
    },

    #[error("line {line}: outfit \"{name}\" has no base cost, so an absolute price cannot be made relative")]
    ZeroBaseCost { line: usize, name: String },

    #[error("line {line}: {message}")]
    Syntax { line: usize, message: &'static str },
}

impl Diagnostic {
    pub fn line(&self) -> usize {
        match self {
            Diagnostic::Unrecognized { line, .. }
            | Diagnostic::UnknownReference { line, .. }
            | Diagnostic::Ignored { line, .. }
            | Diagnostic::InvalidNumber { line, .. }
            | Diagnostic::ZeroBaseCost { line, .. }
            | Diagnostic::Syntax { line, .. } => *line,
        }
    }

    /// Short stable name of the variant, used as the `kind` column of the
    /// `diagnostic` event table.
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::Unrecognized { .. } => "unrecognized",
            Diagnostic::UnknownReference { .. } => "unknown-reference",
            Diagnostic::Ignored { .. } => "ignored",
            Diagnostic::InvalidNumber { .. } => "invalid-number",
            Diagnostic::ZeroBaseCost { .. } => "zero-base-cost",
            Diagnostic::Syntax { .. } => "syntax",
        }
    }
}

/// Collects diagnostics for one load pass.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    // Collect without emitting events, for entries already reported once.
    #[cfg_attr(not(feature = "instrument"), allow(dead_code))]
    muted: bool,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that records but does not emit `diagnostic` events.
    pub fn muted() -> Self {
        Self {
            entries: Vec::new(),
            muted: true,
        }
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        #[cfg(feature = "instrument")]
        if !self.muted {
            tracing::warn!(
                target: "diagnostic",
                line = diagnostic.line() as u64,
                kind = diagnostic.kind(),
                message = %diagnostic,
            );
        }
        self.entries.push(diagnostic);
    }

    /// Copy `other`'s entries onto the end of this sink. Nothing is emitted.
    pub fn append(&mut self, other: &Diagnostics) {
        self.entries.extend(other.entries.iter().cloned());
    }

    pub fn unrecognized(&mut self, node: &DataNode, what: &'static str) {
        self.report(Diagnostic::Unrecognized {
            line: node.line(),
            what,
            context: node.context(),
        });
    }

    pub fn ignored(&mut self, node: &DataNode, reason: &'static str) {
        self.report(Diagnostic::Ignored {
            line: node.line(),
            reason,
            context: node.context(),
        });
    }

    pub fn unknown(&mut self, node: &DataNode, kind: RefKind, name: &str) {
        self.report(Diagnostic::UnknownReference {
            line: node.line(),
            kind,
            name: name.to_string(),
        });
    }

    pub fn invalid_number(&mut self, node: &DataNode, index: usize) {
        self.report(Diagnostic::InvalidNumber {
            line: node.line(),
            index,
            context: node.context(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.entries
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
