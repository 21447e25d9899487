//! Event capture for sale resolution.
//!
//! A `tracing` subscriber that turns every recorded event into a row of a
//! table named after the event target. Columns are created on first sight of
//! a field and padded so that every column in a table has one value per row.
//!
//! # Usage
//!
//! ```ignore
//! // In library code:
//! tracing::warn!(target: "diagnostic", line = 12u64, kind = "unknown-reference");
//!
//! // In a test:
//! let (_, events) = instrument::capture(|| world.load(text));
//! assert_eq!(events.rows("diagnostic"), 1);
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Record};
use tracing::{Event, Id, Metadata, Subscriber};

/// Values of one column. The variant is fixed by the first value recorded.
#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    U64(Vec<u64>),
    I64(Vec<i64>),
    F64(Vec<f64>),
    Bool(Vec<bool>),
    Str(Vec<String>),
}

impl Values {
    pub fn len(&self) -> usize {
        match self {
            Values::U64(v) => v.len(),
            Values::I64(v) => v.len(),
            Values::F64(v) => v.len(),
            Values::Bool(v) => v.len(),
            Values::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn pad_to(&mut self, rows: usize) {
        let missing = rows.saturating_sub(self.len());
        if missing == 0 {
            return;
        }
        match self {
            Values::U64(v) => v.extend(std::iter::repeat_n(0, missing)),
            Values::I64(v) => v.extend(std::iter::repeat_n(0, missing)),
            Values::F64(v) => v.extend(std::iter::repeat_n(0.0, missing)),
            Values::Bool(v) => v.extend(std::iter::repeat_n(false, missing)),
            Values::Str(v) => v.extend(std::iter::repeat_n(String::new(), missing)),
        }
    }
}

/// All events recorded for one target.
#[derive(Debug, Clone, Default)]
pub struct EventTable {
    pub columns: HashMap<String, Values>,
    pub rows: usize,
}

impl EventTable {
    fn pad(&mut self) {
        for values in self.columns.values_mut() {
            values.pad_to(self.rows);
        }
    }

    pub fn u64s(&self, name: &str) -> Option<&[u64]> {
        match self.columns.get(name)? {
            Values::U64(v) => Some(v),
            _ => None,
        }
    }

    pub fn f64s(&self, name: &str) -> Option<&[f64]> {
        match self.columns.get(name)? {
            Values::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn bools(&self, name: &str) -> Option<&[bool]> {
        match self.columns.get(name)? {
            Values::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// String column. Fields recorded with `%` or `?` land here as well.
    pub fn strs(&self, name: &str) -> Option<&[String]> {
        match self.columns.get(name)? {
            Values::Str(v) => Some(v),
            _ => None,
        }
    }
}

/// Captured tables, keyed by tracing target.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    pub tables: HashMap<String, EventTable>,
}

impl Recorder {
    pub fn table(&self, target: &str) -> Option<&EventTable> {
        self.tables.get(target)
    }

    /// Number of events recorded for `target`, zero if none were.
    pub fn rows(&self, target: &str) -> usize {
        self.tables.get(target).map_or(0, |t| t.rows)
    }
}

thread_local! {
    static RECORDER: RefCell<Recorder> = RefCell::default();
}

struct RowVisitor<'a> {
    table: &'a mut EventTable,
}

impl RowVisitor<'_> {
    // New columns start with one default per earlier row.
    fn column(&mut self, field: &Field, empty: impl FnOnce(usize) -> Values) -> &mut Values {
        let rows = self.table.rows;
        self.table
            .columns
            .entry(field.name().to_string())
            .or_insert_with(|| empty(rows))
    }
}

impl Visit for RowVisitor<'_> {
    fn record_u64(&mut self, field: &Field, value: u64) {
        if let Values::U64(v) = self.column(field, |n| Values::U64(vec![0; n])) {
            v.push(value);
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if let Values::I64(v) = self.column(field, |n| Values::I64(vec![0; n])) {
            v.push(value);
        }
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Values::F64(v) = self.column(field, |n| Values::F64(vec![0.0; n])) {
            v.push(value);
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        if let Values::Bool(v) = self.column(field, |n| Values::Bool(vec![false; n])) {
            v.push(value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if let Values::Str(v) = self.column(field, |n| Values::Str(vec![String::new(); n])) {
            v.push(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.record_str(field, &format!("{:?}", value));
    }
}

/// Subscriber that appends every event at INFO or above to the thread-local recorder.
pub struct TableSubscriber;

impl Subscriber for TableSubscriber {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.is_event() && *metadata.level() <= tracing::Level::INFO
    }

    fn new_span(&self, _span: &Attributes<'_>) -> Id {
        Id::from_u64(1)
    }

    fn record(&self, _span: &Id, _values: &Record<'_>) {}

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, event: &Event<'_>) {
        let target = event.metadata().target().to_string();

        RECORDER.with(|r| {
            let mut recorder = r.borrow_mut();
            let table = recorder.tables.entry(target).or_default();

            event.record(&mut RowVisitor { table: &mut *table });
            table.rows += 1;
            table.pad();
        });
    }

    fn enter(&self, _span: &Id) {}

    fn exit(&self, _span: &Id) {}
}

/// Take everything recorded on this thread so far.
pub fn drain() -> Recorder {
    RECORDER.with(|r| std::mem::take(&mut *r.borrow_mut()))
}

/// Discard everything recorded on this thread so far.
pub fn clear() {
    RECORDER.with(|r| *r.borrow_mut() = Recorder::default());
}

/// Run `f` with a [`TableSubscriber`] as the thread's default and return
/// what it recorded. Earlier recordings on this thread are discarded.
pub fn capture<R>(f: impl FnOnce() -> R) -> (R, Recorder) {
    clear();
    let out = tracing::subscriber::with_default(TableSubscriber, f);
    (out, drain())
}

// === Polars Integration ===

use polars::prelude::*;

impl EventTable {
    /// Convert this table to a polars DataFrame.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let mut names: Vec<&String> = self.columns.keys().collect();
        names.sort();

        let columns: Vec<Column> = names
            .into_iter()
            .map(|name| match &self.columns[name] {
                Values::U64(v) => Column::new(name.as_str().into(), v),
                Values::I64(v) => Column::new(name.as_str().into(), v),
                Values::F64(v) => Column::new(name.as_str().into(), v),
                Values::Bool(v) => Column::new(name.as_str().into(), v),
                Values::Str(v) => Column::new(name.as_str().into(), v),
            })
            .collect();

        DataFrame::new(columns)
    }
}

impl Recorder {
    /// Convert every table to a DataFrame, skipping any that fail to convert.
    pub fn to_dataframes(&self) -> HashMap<String, DataFrame> {
        self.tables
            .iter()
            .filter_map(|(name, table)| table.to_dataframe().ok().map(|df| (name.clone(), df)))
            .collect()
    }
}
