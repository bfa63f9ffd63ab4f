//! Instant-indexed values and the bracket data model feeding the resolver.
use crate::parameters::store::ParameterError;
use crate::periods::Instant;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

// Field names a bracket may carry.
pub const THRESHOLD: &str = "threshold";
pub const RATE: &str = "rate";
pub const AMOUNT: &str = "amount";
pub const AVERAGE_RATE: &str = "average_rate";
pub const BASE: &str = "base";

/// A scalar value that changes over time. Entries are kept sorted by start
/// instant; a `None` value marks the point where the parameter stops being
/// defined (set, then later repealed).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueHistory {
    entries: Vec<(Instant, Option<f64>)>,
}

impl ValueHistory {
    /// A value defined identically for all time.
    pub fn constant(value: f64) -> Self {
        Self { entries: vec![(Instant::FAR_PAST, Some(value))] }
    }

    pub fn from_pairs(
        pairs: impl IntoIterator<Item = (Instant, Option<f64>)>,
    ) -> Result<Self, ParameterError> {
        let mut entries: Vec<_> = pairs.into_iter().collect();
        entries.sort_by_key(|(start, _)| *start);
        for window in entries.windows(2) {
            if window[0].0 == window[1].0 {
                return Err(ParameterError::DuplicateStart { instant: window[0].0 });
            }
        }
        Ok(Self { entries })
    }

    /// The value in force at `instant`: the entry with the greatest start not
    /// after `instant`, or `None` when the value is undefined there.
    pub fn at(&self, instant: Instant) -> Option<f64> {
        self.entries
            .iter()
            .rev()
            .find(|(start, _)| *start <= instant)
            .and_then(|(_, value)| *value)
    }
}

/// Per-field metadata: an optional unit and an optional uprating directive.
/// Both may be inherited from the enclosing scale at construction time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub unit: Option<String>,
    pub uprating: Option<JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BracketField {
    pub values: ValueHistory,
    pub meta: FieldMeta,
}

impl BracketField {
    pub fn new(values: ValueHistory) -> Self {
        Self { values, meta: FieldMeta::default() }
    }
}

/// One segment of a scale: a set of named, time-indexed numeric fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bracket {
    fields: BTreeMap<String, BracketField>,
}

impl Bracket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: &str, values: ValueHistory) -> Self {
        self.fields.insert(name.to_string(), BracketField::new(values));
        self
    }

    pub fn set_field(&mut self, name: &str, field: BracketField) {
        self.fields.insert(name.to_string(), field);
    }

    pub fn field(&self, name: &str) -> Option<&BracketField> {
        self.fields.get(name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut BracketField> {
        self.fields.get_mut(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Resolves every field at `instant`, dropping the ones with no value
    /// in force there (a bracket may exist only before or after an instant).
    pub fn at(&self, instant: Instant) -> ResolvedBracket {
        let values = self
            .fields
            .iter()
            .filter_map(|(name, field)| field.values.at(instant).map(|v| (name.clone(), v)))
            .collect();
        ResolvedBracket { values }
    }

    /// Pushes a scale-level uprating directive down onto fields that do not
    /// declare their own. Thresholds are only uprated when the scale says so.
    pub(crate) fn propagate_uprating(&mut self, directive: &JsonValue, uprate_thresholds: bool) {
        for (name, field) in &mut self.fields {
            if name == THRESHOLD && !uprate_thresholds {
                continue;
            }
            if field.meta.uprating.is_none() {
                field.meta.uprating = Some(directive.clone());
            }
        }
    }
}

/// A bracket with all fields resolved to the values in force at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBracket {
    values: BTreeMap<String, f64>,
}

impl ResolvedBracket {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn has(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}
