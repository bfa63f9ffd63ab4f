//! A named, ordered bracket table and its per-instant materialization.
use crate::parameters::bracket::{
    Bracket, AMOUNT, AVERAGE_RATE, BASE, RATE, THRESHOLD,
};
use crate::parameters::taxscale::{
    LinearAverageRateScale, MarginalAmountScale, MarginalRateScale, ScaleAtInstant,
    SingleAmountScale,
};
use crate::periods::Instant;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

// Metadata keys with engine-level meaning. Everything else is free-form.
const TYPE_KEY: &str = "type";
const SINGLE_AMOUNT_TYPE: &str = "single_amount";
const UPRATING_KEY: &str = "uprating";
const UPRATE_THRESHOLDS_KEY: &str = "uprate_thresholds";
const UNIT_KEY_SUFFIX: &str = "_unit";

/// A parameter scale: brackets plus free-form metadata. Built once when the
/// legislative data is loaded, immutable afterwards. `Clone` is deep, so a
/// reform variant can rewrite bracket values without touching the base data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterScale {
    pub name: String,
    pub metadata: BTreeMap<String, JsonValue>,
    brackets: Vec<Bracket>,
}

impl ParameterScale {
    /// Assembles a scale and runs the one-time metadata propagation passes
    /// (scale-level units and uprating directives pushed down to brackets).
    pub fn new(
        name: impl Into<String>,
        metadata: BTreeMap<String, JsonValue>,
        brackets: Vec<Bracket>,
    ) -> Self {
        let mut scale = Self { name: name.into(), metadata, brackets };
        scale.propagate_uprating();
        scale.propagate_units();
        scale
    }

    pub fn brackets(&self) -> &[Bracket] {
        &self.brackets
    }

    pub fn brackets_mut(&mut self) -> &mut [Bracket] {
        &mut self.brackets
    }

    /// A `"<field>_unit"` metadata key declares the unit of the `<field>`
    /// child of every bracket; brackets with an explicit unit keep theirs.
    fn propagate_units(&mut self) {
        let inherited: Vec<(String, String)> = self
            .metadata
            .iter()
            .filter_map(|(key, value)| {
                let child = key.strip_suffix(UNIT_KEY_SUFFIX)?;
                if child.is_empty() {
                    return None;
                }
                Some((child.to_string(), value.as_str()?.to_string()))
            })
            .collect();
        for (child, unit) in inherited {
            for bracket in &mut self.brackets {
                if let Some(field) = bracket.field_mut(&child) {
                    if field.meta.unit.is_none() {
                        field.meta.unit = Some(unit.clone());
                    }
                }
            }
        }
    }

    fn propagate_uprating(&mut self) {
        let Some(directive) = self.metadata.get(UPRATING_KEY).cloned() else {
            return;
        };
        let uprate_thresholds = self
            .metadata
            .get(UPRATE_THRESHOLDS_KEY)
            .and_then(JsonValue::as_bool)
            .unwrap_or(false);
        for bracket in &mut self.brackets {
            bracket.propagate_uprating(&directive, uprate_thresholds);
        }
    }

    /// Materializes the piecewise function in force at `instant`.
    ///
    /// Kind selection over the resolved brackets follows a fixed precedence:
    /// an explicit `"type": "single_amount"` declaration, then amount
    /// presence, then average-rate presence, then marginal rates. Brackets
    /// missing a required field at the instant are skipped, not an error.
    /// The result is rebuilt on every call, never cached here.
    pub fn at(&self, instant: Instant) -> ScaleAtInstant {
        let resolved: Vec<_> = self.brackets.iter().map(|b| b.at(instant)).collect();

        if self.metadata.get(TYPE_KEY).and_then(JsonValue::as_str) == Some(SINGLE_AMOUNT_TYPE) {
            let mut scale = SingleAmountScale::default();
            for bracket in &resolved {
                if let (Some(threshold), Some(amount)) =
                    (bracket.get(THRESHOLD), bracket.get(AMOUNT))
                {
                    scale.add_bracket(threshold, amount);
                }
            }
            return ScaleAtInstant::SingleAmount(scale);
        }

        if resolved.iter().any(|b| b.has(AMOUNT)) {
            let mut scale = MarginalAmountScale::default();
            for bracket in &resolved {
                if let (Some(threshold), Some(amount)) =
                    (bracket.get(THRESHOLD), bracket.get(AMOUNT))
                {
                    scale.add_bracket(threshold, amount);
                }
            }
            return ScaleAtInstant::MarginalAmount(scale);
        }

        if resolved.iter().any(|b| b.has(AVERAGE_RATE)) {
            let mut scale = LinearAverageRateScale::default();
            for bracket in &resolved {
                let base = bracket.get(BASE).unwrap_or(1.0);
                if let (Some(threshold), Some(rate)) =
                    (bracket.get(THRESHOLD), bracket.get(AVERAGE_RATE))
                {
                    scale.add_bracket(threshold, rate * base);
                }
            }
            return ScaleAtInstant::AverageRate(scale);
        }

        let mut scale = MarginalRateScale::default();
        for bracket in &resolved {
            let base = bracket.get(BASE).unwrap_or(1.0);
            if let (Some(threshold), Some(rate)) = (bracket.get(THRESHOLD), bracket.get(RATE)) {
                scale.add_bracket(threshold, rate * base);
            }
        }
        ScaleAtInstant::MarginalRate(scale)
    }
}
