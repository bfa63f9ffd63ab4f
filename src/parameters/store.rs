//! The named parameter collection and its instant-bound lookup view.
use crate::parameters::bracket::ValueHistory;
use crate::parameters::scale::ParameterScale;
use crate::parameters::taxscale::ScaleAtInstant;
use crate::periods::Instant;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("parameter '{name}' is not defined")]
    UnknownParameter { name: String },
    #[error("parameter '{name}' has no value in force at {instant}")]
    NotDefinedAt { name: String, instant: Instant },
    #[error("two parameter values start at {instant}")]
    DuplicateStart { instant: Instant },
}

/// All scalar parameters and scales of a rule system, keyed by dotted name
/// (e.g. `"taxes.income_tax.brackets"`). Immutable once the registry holding
/// it is built.
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    scalars: HashMap<String, ValueHistory>,
    scales: HashMap<String, ParameterScale>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_scalar(&mut self, name: impl Into<String>, history: ValueHistory) {
        self.scalars.insert(name.into(), history);
    }

    pub fn add_scale(&mut self, scale: ParameterScale) {
        self.scales.insert(scale.name.clone(), scale);
    }

    pub fn scale(&self, name: &str) -> Option<&ParameterScale> {
        self.scales.get(name)
    }

    pub fn scalar(&self, name: &str) -> Option<&ValueHistory> {
        self.scalars.get(name)
    }
}

/// The parameter-lookup capability handed to formulas, bound to the start
/// instant of the period being computed.
#[derive(Debug, Clone)]
pub struct ParametersAtInstant {
    store: Arc<ParameterStore>,
    pub instant: Instant,
}

impl ParametersAtInstant {
    pub fn new(store: Arc<ParameterStore>, instant: Instant) -> Self {
        Self { store, instant }
    }

    /// The scalar parameter value in force at the bound instant.
    pub fn value(&self, name: &str) -> Result<f64, ParameterError> {
        let history = self
            .store
            .scalar(name)
            .ok_or_else(|| ParameterError::UnknownParameter { name: name.to_string() })?;
        history.at(self.instant).ok_or_else(|| ParameterError::NotDefinedAt {
            name: name.to_string(),
            instant: self.instant,
        })
    }

    /// Materializes the named scale at the bound instant.
    pub fn scale(&self, name: &str) -> Result<ScaleAtInstant, ParameterError> {
        let scale = self
            .store
            .scale(name)
            .ok_or_else(|| ParameterError::UnknownParameter { name: name.to_string() })?;
        Ok(scale.at(self.instant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::bracket::{Bracket, RATE, THRESHOLD};
    use std::collections::BTreeMap;

    #[test]
    fn test_scalar_lookup_at_instant() {
        let mut store = ParameterStore::new();
        store.add_scalar(
            "taxes.flat_rate",
            ValueHistory::from_pairs(vec![
                (Instant::new(2015, 1, 1), Some(0.2)),
                (Instant::new(2020, 1, 1), Some(0.25)),
            ])
            .unwrap(),
        );
        let store = Arc::new(store);

        let early = ParametersAtInstant::new(store.clone(), Instant::new(2016, 6, 1));
        assert_eq!(early.value("taxes.flat_rate").unwrap(), 0.2);

        let late = ParametersAtInstant::new(store.clone(), Instant::new(2021, 1, 1));
        assert_eq!(late.value("taxes.flat_rate").unwrap(), 0.25);

        let before = ParametersAtInstant::new(store.clone(), Instant::new(2000, 1, 1));
        assert!(matches!(
            before.value("taxes.flat_rate"),
            Err(ParameterError::NotDefinedAt { .. })
        ));
        assert!(matches!(
            before.value("nope"),
            Err(ParameterError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn test_scale_lookup() {
        let bracket = Bracket::new()
            .with_field(THRESHOLD, ValueHistory::constant(0.0))
            .with_field(RATE, ValueHistory::constant(0.1));
        let mut store = ParameterStore::new();
        store.add_scale(ParameterScale::new("taxes.income", BTreeMap::new(), vec![bracket]));
        let params =
            ParametersAtInstant::new(Arc::new(store), Instant::new(2020, 1, 1));
        assert_eq!(params.scale("taxes.income").unwrap().calc(100.0), 10.0);
        assert!(params.scale("missing").is_err());
    }
}
