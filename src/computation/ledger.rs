//! The error taxonomy and the per-session cycle ledger.
use crate::periods::{DateUnit, Period};
use smallvec::{smallvec, SmallVec};
use std::collections::HashMap;

pub use self::error::CalculationError;
mod error {
    use crate::parameters::ParameterError;
    use crate::periods::{Period, PeriodParseError};
    use crate::values::ValueError;
    use thiserror::Error;

    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum CalculationError {
        #[error("variable '{name}' is not defined in the registry")]
        UnknownVariable { name: String },
        #[error("entity '{key}' has no population in this simulation")]
        UnknownEntity { key: String },
        #[error("unable to compute '{variable}' for period {period}: {reason}")]
        PeriodMismatch { variable: String, period: Period, reason: String },
        #[error("unable to aggregate '{variable}' over period {period}: {reason}")]
        UnsupportedAggregation { variable: String, period: Period, reason: String },
        #[error(
            "circular definition detected on '{variable}' for period {period}; \
             formulas and periods involved: {involved}"
        )]
        CircularDefinition { variable: String, period: Period, involved: String },
        #[error(
            "'{variable}' re-entered for period {period} beyond the allowed depth; \
             set `max_cycles` on the outer calculation to tolerate bounded cycles"
        )]
        CycleAbort { variable: String, period: Period },
        #[error(
            "formula for '{variable}' over {period} returned {actual} value(s), \
             but entity '{entity}' has {expected} member(s)"
        )]
        ShapeMismatch {
            variable: String,
            period: Period,
            entity: String,
            expected: usize,
            actual: usize,
        },
        #[error("formula for '{variable}' over {period} produced {count} NaN value(s)")]
        NaNProduced { variable: String, period: Period, count: usize },
        #[error("formula for '{variable}' returned an invalid column: {reason}")]
        InvalidFormulaResult { variable: String, reason: String },
        #[error("holder storage failure: {0}")]
        Storage(String),
        #[error(transparent)]
        Value(#[from] ValueError),
        #[error(transparent)]
        Parameter(#[from] ParameterError),
        #[error(transparent)]
        InvalidPeriod(#[from] PeriodParseError),
    }
}

/// Tracks which `(variable, period)` computations are in flight, to detect
/// and bound circular definitions. Owned by one session; entries are pushed
/// on formula entry and popped on exit, so the ledger drains completely when
/// the outermost call returns.
#[derive(Debug, Clone, Default)]
pub struct CycleLedger {
    in_flight: HashMap<String, SmallVec<[Period; 4]>>,
}

impl CycleLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a formula entry for `(variable, period)`.
    ///
    /// - First entry for the variable: always accepted.
    /// - Re-entry for a period already in flight, or any re-entry of an
    ///   eternity-defined variable: a true circular definition, fatal even
    ///   when a budget is active.
    /// - Re-entry for a new period: accepted while a budget is active and
    ///   not yet exceeded, otherwise a recoverable cycle abort.
    pub fn enter(
        &mut self,
        variable: &str,
        period: Period,
        definition_period: DateUnit,
        budget: Option<usize>,
    ) -> Result<(), CalculationError> {
        let Some(entry) = self.in_flight.get_mut(variable) else {
            self.in_flight.insert(variable.to_string(), smallvec![period]);
            return Ok(());
        };
        if entry.contains(&period) || definition_period == DateUnit::Eternity {
            let involved = self.describe();
            return Err(CalculationError::CircularDefinition {
                variable: variable.to_string(),
                period,
                involved,
            });
        }
        match budget {
            Some(max) if entry.len() <= max => {
                entry.push(period);
                Ok(())
            }
            _ => Err(CalculationError::CycleAbort { variable: variable.to_string(), period }),
        }
    }

    /// Unregisters the most recent entry for `variable`, dropping the
    /// variable's slot entirely once no period remains in flight.
    pub fn exit(&mut self, variable: &str) {
        if let Some(entry) = self.in_flight.get_mut(variable) {
            entry.pop();
            if entry.is_empty() {
                self.in_flight.remove(variable);
            }
        }
    }

    pub fn is_drained(&self) -> bool {
        self.in_flight.is_empty()
    }

    fn describe(&self) -> String {
        let mut pairs: Vec<String> = self
            .in_flight
            .iter()
            .flat_map(|(name, periods)| {
                periods.iter().map(move |p| format!("{}@{}", name, p))
            })
            .collect();
        pairs.sort();
        pairs.dedup();
        pairs.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jan() -> Period {
        Period::month(2020, 1)
    }

    #[test]
    fn test_first_entry_is_accepted() {
        let mut ledger = CycleLedger::new();
        ledger.enter("salary", jan(), DateUnit::Month, None).unwrap();
        ledger.exit("salary");
        assert!(ledger.is_drained());
    }

    #[test]
    fn test_same_period_reentry_is_fatal_even_with_budget() {
        let mut ledger = CycleLedger::new();
        ledger.enter("salary", jan(), DateUnit::Month, Some(10)).unwrap();
        let err = ledger.enter("salary", jan(), DateUnit::Month, Some(10)).unwrap_err();
        assert!(matches!(err, CalculationError::CircularDefinition { .. }));
        assert!(err.to_string().contains("salary@2020-01"));
    }

    #[test]
    fn test_eternity_variable_reentry_is_fatal() {
        let mut ledger = CycleLedger::new();
        let p = Period::eternity();
        ledger.enter("birth", p, DateUnit::Eternity, Some(10)).unwrap();
        let err = ledger
            .enter("birth", Period::month(2020, 2), DateUnit::Eternity, Some(10))
            .unwrap_err();
        assert!(matches!(err, CalculationError::CircularDefinition { .. }));
    }

    #[test]
    fn test_reentry_without_budget_aborts() {
        let mut ledger = CycleLedger::new();
        ledger.enter("salary", jan(), DateUnit::Month, None).unwrap();
        let err =
            ledger.enter("salary", jan().offset(-1), DateUnit::Month, None).unwrap_err();
        assert!(matches!(err, CalculationError::CycleAbort { .. }));
    }

    #[test]
    fn test_budget_bounds_reentries() {
        let mut ledger = CycleLedger::new();
        let budget = Some(2);
        ledger.enter("salary", jan(), DateUnit::Month, budget).unwrap();
        ledger.enter("salary", jan().offset(-1), DateUnit::Month, budget).unwrap();
        ledger.enter("salary", jan().offset(-2), DateUnit::Month, budget).unwrap();
        // A fourth period exceeds the budget of 2 tolerated re-entries.
        let err =
            ledger.enter("salary", jan().offset(-3), DateUnit::Month, budget).unwrap_err();
        assert!(matches!(err, CalculationError::CycleAbort { .. }));

        for _ in 0..3 {
            ledger.exit("salary");
        }
        assert!(ledger.is_drained());
    }
}
