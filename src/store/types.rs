//! Variable definitions: the declarative description of each computable
//! quantity, loaded once at system build time and immutable afterwards.
use crate::computation::engine::EntityContext;
use crate::computation::ledger::CalculationError;
use crate::parameters::ParametersAtInstant;
use crate::periods::{DateUnit, Instant, Period};
use crate::store::holder::Holder;
use crate::values::{Array, DefaultValue, Dtype};
use std::fmt;
use std::sync::Arc;

/// The single formula signature: an entity view, the period being computed,
/// and the parameter lookup bound to that period's start instant. Formulas
/// that need no parameters simply ignore the third argument.
pub type Formula = Arc<
    dyn Fn(&mut EntityContext<'_>, Period, &ParametersAtInstant) -> Result<Array, CalculationError>
        + Send
        + Sync,
>;

/// Produces a value from already-stored periods when no formula applies
/// (e.g. carry the last known input forward).
pub type BaseFn =
    Arc<dyn Fn(&mut dyn Holder, Period) -> Option<Array> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum ValueType {
    Bool,
    Int,
    Float,
    Double,
    Enum { possible_values: Arc<Vec<String>> },
}

impl ValueType {
    pub fn default_dtype(&self) -> Dtype {
        match self {
            ValueType::Bool => Dtype::Bool,
            ValueType::Int => Dtype::Int32,
            ValueType::Float => Dtype::Float32,
            ValueType::Double => Dtype::Float64,
            ValueType::Enum { .. } => Dtype::Enum,
        }
    }

    fn default_value(&self) -> DefaultValue {
        match self {
            ValueType::Bool => DefaultValue::Bool(false),
            ValueType::Int => DefaultValue::Int(0),
            ValueType::Float => DefaultValue::Float(0.0),
            ValueType::Double => DefaultValue::Double(0.0),
            ValueType::Enum { .. } => DefaultValue::Enum(0),
        }
    }
}

/// How requests for a period other than the definition period combine
/// per-subperiod outputs: the two period-algebra combinators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Add,
    Divide,
}

/// A formula valid from `start` onward (`None` = since forever). A variable
/// may carry several, covering successive historical ranges.
#[derive(Clone)]
pub struct DatedFormula {
    pub start: Option<Instant>,
    pub run: Formula,
}

impl fmt::Debug for DatedFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatedFormula").field("start", &self.start).finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct Variable {
    pub name: String,
    pub entity: String,
    pub definition_period: DateUnit,
    pub value_type: ValueType,
    pub dtype: Dtype,
    pub default: DefaultValue,
    /// Sorted by start, earliest first; picked by the period's start instant.
    pub formulas: Vec<DatedFormula>,
    pub base_function: Option<BaseFn>,
    pub calculate_output: Option<OutputKind>,
    /// Inputs for periods starting after this date are silently dropped.
    pub end: Option<Instant>,
    pub label: Option<String>,
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("name", &self.name)
            .field("entity", &self.entity)
            .field("definition_period", &self.definition_period)
            .field("dtype", &self.dtype)
            .finish_non_exhaustive()
    }
}

impl Variable {
    pub fn new(
        name: impl Into<String>,
        entity: impl Into<String>,
        definition_period: DateUnit,
        value_type: ValueType,
    ) -> Self {
        let dtype = value_type.default_dtype();
        let default = value_type.default_value();
        Self {
            name: name.into(),
            entity: entity.into(),
            definition_period,
            value_type,
            dtype,
            default,
            formulas: Vec::new(),
            base_function: None,
            calculate_output: None,
            end: None,
            label: None,
        }
    }

    /// Adds a formula valid since forever.
    pub fn with_formula(self, run: Formula) -> Self {
        self.with_formula_from(None, run)
    }

    /// Adds a formula valid from `start` onward.
    pub fn with_formula_from(mut self, start: Option<Instant>, run: Formula) -> Self {
        self.formulas.push(DatedFormula { start, run });
        self.formulas.sort_by_key(|f| f.start);
        self
    }

    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = default;
        self
    }

    pub fn with_dtype(mut self, dtype: Dtype) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn with_base_function(mut self, base: BaseFn) -> Self {
        self.base_function = Some(base);
        self
    }

    pub fn with_output(mut self, kind: OutputKind) -> Self {
        self.calculate_output = Some(kind);
        self
    }

    pub fn with_end(mut self, end: Instant) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The formula applicable to `period`: the latest one whose validity
    /// range contains the period's start. `None` means "use the base
    /// function or the default", never an error.
    pub fn formula_for(&self, period: &Period) -> Option<&Formula> {
        self.formulas
            .iter()
            .rev()
            .find(|f| f.start.map_or(true, |start| start <= period.start))
            .map(|f| &f.run)
    }
}

pub mod base_functions {
    use super::*;

    /// Reuses the value of the latest known period starting at or before the
    /// requested one. The classic base function for slowly-changing inputs.
    pub fn requested_period_last_value(holder: &mut dyn Holder, period: Period) -> Option<Array> {
        let last = holder
            .known_periods()
            .into_iter()
            .filter(|known| known.start <= period.start)
            .max_by_key(|known| known.start)?;
        holder.get(&last).ok().flatten().map(|array| (*array).clone())
    }

    pub fn last_value() -> BaseFn {
        Arc::new(requested_period_last_value)
    }
}
