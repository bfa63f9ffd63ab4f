//! The evaluation orchestrator: one mutable session over an immutable
//! registry, memoizing every `(variable, period)` it computes.
use crate::computation::ledger::{CalculationError, CycleLedger};
use crate::periods::{DateUnit, IntoPeriod, Period};
use crate::store::holder::{Holder, MemoryConfig, Population};
use crate::store::registry::Registry;
use crate::store::types::{OutputKind, ValueType, Variable};
use crate::tracers::{EventLog, TraceEvent, Tracer};
use crate::values::Array;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-call knobs. `max_cycles` installs a cycle budget for the duration of
/// this calculation and every nested one it triggers: formula re-entries for
/// new periods are tolerated up to the budget, and the abort raised one step
/// beyond it is absorbed here into the variable's default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalculationOptions {
    pub max_cycles: Option<usize>,
}

impl CalculationOptions {
    pub fn with_max_cycles(max: usize) -> Self {
        Self { max_cycles: Some(max) }
    }
}

/// One evaluation session: populations, caches, cycle ledger, tracer. The
/// registry it points to is shared and never mutated; everything else is
/// private to this session.
pub struct Simulation {
    registry: Arc<Registry>,
    populations: HashMap<String, Population>,
    ledger: CycleLedger,
    max_cycles: Option<usize>,
    debug: bool,
    tracer: Option<Box<dyn Tracer + Send>>,
    memory: MemoryConfig,
}

impl Simulation {
    /// Builds a session with one population per registry entity. Every
    /// entity must be given a count, and every count must name a known
    /// entity.
    pub fn new(
        registry: Arc<Registry>,
        counts: &[(&str, usize)],
    ) -> Result<Self, CalculationError> {
        let mut populations = HashMap::new();
        for (key, count) in counts {
            if registry.entity(key).is_none() {
                return Err(CalculationError::UnknownEntity { key: key.to_string() });
            }
            populations
                .insert(key.to_string(), Population::new(*key, *count, MemoryConfig::default()));
        }
        for entity in registry.entities() {
            if !populations.contains_key(&entity.key) {
                return Err(CalculationError::UnknownEntity { key: entity.key.clone() });
            }
        }
        Ok(Self {
            registry,
            populations,
            ledger: CycleLedger::new(),
            max_cycles: None,
            debug: false,
            tracer: None,
            memory: MemoryConfig::default(),
        })
    }

    /// Must be applied before the first calculation; holders already built
    /// keep their original policy.
    pub fn with_memory_config(mut self, config: MemoryConfig) -> Self {
        self.memory = config;
        for population in self.populations.values_mut() {
            population.set_config(config);
        }
        self
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn set_tracer(&mut self, tracer: Box<dyn Tracer + Send>) {
        self.tracer = Some(tracer);
    }

    pub fn clear_tracer(&mut self) {
        self.tracer = None;
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Evaluates `variable` over `period`, reading the cache first. Repeated
    /// calls return the same shared column.
    pub fn calculate(
        &mut self,
        variable_name: &str,
        period: impl IntoPeriod,
    ) -> Result<Arc<Array>, CalculationError> {
        self.calculate_with(variable_name, period, CalculationOptions::default())
    }

    pub fn calculate_with(
        &mut self,
        variable_name: &str,
        period: impl IntoPeriod,
        options: CalculationOptions,
    ) -> Result<Arc<Array>, CalculationError> {
        let period = period.into_period()?;
        let variable = self.registry.lookup(variable_name)?;
        self.trace(TraceEvent::Start { variable: variable.name.clone(), period });

        check_period_consistency(&variable, &period)?;

        if let Some(cached) = self.holder_mut(&variable)?.get(&period)? {
            self.trace(TraceEvent::End {
                variable: variable.name.clone(),
                period,
                len: cached.len(),
            });
            return Ok(cached);
        }

        // A budget given here stays active for every nested calculation and
        // is restored on the way out; the abort it eventually produces is
        // absorbed only at this frame.
        let installed = options.max_cycles.is_some();
        let saved_budget = self.max_cycles;
        if installed {
            self.max_cycles = options.max_cycles;
        }
        let outcome = self.run_formula(&variable, period);
        if installed {
            self.max_cycles = saved_budget;
        }

        let computed = match outcome {
            Ok(value) => value,
            Err(err @ CalculationError::CycleAbort { .. }) => {
                if installed {
                    None
                } else {
                    self.trace(TraceEvent::Abort { variable: variable.name.clone(), period });
                    return Err(err);
                }
            }
            Err(err) => return Err(err),
        };

        let array = match computed {
            Some(array) => array,
            None => {
                let holder = self.holder_mut(&variable)?;
                let from_base = match &variable.base_function {
                    Some(base) => base(holder.as_mut(), period),
                    None => None,
                };
                from_base.unwrap_or_else(|| holder.default_array())
            }
        };

        let expected = self.population_count(&variable.entity)?;
        if array.len() != expected {
            return Err(CalculationError::ShapeMismatch {
                variable: variable.name.clone(),
                period,
                entity: variable.entity.clone(),
                expected,
                actual: array.len(),
            });
        }
        if self.debug && array.has_nan() {
            return Err(CalculationError::NaNProduced {
                variable: variable.name.clone(),
                period,
                count: array.nan_count(),
            });
        }

        let array = Arc::new(cast_result(array, &variable)?);
        self.holder_mut(&variable)?.put(period, array.clone())?;
        self.trace(TraceEvent::End {
            variable: variable.name.clone(),
            period,
            len: array.len(),
        });
        Ok(array)
    }

    /// Sums the variable over every subperiod of `period` at its definition
    /// granularity. Only coarsening is allowed; eternity variables have no
    /// time axis to sum over.
    pub fn calculate_add(
        &mut self,
        variable_name: &str,
        period: impl IntoPeriod,
    ) -> Result<Arc<Array>, CalculationError> {
        let period = period.into_period()?;
        let variable = self.registry.lookup(variable_name)?;
        if variable.definition_period == DateUnit::Eternity {
            return Err(CalculationError::UnsupportedAggregation {
                variable: variable.name.clone(),
                period,
                reason: "only variables defined for a day, a month or a year can be summed \
                         over time"
                    .to_string(),
            });
        }
        if variable.definition_period > period.unit {
            return Err(CalculationError::UnsupportedAggregation {
                variable: variable.name.clone(),
                period,
                reason: format!(
                    "'{}' is defined per {}, which does not fit inside a {}; \
                     use calculate_divide to spread a coarser value over finer periods",
                    variable.name, variable.definition_period, period.unit
                ),
            });
        }
        let mut total: Option<Array> = None;
        for sub in period.subperiods(variable.definition_period) {
            let value = self.calculate(variable_name, sub)?;
            total = Some(match total {
                None => (*value).clone(),
                Some(acc) => acc.checked_add(&value)?,
            });
        }
        match total {
            Some(sum) => Ok(Arc::new(sum)),
            None => Err(CalculationError::UnsupportedAggregation {
                variable: variable.name.clone(),
                period,
                reason: format!(
                    "period {} decomposes into no {} subperiod",
                    period, variable.definition_period
                ),
            }),
        }
    }

    /// Spreads a yearly variable evenly over months: a one-month request
    /// returns the containing year's value divided by 12.
    pub fn calculate_divide(
        &mut self,
        variable_name: &str,
        period: impl IntoPeriod,
    ) -> Result<Arc<Array>, CalculationError> {
        let period = period.into_period()?;
        let variable = self.registry.lookup(variable_name)?;
        if variable.definition_period != DateUnit::Year {
            return Err(CalculationError::UnsupportedAggregation {
                variable: variable.name.clone(),
                period,
                reason: "only variables defined for a year can be spread over months"
                    .to_string(),
            });
        }
        if period.size != 1 || !matches!(period.unit, DateUnit::Month | DateUnit::Year) {
            return Err(CalculationError::UnsupportedAggregation {
                variable: variable.name.clone(),
                period,
                reason: "spreading requires a single month or a single year".to_string(),
            });
        }
        match period.unit {
            DateUnit::Month => {
                let yearly = self.calculate(variable_name, period.this_year())?;
                Ok(Arc::new(yearly.divide_by(12.0)?))
            }
            _ => self.calculate(variable_name, period),
        }
    }

    /// Evaluates through the variable's declared output combinator, falling
    /// back to a plain calculation when it has none.
    pub fn calculate_output(
        &mut self,
        variable_name: &str,
        period: impl IntoPeriod,
    ) -> Result<Arc<Array>, CalculationError> {
        let period = period.into_period()?;
        let variable = self.registry.lookup(variable_name)?;
        match variable.calculate_output {
            None => self.calculate(variable_name, period),
            Some(OutputKind::Add) => self.calculate_add(variable_name, period),
            Some(OutputKind::Divide) => self.calculate_divide(variable_name, period),
        }
    }

    /// The cached column for this exact period, without computing anything.
    pub fn get_array(
        &mut self,
        variable_name: &str,
        period: impl IntoPeriod,
    ) -> Result<Option<Arc<Array>>, CalculationError> {
        let period = period.into_period()?;
        let variable = self.registry.lookup(variable_name)?;
        self.holder_mut(&variable)?.get(&period)
    }

    /// Stores an input column. Inputs for periods starting after the
    /// variable's end date are silently dropped.
    pub fn set_input(
        &mut self,
        variable_name: &str,
        period: impl IntoPeriod,
        array: Array,
    ) -> Result<(), CalculationError> {
        let period = period.into_period()?;
        let variable = self.registry.lookup(variable_name)?;
        if let Some(end) = variable.end {
            if period.start > end {
                return Ok(());
            }
        }
        check_period_consistency(&variable, &period)?;
        let expected = self.population_count(&variable.entity)?;
        if array.len() != expected {
            return Err(CalculationError::ShapeMismatch {
                variable: variable.name.clone(),
                period,
                entity: variable.entity.clone(),
                expected,
                actual: array.len(),
            });
        }
        let array = Arc::new(cast_result(array, &variable)?);
        self.holder_mut(&variable)?.put(period, array)?;
        Ok(())
    }

    /// Drops cached values for one period, or for every period when `None`.
    /// The next calculation recomputes from scratch.
    pub fn delete_arrays(
        &mut self,
        variable_name: &str,
        period: Option<&Period>,
    ) -> Result<(), CalculationError> {
        let variable = self.registry.lookup(variable_name)?;
        self.holder_mut(&variable)?.delete(period);
        Ok(())
    }

    pub fn known_periods(
        &mut self,
        variable_name: &str,
    ) -> Result<Vec<Period>, CalculationError> {
        let variable = self.registry.lookup(variable_name)?;
        Ok(self.holder_mut(&variable)?.known_periods())
    }

    /// Resident bytes across every holder of every population.
    pub fn get_memory_usage(&self) -> usize {
        self.populations.values().map(Population::memory_usage).sum()
    }

    /// A detached session sharing the registry: caches are copied, the cycle
    /// ledger starts empty, and a tracer is attached only when `trace` is
    /// set (reusing this session's tracer if it has one).
    pub fn clone_session(&self, debug: bool, trace: bool) -> Simulation {
        let tracer = if trace {
            Some(
                self.tracer
                    .as_ref()
                    .map(|t| t.boxed_clone())
                    .unwrap_or_else(|| Box::new(EventLog::new())),
            )
        } else {
            None
        };
        Simulation {
            registry: self.registry.clone(),
            populations: self.populations.clone(),
            ledger: CycleLedger::new(),
            max_cycles: self.max_cycles,
            debug,
            tracer,
            memory: self.memory,
        }
    }

    fn run_formula(
        &mut self,
        variable: &Arc<Variable>,
        period: Period,
    ) -> Result<Option<Array>, CalculationError> {
        let Some(formula) = self.registry.formula_for(variable, &period) else {
            return Ok(None);
        };
        self.ledger.enter(
            &variable.name,
            period,
            variable.definition_period,
            self.max_cycles,
        )?;
        let parameters = self.registry.parameters_at(period.start);
        let result = {
            let mut context =
                EntityContext { sim: self, entity: variable.entity.clone() };
            formula(&mut context, period, &parameters)
        };
        // Popped before propagating any error, so the ledger drains on every
        // unwinding path and the session stays usable afterwards.
        self.ledger.exit(&variable.name);
        Ok(Some(result?))
    }

    fn holder_mut(
        &mut self,
        variable: &Arc<Variable>,
    ) -> Result<&mut Box<dyn Holder>, CalculationError> {
        let population = self
            .populations
            .get_mut(&variable.entity)
            .ok_or_else(|| CalculationError::UnknownEntity { key: variable.entity.clone() })?;
        Ok(population.holder_mut(variable))
    }

    fn population_count(&self, entity: &str) -> Result<usize, CalculationError> {
        self.populations
            .get(entity)
            .map(|p| p.count)
            .ok_or_else(|| CalculationError::UnknownEntity { key: entity.to_string() })
    }

    fn trace(&mut self, event: TraceEvent) {
        if let Some(tracer) = self.tracer.as_mut() {
            tracer.on_event(event);
        }
    }

    #[cfg(test)]
    fn ledger_is_drained(&self) -> bool {
        self.ledger.is_drained()
    }
}

/// The view formulas receive: the population size of the variable's entity
/// plus re-entrant access to the session's calculation methods.
pub struct EntityContext<'a> {
    sim: &'a mut Simulation,
    entity: String,
}

impl EntityContext<'_> {
    pub fn count(&self) -> usize {
        self.sim
            .populations
            .get(&self.entity)
            .map(|p| p.count)
            .expect("BUG: population missing for a registered entity")
    }

    pub fn entity_key(&self) -> &str {
        &self.entity
    }

    pub fn calculate(
        &mut self,
        variable_name: &str,
        period: impl IntoPeriod,
    ) -> Result<Arc<Array>, CalculationError> {
        self.sim.calculate(variable_name, period)
    }

    /// Lets a formula install a cycle budget on one of its own requests,
    /// typically when it depends on its own past values.
    pub fn calculate_with(
        &mut self,
        variable_name: &str,
        period: impl IntoPeriod,
        options: CalculationOptions,
    ) -> Result<Arc<Array>, CalculationError> {
        self.sim.calculate_with(variable_name, period, options)
    }

    pub fn calculate_add(
        &mut self,
        variable_name: &str,
        period: impl IntoPeriod,
    ) -> Result<Arc<Array>, CalculationError> {
        self.sim.calculate_add(variable_name, period)
    }

    pub fn calculate_divide(
        &mut self,
        variable_name: &str,
        period: impl IntoPeriod,
    ) -> Result<Arc<Array>, CalculationError> {
        self.sim.calculate_divide(variable_name, period)
    }
}

/// A variable may only be computed directly over one period of its own
/// definition granularity; anything else must go through the add or divide
/// combinators. Eternity variables accept any period.
fn check_period_consistency(
    variable: &Variable,
    period: &Period,
) -> Result<(), CalculationError> {
    let defined = variable.definition_period;
    if defined == DateUnit::Eternity {
        return Ok(());
    }
    if period.unit == defined && period.size == 1 {
        return Ok(());
    }
    let reason = if period.unit > defined || (period.unit == defined && period.size > 1) {
        format!(
            "'{}' is defined per {}; requested {}. Use calculate_add to sum it over the \
             whole period, or request a single {}",
            variable.name, defined, period, defined
        )
    } else {
        format!(
            "'{}' is defined per {}; requested {}. Use calculate_divide to spread the \
             {} value over finer periods, or request a whole {}",
            variable.name, defined, period, defined, defined
        )
    };
    Err(CalculationError::PeriodMismatch {
        variable: variable.name.clone(),
        period: *period,
        reason,
    })
}

/// Coerces a formula result into the variable's storage dtype. Enum columns
/// arrive as integer category indices and are range-checked before encoding.
fn cast_result(array: Array, variable: &Variable) -> Result<Array, CalculationError> {
    if let ValueType::Enum { possible_values } = &variable.value_type {
        return match array {
            Array::Enum(_) => Ok(array),
            Array::Int(raw) => {
                let categories = possible_values.len();
                let mut encoded = Vec::with_capacity(raw.len());
                for value in raw {
                    if value < 0 || value as usize >= categories {
                        return Err(CalculationError::InvalidFormulaResult {
                            variable: variable.name.clone(),
                            reason: format!(
                                "category index {} out of range for {} possible values",
                                value, categories
                            ),
                        });
                    }
                    encoded.push(value as u8);
                }
                Ok(Array::Enum(encoded))
            }
            other => Err(CalculationError::InvalidFormulaResult {
                variable: variable.name.clone(),
                reason: format!(
                    "expected integer category indices, got a {:?} column",
                    other.dtype()
                ),
            }),
        };
    }
    if array.dtype() == variable.dtype {
        Ok(array)
    } else {
        Ok(array.cast(variable.dtype)?)
    }
}
