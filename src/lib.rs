//! A microsimulation calculation engine.
//!
//! A rule system (variables with dated formulas, entities, time-varying
//! parameters) is assembled once into an immutable [`store::Registry`].
//! A [`computation::Simulation`] then evaluates `(variable, period)`
//! requests against it: results are memoized per exact period, circular
//! definitions are detected and optionally tolerated up to a bounded
//! depth, and yearly/monthly quantities are bridged by explicit sum and
//! spread combinators rather than implicit conversion.
//!
//! ```
//! use microsim_core::computation::Simulation;
//! use microsim_core::periods::DateUnit;
//! use microsim_core::store::{Registry, ValueType, Variable};
//! use microsim_core::values::Array;
//!
//! let registry = Registry::builder()
//!     .entity("person", "persons")
//!     .variable(Variable::new("salary", "person", DateUnit::Month, ValueType::Float))
//!     .unwrap()
//!     .build();
//!
//! let mut sim = Simulation::new(registry, &[("person", 2)]).unwrap();
//! sim.set_input("salary", "2020-01", Array::Float(vec![2000.0, 3500.0])).unwrap();
//! let total = sim.calculate_add("salary", "2020").unwrap();
//! assert_eq!(*total, Array::Float(vec![2000.0, 3500.0]));
//! ```
pub mod computation;
pub mod parameters;
pub mod periods;
pub mod store;
pub mod tracers;
pub mod values;

pub use computation::{CalculationError, CalculationOptions, Simulation};
pub use periods::{DateUnit, Instant, IntoPeriod, Period};
pub use store::{Registry, Variable};
pub use values::{Array, Dtype};
