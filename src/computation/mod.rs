//! The calculation engine: sessions, cycle bounding and scenario fan-out.
pub mod engine;
pub mod ledger;
pub mod scenarios;

pub use engine::{CalculationOptions, EntityContext, Simulation};
pub use ledger::{CalculationError, CycleLedger};
pub use scenarios::map_scenarios;
