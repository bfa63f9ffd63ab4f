//! The time-varying parameter model and the scale resolver.
//!
//! Legislative values (scalar rates, thresholds, bracket tables) are indexed
//! by the instant they come into force. The resolver turns a named bracket
//! table into a concrete piecewise function for any instant in time.
pub mod bracket;
pub mod scale;
pub mod store;
pub mod taxscale;

pub use bracket::{Bracket, BracketField, FieldMeta, ResolvedBracket, ValueHistory};
pub use scale::ParameterScale;
pub use store::{ParameterError, ParameterStore, ParametersAtInstant};
pub use taxscale::{
    LinearAverageRateScale, MarginalAmountScale, MarginalRateScale, ScaleAtInstant,
    SingleAmountScale,
};
