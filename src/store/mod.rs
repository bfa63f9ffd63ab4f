//! Definitions (variables, entities, registry) and per-period value storage.
pub mod holder;
pub mod registry;
pub mod types;

pub use holder::{
    DiskSpillHolder, Holder, InMemoryHolder, MemoryConfig, Population,
};
pub use registry::{EntityDescriptor, Registry, RegistryBuilder, RegistryError};
pub use types::{
    base_functions, BaseFn, DatedFormula, Formula, OutputKind, ValueType, Variable,
};
