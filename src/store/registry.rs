//! The immutable registry of entities, variables and parameters.
use crate::computation::ledger::CalculationError;
use crate::parameters::{ParameterStore, ParametersAtInstant};
use crate::periods::{Instant, Period};
use crate::store::types::{Formula, Variable};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("a variable named '{name}' is already registered")]
    DuplicateVariable { name: String },
    #[error("variable '{variable}' targets unknown entity '{entity}'")]
    UnknownEntity { variable: String, entity: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub key: String,
    pub plural: String,
}

/// The rule system: every variable and parameter definition, shared
/// read-only across sessions. Must not change once a session evaluates
/// against it, which the builder enforces by consuming itself.
pub struct Registry {
    entities: Vec<EntityDescriptor>,
    variables: HashMap<String, Arc<Variable>>,
    parameters: Arc<ParameterStore>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<Variable>, CalculationError> {
        self.variables
            .get(name)
            .cloned()
            .ok_or_else(|| CalculationError::UnknownVariable { name: name.to_string() })
    }

    /// The formula applicable to `period`, as a shareable handle.
    pub fn formula_for(&self, variable: &Variable, period: &Period) -> Option<Formula> {
        variable.formula_for(period).cloned()
    }

    pub fn parameters_at(&self, instant: Instant) -> ParametersAtInstant {
        ParametersAtInstant::new(self.parameters.clone(), instant)
    }

    pub fn entities(&self) -> &[EntityDescriptor] {
        &self.entities
    }

    pub fn entity(&self, key: &str) -> Option<&EntityDescriptor> {
        self.entities.iter().find(|e| e.key == key)
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    entities: Vec<EntityDescriptor>,
    variables: HashMap<String, Arc<Variable>>,
    parameters: ParameterStore,
}

impl std::fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("entities", &self.entities)
            .field("variables", &self.variables.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl RegistryBuilder {
    pub fn entity(mut self, key: impl Into<String>, plural: impl Into<String>) -> Self {
        self.entities.push(EntityDescriptor { key: key.into(), plural: plural.into() });
        self
    }

    /// Registers a variable. Duplicate names and dangling entity references
    /// are build errors; definitions are code, so renaming silently would
    /// corrupt every later lookup.
    pub fn variable(mut self, variable: Variable) -> Result<Self, RegistryError> {
        if !self.entities.iter().any(|e| e.key == variable.entity) {
            return Err(RegistryError::UnknownEntity {
                variable: variable.name.clone(),
                entity: variable.entity.clone(),
            });
        }
        if self.variables.contains_key(&variable.name) {
            return Err(RegistryError::DuplicateVariable { name: variable.name });
        }
        self.variables.insert(variable.name.clone(), Arc::new(variable));
        Ok(self)
    }

    pub fn parameters(mut self, store: ParameterStore) -> Self {
        self.parameters = store;
        self
    }

    pub fn build(self) -> Arc<Registry> {
        Arc::new(Registry {
            entities: self.entities,
            variables: self.variables,
            parameters: Arc::new(self.parameters),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::periods::DateUnit;
    use crate::store::types::ValueType;

    fn person_variable(name: &str) -> Variable {
        Variable::new(name, "person", DateUnit::Month, ValueType::Float)
    }

    #[test]
    fn test_lookup_unknown_variable() {
        let registry = Registry::builder().entity("person", "persons").build();
        assert!(matches!(
            registry.lookup("salary"),
            Err(CalculationError::UnknownVariable { .. })
        ));
    }

    #[test]
    fn test_duplicate_variable_is_rejected() {
        let result = Registry::builder()
            .entity("person", "persons")
            .variable(person_variable("salary"))
            .unwrap()
            .variable(person_variable("salary"));
        assert_eq!(
            result.unwrap_err(),
            RegistryError::DuplicateVariable { name: "salary".to_string() }
        );
    }

    #[test]
    fn test_variable_must_target_known_entity() {
        let result = Registry::builder()
            .entity("person", "persons")
            .variable(Variable::new("rent", "household", DateUnit::Month, ValueType::Float));
        assert_eq!(
            result.unwrap_err(),
            RegistryError::UnknownEntity {
                variable: "rent".to_string(),
                entity: "household".to_string()
            }
        );
    }
}
