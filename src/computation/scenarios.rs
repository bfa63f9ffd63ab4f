//! Running independent what-if scenarios against detached session clones.
use crate::computation::engine::Simulation;
use rayon::prelude::*;

/// Runs each scenario against its own clone of `base`, in parallel, and
/// returns the results in scenario order. Clones are taken serially up
/// front, so every scenario starts from the same cache state and none of
/// them can observe another's writes.
pub fn map_scenarios<F, R>(base: &Simulation, scenarios: Vec<F>) -> Vec<R>
where
    F: FnOnce(&mut Simulation) -> R + Send,
    R: Send,
{
    let sessions: Vec<Simulation> =
        scenarios.iter().map(|_| base.clone_session(false, false)).collect();
    sessions
        .into_par_iter()
        .zip(scenarios)
        .map(|(mut sim, scenario)| scenario(&mut sim))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::registry::RegistryBuilder;
    use crate::store::types::{ValueType, Variable};
    use crate::values::Array;
    use crate::periods::DateUnit;
    use std::sync::Arc;

    fn double_salary_registry() -> Arc<crate::store::registry::Registry> {
        RegistryBuilder::default()
            .entity("person", "persons")
            .variable(Variable::new("salary", "person", DateUnit::Month, ValueType::Float))
            .unwrap()
            .variable(
                Variable::new("gross", "person", DateUnit::Month, ValueType::Float)
                    .with_formula(Arc::new(|ctx, period, _| {
                        let salary = ctx.calculate("salary", period)?;
                        let doubled = match salary.as_ref() {
                            Array::Float(v) => v.iter().map(|x| x * 2.0).collect(),
                            _ => vec![],
                        };
                        Ok(Array::Float(doubled))
                    })),
            )
            .unwrap()
            .build()
    }

    #[test]
    fn test_scenarios_run_in_isolation_and_in_order() {
        let registry = double_salary_registry();
        let mut base = Simulation::new(registry, &[("person", 1)]).unwrap();
        base.set_input("salary", "2020-01", Array::Float(vec![100.0])).unwrap();

        let scenarios: Vec<Box<dyn FnOnce(&mut Simulation) -> f32 + Send>> = (0..8)
            .map(|i| {
                Box::new(move |sim: &mut Simulation| {
                    let raise = Array::Float(vec![100.0 + i as f32]);
                    sim.set_input("salary", "2020-02", raise).unwrap();
                    match sim.calculate("gross", "2020-02").unwrap().as_ref() {
                        Array::Float(v) => v[0],
                        _ => f32::NAN,
                    }
                }) as Box<dyn FnOnce(&mut Simulation) -> f32 + Send>
            })
            .collect();

        let results = map_scenarios(&base, scenarios);
        let expected: Vec<f32> = (0..8).map(|i| 2.0 * (100.0 + i as f32)).collect();
        assert_eq!(results, expected);

        // The base session never saw any scenario's input.
        assert_eq!(base.get_array("salary", "2020-02").unwrap(), None);
    }
}
