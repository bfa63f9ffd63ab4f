//! Per-variable, per-entity storage of computed and input columns.
//!
//! A holder is the cache the orchestrator reads and fills, keyed by exact
//! period. Two implementations: a plain in-memory map, and a bounded one
//! that spills least-recently-used columns to disk.
use crate::computation::ledger::CalculationError;
use crate::periods::Period;
use crate::store::types::Variable;
use crate::values::Array;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub trait Holder: Send {
    /// The column stored for this exact period, if any. Takes `&mut self`
    /// so spill-aware implementations can promote and reorder entries.
    fn get(&mut self, period: &Period) -> Result<Option<Arc<Array>>, CalculationError>;

    fn put(&mut self, period: Period, array: Arc<Array>) -> Result<(), CalculationError>;

    /// Removes one period, or every period when `None`.
    fn delete(&mut self, period: Option<&Period>);

    /// An entity-sized column of the variable's default value.
    fn default_array(&self) -> Array;

    /// Every period with a stored value, in chronological order.
    fn known_periods(&self) -> Vec<Period>;

    /// Resident heap footprint in bytes (spilled columns excluded).
    fn memory_usage(&self) -> usize;

    fn boxed_clone(&self) -> Box<dyn Holder>;
}

#[derive(Clone)]
pub struct InMemoryHolder {
    variable: Arc<Variable>,
    count: usize,
    arrays: HashMap<Period, Arc<Array>>,
}

impl InMemoryHolder {
    pub fn new(variable: Arc<Variable>, count: usize) -> Self {
        Self { variable, count, arrays: HashMap::new() }
    }
}

impl Holder for InMemoryHolder {
    fn get(&mut self, period: &Period) -> Result<Option<Arc<Array>>, CalculationError> {
        Ok(self.arrays.get(period).cloned())
    }

    fn put(&mut self, period: Period, array: Arc<Array>) -> Result<(), CalculationError> {
        self.arrays.insert(period, array);
        Ok(())
    }

    fn delete(&mut self, period: Option<&Period>) {
        match period {
            Some(p) => {
                self.arrays.remove(p);
            }
            None => self.arrays.clear(),
        }
    }

    fn default_array(&self) -> Array {
        self.variable.default.broadcast(self.count)
    }

    fn known_periods(&self) -> Vec<Period> {
        let mut periods: Vec<Period> = self.arrays.keys().copied().collect();
        periods.sort_by_key(|p| (p.start, p.unit, p.size));
        periods
    }

    fn memory_usage(&self) -> usize {
        self.arrays.values().map(|a| a.nb_bytes()).sum()
    }

    fn boxed_clone(&self) -> Box<dyn Holder> {
        Box::new(self.clone())
    }
}

// Spill files are write-once: each eviction writes a fresh, uniquely named
// file, so clones sharing the backing directory can never race or corrupt
// one another. The directory is reclaimed when the last session drops it.
static SPILL_SEQ: AtomicU64 = AtomicU64::new(0);

/// A holder keeping at most `max_resident` columns in memory, spilling the
/// least recently used ones to JSON files in a shared temp directory.
pub struct DiskSpillHolder {
    variable: Arc<Variable>,
    count: usize,
    max_resident: usize,
    resident: HashMap<Period, Arc<Array>>,
    /// Recency order over resident periods; front is the eviction candidate.
    recency: Vec<Period>,
    spilled: HashMap<Period, PathBuf>,
    dir: Option<Arc<TempDir>>,
}

impl DiskSpillHolder {
    pub fn new(variable: Arc<Variable>, count: usize, max_resident: usize) -> Self {
        Self {
            variable,
            count,
            max_resident: max_resident.max(1),
            resident: HashMap::new(),
            recency: Vec::new(),
            spilled: HashMap::new(),
            dir: None,
        }
    }

    fn touch(&mut self, period: Period) {
        self.recency.retain(|p| *p != period);
        self.recency.push(period);
    }

    fn storage(e: std::io::Error) -> CalculationError {
        CalculationError::Storage(e.to_string())
    }

    fn spill_excess(&mut self) -> Result<(), CalculationError> {
        while self.resident.len() > self.max_resident {
            let victim = self.recency.remove(0);
            let array = match self.resident.remove(&victim) {
                Some(a) => a,
                None => continue,
            };
            let dir = match &self.dir {
                Some(dir) => Arc::clone(dir),
                None => {
                    let dir = Arc::new(TempDir::new().map_err(Self::storage)?);
                    self.dir = Some(Arc::clone(&dir));
                    dir
                }
            };
            let seq = SPILL_SEQ.fetch_add(1, Ordering::Relaxed);
            let path = dir.path().join(format!("{}-{}.json", self.variable.name, seq));
            let file = File::create(&path).map_err(Self::storage)?;
            serde_json::to_writer(BufWriter::new(file), array.as_ref())
                .map_err(|e| CalculationError::Storage(e.to_string()))?;
            self.spilled.insert(victim, path);
        }
        Ok(())
    }
}

impl Holder for DiskSpillHolder {
    fn get(&mut self, period: &Period) -> Result<Option<Arc<Array>>, CalculationError> {
        if let Some(array) = self.resident.get(period).cloned() {
            self.touch(*period);
            return Ok(Some(array));
        }
        let Some(path) = self.spilled.remove(period) else {
            return Ok(None);
        };
        let file = File::open(&path).map_err(Self::storage)?;
        let array: Array = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| CalculationError::Storage(e.to_string()))?;
        let array = Arc::new(array);
        self.resident.insert(*period, array.clone());
        self.touch(*period);
        self.spill_excess()?;
        Ok(Some(array))
    }

    fn put(&mut self, period: Period, array: Arc<Array>) -> Result<(), CalculationError> {
        self.spilled.remove(&period);
        self.resident.insert(period, array);
        self.touch(period);
        self.spill_excess()
    }

    fn delete(&mut self, period: Option<&Period>) {
        match period {
            Some(p) => {
                self.resident.remove(p);
                self.spilled.remove(p);
                self.recency.retain(|r| r != p);
            }
            None => {
                self.resident.clear();
                self.spilled.clear();
                self.recency.clear();
            }
        }
    }

    fn default_array(&self) -> Array {
        self.variable.default.broadcast(self.count)
    }

    fn known_periods(&self) -> Vec<Period> {
        let mut periods: Vec<Period> =
            self.resident.keys().chain(self.spilled.keys()).copied().collect();
        periods.sort_by_key(|p| (p.start, p.unit, p.size));
        periods
    }

    fn memory_usage(&self) -> usize {
        self.resident.values().map(|a| a.nb_bytes()).sum()
    }

    fn boxed_clone(&self) -> Box<dyn Holder> {
        Box::new(Self {
            variable: self.variable.clone(),
            count: self.count,
            max_resident: self.max_resident,
            resident: self.resident.clone(),
            recency: self.recency.clone(),
            spilled: self.spilled.clone(),
            dir: self.dir.clone(),
        })
    }
}

/// Per-session storage policy, fixed at session construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryConfig {
    /// When set, each holder keeps at most this many columns in memory and
    /// spills the rest to disk.
    pub max_resident_arrays: Option<usize>,
}

/// One instantiated entity: its population count and the holders of every
/// variable targeting it. Holders are created lazily on first access.
pub struct Population {
    pub key: String,
    pub count: usize,
    config: MemoryConfig,
    holders: HashMap<String, Box<dyn Holder>>,
}

impl Population {
    pub fn new(key: impl Into<String>, count: usize, config: MemoryConfig) -> Self {
        Self { key: key.into(), count, config, holders: HashMap::new() }
    }

    pub fn holder_mut(&mut self, variable: &Arc<Variable>) -> &mut Box<dyn Holder> {
        let count = self.count;
        let config = self.config;
        self.holders.entry(variable.name.clone()).or_insert_with(|| {
            match config.max_resident_arrays {
                Some(max) => Box::new(DiskSpillHolder::new(variable.clone(), count, max)),
                None => Box::new(InMemoryHolder::new(variable.clone(), count)),
            }
        })
    }

    /// Applies to holders created afterwards; existing holders keep their
    /// original policy.
    pub fn set_config(&mut self, config: MemoryConfig) {
        self.config = config;
    }

    pub fn memory_usage(&self) -> usize {
        self.holders.values().map(|h| h.memory_usage()).sum()
    }
}

impl Clone for Population {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            count: self.count,
            config: self.config,
            holders: self
                .holders
                .iter()
                .map(|(name, holder)| (name.clone(), holder.boxed_clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::periods::DateUnit;
    use crate::store::types::ValueType;
    use crate::values::DefaultValue;

    fn salary() -> Arc<Variable> {
        Arc::new(
            Variable::new("salary", "person", DateUnit::Month, ValueType::Float)
                .with_default(DefaultValue::Float(0.0)),
        )
    }

    fn column(value: f32) -> Arc<Array> {
        Arc::new(Array::Float(vec![value, value]))
    }

    #[test]
    fn test_in_memory_put_get_delete() {
        let mut holder = InMemoryHolder::new(salary(), 2);
        let jan = Period::month(2020, 1);
        let feb = Period::month(2020, 2);

        holder.put(jan, column(100.0)).unwrap();
        holder.put(feb, column(200.0)).unwrap();
        assert_eq!(holder.get(&jan).unwrap(), Some(column(100.0)));

        // Independent keys: deleting one period leaves the other readable.
        holder.delete(Some(&jan));
        assert_eq!(holder.get(&jan).unwrap(), None);
        assert_eq!(holder.get(&feb).unwrap(), Some(column(200.0)));

        holder.delete(None);
        assert!(holder.known_periods().is_empty());
        assert_eq!(holder.default_array(), Array::Float(vec![0.0, 0.0]));
    }

    #[test]
    fn test_known_periods_are_ordered() {
        let mut holder = InMemoryHolder::new(salary(), 2);
        holder.put(Period::month(2020, 3), column(3.0)).unwrap();
        holder.put(Period::month(2020, 1), column(1.0)).unwrap();
        holder.put(Period::month(2020, 2), column(2.0)).unwrap();
        assert_eq!(
            holder.known_periods(),
            vec![Period::month(2020, 1), Period::month(2020, 2), Period::month(2020, 3)]
        );
    }

    #[test]
    fn test_spill_holder_evicts_and_reads_back() {
        let mut holder = DiskSpillHolder::new(salary(), 2, 2);
        for month in 1..=4 {
            holder.put(Period::month(2020, month), column(month as f32)).unwrap();
        }
        // Only two columns stay resident.
        assert_eq!(holder.memory_usage(), 2 * 2 * 4);
        assert_eq!(holder.known_periods().len(), 4);

        // Spilled columns come back bit-identical.
        for month in 1..=4 {
            let array = holder.get(&Period::month(2020, month)).unwrap().unwrap();
            assert_eq!(*array, Array::Float(vec![month as f32, month as f32]));
        }
    }

    #[test]
    fn test_spill_holder_clone_is_independent() {
        let mut holder = DiskSpillHolder::new(salary(), 2, 1);
        holder.put(Period::month(2020, 1), column(1.0)).unwrap();
        holder.put(Period::month(2020, 2), column(2.0)).unwrap();

        let mut copy = holder.boxed_clone();
        copy.delete(None);
        assert!(copy.known_periods().is_empty());
        // The original still reads everything, including the spilled column.
        assert_eq!(holder.get(&Period::month(2020, 1)).unwrap(), Some(column(1.0)));
        assert_eq!(holder.get(&Period::month(2020, 2)).unwrap(), Some(column(2.0)));
    }

    #[test]
    fn test_population_builds_holders_lazily() {
        let mut population = Population::new("person", 2, MemoryConfig::default());
        let variable = salary();
        population
            .holder_mut(&variable)
            .put(Period::month(2020, 1), column(9.0))
            .unwrap();
        assert_eq!(
            population.holder_mut(&variable).get(&Period::month(2020, 1)).unwrap(),
            Some(column(9.0))
        );
        assert_eq!(population.memory_usage(), 2 * 4);
    }
}
