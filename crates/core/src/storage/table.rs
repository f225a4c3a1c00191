use serde::{de::DeserializeOwned, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::errors::CoreError;

/// Logical table names.
pub const OPERATIONS_TABLE: &str = "operations";
pub const PRICES_TABLE: &str = "prices";
pub const FIRST_TRADE_DATES_TABLE: &str = "first_trade_dates";
pub const INSTRUMENTS_TABLE: &str = "instruments";
pub const PORTFOLIOS_TABLE: &str = "portfolios";

/// A persistent string-keyed mapping with explicit commit.
///
/// Mutations are staged in memory; only `commit()` makes them durable.
/// Values are opaque bytes (the caches store bincode).
pub trait Table: Send {
    fn name(&self) -> &str;

    /// All staged entries.
    fn items(&self) -> Vec<(String, Vec<u8>)>;

    fn clear(&mut self);

    fn update(&mut self, entries: Vec<(String, Vec<u8>)>);

    fn commit(&mut self) -> Result<(), CoreError>;
}

/// Opens tables by name.
pub trait TableStore {
    fn open_table(&self, name: &str) -> Result<Box<dyn Table>, CoreError>;
}

/// Read a whole table into a typed map.
pub fn load_map<V: DeserializeOwned>(table: &dyn Table) -> Result<HashMap<String, V>, CoreError> {
    table
        .items()
        .into_iter()
        .map(|(key, bytes)| {
            let value = bincode::deserialize(&bytes).map_err(|e| {
                CoreError::Deserialization(format!(
                    "Failed to decode '{key}' in table '{}': {e}",
                    table.name()
                ))
            })?;
            Ok((key, value))
        })
        .collect()
}

/// Replace a table's content with `entries` and commit.
pub fn store_map<'a, V, I>(entries: I, table: &mut dyn Table) -> Result<(), CoreError>
where
    V: Serialize + 'a,
    I: IntoIterator<Item = (&'a String, &'a V)>,
{
    let encoded = entries
        .into_iter()
        .map(|(key, value)| {
            let bytes = bincode::serialize(value).map_err(|e| {
                CoreError::Serialization(format!(
                    "Failed to encode '{key}' for table '{}': {e}",
                    table.name()
                ))
            })?;
            Ok((key.clone(), bytes))
        })
        .collect::<Result<Vec<_>, CoreError>>()?;
    table.clear();
    table.update(encoded);
    table.commit()
}

type Committed = Arc<Mutex<HashMap<String, BTreeMap<String, Vec<u8>>>>>;

/// Volatile store: committed state survives reopening a table from the same
/// store, staged state dies with the table handle.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    committed: Committed,
    commits: Arc<Mutex<HashMap<String, usize>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed entries in `name`.
    pub fn committed_len(&self, name: &str) -> usize {
        self.committed
            .lock()
            .map(|tables| tables.get(name).map_or(0, |t| t.len()))
            .unwrap_or(0)
    }

    /// How many times `name` has been committed.
    pub fn commit_count(&self, name: &str) -> usize {
        self.commits
            .lock()
            .map(|c| c.get(name).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl TableStore for MemoryStore {
    fn open_table(&self, name: &str) -> Result<Box<dyn Table>, CoreError> {
        let staged = self
            .committed
            .lock()
            .map_err(|_| CoreError::FileIO("memory store lock poisoned".into()))?
            .get(name)
            .cloned()
            .unwrap_or_default();
        Ok(Box::new(MemoryTable {
            name: name.to_string(),
            staged,
            committed: Arc::clone(&self.committed),
            commits: Arc::clone(&self.commits),
        }))
    }
}

struct MemoryTable {
    name: String,
    staged: BTreeMap<String, Vec<u8>>,
    committed: Committed,
    commits: Arc<Mutex<HashMap<String, usize>>>,
}

impl Table for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn items(&self) -> Vec<(String, Vec<u8>)> {
        self.staged.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    fn clear(&mut self) {
        self.staged.clear();
    }

    fn update(&mut self, entries: Vec<(String, Vec<u8>)>) {
        self.staged.extend(entries);
    }

    fn commit(&mut self) -> Result<(), CoreError> {
        self.committed
            .lock()
            .map_err(|_| CoreError::FileIO("memory store lock poisoned".into()))?
            .insert(self.name.clone(), self.staged.clone());
        if let Ok(mut commits) = self.commits.lock() {
            *commits.entry(self.name.clone()).or_insert(0) += 1;
        }
        Ok(())
    }
}
