use crate::error::{StorageError, StorageResult};
use crate::store::{KeyRange, TableStore, WriteBatch, WriteOp};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

type Tables = HashMap<String, BTreeMap<String, String>>;

/// In-process table store. Contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryTableStore {
    tables: RwLock<Tables>,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn apply(tables: &mut Tables, op: WriteOp) {
    match op {
        WriteOp::Put { table, key, value } => {
            tables.entry(table).or_default().insert(key, value);
        }
        WriteOp::Delete { table, key } => {
            if let Some(rows) = tables.get_mut(&table) {
                rows.remove(&key);
            }
        }
        WriteOp::Clear { table } => {
            tables.remove(&table);
        }
    }
}

impl TableStore for MemoryTableStore {
    fn get(&self, table: &str, key: &str) -> StorageResult<Option<String>> {
        let tables = self.tables.read().map_err(|_| StorageError::Poisoned)?;
        Ok(tables.get(table).and_then(|rows| rows.get(key)).cloned())
    }

    fn put(&self, table: &str, key: &str, value: &str) -> StorageResult<()> {
        let mut tables = self.tables.write().map_err(|_| StorageError::Poisoned)?;
        tables
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, table: &str, key: &str) -> StorageResult<bool> {
        let mut tables = self.tables.write().map_err(|_| StorageError::Poisoned)?;
        Ok(tables
            .get_mut(table)
            .map(|rows| rows.remove(key).is_some())
            .unwrap_or(false))
    }

    fn range(&self, table: &str, range: &KeyRange) -> StorageResult<Vec<(String, String)>> {
        let tables = self.tables.read().map_err(|_| StorageError::Poisoned)?;
        let Some(rows) = tables.get(table) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .iter()
            .filter(|(key, _)| range.contains(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn commit(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut tables = self.tables.write().map_err(|_| StorageError::Poisoned)?;
        for op in batch.into_ops() {
            apply(&mut tables, op);
        }
        Ok(())
    }
}
