use crate::error::StorageResult;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Which keys of a table a range query returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyRange {
    All,
    Prefix(String),
    /// `start` inclusive, `end` exclusive.
    Between { start: String, end: String },
}

impl KeyRange {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        KeyRange::Prefix(prefix.into())
    }

    pub fn contains(&self, key: &str) -> bool {
        match self {
            KeyRange::All => true,
            KeyRange::Prefix(prefix) => key.starts_with(prefix.as_str()),
            KeyRange::Between { start, end } => key >= start.as_str() && key < end.as_str(),
        }
    }
}

/// A single write inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put {
        table: String,
        key: String,
        value: String,
    },
    Delete {
        table: String,
        key: String,
    },
    Clear {
        table: String,
    },
}

/// Writes applied all-or-nothing by [`TableStore::commit`], in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, table: &str, key: &str, value: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::Put {
            table: table.to_string(),
            key: key.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn put_json<T: Serialize>(
        &mut self,
        table: &str,
        key: &str,
        value: &T,
    ) -> StorageResult<&mut Self> {
        let json = serde_json::to_string(value)?;
        Ok(self.put(table, key, json))
    }

    pub fn delete(&mut self, table: &str, key: &str) -> &mut Self {
        self.ops.push(WriteOp::Delete {
            table: table.to_string(),
            key: key.to_string(),
        });
        self
    }

    pub fn clear(&mut self, table: &str) -> &mut Self {
        self.ops.push(WriteOp::Clear {
            table: table.to_string(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Keyed tables of JSON values.
///
/// Single writes are last-write-wins. A [`WriteBatch`] is the only
/// multi-key atomic primitive.
pub trait TableStore: Send + Sync {
    fn get(&self, table: &str, key: &str) -> StorageResult<Option<String>>;

    fn put(&self, table: &str, key: &str, value: &str) -> StorageResult<()>;

    /// Returns whether a row was removed.
    fn delete(&self, table: &str, key: &str) -> StorageResult<bool>;

    /// Rows in key order.
    fn range(&self, table: &str, range: &KeyRange) -> StorageResult<Vec<(String, String)>>;

    fn commit(&self, batch: WriteBatch) -> StorageResult<()>;

    fn count(&self, table: &str) -> StorageResult<usize> {
        Ok(self.range(table, &KeyRange::All)?.len())
    }
}

/// Typed JSON helpers over any [`TableStore`].
pub trait TableStoreExt: TableStore {
    fn get_json<T: DeserializeOwned>(&self, table: &str, key: &str) -> StorageResult<Option<T>> {
        match self.get(table, key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, table: &str, key: &str, value: &T) -> StorageResult<()> {
        let raw = serde_json::to_string(value)?;
        self.put(table, key, &raw)
    }

    /// Every row of `table` decoded as `T`, in key order.
    fn scan_json<T: DeserializeOwned>(&self, table: &str) -> StorageResult<Vec<T>> {
        self.range(table, &KeyRange::All)?
            .into_iter()
            .map(|(_, raw)| serde_json::from_str(&raw).map_err(Into::into))
            .collect()
    }
}

impl<S: TableStore + ?Sized> TableStoreExt for S {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_range_contains() {
        let range = KeyRange::prefix("holding:");
        assert!(range.contains("holding:1"));
        assert!(!range.contains("token:BTC"));
    }

    #[test]
    fn between_range_is_half_open() {
        let range = KeyRange::Between {
            start: "b".to_string(),
            end: "d".to_string(),
        };
        assert!(range.contains("b"));
        assert!(range.contains("c"));
        assert!(!range.contains("d"));
        assert!(!range.contains("a"));
    }

    #[test]
    fn batch_preserves_order() {
        let mut batch = WriteBatch::new();
        batch.clear("t").put("t", "k", "v").delete("t", "k");
        assert_eq!(batch.len(), 3);
        assert!(matches!(batch.into_ops()[0], WriteOp::Clear { .. }));
    }
}
