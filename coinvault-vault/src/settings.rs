//! The local-modification timestamp shared by the vault and catalog.

use crate::error::VaultResult;
use chrono::Utc;
use coinvault_storage::{tables, TableStore, TableStoreExt};

const LAST_DATA_MODIFIED: &str = "last_data_modified";

/// 2000-01-01T00:00:00Z in epoch milliseconds.
const EARLIEST_VALID_MS: i64 = 946_684_800_000;
const MAX_FUTURE_SKEW_MS: i64 = 24 * 60 * 60 * 1000;

/// Records that local data changed at `at` (epoch ms).
pub fn record_data_modified(store: &dyn TableStore, at: i64) -> VaultResult<()> {
    store.put_json(tables::SETTINGS, LAST_DATA_MODIFIED, &at)?;
    Ok(())
}

/// The last local modification time, or `None` if unset or implausible.
pub fn last_data_modified(store: &dyn TableStore) -> VaultResult<Option<i64>> {
    let Some(at) = store.get_json::<i64>(tables::SETTINGS, LAST_DATA_MODIFIED)? else {
        return Ok(None);
    };
    let now = Utc::now().timestamp_millis();
    if at < EARLIEST_VALID_MS || at > now + MAX_FUTURE_SKEW_MS {
        tracing::warn!("discarding implausible local modification timestamp {at}");
        return Ok(None);
    }
    Ok(Some(at))
}
