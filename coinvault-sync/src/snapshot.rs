//! Canonical form of a portfolio for comparing local and remote content.
//!
//! Two snapshots that differ only in ids of holdings, timestamps, ordering,
//! float noise below 1e-8, zero-quantity rows or preset catalog entries hash
//! the same. Notes, custom location types and token market ids all count.

use crate::error::SyncResult;
use coinvault_types::presets::{is_preset_location, is_preset_token_symbol};
use coinvault_types::{Holding, Location, LocationType, PortfolioSnapshot, Token};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::hash::Hash;

/// Quantities compare in units of 1e-8.
const QUANTITY_SCALE: f64 = 100_000_000.0;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedHolding {
    pub symbol: String,
    pub location_id: String,
    pub quantity: i64,
    /// Trimmed; empty when absent.
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedLocation {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: LocationType,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NormalizedToken {
    pub symbol: String,
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizedSnapshot {
    pub holdings: Vec<NormalizedHolding>,
    pub locations: Vec<NormalizedLocation>,
    pub tokens: Vec<NormalizedToken>,
}

fn normalize_holding(h: &Holding) -> Option<NormalizedHolding> {
    let symbol = h.symbol.trim().to_uppercase();
    let location_id = h.location_id.trim().to_string();
    if symbol.is_empty() || location_id.is_empty() || !h.quantity.is_finite() {
        return None;
    }
    let quantity = (h.quantity * QUANTITY_SCALE).round() as i64;
    (quantity > 0).then(|| NormalizedHolding {
        symbol,
        location_id,
        quantity,
        note: h.note.as_deref().unwrap_or_default().trim().to_string(),
    })
}

fn normalize_location(l: &Location) -> Option<NormalizedLocation> {
    let custom = l.is_custom || l.id.starts_with(Location::CUSTOM_PREFIX);
    (custom && !is_preset_location(&l.id)).then(|| NormalizedLocation {
        id: l.id.clone(),
        name: l.name.trim().to_string(),
        kind: l.kind,
    })
}

fn normalize_token(t: &Token) -> Option<NormalizedToken> {
    let symbol = t.symbol.trim().to_uppercase();
    (!symbol.is_empty() && !is_preset_token_symbol(&symbol)).then(|| NormalizedToken {
        symbol,
        name: t.name.trim().to_string(),
        id: t.id.trim().to_string(),
    })
}

pub fn normalize(snapshot: &PortfolioSnapshot) -> NormalizedSnapshot {
    let mut holdings: Vec<_> = snapshot.holdings.iter().filter_map(normalize_holding).collect();
    let mut locations: Vec<_> = snapshot.locations.iter().filter_map(normalize_location).collect();
    let mut tokens: Vec<_> = snapshot.tokens.iter().filter_map(normalize_token).collect();
    holdings.sort();
    locations.sort_by(|a, b| a.id.cmp(&b.id));
    tokens.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    NormalizedSnapshot {
        holdings,
        locations,
        tokens,
    }
}

/// SHA-256 hex over the canonical JSON of the normalized snapshot.
pub fn content_hash(snapshot: &PortfolioSnapshot) -> SyncResult<String> {
    let json = serde_json::to_vec(&normalize(snapshot))?;
    Ok(hex::encode(Sha256::digest(&json)))
}

/// Whether every item of `needle` occurs in `haystack`, counting duplicates.
fn contains_all<T: Eq + Hash>(haystack: &[T], needle: &[T]) -> bool {
    let mut available: HashMap<&T, usize> = HashMap::new();
    for item in haystack {
        *available.entry(item).or_default() += 1;
    }
    needle.iter().all(|item| match available.get_mut(item) {
        Some(n) if *n > 0 => {
            *n -= 1;
            true
        }
        _ => false,
    })
}

/// Whether `local` only adds to `remote`: every normalized remote holding,
/// custom location and custom token is present locally.
pub fn is_additive(local: &PortfolioSnapshot, remote: &PortfolioSnapshot) -> bool {
    let local = normalize(local);
    let remote = normalize(remote);
    contains_all(&local.holdings, &remote.holdings)
        && contains_all(&local.locations, &remote.locations)
        && contains_all(&local.tokens, &remote.tokens)
}
