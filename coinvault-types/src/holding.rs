use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current time as epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Generates a fresh, time-ordered holding id.
pub fn new_holding_id() -> String {
    format!("holding-{}", Uuid::now_v7())
}

/// A single position: some quantity of a token held at a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub id: String,
    pub symbol: String,
    pub quantity: f64,
    pub location_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds.
    pub updated_at: i64,
}

/// User input for a new holding. Id and timestamps are assigned by the vault.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHolding {
    pub symbol: String,
    pub quantity: f64,
    pub location_id: String,
    pub note: Option<String>,
}

impl NewHolding {
    pub fn new(symbol: impl Into<String>, quantity: f64, location_id: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            location_id: location_id.into(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Materializes the holding with a fresh id, stamped at `now` (epoch ms).
    pub fn into_holding(self, now: i64) -> Holding {
        Holding {
            id: new_holding_id(),
            symbol: self.symbol,
            quantity: self.quantity,
            location_id: self.location_id,
            note: self.note,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update. `note: Some(None)` clears the note.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HoldingUpdate {
    pub symbol: Option<String>,
    pub quantity: Option<f64>,
    pub location_id: Option<String>,
    pub note: Option<Option<String>>,
}

impl HoldingUpdate {
    pub fn quantity(quantity: f64) -> Self {
        Self {
            quantity: Some(quantity),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.symbol.is_none()
            && self.quantity.is_none()
            && self.location_id.is_none()
            && self.note.is_none()
    }

    /// Applies the update in place and bumps `updated_at`.
    pub fn apply(&self, holding: &mut Holding, now: i64) {
        if let Some(symbol) = &self.symbol {
            holding.symbol = symbol.clone();
        }
        if let Some(quantity) = self.quantity {
            holding.quantity = quantity;
        }
        if let Some(location_id) = &self.location_id {
            holding.location_id = location_id.clone();
        }
        if let Some(note) = &self.note {
            holding.note = note.clone();
        }
        holding.updated_at = now;
    }
}

/// Quantity held at one location, as part of an [`AggregatedHolding`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationQuantity {
    pub location_id: String,
    pub quantity: f64,
}

/// All holdings of one symbol summed across locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedHolding {
    pub symbol: String,
    pub total_quantity: f64,
    pub locations: Vec<LocationQuantity>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_holding_ids_are_unique() {
        let a = NewHolding::new("BTC", 1.0, "ledger").into_holding(1);
        let b = NewHolding::new("BTC", 1.0, "ledger").into_holding(1);
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("holding-"));
    }

    #[test]
    fn update_clears_note() {
        let mut h = NewHolding::new("ETH", 2.0, "metamask")
            .with_note("cold")
            .into_holding(10);
        let update = HoldingUpdate {
            note: Some(None),
            ..HoldingUpdate::default()
        };
        update.apply(&mut h, 20);
        assert_eq!(h.note, None);
        assert_eq!(h.updated_at, 20);
        assert_eq!(h.created_at, 10);
    }

    #[test]
    fn empty_update_detected() {
        assert!(HoldingUpdate::default().is_empty());
        assert!(!HoldingUpdate::quantity(1.5).is_empty());
    }

    #[test]
    fn holding_serializes_camel_case() {
        let h = NewHolding::new("BTC", 0.5, "ledger").into_holding(5);
        let json = serde_json::to_value(&h).unwrap();
        assert_eq!(json["locationId"], "ledger");
        assert_eq!(json["createdAt"], 5);
        assert!(json.get("note").is_none());
    }
}
