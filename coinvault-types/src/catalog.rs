use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a location keeps assets.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    DomesticCex,
    GlobalCex,
    SwWallet,
    HwWallet,
    #[default]
    Custom,
}

/// An exchange or wallet a holding is kept at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: LocationType,
    #[serde(default)]
    pub is_custom: bool,
}

impl Location {
    /// Prefix every user-created location id carries.
    pub const CUSTOM_PREFIX: &'static str = "custom-";

    pub fn preset(id: &str, name: &str, kind: LocationType) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind,
            is_custom: false,
        }
    }

    /// A user-defined location with a fresh `custom-` id.
    pub fn custom(name: impl Into<String>) -> Self {
        Self {
            id: format!("{}{}", Self::CUSTOM_PREFIX, Uuid::now_v7()),
            name: name.into(),
            kind: LocationType::Custom,
            is_custom: true,
        }
    }
}

/// A tradable asset. `id` is the market-data identifier (e.g. "bitcoin").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    pub symbol: String,
    pub name: String,
}

impl Token {
    pub fn new(id: impl Into<String>, symbol: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into(),
            name: name.into(),
        }
    }
}
