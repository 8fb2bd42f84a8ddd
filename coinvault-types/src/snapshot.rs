use crate::{Holding, Location, Token};
use serde::{Deserialize, Serialize};

/// The full exported state of a portfolio.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    #[serde(default)]
    pub holdings: Vec<Holding>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub tokens: Vec<Token>,
}

impl PortfolioSnapshot {
    pub fn new(holdings: Vec<Holding>, locations: Vec<Location>, tokens: Vec<Token>) -> Self {
        Self {
            holdings,
            locations,
            tokens,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty() && self.locations.is_empty() && self.tokens.is_empty()
    }
}
