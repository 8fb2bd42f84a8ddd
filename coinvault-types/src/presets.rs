//! Built-in locations and tokens every install starts with.
//!
//! Presets are seeded locally on first run and are excluded from the
//! normalized content hash, so two devices never disagree about them.

use crate::{Location, LocationType, Token};

const PRESET_LOCATIONS: [(&str, &str, LocationType); 17] = [
    ("bitflyer", "bitFlyer", LocationType::DomesticCex),
    ("coincheck", "Coincheck", LocationType::DomesticCex),
    ("bitbank", "bitbank", LocationType::DomesticCex),
    ("gmo-coin", "GMO Coin", LocationType::DomesticCex),
    ("sbi-vc", "SBI VC Trade", LocationType::DomesticCex),
    ("binance", "Binance", LocationType::GlobalCex),
    ("coinbase", "Coinbase", LocationType::GlobalCex),
    ("kraken", "Kraken", LocationType::GlobalCex),
    ("bybit", "Bybit", LocationType::GlobalCex),
    ("okx", "OKX", LocationType::GlobalCex),
    ("metamask", "MetaMask", LocationType::SwWallet),
    ("trust-wallet", "Trust Wallet", LocationType::SwWallet),
    ("phantom", "Phantom", LocationType::SwWallet),
    ("keplr", "Keplr", LocationType::SwWallet),
    ("backpack", "Backpack", LocationType::SwWallet),
    ("ledger", "Ledger", LocationType::HwWallet),
    ("trezor", "Trezor", LocationType::HwWallet),
];

const PRESET_TOKENS: [(&str, &str, &str); 15] = [
    ("bitcoin", "BTC", "Bitcoin"),
    ("ethereum", "ETH", "Ethereum"),
    ("binancecoin", "BNB", "BNB"),
    ("cardano", "ADA", "Cardano"),
    ("solana", "SOL", "Solana"),
    ("ripple", "XRP", "XRP"),
    ("polkadot", "DOT", "Polkadot"),
    ("dogecoin", "DOGE", "Dogecoin"),
    ("avalanche-2", "AVAX", "Avalanche"),
    ("shiba-inu", "SHIB", "Shiba Inu"),
    ("matic-network", "MATIC", "Polygon"),
    ("litecoin", "LTC", "Litecoin"),
    ("cosmos", "ATOM", "Cosmos"),
    ("chainlink", "LINK", "Chainlink"),
    ("uniswap", "UNI", "Uniswap"),
];

pub fn preset_locations() -> Vec<Location> {
    PRESET_LOCATIONS
        .iter()
        .map(|(id, name, kind)| Location::preset(id, name, *kind))
        .collect()
}

pub fn preset_tokens() -> Vec<Token> {
    PRESET_TOKENS
        .iter()
        .map(|(id, symbol, name)| Token::new(*id, *symbol, *name))
        .collect()
}

pub fn is_preset_location(id: &str) -> bool {
    PRESET_LOCATIONS.iter().any(|(preset, _, _)| *preset == id)
}

/// Case-insensitive, surrounding whitespace ignored.
pub fn is_preset_token_symbol(symbol: &str) -> bool {
    let symbol = symbol.trim();
    PRESET_TOKENS
        .iter()
        .any(|(_, preset, _)| preset.eq_ignore_ascii_case(symbol))
}
