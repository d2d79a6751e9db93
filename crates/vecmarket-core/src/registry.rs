//! Static asset identity registry.
//!
//! Assets are identified by a `(country, exchange, asset type, local symbol)`
//! tuple of numeric ids. The first three lookups are total, falling back to
//! the calibrated default id 1 for unknown codes (0 is reserved); the local
//! symbol lookup is partial.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Valid country ids span 1–999; 0 is reserved for unknown.
pub const NUM_COUNTRIES: u32 = 1000;
/// Exchange codes span 1–127 within each country.
pub const NUM_EXCHANGES: u32 = 128;
/// Asset type identifiers span 1–31.
pub const NUM_ASSET_TYPES: u32 = 32;
/// Local symbol identifiers span 1–9,999.
pub const NUM_LOCAL_SYMBOLS: u32 = 10_000;

/// Seed list for US equity sessions.
pub const PRIMARY_STOCK_SYMBOLS: &[&str] = &[
    // Mega-cap technology and communication services
    "AAPL", "MSFT", "AMZN", "GOOGL", "GOOG", "META", "TSLA", "NVDA",
    // Large-cap financials
    "JPM", "BAC", "WFC", "C", "GS", "MS", "V", "MA", "PYPL", "AXP",
    // Healthcare and biotechnology
    "UNH", "JNJ", "PFE", "MRK", "ABBV", "LLY", "TMO", "CVS", "BMY", "MDT", "ABT",
    // Energy
    "CVX", "XOM", "COP", "OXY", "SLB", "PXD", "DVN",
    // Consumer staples and discretionary
    "HD", "LOW", "COST", "WMT", "TGT", "MCD", "SBUX", "KO", "PEP", "PM", "MO", "PG", "CL", "KMB",
    "NKE", "DIS",
    // Additional technology and semiconductors
    "ORCL", "IBM", "INTC", "AMD", "AVGO", "QCOM", "TXN", "MU", "ADBE",
    // Telecommunications and media
    "VZ", "T", "TMUS", "CMCSA",
    // Industrials and defense
    "BA", "LMT", "RTX", "NOC", "GD", "CAT", "DE", "GE", "HON", "MMM", "UPS", "FDX",
    // Materials
    "LIN", "APD", "NEM", "FCX", "AA", "NUE",
    // Utilities
    "NEE", "DUK", "SO", "AEP", "EXC", "XEL", "SRE", "PEG",
    // Real estate and specialty REITs
    "PLD", "AMT", "CCI", "SPG",
    // Automakers, restaurants, and retailers
    "GM", "F", "CMG", "TJX", "DPZ",
];

/// Seed list for crypto sessions.
pub const PRIMARY_CRYPTO_SYMBOLS: &[&str] = &[
    "BTC/USD", "ETH/USD", "LTC/USD", "BCH/USD", "SOL/USD", "ADA/USD", "DOGE/USD", "MATIC/USD",
    "DOT/USD", "AVAX/USD",
];

static COUNTRY_MAP: Lazy<HashMap<&'static str, u32>> =
    Lazy::new(|| HashMap::from([("US", 1), ("KR", 82)]));

static EXCHANGE_MAP: Lazy<HashMap<(u32, &'static str), u32>> = Lazy::new(|| {
    HashMap::from([
        // United States
        ((1, "XNYS"), 1),
        ((1, "XNAS"), 2),
        ((1, "ARCX"), 3),
        ((1, "XASE"), 4),
        ((1, "XCME"), 5),
        ((1, "XCBF"), 6),
        ((1, "XCEC"), 7),
        // South Korea
        ((82, "XKRX"), 1),
        ((82, "XKOS"), 2),
        ((82, "XKNX"), 3),
    ])
});

static ASSET_TYPE_MAP: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    HashMap::from([
        ("UNK", 0),
        ("ESXXXX", 1),
        ("EPXXXX", 2),
        ("EDXXXX", 3),
        ("EFXXXX", 4),
        ("ECXXXX", 5),
        ("EMXXXX", 6),
        ("FXXXXX", 11),
        ("Future/Interest Rate", 12),
        ("Future/Commodity", 13),
        ("Future/Currency", 14),
        ("Option/Equity", 15),
        ("Option/Index", 16),
        ("Crypto/Spot", 20),
        ("Crypto/Stablecoin", 21),
        ("Crypto/Derivatives", 22),
    ])
});

/// Local symbol ids keyed on `(country_id, exchange_id, asset_type_id)`.
static WORLD_ASSET_MAP: Lazy<HashMap<(u32, u32, u32), HashMap<&'static str, u32>>> =
    Lazy::new(|| {
        HashMap::from([
            // United States, NYSE, common stock
            (
                (1, 1, 1),
                HashMap::from([
                    ("AAPL", 1),
                    ("MSFT", 2),
                    ("AMZN", 3),
                    ("GOOGL", 4),
                    ("GOOG", 5),
                    ("META", 6),
                    ("TSLA", 7),
                    ("NVDA", 8),
                ]),
            ),
            // United States, NYSE, exchange-traded funds
            ((1, 1, 4), HashMap::from([("SPY", 1), ("IVV", 2), ("VOO", 3)])),
        ])
    });

/// Numeric country id; unknown codes map to 1.
pub fn country_id(country_code: &str) -> u32 {
    COUNTRY_MAP.get(country_code).copied().unwrap_or(1)
}

/// Numeric exchange id within a country; unknown codes map to 1.
pub fn exchange_id(country_id: u32, exchange_code: &str) -> u32 {
    EXCHANGE_MAP
        .get(&(country_id, exchange_code))
        .copied()
        .unwrap_or(1)
}

/// Numeric asset-type id; unknown codes map to 1.
pub fn asset_type_id(asset_type: &str) -> u32 {
    ASSET_TYPE_MAP.get(asset_type).copied().unwrap_or(1)
}

/// Local symbol id for a fully qualified asset, when registered.
pub fn symbol_id(
    country_code: &str,
    exchange_code: &str,
    asset_type: &str,
    symbol: &str,
) -> Option<u32> {
    let country = country_id(country_code);
    let key = (
        country,
        exchange_id(country, exchange_code),
        asset_type_id(asset_type),
    );
    WORLD_ASSET_MAP.get(&key).and_then(|m| m.get(symbol).copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_ids() {
        assert_eq!(country_id("US"), 1);
        assert_eq!(country_id("KR"), 82);
        assert_eq!(exchange_id(1, "XNAS"), 2);
        assert_eq!(asset_type_id("Crypto/Spot"), 20);
    }

    #[test]
    fn test_unknown_codes_fall_back() {
        assert_eq!(country_id("ZZ"), 1);
        assert_eq!(exchange_id(1, "XXXX"), 1);
        assert_eq!(asset_type_id("Bond/Junk"), 1);
    }

    #[test]
    fn test_symbol_lookup() {
        assert_eq!(symbol_id("US", "XNYS", "ESXXXX", "AAPL"), Some(1));
        assert_eq!(symbol_id("US", "XNYS", "EFXXXX", "SPY"), Some(1));
        assert_eq!(symbol_id("US", "XNYS", "ESXXXX", "ZZZZ"), None);
    }

    #[test]
    fn test_seed_lists_nonempty() {
        assert!(PRIMARY_STOCK_SYMBOLS.len() >= 90);
        assert_eq!(PRIMARY_CRYPTO_SYMBOLS.len(), 10);
    }
}
