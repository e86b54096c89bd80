//! Supported assets and the vault contracts the scanner listens to.

use alloy_primitives::{address, Address};

/// Decimals assumed for tokens missing from the registry.
pub const DEFAULT_DECIMALS: u8 = 8;

/// Teller contract emitting `Deposit`.
pub const TELLER_ADDRESS: Address = address!("4e8f5128f473c6948127f9cbca474a6700f99bab");

/// Atomic queue contract emitting `AtomicRequestUpdated` / `AtomicRequestFulfilled`.
pub const ATOMIC_QUEUE_ADDRESS: Address = address!("3b4aCd8879fb60586cCd74bC2F831A4C5E7DbBf8");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Asset {
    pub symbol: &'static str,
    pub name: &'static str,
    pub address: Address,
    pub decimals: u8,
}

pub const LBTC: Asset = Asset {
    symbol: "LBTC",
    name: "Lombard Staked BTC",
    address: address!("8236a87084f8b84306f72007f36f2618a5634494"),
    decimals: 8,
};

pub const WBTC: Asset = Asset {
    symbol: "WBTC",
    name: "Wrapped BTC",
    address: address!("2260fac5e5542a773aa44fbcfedf7c193bc2c599"),
    decimals: 8,
};

pub const CBTC: Asset = Asset {
    symbol: "CBTC",
    name: "Coinbase Wrapped BTC",
    address: address!("cbB7C0000aB88B473b1f5aFd9ef808440eed33Bf"),
    decimals: 8,
};

/// The vault share token. Withdrawal requests offering anything else are not vault exits.
pub const LBTCV: Asset = Asset {
    symbol: "LBTCv",
    name: "Lombard BTC Vault",
    address: address!("5401b8620E5FB570064CA9114fd1e135fd77D57c"),
    decimals: 8,
};

pub static SUPPORTED: [Asset; 4] = [LBTC, WBTC, CBTC, LBTCV];

pub fn by_address(address: &Address) -> Option<&'static Asset> {
    SUPPORTED.iter().find(|asset| asset.address == *address)
}

/// Registry symbol, or the checksummed address for unknown tokens.
pub fn display_name(address: &Address) -> String {
    by_address(address)
        .map(|asset| asset.symbol.to_string())
        .unwrap_or_else(|| address.to_checksum(None))
}

pub fn decimals_of(address: &Address) -> u8 {
    by_address(address)
        .map(|asset| asset.decimals)
        .unwrap_or(DEFAULT_DECIMALS)
}
