//! Chain descriptors. Informational only; nothing in the transport depends
//! on them.

use serde::{Deserialize, Serialize};

/// Native currency of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl Currency {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            decimals,
        }
    }

    /// Ether, 18 decimals.
    pub fn ether() -> Self {
        Self::new("Ether", "ETH", 18)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    pub name: String,
    pub chain_id: u64,
    #[serde(default)]
    pub testnet: bool,
    pub currency: Currency,
}

impl Chain {
    pub fn mainnet(name: impl Into<String>, chain_id: u64, currency: Currency) -> Self {
        Self {
            name: name.into(),
            chain_id,
            testnet: false,
            currency,
        }
    }

    pub fn testnet(name: impl Into<String>, chain_id: u64, currency: Currency) -> Self {
        Self {
            testnet: true,
            ..Self::mainnet(name, chain_id, currency)
        }
    }
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.chain_id)
    }
}
