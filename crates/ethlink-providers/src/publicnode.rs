//! [PublicNode](https://publicnode.com) endpoints. Free, keyless,
//! WebSocket, with a 200 ms request cooldown.

use std::time::Duration;

use ethlink_core::{Chain, Currency, Endpoint, EndpointSettings, TransportKind};

pub const REQUEST_COOLDOWN: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublicNode {
    Ethereum,
    Bsc,
    Polygon,
    Avalanche,
    Arbitrum,
    Base,
    Optimism,
}

impl PublicNode {
    pub const ALL: [PublicNode; 7] = [
        Self::Ethereum,
        Self::Bsc,
        Self::Polygon,
        Self::Avalanche,
        Self::Arbitrum,
        Self::Base,
        Self::Optimism,
    ];

    /// Host prefix in `{slug}-rpc.publicnode.com`.
    pub fn slug(self) -> &'static str {
        match self {
            Self::Ethereum => "ethereum",
            Self::Bsc => "bsc",
            Self::Polygon => "polygon-bor",
            Self::Avalanche => "avalanche-c-chain",
            Self::Arbitrum => "arbitrum-one",
            Self::Base => "base",
            Self::Optimism => "optimism",
        }
    }

    pub fn chain(self) -> Chain {
        match self {
            Self::Ethereum => Chain::mainnet("Ethereum", 1, Currency::ether()),
            Self::Bsc => Chain::mainnet("BNB Smart Chain", 56, Currency::new("BNB", "BNB", 18)),
            Self::Polygon => Chain::mainnet("Polygon", 137, Currency::new("Matic", "MATIC", 18)),
            Self::Avalanche => {
                Chain::mainnet("Avalanche C", 43114, Currency::new("AVAX", "AVAX", 18))
            }
            Self::Arbitrum => Chain::mainnet("Arbitrum One", 42161, Currency::ether()),
            Self::Base => Chain::mainnet("Base", 8453, Currency::ether()),
            Self::Optimism => Chain::mainnet("Optimism", 10, Currency::new("Optimism", "OP", 18)),
        }
    }

    pub fn by_chain_id(chain_id: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.chain().chain_id == chain_id)
    }

    pub fn url(self) -> String {
        format!("wss://{}-rpc.publicnode.com", self.slug())
    }

    pub fn endpoint(self) -> Endpoint {
        Endpoint::new(self.url())
            .with_transport(TransportKind::WebSocket)
            .with_chain(self.chain())
            .with_settings(EndpointSettings {
                request_cooldown: Some(REQUEST_COOLDOWN),
                ..Default::default()
            })
    }
}
