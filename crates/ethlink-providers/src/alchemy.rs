//! Alchemy endpoints.
//!
//! URLs are templates with an `{API_KEY}` placeholder; the key is substituted
//! when the endpoint joins a pool, and never appears in logs.
//! <https://docs.alchemy.com/reference/api-overview>

use ethlink_core::endpoint::API_KEY_TOKEN;
use ethlink_core::{Endpoint, UrlApiKey};

/// Alchemy's network slug for `chain_id`.
pub fn network(chain_id: u64) -> Option<&'static str> {
    Some(match chain_id {
        1 => "eth-mainnet",
        11155111 => "eth-sepolia",
        17000 => "eth-holesky",
        137 => "polygon-mainnet",
        80002 => "polygon-amoy",
        42161 => "arb-mainnet",
        421614 => "arb-sepolia",
        10 => "opt-mainnet",
        11155420 => "opt-sepolia",
        8453 => "base-mainnet",
        84532 => "base-sepolia",
        _ => return None,
    })
}

pub fn http_url(chain_id: u64) -> Option<String> {
    network(chain_id).map(|n| format!("https://{n}.g.alchemy.com/v2/{API_KEY_TOKEN}"))
}

pub fn ws_url(chain_id: u64) -> Option<String> {
    network(chain_id).map(|n| format!("wss://{n}.g.alchemy.com/v2/{API_KEY_TOKEN}"))
}

/// HTTP endpoint for `chain_id`, authorized with `api_key`.
pub fn http(api_key: &str, chain_id: u64) -> Option<Endpoint> {
    http_url(chain_id).map(|url| Endpoint::new(url).with_authorization(UrlApiKey::new(api_key)))
}

/// WebSocket endpoint for `chain_id`; supports `eth_subscribe`.
pub fn ws(api_key: &str, chain_id: u64) -> Option<Endpoint> {
    ws_url(chain_id).map(|url| Endpoint::new(url).with_authorization(UrlApiKey::new(api_key)))
}
