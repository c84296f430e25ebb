//! Infura endpoints, keyed by project id.

use ethlink_core::endpoint::API_KEY_TOKEN;
use ethlink_core::{Endpoint, UrlApiKey};

pub fn network(chain_id: u64) -> Option<&'static str> {
    Some(match chain_id {
        1 => "mainnet",
        11155111 => "sepolia",
        17000 => "holesky",
        137 => "polygon-mainnet",
        80002 => "polygon-amoy",
        42161 => "arbitrum-mainnet",
        10 => "optimism-mainnet",
        8453 => "base-mainnet",
        43114 => "avalanche-mainnet",
        _ => return None,
    })
}

pub fn http_url(chain_id: u64) -> Option<String> {
    network(chain_id).map(|n| format!("https://{n}.infura.io/v3/{API_KEY_TOKEN}"))
}

pub fn ws_url(chain_id: u64) -> Option<String> {
    network(chain_id).map(|n| format!("wss://{n}.infura.io/ws/v3/{API_KEY_TOKEN}"))
}

pub fn http(project_id: &str, chain_id: u64) -> Option<Endpoint> {
    http_url(chain_id).map(|url| Endpoint::new(url).with_authorization(UrlApiKey::new(project_id)))
}

pub fn ws(project_id: &str, chain_id: u64) -> Option<Endpoint> {
    ws_url(chain_id).map(|url| Endpoint::new(url).with_authorization(UrlApiKey::new(project_id)))
}
