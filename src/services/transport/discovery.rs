use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::config::EndpointConfig;

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Deserialize)]
struct ConnectResponse {
    ws_url: String,
}

pub fn discovery_client() -> Client {
    Client::builder()
        .timeout(DISCOVERY_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Asks the agent server where to open the session: `POST {base}/connect`
/// answers `{"ws_url": "ws://host:port/ws"}`.
pub async fn discover_endpoint(client: &Client, base: &str) -> Result<EndpointConfig> {
    let url = format!("{}/connect", base.trim_end_matches('/'));

    let response = client
        .post(&url)
        .send()
        .await
        .with_context(|| format!("POST {url}"))?;

    if !response.status().is_success() {
        return Err(anyhow!("endpoint discovery failed: {}", response.status()));
    }

    let body: ConnectResponse = response
        .json()
        .await
        .context("decoding /connect response")?;

    EndpointConfig::parse(&body.ws_url)
        .with_context(|| format!("server advertised an unusable endpoint: {}", body.ws_url))
}
