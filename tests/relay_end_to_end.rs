//! Relay and host runtime talking over real sockets.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use serde_json::{Value, json};

use rune_bridge::host::{HostConfig, HostRuntime, TransportPreference};
use rune_bridge::relay::{RelayConfig, RelayServer};
use rune_bridge::service::counter_service;

// ============================================================================
// Helpers
// ============================================================================

async fn relay() -> Result<RelayServer> {
    Ok(RelayServer::bind(RelayConfig::new().with_port(0)).await?)
}

fn host(relay: &RelayServer, transport: TransportPreference) -> Result<HostRuntime> {
    let config = HostConfig::new()
        .with_relay_origin(relay.origin())
        .with_transport(transport)
        .with_reconnect_delay(Duration::from_millis(50));
    Ok(HostRuntime::start(Arc::new(counter_service()), config)?)
}

async fn get(url: String) -> Result<(u16, Value)> {
    let response = reqwest::get(url).await?;
    let status = response.status().as_u16();
    Ok((status, response.json().await?))
}

async fn post(url: String, body: &str) -> Result<(u16, Value)> {
    let response = reqwest::Client::new()
        .post(url)
        .header("content-type", "application/json")
        .body(body.to_string())
        .send()
        .await?;
    let status = response.status().as_u16();
    Ok((status, response.json().await?))
}

/// Polls the relay until `host_id` is the active host.
async fn until_active(relay: &RelayServer, host_id: &str) -> Result<()> {
    let url = format!("{}/__rune_bridge_host", relay.origin());
    for _ in 0..250 {
        let (_, body) = get(url.clone()).await?;
        if body["host"]["connected"] == true && body["host"]["hostId"] == host_id {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    bail!("host {host_id} never became active")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_no_host_is_bridge_unavailable() -> Result<()> {
    let relay = relay().await?;

    let (status, body) = get(format!("{}/__rune_bridge", relay.origin())).await?;
    assert_eq!(status, 503);
    assert_eq!(body["error"]["code"], "bridge_unavailable");
    assert_eq!(body["error"]["details"]["code"], "host_unavailable");

    let (status, body) = get(format!("{}/__rune_bridge_host", relay.origin())).await?;
    assert_eq!(status, 200);
    assert_eq!(body["host"]["connected"], false);

    relay.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_snapshot_and_actions_over_socket() -> Result<()> {
    let relay = relay().await?;
    let host = host(&relay, TransportPreference::Socket)?;
    until_active(&relay, host.host_id()).await?;

    let api = format!("{}/__rune_bridge", relay.origin());

    let (status, body) = get(api.clone()).await?;
    assert_eq!(status, 200);
    assert_eq!(body["ok"], true);
    assert_eq!(body["snapshot"]["revision"], 0);
    assert_eq!(body["snapshot"]["states"]["count"]["value"], 0);
    assert!(body["snapshot"]["_actionRequestBody"].is_string());

    let (status, body) = post(format!("{api}/actions/reset"), "").await?;
    assert_eq!(status, 200);
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"]["code"], "action_rejected");

    let (_, body) = post(format!("{api}/actions/increment"), "").await?;
    assert_eq!(body["ok"], true);
    assert_eq!(body["snapshot"]["states"]["count"]["value"], 1);

    let (_, body) = get(format!("{api}/actions/add?post=3")).await?;
    assert_eq!(body["snapshot"]["states"]["count"]["value"], 4);

    let (_, body) = post(format!("{api}/actions/add"), "40").await?;
    assert_eq!(body["error"]["code"], "invalid_action_input");

    let (_, body) = post(format!("{api}/actions/teleport"), "").await?;
    assert_eq!(body["error"]["code"], "action_unavailable");

    host.stop().await;
    relay.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_wait_over_event_channel() -> Result<()> {
    let relay = relay().await?;
    let host = host(&relay, TransportPreference::EventChannel)?;
    until_active(&relay, host.host_id()).await?;

    let api = format!("{}/__rune_bridge", relay.origin());
    let (_, body) = get(api.clone()).await?;
    let since = body["snapshot"]["revision"].as_u64().unwrap_or_default();

    let (_, body) = post(format!("{api}/actions/wait"), r#"{"timeoutMs":50}"#).await?;
    assert_eq!(body["ok"], true);
    assert_eq!(body["timedOut"], true);

    let wait_url = format!("{api}/actions/wait");
    let wait_body = json!({ "since": since, "timeoutMs": 5000 }).to_string();
    let waiter = tokio::spawn(async move { post(wait_url, &wait_body).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    post(format!("{api}/actions/increment"), "").await?;

    let (status, body) = waiter.await??;
    assert_eq!(status, 200);
    assert_eq!(body["timedOut"], false);
    assert_eq!(body["snapshot"]["revision"], since + 1);

    let (_, body) = post(format!("{api}/actions/wait"), "\"soon\"").await?;
    assert_eq!(body["error"]["code"], "invalid_wait_input");

    host.stop().await;
    relay.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_newest_host_takes_over() -> Result<()> {
    let relay = relay().await?;

    let first = host(&relay, TransportPreference::EventChannel)?;
    until_active(&relay, first.host_id()).await?;

    let second = host(&relay, TransportPreference::Socket)?;
    until_active(&relay, second.host_id()).await?;
    let mut accepted = second.subscribe_status();
    tokio::time::timeout(Duration::from_secs(5), accepted.wait_for(|s| s.host_accepted))
        .await?
        .map_err(|e| anyhow::anyhow!("status channel closed: {e}"))?;

    let api = format!("{}/__rune_bridge", relay.origin());
    let (_, body) = post(format!("{api}/actions/increment"), "").await?;
    assert_eq!(body["snapshot"]["states"]["count"]["value"], 1);
    assert_eq!(first.revision(), 0);
    assert_eq!(second.revision(), 1);

    // The superseded host disconnecting must not clear the slot.
    first.stop().await;
    let (_, body) = get(format!("{}/__rune_bridge_host", relay.origin())).await?;
    assert_eq!(body["host"]["hostId"], second.host_id());

    second.stop().await;
    let url = format!("{}/__rune_bridge_host", relay.origin());
    let mut connected = true;
    for _ in 0..250 {
        let (_, body) = get(url.clone()).await?;
        connected = body["host"]["connected"] == true;
        if !connected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!connected);

    relay.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_host_notices_relay_shutdown() -> Result<()> {
    let relay = relay().await?;
    let host = host(&relay, TransportPreference::Socket)?;
    until_active(&relay, host.host_id()).await?;

    let mut status = host.subscribe_status();
    relay.shutdown().await;

    tokio::time::timeout(Duration::from_secs(5), status.wait_for(|s| !s.socket_connected))
        .await?
        .map_err(|e| anyhow::anyhow!("status channel closed: {e}"))?;

    host.stop().await;
    assert!(!host.status().host_accepted);
    Ok(())
}
