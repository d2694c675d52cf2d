//! HTTP clients for the two tiers of delivery (direct peer, relay) and the
//! relay's registry operations. Pure wire plumbing — no retry/backoff logic
//! here, that lives in the outbox drain loop.

use std::time::Duration;

use agentmail_protocol::{
    AgentmailError, LookupResponse, MessageEnvelope, PickupResponse, RegisterRequest,
    RelayError, StatsResponse, TransportError,
};

fn map_transport_err(e: reqwest::Error) -> AgentmailError {
    if e.is_timeout() {
        TransportError::Timeout.into()
    } else if e.is_connect() {
        TransportError::Refused.into()
    } else if let Some(status) = e.status() {
        TransportError::Http5xx { status: status.as_u16() }.into()
    } else {
        TransportError::Other { reason: e.to_string() }.into()
    }
}

fn map_relay_err(e: reqwest::Error) -> AgentmailError {
    if let Some(status) = e.status() {
        if status.is_server_error() {
            RelayError::Http5xx { status: status.as_u16() }.into()
        } else {
            RelayError::Http4xx { status: status.as_u16() }.into()
        }
    } else {
        RelayError::Other { reason: e.to_string() }.into()
    }
}

/// `POST http://{endpoint}/v0/receive`. `body` is already-canonical JSON
/// bytes of a `MessageEnvelope`.
pub async fn deliver_direct(
    http: &reqwest::Client,
    endpoint: &str,
    body: &[u8],
    timeout: Duration,
) -> Result<(), AgentmailError> {
    let url = format!("http://{endpoint}/v0/receive");
    let resp = http
        .post(&url)
        .header("content-type", "application/json")
        .body(body.to_vec())
        .timeout(timeout)
        .send()
        .await
        .map_err(map_transport_err)?;

    if resp.status().is_success() {
        return Ok(());
    }
    let status = resp.status().as_u16();
    Err(if resp.status().is_server_error() {
        TransportError::Http5xx { status }.into()
    } else {
        TransportError::Other {
            reason: format!("peer rejected envelope with status {status}"),
        }
        .into()
    })
}

/// `POST {relay_base}/v0/deposit`.
pub async fn deposit(
    http: &reqwest::Client,
    relay_base: &str,
    body: &[u8],
    timeout: Duration,
) -> Result<(), AgentmailError> {
    let url = format!("{}/v0/deposit", relay_base.trim_end_matches('/'));
    let resp = http
        .post(&url)
        .header("content-type", "application/json")
        .body(body.to_vec())
        .timeout(timeout)
        .send()
        .await
        .map_err(map_relay_err)?;

    if resp.status().is_success() {
        return Ok(());
    }
    let status = resp.status().as_u16();
    Err(if resp.status().is_server_error() {
        RelayError::Http5xx { status }.into()
    } else {
        RelayError::Http4xx { status }.into()
    })
}

/// `GET {relay_base}/v0/lookup/{name}`. `None` on a 404.
pub async fn lookup(
    http: &reqwest::Client,
    relay_base: &str,
    name: &str,
    timeout: Duration,
) -> Result<Option<LookupResponse>, AgentmailError> {
    let url = format!("{}/v0/lookup/{}", relay_base.trim_end_matches('/'), name);
    let resp = http.get(&url).timeout(timeout).send().await.map_err(map_relay_err)?;

    if resp.status().as_u16() == 404 {
        return Ok(None);
    }
    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        return Err(if resp.status().is_server_error() {
            RelayError::Http5xx { status }.into()
        } else {
            RelayError::Http4xx { status }.into()
        });
    }
    resp.json::<LookupResponse>()
        .await
        .map(Some)
        .map_err(|e| RelayError::Other { reason: e.to_string() }.into())
}

/// `GET {relay_base}/v0/lookup_fp/{fp}`. `None` on a 404. Used by an inbound
/// handler to resolve an envelope's `sender_fp` when it isn't already a
/// known peer — the mirror of `lookup`, keyed by fingerprint instead of name.
pub async fn lookup_fp(
    http: &reqwest::Client,
    relay_base: &str,
    fp: &str,
    timeout: Duration,
) -> Result<Option<LookupResponse>, AgentmailError> {
    let url = format!("{}/v0/lookup_fp/{}", relay_base.trim_end_matches('/'), fp);
    let resp = http.get(&url).timeout(timeout).send().await.map_err(map_relay_err)?;

    if resp.status().as_u16() == 404 {
        return Ok(None);
    }
    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        return Err(if resp.status().is_server_error() {
            RelayError::Http5xx { status }.into()
        } else {
            RelayError::Http4xx { status }.into()
        });
    }
    resp.json::<LookupResponse>()
        .await
        .map(Some)
        .map_err(|e| RelayError::Other { reason: e.to_string() }.into())
}

/// `POST {relay_base}/v0/register`.
pub async fn register(
    http: &reqwest::Client,
    relay_base: &str,
    req: &RegisterRequest,
    timeout: Duration,
) -> Result<(), AgentmailError> {
    let url = format!("{}/v0/register", relay_base.trim_end_matches('/'));
    let resp = http
        .post(&url)
        .json(req)
        .timeout(timeout)
        .send()
        .await
        .map_err(map_relay_err)?;

    if resp.status().is_success() {
        return Ok(());
    }
    let status = resp.status().as_u16();
    Err(if resp.status().is_server_error() {
        RelayError::Http5xx { status }.into()
    } else {
        RelayError::Http4xx { status }.into()
    })
}

/// `GET {relay_base}/v0/pickup/{fp}`.
pub async fn pickup(
    http: &reqwest::Client,
    relay_base: &str,
    fp: &str,
    timeout: Duration,
) -> Result<Vec<MessageEnvelope>, AgentmailError> {
    let url = format!("{}/v0/pickup/{}", relay_base.trim_end_matches('/'), fp);
    let resp = http.get(&url).timeout(timeout).send().await.map_err(map_relay_err)?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        return Err(if resp.status().is_server_error() {
            RelayError::Http5xx { status }.into()
        } else {
            RelayError::Http4xx { status }.into()
        });
    }
    let parsed: PickupResponse = resp
        .json()
        .await
        .map_err(|e| RelayError::Other { reason: e.to_string() })
        .map_err(AgentmailError::from)?;
    Ok(parsed.envelopes)
}

/// `GET {relay_base}/v0/stats`.
pub async fn stats(
    http: &reqwest::Client,
    relay_base: &str,
    timeout: Duration,
) -> Result<StatsResponse, AgentmailError> {
    let url = format!("{}/v0/stats", relay_base.trim_end_matches('/'));
    let resp = http.get(&url).timeout(timeout).send().await.map_err(map_relay_err)?;
    resp.json()
        .await
        .map_err(|e| RelayError::Other { reason: e.to_string() }.into())
}
