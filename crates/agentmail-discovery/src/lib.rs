//! LAN peer discovery over mDNS. Advertises this node as
//! `_agentmail._tcp.local.` and browses the same service type, upserting
//! `PeerInfo` records into the mailbox whenever a peer resolves. A REMOVE
//! event is logged but leaves the stored record (and its last known
//! endpoint) in place; peers are only dropped by an explicit purge.
//!
//! Best-effort: the absence of a fresh resolve does not imply the peer is
//! unreachable — it may still be reachable via relay or a stale endpoint.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tracing::{debug, info, warn};

use agentmail_crypto::{encode_key, fingerprint, Identity};
use agentmail_mailbox::Mailbox;
use agentmail_protocol::{PeerInfo, PeerSource};

pub const SERVICE_TYPE: &str = "_agentmail._tcp.local.";
pub const PROTOCOL_VERSION_TXT: &str = "1";

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("mdns daemon error: {0}")]
    Daemon(#[from] mdns_sd::Error),
}

/// A running discovery session. Dropping it (or calling `shutdown`)
/// unregisters the advertised service and stops the background browser.
pub struct Discovery {
    daemon: ServiceDaemon,
    fullname: String,
}

impl Discovery {
    /// Begin advertising `name` on `port` and browsing for other
    /// `_agentmail._tcp.local.` instances, upserting discovered peers
    /// into `mailbox`. Idempotent: safe to call once per node lifetime.
    pub fn start(
        identity: &Identity,
        name: &str,
        port: u16,
        mailbox: Arc<Mailbox>,
    ) -> Result<Self, DiscoveryError> {
        let daemon = ServiceDaemon::new()?;

        let fp = fingerprint(&identity.sign_pk);
        let host_ip = local_ip_guess();
        let hostname = format!("{name}.local.");

        let mut properties = std::collections::HashMap::new();
        properties.insert("fp".to_string(), fp.clone());
        properties.insert("sign_pk".to_string(), encode_key(identity.sign_pk.as_bytes()));
        properties.insert("enc_pk".to_string(), encode_key(identity.enc_pk.as_bytes()));
        properties.insert("v".to_string(), PROTOCOL_VERSION_TXT.to_string());

        let service_info = ServiceInfo::new(
            SERVICE_TYPE,
            name,
            &hostname,
            host_ip.as_deref().unwrap_or(""),
            port,
            Some(properties),
        )
        .map_err(DiscoveryError::from)?;
        let fullname = service_info.get_fullname().to_string();

        daemon.register(service_info)?;
        info!(name, port, fp = %fp, "advertising on LAN");

        let receiver = daemon.browse(SERVICE_TYPE)?;
        let known: Arc<Mutex<HashMap<String, String>>> = Arc::new(Mutex::new(HashMap::new()));
        std::thread::spawn(move || {
            while let Ok(event) = receiver.recv() {
                handle_event(event, &mailbox, &known);
            }
        });

        Ok(Self { daemon, fullname })
    }

    pub fn shutdown(self) -> Result<(), DiscoveryError> {
        self.daemon.unregister(&self.fullname)?;
        self.daemon.shutdown()?;
        Ok(())
    }
}

fn handle_event(event: ServiceEvent, mailbox: &Arc<Mailbox>, known: &Arc<Mutex<HashMap<String, String>>>) {
    match event {
        ServiceEvent::ServiceResolved(info) => {
            let fullname = info.get_fullname().to_string();
            if let Some(peer) = peer_from_service_info(&info) {
                debug!(fp = %peer.fp, name = %peer.name, "peer resolved via mDNS");
                known.lock().expect("discovery map poisoned").insert(fullname, peer.fp.clone());
                if let Err(e) = mailbox.upsert_peer(peer) {
                    warn!(error = %e, "failed to upsert discovered peer");
                }
            }
        }
        ServiceEvent::ServiceRemoved(_ty, fullname) => {
            // The record (and its pinned keys) is retained; only the
            // endpoint goes stale, since the peer may still be reachable
            // via relay (spec.md §4.4).
            let fp = known.lock().expect("discovery map poisoned").remove(&fullname);
            match fp {
                Some(fp) => {
                    debug!(fullname, fp = %fp, "peer service removed from LAN, clearing endpoint");
                    if let Err(e) = mailbox.clear_peer_endpoint(&fp) {
                        warn!(error = %e, "failed to clear endpoint for removed peer");
                    }
                }
                None => debug!(fullname, "service removed for an unresolved instance"),
            }
        }
        _ => {}
    }
}

fn peer_from_service_info(info: &ServiceInfo) -> Option<PeerInfo> {
    let props = info.get_properties();
    let fp = props.get_property_val_str("fp")?.to_string();
    let sign_pk_b64 = props.get_property_val_str("sign_pk")?;
    let enc_pk_b64 = props.get_property_val_str("enc_pk")?;
    let sign_pk = agentmail_crypto::decode_key(sign_pk_b64).ok()?;
    let enc_pk = agentmail_crypto::decode_key(enc_pk_b64).ok()?;

    let name = info.get_hostname().trim_end_matches(".local.").to_string();
    let address = info.get_addresses().iter().next();
    let endpoint = address.map(|ip| format!("{}:{}", ip, info.get_port()));

    Some(PeerInfo {
        fp,
        name,
        sign_pk,
        enc_pk,
        endpoint,
        last_seen: now_ms(),
        source: PeerSource::Lan,
    })
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as u64
}

fn local_ip_guess() -> Option<String> {
    // mdns-sd accepts an empty host IP and resolves it from the local
    // interfaces itself; we pass through here for explicitness in tests.
    None
}
