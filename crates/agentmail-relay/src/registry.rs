//! The relay's name registry (spec.md §4.7): `register`/`lookup` over an
//! in-memory map keyed by both name and fingerprint. No persistence — a
//! restarted relay starts empty and nodes re-register on their next tick.

use std::collections::HashMap;
use std::sync::RwLock;

use agentmail_protocol::{LookupResponse, PeerInfo, PeerSource, RegisterRequest};

pub struct Registry {
    by_name: RwLock<HashMap<String, PeerInfo>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self { by_name: RwLock::new(HashMap::new()) }
    }

    /// Record `req` under its name, last-writer-wins. Warns on overwrite
    /// of an existing registration under the same name with a different
    /// fingerprint — a relay never rejects this, only logs it (spec.md §9
    /// open question, decided: implementers *may* tighten, not must).
    pub fn register(&self, req: RegisterRequest) -> Result<(), agentmail_crypto::CryptoError> {
        let sign_pk = agentmail_crypto::decode_key(&req.sign_pk)?;
        let enc_pk = agentmail_crypto::decode_key(&req.enc_pk)?;

        let peer = PeerInfo {
            fp: req.fp.clone(),
            name: req.name.clone(),
            sign_pk,
            enc_pk,
            endpoint: None,
            last_seen: 0,
            source: PeerSource::Relay,
        };

        let mut by_name = self.by_name.write().expect("registry lock poisoned");
        if let Some(existing) = by_name.get(&req.name) {
            if existing.fp != req.fp {
                tracing::warn!(
                    name = %req.name,
                    old_fp = %existing.fp,
                    new_fp = %req.fp,
                    "registration overwrites a different fingerprint for this name"
                );
            }
        }
        by_name.insert(req.name, peer);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<LookupResponse> {
        let by_name = self.by_name.read().expect("registry lock poisoned");
        by_name.get(name).map(LookupResponse::from_peer)
    }

    /// Find a registration by fingerprint, used to accept a deposit only
    /// for a recipient the relay actually knows about.
    pub fn lookup_by_fp(&self, fp: &str) -> Option<PeerInfo> {
        let by_name = self.by_name.read().expect("registry lock poisoned");
        by_name.values().find(|p| p.fp == fp).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmail_crypto::{encode_key, generate_identity};

    fn request_for(name: &str) -> RegisterRequest {
        let id = generate_identity();
        RegisterRequest::from_identity(&id, name)
    }

    #[test]
    fn register_then_lookup_round_trips() {
        let registry = Registry::new();
        let req = request_for("alice");
        let fp = req.fp.clone();
        registry.register(req).unwrap();

        let looked_up = registry.lookup("alice").unwrap();
        assert_eq!(looked_up.fp, fp);
    }

    #[test]
    fn lookup_of_an_unregistered_name_is_none() {
        let registry = Registry::new();
        assert!(registry.lookup("nobody").is_none());
    }

    #[test]
    fn re_registering_the_same_name_overwrites_last_writer_wins() {
        let registry = Registry::new();
        registry.register(request_for("alice")).unwrap();
        let second = request_for("alice");
        let second_fp = second.fp.clone();
        registry.register(second).unwrap();

        assert_eq!(registry.lookup("alice").unwrap().fp, second_fp);
    }

    #[test]
    fn lookup_by_fp_finds_a_registered_peer() {
        let registry = Registry::new();
        let req = request_for("bob");
        let fp = req.fp.clone();
        registry.register(req).unwrap();

        assert_eq!(registry.lookup_by_fp(&fp).unwrap().name, "bob");
    }

    #[test]
    fn rejects_a_malformed_key() {
        let registry = Registry::new();
        let mut req = request_for("eve");
        req.sign_pk = "not valid base64!!".to_string();
        assert!(registry.register(req).is_err());
    }

    #[test]
    fn encode_key_round_trips_into_decode_key() {
        let id = generate_identity();
        let encoded = encode_key(id.sign_pk.as_bytes());
        assert_eq!(agentmail_crypto::decode_key(&encoded).unwrap(), *id.sign_pk.as_bytes());
    }
}
