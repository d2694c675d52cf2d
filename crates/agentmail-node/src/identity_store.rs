//! Persists the node's long-lived identity across restarts at
//! `{data_dir}/keys/identity.json`, created with `0600` permissions since
//! the file holds both secret keys in the clear.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use agentmail_crypto::{
    decode_key, encode_key, generate_identity, sign_sk_from_bytes, Identity, X25519PublicKey,
    X25519Secret,
};

#[derive(Debug, Serialize, Deserialize)]
struct IdentityFile {
    sign_sk: String,
    sign_pk: String,
    enc_sk: String,
    enc_pk: String,
}

impl From<&Identity> for IdentityFile {
    fn from(id: &Identity) -> Self {
        Self {
            sign_sk: encode_key(&id.sign_sk.to_bytes()),
            sign_pk: encode_key(id.sign_pk.as_bytes()),
            enc_sk: encode_key(&id.enc_sk.to_bytes()),
            enc_pk: encode_key(id.enc_pk.as_bytes()),
        }
    }
}

impl IdentityFile {
    fn into_identity(self) -> Result<Identity> {
        let sign_sk = sign_sk_from_bytes(decode_key(&self.sign_sk).context("decoding sign_sk")?);
        let sign_pk = sign_sk.verifying_key();
        let enc_sk = X25519Secret::from(decode_key(&self.enc_sk).context("decoding enc_sk")?);
        let enc_pk = X25519PublicKey::from(&enc_sk);
        Ok(Identity {
            sign_sk,
            sign_pk,
            enc_sk,
            enc_pk,
        })
    }
}

/// Load the identity at `{data_dir}/keys/identity.json`, generating and
/// persisting a fresh one on first run.
pub fn load_or_generate(data_dir: &Path) -> Result<Identity> {
    let keys_dir = data_dir.join("keys");
    let path = keys_dir.join("identity.json");

    if path.exists() {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading identity file {}", path.display()))?;
        let file: IdentityFile = serde_json::from_str(&raw).context("parsing identity file")?;
        return file.into_identity();
    }

    std::fs::create_dir_all(&keys_dir)
        .with_context(|| format!("creating keys directory {}", keys_dir.display()))?;
    let identity = generate_identity();
    let file = IdentityFile::from(&identity);
    let json = serde_json::to_string_pretty(&file).context("serializing new identity")?;
    std::fs::write(&path, json).with_context(|| format!("writing identity file {}", path.display()))?;
    set_owner_only(&path)?;

    tracing::info!(path = %path.display(), "generated new node identity");
    Ok(identity)
}

#[cfg(unix)]
fn set_owner_only(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(0o600);
    std::fs::set_permissions(path, perms)
        .with_context(|| format!("setting permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn set_owner_only(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_then_reloads_the_same_identity() {
        let dir = tempfile::tempdir().unwrap();
        let first = load_or_generate(dir.path()).unwrap();
        let second = load_or_generate(dir.path()).unwrap();
        assert_eq!(first.sign_pk.as_bytes(), second.sign_pk.as_bytes());
        assert_eq!(first.enc_pk.as_bytes(), second.enc_pk.as_bytes());
    }

    #[test]
    fn persists_under_a_keys_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        load_or_generate(dir.path()).unwrap();
        assert!(dir.path().join("keys").join("identity.json").exists());
    }
}
