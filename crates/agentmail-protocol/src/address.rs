use std::fmt;
use std::str::FromStr;

use crate::error::AgentmailError;

/// A parsed `name@host` address. `host` is either an mDNS hostname
/// (`bob.local`) or a synthetic fingerprint-based pseudo-host used when
/// only the relay knows the peer — the router never operates on the raw
/// string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub name: String,
    pub host: String,
}

impl Address {
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.host)
    }
}

impl FromStr for Address {
    type Err = AgentmailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, host) = s
            .split_once('@')
            .ok_or_else(|| AgentmailError::InvalidAddress(s.to_string()))?;
        if name.is_empty() || host.is_empty() {
            return Err(AgentmailError::InvalidAddress(s.to_string()));
        }
        Ok(Address {
            name: name.to_string(),
            host: host.to_string(),
        })
    }
}
