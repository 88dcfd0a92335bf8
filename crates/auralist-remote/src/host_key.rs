//! Host key verification policy

use tracing::{error, warn};

/// How the server's host key is checked during connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Accept only a key whose SHA-256 fingerprint matches exactly
    Pinned(String),
    /// Accept any key, logging a warning with its fingerprint on every connection
    Disabled,
}

impl HostKeyPolicy {
    /// Policy for an optional configured fingerprint
    pub fn from_fingerprint(fingerprint: Option<&str>) -> Self {
        match fingerprint.map(str::trim).filter(|f| !f.is_empty()) {
            Some(fingerprint) => Self::Pinned(normalize(fingerprint).to_string()),
            None => Self::Disabled,
        }
    }

    /// Decide whether a server offering `offered` may be trusted
    ///
    /// `offered` is the base64 SHA-256 fingerprint, with or without the `SHA256:` prefix.
    pub fn verify(&self, host: &str, offered: &str) -> bool {
        let offered = normalize(offered);
        match self {
            Self::Pinned(expected) if expected == offered => true,
            Self::Pinned(expected) => {
                error!(
                    host = %host,
                    expected = %expected,
                    offered = %offered,
                    "Host key fingerprint mismatch, refusing connection"
                );
                false
            }
            Self::Disabled => {
                warn!(
                    host = %host,
                    fingerprint = %format!("SHA256:{offered}"),
                    "Host key verification disabled; accepting unverified key. \
                     Set remote.host_fingerprint to pin it"
                );
                true
            }
        }
    }
}

fn normalize(fingerprint: &str) -> &str {
    fingerprint
        .trim()
        .trim_start_matches("SHA256:")
        .trim_end_matches('=')
}
