use serde::{Deserialize, Serialize};
use std::fmt;

/// Broker-assigned position ticket. Unique per open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ticket(pub u64);

impl From<u64> for Ticket {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Deterministic hash of the configuration in force when a decision was made.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigFingerprint(pub String);

impl ConfigFingerprint {
    /// BLAKE3 over the given canonical bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl fmt::Display for ConfigFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_deterministic() {
        let a = ConfigFingerprint::from_bytes(b"{\"tp1_rr\":1.4}");
        let b = ConfigFingerprint::from_bytes(b"{\"tp1_rr\":1.4}");
        assert_eq!(a, b);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn fingerprint_changes_with_input() {
        let a = ConfigFingerprint::from_bytes(b"a");
        let b = ConfigFingerprint::from_bytes(b"b");
        assert_ne!(a, b);
    }

    #[test]
    fn ticket_serializes_as_number() {
        let json = serde_json::to_string(&Ticket(42)).unwrap();
        assert_eq!(json, "42");
        assert_eq!(Ticket(42).to_string(), "#42");
    }
}
