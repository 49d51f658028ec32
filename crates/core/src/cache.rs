// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Content-addressed cache vocabulary. The on-disk reader/writer lives in
//! `anvil-storage`; this module defines the shapes that cross that
//! boundary so `anvil-core`/`anvil-engine` can reason about fingerprints
//! and manifests without depending on filesystem code.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A content-derived identifier for an installed package: the cache key
/// and the install-directory component. Deterministic over the extracted
/// content of a package — two installs of the same (name, version, url)
/// triple must produce equal fingerprints on any supported host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(
    #[serde(with = "hex_bytes")]
    [u8; 32],
);

impl Fingerprint {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The path component used for content addressing, e.g. the first
    /// two hex characters as a fan-out directory plus the full hex digest.
    pub fn path_component(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = String::with_capacity(64);
        for b in bytes {
            s.push_str(&format!("{b:02x}"));
        }
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        if s.len() != 64 {
            return Err(serde::de::Error::custom("fingerprint hex must be 64 characters"));
        }
        let mut out = [0u8; 32];
        for i in 0..32 {
            out[i] = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| serde::de::Error::custom("invalid fingerprint hex"))?;
        }
        Ok(out)
    }
}

/// The per-package JSON descriptor written atomically as the last step of
/// install. Its presence on disk is the sole "installed" signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheManifest {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
    pub url: String,
    pub fingerprint: Fingerprint,
    pub installed_at_ms: u64,
    #[serde(default)]
    pub metadata: std::collections::BTreeMap<String, String>,
}

impl CacheManifest {
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        version: impl Into<String>,
        url: impl Into<String>,
        fingerprint: Fingerprint,
        installed_at_ms: u64,
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            version: version.into(),
            url: url.into(),
            fingerprint,
            installed_at_ms,
            metadata: std::collections::BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_display_is_64_hex_chars() {
        let fp = Fingerprint::from_bytes([0xab; 32]);
        let s = fp.to_string();
        assert_eq!(s.len(), 64);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn same_bytes_produce_equal_fingerprints() {
        let a = Fingerprint::from_bytes([1; 32]);
        let b = Fingerprint::from_bytes([1; 32]);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn fingerprint_serde_round_trips_through_hex() {
        let fp = Fingerprint::from_bytes([0x0f; 32]);
        let json = serde_json::to_string(&fp).unwrap();
        assert!(json.contains("0f0f0f"));
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(fp, back);
    }

    #[test]
    fn manifest_round_trips_through_json() {
        let fp = Fingerprint::from_bytes([2; 32]);
        let manifest = CacheManifest::new("platform-esp32", "platform", "3.3.5", "https://x/y.zip", fp, 42);
        let json = serde_json::to_string(&manifest).unwrap();
        let back: CacheManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(manifest, back);
    }
}
