use std::collections::HashMap;

use sha2::Digest;
use sha2::Sha256;

/// Trims and collapses inner whitespace so that re-rendered names hash identically.
pub fn canonical_speaker(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn identity_key(speaker: &str, discriminator: &str, timestamp: Option<&str>) -> String {
    format!(
        "{}:{}_{}",
        canonical_speaker(speaker),
        discriminator,
        timestamp.unwrap_or("")
    )
}

/// First 16 bytes of SHA-256, lowercase hex.
pub fn stable_hash(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    hex_encode(&digest[..16])
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut out, byte| {
            use std::fmt::Write;
            let _ = write!(out, "{byte:02x}");
            out
        })
}

/// Memoizing hasher. One instance per parser; nothing is shared between sessions.
#[derive(Debug, Default, Clone)]
pub struct Fingerprinter {
    memo: HashMap<String, String>,
}

impl Fingerprinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hash_key(&mut self, key: String) -> String {
        self.memo
            .entry(key)
            .or_insert_with_key(|key| stable_hash(key))
            .clone()
    }

    /// Voice entries pass their duration as `discriminator` so the identity survives a
    /// transcript arriving on a later capture.
    pub fn message(&mut self, speaker: &str, discriminator: &str, timestamp: Option<&str>) -> String {
        self.hash_key(identity_key(speaker, discriminator, timestamp))
    }

    pub fn session(&mut self, name: &str, subtitle: &str, time: &str) -> String {
        self.hash_key(format!("{}:{subtitle}_{time}", canonical_speaker(name)))
    }

    pub fn memo_len(&self) -> usize {
        self.memo.len()
    }
}
