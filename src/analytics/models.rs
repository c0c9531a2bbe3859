//! Data models for analytics

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Bucket used when no country could be determined
pub const UNKNOWN_COUNTRY: &str = "Unknown";

/// Coarse classification of a client's rendering engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EngineLabel {
    Blink,
    WebKit,
    Gecko,
    Trident,
    Other,
}

impl EngineLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineLabel::Blink => "Blink",
            EngineLabel::WebKit => "WebKit",
            EngineLabel::Gecko => "Gecko",
            EngineLabel::Trident => "Trident",
            EngineLabel::Other => "Other",
        }
    }
}

impl fmt::Display for EngineLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deduplication key for a (client identity, page) pair
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct ViewKey(String);

impl ViewKey {
    /// Key on the raw identity: `identity|path`
    pub fn new(identity: &str, path: &str) -> Self {
        Self(format!("{identity}|{path}"))
    }

    /// Key on a SHA-256 digest of the identity, so raw addresses are not retained
    pub fn hashed(identity: &str, path: &str) -> Self {
        let digest = Sha256::digest(identity.as_bytes());
        Self(format!("{digest:x}|{path}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Point-in-time copy of the view counters.
///
/// Maps are ordered so the dashboard renders labels in a stable order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub total_views: u64,
    pub page_views: BTreeMap<String, u64>,
    pub browser_engines: BTreeMap<String, u64>,
    pub countries: BTreeMap<String, u64>,
}

impl AnalyticsSnapshot {
    pub fn page_count(&self, path: &str) -> u64 {
        self.page_views.get(path).copied().unwrap_or(0)
    }

    pub fn engine_count(&self, engine: EngineLabel) -> u64 {
        self.browser_engines
            .get(engine.as_str())
            .copied()
            .unwrap_or(0)
    }

    pub fn country_count(&self, country: &str) -> u64 {
        self.countries.get(country).copied().unwrap_or(0)
    }
}
