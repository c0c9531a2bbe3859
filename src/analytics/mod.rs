//! Page view analytics
//!
//! Counts are kept in memory for the lifetime of the process. Each counted
//! view is enriched with the client's browser engine (from `User-Agent`) and
//! country (from an HTTP geolocation service, cached per address).

pub mod aggregator;
pub mod engine;
pub mod geoip;
pub mod ip_extractor;
pub mod models;

// Re-export commonly used types
pub use aggregator::{AnalyticsAggregator, DEFAULT_VIEW_COOLDOWN};
pub use engine::classify;
pub use geoip::{CountryResolver, GeoLookup, GeoLookupError, IpApiLookup};
pub use ip_extractor::extract_client_ip;
pub use models::{AnalyticsSnapshot, EngineLabel, ViewKey, UNKNOWN_COUNTRY};
