//! IP → country resolution backed by an HTTP geolocation service
//!
//! Lookups are best effort: every failure is cached as "Unknown" so a bad
//! address costs at most one outbound request per process.

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use serde::Deserialize;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::analytics::models::UNKNOWN_COUNTRY;
use crate::config::GeoIpConfig;

#[derive(Debug, Error)]
pub enum GeoLookupError {
    #[error("geolocation request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("geolocation service returned no country code")]
    Empty,
}

/// A single country lookup against some geolocation backend
#[async_trait]
pub trait GeoLookup: Send + Sync {
    async fn lookup(&self, ip: IpAddr) -> Result<String, GeoLookupError>;
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    #[serde(rename = "countryCode", default)]
    country_code: String,
}

/// Lookup against an ip-api.com compatible endpoint:
/// `GET {endpoint}/json/{ip}?fields=countryCode`
#[derive(Clone)]
pub struct IpApiLookup {
    endpoint: String,
    client: Client,
}

impl IpApiLookup {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("gmdserve-geoip/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &GeoIpConfig) -> anyhow::Result<Self> {
        Self::new(config.endpoint.clone(), config.timeout())
    }
}

#[async_trait]
impl GeoLookup for IpApiLookup {
    async fn lookup(&self, ip: IpAddr) -> Result<String, GeoLookupError> {
        let url = format!("{}/json/{}?fields=countryCode", self.endpoint, ip);
        let body: IpApiResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let code = body.country_code.trim();
        if code.is_empty() {
            return Err(GeoLookupError::Empty);
        }
        Ok(code.to_string())
    }
}

/// Caching country resolver.
///
/// The cache is never evicted; it grows with the number of distinct
/// addresses seen by this process.
pub struct CountryResolver {
    lookup: Arc<dyn GeoLookup>,
    cache: DashMap<String, String>,
}

impl CountryResolver {
    pub fn new(lookup: Arc<dyn GeoLookup>) -> Self {
        Self {
            lookup,
            cache: DashMap::new(),
        }
    }

    /// Resolve `address` to a country code, or "Unknown".
    pub async fn resolve(&self, address: &str) -> String {
        if address.is_empty() {
            return UNKNOWN_COUNTRY.to_string();
        }

        if let Some(cached) = self.cached(address) {
            return cached;
        }

        let resolved = match address.parse::<IpAddr>() {
            Ok(ip) if is_routable(ip) => match self.lookup.lookup(ip).await {
                Ok(code) => code,
                Err(e) => {
                    debug!(address, error = %e, "country lookup failed");
                    UNKNOWN_COUNTRY.to_string()
                }
            },
            Ok(_) => UNKNOWN_COUNTRY.to_string(),
            Err(_) => {
                warn!(address, "client identity is not an IP address, skipping country lookup");
                UNKNOWN_COUNTRY.to_string()
            }
        };

        // Another request may have resolved the same address meanwhile; keep the first answer
        let entry = self
            .cache
            .entry(address.to_string())
            .or_insert(resolved);
        normalize(entry.value())
    }

    fn cached(&self, address: &str) -> Option<String> {
        self.cache.get(address).map(|entry| normalize(entry.value()))
    }

    /// Number of cached addresses
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

fn normalize(code: &str) -> String {
    if code.is_empty() {
        UNKNOWN_COUNTRY.to_string()
    } else {
        code.to_string()
    }
}

/// Addresses a public geolocation service can say anything useful about
fn is_routable(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast())
        }
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            let unique_local = (segments[0] & 0xfe00) == 0xfc00;
            let link_local = (segments[0] & 0xffc0) == 0xfe80;
            !(v6.is_loopback() || v6.is_unspecified() || unique_local || link_local)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeLookup {
        calls: AtomicUsize,
        answer: Option<&'static str>,
    }

    impl FakeLookup {
        fn new(answer: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                answer,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GeoLookup for FakeLookup {
        async fn lookup(&self, _ip: IpAddr) -> Result<String, GeoLookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.answer {
                Some(code) => Ok(code.to_string()),
                None => Err(GeoLookupError::Empty),
            }
        }
    }

    #[tokio::test]
    async fn test_empty_address_skips_lookup() {
        let fake = FakeLookup::new(Some("DE"));
        let resolver = CountryResolver::new(fake.clone());
        assert_eq!(resolver.resolve("").await, "Unknown");
        assert_eq!(fake.calls(), 0);
        assert!(resolver.is_empty());
    }

    #[tokio::test]
    async fn test_success_is_cached() {
        let fake = FakeLookup::new(Some("DE"));
        let resolver = CountryResolver::new(fake.clone());
        assert_eq!(resolver.resolve("8.8.8.8").await, "DE");
        assert_eq!(resolver.resolve("8.8.8.8").await, "DE");
        assert_eq!(fake.calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_cached_as_unknown() {
        let fake = FakeLookup::new(None);
        let resolver = CountryResolver::new(fake.clone());
        assert_eq!(resolver.resolve("8.8.4.4").await, "Unknown");
        assert_eq!(resolver.resolve("8.8.4.4").await, "Unknown");
        assert_eq!(fake.calls(), 1);
    }

    #[tokio::test]
    async fn test_private_and_invalid_addresses_skip_lookup() {
        let fake = FakeLookup::new(Some("DE"));
        let resolver = CountryResolver::new(fake.clone());
        for addr in ["127.0.0.1", "10.1.2.3", "192.168.0.10", "::1", "fd00::1", "not-an-ip"] {
            assert_eq!(resolver.resolve(addr).await, "Unknown", "{addr}");
        }
        assert_eq!(fake.calls(), 0);
        assert_eq!(resolver.len(), 6);
    }

    #[tokio::test]
    async fn test_empty_cached_value_reads_as_unknown() {
        let fake = FakeLookup::new(Some("DE"));
        let resolver = CountryResolver::new(fake.clone());
        resolver.cache.insert("1.1.1.1".to_string(), String::new());
        assert_eq!(resolver.resolve("1.1.1.1").await, "Unknown");
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn test_ip_api_lookup_unreachable_endpoint_fails() {
        // Port 9 (discard) on loopback is not expected to speak HTTP
        let lookup = IpApiLookup::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        let result = lookup.lookup("8.8.8.8".parse().unwrap()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_is_routable() {
        assert!(is_routable("8.8.8.8".parse().unwrap()));
        assert!(is_routable("2001:4860:4860::8888".parse().unwrap()));
        assert!(!is_routable("172.16.0.1".parse().unwrap()));
        assert!(!is_routable("fe80::1".parse().unwrap()));
    }
}
