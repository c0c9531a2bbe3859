//! Client IP extraction from HTTP headers with trust validation
//!
//! The client identity used for view deduplication and country lookup is
//! the address returned here:
//! - the socket peer address by default,
//! - `CF-Connecting-IP` behind Cloudflare,
//! - `Forwarded` / `X-Forwarded-For` behind a standard reverse proxy, read
//!   right to left past the configured trusted hops.

use axum::http::HeaderMap;
use ipnet::IpNet;
use std::net::IpAddr;
use tracing::warn;

use crate::config::{AnalyticsConfig, TrustedProxyMode};

/// Extract the client IP address from HTTP headers
///
/// # Arguments
/// * `headers` - HTTP request headers
/// * `socket_addr` - The socket remote address (fallback)
/// * `config` - Analytics configuration with trust settings
pub fn extract_client_ip(
    headers: &HeaderMap,
    socket_addr: IpAddr,
    config: &AnalyticsConfig,
) -> IpAddr {
    match config.trusted_proxy_mode {
        TrustedProxyMode::Cloudflare => extract_cloudflare_ip(headers).unwrap_or_else(|| {
            warn!("CF-Connecting-IP header missing in Cloudflare mode, using socket address");
            socket_addr
        }),
        TrustedProxyMode::Standard => extract_standard_ip(headers, config).unwrap_or(socket_addr),
        TrustedProxyMode::None => socket_addr,
    }
}

fn extract_cloudflare_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("cf-connecting-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

fn extract_standard_ip(headers: &HeaderMap, config: &AnalyticsConfig) -> Option<IpAddr> {
    // RFC 7239 first, then the de facto header
    let chain = forwarded_chain(headers).or_else(|| x_forwarded_for_chain(headers))?;
    pick_client(&chain, config)
}

/// `Forwarded: for=192.0.2.60;proto=http, for="[2001:db8::1]:4711"`
fn forwarded_chain(headers: &HeaderMap) -> Option<Vec<IpAddr>> {
    let forwarded = headers.get("forwarded")?.to_str().ok()?;

    let chain: Vec<IpAddr> = forwarded
        .split(',')
        .filter_map(|element| {
            element.split(';').find_map(|param| {
                let (name, value) = param.trim().split_once('=')?;
                if !name.eq_ignore_ascii_case("for") {
                    return None;
                }
                parse_node(value.trim_matches('"'))
            })
        })
        .collect();

    (!chain.is_empty()).then_some(chain)
}

/// Parse a `Forwarded` node: `1.2.3.4`, `1.2.3.4:80`, `[::1]` or `[::1]:80`
fn parse_node(node: &str) -> Option<IpAddr> {
    if let Some(rest) = node.strip_prefix('[') {
        return rest.split(']').next()?.parse().ok();
    }
    if let Ok(ip) = node.parse::<IpAddr>() {
        return Some(ip);
    }
    node.rsplit_once(':')
        .and_then(|(host, _port)| host.parse().ok())
}

fn x_forwarded_for_chain(headers: &HeaderMap) -> Option<Vec<IpAddr>> {
    let xff = headers.get("x-forwarded-for")?.to_str().ok()?;

    let chain: Vec<IpAddr> = xff
        .split(',')
        .filter_map(|s| s.trim().parse::<IpAddr>().ok())
        .collect();

    (!chain.is_empty()).then_some(chain)
}

/// Choose the client from a proxy chain ordered client-first.
fn pick_client(chain: &[IpAddr], config: &AnalyticsConfig) -> Option<IpAddr> {
    if let Some(num_trusted) = config.num_trusted_proxies {
        // Not enough hops: the leftmost entry is the best we have
        return chain
            .len()
            .checked_sub(num_trusted + 1)
            .and_then(|i| chain.get(i))
            .or_else(|| chain.first())
            .copied();
    }

    let trusted = trusted_networks(&config.trusted_proxies);
    if !trusted.is_empty() {
        return chain
            .iter()
            .rev()
            .find(|ip| !trusted.iter().any(|net| net.contains(*ip)))
            .or_else(|| chain.first())
            .copied();
    }

    chain.last().copied()
}

fn trusted_networks(entries: &[String]) -> Vec<IpNet> {
    entries
        .iter()
        .filter_map(|entry| {
            entry
                .parse::<IpNet>()
                .or_else(|_| entry.parse::<IpAddr>().map(IpNet::from))
                .map_err(|_| warn!(entry = %entry, "ignoring invalid trusted proxy entry"))
                .ok()
        })
        .collect()
}
