use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub site: SiteConfig,
    pub analytics: AnalyticsConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Directory holding the `.gmd` sources
    pub source_dir: PathBuf,
    /// Derived output directory; emptied on every compile and removed on shutdown
    pub build_dir: PathBuf,
    /// Directory served under `/assets/`
    pub assets_dir: PathBuf,
    pub favicon_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    /// Use the socket peer address only
    None,
    /// Trust `Forwarded` / `X-Forwarded-For`
    Standard,
    /// Trust `CF-Connecting-IP`
    Cloudflare,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    pub enabled: bool,
    /// Minimum time between two counted views of the same page by the same identity
    pub view_cooldown_secs: u64,
    /// Key deduplication on a SHA-256 digest of the client address instead of the raw address
    pub hash_identities: bool,
    pub prune_interval_secs: u64,
    pub trusted_proxy_mode: TrustedProxyMode,
    /// Proxy networks allowed to append to `X-Forwarded-For`
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
    #[serde(default)]
    pub num_trusted_proxies: Option<usize>,
    pub geoip: GeoIpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoIpConfig {
    pub endpoint: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Keys understood in `config.json`
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    port: Option<String>,
    #[serde(default)]
    analytics_user: Option<String>,
    #[serde(default)]
    analytics_pass: Option<String>,
}

impl AnalyticsConfig {
    pub fn view_cooldown(&self) -> Duration {
        Duration::from_secs(self.view_cooldown_secs)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs.max(1))
    }
}

impl GeoIpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            site: SiteConfig {
                source_dir: PathBuf::from("./web"),
                build_dir: PathBuf::from("./.built"),
                assets_dir: PathBuf::from("./assets"),
                favicon_path: PathBuf::from("./favicon.ico"),
            },
            analytics: AnalyticsConfig {
                enabled: true,
                view_cooldown_secs: 10,
                hash_identities: true,
                prune_interval_secs: 60,
                trusted_proxy_mode: TrustedProxyMode::None,
                trusted_proxies: Vec::new(),
                num_trusted_proxies: None,
                geoip: GeoIpConfig {
                    endpoint: "http://ip-api.com".to_string(),
                    timeout_ms: 3000,
                },
            },
            dashboard: DashboardConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional JSON file and the environment.
    ///
    /// A missing file is not an error; a file that exists but does not parse is.
    pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Config::default();

        let path = file.unwrap_or_else(|| Path::new("config.json"));
        match std::fs::read_to_string(path) {
            Ok(raw) => {
                let parsed: FileConfig = serde_json::from_str(&raw)
                    .with_context(|| format!("failed to parse {}", path.display()))?;
                config.apply_file(parsed)?;
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound && file.is_none() => {}
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()));
            }
        }

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) -> anyhow::Result<()> {
        if let Some(port) = file.port.filter(|p| !p.is_empty()) {
            self.server.port = port
                .parse::<u16>()
                .with_context(|| format!("invalid port '{port}' in config file"))?;
        }
        self.set_credentials(file.analytics_user, file.analytics_pass);
        Ok(())
    }

    /// Apply environment overrides using `lookup` as the variable source.
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port.parse::<u16>().context("PORT must be a valid port")?;
        }

        if let Some(dir) = lookup("SOURCE_DIR") {
            self.site.source_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("BUILD_DIR") {
            self.site.build_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("ASSETS_DIR") {
            self.site.assets_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("FAVICON_PATH") {
            self.site.favicon_path = PathBuf::from(path);
        }

        if let Some(v) = lookup("ANALYTICS_ENABLED") {
            self.analytics.enabled = parse_bool(&v);
        }
        if let Some(v) = lookup("ANALYTICS_VIEW_COOLDOWN_SECS") {
            self.analytics.view_cooldown_secs = v
                .parse::<u64>()
                .context("ANALYTICS_VIEW_COOLDOWN_SECS must be a whole number of seconds")?;
        }
        if let Some(v) = lookup("ANALYTICS_HASH_IDENTITIES") {
            self.analytics.hash_identities = parse_bool(&v);
        }
        if let Some(v) = lookup("ANALYTICS_PRUNE_INTERVAL_SECS") {
            self.analytics.prune_interval_secs = v
                .parse::<u64>()
                .context("ANALYTICS_PRUNE_INTERVAL_SECS must be a whole number of seconds")?;
        }

        if let Some(mode) = lookup("TRUSTED_PROXY_MODE") {
            self.analytics.trusted_proxy_mode = match mode.to_lowercase().as_str() {
                "none" => TrustedProxyMode::None,
                "standard" => TrustedProxyMode::Standard,
                "cloudflare" => TrustedProxyMode::Cloudflare,
                other => {
                    tracing::warn!(
                        "Unknown TRUSTED_PROXY_MODE '{other}', falling back to 'none'. Supported values: none, standard, cloudflare"
                    );
                    TrustedProxyMode::None
                }
            };
        }
        if let Some(list) = lookup("TRUSTED_PROXIES") {
            self.analytics.trusted_proxies = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(n) = lookup("NUM_TRUSTED_PROXIES") {
            self.analytics.num_trusted_proxies = Some(
                n.parse::<usize>()
                    .context("NUM_TRUSTED_PROXIES must be a non-negative integer")?,
            );
        }

        if let Some(endpoint) = lookup("GEOIP_ENDPOINT") {
            self.analytics.geoip.endpoint = endpoint.trim_end_matches('/').to_string();
        }
        if let Some(ms) = lookup("GEOIP_TIMEOUT_MS") {
            self.analytics.geoip.timeout_ms = ms
                .parse::<u64>()
                .context("GEOIP_TIMEOUT_MS must be a whole number of milliseconds")?;
        }

        let user = lookup("ANALYTICS_USER");
        let pass = lookup("ANALYTICS_PASS");
        if user.is_some() || pass.is_some() {
            self.set_credentials(user, pass);
        }

        Ok(())
    }

    fn set_credentials(&mut self, user: Option<String>, pass: Option<String>) {
        self.dashboard.credentials = match (user, pass) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Some(Credentials { username, password })
            }
            _ => None,
        };
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}
