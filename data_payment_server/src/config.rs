//! Server configuration
//!
//! Everything is read from the environment once, at startup (see `cli-help.txt` for the full list). Missing values
//! fall back to defaults, and every fallback is logged so that a misconfigured deployment is obvious from the logs.
use std::{env, fmt::Display, net::IpAddr, str::FromStr};

use chrono::Duration;
use dpg_common::{helpers::parse_boolean_flag, Secret};
use gateway_tools::{PayAppConfig, SignedJsonConfig, DEFAULT_HTTP_TIMEOUT};
use log::*;

const DEFAULT_DPG_HOST: &str = "127.0.0.1";
const DEFAULT_DPG_PORT: u16 = 8360;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/dpg_store.db";
const DEFAULT_EFFECT_RETRY_INTERVAL: Duration = Duration::seconds(60);
const DEFAULT_EFFECT_LEASE: Duration = Duration::seconds(300);

/// Which storage backend the server runs on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StoreKind {
    #[default]
    Sqlite,
    /// Everything is lost on restart. Useful for demos and tests.
    Memory,
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(format!("'{other}' is not a valid store. Use 'sqlite' or 'memory'")),
        }
    }
}

impl Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::Sqlite => write!(f, "sqlite"),
            StoreKind::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub store: StoreKind,
    pub database_url: String,
    /// The externally visible base URL of this server. Callback URLs handed to the providers are built from it.
    pub public_url: String,
    /// Token expected in the `X-Admin-Token` header on `/api/admin` routes. When `None`, the admin routes are closed.
    pub admin_token: Option<Secret<String>>,
    pub delivery_base_url: String,
    /// Key for delivery tokens. When `None`, a random key is generated at startup, and links do not survive a
    /// restart.
    pub delivery_secret: Option<Secret<String>>,
    pub effect_retry_interval: Duration,
    pub effect_lease: Duration,
    /// Outbound request timeout, in seconds.
    pub http_timeout: u64,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address.
    pub use_forwarded: bool,
    /// If supplied, requests against /callback endpoints will be checked against this list of IP addresses.
    /// To explicitly disable the whitelist, set this to "false", "none", or "0".
    pub callback_whitelist: Option<Vec<IpAddr>>,
    pub payapp: PayAppConfig,
    pub signed_json: SignedJsonConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let public_url = default_public_url(DEFAULT_DPG_HOST, DEFAULT_DPG_PORT);
        Self {
            host: DEFAULT_DPG_HOST.to_string(),
            port: DEFAULT_DPG_PORT,
            store: StoreKind::default(),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            delivery_base_url: public_url.clone(),
            public_url,
            admin_token: None,
            delivery_secret: None,
            effect_retry_interval: DEFAULT_EFFECT_RETRY_INTERVAL,
            effect_lease: DEFAULT_EFFECT_LEASE,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            use_x_forwarded_for: false,
            use_forwarded: false,
            callback_whitelist: None,
            payapp: PayAppConfig::default(),
            signed_json: SignedJsonConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("DPG_HOST").ok().unwrap_or_else(|| DEFAULT_DPG_HOST.into());
        let port = env::var("DPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for DPG_PORT. {e} Using the default, {DEFAULT_DPG_PORT}, instead."
                    );
                    DEFAULT_DPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_DPG_PORT);
        let store = env::var("DPG_STORE")
            .map(|s| {
                s.parse::<StoreKind>().unwrap_or_else(|e| {
                    error!("🪛️ {e}. Using the sqlite store.");
                    StoreKind::Sqlite
                })
            })
            .unwrap_or_default();
        let database_url = env::var("DPG_DATABASE_URL").ok().unwrap_or_else(|| {
            if store == StoreKind::Sqlite {
                warn!("🪛️ DPG_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}");
            }
            DEFAULT_DATABASE_URL.to_string()
        });
        let public_url = env::var("DPG_PUBLIC_URL").ok().map(|s| s.trim_end_matches('/').to_string()).unwrap_or_else(
            || {
                let url = default_public_url(&host, port);
                warn!(
                    "🪛️ DPG_PUBLIC_URL is not set. Payment providers will be told to call back on {url}, which is \
                     probably not reachable from the outside."
                );
                url
            },
        );
        let admin_token = non_empty_secret("DPG_ADMIN_TOKEN");
        if admin_token.is_none() {
            info!("🪛️ DPG_ADMIN_TOKEN is not set. The admin routes are disabled.");
        }
        let delivery_base_url = env::var("DPG_DELIVERY_BASE_URL").ok().unwrap_or_else(|| public_url.clone());
        let delivery_secret = non_empty_secret("DPG_DELIVERY_SECRET");
        if delivery_secret.is_none() {
            warn!(
                "🪛️ DPG_DELIVERY_SECRET is not set. A random key will be used, and download links will stop working \
                 when the server restarts."
            );
        }
        let effect_retry_interval = seconds_from_env("DPG_EFFECT_RETRY_INTERVAL", DEFAULT_EFFECT_RETRY_INTERVAL);
        let effect_lease = seconds_from_env("DPG_EFFECT_LEASE", DEFAULT_EFFECT_LEASE);
        let http_timeout = env::var("DPG_HTTP_TIMEOUT")
            .ok()
            .and_then(|s| {
                s.parse::<u64>()
                    .map_err(|e| warn!("🪛️ Invalid configuration value for DPG_HTTP_TIMEOUT. {e}"))
                    .ok()
                    .filter(|&t| t > 0)
            })
            .unwrap_or(DEFAULT_HTTP_TIMEOUT);
        let use_x_forwarded_for = parse_boolean_flag(env::var("DPG_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("DPG_USE_FORWARDED").ok(), false);
        let callback_whitelist = callback_whitelist_from_env();
        let payapp = PayAppConfig::new_from_env_or_default();
        let signed_json = SignedJsonConfig::new_from_env_or_default();
        Self {
            host,
            port,
            store,
            database_url,
            public_url,
            admin_token,
            delivery_base_url,
            delivery_secret,
            effect_retry_interval,
            effect_lease,
            http_timeout,
            use_x_forwarded_for,
            use_forwarded,
            callback_whitelist,
            payapp,
            signed_json,
        }
    }

    /// The URL a provider must post its callbacks to.
    pub fn callback_url(&self, provider_id: &str) -> String {
        format!("{}/callback/{provider_id}", self.public_url)
    }
}

/// The subset of the configuration that the request handlers need at runtime.
#[derive(Clone, Debug, Default)]
pub struct ServerOptions {
    pub public_url: String,
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            public_url: config.public_url.clone(),
            use_x_forwarded_for: config.use_x_forwarded_for,
            use_forwarded: config.use_forwarded,
        }
    }

    pub fn callback_url(&self, provider_id: &str) -> String {
        format!("{}/callback/{provider_id}", self.public_url)
    }
}

fn default_public_url(host: &str, port: u16) -> String {
    format!("http://{host}:{port}")
}

fn non_empty_secret(var: &str) -> Option<Secret<String>> {
    match env::var(var) {
        Ok(s) if !s.trim().is_empty() => Some(Secret::new(s)),
        _ => None,
    }
}

fn seconds_from_env(var: &str, default: Duration) -> Duration {
    env::var(var)
        .map_err(|_| info!("🪛️ {var} is not set. Using the default value of {}s.", default.num_seconds()))
        .and_then(|s| {
            s.parse::<i64>()
                .map_err(|e| warn!("🪛️ Invalid configuration value for {var}. {e}"))
                .and_then(|v| {
                    if v > 0 {
                        Ok(Duration::seconds(v))
                    } else {
                        warn!("🪛️ {var} must be positive. Using the default value of {}s.", default.num_seconds());
                        Err(())
                    }
                })
        })
        .ok()
        .unwrap_or(default)
}

fn callback_whitelist_from_env() -> Option<Vec<IpAddr>> {
    let whitelist = env::var("DPG_CALLBACK_IP_WHITELIST").ok().and_then(|s| parse_whitelist(&s));
    match &whitelist {
        Some(whitelist) if whitelist.is_empty() => {
            warn!(
                "🚨️ The callback IP whitelist was configured, but is empty.  The server will run, but won't accept \
                 any payment callbacks."
            );
        },
        None => {
            info!("🪛️ No callback IP whitelist is set. Only per-provider verification will be used.");
        },
        Some(v) => {
            let addrs = v.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
            info!("🪛️ Callback IP whitelist: {addrs}");
        },
    }
    whitelist
}

/// Parses a comma-separated list of IP addresses. "none", "false" and "0" explicitly disable the whitelist.
pub fn parse_whitelist(s: &str) -> Option<Vec<IpAddr>> {
    if ["none", "false", "0"].contains(&s.trim().to_lowercase().as_str()) {
        info!("🪛️ Callback IP whitelist is disabled.");
        return None;
    }
    let ip_addrs = s
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            s.parse()
                .map_err(|e| {
                    warn!("🪛️ Ignoring invalid IP address ({s}) in DPG_CALLBACK_IP_WHITELIST: {e}");
                })
                .ok()
        })
        .collect::<Vec<IpAddr>>();
    Some(ip_addrs)
}
