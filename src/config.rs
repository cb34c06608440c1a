//! Configuration management for cdn-tunnel.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values
//!
//! Validation happens in [`Config::resolve`], which either produces a
//! fully-checked runtime configuration or fails fast before the listener
//! binds.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::ServerConfig;
use crate::backend::BackendTarget;
use crate::cli::Args;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener configuration.
    pub server: ServerSection,
    /// Tunnel backend configuration.
    pub tunnel: TunnelSection,
    /// Timing knobs.
    pub timeouts: TimeoutsSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Listener configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Origin address, `scheme://host:port`.
    pub origin: String,
    /// Certificate file (required for an https origin).
    pub cert: Option<PathBuf>,
    /// Private key file (required for an https origin).
    pub key: Option<PathBuf>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            origin: "http://0.0.0.0:8080".to_string(),
            cert: None,
            key: None,
        }
    }
}

/// Tunnel backend configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelSection {
    /// Proxy-mode destination, `host:port`.
    pub dest: Option<String>,
    /// Application-mode command line. Mutually exclusive with `dest`.
    pub app: Option<String>,
    /// Serve requests that did not come through the CDN.
    pub allow_direct: bool,
}

/// Timing knobs. The defaults are the protocol's documented tuning
/// parameters; most deployments never change them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsSection {
    /// Per-read backend deadline during a drain, in milliseconds.
    pub read_deadline_ms: u64,
    /// Idle time after which a session is evicted, in seconds.
    pub idle_timeout_secs: u64,
    /// How often the reaper sweeps the table, in seconds.
    pub reap_interval_secs: u64,
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            read_deadline_ms: 50,
            idle_timeout_secs: 300,
            reap_interval_secs: 60,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Validated runtime knobs handed to the request handler and reaper.
#[derive(Debug, Clone)]
pub struct TunnelOptions {
    pub allow_direct: bool,
    pub read_deadline: Duration,
    pub idle_timeout: Duration,
    pub reap_interval: Duration,
}

/// The fully-validated startup configuration.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub server: ServerConfig,
    pub target: BackendTarget,
    pub options: TunnelOptions,
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Ok(origin) = std::env::var("CDN_TUNNEL_ORIGIN") {
            self.server.origin = origin;
        }

        if let Ok(dest) = std::env::var("CDN_TUNNEL_DEST") {
            if !dest.is_empty() {
                self.tunnel.dest = Some(dest);
            }
        }

        if let Ok(app) = std::env::var("CDN_TUNNEL_APP") {
            if !app.is_empty() {
                self.tunnel.app = Some(app);
            }
        }

        if let Ok(level) = std::env::var("CDN_TUNNEL_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(ref origin) = args.origin {
            self.server.origin = origin.clone();
        }
        if let Some(ref dest) = args.dest {
            self.tunnel.dest = Some(dest.clone());
        }
        if let Some(ref app) = args.app {
            self.tunnel.app = Some(app.clone());
        }
        if let Some(ref cert) = args.cert {
            self.server.cert = Some(cert.clone());
        }
        if let Some(ref key) = args.key {
            self.server.key = Some(key.clone());
        }
        if args.allow_direct {
            self.tunnel.allow_direct = true;
        }
        if args.debug {
            self.logging.level = "debug".to_string();
        }
        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(ref path) = args.config {
            config = Config::from_file(path)?;
        }

        config.apply_env();
        config.apply_args(args);

        Ok(config)
    }

    /// Validate the configuration and produce the runtime form.
    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        let (scheme, host, port) = parse_origin(&self.server.origin)?;

        if !is_local_ip(host) {
            return Err(ConfigError::NonLocalOrigin(host.to_string()));
        }

        let mut server = ServerConfig::new(host, port);
        if scheme == OriginScheme::Https {
            match (&self.server.cert, &self.server.key) {
                (Some(cert), Some(key)) => {
                    server = server.with_tls(cert.clone(), key.clone());
                }
                _ => return Err(ConfigError::MissingTlsMaterial),
            }
        }

        let target = match (&self.tunnel.dest, &self.tunnel.app) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingModes),
            (None, None) => return Err(ConfigError::MissingBackend),
            (Some(dest), None) => {
                let (host, port) = parse_dest(dest)?;
                BackendTarget::Proxy { host, port }
            }
            (None, Some(app)) => {
                if app.split_whitespace().next().is_none() {
                    return Err(ConfigError::EmptyAppCommand);
                }
                BackendTarget::App {
                    command: app.clone(),
                }
            }
        };

        let options = TunnelOptions {
            allow_direct: self.tunnel.allow_direct,
            read_deadline: Duration::from_millis(self.timeouts.read_deadline_ms),
            idle_timeout: Duration::from_secs(self.timeouts.idle_timeout_secs),
            reap_interval: Duration::from_secs(self.timeouts.reap_interval_secs),
        };

        Ok(ResolvedConfig {
            server,
            target,
            options,
        })
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Origin scheme; anything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OriginScheme {
    Http,
    Https,
}

fn parse_origin(origin: &str) -> Result<(OriginScheme, IpAddr, u16), ConfigError> {
    let invalid = || ConfigError::InvalidOrigin(origin.to_string());

    let (scheme, rest) = origin.split_once("://").ok_or_else(invalid)?;
    let scheme = match scheme {
        "http" => OriginScheme::Http,
        "https" => OriginScheme::Https,
        _ => return Err(invalid()),
    };

    let (host, port) = rest.rsplit_once(':').ok_or_else(invalid)?;
    let port: u16 = port.parse().map_err(|_| invalid())?;
    let host = strip_brackets(host);
    let ip: IpAddr = host.parse().map_err(|_| invalid())?;

    Ok((scheme, ip, port))
}

fn parse_dest(dest: &str) -> Result<(String, u16), ConfigError> {
    let invalid = || ConfigError::InvalidDestination(dest.to_string());

    let (host, port) = dest.rsplit_once(':').ok_or_else(invalid)?;
    let port: u16 = port.parse().map_err(|_| invalid())?;
    let host = strip_brackets(host);
    if host.is_empty() {
        return Err(invalid());
    }

    Ok((host.to_string(), port))
}

fn strip_brackets(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

/// The origin must not be a publicly-routable address: this server is
/// meant to sit behind the CDN, reachable only from it.
fn is_local_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_unspecified(),
        IpAddr::V6(v6) => {
            // RFC 4193 unique-local, fc00::/7 (Ipv6Addr::is_unique_local
            // is not yet stable).
            let unique_local = v6.segments()[0] & 0xfe00 == 0xfc00;
            v6.is_loopback() || v6.is_unspecified() || unique_local
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Origin did not parse as `http(s)://ip:port`.
    InvalidOrigin(String),
    /// Origin host is not a loopback, private, or unspecified address.
    NonLocalOrigin(String),
    /// Destination did not parse as `host:port`.
    InvalidDestination(String),
    /// An https origin needs both a certificate and a key file.
    MissingTlsMaterial,
    /// Both a destination and an application command were given.
    ConflictingModes,
    /// Neither a destination nor an application command was given.
    MissingBackend,
    /// The application command contains no tokens.
    EmptyAppCommand,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidOrigin(origin) => {
                write!(f, "invalid origin '{}': expected http(s)://ip:port", origin)
            }
            Self::NonLocalOrigin(host) => {
                write!(f, "origin host must be a local IP address, got '{}'", host)
            }
            Self::InvalidDestination(dest) => {
                write!(f, "invalid destination '{}': expected host:port", dest)
            }
            Self::MissingTlsMaterial => {
                write!(f, "HTTPS requires both certificate (-c) and key (-k) files")
            }
            Self::ConflictingModes => {
                write!(f, "destination (-d) and application (-a) cannot be combined")
            }
            Self::MissingBackend => {
                write!(f, "either a destination (-d) or an application (-a) is required")
            }
            Self::EmptyAppCommand => write!(f, "application command is empty"),
        }
    }
}

impl std::error::Error for ConfigError {}
