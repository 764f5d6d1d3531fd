//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development. Notification channels are only
//! enabled when their gateway is configured.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP + WebSocket server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./safelink.db`
    pub database_path: PathBuf,

    /// Ed25519 public key of the session token issuer (hex-encoded, 64 chars).
    /// Env: `AUTH_PUBKEY`
    /// Default: all-zeros, which rejects every token.
    pub auth_pubkey: [u8; 32],

    /// Ceiling of concurrent dispatches within one fan-out.
    /// Env: `FANOUT_MAX_CONCURRENCY`
    pub fanout_max_concurrency: usize,

    /// Per-dispatch timeout.
    /// Env: `DISPATCH_TIMEOUT_MS`
    pub dispatch_timeout: Duration,

    /// Buffer size of each real-time room.
    /// Env: `BROADCAST_CAPACITY`
    pub broadcast_capacity: usize,

    pub push: Option<PushConfig>,
    pub sms: Option<SmsConfig>,
    pub ussd: Option<UssdConfig>,
}

/// Env: `PUSH_GATEWAY_URL`, `PUSH_GATEWAY_KEY`
#[derive(Clone)]
pub struct PushConfig {
    pub gateway_url: String,
    pub api_key: Option<String>,
}

/// Env: `SMS_GATEWAY_URL`, `SMS_ACCOUNT_SID`, `SMS_AUTH_TOKEN`, `SMS_FROM_NUMBER`
#[derive(Clone)]
pub struct SmsConfig {
    pub gateway_url: String,
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

/// Env: `USSD_GATEWAY_URL`
#[derive(Debug, Clone)]
pub struct UssdConfig {
    pub gateway_url: String,
}

// Secrets stay out of the startup log.
impl fmt::Debug for PushConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushConfig")
            .field("gateway_url", &self.gateway_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl fmt::Debug for SmsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmsConfig")
            .field("gateway_url", &self.gateway_url)
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"<redacted>")
            .field("from_number", &self.from_number)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], safelink_shared::constants::DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./safelink.db"),
            auth_pubkey: [0u8; 32],
            fanout_max_concurrency: 8,
            dispatch_timeout: Duration::from_millis(5000),
            broadcast_capacity: 256,
            push: None,
            sms: None,
            ussd: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(addr) = var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = var("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(hex_key) = var("AUTH_PUBKEY") {
            match parse_hex_pubkey(&hex_key) {
                Ok(key) => config.auth_pubkey = key,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Invalid AUTH_PUBKEY, using default (every token will be rejected)"
                    );
                }
            }
        }

        if let Some(n) = parse_positive(var("FANOUT_MAX_CONCURRENCY"), "FANOUT_MAX_CONCURRENCY") {
            config.fanout_max_concurrency = n;
        }

        if let Some(ms) = parse_positive(var("DISPATCH_TIMEOUT_MS"), "DISPATCH_TIMEOUT_MS") {
            config.dispatch_timeout = Duration::from_millis(ms as u64);
        }

        if let Some(n) = parse_positive(var("BROADCAST_CAPACITY"), "BROADCAST_CAPACITY") {
            config.broadcast_capacity = n;
        }

        // -- Notification channels --

        config.push = var("PUSH_GATEWAY_URL").map(|gateway_url| PushConfig {
            gateway_url,
            api_key: var("PUSH_GATEWAY_KEY"),
        });

        if let Some(gateway_url) = var("SMS_GATEWAY_URL") {
            match (
                var("SMS_ACCOUNT_SID"),
                var("SMS_AUTH_TOKEN"),
                var("SMS_FROM_NUMBER"),
            ) {
                (Some(account_sid), Some(auth_token), Some(from_number)) => {
                    config.sms = Some(SmsConfig {
                        gateway_url,
                        account_sid,
                        auth_token,
                        from_number,
                    });
                }
                _ => tracing::warn!(
                    "SMS_GATEWAY_URL is set but SMS_ACCOUNT_SID, SMS_AUTH_TOKEN or \
                     SMS_FROM_NUMBER is missing; SMS channel disabled"
                ),
            }
        }

        config.ussd = var("USSD_GATEWAY_URL").map(|gateway_url| UssdConfig { gateway_url });

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

fn parse_positive(value: Option<String>, key: &str) -> Option<usize> {
    let value = value?;
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            tracing::warn!(key, value = %value, "Invalid positive integer, using default");
            None
        }
    }
}

/// Parse a 64-character hex string into a 32-byte array.
fn parse_hex_pubkey(hex: &str) -> Result<[u8; 32], String> {
    let bytes = hex::decode(hex.trim()).map_err(|e| format!("invalid hex: {e}"))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| format!("expected 32 bytes, got {}", b.len()))
}
