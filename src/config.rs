//! Bridge configuration
//!
//! Read once at process start from the environment (a `.env` file in the
//! working directory is loaded first). Nothing is hot-reloaded; the
//! resulting [`BridgeConfig`] is passed explicitly to every component.

use crate::error::{AppError, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Placeholder shipped in `.env.example`; treated as "not configured"
pub const NGROK_TOKEN_PLACEHOLDER: &str = "your-ngrok-auth-token";

/// MT5 terminal connection settings
#[derive(Debug, Clone)]
pub struct Mt5Config {
    pub account: u64,
    pub password: String,
    pub server: String,
    /// Terminal executable path, forwarded to the gateway on initialize
    pub path: String,
    pub gateway_url: String,
    pub timeout: Duration,
}

impl Default for Mt5Config {
    fn default() -> Self {
        Self {
            account: 12345678,
            password: "your-password".to_string(),
            server: "your-broker-server".to_string(),
            path: r"C:\Program Files\MetaTrader 5\terminal64.exe".to_string(),
            gateway_url: "http://127.0.0.1:8228".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Order defaults and broker symbol conventions
#[derive(Debug, Clone)]
pub struct TradingConfig {
    /// Broker-specific symbol suffix such as ".r" (empty = none)
    pub symbol_suffix: String,
    pub default_volume: f64,
    /// Stop-loss distance in points (0 disables)
    pub default_stop_loss: f64,
    /// Take-profit distance in points (0 disables)
    pub default_take_profit: f64,
    pub default_comment: String,
    /// Maximum slippage accepted by the terminal, in points
    pub deviation: u32,
    /// Magic number tagging orders placed by the bridge
    pub magic: u64,
    /// Optional upper bound on alert comment length (None = unlimited)
    pub max_comment_len: Option<usize>,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            symbol_suffix: String::new(),
            default_volume: 0.01,
            default_stop_loss: 100.0,
            default_take_profit: 200.0,
            default_comment: "TradingView Signal".to_string(),
            deviation: 30,
            magic: 234000,
            max_comment_len: None,
        }
    }
}

/// HTTP listener settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            debug: true,
        }
    }
}

/// ngrok tunnel settings
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    pub auth_token: String,
    pub binary: String,
    /// Local ngrok inspection API
    pub api_url: String,
    pub check_interval: Duration,
    pub url_file: PathBuf,
}

impl TunnelConfig {
    /// Whether a real auth token has been configured
    pub fn has_auth_token(&self) -> bool {
        !self.auth_token.is_empty() && self.auth_token != NGROK_TOKEN_PLACEHOLDER
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            auth_token: NGROK_TOKEN_PLACEHOLDER.to_string(),
            binary: "ngrok".to_string(),
            api_url: "http://127.0.0.1:4040".to_string(),
            check_interval: Duration::from_secs(30),
            url_file: PathBuf::from("webhook_url.txt"),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            dir: PathBuf::from("logs"),
        }
    }
}

/// Complete bridge configuration
#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
    pub mt5: Mt5Config,
    pub trading: TradingConfig,
    pub server: ServerConfig,
    pub tunnel: TunnelConfig,
    pub logging: LoggingConfig,
}

impl BridgeConfig {
    /// Load from the process environment, honouring a `.env` file
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!("Loaded environment from {:?}", path),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(AppError::Config(format!("Failed to read .env: {}", e))),
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys take their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mt5 = Mt5Config {
            account: parse_or(&get, "MT5_ACCOUNT", defaults.mt5.account)?,
            password: get("MT5_PASSWORD").unwrap_or(defaults.mt5.password),
            server: get("MT5_SERVER").unwrap_or(defaults.mt5.server),
            path: get("MT5_PATH").unwrap_or(defaults.mt5.path),
            gateway_url: get("MT5_GATEWAY_URL").unwrap_or(defaults.mt5.gateway_url),
            timeout: Duration::from_secs(parse_or(
                &get,
                "MT5_GATEWAY_TIMEOUT_SECS",
                defaults.mt5.timeout.as_secs(),
            )?),
        };

        let max_comment_len = match get("MAX_COMMENT_LENGTH") {
            Some(raw) => Some(parse_value::<usize>("MAX_COMMENT_LENGTH", &raw)?),
            None => None,
        };

        let trading = TradingConfig {
            // The suffix is taken verbatim; whitespace is never part of a broker symbol
            symbol_suffix: lookup("MT5_DEFAULT_SUFFIX")
                .map(|s| s.trim().to_string())
                .unwrap_or(defaults.trading.symbol_suffix),
            default_volume: parse_or(&get, "DEFAULT_VOLUME", defaults.trading.default_volume)?,
            default_stop_loss: parse_or(
                &get,
                "DEFAULT_STOP_LOSS",
                defaults.trading.default_stop_loss,
            )?,
            default_take_profit: parse_or(
                &get,
                "DEFAULT_TAKE_PROFIT",
                defaults.trading.default_take_profit,
            )?,
            default_comment: defaults.trading.default_comment,
            deviation: parse_or(&get, "ORDER_DEVIATION", defaults.trading.deviation)?,
            magic: parse_or(&get, "ORDER_MAGIC", defaults.trading.magic)?,
            max_comment_len,
        };

        let server = ServerConfig {
            host: get("FLASK_HOST")
                .or_else(|| get("HOST"))
                .unwrap_or(defaults.server.host),
            port: match get("FLASK_PORT").or_else(|| get("PORT")) {
                Some(raw) => parse_value("FLASK_PORT", &raw)?,
                None => defaults.server.port,
            },
            debug: get("DEBUG")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.server.debug),
        };

        let tunnel = TunnelConfig {
            auth_token: get("NGROK_AUTH_TOKEN").unwrap_or(defaults.tunnel.auth_token),
            binary: get("NGROK_BIN").unwrap_or(defaults.tunnel.binary),
            api_url: get("NGROK_API_URL").unwrap_or(defaults.tunnel.api_url),
            ..defaults.tunnel
        };

        let logging = LoggingConfig {
            level: get("LOG_LEVEL").unwrap_or(defaults.logging.level),
            dir: get("LOG_DIR").map(PathBuf::from).unwrap_or(defaults.logging.dir),
        };

        Ok(Self {
            mt5,
            trading,
            server,
            tunnel,
            logging,
        })
    }
}

/// Truthy values accepted for boolean flags: true, 1, t (case-insensitive)
fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "true" | "1" | "t")
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| AppError::Config(format!("Invalid value for {}: '{}' ({})", key, raw, e)))
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = BridgeConfig::from_lookup(|_| None).unwrap();

        assert_eq!(config.mt5.account, 12345678);
        assert_eq!(config.trading.symbol_suffix, "");
        assert_eq!(config.trading.default_volume, 0.01);
        assert_eq!(config.trading.default_stop_loss, 100.0);
        assert_eq!(config.trading.default_take_profit, 200.0);
        assert_eq!(config.trading.deviation, 30);
        assert_eq!(config.trading.magic, 234000);
        assert_eq!(config.trading.max_comment_len, None);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5000);
        assert!(config.server.debug);
        assert!(!config.tunnel.has_auth_token());
        assert_eq!(config.logging.level, "INFO");
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = BridgeConfig::from_lookup(lookup_from(&[
            ("MT5_ACCOUNT", "5551234"),
            ("MT5_DEFAULT_SUFFIX", ".r"),
            ("DEFAULT_VOLUME", "0.5"),
            ("DEFAULT_STOP_LOSS", "0"),
            ("FLASK_PORT", "8080"),
            ("DEBUG", "False"),
            ("MAX_COMMENT_LENGTH", "31"),
            ("NGROK_AUTH_TOKEN", "2abcTOKEN"),
            ("LOG_LEVEL", "debug"),
        ]))
        .unwrap();

        assert_eq!(config.mt5.account, 5551234);
        assert_eq!(config.trading.symbol_suffix, ".r");
        assert_eq!(config.trading.default_volume, 0.5);
        assert_eq!(config.trading.default_stop_loss, 0.0);
        assert_eq!(config.server.port, 8080);
        assert!(!config.server.debug);
        assert_eq!(config.trading.max_comment_len, Some(31));
        assert!(config.tunnel.has_auth_token());
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let err = BridgeConfig::from_lookup(lookup_from(&[("FLASK_PORT", "http")])).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains("FLASK_PORT"));
    }

    #[test]
    fn test_debug_flag_variants() {
        assert!(parse_flag("TRUE"));
        assert!(parse_flag("1"));
        assert!(parse_flag("t"));
        assert!(!parse_flag("no"));
        assert!(!parse_flag("0"));
    }
}
