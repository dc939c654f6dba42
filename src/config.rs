use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use zeroize::Zeroizing;

use crate::ethereum::contract::GatewayOptions;
use crate::ethereum::utils;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub chain: ChainConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub ws_url: Option<String>,
    pub sale_address: Option<String>,
    pub token_address: Option<String>,
    /// Only ever read from the environment or a config file; never written back.
    #[serde(skip_serializing)]
    pub private_key: Option<SecretKey>,
    pub confirmation_timeout_secs: u64,
    pub receipt_poll_interval_secs: u64,
    pub event_buffer: usize,
    pub gas: GasConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    pub gas_limit: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub admin_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

/// Hex-encoded signing key. Zeroed on drop and redacted from debug output.
#[derive(Clone)]
pub struct SecretKey(Zeroizing<String>);

impl SecretKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(Zeroizing::new(key.into()))
    }

    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey(***REDACTED***)")
    }
}

impl<'de> Deserialize<'de> for SecretKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            environment: "development".to_string(),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:3001".to_string(),
                "https://localhost:3000".to_string(),
                "https://localhost:3001".to_string(),
            ],
            request_timeout_secs: 10,
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            ws_url: Some("ws://localhost:8545".to_string()),
            sale_address: None,
            token_address: None,
            private_key: None,
            confirmation_timeout_secs: 120,
            receipt_poll_interval_secs: 2,
            event_buffer: 64,
            gas: GasConfig::default(),
        }
    }
}

impl Default for GasConfig {
    fn default() -> Self {
        Self { gas_limit: 300_000 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {:?}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {:?}: {}", path, e))?;

        Ok(config)
    }

    /// Save configuration to a TOML file. The private key is never written.
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    anyhow!("Failed to create config directory {:?}: {}", parent, e)
                })?;
            }
        }

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {:?}: {}", path, e))?;

        Ok(())
    }

    /// Defaults, then the file if one is given, then the process environment.
    pub async fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Self {
        let mut config = match path {
            Some(path) => match Self::load_from_file(path).await {
                Ok(config) => {
                    tracing::info!("Loaded configuration from file");
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to load config file, using defaults: {}", e);
                    Self::default()
                }
            },
            None => Self::default(),
        };

        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    /// Applies environment overrides through `lookup`. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(host) = var("API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("API_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!("Ignoring invalid API_PORT '{}'", port),
            }
        }
        if let Some(environment) = var("ENVIRONMENT") {
            self.server.environment = environment;
        }
        if let Some(origins) = var("ALLOWED_ORIGINS") {
            self.server.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(timeout) = var("REQUEST_TIMEOUT_SECS") {
            match timeout.parse() {
                Ok(secs) => self.server.request_timeout_secs = secs,
                Err(_) => tracing::warn!("Ignoring invalid REQUEST_TIMEOUT_SECS '{}'", timeout),
            }
        }

        if let Some(url) = var("BLOCKCHAIN_RPC_URL") {
            self.chain.rpc_url = url;
        }
        if let Some(url) = var("BLOCKCHAIN_WS_URL") {
            self.chain.ws_url = Some(url);
        }
        if let Some(address) = var("CONTRACT_ADDRESS") {
            self.chain.sale_address = Some(address);
        }
        if let Some(address) = var("TOKEN_ADDRESS") {
            self.chain.token_address = Some(address);
        }
        if let Some(key) = var("PRIVATE_KEY") {
            self.chain.private_key = Some(SecretKey::new(key));
        }

        if let Some(admin) = var("ADMIN_ADDRESS") {
            self.auth.admin_address = Some(admin);
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let rpc = &self.chain.rpc_url;
        if rpc.is_empty() {
            return Err(anyhow!("RPC URL is required"));
        }
        if !(rpc.starts_with("http://") || rpc.starts_with("https://")) {
            return Err(anyhow!("RPC URL '{}' must use http or https", rpc));
        }

        if let Some(ws) = &self.chain.ws_url {
            if !(ws.starts_with("ws://") || ws.starts_with("wss://")) {
                return Err(anyhow!("WebSocket URL '{}' must use ws or wss", ws));
            }
        }

        self.sale_address()?;
        self.token_address()?;
        self.admin_address()?;
        self.signing_key()?;

        if self.server.request_timeout_secs == 0 {
            return Err(anyhow!("request_timeout_secs must be greater than zero"));
        }

        Ok(())
    }

    pub fn sale_address(&self) -> Result<Option<Address>> {
        optional_address("sale contract", self.chain.sale_address.as_deref())
    }

    pub fn token_address(&self) -> Result<Option<Address>> {
        optional_address("token contract", self.chain.token_address.as_deref())
    }

    pub fn admin_address(&self) -> Result<Option<Address>> {
        optional_address("admin", self.auth.admin_address.as_deref())
    }

    pub fn signing_key(&self) -> Result<Option<PrivateKeySigner>> {
        self.chain
            .private_key
            .as_ref()
            .map(|key| utils::parse_signing_key(key.expose_secret()))
            .transpose()
            .map_err(|e| anyhow!("Invalid private key: {}", e))
    }

    pub fn gateway_options(&self) -> GatewayOptions {
        GatewayOptions {
            call_timeout: Duration::from_secs(self.server.request_timeout_secs),
            confirmation_timeout: Duration::from_secs(self.chain.confirmation_timeout_secs),
            gas_limit: self.chain.gas.gas_limit,
            event_buffer: self.chain.event_buffer,
        }
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_secs(self.chain.receipt_poll_interval_secs.max(1))
    }

    /// Get default config file path
    pub fn default_config_path() -> Result<std::path::PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("whitelist-token-backend").join("config.toml"))
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let sample_config = r#"# Whitelist Token Backend Configuration File

[server]
host = "0.0.0.0"
port = 8080
environment = "development"
allowed_origins = [
    "http://localhost:3000",
    "http://localhost:3001",
    "https://localhost:3000",
    "https://localhost:3001",
]
request_timeout_secs = 10

[chain]
rpc_url = "http://localhost:8545"
ws_url = "ws://localhost:8545"
# sale_address = "0x..."
# token_address = "0x..."
confirmation_timeout_secs = 120
receipt_poll_interval_secs = 2
event_buffer = 64

[chain.gas]
gas_limit = 300000

[auth]
# admin_address = "0x..."

[logging]
level = "info"

# Environment variables override the values above:
# API_HOST, API_PORT, ENVIRONMENT, ALLOWED_ORIGINS (comma-separated),
# REQUEST_TIMEOUT_SECS, BLOCKCHAIN_RPC_URL, BLOCKCHAIN_WS_URL,
# CONTRACT_ADDRESS, TOKEN_ADDRESS, ADMIN_ADDRESS, LOG_LEVEL
# PRIVATE_KEY - signing key for admin transactions; without it the
#               backend runs read-only
"#;
        sample_config.to_string()
    }
}

/// The zero address counts as unset.
fn optional_address(label: &str, value: Option<&str>) -> Result<Option<Address>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(value) => {
            let address = utils::parse_address(value)
                .map_err(|e| anyhow!("Invalid {} address: {}", label, e))?;
            Ok(Some(address).filter(|a| !a.is_zero()))
        }
    }
}
