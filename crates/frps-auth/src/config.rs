//! Configuration for the authorization service.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::debug;

/// Environment variable naming an alternative ini file.
pub const CONFIG_FILE_ENV: &str = "FRPS_AUTH_CONFIG";

/// Default ini file, looked up relative to the working directory.
const DEFAULT_CONFIG_FILE: &str = "frps-auth.ini";

/// Section-less ini keys and the section keys they stand for.
const FLAT_KEYS: [(&str, &str); 5] = [
    ("address", "server.address"),
    ("port", "server.port"),
    ("username", "admin.username"),
    ("password", "admin.password"),
    ("salt", "signing.salt"),
];

/// Service configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// HTTP listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Administrator credential configuration
    #[serde(default)]
    pub admin: AdminConfig,

    /// Signature configuration
    #[serde(default)]
    pub signing: SigningConfig,

    /// Record storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Static asset configuration
    #[serde(default)]
    pub static_files: StaticFilesConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_address")]
    pub address: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Upper bound on the time spent handling a single request
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct AdminConfig {
    /// Administrator user name. Empty user name and password disable the gate.
    #[serde(default = "default_admin_username")]
    pub username: String,

    /// Administrator password
    #[serde(default = "default_admin_password")]
    pub password: SecretString,

    /// Let the tunnel server call the handshake endpoint without credentials
    #[serde(default)]
    pub open_handshake: bool,
}

#[derive(Debug, Deserialize)]
pub struct SigningConfig {
    /// Process-wide signing salt
    #[serde(default = "default_salt")]
    pub salt: SecretString,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory of the on-disk record database
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,

    /// Bucket (tree) holding authorization records
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Enable persistence (if false, records are kept in memory only)
    #[serde(default = "default_true")]
    pub persist: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StaticFilesConfig {
    /// Directory served under the static asset path
    #[serde(default = "default_static_dir")]
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Global requests per minute
    #[serde(default = "default_per_minute")]
    pub per_minute: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Optional log file, written in addition to stderr
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,
}

// Default implementations
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            username: default_admin_username(),
            password: default_admin_password(),
            open_handshake: false,
        }
    }
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            salt: default_salt(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            bucket: default_bucket(),
            persist: true,
        }
    }
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            dir: default_static_dir(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: default_per_minute(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

// Default value functions
fn default_address() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    4000
}

fn default_read_timeout_secs() -> u64 {
    10
}

fn default_admin_username() -> String {
    "admin".into()
}

fn default_admin_password() -> SecretString {
    SecretString::new("admin".into())
}

fn default_salt() -> SecretString {
    SecretString::new("admin".into())
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("frps-auth-db")
}

fn default_bucket() -> String {
    "auth".into()
}

fn default_true() -> bool {
    true
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_per_minute() -> u32 {
    600
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("frps-auth.log"))
}

impl Config {
    /// Load configuration from the ini file and environment variables.
    ///
    /// Environment variables (`FRPS_AUTH__SECTION__KEY`) take precedence
    /// over the ini file. A missing ini file is not an error.
    pub fn load() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let file = std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        Self::load_from(&file)
    }

    /// Load configuration from a specific ini file plus the environment.
    ///
    /// Flat keys outside any section (`address`, `port`, `username`,
    /// `password`, `salt`) are read as defaults for their section, so
    /// `[server] port` or `FRPS_AUTH__SERVER__PORT` still win over `port`.
    pub fn load_from(file: &str) -> Result<Self> {
        let ini = || config::File::new(file, config::FileFormat::Ini).required(false);

        let flat = config::Config::builder()
            .add_source(ini())
            .build()
            .context("Failed to read configuration file")?;

        let mut builder = config::Config::builder();
        for (flat_key, section_key) in FLAT_KEYS {
            if let Ok(value) = flat.get_string(flat_key) {
                debug!(key = flat_key, "Mapping flat configuration key to {}", section_key);
                builder = builder
                    .set_default(section_key, value)
                    .with_context(|| format!("Invalid configuration key {}", flat_key))?;
            }
        }

        let config = builder
            .add_source(ini())
            .add_source(
                config::Environment::with_prefix("FRPS_AUTH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Socket address string the server binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.address, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let config = Config::load_from("does-not-exist.ini").unwrap();

        assert_eq!(config.server.port, 4000);
        assert_eq!(config.storage.bucket, "auth");
        assert_eq!(config.admin.username, "admin");
        assert_eq!(config.signing.salt.expose_secret(), "admin");
        assert!(!config.admin.open_handshake);
        assert_eq!(config.bind_address(), "127.0.0.1:4000");
    }

    #[test]
    fn test_ini_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frps-auth.ini");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[server]\naddress = 0.0.0.0\nport = 4100\n\n[signing]\nsalt = pepper\n\n[admin]\nopen_handshake = true"
        )
        .unwrap();

        let config = Config::load_from(path.to_str().unwrap()).unwrap();

        assert_eq!(config.server.address, "0.0.0.0");
        assert_eq!(config.server.port, 4100);
        assert_eq!(config.signing.salt.expose_secret(), "pepper");
        assert!(config.admin.open_handshake);
        // Untouched sections keep their defaults
        assert_eq!(config.storage.path, PathBuf::from("frps-auth-db"));
    }

    #[test]
    fn test_secrets_are_redacted_in_debug() {
        let config = Config::load_from("does-not-exist.ini").unwrap();
        let debug = format!("{:?}", config.signing);
        assert!(!debug.contains("admin"));
    }

    #[test]
    fn test_flat_ini_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frps-auth.ini");
        std::fs::write(
            &path,
            "address = 0.0.0.0\nport = 4100\nusername = ops\npassword = hunter2\nsalt = pepper\n",
        )
        .unwrap();

        let config = Config::load_from(path.to_str().unwrap()).unwrap();

        assert_eq!(config.server.address, "0.0.0.0");
        assert_eq!(config.server.port, 4100);
        assert_eq!(config.admin.username, "ops");
        assert_eq!(config.admin.password.expose_secret(), "hunter2");
        assert_eq!(config.signing.salt.expose_secret(), "pepper");
    }

    #[test]
    fn test_section_keys_win_over_flat_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frps-auth.ini");
        std::fs::write(&path, "port = 4100\nsalt = pepper\n\n[server]\nport = 4200\n").unwrap();

        let config = Config::load_from(path.to_str().unwrap()).unwrap();

        assert_eq!(config.server.port, 4200);
        assert_eq!(config.signing.salt.expose_secret(), "pepper");
    }
}
