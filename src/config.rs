//! Startup configuration.
//!
//! Loaded from a TOML file (`[gateway]` and `[server]` tables), then
//! overlaid with environment variables (`SMS_RELAY_*`), then defaulted.
//! The loaded value is passed explicitly into the server and client
//! constructors - there is no process-wide config singleton.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field required to reach the gateway is absent.
    #[error("{0} is required")]
    Missing(&'static str),
}

/// Result type for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Credentials and location of the outbound gateway device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub url: String,
    pub username: String,
    pub password: String,
}

/// Settings for the relay server itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address; a bare `:port` binds all interfaces.
    pub listen: String,
    pub db_path: String,
    /// Shared secret for webhook signatures. Empty disables verification
    /// (explicit trust-the-network mode).
    pub webhook_secret: String,
    /// Register our webhook with the gateway at startup.
    pub auto_register: bool,
    /// Public URL the gateway should push to.
    pub webhook_url: String,
    /// PEM certificate/key paths; both set enables TLS.
    pub tls_cert: String,
    pub tls_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub server: ServerConfig,
}

const DEFAULT_LISTEN: &str = ":3851";

impl Config {
    /// `<config dir>/sms-relay/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("sms-relay").join("config.toml"))
    }

    /// `<config dir>/sms-relay/relay.db`.
    pub fn default_db_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("sms-relay").join("relay.db"))
    }

    /// Loads the config from `path`, then applies env overrides and
    /// defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut cfg: Config = toml::from_str(&raw)?;
        cfg.finish();
        Ok(cfg)
    }

    /// Like [`Config::load`], but a missing file falls back to an
    /// env-and-defaults-only configuration instead of erroring.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => {
                let mut cfg: Config = toml::from_str(&raw)?;
                cfg.finish();
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let mut cfg = Config::default();
                cfg.finish();
                Ok(cfg)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn finish(&mut self) {
        self.apply_env_from(|key| env::var(key).ok());
        self.apply_defaults();
    }

    fn apply_defaults(&mut self) {
        if self.server.listen.is_empty() {
            self.server.listen = DEFAULT_LISTEN.to_string();
        }
        if self.server.db_path.is_empty() {
            if let Some(p) = Self::default_db_path() {
                self.server.db_path = p.to_string_lossy().into_owned();
            }
        }
    }

    /// Overlays values from an environment lookup. Split out from the
    /// real `env::var` so tests can inject a map.
    fn apply_env_from(&mut self, get: impl Fn(&str) -> Option<String>) {
        let set = |slot: &mut String, key: &str| {
            if let Some(v) = get(key) {
                if !v.is_empty() {
                    *slot = v;
                }
            }
        };
        set(&mut self.gateway.url, "SMS_RELAY_URL");
        set(&mut self.gateway.username, "SMS_RELAY_USER");
        set(&mut self.gateway.password, "SMS_RELAY_PASS");
        set(&mut self.server.listen, "SMS_RELAY_LISTEN");
        set(&mut self.server.db_path, "SMS_RELAY_DB_PATH");
        set(&mut self.server.webhook_secret, "SMS_RELAY_WEBHOOK_SECRET");
    }

    /// Checks that the fields needed to reach the gateway are present.
    pub fn validate(&self) -> Result<()> {
        if self.gateway.url.is_empty() {
            return Err(ConfigError::Missing("gateway url"));
        }
        if self.gateway.username.is_empty() {
            return Err(ConfigError::Missing("gateway username"));
        }
        if self.gateway.password.is_empty() {
            return Err(ConfigError::Missing("gateway password"));
        }
        Ok(())
    }

    /// The listen address in a form `TcpListener::bind` accepts: a bare
    /// `:port` becomes `0.0.0.0:port`.
    pub fn listen_addr(&self) -> String {
        if self.server.listen.starts_with(':') {
            format!("0.0.0.0{}", self.server.listen)
        } else {
            self.server.listen.clone()
        }
    }

    /// The database path with a leading `~/` expanded.
    pub fn db_path(&self) -> PathBuf {
        expand_home(&self.server.db_path)
    }

    /// TLS cert/key paths (`~` expanded) when both are configured.
    pub fn tls_paths(&self) -> Option<(PathBuf, PathBuf)> {
        if self.server.tls_cert.is_empty() || self.server.tls_key.is_empty() {
            return None;
        }
        Some((
            expand_home(&self.server.tls_cert),
            expand_home(&self.server.tls_key),
        ))
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn parses_full_toml() {
        let raw = r#"
            [gateway]
            url = "https://gw.example"
            username = "admin"
            password = "hunter2"

            [server]
            listen = "127.0.0.1:4000"
            webhook_secret = "s3cret"
            auto_register = true
            webhook_url = "https://relay.example/webhook"
        "#;
        let cfg: Config = toml::from_str(raw).unwrap();
        assert_eq!(cfg.gateway.url, "https://gw.example");
        assert_eq!(cfg.server.listen, "127.0.0.1:4000");
        assert!(cfg.server.auto_register);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn missing_sections_default() {
        let cfg: Config = toml::from_str("").unwrap();
        assert!(cfg.gateway.url.is_empty());
        assert!(!cfg.server.auto_register);
    }

    #[test]
    fn defaults_fill_listen_and_db_path() {
        let mut cfg = Config::default();
        cfg.apply_defaults();
        assert_eq!(cfg.server.listen, ":3851");
        assert!(!cfg.server.db_path.is_empty());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = Config::default();
        cfg.server.listen = "127.0.0.1:4000".into();
        cfg.apply_env_from(|key| match key {
            "SMS_RELAY_LISTEN" => Some("127.0.0.1:5000".into()),
            "SMS_RELAY_PASS" => Some("from-env".into()),
            _ => None,
        });
        assert_eq!(cfg.server.listen, "127.0.0.1:5000");
        assert_eq!(cfg.gateway.password, "from-env");
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut cfg = Config::default();
        cfg.server.listen = "127.0.0.1:4000".into();
        cfg.apply_env_from(|_| Some(String::new()));
        assert_eq!(cfg.server.listen, "127.0.0.1:4000");
    }

    #[test]
    fn validate_requires_gateway_fields() {
        let mut cfg = Config::default();
        cfg.apply_env_from(no_env);
        assert!(matches!(cfg.validate(), Err(ConfigError::Missing("gateway url"))));

        cfg.gateway.url = "https://gw.example".into();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Missing("gateway username"))
        ));

        cfg.gateway.username = "admin".into();
        cfg.gateway.password = "pw".into();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn bare_port_listen_binds_all_interfaces() {
        let mut cfg = Config::default();
        cfg.server.listen = ":3851".into();
        assert_eq!(cfg.listen_addr(), "0.0.0.0:3851");

        cfg.server.listen = "127.0.0.1:4000".into();
        assert_eq!(cfg.listen_addr(), "127.0.0.1:4000");
    }

    #[test]
    fn tls_requires_both_cert_and_key() {
        let mut cfg = Config::default();
        assert!(cfg.tls_paths().is_none());

        cfg.server.tls_cert = "/etc/relay/cert.pem".into();
        assert!(cfg.tls_paths().is_none());

        cfg.server.tls_key = "/etc/relay/key.pem".into();
        let (cert, key) = cfg.tls_paths().unwrap();
        assert_eq!(cert, PathBuf::from("/etc/relay/cert.pem"));
        assert_eq!(key, PathBuf::from("/etc/relay/key.pem"));
    }

    #[test]
    fn load_or_default_tolerates_missing_file() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/sms-relay.toml")).unwrap();
        assert_eq!(cfg.server.listen, ":3851");
    }

    #[test]
    fn load_reads_file_and_applies_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[gateway]\nurl = \"https://gw.example\"\n").unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.gateway.url, "https://gw.example");
        assert_eq!(cfg.server.listen, ":3851");

        assert!(Config::load(&dir.path().join("absent.toml")).is_err());
    }
}
