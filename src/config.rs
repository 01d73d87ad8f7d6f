use std::path::PathBuf;
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Name of the device configuration file.
pub const CONFIG_FILE: &str = "Bmd.toml";

/// Prefix for environment variable overrides, e.g. `BMD_BOOTH=3`.
pub const ENV_PREFIX: &str = "BMD_";

/// Device configuration. Loaded once at startup and passed explicitly into
/// each component; nothing in the crate reads configuration globally.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Root of the ballot pool layout, one directory per election.
    pub elections_root: PathBuf,
    /// The hardware-locked PKCS#8 private key.
    pub private_key_path: PathBuf,
    /// Append-only consumed-token log.
    pub token_log_path: PathBuf,
    /// Append-only vote log.
    pub vote_log_path: PathBuf,
    /// Which ballot status store to use.
    #[serde(default)]
    pub status_backend: StatusBackendKind,
    /// Booth number stamped on votes when the token does not carry one.
    #[serde(default = "default_booth")]
    pub booth: u32,
    #[serde(default = "default_print_timeout")]
    pub print_timeout_secs: u64,
    /// How long a rejected-token screen is shown before the device returns
    /// to waiting for a card.
    #[serde(default = "default_reject_delay")]
    pub reject_delay_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

/// Ballot status persistence flavours deployed in the field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusBackendKind {
    /// Per-election `ballots_status.json` next to the pool.
    File,
    /// The legacy MongoDB `ballots` collection.
    Mongo { uri: String },
}

impl Default for StatusBackendKind {
    fn default() -> Self {
        StatusBackendKind::File
    }
}

fn default_booth() -> u32 {
    1
}

fn default_print_timeout() -> u64 {
    20
}

fn default_reject_delay() -> u64 {
    3
}

fn default_poll_interval() -> u64 {
    500
}

impl Config {
    /// Load from `Bmd.toml` merged with `BMD_*` environment variables.
    pub fn load() -> Result<Self> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file(CONFIG_FILE))
                .merge(Env::prefixed(ENV_PREFIX)),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        figment
            .extract()
            .map_err(|err| Error::Config(err.to_string()))
    }

    pub fn print_timeout(&self) -> Duration {
        Duration::from_secs(self.print_timeout_secs)
    }

    pub fn reject_delay(&self) -> Duration {
        Duration::from_secs(self.reject_delay_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = Config::from_figment(Figment::new().merge(Toml::string(
            r#"
                elections_root = "/media/usb/elections"
                private_key_path = "private.pem"
                token_log_path = "tokens.log"
                vote_log_path = "votes.json"
            "#,
        )))
        .unwrap();
        assert!(matches!(config.status_backend, StatusBackendKind::File));
        assert_eq!(config.booth, 1);
        assert_eq!(config.print_timeout(), Duration::from_secs(20));
        assert_eq!(config.reject_delay(), Duration::from_secs(3));
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn mongo_backend_is_selectable() {
        let config = Config::from_figment(Figment::new().merge(Toml::string(
            r#"
                elections_root = "elections"
                private_key_path = "private.pem"
                token_log_path = "tokens.log"
                vote_log_path = "votes.json"
                booth = 5
                print_timeout_secs = 30

                [status_backend]
                kind = "mongo"
                uri = "mongodb://localhost:27017/"
            "#,
        )))
        .unwrap();
        assert_eq!(config.booth, 5);
        assert_eq!(config.print_timeout_secs, 30);
        match config.status_backend {
            StatusBackendKind::Mongo { ref uri } => {
                assert_eq!(uri, "mongodb://localhost:27017/")
            }
            _ => panic!("expected mongo backend"),
        }
    }

    #[test]
    fn missing_required_field_is_a_config_error() {
        let result = Config::from_figment(
            Figment::new().merge(Toml::string(r#"elections_root = "elections""#)),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
