use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::ConfigError;
use crate::signature::TrustedKey;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", default, deny_unknown_fields)]
pub struct Config {
    /// DNS name holding the AKD/AKDS TXT record
    #[serde(alias = "record_name")]
    pub record_name: Option<String>,

    /// ASCII-armored OpenPGP key AKDS records must be signed with
    #[serde(alias = "pubkey")]
    pub pubkey: Option<String>,

    /// URL serving plain authorized_keys text
    #[serde(alias = "url")]
    pub url: Option<String>,

    /// Whether the URL may be used after the DNS path fails
    #[serde(alias = "allow_url_fallback")]
    pub allow_url_fallback: bool,

    /// Accept AKD records and AKDS records whose signature does not verify
    #[serde(alias = "accept_unverified")]
    pub accept_unverified: bool,

    /// Also write the keys to `authorized_keys_path`
    #[serde(alias = "overwrite_authorized_keys")]
    pub overwrite_authorized_keys: bool,

    #[serde(alias = "authorized_keys_path")]
    pub authorized_keys_path: Option<PathBuf>,

    /// Recursive nameservers as `ip` or `ip:port`; system resolvers when empty
    #[serde(alias = "nameservers")]
    pub nameservers: Vec<String>,
}

impl Config {
    /// Load, override from the environment, and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut config = Self::from_toml_str(&contents)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.normalize();

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        config.resolve_paths(base);

        config.validate()?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let mut config: Config =
            toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.normalize();
        Ok(config)
    }

    /// Override settings from `AKD_*` variables, looked up through `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(record_name) = lookup("AKD_RECORD_NAME") {
            self.record_name = Some(record_name);
        }

        if let Some(pubkey) = lookup("AKD_PUBKEY") {
            self.pubkey = Some(pubkey);
        }

        if let Some(url) = lookup("AKD_URL") {
            self.url = Some(url);
        }

        if let Some(value) = lookup("AKD_ALLOW_URL_FALLBACK") {
            self.allow_url_fallback = parse_bool("AKD_ALLOW_URL_FALLBACK", &value)?;
        }

        if let Some(value) = lookup("AKD_ACCEPT_UNVERIFIED") {
            self.accept_unverified = parse_bool("AKD_ACCEPT_UNVERIFIED", &value)?;
        }

        if let Some(value) = lookup("AKD_OVERWRITE_AUTHORIZED_KEYS") {
            self.overwrite_authorized_keys = parse_bool("AKD_OVERWRITE_AUTHORIZED_KEYS", &value)?;
        }

        if let Some(path) = lookup("AKD_AUTHORIZED_KEYS_PATH") {
            self.authorized_keys_path = Some(PathBuf::from(path));
        }

        if let Some(nameservers) = lookup("AKD_NAMESERVERS") {
            self.nameservers = nameservers
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        Ok(())
    }

    /// Treat empty values as unset
    fn normalize(&mut self) {
        for field in [&mut self.record_name, &mut self.pubkey, &mut self.url] {
            if field.as_deref().is_some_and(|s| s.trim().is_empty()) {
                *field = None;
            }
        }
        if self
            .authorized_keys_path
            .as_deref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            self.authorized_keys_path = None;
        }
    }

    /// Make a relative `authorized_keys_path` relative to `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        if let Some(path) = &self.authorized_keys_path {
            if path.is_relative() {
                self.authorized_keys_path = Some(base.join(path));
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.record_name.is_none() && self.url.is_none() {
            return Err(ConfigError::MissingSource);
        }

        if self.overwrite_authorized_keys && self.authorized_keys_path.is_none() {
            return Err(ConfigError::MissingAuthorizedKeysPath);
        }

        self.signing_key()?;
        self.nameserver_addrs()?;

        Ok(())
    }

    /// The configured signing key. Only parsed when DNS lookup is enabled.
    pub fn signing_key(&self) -> Result<Option<TrustedKey>, ConfigError> {
        match (&self.record_name, &self.pubkey) {
            (Some(_), Some(armored)) => TrustedKey::from_armored(armored).map(Some),
            _ => Ok(None),
        }
    }

    pub fn nameserver_addrs(&self) -> Result<Vec<SocketAddr>, ConfigError> {
        self.nameservers
            .iter()
            .map(|s| {
                s.parse::<SocketAddr>()
                    .or_else(|_| s.parse::<IpAddr>().map(|ip| SocketAddr::new(ip, 53)))
                    .map_err(|_| ConfigError::InvalidNameserver(s.clone()))
            })
            .collect()
    }
}

/// Parse a boolean override; anything unrecognised is an error
fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
