use crate::constants::DEFAULT_SELLER_PREMIUM;
use config::{Config, ConfigError, File};
use ethers::types::{Address, H256};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Deserialize, Clone)]
pub struct ControllerSection {
    /// Address of the controller itself (passed to pools as their controller).
    #[serde(default)]
    pub address: Address,
    /// Only this address may run owner-gated actions.
    #[serde(default)]
    pub owner: Address,
    #[serde(default = "default_seller_premium")]
    pub default_seller_premium: u8,
}

fn default_seller_premium() -> u8 {
    DEFAULT_SELLER_PREMIUM
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            address: Address::zero(),
            owner: Address::zero(),
            default_seller_premium: default_seller_premium(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProxySection {
    /// Proxy manager the initializer/seller proxies are deployed from.
    #[serde(default)]
    pub manager: Address,
    /// keccak256 of the many-to-one proxy init code.
    #[serde(default)]
    pub init_code_hash: H256,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String, // "debug", "info", "warn"
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub controller: ControllerSection,
    #[serde(default)]
    pub proxy: ProxySection,
    #[serde(default)]
    pub log: LogSettings,
}

impl Settings {
    /// Loads `Config.toml` from the working directory, then applies env overrides.
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("Config.toml").required(false))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;
        apply_env_overrides(&mut settings)?;
        Ok(settings)
    }

    /// Loads an explicit file (format from its extension), then applies env overrides.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;
        apply_env_overrides(&mut settings)?;
        Ok(settings)
    }
}

fn apply_env_overrides(settings: &mut Settings) -> Result<(), ConfigError> {
    if let Some(owner) = env_value::<Address>("INDEX_CONTROLLER_OWNER")? {
        settings.controller.owner = owner;
    }
    if let Some(premium) = env_value::<u8>("INDEX_CONTROLLER_DEFAULT_SELLER_PREMIUM")? {
        settings.controller.default_seller_premium = premium;
    }
    if let Some(manager) = env_value::<Address>("INDEX_CONTROLLER_PROXY_MANAGER")? {
        settings.proxy.manager = manager;
    }
    if let Some(hash) = env_value::<H256>("INDEX_CONTROLLER_INIT_CODE_HASH")? {
        settings.proxy.init_code_hash = hash;
    }
    Ok(())
}

/// Reads and parses an env var. Empty values are ignored; unparsable values are errors.
fn env_value<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<T>()
                .map(Some)
                .map_err(|e| ConfigError::Message(format!("{}: {}", key, e)))
        }
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_from_empty_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "# empty").unwrap();
        let settings = Settings::from_path(file.path()).unwrap();
        assert_eq!(settings.controller.default_seller_premium, DEFAULT_SELLER_PREMIUM);
        assert_eq!(settings.log.level, "info");
    }

    #[test]
    fn test_file_values() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[controller]
owner = "0x00000000000000000000000000000000000000aa"
default_seller_premium = 5

[proxy]
manager = "0x00000000000000000000000000000000000000bb"
init_code_hash = "0x00000000000000000000000000000000000000000000000000000000000000cc"
"#
        )
        .unwrap();
        let settings = Settings::from_path(file.path()).unwrap();
        assert_eq!(settings.controller.owner, Address::from_low_u64_be(0xaa));
        assert_eq!(settings.controller.default_seller_premium, 5);
        assert_eq!(settings.proxy.manager, Address::from_low_u64_be(0xbb));
        assert_eq!(settings.proxy.init_code_hash, H256::from_low_u64_be(0xcc));
    }
}
