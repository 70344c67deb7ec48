//! Engine configuration: defaults, environment overrides, validation.

use crate::error::ConfigError;
use crate::rules::MAX_PAGE_SIZE;

pub const DEFAULT_PAGE_SIZE: u64 = 25;
pub const DEFAULT_BULK_LIMIT: usize = 100;

pub const PAGE_SIZE_ENV: &str = "ENDPOINT_DEFAULT_PAGE_SIZE";
pub const BULK_LIMIT_ENV: &str = "ENDPOINT_BULK_LIMIT";

/// Settings every endpoint inherits unless it overrides them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// `page.size` when the request does not give one.
    pub default_page_size: u64,
    /// Most items one bulk request may carry.
    pub bulk_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            default_page_size: DEFAULT_PAGE_SIZE,
            bulk_limit: DEFAULT_BULK_LIMIT,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `.env` and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = EngineConfig::default();
        if let Some(raw) = lookup(PAGE_SIZE_ENV) {
            config.default_page_size = parse(PAGE_SIZE_ENV, &raw)?;
        }
        if let Some(raw) = lookup(BULK_LIMIT_ENV) {
            config.bulk_limit = parse(BULK_LIMIT_ENV, &raw)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_page_size == 0 || self.default_page_size as f64 > MAX_PAGE_SIZE {
            return Err(ConfigError::Load(format!(
                "{} must be between 1 and {}, got {}",
                PAGE_SIZE_ENV, MAX_PAGE_SIZE, self.default_page_size
            )));
        }
        if self.bulk_limit == 0 {
            return Err(ConfigError::Load(format!("{} must be at least 1", BULK_LIMIT_ENV)));
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ConfigError::Load(format!("{}={}: {}", key, raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_overrides() {
        assert_eq!(EngineConfig::from_lookup(|_| None).unwrap(), EngineConfig::default());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = EngineConfig::from_lookup(|key| match key {
            PAGE_SIZE_ENV => Some("10".into()),
            BULK_LIMIT_ENV => Some(" 5 ".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.default_page_size, 10);
        assert_eq!(config.bulk_limit, 5);
    }

    #[test]
    fn malformed_or_out_of_range_values_fail() {
        assert!(EngineConfig::from_lookup(|k| (k == BULK_LIMIT_ENV).then(|| "lots".into())).is_err());
        assert!(EngineConfig::from_lookup(|k| (k == PAGE_SIZE_ENV).then(|| "500".into())).is_err());
        assert!(EngineConfig::from_lookup(|k| (k == BULK_LIMIT_ENV).then(|| "0".into())).is_err());
    }
}
