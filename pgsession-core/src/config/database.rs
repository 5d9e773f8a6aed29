use super::typed::{ConfigProperties, PropertyMeta};
use super::{Config, ConfigError, ConfigValidationDetail};

/// Pool size used when `database.pool_size` is not configured.
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// Connection settings for one database: where to connect and how many
/// physical connections the pool may hold at once.
///
/// ```yaml
/// database:
///   url: postgres://postgres@localhost/test
///   pool_size: 10
/// ```
///
/// Environment overrides: `DATABASE_URL`, `DATABASE_POOL_SIZE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }

    pub fn with_pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Read the section straight from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::empty();
        for key in ["DATABASE_URL", "DATABASE_POOL_SIZE"] {
            if let Ok(value) = std::env::var(key) {
                config.set(
                    &super::loader::env_key_to_config_key(key),
                    super::ConfigValue::String(value),
                );
            }
        }
        Self::from_config(&config)
    }
}

impl ConfigProperties for DatabaseConfig {
    fn prefix() -> &'static str {
        "database"
    }

    fn properties_metadata() -> Vec<PropertyMeta> {
        vec![
            PropertyMeta {
                key: "url".into(),
                full_key: "database.url".into(),
                type_name: "String",
                required: true,
                default_value: None,
                description: Some("Connection string, e.g. postgres://user@host/db".into()),
            },
            PropertyMeta {
                key: "pool_size".into(),
                full_key: "database.pool_size".into(),
                type_name: "u32",
                required: false,
                default_value: Some(DEFAULT_POOL_SIZE.to_string()),
                description: Some("Maximum number of pooled physical connections".into()),
            },
        ]
    }

    fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let url: String = config.get("database.url")?;
        let pool_size = if config.contains_key("database.pool_size") {
            config.get::<u32>("database.pool_size")?
        } else {
            DEFAULT_POOL_SIZE
        };

        let mut details = Vec::new();
        if url.trim().is_empty() {
            details.push(ConfigValidationDetail {
                key: "database.url".into(),
                message: "must not be empty".into(),
            });
        }
        if pool_size == 0 {
            details.push(ConfigValidationDetail {
                key: "database.pool_size".into(),
                message: "must be at least 1".into(),
            });
        }
        if !details.is_empty() {
            return Err(ConfigError::Validation(details));
        }

        Ok(Self { url, pool_size })
    }
}
