use super::{Config, ConfigError};

/// Metadata about a single configuration property.
#[derive(Debug, Clone)]
pub struct PropertyMeta {
    /// Relative key (e.g., `"pool_size"`).
    pub key: String,
    /// Absolute key (e.g., `"database.pool_size"`).
    pub full_key: String,
    /// Rust type name (e.g., `"u32"`).
    pub type_name: &'static str,
    /// Whether the property is required (no default and not `Option`).
    pub required: bool,
    /// Default value as a string, if any.
    pub default_value: Option<String>,
    pub description: Option<String>,
}

/// Trait for strongly-typed configuration sections.
///
/// ```ignore
/// impl ConfigProperties for DatabaseConfig {
///     fn prefix() -> &'static str { "database" }
///     fn properties_metadata() -> Vec<PropertyMeta> { /* ... */ }
///     fn from_config(config: &Config) -> Result<Self, ConfigError> { /* ... */ }
/// }
/// ```
pub trait ConfigProperties: Sized {
    /// The configuration key prefix (e.g., `"database"`).
    fn prefix() -> &'static str;

    /// Metadata about all expected properties.
    fn properties_metadata() -> Vec<PropertyMeta>;

    /// Construct from a raw `Config` instance.
    fn from_config(config: &Config) -> Result<Self, ConfigError>;
}
