//! Backend configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::translate::DocumentLayout;

/// Configuration for the MongoDB backend.
///
/// # Examples
///
/// ```
/// use resource_persistence::config::MongoConfig;
/// use resource_persistence::translate::DocumentLayout;
///
/// let config: MongoConfig = serde_json::from_str(
///     r#"{"database": "app", "collection": "users", "layout": {"kind": "nested", "prefix": "data"}}"#,
/// )
/// .unwrap();
///
/// assert_eq!(config.uri, "mongodb://localhost:27017");
/// assert_eq!(config.layout, DocumentLayout::nested("data"));
/// assert_eq!(config.max_pool_size, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MongoConfig {
    /// Connection string (default: `"mongodb://localhost:27017"`).
    #[serde(default = "default_uri")]
    pub uri: String,

    /// Database name (default: `"resources"`).
    #[serde(default = "default_database")]
    pub database: String,

    /// Collection holding the items (default: `"items"`).
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Payload layout of stored documents (default: inline).
    #[serde(default)]
    pub layout: DocumentLayout,

    /// Maximum number of pooled connections (default: 10).
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,

    /// Minimum number of pooled connections (default: 1).
    #[serde(default = "default_min_pool_size")]
    pub min_pool_size: u32,

    /// Connection timeout in milliseconds (default: 5000).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Application name reported to the server.
    #[serde(default)]
    pub app_name: Option<String>,
}

fn default_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_database() -> String {
    "resources".to_string()
}

fn default_collection() -> String {
    "items".to_string()
}

fn default_max_pool_size() -> u32 {
    10
}

fn default_min_pool_size() -> u32 {
    1
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            database: default_database(),
            collection: default_collection(),
            layout: DocumentLayout::default(),
            max_pool_size: default_max_pool_size(),
            min_pool_size: default_min_pool_size(),
            connect_timeout_ms: default_connect_timeout_ms(),
            app_name: None,
        }
    }
}

impl MongoConfig {
    /// Creates a configuration for `database`/`collection` at `uri`.
    pub fn new(
        uri: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
            collection: collection.into(),
            ..Default::default()
        }
    }

    /// Sets the payload layout.
    pub fn with_layout(mut self, layout: DocumentLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Returns the connection timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mongo_config_defaults() {
        let config = MongoConfig::default();
        assert_eq!(config.uri, "mongodb://localhost:27017");
        assert_eq!(config.database, "resources");
        assert_eq!(config.collection, "items");
        assert_eq!(config.layout, DocumentLayout::Inline);
        assert_eq!(config.max_pool_size, 10);
        assert_eq!(config.min_pool_size, 1);
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert!(config.app_name.is_none());
    }

    #[test]
    fn test_mongo_config_serialization() {
        let config = MongoConfig::new("mongodb://db:27017", "app", "users")
            .with_layout(DocumentLayout::nested("data"));

        let json = serde_json::to_string(&config).unwrap();
        let deserialized: MongoConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_mongo_config_partial_input() {
        let config: MongoConfig = serde_json::from_str(r#"{"max_pool_size": 50}"#).unwrap();
        assert_eq!(config.max_pool_size, 50);
        assert_eq!(config.uri, "mongodb://localhost:27017");
        assert_eq!(config.layout, DocumentLayout::Inline);
    }
}
