//! Client configuration.

use std::time::Duration;

/// Default catalog platform root.
pub const DEFAULT_CATALOG_ROOT: &str = "https://www.bungie.net/Platform/";

/// Configuration for the CouchDB client.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    /// Server URL.
    pub server_url: String,
    /// Basic-auth credentials.
    pub credentials: Option<(String, String)>,
    /// Request timeout.
    pub timeout: Duration,
}

impl CouchConfig {
    /// Creates a configuration for the given server.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            credentials: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets basic-auth credentials.
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((user.into(), password.into()));
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for CouchConfig {
    fn default() -> Self {
        Self::new("http://localhost:5984")
    }
}

/// Configuration for the catalog client.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Platform root; CDN paths are resolved against it.
    pub root: String,
    /// API key sent as `X-API-Key`.
    pub api_key: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl CatalogConfig {
    /// Creates a configuration with the default platform root.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            root: DEFAULT_CATALOG_ROOT.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Sets the platform root.
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configs() {
        let couch = CouchConfig::default();
        assert_eq!(couch.server_url, "http://localhost:5984");
        assert!(couch.credentials.is_none());

        let catalog = CatalogConfig::new("key");
        assert_eq!(catalog.root, DEFAULT_CATALOG_ROOT);
        assert_eq!(catalog.timeout, Duration::from_secs(120));
    }

    #[test]
    fn config_builder() {
        let couch = CouchConfig::new("http://couch:5984")
            .with_credentials("admin", "secret")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(couch.credentials, Some(("admin".into(), "secret".into())));
        assert_eq!(couch.timeout, Duration::from_secs(5));

        let catalog = CatalogConfig::new("key").with_root("http://localhost:8000/Platform/");
        assert_eq!(catalog.root, "http://localhost:8000/Platform/");
    }
}
