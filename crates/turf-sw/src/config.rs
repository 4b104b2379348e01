//! Worker configuration

use std::path::Path;

use serde::{Deserialize, Serialize};
use turf_net::LoaderConfig;
use url::Url;

use crate::ServiceWorkerError;

/// Service worker configuration.
///
/// Injected when the worker is constructed; nothing is read from globals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Name of the current cache. Every other cache is stale.
    pub cache_name: String,

    /// Origin and base path relative URLs resolve against.
    pub scope: String,

    /// Resources fetched and cached at install time.
    pub precache_urls: Vec<String>,

    /// Document served when the network and the exact cache entry both miss.
    pub fallback_path: String,

    /// URL path suffixes that mark a request as a document.
    pub document_suffixes: Vec<String>,

    /// Push notification settings
    pub notification: NotificationConfig,
}

/// Push notification settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Notification title
    pub title: String,

    /// Body used when a push arrives without payload
    pub default_body: String,

    pub icon: String,

    pub badge: String,

    /// Vibration pattern in milliseconds
    pub vibrate: Vec<u32>,

    /// Notifications with the same tag replace each other
    pub tag: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_name: "turf-admin-v1.0.0".to_string(),
            scope: "http://localhost/".to_string(),
            precache_urls: vec![
                "/".to_string(),
                "/admin.html".to_string(),
                "/manifest.json".to_string(),
                "/turfadmin.png".to_string(),
                "https://cdn.jsdelivr.net/npm/@supabase/supabase-js@2".to_string(),
            ],
            fallback_path: "/admin.html".to_string(),
            document_suffixes: vec![".html".to_string()],
            notification: NotificationConfig::default(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: "Turf Admin".to_string(),
            default_body: "New admin notification!".to_string(),
            icon: "/icons/icon-192x192.png".to_string(),
            badge: "/icons/icon-72x72.png".to_string(),
            vibrate: vec![200, 100, 200],
            tag: "admin-notification".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ServiceWorkerError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ServiceWorkerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ServiceWorkerError> {
        let json = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ServiceWorkerError::Config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Set the scope.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Set the cache name.
    pub fn with_cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = name.into();
        self
    }

    /// Replace the install-time resource list.
    pub fn with_precache_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.precache_urls = urls.into_iter().map(Into::into).collect();
        self
    }

    /// Parsed scope URL.
    pub fn scope_url(&self) -> Result<Url, ServiceWorkerError> {
        let scope = Url::parse(&self.scope).map_err(|e| {
            ServiceWorkerError::Config(format!("invalid scope {}: {}", self.scope, e))
        })?;
        if scope.cannot_be_a_base() {
            return Err(ServiceWorkerError::Config(format!(
                "scope {} cannot be a base URL",
                self.scope
            )));
        }
        Ok(scope)
    }

    /// Resolve a path or absolute URL against the scope.
    pub fn resolve(&self, path: &str) -> Result<Url, ServiceWorkerError> {
        self.scope_url()?
            .join(path)
            .map_err(|e| ServiceWorkerError::Config(format!("invalid URL {}: {}", path, e)))
    }

    /// Loader settings whose origin is the scope, so same-origin responses
    /// come back `basic` and stay cacheable.
    pub fn loader_config(&self) -> Result<LoaderConfig, ServiceWorkerError> {
        Ok(LoaderConfig::default().with_origin(self.scope_url()?))
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<(), ServiceWorkerError> {
        if self.cache_name.trim().is_empty() {
            return Err(ServiceWorkerError::Config("cache_name is empty".to_string()));
        }
        self.resolve(&self.fallback_path)?;
        for url in &self.precache_urls {
            self.resolve(url)?;
        }
        if self.document_suffixes.iter().any(String::is_empty) {
            return Err(ServiceWorkerError::Config(
                "document_suffixes contains an empty suffix".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WorkerConfig::default();
        assert_eq!(config.cache_name, "turf-admin-v1.0.0");
        assert_eq!(config.fallback_path, "/admin.html");
        assert_eq!(config.notification.title, "Turf Admin");
        assert_eq!(config.notification.vibrate, vec![200, 100, 200]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = WorkerConfig::from_json_str(
            r#"{ "cache_name": "turf-admin-v2.0.0", "notification": { "title": "Ops" } }"#,
        )
        .unwrap();

        assert_eq!(config.cache_name, "turf-admin-v2.0.0");
        assert_eq!(config.notification.title, "Ops");
        assert_eq!(config.notification.default_body, "New admin notification!");
        assert_eq!(config.document_suffixes, vec![".html"]);
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            WorkerConfig::from_json_str("{ nope"),
            Err(ServiceWorkerError::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_cache_name() {
        let config = WorkerConfig::default().with_cache_name("  ");
        assert!(matches!(config.validate(), Err(ServiceWorkerError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_scope() {
        let config = WorkerConfig::default().with_scope("mailto:admin@turf.example");
        assert!(config.validate().is_err());

        let config = WorkerConfig::default().with_scope("not a url");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve() {
        let config = WorkerConfig::default().with_scope("https://turf.example/");
        assert_eq!(
            config.resolve("/admin.html").unwrap().as_str(),
            "https://turf.example/admin.html"
        );
        assert_eq!(
            config
                .resolve("https://cdn.jsdelivr.net/npm/@supabase/supabase-js@2")
                .unwrap()
                .host_str(),
            Some("cdn.jsdelivr.net")
        );
    }

    #[test]
    fn test_loader_config_uses_scope_origin() {
        let config = WorkerConfig::default().with_scope("https://turf.example/admin/");
        let loader = config.loader_config().unwrap();
        let origin = loader.origin.unwrap();
        assert_eq!(
            origin.origin(),
            Url::parse("https://turf.example/app.js").unwrap().origin()
        );

        let config = WorkerConfig::default().with_scope("not a url");
        assert!(config.loader_config().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sw.json");
        std::fs::write(&path, r#"{ "scope": "https://turf.example/" }"#).unwrap();

        let config = WorkerConfig::load(&path).unwrap();
        assert_eq!(config.scope, "https://turf.example/");
        assert!(WorkerConfig::load(dir.path().join("missing.json")).is_err());
    }
}
