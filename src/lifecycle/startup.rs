//! Startup orchestration.
//!
//! # Responsibilities
//! - Merge the optional config file with command-line overrides
//! - Validate the result (fatal on error)
//! - Build the backend registry from the validated backend list
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Flags win over the file

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::loader::load_with_overrides;
use crate::config::validation::parse_backend_url;
use crate::config::{ConfigError, ProxyConfig};
use crate::http::forwarder::{build_client, HttpForwarder, UpstreamClient};
use crate::load_balancer::{Backend, BackendRegistry};

pub use crate::config::loader::{parse_server_list, Overrides};

/// Resolve the startup configuration from flags and the optional file.
pub fn resolve_config(file: Option<&Path>, overrides: &Overrides) -> Result<ProxyConfig, ConfigError> {
    let config = load_with_overrides(file, overrides)?;
    tracing::debug!(file = ?file, overrides = ?overrides, "Configuration resolved");
    Ok(config)
}

/// Builds backends that share one pooled upstream client.
#[derive(Debug, Clone)]
pub struct BackendFactory {
    client: UpstreamClient,
    max_response_bytes: usize,
}

impl BackendFactory {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            client: build_client(Duration::from_secs(config.timeouts.connect_secs)),
            max_response_bytes: config.limits.max_response_bytes,
        }
    }

    pub fn make_backend(&self, url: &Url) -> Arc<Backend> {
        let forwarder = HttpForwarder::new(url.clone(), self.client.clone(), self.max_response_bytes);
        Arc::new(Backend::new(url.clone(), Arc::new(forwarder)))
    }

    /// Parse every configured address, in order. Invalid entries are logged and skipped.
    pub fn backend_urls(config: &ProxyConfig) -> Vec<Url> {
        config
            .backends
            .iter()
            .filter_map(|b| match parse_backend_url(&b.address) {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid backend address");
                    None
                }
            })
            .collect()
    }

    /// Registry populated from the configured backend list.
    pub fn build_registry(&self, config: &ProxyConfig) -> Arc<BackendRegistry> {
        let backends = Self::backend_urls(config)
            .iter()
            .map(|url| {
                tracing::info!(backend = %url, "Configured server");
                self.make_backend(url)
            })
            .collect::<Vec<_>>();
        Arc::new(BackendRegistry::with_backends(backends))
    }

    /// Apply a reloaded backend list to a live registry.
    pub fn apply(&self, registry: &BackendRegistry, config: &ProxyConfig) {
        let urls = Self::backend_urls(config);
        registry.sync_addresses(&urls, |url| self.make_backend(url));
        tracing::info!(backends = registry.len(), "Backend list reloaded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_server_list() {
        let list = parse_server_list("http://a:1, http://b:2,,http://c:3 ");
        let addrs: Vec<_> = list.iter().map(|b| b.address.as_str()).collect();
        assert_eq!(addrs, vec!["http://a:1", "http://b:2", "http://c:3"]);
    }

    #[test]
    fn test_flags_only() {
        let overrides = Overrides {
            servers: Some("http://127.0.0.1:3000,http://127.0.0.1:3001".into()),
            port: Some(8000),
            log_level: None,
        };
        let config = resolve_config(None, &overrides).unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8000");
        assert_eq!(config.backends.len(), 2);
    }

    #[test]
    fn test_empty_server_list_is_fatal() {
        let overrides = Overrides {
            servers: Some(" , ".into()),
            ..Default::default()
        };
        assert!(matches!(resolve_config(None, &overrides), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_malformed_address_is_fatal() {
        let overrides = Overrides {
            servers: Some("http://127.0.0.1:3000,::nope::".into()),
            ..Default::default()
        };
        assert!(matches!(resolve_config(None, &overrides), Err(ConfigError::Validation(_))));
    }

    #[tokio::test]
    async fn test_reloaded_file_keeps_servers_flag() {
        let dir = std::env::temp_dir().join(format!("rr-balancer-startup-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("balancer.toml");
        std::fs::write(&path, "[[backends]]\naddress = \"http://127.0.0.1:3000\"\n").unwrap();

        let overrides = Overrides {
            servers: Some("http://127.0.0.1:4000".into()),
            ..Default::default()
        };
        let config = resolve_config(Some(&path), &overrides).unwrap();
        let factory = BackendFactory::new(&config);
        let registry = factory.build_registry(&config);

        std::fs::write(
            &path,
            "[[backends]]\naddress = \"http://127.0.0.1:3000\"\n[observability]\nlog_level = \"debug\"\n",
        )
        .unwrap();
        let reloaded = resolve_config(Some(&path), &overrides).unwrap();
        factory.apply(&registry, &reloaded);

        let addrs: Vec<String> = registry.addresses().iter().map(|u| u.to_string()).collect();
        assert_eq!(addrs, vec!["http://127.0.0.1:4000/"]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_build_registry_in_order() {
        let overrides = Overrides {
            servers: Some("http://127.0.0.1:3000,http://127.0.0.1:3001/api".into()),
            ..Default::default()
        };
        let config = resolve_config(None, &overrides).unwrap();
        let registry = BackendFactory::new(&config).build_registry(&config);

        let addrs: Vec<String> = registry.addresses().iter().map(|u| u.to_string()).collect();
        assert_eq!(addrs, vec!["http://127.0.0.1:3000/", "http://127.0.0.1:3001/api"]);
        assert!(registry.all_backends().iter().all(|b| b.is_reachable()));
    }

    #[tokio::test]
    async fn test_apply_reloaded_list() {
        let overrides = Overrides {
            servers: Some("http://127.0.0.1:3000,http://127.0.0.1:3001".into()),
            ..Default::default()
        };
        let config = resolve_config(None, &overrides).unwrap();
        let factory = BackendFactory::new(&config);
        let registry = factory.build_registry(&config);

        let mut reloaded = config.clone();
        reloaded.backends = parse_server_list("http://127.0.0.1:3001,http://127.0.0.1:3002");
        factory.apply(&registry, &reloaded);

        let ports: Vec<_> = registry.addresses().iter().map(|u| u.port()).collect();
        assert_eq!(ports, vec![Some(3001), Some(3002)]);
    }
}
