use crate::error::{Result, ServiceError};
use asset_remote::HttpRemoteConfig;
use bucketed_memory_cache::CacheConfig;
use disk_writeback::WriteBackConfig;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Settings for the orchestrator and the tiers it owns
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// `None` disables the memory cache
    pub cache: Option<CacheConfig>,
    /// `None` disables write-back, so stores fail while the remote is down
    pub writeback: Option<WriteBackConfig>,
    pub store_timeout: Duration,
    pub fetch_timeout: Duration,
    /// Remote calls in flight at once
    pub worker_count: usize,
    pub simulate_timeout: bool,
    pub metadata_cache_capacity: u64,
    pub metadata_cache_ttl: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cache: Some(CacheConfig::default()),
            writeback: Some(WriteBackConfig::default()),
            store_timeout: Duration::from_secs(10),
            fetch_timeout: Duration::from_secs(45),
            worker_count: 8,
            simulate_timeout: false,
            metadata_cache_capacity: 10_000,
            metadata_cache_ttl: Duration::from_secs(5 * 60),
        }
    }
}

/// Service configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    /// `None` runs against an in-process store
    pub remote: Option<HttpRemoteConfig>,
    pub orchestrator: OrchestratorConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build the configuration from any variable source
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| var(key).and_then(|v| v.trim().parse::<u64>().ok());
        let flag = |key: &str, default: bool| var(key).map(|v| parse_flag(&v)).unwrap_or(default);

        let port = var("PORT")
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(3005);

        let mut cache = CacheConfig::default();
        if let Some(size) = parsed("CACHE_SIZE") {
            cache.capacity_bytes = size as usize;
        }
        if let Some(size) = parsed("MAX_CACHEABLE_ASSET_SIZE") {
            cache.max_cacheable_asset_size = size as usize;
            cache.bucket_sizes = default_buckets(size as usize);
        }
        if let Some(list) = var("CACHE_BUCKET_SIZES") {
            cache.bucket_sizes = parse_list(&list).ok_or_else(|| {
                ServiceError::Config(format!("CACHE_BUCKET_SIZES is not a size list: {}", list))
            })?;
        }
        let cache = if flag("USE_CACHE", true) {
            cache.validate()?;
            Some(cache)
        } else {
            None
        };

        let mut writeback = WriteBackConfig::new(
            var("WRITEBACK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./cache/writeback")),
        );
        if let Some(ms) = parsed("WRITEBACK_INTERVAL_MS") {
            writeback.write_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(workers) = parsed("WRITEBACK_WORKERS") {
            writeback.workers = (workers as usize).max(1);
        }
        if let Some(secs) = parsed("WRITEBACK_RETENTION_SECS") {
            writeback.retention = Duration::from_secs(secs);
        }
        writeback.aggressive_cleanup = flag("WRITEBACK_AGGRESSIVE_CLEANUP", false);

        let store_timeout = parsed("STORE_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(10));
        let fetch_timeout = parsed("FETCH_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(45));
        writeback.attempt_timeout = store_timeout;
        let writeback = (!flag("DISABLE_WRITEBACK_CACHE", false)).then_some(writeback);

        let remote = match var("REMOTE_STORE_URL") {
            Some(raw) => {
                let base_url = Url::parse(raw.trim()).map_err(|e| {
                    ServiceError::Config(format!("REMOTE_STORE_URL is not a URL: {}", e))
                })?;
                let mut remote = HttpRemoteConfig::new(base_url);
                if let Some(prefix) = var("REMOTE_CONTAINER_PREFIX") {
                    remote.container_prefix = prefix;
                }
                remote.read_timeout = fetch_timeout;
                remote.write_timeout = store_timeout;
                remote.allow_overwrite = flag("REMOTE_ALLOW_OVERWRITE", false);
                Some(remote)
            }
            None => None,
        };

        let worker_count = parsed("WORKER_THREADS")
            .map(|n| (n as usize).max(1))
            .unwrap_or(8);

        Ok(Self {
            port,
            remote,
            orchestrator: OrchestratorConfig {
                cache,
                writeback,
                store_timeout,
                fetch_timeout,
                worker_count,
                simulate_timeout: flag("SIMULATE_TIMEOUT", false),
                ..Default::default()
            },
        })
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_list<T: FromStr>(list: &str) -> Option<Vec<T>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().ok())
        .collect()
}

/// The default bucket ladder, topped with half and all of `max`
fn default_buckets(max: usize) -> Vec<usize> {
    let mut buckets: Vec<usize> = [1024, 4096, 16384, 65536, 262144]
        .into_iter()
        .filter(|&b| b < max / 2)
        .collect();
    if max / 2 > 0 {
        buckets.push(max / 2);
    }
    buckets.push(max);
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ServiceConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 3005);
        assert!(config.remote.is_none());

        let orchestrator = config.orchestrator;
        let cache = orchestrator.cache.unwrap();
        assert_eq!(cache.capacity_bytes, 128 * 1024 * 1024);
        assert_eq!(cache.max_cacheable_asset_size, 1024 * 1024);

        let writeback = orchestrator.writeback.unwrap();
        assert_eq!(writeback.dir, PathBuf::from("./cache/writeback"));
        assert_eq!(writeback.write_interval, Duration::from_secs(1));
        assert_eq!(writeback.workers, 4);
        assert_eq!(writeback.retention, Duration::from_secs(60));
        assert!(!writeback.aggressive_cleanup);

        assert_eq!(orchestrator.store_timeout, Duration::from_secs(10));
        assert_eq!(orchestrator.fetch_timeout, Duration::from_secs(45));
        assert_eq!(orchestrator.worker_count, 8);
        assert!(!orchestrator.simulate_timeout);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("PORT", "8080"),
            ("CACHE_SIZE", "1048576"),
            ("WRITEBACK_DIR", "/var/lib/assets"),
            ("WRITEBACK_AGGRESSIVE_CLEANUP", "true"),
            ("SIMULATE_TIMEOUT", "1"),
            ("STORE_TIMEOUT_MS", "250"),
            ("REMOTE_STORE_URL", "https://objects.example.com/v1"),
            ("REMOTE_CONTAINER_PREFIX", "grid_"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        let remote = config.remote.unwrap();
        assert_eq!(remote.container_prefix, "grid_");
        assert_eq!(remote.write_timeout, Duration::from_millis(250));

        let orchestrator = config.orchestrator;
        assert_eq!(orchestrator.cache.unwrap().capacity_bytes, 1048576);
        let writeback = orchestrator.writeback.unwrap();
        assert_eq!(writeback.dir, PathBuf::from("/var/lib/assets"));
        assert!(writeback.aggressive_cleanup);
        assert_eq!(writeback.attempt_timeout, Duration::from_millis(250));
        assert!(orchestrator.simulate_timeout);
    }

    #[test]
    fn test_disable_tiers() {
        let config = config(&[("USE_CACHE", "false"), ("DISABLE_WRITEBACK_CACHE", "true")]).unwrap();
        assert!(config.orchestrator.cache.is_none());
        assert!(config.orchestrator.writeback.is_none());
    }

    #[test]
    fn test_bucket_list() {
        let config = config(&[
            ("MAX_CACHEABLE_ASSET_SIZE", "8192"),
            ("CACHE_BUCKET_SIZES", "1024, 4096, 8192"),
        ])
        .unwrap();
        let cache = config.orchestrator.cache.unwrap();
        assert_eq!(cache.bucket_sizes, vec![1024, 4096, 8192]);
    }

    #[test]
    fn test_max_cacheable_rebuilds_default_buckets() {
        let config = config(&[("MAX_CACHEABLE_ASSET_SIZE", "65536")]).unwrap();
        let cache = config.orchestrator.cache.unwrap();
        assert_eq!(cache.bucket_sizes, vec![1024, 4096, 16384, 32768, 65536]);
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert!(config(&[("REMOTE_STORE_URL", "not a url")]).is_err());
        assert!(config(&[("CACHE_BUCKET_SIZES", "4096,1024")]).is_err());
        assert!(config(&[("CACHE_BUCKET_SIZES", "big")]).is_err());
    }

    #[test]
    fn test_disabled_cache_is_not_validated() {
        let config = config(&[("USE_CACHE", "false"), ("CACHE_BUCKET_SIZES", "4096,1024")]).unwrap();
        assert!(config.orchestrator.cache.is_none());
    }
}
