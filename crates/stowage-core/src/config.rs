//! Client configuration.
//!
//! Provides [`StoreConfig`] for connecting to an S3-compatible endpoint and
//! tuning multipart behavior. Values are loaded from `STOWAGE_*`
//! environment variables, with `LOG_LEVEL` shared with the binary.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use stowage_model::limits::{DEFAULT_MULTIPART_THRESHOLD, DEFAULT_PART_SIZE, MIN_PART_SIZE};
use typed_builder::TypedBuilder;

use crate::multipart::AbortPolicy;
use crate::naming::DEFAULT_UPLOAD_BASE_DIR;
use crate::provider::StorageProvider;
use crate::source::PartLimits;

/// Default lifetime of presigned URLs, in seconds.
pub const DEFAULT_TOKEN_TIME_SECS: u64 = 1800;

/// Default number of abort attempts before cleanup is reported unconfirmed.
pub const DEFAULT_ABORT_MAX_ATTEMPTS: u32 = 5;

/// Default delay before the second abort attempt, in milliseconds.
pub const DEFAULT_ABORT_BACKOFF_MS: u64 = 200;

/// Object store configuration.
///
/// # Examples
///
/// ```
/// use stowage_core::config::StoreConfig;
///
/// let config = StoreConfig::default();
/// assert_eq!(config.region, "us-east-1");
/// assert_eq!(config.upload_base_dir, "uploads");
/// assert!(!config.force_path_style);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Endpoint URL. Empty means the SDK's default resolution for `region`.
    #[builder(default)]
    pub endpoint: String,

    /// Signing region.
    #[builder(default = String::from("us-east-1"))]
    pub region: String,

    /// Known provider used to derive `endpoint` from `region` when
    /// `endpoint` is empty.
    #[builder(default)]
    #[serde(default)]
    pub provider: Option<StorageProvider>,

    /// Access key ID. Empty means the default credential chain.
    #[builder(default)]
    pub access_key: String,

    /// Secret access key.
    #[builder(default)]
    pub secret_key: String,

    /// Bucket used when a call does not name one.
    #[builder(default)]
    pub default_bucket: String,

    /// Public (or CDN) domain objects are served from.
    #[builder(default)]
    pub domain: String,

    /// Base directory for generated upload object names.
    #[builder(default = String::from(DEFAULT_UPLOAD_BASE_DIR))]
    pub upload_base_dir: String,

    /// Whether objects are private (served through presigned URLs only).
    #[builder(default = false)]
    pub private: bool,

    /// Lifetime of presigned URLs, in seconds.
    #[builder(default = DEFAULT_TOKEN_TIME_SECS)]
    pub token_time_secs: u64,

    /// Part size used when slicing files.
    #[builder(default = DEFAULT_PART_SIZE)]
    pub part_size: u64,

    /// Floor for every part but the last. S3 requires 5 MiB; some
    /// self-hosted backends accept less.
    #[builder(default = MIN_PART_SIZE)]
    pub min_part_size: u64,

    /// Files at or above this size are uploaded with multipart.
    #[builder(default = DEFAULT_MULTIPART_THRESHOLD)]
    pub multipart_threshold: u64,

    /// Maximum number of abort calls in one abort-and-verify cycle.
    #[builder(default = DEFAULT_ABORT_MAX_ATTEMPTS)]
    pub abort_max_attempts: u32,

    /// Initial backoff between abort attempts, in milliseconds.
    #[builder(default = DEFAULT_ABORT_BACKOFF_MS)]
    pub abort_backoff_ms: u64,

    /// Always address buckets path-style.
    #[builder(default = false)]
    pub force_path_style: bool,

    /// Apply [`default_cors_rules`](crate::cors::default_cors_rules) to the
    /// default bucket at startup.
    #[builder(default = false)]
    pub auto_config_cors: bool,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: String::from("us-east-1"),
            provider: None,
            access_key: String::new(),
            secret_key: String::new(),
            default_bucket: String::new(),
            domain: String::new(),
            upload_base_dir: String::from(DEFAULT_UPLOAD_BASE_DIR),
            private: false,
            token_time_secs: DEFAULT_TOKEN_TIME_SECS,
            part_size: DEFAULT_PART_SIZE,
            min_part_size: MIN_PART_SIZE,
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
            abort_max_attempts: DEFAULT_ABORT_MAX_ATTEMPTS,
            abort_backoff_ms: DEFAULT_ABORT_BACKOFF_MS,
            force_path_style: false,
            auto_config_cors: false,
            log_level: String::from("info"),
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `STOWAGE_ENDPOINT` | *(empty)* |
    /// | `STOWAGE_REGION` | `us-east-1` |
    /// | `STOWAGE_PROVIDER` | *(none)* |
    /// | `STOWAGE_ACCESS_KEY` | *(empty)* |
    /// | `STOWAGE_SECRET_KEY` | *(empty)* |
    /// | `STOWAGE_BUCKET` | *(empty)* |
    /// | `STOWAGE_DOMAIN` | *(empty)* |
    /// | `STOWAGE_BASE_DIR` | `uploads` |
    /// | `STOWAGE_PRIVATE` | `false` |
    /// | `STOWAGE_TOKEN_TIME` | `1800` |
    /// | `STOWAGE_PART_SIZE` | `5242880` |
    /// | `STOWAGE_MIN_PART_SIZE` | `5242880` |
    /// | `STOWAGE_MULTIPART_THRESHOLD` | `83886080` |
    /// | `STOWAGE_ABORT_MAX_ATTEMPTS` | `5` |
    /// | `STOWAGE_ABORT_BACKOFF_MS` | `200` |
    /// | `STOWAGE_FORCE_PATH_STYLE` | `false` |
    /// | `STOWAGE_AUTO_CONFIG_CORS` | `false` |
    /// | `LOG_LEVEL` | `info` |
    ///
    /// Numeric and provider variables that fail to parse are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = lookup("STOWAGE_ENDPOINT") {
            config.endpoint = v;
        }
        if let Some(v) = lookup("STOWAGE_REGION") {
            config.region = v;
        }
        if let Some(p) = lookup("STOWAGE_PROVIDER").and_then(|v| v.parse().ok()) {
            config.provider = Some(p);
        }
        if let Some(v) = lookup("STOWAGE_ACCESS_KEY") {
            config.access_key = v;
        }
        if let Some(v) = lookup("STOWAGE_SECRET_KEY") {
            config.secret_key = v;
        }
        if let Some(v) = lookup("STOWAGE_BUCKET") {
            config.default_bucket = v;
        }
        if let Some(v) = lookup("STOWAGE_DOMAIN") {
            config.domain = v;
        }
        if let Some(v) = lookup("STOWAGE_BASE_DIR") {
            config.upload_base_dir = v;
        }
        if let Some(v) = lookup("STOWAGE_PRIVATE") {
            config.private = parse_bool(&v);
        }
        if let Some(n) = lookup("STOWAGE_TOKEN_TIME").and_then(|v| v.parse().ok()) {
            config.token_time_secs = n;
        }
        if let Some(n) = lookup("STOWAGE_PART_SIZE").and_then(|v| v.parse().ok()) {
            config.part_size = n;
        }
        if let Some(n) = lookup("STOWAGE_MIN_PART_SIZE").and_then(|v| v.parse().ok()) {
            config.min_part_size = n;
        }
        if let Some(n) = lookup("STOWAGE_MULTIPART_THRESHOLD").and_then(|v| v.parse().ok()) {
            config.multipart_threshold = n;
        }
        if let Some(n) = lookup("STOWAGE_ABORT_MAX_ATTEMPTS").and_then(|v| v.parse().ok()) {
            config.abort_max_attempts = n;
        }
        if let Some(n) = lookup("STOWAGE_ABORT_BACKOFF_MS").and_then(|v| v.parse().ok()) {
            config.abort_backoff_ms = n;
        }
        if let Some(v) = lookup("STOWAGE_FORCE_PATH_STYLE") {
            config.force_path_style = parse_bool(&v);
        }
        if let Some(v) = lookup("STOWAGE_AUTO_CONFIG_CORS") {
            config.auto_config_cors = parse_bool(&v);
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }

    /// Endpoint to connect to: `endpoint` when set, otherwise the HTTPS
    /// endpoint of `provider` in `region`.
    ///
    /// `None` leaves resolution to the SDK.
    #[must_use]
    pub fn resolved_endpoint(&self) -> Option<String> {
        let endpoint = self.endpoint.trim();
        if !endpoint.is_empty() {
            return Some(endpoint.to_owned());
        }
        self.provider.and_then(|p| p.endpoint_for(&self.region, true))
    }

    /// Whether every request should address buckets path-style.
    #[must_use]
    pub fn path_style(&self) -> bool {
        self.force_path_style || self.provider.is_some_and(StorageProvider::prefers_path_style)
    }

    /// Abort-and-verify policy derived from this configuration.
    #[must_use]
    pub fn abort_policy(&self) -> AbortPolicy {
        AbortPolicy::new(
            self.abort_max_attempts,
            Duration::from_millis(self.abort_backoff_ms),
        )
    }

    /// Part size limits derived from this configuration.
    #[must_use]
    pub fn part_limits(&self) -> PartLimits {
        PartLimits {
            min_part_size: self.min_part_size,
            ..PartLimits::default()
        }
    }

    /// Presigned URL lifetime.
    #[must_use]
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_time_secs)
    }
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_should_create_default_config() {
        let config = StoreConfig::default();
        assert!(config.endpoint.is_empty());
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.upload_base_dir, "uploads");
        assert_eq!(config.token_time_secs, 1800);
        assert_eq!(config.part_size, 5 * 1024 * 1024);
        assert_eq!(config.multipart_threshold, 80 * 1024 * 1024);
        assert_eq!(config.abort_max_attempts, 5);
        assert!(!config.private);
        assert!(!config.auto_config_cors);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_should_load_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("STOWAGE_ENDPOINT", "http://localhost:9000"),
            ("STOWAGE_BUCKET", "media"),
            ("STOWAGE_PROVIDER", "tencent"),
            ("STOWAGE_REGION", "ap-shanghai"),
            ("STOWAGE_PRIVATE", "TRUE"),
            ("STOWAGE_FORCE_PATH_STYLE", "1"),
            ("STOWAGE_PART_SIZE", "8388608"),
            ("STOWAGE_MIN_PART_SIZE", "1048576"),
            ("STOWAGE_ABORT_MAX_ATTEMPTS", "not-a-number"),
            ("LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let config = StoreConfig::from_lookup(|k| vars.get(k).map(|v| (*v).to_owned()));

        assert_eq!(config.endpoint, "http://localhost:9000");
        assert_eq!(config.default_bucket, "media");
        assert_eq!(config.provider, Some(StorageProvider::TencentCos));
        assert!(config.private);
        assert!(config.force_path_style);
        assert_eq!(config.part_size, 8 * 1024 * 1024);
        assert_eq!(config.part_limits().min_part_size, 1024 * 1024);
        assert_eq!(config.abort_max_attempts, DEFAULT_ABORT_MAX_ATTEMPTS);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_should_load_from_env() {
        let config = StoreConfig::from_env();
        assert!(!config.region.is_empty());
    }

    #[test]
    fn test_should_build_with_typed_builder() {
        let config = StoreConfig::builder()
            .endpoint("https://cos.ap-shanghai.myqcloud.com".into())
            .region("ap-shanghai".into())
            .abort_max_attempts(2)
            .abort_backoff_ms(10)
            .build();

        assert_eq!(config.region, "ap-shanghai");
        assert_eq!(config.upload_base_dir, "uploads");
        let policy = config.abort_policy();
        assert_eq!(policy.max_attempts(), 2);
        assert_eq!(policy.backoff_for(1), Duration::from_millis(10));
    }

    #[test]
    fn test_should_resolve_endpoint_from_provider() {
        let mut config = StoreConfig::builder()
            .region("oss-cn-hangzhou".into())
            .provider(Some(StorageProvider::AliyunOss))
            .build();
        assert_eq!(
            config.resolved_endpoint().as_deref(),
            Some("https://oss-cn-hangzhou.aliyuncs.com")
        );
        assert!(!config.path_style());

        config.endpoint = "http://localhost:9000".to_owned();
        assert_eq!(config.resolved_endpoint().as_deref(), Some("http://localhost:9000"));

        config.provider = Some(StorageProvider::Minio);
        assert!(config.path_style());
        assert!(StoreConfig::default().resolved_endpoint().is_none());
    }

    #[test]
    fn test_should_derive_part_limits_from_config() {
        let config = StoreConfig::builder().min_part_size(1024).build();
        let limits = config.part_limits();
        assert_eq!(limits.min_part_size, 1024);
        assert_eq!(limits.max_parts, PartLimits::default().max_parts);
        assert_eq!(
            StoreConfig::default().part_limits().min_part_size,
            MIN_PART_SIZE
        );
    }

    #[test]
    fn test_should_serialize_to_camel_case_json() {
        let config = StoreConfig::default();
        let json = serde_json::to_string(&config).expect("test serialization");
        assert!(json.contains("\"uploadBaseDir\""));
        assert!(json.contains("\"tokenTimeSecs\""));
        assert!(json.contains("\"forcePathStyle\""));
    }

    #[test]
    fn test_should_parse_bool_values() {
        assert!(parse_bool("1"));
        assert!(parse_bool("true"));
        assert!(parse_bool("True"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("yes"));
    }
}
