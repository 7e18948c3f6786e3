//! S3-compatible storage providers and their regional endpoints.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A known S3-compatible service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    /// Amazon S3.
    Aws,
    /// Tencent Cloud COS.
    #[serde(rename = "tencent")]
    TencentCos,
    /// Aliyun OSS.
    #[serde(rename = "aliyun")]
    AliyunOss,
    /// Huawei Cloud OBS.
    #[serde(rename = "huawei")]
    HuaweiObs,
    /// Qiniu Kodo.
    Qiniu,
    /// Self-hosted MinIO.
    Minio,
    /// Any other S3-compatible endpoint.
    #[serde(rename = "s3")]
    Generic,
}

impl StorageProvider {
    /// Every provider, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Aws,
        Self::TencentCos,
        Self::AliyunOss,
        Self::HuaweiObs,
        Self::Qiniu,
        Self::Minio,
        Self::Generic,
    ];

    /// Short configuration key (`aws`, `tencent`, `aliyun`, ...).
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::TencentCos => "tencent",
            Self::AliyunOss => "aliyun",
            Self::HuaweiObs => "huawei",
            Self::Qiniu => "qiniu",
            Self::Minio => "minio",
            Self::Generic => "s3",
        }
    }

    /// Public endpoint for `region`, or `None` for self-hosted providers.
    ///
    /// # Examples
    ///
    /// ```
    /// use stowage_core::provider::StorageProvider;
    ///
    /// assert_eq!(
    ///     StorageProvider::TencentCos.endpoint_for("ap-shanghai", true).as_deref(),
    ///     Some("https://cos.ap-shanghai.myqcloud.com"),
    /// );
    /// assert_eq!(StorageProvider::Minio.endpoint_for("us-east-1", true), None);
    /// ```
    #[must_use]
    pub fn endpoint_for(self, region: &str, secure: bool) -> Option<String> {
        let host = match self {
            Self::Aws => format!("s3.{region}.amazonaws.com"),
            Self::TencentCos => format!("cos.{region}.myqcloud.com"),
            Self::AliyunOss if region.starts_with("oss-") => format!("{region}.aliyuncs.com"),
            Self::AliyunOss => format!("oss-{region}.aliyuncs.com"),
            Self::HuaweiObs => format!("obs.{region}.myhuaweicloud.com"),
            Self::Qiniu => format!("s3-{region}.qiniucs.com"),
            Self::Minio | Self::Generic => return None,
        };
        let scheme = if secure { "https" } else { "http" };
        Some(format!("{scheme}://{host}"))
    }

    /// Guess the provider from an endpoint URL.
    #[must_use]
    pub fn detect(endpoint: &str) -> Self {
        let host = endpoint
            .split("://")
            .last()
            .unwrap_or(endpoint)
            .split(['/', ':'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        if host.ends_with(".amazonaws.com") {
            Self::Aws
        } else if host.ends_with(".myqcloud.com") {
            Self::TencentCos
        } else if host.ends_with(".aliyuncs.com") {
            Self::AliyunOss
        } else if host.ends_with(".myhuaweicloud.com") {
            Self::HuaweiObs
        } else if host.ends_with(".qiniucs.com") {
            Self::Qiniu
        } else if host.contains("minio") {
            Self::Minio
        } else {
            Self::Generic
        }
    }

    /// Whether buckets are usually addressed path-style on this provider.
    #[must_use]
    pub fn prefers_path_style(self) -> bool {
        matches!(self, Self::Minio | Self::Generic)
    }
}

impl fmt::Display for StorageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// An unrecognized provider key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown storage provider '{0}'")]
pub struct UnknownProvider(pub String);

impl FromStr for StorageProvider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.key().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownProvider(s.to_owned()))
    }
}
