//! Bucket CORS rules.

use serde::{Deserialize, Serialize};

/// A single CORS rule as applied to a bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorsRule {
    /// Optional rule identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Origins allowed to make cross-origin requests (`*` for any).
    pub allowed_origins: Vec<String>,
    /// HTTP methods allowed (`GET`, `PUT`, `POST`, `DELETE`, `HEAD`).
    pub allowed_methods: Vec<String>,
    /// Request headers allowed in preflight requests.
    #[serde(default)]
    pub allowed_headers: Vec<String>,
    /// Response headers exposed to the browser.
    #[serde(default)]
    pub expose_headers: Vec<String>,
    /// How long a preflight response may be cached, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age_seconds: Option<i32>,
}
