//! CORS configuration documents.
//!
//! Parses bucket CORS rules from the S3 XML form
//! (`<CORSConfiguration><CORSRule>...</CORSRule></CORSConfiguration>`) and
//! from the equivalent JSON form (an array of rule objects, or a single
//! object). In both forms every list field may hold one value or several,
//! and `MaxAgeSeconds` may be a number or a numeric string.

use serde::Deserialize;
use stowage_model::CorsRule;

use crate::error::StoreError;

// ---------------------------------------------------------------------------
// XML
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct XmlCorsConfiguration {
    #[serde(rename = "CORSRule", default)]
    rules: Vec<XmlCorsRule>,
}

#[derive(Debug, Deserialize)]
struct XmlCorsRule {
    #[serde(rename = "ID")]
    id: Option<String>,
    #[serde(rename = "AllowedOrigin", default)]
    allowed_origins: Vec<String>,
    #[serde(rename = "AllowedMethod", default)]
    allowed_methods: Vec<String>,
    #[serde(rename = "AllowedHeader", default)]
    allowed_headers: Vec<String>,
    #[serde(rename = "ExposeHeader", default)]
    expose_headers: Vec<String>,
    #[serde(rename = "MaxAgeSeconds")]
    max_age_seconds: Option<String>,
}

/// Parse an S3 `CORSConfiguration` XML document.
///
/// # Errors
///
/// Returns [`StoreError::Cors`] if the document is malformed or a rule lacks
/// an origin or a method.
///
/// # Examples
///
/// ```
/// use stowage_core::cors::parse_cors_xml;
///
/// let rules = parse_cors_xml(
///     "<CORSConfiguration><CORSRule>\
///      <AllowedOrigin>*</AllowedOrigin><AllowedMethod>GET</AllowedMethod>\
///      </CORSRule></CORSConfiguration>",
/// )
/// .unwrap();
/// assert_eq!(rules[0].allowed_methods, ["GET"]);
/// ```
pub fn parse_cors_xml(xml: &str) -> Result<Vec<CorsRule>, StoreError> {
    let doc: XmlCorsConfiguration =
        quick_xml::de::from_str(xml).map_err(|e| StoreError::Cors(e.to_string()))?;
    doc.rules
        .into_iter()
        .map(|r| {
            let max_age_seconds = r
                .max_age_seconds
                .as_deref()
                .map(parse_max_age)
                .transpose()?;
            check_rule(CorsRule {
                id: r.id,
                allowed_origins: r.allowed_origins,
                allowed_methods: r.allowed_methods,
                allowed_headers: r.allowed_headers,
                expose_headers: r.expose_headers,
                max_age_seconds,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for Vec<String> {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(v) => vec![v],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MaxAge {
    Number(i64),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonCorsRule {
    #[serde(rename = "ID")]
    id: Option<String>,
    #[serde(rename = "AllowedOrigin")]
    allowed_origins: Option<OneOrMany>,
    #[serde(rename = "AllowedMethod")]
    allowed_methods: Option<OneOrMany>,
    #[serde(rename = "AllowedHeader")]
    allowed_headers: Option<OneOrMany>,
    #[serde(rename = "ExposeHeader")]
    expose_headers: Option<OneOrMany>,
    #[serde(rename = "MaxAgeSeconds")]
    max_age_seconds: Option<MaxAge>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonCorsDocument {
    Many(Vec<JsonCorsRule>),
    One(JsonCorsRule),
}

/// Parse CORS rules from JSON: an array of rule objects or a single one.
///
/// Keys use the XML element names (`AllowedOrigin`, `AllowedMethod`,
/// `AllowedHeader`, `ExposeHeader`, `MaxAgeSeconds`, `ID`); unknown keys are
/// rejected.
///
/// # Errors
///
/// Returns [`StoreError::Cors`] if the document is malformed or a rule lacks
/// an origin or a method.
pub fn parse_cors_json(json: &str) -> Result<Vec<CorsRule>, StoreError> {
    let doc: JsonCorsDocument =
        serde_json::from_str(json).map_err(|e| StoreError::Cors(e.to_string()))?;
    let rules = match doc {
        JsonCorsDocument::Many(rules) => rules,
        JsonCorsDocument::One(rule) => vec![rule],
    };
    rules
        .into_iter()
        .map(|r| {
            let max_age_seconds = match r.max_age_seconds {
                None => None,
                Some(MaxAge::Number(n)) => Some(
                    i32::try_from(n)
                        .map_err(|_| StoreError::Cors(format!("MaxAgeSeconds {n} out of range")))?,
                ),
                Some(MaxAge::Text(s)) => Some(parse_max_age(&s)?),
            };
            check_rule(CorsRule {
                id: r.id,
                allowed_origins: r.allowed_origins.map(Into::into).unwrap_or_default(),
                allowed_methods: r.allowed_methods.map(Into::into).unwrap_or_default(),
                allowed_headers: r.allowed_headers.map(Into::into).unwrap_or_default(),
                expose_headers: r.expose_headers.map(Into::into).unwrap_or_default(),
                max_age_seconds,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Shared
// ---------------------------------------------------------------------------

/// Rules applied when `auto_config_cors` is enabled: any origin may `GET`,
/// `PUT`, `POST`, `DELETE` and `HEAD` with any header, and read the `ETag`.
#[must_use]
pub fn default_cors_rules() -> Vec<CorsRule> {
    vec![CorsRule {
        id: Some("stowage-default".to_owned()),
        allowed_origins: vec!["*".to_owned()],
        allowed_methods: ["GET", "PUT", "POST", "DELETE", "HEAD"]
            .into_iter()
            .map(str::to_owned)
            .collect(),
        allowed_headers: vec!["*".to_owned()],
        expose_headers: vec!["ETag".to_owned()],
        max_age_seconds: Some(3000),
    }]
}

fn parse_max_age(value: &str) -> Result<i32, StoreError> {
    value
        .trim()
        .parse()
        .map_err(|_| StoreError::Cors(format!("MaxAgeSeconds '{value}' is not a number")))
}

fn check_rule(rule: CorsRule) -> Result<CorsRule, StoreError> {
    if rule.allowed_origins.is_empty() {
        return Err(StoreError::Cors("rule has no AllowedOrigin".to_owned()));
    }
    if rule.allowed_methods.is_empty() {
        return Err(StoreError::Cors("rule has no AllowedMethod".to_owned()));
    }
    Ok(rule)
}
