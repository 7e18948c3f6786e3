//! Conversions between stowage types and AWS SDK types.

use aws_sdk_s3::primitives::{ByteStream, DateTime as AwsDateTime, Length};
use aws_sdk_s3::types::{
    CorsConfiguration, CorsRule as AwsCorsRule, Delete, DeletedObject, Error as AwsDeleteError,
    ObjectIdentifier as AwsObjectIdentifier,
};
use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use stowage_core::{ClientError, RequestBody};
use stowage_model::{CorsRule, DeleteError, ObjectIdentifier};

/// Characters escaped in an `x-amz-copy-source` key: everything except
/// unreserved characters and `/`.
const COPY_SOURCE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Value of `x-amz-copy-source` for `bucket/key`.
pub(crate) fn copy_source(bucket: &str, key: &str) -> String {
    format!("{bucket}/{}", utf8_percent_encode(key, COPY_SOURCE))
}

/// Turn a [`RequestBody`] into an SDK body and its length, if known.
pub(crate) async fn into_byte_stream(
    operation: &'static str,
    body: RequestBody,
) -> Result<(ByteStream, Option<u64>), ClientError> {
    let length = body.content_length();
    let stream = match body {
        RequestBody::Bytes(bytes) => ByteStream::from(bytes),
        RequestBody::FileRange {
            path,
            offset,
            length,
        } => ByteStream::read_from()
            .path(&path)
            .offset(offset)
            .length(Length::Exact(length))
            .build()
            .await
            .map_err(|e| ClientError::transport(operation, format!("{}: {e}", path.display())))?,
        RequestBody::File(path) => ByteStream::from_path(&path)
            .await
            .map_err(|e| ClientError::transport(operation, format!("{}: {e}", path.display())))?,
        reader @ RequestBody::Reader { .. } => ByteStream::from(
            reader
                .into_bytes()
                .await
                .map_err(|e| ClientError::transport(operation, e.to_string()))?,
        ),
    };
    Ok((stream, length))
}

/// Length as the SDK's signed content length.
pub(crate) fn content_length(
    operation: &'static str,
    length: u64,
) -> Result<i64, ClientError> {
    i64::try_from(length).map_err(|_| {
        ClientError::transport(operation, format!("body of {length} bytes is too large"))
    })
}

/// Part number as the SDK's signed integer.
pub(crate) fn to_part_number(
    operation: &'static str,
    part_number: u32,
) -> Result<i32, ClientError> {
    i32::try_from(part_number).map_err(|_| {
        ClientError::transport(operation, format!("part number {part_number} out of range"))
    })
}

pub(crate) fn to_chrono(time: &AwsDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(time.secs(), time.subsec_nanos())
}

pub(crate) fn to_size(size: Option<i64>) -> u64 {
    size.and_then(|s| u64::try_from(s).ok()).unwrap_or_default()
}

/// Build the SDK CORS configuration from stowage rules.
pub(crate) fn to_cors_configuration(rules: &[CorsRule]) -> Result<CorsConfiguration, ClientError> {
    let rules = rules
        .iter()
        .map(|rule| {
            AwsCorsRule::builder()
                .set_id(rule.id.clone())
                .set_allowed_origins(Some(rule.allowed_origins.clone()))
                .set_allowed_methods(Some(rule.allowed_methods.clone()))
                .set_allowed_headers(non_empty(&rule.allowed_headers))
                .set_expose_headers(non_empty(&rule.expose_headers))
                .set_max_age_seconds(rule.max_age_seconds)
                .build()
                .map_err(|e| ClientError::transport("PutBucketCors", e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    CorsConfiguration::builder()
        .set_cors_rules(Some(rules))
        .build()
        .map_err(|e| ClientError::transport("PutBucketCors", e.to_string()))
}

/// Build a verbose (non-quiet) `DeleteObjects` request body.
pub(crate) fn to_delete_request(objects: &[ObjectIdentifier]) -> Result<Delete, ClientError> {
    let objects = objects
        .iter()
        .map(|o| {
            AwsObjectIdentifier::builder()
                .key(&o.key)
                .set_version_id(o.version_id.clone())
                .build()
                .map_err(|e| ClientError::transport("DeleteObjects", e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Delete::builder()
        .set_objects(Some(objects))
        .quiet(false)
        .build()
        .map_err(|e| ClientError::transport("DeleteObjects", e.to_string()))
}

pub(crate) fn from_deleted_object(deleted: &DeletedObject) -> Option<ObjectIdentifier> {
    deleted.key().map(|key| ObjectIdentifier {
        key: key.to_owned(),
        version_id: deleted.version_id().map(str::to_owned),
    })
}

pub(crate) fn from_delete_error(err: &AwsDeleteError) -> DeleteError {
    DeleteError {
        key: err.key().unwrap_or_default().to_owned(),
        version_id: err.version_id().map(str::to_owned),
        code: err.code().unwrap_or("InternalError").to_owned(),
        message: err.message().unwrap_or_default().to_owned(),
    }
}

/// Convert an SDK CORS rule back into a stowage rule.
pub(crate) fn from_aws_cors_rule(rule: &AwsCorsRule) -> CorsRule {
    CorsRule {
        id: rule.id().map(str::to_owned),
        allowed_origins: rule.allowed_origins().to_vec(),
        allowed_methods: rule.allowed_methods().to_vec(),
        allowed_headers: rule.allowed_headers().to_vec(),
        expose_headers: rule.expose_headers().to_vec(),
        max_age_seconds: rule.max_age_seconds(),
    }
}

fn non_empty(values: &[String]) -> Option<Vec<String>> {
    (!values.is_empty()).then(|| values.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_encode_copy_source_keys() {
        assert_eq!(copy_source("media", "parts/1"), "media/parts/1");
        assert_eq!(
            copy_source("media", "dir/a b+c?.txt"),
            "media/dir/a%20b%2Bc%3F.txt"
        );
        assert_eq!(copy_source("media", "视频/1"), "media/%E8%A7%86%E9%A2%91/1");
    }

    #[test]
    fn test_should_round_trip_cors_rules() {
        let rule = CorsRule {
            id: Some("web".to_owned()),
            allowed_origins: vec!["https://app.example.com".to_owned()],
            allowed_methods: vec!["GET".to_owned(), "PUT".to_owned()],
            allowed_headers: vec![],
            expose_headers: vec!["ETag".to_owned()],
            max_age_seconds: Some(600),
        };
        let config = to_cors_configuration(std::slice::from_ref(&rule)).expect("valid rule");
        assert_eq!(config.cors_rules().len(), 1);
        assert_eq!(from_aws_cors_rule(&config.cors_rules()[0]), rule);
    }

    #[test]
    fn test_should_convert_sizes_and_numbers() {
        assert_eq!(to_size(Some(42)), 42);
        assert_eq!(to_size(Some(-1)), 0);
        assert_eq!(to_size(None), 0);
        assert!(to_part_number("UploadPart", 10_000).is_ok());
        assert!(to_part_number("UploadPart", u32::MAX).is_err());
    }

    #[tokio::test]
    async fn test_should_report_known_body_lengths() {
        let (_, length) = into_byte_stream("PutObject", RequestBody::from_bytes(vec![0u8; 7]))
            .await
            .expect("bytes body");
        assert_eq!(length, Some(7));
    }

    #[test]
    fn test_should_build_versioned_delete_request() {
        let request = to_delete_request(&[
            ObjectIdentifier::new("a"),
            ObjectIdentifier::versioned("b", "v2"),
        ])
        .expect("valid request");
        assert_eq!(request.quiet(), Some(false));
        let objects = request.objects();
        assert_eq!(objects[0].key(), "a");
        assert_eq!(objects[0].version_id(), None);
        assert_eq!(objects[1].version_id(), Some("v2"));
    }

    #[test]
    fn test_should_default_missing_delete_error_fields() {
        let err = AwsDeleteError::builder().key("locked").build();
        let converted = from_delete_error(&err);
        assert_eq!(converted.key, "locked");
        assert_eq!(converted.code, "InternalError");
        assert!(converted.message.is_empty());
    }
}
