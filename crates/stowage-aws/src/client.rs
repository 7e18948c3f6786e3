//! [`StorageClient`] over `aws-sdk-s3`.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart as AwsCompletedPart,
    CreateBucketConfiguration,
};
use stowage_core::naming::is_like_host;
use stowage_core::provider::StorageProvider;
use stowage_core::{ClientError, RequestBody, StorageClient, StoreConfig};
use stowage_model::{
    BucketSummary, CompletedPart, CompletedUpload, CompletionOrigin, CopyObjectResult, CorsRule,
    DeleteObjectsResult, ListPartsPage, ObjectIdentifier, ObjectPage, ObjectSummary, PartSummary,
    PutObjectResult,
};
use tracing::{debug, info};

use crate::convert::{
    content_length, copy_source, from_aws_cors_rule, from_delete_error, from_deleted_object,
    into_byte_stream, to_chrono, to_cors_configuration, to_delete_request, to_part_number, to_size,
};
use crate::error::{map_sdk_error, missing_field};

/// Region where `CreateBucket` must not carry a location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// Credential provider name reported for keys taken from [`StoreConfig`].
const CREDENTIALS_SOURCE: &str = "stowage-config";

/// S3 client for one endpoint.
///
/// Holds two SDK clients over the same connection settings: one addressing
/// buckets virtual-hosted style and one path style. Buckets whose names look
/// like host names (`assets.example.com`) always go path style, since a
/// dotted bucket breaks TLS on `{bucket}.{endpoint}`.
#[derive(Clone)]
pub struct AwsStorageClient {
    virtual_hosted: Client,
    path_style: Client,
    force_path_style: bool,
    region: String,
    endpoint: Option<String>,
}

impl fmt::Debug for AwsStorageClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsStorageClient")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("force_path_style", &self.force_path_style)
            .finish_non_exhaustive()
    }
}

impl AwsStorageClient {
    /// Build a client from `config`.
    ///
    /// Static keys from the configuration are used when set; otherwise the
    /// default AWS credential chain is loaded.
    pub async fn from_config(config: &StoreConfig) -> Self {
        let builder = if config.access_key.is_empty() {
            let shared = aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(config.region.clone()))
                .load()
                .await;
            aws_sdk_s3::config::Builder::from(&shared)
        } else {
            static_builder(config)
        };
        Self::from_builder(config, builder)
    }

    /// Build a client from `config` using only its static keys, without
    /// touching the environment.
    #[must_use]
    pub fn with_static_credentials(config: &StoreConfig) -> Self {
        Self::from_builder(config, static_builder(config))
    }

    fn from_builder(config: &StoreConfig, builder: aws_sdk_s3::config::Builder) -> Self {
        let endpoint = config.resolved_endpoint();
        let builder = match &endpoint {
            Some(url) => builder.endpoint_url(url),
            None => builder,
        };
        let force_path_style = config.path_style();
        let virtual_hosted =
            Client::from_conf(builder.clone().force_path_style(force_path_style).build());
        let path_style = Client::from_conf(builder.force_path_style(true).build());

        info!(
            region = %config.region,
            endpoint = endpoint.as_deref().unwrap_or("(sdk default)"),
            provider = %endpoint.as_deref().map_or(StorageProvider::Aws, StorageProvider::detect),
            force_path_style,
            "storage client ready"
        );

        Self {
            virtual_hosted,
            path_style,
            force_path_style,
            region: config.region.clone(),
            endpoint,
        }
    }

    /// The SDK client used for requests to `bucket`.
    #[must_use]
    pub fn client_for(&self, bucket: &str) -> &Client {
        if self.force_path_style || is_like_host(bucket) {
            &self.path_style
        } else {
            &self.virtual_hosted
        }
    }

    /// Signing region.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }
}

fn static_builder(config: &StoreConfig) -> aws_sdk_s3::config::Builder {
    let credentials = Credentials::new(
        config.access_key.clone(),
        config.secret_key.clone(),
        None,
        None,
        CREDENTIALS_SOURCE,
    );
    aws_sdk_s3::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .credentials_provider(credentials)
}

#[async_trait]
impl StorageClient for AwsStorageClient {
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<String, ClientError> {
        const OP: &str = "CreateMultipartUpload";
        let output = self
            .client_for(bucket)
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;
        output
            .upload_id()
            .map(str::to_owned)
            .ok_or_else(|| missing_field(OP, "UploadId"))
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: RequestBody,
    ) -> Result<String, ClientError> {
        const OP: &str = "UploadPart";
        let number = to_part_number(OP, part_number)?;
        let (body, length) = into_byte_stream(OP, body).await?;
        let length = length.map(|n| content_length(OP, n)).transpose()?;
        let output = self
            .client_for(bucket)
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(number)
            .set_content_length(length)
            .body(body)
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;
        output
            .e_tag()
            .map(str::to_owned)
            .ok_or_else(|| missing_field(OP, "ETag"))
    }

    async fn upload_part_copy(
        &self,
        source_bucket: &str,
        source_key: &str,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
    ) -> Result<String, ClientError> {
        const OP: &str = "UploadPartCopy";
        let number = to_part_number(OP, part_number)?;
        let output = self
            .client_for(bucket)
            .upload_part_copy()
            .copy_source(copy_source(source_bucket, source_key))
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(number)
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;
        output
            .copy_part_result()
            .and_then(|r| r.e_tag())
            .map(str::to_owned)
            .ok_or_else(|| missing_field(OP, "CopyPartResult.ETag"))
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<CompletedUpload, ClientError> {
        const OP: &str = "CompleteMultipartUpload";
        let completed = parts
            .iter()
            .map(|p| {
                Ok(AwsCompletedPart::builder()
                    .part_number(to_part_number(OP, p.part_number)?)
                    .e_tag(&p.e_tag)
                    .build())
            })
            .collect::<Result<Vec<_>, ClientError>>()?;
        let output = self
            .client_for(bucket)
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;
        Ok(CompletedUpload {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            e_tag: output.e_tag().map(str::to_owned),
            version_id: output.version_id().map(str::to_owned),
            location: output.location().map(str::to_owned),
            expiration: output.expiration().map(str::to_owned),
            server_side_encryption: output
                .server_side_encryption()
                .map(|s| s.as_str().to_owned()),
            origin: CompletionOrigin::Multipart {
                upload_id: upload_id.to_owned(),
                parts: parts.len(),
            },
        })
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), ClientError> {
        self.client_for(bucket)
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| map_sdk_error("AbortMultipartUpload", e))?;
        Ok(())
    }

    async fn list_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number_marker: Option<u32>,
    ) -> Result<ListPartsPage, ClientError> {
        const OP: &str = "ListParts";
        let output = self
            .client_for(bucket)
            .list_parts()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .set_part_number_marker(part_number_marker.map(|m| m.to_string()))
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;

        let parts = output
            .parts()
            .iter()
            .map(|p| PartSummary {
                part_number: p
                    .part_number()
                    .and_then(|n| u32::try_from(n).ok())
                    .unwrap_or_default(),
                e_tag: p.e_tag().unwrap_or_default().to_owned(),
                size: to_size(p.size()),
            })
            .collect();
        let next_part_number_marker = match output.next_part_number_marker() {
            Some(marker) => Some(marker.parse::<u32>().map_err(|_| {
                ClientError::transport(OP, format!("invalid NextPartNumberMarker '{marker}'"))
            })?),
            None => None,
        };
        Ok(ListPartsPage {
            parts,
            is_truncated: output.is_truncated().unwrap_or(false),
            next_part_number_marker,
        })
    }

    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        bucket: &str,
        key: &str,
    ) -> Result<CopyObjectResult, ClientError> {
        let output = self
            .client_for(bucket)
            .copy_object()
            .copy_source(copy_source(source_bucket, source_key))
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error("CopyObject", e))?;
        let result = output.copy_object_result();
        Ok(CopyObjectResult {
            e_tag: result.and_then(|r| r.e_tag()).map(str::to_owned),
            version_id: output.version_id().map(str::to_owned),
            expiration: output.expiration().map(str::to_owned),
            server_side_encryption: output
                .server_side_encryption()
                .map(|s| s.as_str().to_owned()),
            last_modified: result.and_then(|r| r.last_modified()).and_then(to_chrono),
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: RequestBody,
        content_type: Option<&str>,
    ) -> Result<PutObjectResult, ClientError> {
        const OP: &str = "PutObject";
        let (body, length) = into_byte_stream(OP, body).await?;
        let length = length.map(|n| content_length(OP, n)).transpose()?;
        let output = self
            .client_for(bucket)
            .put_object()
            .bucket(bucket)
            .key(key)
            .set_content_type(content_type.map(str::to_owned))
            .set_content_length(length)
            .body(body)
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;
        Ok(PutObjectResult {
            e_tag: output.e_tag().map(str::to_owned),
            version_id: output.version_id().map(str::to_owned),
        })
    }

    async fn download_object(
        &self,
        bucket: &str,
        key: &str,
        destination: &Path,
    ) -> Result<u64, ClientError> {
        const OP: &str = "GetObject";
        let output = self
            .client_for(bucket)
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;

        let io_error = |e: std::io::Error| {
            ClientError::transport(OP, format!("{}: {e}", destination.display()))
        };
        let mut reader = output.body.into_async_read();
        let mut file = tokio::fs::File::create(destination).await.map_err(io_error)?;
        let written = tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(io_error)?;
        debug!(bucket = %bucket, key = %key, written, "object downloaded");
        Ok(written)
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        continuation_token: Option<&str>,
    ) -> Result<ObjectPage, ClientError> {
        let output = self
            .client_for(bucket)
            .list_objects_v2()
            .bucket(bucket)
            .set_prefix(prefix.map(str::to_owned))
            .set_continuation_token(continuation_token.map(str::to_owned))
            .send()
            .await
            .map_err(|e| map_sdk_error("ListObjectsV2", e))?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|o| {
                o.key().map(|key| ObjectSummary {
                    key: key.to_owned(),
                    size: to_size(o.size()),
                    e_tag: o.e_tag().map(str::to_owned),
                    last_modified: o.last_modified().and_then(to_chrono),
                })
            })
            .collect();
        let next_continuation_token = if output.is_truncated() == Some(true) {
            output.next_continuation_token().map(str::to_owned)
        } else {
            None
        };
        Ok(ObjectPage {
            objects,
            next_continuation_token,
        })
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        objects: &[ObjectIdentifier],
    ) -> Result<DeleteObjectsResult, ClientError> {
        const OP: &str = "DeleteObjects";
        if objects.is_empty() {
            return Ok(DeleteObjectsResult::default());
        }
        let output = self
            .client_for(bucket)
            .delete_objects()
            .bucket(bucket)
            .delete(to_delete_request(objects)?)
            .send()
            .await
            .map_err(|e| map_sdk_error(OP, e))?;
        let result = DeleteObjectsResult {
            deleted: output.deleted().iter().filter_map(from_deleted_object).collect(),
            errors: output.errors().iter().map(from_delete_error).collect(),
        };
        debug!(
            bucket = %bucket,
            deleted = result.deleted.len(),
            refused = result.errors.len(),
            "delete batch sent"
        );
        Ok(result)
    }

    async fn list_buckets(&self) -> Result<Vec<BucketSummary>, ClientError> {
        let output = self
            .path_style
            .list_buckets()
            .send()
            .await
            .map_err(|e| map_sdk_error("ListBuckets", e))?;
        Ok(output
            .buckets()
            .iter()
            .filter_map(|b| {
                b.name().map(|name| BucketSummary {
                    name: name.to_owned(),
                    creation_date: b.creation_date().and_then(to_chrono),
                })
            })
            .collect())
    }

    async fn head_bucket(&self, bucket: &str) -> Result<bool, ClientError> {
        match self.client_for(bucket).head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(ctx))
                if ctx.err().is_not_found() || ctx.raw().status().as_u16() == 404 =>
            {
                Ok(false)
            }
            Err(e) => Err(map_sdk_error("HeadBucket", e)),
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), ClientError> {
        let configuration = (self.region != DEFAULT_REGION).then(|| {
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                .build()
        });
        self.client_for(bucket)
            .create_bucket()
            .bucket(bucket)
            .set_create_bucket_configuration(configuration)
            .send()
            .await
            .map_err(|e| map_sdk_error("CreateBucket", e))?;
        Ok(())
    }

    async fn put_bucket_cors(&self, bucket: &str, rules: &[CorsRule]) -> Result<(), ClientError> {
        let configuration = to_cors_configuration(rules)?;
        self.client_for(bucket)
            .put_bucket_cors()
            .bucket(bucket)
            .cors_configuration(configuration)
            .send()
            .await
            .map_err(|e| map_sdk_error("PutBucketCors", e))?;
        Ok(())
    }

    async fn get_bucket_cors(&self, bucket: &str) -> Result<Vec<CorsRule>, ClientError> {
        match self.client_for(bucket).get_bucket_cors().bucket(bucket).send().await {
            Ok(output) => Ok(output.cors_rules().iter().map(from_aws_cors_rule).collect()),
            Err(e) => {
                let err = map_sdk_error("GetBucketCors", e);
                if err.code() == Some("NoSuchCORSConfiguration") {
                    Ok(Vec::new())
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn delete_bucket_cors(&self, bucket: &str) -> Result<(), ClientError> {
        self.client_for(bucket)
            .delete_bucket_cors()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| map_sdk_error("DeleteBucketCors", e))?;
        Ok(())
    }
}
