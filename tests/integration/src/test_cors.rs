//! Bucket CORS integration tests.

#[cfg(test)]
mod tests {
    use crate::{cleanup_bucket, create_test_bucket, object_store, s3_client};

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_apply_cors_document() {
        let store = object_store();
        let client = s3_client();
        let bucket = create_test_bucket(&store, "cors").await;

        let document = r#"<CORSConfiguration>
  <CORSRule>
    <AllowedOrigin>https://app.example.com</AllowedOrigin>
    <AllowedMethod>GET</AllowedMethod>
    <AllowedMethod>PUT</AllowedMethod>
    <AllowedHeader>*</AllowedHeader>
    <MaxAgeSeconds>600</MaxAgeSeconds>
  </CORSRule>
</CORSConfiguration>"#;
        store
            .configure_cors_document(&bucket, document)
            .await
            .expect("configure_cors_document");

        let rules = store.bucket_cors(&bucket).await.expect("bucket_cors");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].allowed_origins, vec!["https://app.example.com"]);
        assert_eq!(rules[0].allowed_methods, vec!["GET", "PUT"]);
        assert_eq!(rules[0].max_age_seconds, Some(600));

        cleanup_bucket(&client, &bucket).await;
    }
}
