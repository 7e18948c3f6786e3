//! Abort-and-verify integration tests.

#[cfg(test)]
mod tests {
    use std::io::Write;

    use aws_sdk_s3::primitives::ByteStream;
    use tokio::sync::watch;

    use crate::{cleanup_bucket, create_test_bucket, object_store, open_uploads, payload, s3_client};

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_abort_open_upload_and_verify() {
        let store = object_store();
        let client = s3_client();
        let bucket = create_test_bucket(&store, "abort").await;

        let create = client
            .create_multipart_upload()
            .bucket(&bucket)
            .key("dangling.bin")
            .send()
            .await
            .expect("create");
        let upload_id = create.upload_id().expect("upload_id").to_owned();
        client
            .upload_part()
            .bucket(&bucket)
            .key("dangling.bin")
            .upload_id(&upload_id)
            .part_number(1)
            .body(ByteStream::from(vec![0xAAu8; 1024]))
            .send()
            .await
            .expect("upload part");

        let parts = store
            .list_parts(&bucket, "dangling.bin", &upload_id)
            .await
            .expect("list_parts");
        assert_eq!(parts.len(), 1);

        let outcome = store
            .abort_multipart_upload(&bucket, "dangling.bin", &upload_id)
            .await
            .expect("abort");
        assert!(outcome.is_clean(), "abort should be confirmed: {outcome:?}");
        assert_eq!(open_uploads(&client, &bucket).await, 0);

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_leave_nothing_behind_when_cancelled() {
        let client = s3_client();
        let (tx, rx) = watch::channel(false);
        let store = object_store().with_cancel(rx);
        let bucket = create_test_bucket(&store, "cancel").await;

        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(&payload(12 * 1024 * 1024, 3)).expect("write");
        tx.send(true).expect("receiver alive");

        let err = store
            .upload_file(&bucket, "cancelled.bin", file.path())
            .await
            .expect_err("cancelled upload must fail");

        assert!(err.cleanup_confirmed(), "cleanup should be confirmed: {err}");
        assert_eq!(open_uploads(&client, &bucket).await, 0);

        cleanup_bucket(&client, &bucket).await;
    }
}
