//! Multipart upload integration tests.

#[cfg(test)]
mod tests {
    use std::io::Write;

    use stowage_core::RequestBody;
    use stowage_model::CompletionOrigin;

    use crate::{
        PART_SIZE, cleanup_bucket, create_test_bucket, get_bytes, object_store, open_uploads,
        payload, s3_client,
    };

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_upload_file_in_slices() {
        let store = object_store();
        let client = s3_client();
        let bucket = create_test_bucket(&store, "slices").await;

        let data = payload(12 * 1024 * 1024, 7);
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(&data).expect("write");

        let done = store
            .upload_file(&bucket, "videos/clip.bin", file.path())
            .await
            .expect("upload_file");

        assert_eq!(done.key, "videos/clip.bin");
        assert!(done.e_tag.is_some(), "completed upload should have etag");
        let CompletionOrigin::Multipart { parts, .. } = done.origin else {
            panic!("expected multipart completion");
        };
        assert_eq!(parts, 3);
        assert_eq!(get_bytes(&client, &bucket, "videos/clip.bin").await, data);
        assert_eq!(open_uploads(&client, &bucket).await, 0);

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_upload_body_list_in_order() {
        let store = object_store();
        let client = s3_client();
        let bucket = create_test_bucket(&store, "bodies").await;

        let first = payload(usize::try_from(PART_SIZE).expect("fits"), 1);
        let second = vec![0xBBu8; 1024];
        let bodies = vec![
            RequestBody::from_bytes(first.clone()),
            RequestBody::from_bytes(second.clone()),
        ];

        let done = store
            .upload_bodies(&bucket, "joined.bin", bodies)
            .await
            .expect("upload_bodies");
        assert!(done.is_multipart());

        let data = get_bytes(&client, &bucket, "joined.bin").await;
        assert_eq!(data.len(), first.len() + second.len());
        assert_eq!(&data[..first.len()], first.as_slice());
        assert_eq!(&data[first.len()..], second.as_slice());

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_put_small_files_in_one_request() {
        let store = object_store();
        let client = s3_client();
        let bucket = create_test_bucket(&store, "put").await;

        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"hello stowage").expect("write");

        let outcome = store
            .put_file(&bucket, "notes/hello.txt", file.path())
            .await
            .expect("put_file");

        assert!(!outcome.is_multipart());
        assert_eq!(
            get_bytes(&client, &bucket, "notes/hello.txt").await.as_ref(),
            b"hello stowage"
        );

        cleanup_bucket(&client, &bucket).await;
    }
}
