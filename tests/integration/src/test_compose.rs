//! Server-side compose integration tests.

#[cfg(test)]
mod tests {
    use aws_sdk_s3::primitives::ByteStream;
    use stowage_model::CompletionOrigin;

    use crate::{
        PART_SIZE, cleanup_bucket, create_test_bucket, get_bytes, object_store, payload,
        s3_client,
    };

    async fn put(client: &aws_sdk_s3::Client, bucket: &str, key: &str, data: Vec<u8>) {
        client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .unwrap_or_else(|e| panic!("put {key}: {e}"));
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_compose_prefix_by_part_number() {
        let store = object_store();
        let client = s3_client();
        let bucket = create_test_bucket(&store, "compose").await;

        let chunk = usize::try_from(PART_SIZE).expect("fits");
        let one = payload(chunk, 1);
        let two = payload(chunk, 2);
        let ten = b"tail".to_vec();
        // Listed lexicographically as 1, 10, 2; composed as 1, 2, 10.
        put(&client, &bucket, "job/1", one.clone()).await;
        put(&client, &bucket, "job/10", ten.clone()).await;
        put(&client, &bucket, "job/2", two.clone()).await;

        let done = store
            .compose_prefix(&bucket, Some("job/"), &bucket, "merged.bin")
            .await
            .expect("compose_prefix");
        assert!(matches!(done.origin, CompletionOrigin::Multipart { parts: 3, .. }));

        let data = get_bytes(&client, &bucket, "merged.bin").await;
        let expected: Vec<u8> = [one, two, ten].concat();
        assert_eq!(data.as_ref(), expected.as_slice());

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_copy_single_source_object() {
        let store = object_store();
        let client = s3_client();
        let bucket = create_test_bucket(&store, "copy").await;

        put(&client, &bucket, "only/source.txt", b"single".to_vec()).await;

        let done = store
            .compose_objects(&bucket, ["only/source.txt"], &bucket, "copied.txt")
            .await
            .expect("compose_objects");

        assert_eq!(done.origin, CompletionOrigin::CopyObject);
        assert_eq!(
            get_bytes(&client, &bucket, "copied.txt").await.as_ref(),
            b"single"
        );

        cleanup_bucket(&client, &bucket).await;
    }
}
