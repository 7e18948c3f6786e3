//! Folder upload and download integration tests.

#[cfg(test)]
mod tests {
    use crate::{cleanup_bucket, create_test_bucket, object_store, s3_client};

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_round_trip_folder() {
        let store = object_store();
        let client = s3_client();
        let bucket = create_test_bucket(&store, "folder").await;

        let source = tempfile::tempdir().expect("temp dir");
        let root = source.path().join("site");
        tokio::fs::create_dir_all(root.join("css")).await.expect("mkdir");
        tokio::fs::write(root.join("index.html"), b"<html></html>")
            .await
            .expect("write");
        tokio::fs::write(root.join("css/app.css"), b"body {}")
            .await
            .expect("write");

        let uploaded = store.upload_folder(&bucket, &root).await.expect("upload_folder");
        assert_eq!(uploaded.len(), 2);
        let first = uploaded[0].key().to_owned();
        let prefix = first
            .strip_suffix("/site/css/app.css")
            .expect("keys keep the folder layout");
        assert!(uploaded.iter().any(|o| o.key() == format!("{prefix}/site/index.html")));

        let target = tempfile::tempdir().expect("temp dir");
        let written = store
            .download_folder(&bucket, Some(&format!("{prefix}/site")), target.path())
            .await
            .expect("download_folder");
        assert_eq!(written.len(), 2);
        assert_eq!(
            tokio::fs::read(target.path().join("site/css/app.css"))
                .await
                .expect("read"),
            b"body {}"
        );
        assert_eq!(
            tokio::fs::read(target.path().join("site/index.html"))
                .await
                .expect("read"),
            b"<html></html>"
        );

        cleanup_bucket(&client, &bucket).await;
    }
}
