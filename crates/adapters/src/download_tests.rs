use super::fake::FakeDownloader;
use super::*;

#[tokio::test]
async fn fake_downloader_writes_scripted_bytes_to_dest() {
    let downloader = FakeDownloader::new();
    downloader.push_success(b"archive-bytes".to_vec());

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("pkg.zip");
    let written = downloader.download("https://example.invalid/pkg.zip", &dest).await.unwrap();

    assert_eq!(written, 13);
    assert_eq!(std::fs::read(&dest).unwrap(), b"archive-bytes");
}

#[tokio::test]
async fn fake_downloader_replays_scripted_failure_then_success() {
    let downloader = FakeDownloader::new();
    downloader.push_failure(DownloadError::Status { url: "u".into(), status: 503 });
    downloader.push_success(b"ok".to_vec());

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("pkg.zip");

    let first = downloader.download("u", &dest).await;
    assert!(first.is_err());
    let second = downloader.download("u", &dest).await;
    assert!(second.is_ok());
}

#[tokio::test]
async fn fake_downloader_defaults_to_a_404_when_queue_is_empty() {
    let downloader = FakeDownloader::new();
    let dir = tempfile::tempdir().unwrap();
    let err = downloader.download("u", &dir.path().join("x")).await.unwrap_err();
    assert!(matches!(err, DownloadError::Status { status: 404, .. }));
}

#[test]
fn status_4xx_is_not_retryable_but_5xx_is() {
    let client_error = DownloadError::Status { url: "u".into(), status: 404 };
    let server_error = DownloadError::Status { url: "u".into(), status: 503 };
    assert!(!client_error.is_retryable());
    assert!(server_error.is_retryable());
}
