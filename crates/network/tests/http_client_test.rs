use std::net::TcpListener;

use tcr_network::{Config, HttpClient, NetworkError};

/// Reserves a local port and releases it, so nothing is listening there.
fn closed_local_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/api/tokens/generate", port)
}

#[tokio::test]
async fn test_refused_connection_is_an_error() {
    let client = HttpClient::new(Config::default().with_timeout(2)).unwrap();
    let result: tcr_network::Result<serde_json::Value> =
        client.get_json(&closed_local_url()).await;

    match result {
        Err(NetworkError::Connection(_)) | Err(NetworkError::Http(_)) => {}
        other => panic!("expected a transport error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_non_success_status_is_rejected() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = socket.read(&mut buf).await;
        let _ = socket
            .write_all(b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
            .await;
    });

    let client = HttpClient::new(Config::default()).unwrap();
    let url = format!("http://{}/api/tokens/generate", addr);
    let err = client.get(&url).await.unwrap_err();

    match err {
        NetworkError::Status { status, .. } => assert_eq!(status, 503),
        other => panic!("expected status error, got {}", other),
    }
}

#[tokio::test]
async fn test_get_json_decodes_typed_body() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = socket.read(&mut buf).await;
        let body = r#"["TCR-AB12Z-05","TCR-00000-150"]"#;
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let _ = socket.write_all(response.as_bytes()).await;
    });

    let client = HttpClient::new(Config::default()).unwrap();
    let url = format!("http://{}/api/tokens/generate", addr);
    let codes: Vec<String> = client.get_json(&url).await.unwrap();
    assert_eq!(codes, vec!["TCR-AB12Z-05", "TCR-00000-150"]);
}
