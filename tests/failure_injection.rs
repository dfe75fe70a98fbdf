//! Failure injection tests for the proxy pipeline.

use std::time::Duration;

use axum::http::StatusCode;
use ladder::config::ProxyConfig;

mod common;
use common::{
    client, proxied, start_mock_upstream, start_raw_backend, start_streaming_backend, MockResponse,
};

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    let proxy = common::start_proxy(ProxyConfig::default()).await;

    // bind then drop to get a port with nothing listening
    let closed = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();

    let res = client()
        .get(proxied(proxy, &format!("http://{}/", closed)))
        .send()
        .await
        .expect("Proxy unreachable");
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body = res.text().await.unwrap();
    assert!(body.starts_with(&format!("proxy chain error for 'http://{}/'", closed)));
}

#[tokio::test]
async fn test_slow_upstream_times_out() {
    let upstream = start_mock_upstream(|_| async {
        tokio::time::sleep(Duration::from_secs(3)).await;
        MockResponse::text("late")
    })
    .await;
    let mut config = ProxyConfig::default();
    config.upstream.timeout_secs = 1;
    let proxy = common::start_proxy(config).await;

    let res = client()
        .get(proxied(proxy, &format!("http://{}/", upstream)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn test_slow_body_outlives_dispatch_timeout() {
    let upstream = start_raw_backend(|| {
        let mut chunks = vec![
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 4000\r\n\r\n".to_vec(),
        ];
        chunks.extend((0..80).map(|_| vec![b'z'; 50]));
        chunks
    })
    .await;
    let mut config = ProxyConfig::default();
    config.upstream.timeout_secs = 1;
    let proxy = common::start_proxy(config).await;

    let mut res = client()
        .get(proxied(proxy, &format!("http://{}/", upstream)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let started = std::time::Instant::now();
    let mut received = 0;
    while let Some(chunk) = res.chunk().await.unwrap() {
        received += chunk.len();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(received, 4000);
    assert!(started.elapsed() > Duration::from_secs(1));
}

#[tokio::test]
async fn test_client_disconnect_stops_upstream_read() {
    let (upstream, stopped) =
        start_streaming_backend(vec![b'x'; 1024], Duration::from_millis(20)).await;
    let proxy = common::start_proxy(ProxyConfig::default()).await;

    let mut res = client()
        .get(proxied(proxy, &format!("http://{}/", upstream)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.chunk().await.unwrap().is_some());
    drop(res);

    let written = tokio::time::timeout(Duration::from_secs(10), stopped)
        .await
        .expect("upstream kept streaming after the client left")
        .unwrap();
    assert!(written >= 1);
}

#[tokio::test]
async fn test_upstream_error_status_passes_through() {
    let upstream =
        start_mock_upstream(|_| async { MockResponse::new(503, "text/plain", "maintenance") }).await;
    let proxy = common::start_proxy(ProxyConfig::default()).await;

    let res = client()
        .get(proxied(proxy, &format!("http://{}/", upstream)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.text().await.unwrap(), "maintenance");
}

#[tokio::test]
async fn test_truncated_upstream_body_truncates_stream() {
    let upstream = start_raw_backend(|| {
        vec![
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 1000\r\n\r\n".to_vec(),
            vec![b'a'; 100],
        ]
    })
    .await;
    let proxy = common::start_proxy(ProxyConfig::default()).await;

    let res = client()
        .get(proxied(proxy, &format!("http://{}/", upstream)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    match res.bytes().await {
        Ok(bytes) => assert!(bytes.len() < 1000),
        Err(_) => {}
    }
}

#[tokio::test]
async fn test_malformed_targets_rejected() {
    let proxy = common::start_proxy(ProxyConfig::default()).await;

    for target in ["ftp://example.com/file", "http://", ""] {
        let res = client().get(proxied(proxy, target)).send().await.unwrap();
        assert_eq!(
            res.status(),
            StatusCode::BAD_REQUEST,
            "target {:?} should be rejected",
            target
        );
    }
}

#[tokio::test]
async fn test_unsupported_method_rejected() {
    let upstream = start_mock_upstream(|_| async { MockResponse::text("ok") }).await;
    let proxy = common::start_proxy(ProxyConfig::default()).await;

    let res = client()
        .request(
            reqwest::Method::from_bytes(b"PROPFIND").unwrap(),
            proxied(proxy, &format!("http://{}/", upstream)),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
}
