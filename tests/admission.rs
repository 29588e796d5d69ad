//! Admission control over a real listener.

use std::time::Duration;

use axum::http::StatusCode;

mod common;

#[tokio::test]
async fn rate_limit_headers_and_rejection() {
    let mut config = common::test_config();
    config.rate_limit.max_requests = 3;
    let server = common::start_server(config).await;
    let client = common::client();

    for expected_remaining in ["2", "1", "0"] {
        let res = client.get(server.url("/")).send().await.expect("server unreachable");
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(res.headers()["ratelimit-limit"], "3");
        assert_eq!(res.headers()["ratelimit-remaining"], expected_remaining);
        assert!(res.headers().contains_key("ratelimit-reset"));
    }

    let res = client.get(server.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(res.headers().contains_key("retry-after"));
    assert!(!res.headers().contains_key("x-ratelimit-limit"));
    assert!(!res.headers().contains_key("x-ratelimit-remaining"));
    assert_eq!(
        res.text().await.unwrap(),
        "You have exceeded the 3 requests in 24 hrs limit!"
    );
}

#[tokio::test]
async fn overload_sheds_until_lag_recovers() {
    let server = common::start_server(common::test_config()).await;
    let client = common::client();

    server.lag.set(Duration::from_millis(600));
    let res = client.get(server.url("/missing")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.text().await.unwrap(), "Server too busy!");

    server.lag.set(Duration::from_millis(10));
    let res = client.get(server.url("/missing")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.text().await.unwrap(), "Cannot GET /missing");
}

#[tokio::test]
async fn unavailable_lag_source_fails_open() {
    let server = common::start_server(common::test_config()).await;
    server.lag.clear();

    let res = common::client().get(server.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn plaintext_requests_are_redirected_or_refused() {
    let mut config = common::test_config();
    config.security.enforce_https = true;
    config.security.trust_proxy = true;
    let server = common::start_server(config).await;
    let client = common::client();

    let res = client.get(server.url("/docs?page=2")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(
        res.headers()["location"],
        format!("https://{}/docs?page=2", server.addr).as_str()
    );

    let res = client.post(server.url("/submit")).body("x").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        res.text().await.unwrap(),
        "Please use HTTPS when submitting data to this server."
    );

    let res = client
        .get(server.url("/docs"))
        .header("x-forwarded-proto", "https")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn forwarded_proto_is_ignored_by_default() {
    let mut config = common::test_config();
    config.security.enforce_https = true;
    let server = common::start_server(config).await;

    let res = common::client()
        .get(server.url("/docs"))
        .header("x-forwarded-proto", "https")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::MOVED_PERMANENTLY);
}

#[tokio::test]
async fn responses_carry_request_id() {
    let server = common::start_server(common::test_config()).await;
    let client = common::client();

    let res = client.get(server.url("/")).send().await.unwrap();
    assert!(res.headers().contains_key("x-request-id"));

    let res = client
        .get(server.url("/"))
        .header("x-request-id", "client-chosen")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "client-chosen");
}

#[tokio::test]
async fn server_stops_on_shutdown() {
    let server = common::start_server(common::test_config()).await;
    let addr = server.addr;
    server.shutdown.trigger();

    tokio::time::sleep(Duration::from_millis(200)).await;
    let result = common::client()
        .get(format!("http://{}/", addr))
        .timeout(Duration::from_secs(2))
        .send()
        .await;
    assert!(result.is_err());
}
