//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{body::Body, extract::ConnectInfo, http::Request, Router};
use gatekeeper::config::GatekeeperConfig;
use gatekeeper::http::HttpServer;
use gatekeeper::lifecycle::Shutdown;
use gatekeeper::resilience::ManualLag;
use tokio::net::TcpListener;

/// Config for tests: loopback, any port, HTTPS enforcement off.
#[allow(dead_code)]
pub fn test_config() -> GatekeeperConfig {
    let mut config = GatekeeperConfig::default();
    config.listener.host = "127.0.0.1".into();
    config.listener.port = 0;
    config.security.enforce_https = false;
    config
}

/// A server running on a real socket.
#[allow(dead_code)]
pub struct TestServer {
    pub addr: SocketAddr,
    pub lag: Arc<ManualLag>,
    pub shutdown: Shutdown,
}

#[allow(dead_code)]
impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start the full server on an ephemeral loopback port.
#[allow(dead_code)]
pub async fn start_server(config: GatekeeperConfig) -> TestServer {
    let lag = Arc::new(ManualLag::new());
    let server = HttpServer::new(config, lag.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let stop = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, stop).await;
    });

    TestServer {
        addr,
        lag,
        shutdown,
    }
}

/// Client that never pools connections or uses a system proxy.
#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// Application whose fallback counts how often it was reached.
#[allow(dead_code)]
pub fn counting_app() -> (Router, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new().fallback(move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            "reached"
        }
    });
    (app, hits)
}

/// Request as if it arrived from `peer` over a socket.
#[allow(dead_code)]
pub fn request_from(peer: [u8; 4], method: &str, uri: &str) -> Request<Body> {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((peer, 40_000))));
    request
}
