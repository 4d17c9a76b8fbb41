//! Reusable test helpers for HTTP and WebSocket integration tests.
//!
//! Provides `TestApp` for sending requests through the full axum router via
//! `tower::ServiceExt::oneshot`, plus utilities for JSON bodies.
//!
//! ## Test Servers
//!
//! Use [`spawn_test_server()`] when a test needs a real listening socket
//! (WebSocket carriers, full meeting flows) instead of `oneshot`.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{self, Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use vv_server::api::{create_router, AppState};
use vv_server::config::Config;
use vv_server::engine::{MediaEngine, StubEngine};

// ============================================================================
// Test App
// ============================================================================

/// A test application wrapping the full axum router.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

impl TestApp {
    /// Create a test app backed by a ready stub engine.
    pub fn new() -> Self {
        Self::with_engine(Arc::new(StubEngine::new()))
    }

    /// Create a test app backed by a specific engine.
    pub fn with_engine(engine: Arc<dyn MediaEngine>) -> Self {
        let state = AppState::new(Config::default_for_test(), engine);
        let router = create_router(state.clone());
        Self { router, state }
    }

    /// Build an HTTP request with the given method and URI.
    pub fn request(method: Method, uri: &str) -> http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    /// Send a request through the router via `tower::ServiceExt::oneshot`.
    pub async fn oneshot(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot request failed")
    }

    /// GET a path.
    pub async fn get(&self, uri: &str) -> Response<Body> {
        let request = Self::request(Method::GET, uri)
            .body(Body::empty())
            .expect("Failed to build GET request");
        self.oneshot(request).await
    }

    /// POST a JSON body to a path.
    pub async fn post_json(&self, uri: &str, body: &serde_json::Value) -> Response<Body> {
        let request = Self::request(Method::POST, uri)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("Failed to build POST request");
        self.oneshot(request).await
    }
}

/// Collect a response body and parse it as JSON.
pub async fn body_to_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to collect response body")
        .to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        let preview = String::from_utf8_lossy(&bytes);
        panic!("Failed to parse response as JSON: {e}\nBody: {preview}")
    })
}

// ============================================================================
// Test Server
// ============================================================================

/// A running test server bound to a random port.
pub struct TestServer {
    /// Server address (127.0.0.1:PORT).
    pub addr: SocketAddr,
    /// Base URL for HTTP requests (e.g., `http://127.0.0.1:12345`).
    pub url: String,
    /// Handle to the server task for cleanup.
    _handle: JoinHandle<()>,
}

/// Spawn a real HTTP server on a random port.
///
/// Serves with connect info exactly like `main`, since the WebSocket
/// handler extracts the peer address.
pub async fn spawn_test_server(router: Router) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local addr");
    let url = format!("http://{addr}");

    let handle = tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("Test server failed");
    });

    TestServer {
        addr,
        url,
        _handle: handle,
    }
}
