//! Local command endpoint
//!
//! Exposes a single write-only route, `POST /serial`. The whole request body is
//! one device line. Default address: localhost:6332

use async_trait::async_trait;
use axum::{
    extract::{rejection::BytesRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::{Line, LineSender, LineSource};
use crate::error::TransportError;
use crate::slider::strip_line_terminator;

/// Default local endpoint address
pub const DEFAULT_BIND_ADDRESS: &str = "localhost:6332";

/// The only route served
pub const SERIAL_ROUTE: &str = "/serial";

/// Endpoint error response
#[derive(Debug, Serialize)]
struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    error: &'static str,
}

impl ApiError {
    fn invalid_data() -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: "invalid data",
        }
    }

    fn bridge_stopped() -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            error: "bridge stopped",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Build the endpoint router, forwarding accepted commands into `lines`
pub fn build_router(lines: LineSender) -> Router {
    Router::new()
        .route(SERIAL_ROUTE, post(post_serial))
        .with_state(lines)
}

/// POST /serial - forward the request body as one line
///
/// Unreadable or non-UTF-8 bodies are rejected and never forwarded. A 201 means
/// the controller loop has taken the line.
async fn post_serial(
    State(lines): State<LineSender>,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<String>), ApiError> {
    let body = body.map_err(|e| {
        warn!("Failed to read serial command body: {}", e);
        ApiError::invalid_data()
    })?;
    let text = std::str::from_utf8(&body).map_err(|e| {
        warn!("Serial command body is not UTF-8: {}", e);
        ApiError::invalid_data()
    })?;

    let command = strip_line_terminator(text).to_string();
    debug!("Serial command received: {:?}", command);

    // The channel serializes concurrent requests into the controller loop.
    // Answer only once the loop has taken the line, not when it is queued.
    let (line, taken) = Line::with_receipt(command.clone());
    lines
        .send(line)
        .await
        .map_err(|_| ApiError::bridge_stopped())?;
    taken.await.map_err(|_| {
        debug!("Serial command {:?} dropped before processing", command);
        ApiError::bridge_stopped()
    })?;

    Ok((
        StatusCode::CREATED,
        Json(format!("Accepted serial command {}", command)),
    ))
}

enum Binding {
    Address(String),
    Listener(TcpListener),
}

pub struct HttpLineSource {
    name: String,
    binding: Binding,
}

impl HttpLineSource {
    /// Bind `address` when the bridge starts
    pub fn bind(address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            name: format!("http:{}", address),
            binding: Binding::Address(address),
        }
    }

    /// Serve on an already-bound listener
    pub fn from_listener(listener: TcpListener) -> Self {
        let name = match listener.local_addr() {
            Ok(addr) => format!("http:{}", addr),
            Err(_) => "http:listener".to_string(),
        };
        Self {
            name,
            binding: Binding::Listener(listener),
        }
    }
}

impl Default for HttpLineSource {
    fn default() -> Self {
        Self::bind(DEFAULT_BIND_ADDRESS)
    }
}

#[async_trait]
impl LineSource for HttpLineSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(self: Box<Self>, lines: LineSender) -> Result<(), TransportError> {
        let listener = match self.binding {
            Binding::Address(address) => TcpListener::bind(&address)
                .await
                .map_err(|source| TransportError::Bind { address, source })?,
            Binding::Listener(listener) => listener,
        };

        match listener.local_addr() {
            Ok(addr) => info!("Starting server at http://{}{}", addr, SERIAL_ROUTE),
            Err(_) => info!("Starting server for {}", SERIAL_ROUTE),
        }

        axum::serve(listener, build_router(lines))
            .await
            .map_err(TransportError::Serve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = router.oneshot(request).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let value = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, value)
    }

    fn post_body(body: Body) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(SERIAL_ROUTE)
            .body(body)
            .unwrap()
    }

    #[tokio::test]
    async fn test_post_serial_forwards_command() {
        let (tx, mut rx) = mpsc::channel::<Line>(1);
        let router = build_router(tx);
        let consumer = tokio::spawn(async move { rx.recv().await.map(Line::accept) });

        let (status, body) = send(router, post_body(Body::from("100|50|0\r\n"))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, serde_json::json!("Accepted serial command 100|50|0"));
        assert_eq!(consumer.await.unwrap().as_deref(), Some("100|50|0"));
    }

    #[tokio::test]
    async fn test_response_waits_until_line_is_taken() {
        let (tx, mut rx) = mpsc::channel::<Line>(1);
        let request = tokio::spawn(send(build_router(tx), post_body(Body::from("1|2"))));

        let line = rx.recv().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!request.is_finished());

        assert_eq!(line.accept(), "1|2");
        let (status, _) = request.await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_line_dropped_unprocessed_returns_unavailable() {
        let (tx, mut rx) = mpsc::channel::<Line>(1);
        let consumer = tokio::spawn(async move {
            // Queued but never taken
            let line = rx.recv().await;
            drop(line);
        });

        let (status, body) = send(build_router(tx), post_body(Body::from("9|9"))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, serde_json::json!({ "error": "bridge stopped" }));
        consumer.await.unwrap();
    }

    #[tokio::test]
    async fn test_unreadable_body_is_rejected() {
        let (tx, mut rx) = mpsc::channel::<Line>(1);
        let router = build_router(tx);

        let failing = tokio_stream::iter(vec![Err::<Bytes, std::io::Error>(
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "client went away"),
        )]);
        let (status, body) = send(router, post_body(Body::from_stream(failing))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, serde_json::json!({ "error": "invalid data" }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_non_utf8_body_is_rejected() {
        let (tx, mut rx) = mpsc::channel::<Line>(1);
        let router = build_router(tx);

        let (status, body) = send(router, post_body(Body::from(vec![0xff, 0xfe, 0x7c]))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, serde_json::json!({ "error": "invalid data" }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stopped_bridge_returns_unavailable() {
        let (tx, rx) = mpsc::channel::<Line>(1);
        drop(rx);
        let router = build_router(tx);

        let (status, body) = send(router, post_body(Body::from("1|2"))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, serde_json::json!({ "error": "bridge stopped" }));
    }

    #[tokio::test]
    async fn test_only_serial_route_exists() {
        let (tx, _rx) = mpsc::channel::<Line>(1);

        let req = Request::builder()
            .method("POST")
            .uri("/other")
            .body(Body::from("1"))
            .unwrap();
        let (status, _) = send(build_router(tx.clone()), req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let req = Request::builder()
            .method("GET")
            .uri(SERIAL_ROUTE)
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(build_router(tx), req).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = taken.local_addr().unwrap().to_string();

        let (tx, _rx) = mpsc::channel::<Line>(1);
        let result = Box::new(HttpLineSource::bind(address)).run(tx).await;
        assert!(matches!(result, Err(TransportError::Bind { .. })));
    }
}
