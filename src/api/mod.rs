//! HTTP API of the metrics server
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **One shared store** handed to every handler through [`ApiState`]
//! - **Gzip** request decompression and response compression (tower-http)
//!
//! ## Endpoints
//!
//! - `POST /update/{type}/{name}/{value}` - Merge one metric from the path
//! - `POST /update/` - Merge one JSON metric
//! - `POST /updates/` - Merge a JSON array of metrics, all or nothing
//! - `GET /value/{type}/{name}` - Stored value as text
//! - `POST /value/` - Stored metric as JSON
//! - `GET /` - HTML listing
//! - `GET /ping` - Storage health check

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::net::SocketAddr;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Build the router with every route and middleware
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(routes::listing::list_metrics))
        .route("/ping", get(routes::health::ping))
        .route(
            "/update/:type/:name/:value",
            post(routes::update::update_by_path),
        )
        .route("/update/", post(routes::update::update_json))
        .route("/updates/", post(routes::update::update_batch))
        .route("/value/:type/:name", get(routes::value::value_by_path))
        .route("/value/", post(routes::value::value_json))
        .with_state(state)
        .layer(RequestDecompressionLayer::new())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task that stops
/// gracefully once `cancel` fires. Returns the server's local address and
/// its task.
pub async fn spawn_api_server(
    config: ApiConfig,
    state: ApiState,
    cancel: CancellationToken,
) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
    info!("starting API server on {}", config.bind_addr);

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    let task = tokio::spawn(async move {
        let shutdown = async move { cancel.cancelled().await };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok((addr, task))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{Metric, MetricPayload, Signer};
    use crate::storage::{MemoryStore, MetricStore};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state(signer: Option<Signer>) -> (ApiState, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (ApiState::new(store.clone(), signer), store)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn post_json(uri: &str, body: impl Into<Body>) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap()
    }

    fn get_uri(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_update_by_path_merges_counter() {
        let (state, store) = test_state(None);

        let (status, body) = send(router(state.clone()), post_json("/update/counter/PollCount/5", "")).await;
        assert_eq!((status, body.as_str()), (StatusCode::OK, "5"));

        let (status, body) = send(router(state), post_json("/update/counter/PollCount/10", "")).await;
        assert_eq!((status, body.as_str()), (StatusCode::OK, "15"));

        assert_eq!(store.get("PollCount").await.unwrap(), Metric::counter("PollCount", 15));
    }

    #[tokio::test]
    async fn test_update_by_path_status_codes() {
        let (state, _) = test_state(None);
        let cases = [
            ("/update/histogram/x/1", StatusCode::NOT_IMPLEMENTED),
            ("/update/counter/x/1.5", StatusCode::BAD_REQUEST),
            ("/update/gauge/x/abc", StatusCode::BAD_REQUEST),
            ("/update/gauge/x", StatusCode::NOT_FOUND),
            ("/update/gauge/x/2.5", StatusCode::OK),
            ("/update/counter/x/1", StatusCode::BAD_REQUEST),
        ];

        for (uri, expected) in cases {
            let (status, _) = send(router(state.clone()), post_json(uri, "")).await;
            assert_eq!(status, expected, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_update_by_path_closed_with_key() {
        let (state, store) = test_state(Some(Signer::new("secret")));

        let (status, body) =
            send(router(state.clone()), post_json("/update/counter/PollCount/1000", "")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("signed"));

        // Parse errors still win over the missing signature
        let (status, _) = send(router(state), post_json("/update/histogram/x/1", "")).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_json_rejects_value_and_delta() {
        let (state, store) = test_state(None);

        let body = r#"{"id":"Hits","type":"counter","delta":1,"value":1.0}"#;
        let (status, _) = send(router(state.clone()), post_json("/update/", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let batch = r#"[{"id":"Alloc","type":"gauge","value":1.0,"delta":1}]"#;
        let (status, _) = send(router(state), post_json("/updates/", batch)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_value_by_path() {
        let (state, store) = test_state(None);
        store.update(Metric::gauge("Alloc", 3.5)).await.unwrap();

        let (status, body) = send(router(state.clone()), get_uri("/value/gauge/Alloc")).await;
        assert_eq!((status, body.as_str()), (StatusCode::OK, "3.5"));

        let (status, _) = send(router(state.clone()), get_uri("/value/counter/Alloc")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(router(state.clone()), get_uri("/value/gauge/Unknown")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("\"error\""));

        let (status, _) = send(router(state), get_uri("/value/summary/Alloc")).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn test_update_json_returns_signed_result() {
        let signer = Signer::new("secret");
        let (state, _) = test_state(Some(signer.clone()));

        let payload = MetricPayload::encode(&Metric::counter("PollCount", 5), Some(&signer)).unwrap();
        let body = serde_json::to_vec(&payload).unwrap();

        let (status, body) = send(router(state), post_json("/update/", body)).await;
        assert_eq!(status, StatusCode::OK);

        let reply: MetricPayload = serde_json::from_str(&body).unwrap();
        assert_eq!(reply, payload);
    }

    #[tokio::test]
    async fn test_update_json_rejects_bad_signature() {
        let (state, store) = test_state(Some(Signer::new("secret")));

        let forged =
            MetricPayload::encode(&Metric::counter("PollCount", 5), Some(&Signer::new("other")))
                .unwrap();
        let (status, _) = send(
            router(state.clone()),
            post_json("/update/", serde_json::to_vec(&forged).unwrap()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let unsigned = r#"{"id":"PollCount","type":"counter","delta":5}"#;
        let (status, _) = send(router(state), post_json("/update/", unsigned)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_json_bad_bodies() {
        let (state, _) = test_state(None);
        let cases = [
            ("not json", StatusCode::BAD_REQUEST),
            (r#"{"id":"x","type":"gauge"}"#, StatusCode::BAD_REQUEST),
            (r#"{"id":"","type":"gauge","value":1}"#, StatusCode::BAD_REQUEST),
            (r#"{"id":"x","type":"summary","value":1}"#, StatusCode::NOT_IMPLEMENTED),
        ];

        for (body, expected) in cases {
            let (status, _) = send(router(state.clone()), post_json("/update/", body)).await;
            assert_eq!(status, expected, "{body}");
        }
    }

    #[tokio::test]
    async fn test_update_batch_is_all_or_nothing() {
        let (state, store) = test_state(None);
        store.update(Metric::gauge("Alloc", 1.0)).await.unwrap();

        let body = r#"[
            {"id":"Hits","type":"counter","delta":2},
            {"id":"Alloc","type":"counter","delta":1}
        ]"#;
        let (status, _) = send(router(state.clone()), post_json("/updates/", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(store.get("Hits").await.is_err());

        let body = r#"[
            {"id":"Hits","type":"counter","delta":2},
            {"id":"Hits","type":"counter","delta":3},
            {"id":"Alloc","type":"gauge","value":4.5}
        ]"#;
        let (status, body) = send(router(state), post_json("/updates/", body)).await;
        assert_eq!(status, StatusCode::OK);

        let replies: Vec<MetricPayload> = serde_json::from_str(&body).unwrap();
        let values: Vec<_> = replies.iter().map(|p| (p.delta, p.value)).collect();
        assert_eq!(values, vec![(Some(2), None), (Some(5), None), (None, Some(4.5))]);
    }

    #[tokio::test]
    async fn test_gzip_request_body() {
        let (state, store) = test_state(None);

        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder
            .write_all(br#"[{"id":"Hits","type":"counter","delta":7}]"#)
            .unwrap();
        let compressed = encoder.finish().unwrap();

        let request = Request::post("/updates/")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_ENCODING, "gzip")
            .body(Body::from(compressed))
            .unwrap();

        let (status, _) = send(router(state), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(store.get("Hits").await.unwrap(), Metric::counter("Hits", 7));
    }

    #[tokio::test]
    async fn test_value_json() {
        let signer = Signer::new("secret");
        let (state, store) = test_state(Some(signer.clone()));
        store.update(Metric::counter("PollCount", 5)).await.unwrap();

        let (status, body) = send(
            router(state.clone()),
            post_json("/value/", r#"{"id":"PollCount","type":"counter"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let reply: MetricPayload = serde_json::from_str(&body).unwrap();
        assert_eq!(reply.delta, Some(5));
        assert_eq!(
            reply.hash.as_deref(),
            Some("6c9fe43102c73262035842e922b81e40252f73e8033185cff20136451bd3e692")
        );

        let (status, _) = send(router(state), post_json("/value/", r#"{"id":"Nope","type":"gauge"}"#)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_listing_escapes_names() {
        let (state, store) = test_state(None);
        store.update(Metric::gauge("<script>", 1.0)).await.unwrap();
        store.update(Metric::counter("PollCount", 2)).await.unwrap();

        let (status, body) = send(router(state), get_uri("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("&lt;script&gt;"));
        assert!(!body.contains("<script>"));
        assert!(body.contains("PollCount (counter): 2"));
    }

    #[tokio::test]
    async fn test_ping() {
        let (state, _) = test_state(None);
        let (status, body) = send(router(state), get_uri("/ping")).await;
        assert_eq!((status, body.as_str()), (StatusCode::OK, "OK"));
    }

    #[tokio::test]
    async fn test_spawn_api_server_stops_on_cancel() {
        let (state, _) = test_state(None);
        let cancel = CancellationToken::new();
        let config = ApiConfig {
            bind_addr: "127.0.0.1:0".to_string(),
        };

        let (addr, task) = spawn_api_server(config, state, cancel.clone()).await.unwrap();
        let response = reqwest::get(format!("http://{addr}/ping")).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);

        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }
}
