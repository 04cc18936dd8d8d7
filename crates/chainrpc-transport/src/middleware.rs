//! Axum middleware shared by every route [`crate::build_router`] wires up:
//! a per-request id, structured request logging, and CORS configuration.

use axum::{
    http::HeaderValue,
    extract::Request,
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::info;
use uuid::Uuid;

/// A unique request identifier, available as an Axum extension once
/// [`request_id_middleware`] has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub Uuid);

/// Generates a [`RequestId`] for each request and sets the
/// `X-Request-Id` response header to match.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let id = RequestId(Uuid::new_v4());
    req.extensions_mut().insert(id);
    let mut resp = next.run(req).await;
    resp.headers_mut()
        .insert("x-request-id", HeaderValue::from_str(&id.0.to_string()).unwrap());
    resp
}

/// Logs method, path, status, and duration for each request via
/// [`tracing`] structured fields.
pub struct RequestLogger;

impl RequestLogger {
    /// Axum-compatible middleware function.
    pub async fn layer(req: Request, next: Next) -> Response {
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        let start = Instant::now();

        let resp = next.run(req).await;

        info!(
            http.method = %method,
            http.path = %path,
            http.status = resp.status().as_u16(),
            http.duration_ms = start.elapsed().as_millis() as u64,
            "request completed"
        );

        resp
    }
}

/// CORS configuration, converted into a [`tower_http::cors::CorsLayer`].
#[derive(Debug, Clone, Default)]
pub struct CorsConfig {
    /// Allowed origin header values.
    pub allowed_origins: Vec<String>,
    /// Allowed HTTP methods.
    pub allowed_methods: Vec<String>,
    /// Allowed request headers.
    pub allowed_headers: Vec<String>,
}

impl CorsConfig {
    /// Build the corresponding [`CorsLayer`].
    #[must_use]
    pub fn to_cors_layer(&self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self
            .allowed_origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();
        let methods: Vec<axum::http::Method> =
            self.allowed_methods.iter().filter_map(|m| m.parse().ok()).collect();
        let headers: Vec<axum::http::HeaderName> =
            self.allowed_headers.iter().filter_map(|h| h.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(AllowMethods::list(methods))
            .allow_headers(AllowHeaders::list(headers))
    }
}
