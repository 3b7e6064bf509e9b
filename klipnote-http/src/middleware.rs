//! Request-id propagation (spec §12 "Request-id propagation"), a direct
//! port of the teacher's `dog_axum::app::ensure_request_id`.

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub async fn ensure_request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static(REQUEST_ID_HEADER);

    let request_id = req
        .headers()
        .get(&header_name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if req.headers().get(&header_name).is_none() {
        if let Ok(v) = HeaderValue::from_str(&request_id) {
            req.headers_mut().insert(header_name.clone(), v);
        }
    }

    let mut res = next.run(req).await;

    if res.headers().get(&header_name).is_none() {
        if let Ok(v) = HeaderValue::from_str(&request_id) {
            res.headers_mut().insert(header_name, v);
        }
    }

    res
}
