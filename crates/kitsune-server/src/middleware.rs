use std::time::Instant;

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Propagates `x-request-id`, generating a UUID v4 when the caller sent none.
///
/// The value is stored in request extensions so the trace span can pick it up.
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static(REQUEST_ID_HEADER);

    let req_id_value = req
        .headers()
        .get(&header_name)
        .cloned()
        .or_else(|| HeaderValue::from_str(&Uuid::new_v4().to_string()).ok());

    if let Some(value) = &req_id_value {
        req.extensions_mut().insert(value.clone());
    }

    let mut res = next.run(req).await;

    if let Some(value) = req_id_value {
        res.headers_mut().insert(header_name, value);
    }

    res
}

/// Records request count and latency per matched route.
pub async fn track_metrics(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    // Unmatched paths share one label to keep cardinality bounded
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    let res = next.run(req).await;

    crate::metrics::record_http_request(
        method.as_str(),
        &route,
        res.status().as_u16(),
        start.elapsed(),
    );
    res
}
