//! Administrative HTTP routes served next to the WebSocket endpoint.
//!
//! - `GET /` answers a static greeting
//! - `GET /send/{room}/{message}` broadcasts `message` to `room`

use crate::event::EventKind;
use crate::server::{accept_upgrade, is_websocket_upgrade, ServerHandle, ServerShared};
use bytes::Bytes;
use http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE, ORIGIN};
use http::{HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;

pub(crate) fn route(
    shared: &Arc<ServerShared>,
    req: Request<Incoming>,
    addr: SocketAddr,
) -> Response<Full<Bytes>> {
    let origin = req
        .headers()
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let cors = &shared.config.cors_allowed_origins;

    if shared.config.matches_path(req.uri().path()) {
        if let Some(origin) = origin.as_deref() {
            if !cors.allows(origin) {
                tracing::warn!(addr = %addr, origin = %origin, "Origin not allowed");
                return json_response(StatusCode::FORBIDDEN, json!({"detail": "Origin not allowed"}));
            }
        }
        if is_websocket_upgrade(&req) {
            return accept_upgrade(shared, req, addr);
        }
        return json_response(
            StatusCode::BAD_REQUEST,
            json!({"detail": "WebSocket upgrade required"}),
        );
    }

    let handle = ServerHandle::new(Arc::clone(&shared.registry));
    let mut response = handle_request(&handle, req.method(), req.uri().path());
    if let Some(allowed) = cors.allow_origin(origin.as_deref()) {
        if let Ok(value) = HeaderValue::from_str(&allowed) {
            response
                .headers_mut()
                .insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
    }
    response
}

/// Route a non-WebSocket request.
pub(crate) fn handle_request(handle: &ServerHandle, method: &Method, path: &str) -> Response<Full<Bytes>> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let known = matches!(segments.as_slice(), [] | ["send", _, _]);
    if known && method != Method::GET {
        return json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            json!({"detail": "Method Not Allowed"}),
        );
    }

    match segments.as_slice() {
        [] => json_response(StatusCode::OK, json!({"message": "Hello World"})),
        ["send", room, message] => {
            let (Ok(room), Ok(message)) = (urlencoding::decode(room), urlencoding::decode(message))
            else {
                return json_response(
                    StatusCode::BAD_REQUEST,
                    json!({"detail": "Invalid percent-encoding"}),
                );
            };

            tracing::info!(room = %room, message = %message, "[API] Send message");
            let reached = handle.broadcast(
                &room,
                EventKind::Message,
                Some(Value::String(message.into_owned())),
            );
            tracing::debug!(room = %room, reached, "[API] Broadcast delivered");

            json_response(StatusCode::OK, json!({"message": "OK"}))
        }
        _ => json_response(StatusCode::NOT_FOUND, json!({"detail": "Not Found"})),
    }
}

pub(crate) fn json_response(status: StatusCode, body: Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
