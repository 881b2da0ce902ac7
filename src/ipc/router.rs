use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

type TryHandle = fn(&mut AppState, &Request) -> Option<serde_json::Value>;

const HANDLERS: [TryHandle; 14] = [
    handlers::core::try_handle,
    handlers::data::try_handle,
    handlers::auth::try_handle,
    handlers::students::try_handle,
    handlers::exchange::try_handle,
    handlers::teachers::try_handle,
    handlers::subjects::try_handle,
    handlers::marks::try_handle,
    handlers::attendance::try_handle,
    handlers::remarks::try_handle,
    handlers::config::try_handle,
    handlers::reports::try_handle,
    handlers::analytics::try_handle,
    handlers::backup::try_handle,
];

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    tracing::debug!(id = %req.id, method = %req.method, "request");
    for try_handle in HANDLERS {
        if let Some(resp) = try_handle(state, &req) {
            return resp;
        }
    }

    tracing::warn!(method = %req.method, "unknown method");
    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
