//! Health-check handler.
//!
//! `GET /health` answers `{"status": "ok", "time": "<rfc3339>"}`. If the
//! process can respond to HTTP at all it is healthy, so the handler has no
//! dependencies and never fails.

use serde_json::{Value, json};

use crate::{Json, Request};

pub async fn health(_req: Request) -> Json<Value> {
    Json(json!({ "status": "ok", "time": chrono::Local::now().to_rfc3339() }))
}
