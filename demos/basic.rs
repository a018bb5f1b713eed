//! Minimal use of the framework without the bundled service: two routes,
//! the timing header, and a deferred task.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/users/42
//!   curl -i -X POST 'http://localhost:3000/audit?event=login'

use std::convert::Infallible;

use quickserve::middleware::{ProcessTime, Trace};
use quickserve::{Json, Method, Rejection, Request, Router, Server};
use serde_json::{Value, json};

#[tokio::main]
async fn main() -> Result<(), quickserve::Error> {
    tracing_subscriber::fmt::init();

    let app = Router::new()
        .on(Method::Get,  "/users/{user_id}", get_user)
        .on(Method::Post, "/audit",           audit)
        .layer(ProcessTime)
        .layer(Trace);

    Server::bind("0.0.0.0:3000").await?.serve(app).await
}

// GET /users/{user_id}; `/users/abc` answers 422.
async fn get_user(req: Request) -> Result<Json<Value>, Rejection> {
    let user_id: i64 = req.path_param("user_id")?;
    Ok(Json(json!({ "user_id": user_id })))
}

// POST /audit?event=...; the log line is written after the response goes out.
async fn audit(req: Request) -> Result<Json<Value>, Rejection> {
    let event: String = req.required_query("event")?;
    req.tasks().schedule("audit", record, event);
    Ok(Json(json!({ "message": "recorded" })))
}

async fn record(event: String) -> Result<(), Infallible> {
    tracing::info!(%event, "audit event");
    Ok(())
}
