//! # quickserve
//!
//! A small JSON demo service and the minimal request-handling framework it
//! runs on.
//!
//! ## The framework
//!
//! - Radix-tree routing via [`matchit`], one tree per method; typed path and
//!   query extraction with `422` rejections
//! - Async I/O on tokio, HTTP/1.1 and HTTP/2 via hyper
//! - [`Middleware`](middleware::Middleware) hooks around every request;
//!   [`ProcessTime`](middleware::ProcessTime) stamps `x-process-time`
//! - Deferred tasks that run after the response has been written
//! - Graceful shutdown on SIGTERM / Ctrl-C
//!
//! ## The service
//!
//! [`app::router`] builds the demo routes: a greeting, user and item echo
//! endpoints, a deliberately slow endpoint, a notification endpoint backed by
//! a deferred task, and `/health`.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use quickserve::{Json, Method, Rejection, Request, Router, Server};
//! use quickserve::middleware::ProcessTime;
//! use serde_json::{Value, json};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), quickserve::Error> {
//!     let app = Router::new()
//!         .on(Method::Get, "/users/{user_id}", get_user)
//!         .layer(ProcessTime);
//!
//!     Server::bind("0.0.0.0:8000").await?.serve(app).await
//! }
//!
//! async fn get_user(req: Request) -> Result<Json<Value>, Rejection> {
//!     let user_id: i64 = req.path_param("user_id")?;
//!     Ok(Json(json!({ "user_id": user_id })))
//! }
//! ```

mod error;
mod handler;
mod method;
mod request;
mod response;
mod router;
mod server;
mod status;

pub mod app;
pub mod config;
pub mod health;
pub mod middleware;
pub mod model;
pub mod tasks;

pub use config::Config;
pub use error::{Error, FieldError, Rejection, ValidationError};
pub use handler::Handler;
pub use method::Method;
pub use model::Item;
pub use request::{Request, RequestHead};
pub use response::{IntoResponse, Json, Response, ResponseBuilder};
pub use router::{Params, Router};
pub use server::Server;
pub use status::Status;
pub use tasks::{DeferredTask, DeferredTasks, ResponseBody, TaskTracker};
