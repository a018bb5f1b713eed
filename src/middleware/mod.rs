//! Middleware layer.
//!
//! Middleware sees every request the router dispatches and is the place for
//! cross-cutting concerns. A middleware has two hooks:
//!
//! - [`Middleware::before`] runs ahead of route resolution and may answer the
//!   request itself by returning `Some(response)`.
//! - [`Middleware::after`] runs on the outgoing response, whatever produced
//!   it: a handler, a rejection (404, 405, 422), a short-circuit, or a handler
//!   panic turned into a 500. It receives the time elapsed since dispatch
//!   started.
//!
//! Built-in middleware:
//! - [`ProcessTime`] stamps `x-process-time` with the elapsed seconds
//! - [`Trace`] logs one structured line per request

mod timing;
mod trace;

use std::time::Duration;

pub use timing::ProcessTime;
pub use trace::Trace;

use crate::request::RequestHead;
use crate::response::Response;

pub trait Middleware: Send + Sync + 'static {
    fn before(&self, _req: &RequestHead) -> Option<Response> {
        None
    }

    fn after(&self, _req: &RequestHead, _res: &mut Response, _elapsed: Duration) {}
}
