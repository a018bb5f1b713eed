use std::time::Duration;

use tracing::{info, warn};

use super::Middleware;
use crate::request::RequestHead;
use crate::response::Response;

/// One log line per request: method, path, status, latency.
///
/// Server errors are logged at `warn`, everything else at `info`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Trace;

impl Middleware for Trace {
    fn after(&self, req: &RequestHead, res: &mut Response, elapsed: Duration) {
        let status = res.status_code();
        let latency_ms = elapsed.as_secs_f64() * 1000.0;
        if status >= 500 {
            warn!(method = %req.method, path = %req.path, status, latency_ms, "request failed");
        } else {
            info!(method = %req.method, path = %req.path, status, latency_ms, "request");
        }
    }
}
