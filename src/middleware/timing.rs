use std::time::Duration;

use super::Middleware;
use crate::request::RequestHead;
use crate::response::Response;

/// Adds `x-process-time: <seconds>` to every response.
///
/// The value is the wall-clock time from the start of dispatch until the
/// response (body already serialised) is handed back, written as a decimal
/// number of seconds, e.g. `0.000213`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessTime;

impl ProcessTime {
    pub const HEADER: &'static str = "x-process-time";
}

impl Middleware for ProcessTime {
    fn after(&self, _req: &RequestHead, res: &mut Response, elapsed: Duration) {
        res.set_header(Self::HEADER, elapsed.as_secs_f64().to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_elapsed_seconds() {
        let head = RequestHead { method: http::Method::GET, path: "/".into() };
        let mut res = Response::text("hi");
        ProcessTime.after(&head, &mut res, Duration::from_millis(1500));
        assert_eq!(res.header("X-Process-Time"), Some("1.5"));
    }
}
