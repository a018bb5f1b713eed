//! Radix-tree request router and the dispatch entry point.
//!
//! One tree per HTTP method, O(path-length) lookup via [`matchit`]. The
//! router also owns the middleware stack, so a built `Router` is the whole
//! application: build it once at startup, hand it to [`Server::serve`], and
//! it stays immutable behind an `Arc` from then on.
//!
//! [`Server::serve`]: crate::Server::serve

use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::FutureExt;
use http_body_util::BodyExt;
use matchit::Router as MatchitRouter;
use percent_encoding::percent_decode_str;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::{Error, FieldError, Rejection};
use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::middleware::Middleware;
use crate::request::{Request, RequestHead};
use crate::response::{IntoResponse, Response};
use crate::tasks::{DeferredTasks, ResponseBody, TaskTracker};

/// Path parameters bound by a match, keyed by placeholder name.
pub type Params = HashMap<String, String>;

/// The application router.
///
/// Each [`Router::on`] call returns `self` so registrations chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    registered: HashSet<(Method, String)>,
    middleware: Vec<Box<dyn Middleware>>,
    deferred: TaskTracker,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            registered: HashSet::new(),
            middleware: Vec::new(),
            deferred: TaskTracker::default(),
        }
    }

    /// The tracker every request's deferred tasks are spawned through.
    pub fn deferred(&self) -> &TaskTracker {
        &self.deferred
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax; `req.path_param::<T>("name")`
    /// retrieves them typed:
    ///
    /// ```rust,no_run
    /// # use quickserve::{Method, Request, Response, Router};
    /// # async fn get_item(_: Request) -> Response { Response::text("") }
    /// # async fn create_item(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::Get,  "/items/{item_id}", get_item)
    ///     .on(Method::Post, "/items/",          create_item);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics where [`try_on`](Self::try_on) would return an error.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.try_on(method, path, handler).unwrap_or_else(|e| panic!("{e}"))
    }

    /// Fallible form of [`on`](Self::on).
    ///
    /// Fails with [`Error::DuplicateRoute`] if `method` + `path` is already
    /// registered, and with [`Error::InvalidRoute`] if matchit rejects the
    /// pattern.
    pub fn try_on(mut self, method: Method, path: &str, handler: impl Handler) -> Result<Self, Error> {
        if !self.registered.insert((method, path.to_owned())) {
            return Err(Error::DuplicateRoute { method, path: path.to_owned() });
        }

        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .map_err(|source| Error::InvalidRoute { path: path.to_owned(), source })?;
        Ok(self)
    }

    /// Appends a middleware. Hooks run in registration order.
    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Box::new(middleware));
        self
    }

    /// Finds the handler for `method` + `path`.
    ///
    /// A path no tree knows is [`Rejection::NotFound`]. A path known only
    /// under other methods (or requested with a method the router does not
    /// model at all) is [`Rejection::MethodNotAllowed`].
    pub fn resolve(&self, method: &http::Method, path: &str) -> Result<(BoxedHandler, Params), Rejection> {
        let found = Method::try_from(method).ok()
            .and_then(|m| self.routes.get(&m))
            .and_then(|tree| tree.at(path).ok());

        if let Some(matched) = found {
            let handler = Arc::clone(matched.value);
            let params = matched.params.iter()
                .map(|(k, v)| decode_param(k, v).map(|v| (k.to_owned(), v)))
                .collect::<Result<Params, _>>()?;
            return Ok((handler, params));
        }

        let allowed: Vec<Method> = Method::ALL.into_iter()
            .filter(|m| self.routes.get(m).is_some_and(|tree| tree.at(path).is_ok()))
            .collect();

        if allowed.is_empty() {
            Err(Rejection::NotFound)
        } else {
            Err(Rejection::MethodNotAllowed { allowed })
        }
    }

    /// Routes one request and produces one response.
    ///
    /// Never fails: unmatched routes, bad parameters, unreadable bodies and
    /// handler panics all become error responses, and every middleware's
    /// `after` hook sees them.
    pub async fn dispatch<B>(&self, req: http::Request<B>) -> http::Response<ResponseBody>
    where
        B: http_body::Body<Data = Bytes>,
        B::Error: Display,
    {
        let started = Instant::now();
        let (parts, body) = req.into_parts();
        let head = RequestHead::from_parts(&parts);
        let tasks = DeferredTasks::tracked(self.deferred.clone());

        let mut response = match self.middleware.iter().find_map(|m| m.before(&head)) {
            Some(early) => early,
            None => self.route(parts, body, tasks.clone()).await,
        };

        let elapsed = started.elapsed();
        for m in &self.middleware {
            m.after(&head, &mut response, elapsed);
        }

        response.into_http(tasks)
    }

    async fn route<B>(&self, parts: http::request::Parts, body: B, tasks: DeferredTasks) -> Response
    where
        B: http_body::Body<Data = Bytes>,
        B::Error: Display,
    {
        let (handler, params) = match self.resolve(&parts.method, parts.uri.path()) {
            Ok(found) => found,
            Err(rejection) => return rejection.into_response(),
        };

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                debug!(path = %parts.uri.path(), "failed to read request body: {e}");
                return Rejection::BodyRead(e.to_string()).into_response();
            }
        };

        let method = parts.method.clone();
        let path = parts.uri.path().to_owned();
        let req = Request::new(parts, body, params, tasks);

        match AssertUnwindSafe(async move { handler.call(req).await }).catch_unwind().await {
            Ok(response) => response,
            Err(_) => {
                error!(%method, %path, "handler panicked");
                Rejection::Internal.into_response()
            }
        }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

/// Percent-decodes one matched segment. Escapes that do not decode to UTF-8
/// are rejected at `["path", key]`.
fn decode_param(key: &str, raw: &str) -> Result<String, Rejection> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|v| v.into_owned())
        .map_err(|_| {
            Rejection::BadRequest(
                FieldError::new(
                    &["path", key],
                    "string_unicode",
                    "Input should be a valid string, unable to parse raw data as a unicode string",
                )
                .with_input(Value::String(raw.to_owned())),
            )
        })
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::time::Duration;

    use http_body_util::Full;
    use serde_json::{Value, json};
    use tokio::sync::oneshot;

    use super::*;
    use crate::middleware::ProcessTime;
    use crate::response::Json;

    async fn ok(_req: Request) -> &'static str { "ok" }

    async fn echo_id(req: Request) -> Result<Json<Value>, Rejection> {
        let id: i64 = req.path_param("id")?;
        Ok(Json(json!({ "id": id })))
    }

    async fn explode(_req: Request) -> &'static str {
        panic!("handler bug")
    }

    fn get(uri: &str) -> http::Request<Full<Bytes>> {
        http::Request::builder().uri(uri).body(Full::new(Bytes::new())).unwrap()
    }

    async fn body_json(res: http::Response<ResponseBody>) -> Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn duplicate_registration_fails() {
        let err = Router::new()
            .on(Method::Get, "/items/{id}", ok)
            .try_on(Method::Get, "/items/{id}", ok)
            .err()
            .unwrap();
        assert!(matches!(err, Error::DuplicateRoute { method: Method::Get, .. }));
    }

    #[test]
    fn same_path_under_another_method_is_fine() {
        assert!(Router::new()
            .on(Method::Get, "/items/{id}", ok)
            .try_on(Method::Delete, "/items/{id}", ok)
            .is_ok());
    }

    #[test]
    fn conflicting_placeholder_is_invalid() {
        let err = Router::new()
            .on(Method::Get, "/items/{id}", ok)
            .try_on(Method::Get, "/items/{item_id}", ok)
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidRoute { .. }));
    }

    #[test]
    fn resolve_binds_params_and_classifies_misses() {
        let router = Router::new()
            .on(Method::Get, "/items/{id}", ok)
            .on(Method::Put, "/items/{id}", ok);

        let (_, params) = router.resolve(&http::Method::GET, "/items/7").ok().unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("7"));

        assert!(matches!(router.resolve(&http::Method::GET, "/nope"), Err(Rejection::NotFound)));
        match router.resolve(&http::Method::POST, "/items/7") {
            Err(Rejection::MethodNotAllowed { allowed }) => assert_eq!(allowed, [Method::Get, Method::Put]),
            other => panic!("unexpected: {:?}", other.err()),
        }
        assert!(matches!(
            router.resolve(&http::Method::PATCH, "/items/7"),
            Err(Rejection::MethodNotAllowed { .. })
        ));
    }

    #[test]
    fn params_are_percent_decoded() {
        let router = Router::new().on(Method::Get, "/items/{id}", ok);

        let (_, params) = router.resolve(&http::Method::GET, "/items/%34%32").ok().unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("42"));

        let (_, params) = router.resolve(&http::Method::GET, "/items/a%20b").ok().unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("a b"));

        match router.resolve(&http::Method::GET, "/items/%FF") {
            Err(Rejection::BadRequest(e)) => {
                assert_eq!(e.loc, ["path", "id"]);
                assert_eq!(e.kind, "string_unicode");
            }
            other => panic!("unexpected: {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn rejections_carry_the_timing_header() {
        let router = Router::new().on(Method::Get, "/items/{id}", echo_id).layer(ProcessTime);

        let res = router.dispatch(get("/missing")).await;
        assert_eq!(res.status(), 404);
        assert!(res.headers().contains_key(ProcessTime::HEADER));
        assert_eq!(body_json(res).await, json!({ "detail": "Not Found" }));

        let res = router.dispatch(get("/items/abc")).await;
        assert_eq!(res.status(), 422);
        assert!(res.headers().contains_key(ProcessTime::HEADER));
        assert_eq!(body_json(res).await["detail"][0]["loc"], json!(["path", "id"]));

        let post = http::Request::builder()
            .method("POST")
            .uri("/items/1")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let res = router.dispatch(post).await;
        assert_eq!(res.status(), 405);
        assert_eq!(res.headers()["allow"], "GET");
        assert!(res.headers().contains_key(ProcessTime::HEADER));
    }

    #[tokio::test]
    async fn panicking_handler_becomes_500() {
        let router = Router::new().on(Method::Get, "/boom", explode).layer(ProcessTime);
        let res = router.dispatch(get("/boom")).await;
        assert_eq!(res.status(), 500);
        let secs: f64 = res.headers()[ProcessTime::HEADER].to_str().unwrap().parse().unwrap();
        assert!(secs >= 0.0);
    }

    #[tokio::test]
    async fn deferred_work_starts_after_the_body_is_released() {
        let (tx, mut rx) = oneshot::channel::<()>();
        let tx = Arc::new(std::sync::Mutex::new(Some(tx)));

        let router = Router::new().on(Method::Post, "/notify", move |req: Request| {
            let tx = Arc::clone(&tx);
            async move {
                if let Some(tx) = tx.lock().unwrap().take() {
                    req.tasks().schedule_fut("signal", async move {
                        let _ = tx.send(());
                        Ok::<_, Infallible>(())
                    });
                }
                "scheduled"
            }
        });

        let post = http::Request::builder()
            .method("POST")
            .uri("/notify")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let res = router.dispatch(post).await;
        assert_eq!(res.status(), 200);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err(), "ran before the response was released");

        drop(res);
        tokio::time::timeout(Duration::from_secs(1), rx).await.unwrap().unwrap();
    }
}
