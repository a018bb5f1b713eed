//! Incoming HTTP request type and typed parameter extraction.

use std::collections::HashMap;
use std::str::FromStr;

use bytes::Bytes;
use serde_json::Value;

use crate::error::{FieldError, Rejection};
use crate::tasks::DeferredTasks;

/// An incoming HTTP request, body already collected.
pub struct Request {
    query: Vec<(String, String)>,
    headers: http::HeaderMap,
    body: Bytes,
    params: HashMap<String, String>,
    tasks: DeferredTasks,
}

impl Request {
    pub(crate) fn new(
        parts: http::request::Parts,
        body: Bytes,
        params: HashMap<String, String>,
        tasks: DeferredTasks,
    ) -> Self {
        let query = parts.uri.query()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();

        Self { query, headers: parts.headers, body, params, tasks }
    }

    pub fn body(&self) -> &[u8] { &self.body }

    /// The post-response queue for this request. See [`crate::tasks`].
    pub fn tasks(&self) -> &DeferredTasks { &self.tasks }

    /// Case-insensitive header lookup. Values that are not visible ASCII
    /// read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter as raw text.
    ///
    /// For a route `/users/{user_id}`, `req.param("user_id")` on `/users/42`
    /// returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Parses a path parameter into `T`.
    ///
    /// A segment that does not parse is rejected with `422` located at
    /// `["path", key]`.
    pub fn path_param<T: FromStr>(&self, key: &str) -> Result<T, Rejection> {
        let raw = self.param(key).ok_or_else(|| {
            Rejection::BadRequest(FieldError::new(&["path", key], "missing", "Field required"))
        })?;
        parse_as("path", key, raw)
    }

    /// Query parameter `key`, parsed into `T`. `Ok(None)` when the parameter
    /// is absent. When the key repeats, the last occurrence wins.
    pub fn query_param<T: FromStr>(&self, key: &str) -> Result<Option<T>, Rejection> {
        self.query.iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| parse_as("query", key, v))
            .transpose()
    }

    /// Like [`query_param`](Self::query_param) with a fallback for absence.
    pub fn query_param_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, Rejection> {
        Ok(self.query_param(key)?.unwrap_or(default))
    }

    /// Like [`query_param`](Self::query_param) but absence is a `422`.
    pub fn required_query<T: FromStr>(&self, key: &str) -> Result<T, Rejection> {
        self.query_param(key)?.ok_or_else(|| {
            Rejection::BadRequest(FieldError::new(&["query", key], "missing", "Field required"))
        })
    }
}

fn parse_as<T: FromStr>(source: &str, key: &str, raw: &str) -> Result<T, Rejection> {
    raw.parse().map_err(|_| {
        let (kind, msg) = describe::<T>();
        Rejection::BadRequest(
            FieldError::new(&[source, key], kind, msg).with_input(Value::String(raw.to_owned())),
        )
    })
}

fn describe<T>() -> (&'static str, &'static str) {
    match std::any::type_name::<T>() {
        "i8" | "i16" | "i32" | "i64" | "i128" | "isize"
        | "u8" | "u16" | "u32" | "u64" | "u128" | "usize" => (
            "int_parsing",
            "Input should be a valid integer, unable to parse string as an integer",
        ),
        "f32" | "f64" => (
            "float_parsing",
            "Input should be a valid number, unable to parse string as a number",
        ),
        "bool" => (
            "bool_parsing",
            "Input should be a valid boolean, unable to interpret input",
        ),
        _ => ("value_error", "Input could not be parsed"),
    }
}

// ── RequestHead ───────────────────────────────────────────────────────────────

/// The parts of a request middleware gets to see. Captured before the
/// request is handed to its handler.
#[derive(Clone, Debug)]
pub struct RequestHead {
    pub method: http::Method,
    pub path: String,
}

impl RequestHead {
    pub(crate) fn from_parts(parts: &http::request::Parts) -> Self {
        Self { method: parts.method.clone(), path: parts.uri.path().to_owned() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str, params: &[(&str, &str)]) -> Request {
        let (parts, ()) = http::Request::builder().uri(uri).body(()).unwrap().into_parts();
        let params = params.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
        Request::new(parts, Bytes::new(), params, DeferredTasks::default())
    }

    #[test]
    fn path_param_parses_integers() {
        let req = request("/users/42", &[("user_id", "42")]);
        assert_eq!(req.path_param::<i64>("user_id").unwrap(), 42);
        assert_eq!(req.param("user_id"), Some("42"));
    }

    #[test]
    fn path_param_rejects_non_integers() {
        let req = request("/users/abc", &[("user_id", "abc")]);
        match req.path_param::<i64>("user_id") {
            Err(Rejection::BadRequest(e)) => {
                assert_eq!(e.loc, ["path", "user_id"]);
                assert_eq!(e.kind, "int_parsing");
                assert_eq!(e.input, Some(Value::String("abc".into())));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn query_is_percent_decoded() {
        let req = request("/notify?email=a%40b.com&page=3", &[]);
        assert_eq!(req.query_param::<String>("email").unwrap().as_deref(), Some("a@b.com"));
        assert_eq!(req.query_param_or::<i64>("page", 1).unwrap(), 3);
        assert_eq!(req.query_param_or::<i64>("limit", 10).unwrap(), 10);
    }

    #[test]
    fn repeated_query_keys_keep_the_last_value() {
        let req = request("/items/?page=1&limit=5&page=3", &[]);
        assert_eq!(req.query_param_or::<i64>("page", 1).unwrap(), 3);
        assert_eq!(req.query_param_or::<i64>("limit", 10).unwrap(), 5);
    }

    #[test]
    fn headers_are_looked_up_case_insensitively() {
        let (parts, ()) = http::Request::builder()
            .uri("/items/")
            .header("Content-Type", "application/json")
            .header("x-opaque", http::HeaderValue::from_bytes(b"caf\xe9").unwrap())
            .body(())
            .unwrap()
            .into_parts();
        let req = Request::new(parts, Bytes::new(), HashMap::new(), DeferredTasks::default());

        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(req.header("x-opaque"), None);
        assert_eq!(req.header("accept"), None);
    }

    #[test]
    fn bad_or_missing_query_values_reject() {
        let req = request("/items/?page=two", &[]);
        assert!(matches!(req.query_param::<i64>("page"), Err(Rejection::BadRequest(_))));
        match req.required_query::<String>("email") {
            Err(Rejection::BadRequest(e)) => assert_eq!(e.kind, "missing"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
