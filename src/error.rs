//! Error types.
//!
//! Two families live here. [`Error`] covers infrastructure failures: binding a
//! port, registering a bad route, loading configuration. [`Rejection`] covers a
//! single request that cannot be served as asked; it renders as an HTTP error
//! response and never takes the process down.

use std::fmt;

use serde::Serialize;
use serde_json::{Value, json};

use crate::method::Method;
use crate::response::{IntoResponse, Response};
use crate::status::Status;

/// The error type returned by quickserve's fallible setup operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// The same method + pattern pair was registered twice.
    #[error("route `{method} {path}` is already registered")]
    DuplicateRoute { method: Method, path: String },

    /// matchit refused the pattern (bad syntax, or a placeholder that
    /// conflicts with one already in the tree).
    #[error("invalid route `{path}`: {source}")]
    InvalidRoute {
        path: String,
        #[source]
        source: matchit::InsertError,
    },

    #[error("configuration: {0}")]
    Config(#[from] config::ConfigError),
}

// ── Per-request rejections ────────────────────────────────────────────────────

/// One offending input, located the way clients expect: `["path", "user_id"]`,
/// `["query", "page"]`, `["body", "price"]`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldError {
    pub loc: Vec<String>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
}

impl FieldError {
    pub fn new(loc: &[&str], kind: &'static str, msg: impl Into<String>) -> Self {
        Self {
            loc: loc.iter().map(|s| (*s).to_owned()).collect(),
            msg: msg.into(),
            kind,
            input: None,
        }
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.loc.join("."), self.msg)
    }
}

/// A request body that did not validate. Lists every offending field.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn single(error: FieldError) -> Self {
        Self { errors: vec![error] }
    }

    /// `true` if some error is located at `loc` (e.g. `&["body", "price"]`).
    pub fn has(&self, loc: &[&str]) -> bool {
        self.errors.iter().any(|e| e.loc.iter().map(String::as_str).eq(loc.iter().copied()))
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation error(s)", self.errors.len())?;
        for e in &self.errors {
            write!(f, "; {e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Why a request was answered with an error status instead of its handler's
/// payload. Handlers return `Result<_, Rejection>` and use `?` on extractors.
#[derive(Debug, thiserror::Error)]
pub enum Rejection {
    #[error("no route matches the request path")]
    NotFound,

    #[error("method not allowed")]
    MethodNotAllowed { allowed: Vec<Method> },

    /// A path or query parameter failed to parse to its declared type.
    #[error("invalid parameter: {0}")]
    BadRequest(FieldError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to read request body: {0}")]
    BodyRead(String),

    #[error("internal server error")]
    Internal,
}

impl Rejection {
    pub fn status(&self) -> Status {
        match self {
            Self::NotFound => Status::NotFound,
            Self::MethodNotAllowed { .. } => Status::MethodNotAllowed,
            Self::BadRequest(_) | Self::Validation(_) => Status::UnprocessableContent,
            Self::BodyRead(_) => Status::BadRequest,
            Self::Internal => Status::InternalServerError,
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let status = self.status();
        let (body, allow) = match self {
            Self::NotFound => (json!({ "detail": "Not Found" }), None),
            Self::MethodNotAllowed { allowed } => {
                let allow = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
                (json!({ "detail": "Method Not Allowed" }), Some(allow))
            }
            Self::BadRequest(e) => (json!({ "detail": [e] }), None),
            Self::Validation(v) => (json!({ "detail": v.errors }), None),
            Self::BodyRead(_) => (json!({ "detail": "Bad Request" }), None),
            Self::Internal => (json!({ "detail": "Internal Server Error" }), None),
        };

        let mut builder = Response::builder().status(status);
        if let Some(allow) = allow {
            builder = builder.header("allow", &allow);
        }
        // `Value` serialisation cannot fail.
        builder.json(serde_json::to_vec(&body).unwrap_or_default())
    }
}
