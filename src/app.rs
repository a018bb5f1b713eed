//! The demo service: greeting, users, items, a slow endpoint, notifications
//! and a health check.
//!
//! | Method | Path | Response |
//! |---|---|---|
//! | GET | `/` | `{message}` |
//! | GET | `/users/{user_id}` | `{user_id}` |
//! | GET | `/items/?page&limit` | `{page, limit}` |
//! | GET | `/items/{item_id}` | `{item_id}` |
//! | POST | `/items/` | `{message, item}` |
//! | PUT | `/items/{item_id}` | `{message, item_id, new_values}` |
//! | DELETE | `/items/{item_id}` | `{message, item_id}` |
//! | POST | `/async-endpoint` | `{status}` after the configured delay |
//! | POST | `/notify?email=` | `{message}`; the notification goes out after the response |
//! | GET | `/health` | `{status, time}` |
//!
//! No handler touches shared state. Items are echoed back, never stored.

use std::convert::Infallible;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use crate::config::Config;
use crate::error::{Error, Rejection};
use crate::health::health;
use crate::middleware::{ProcessTime, Trace};
use crate::model::Item;
use crate::{Json, Method, Request, Router};

const DEFAULT_PAGE: i64 = 1;
const DEFAULT_LIMIT: i64 = 10;

type JsonResult<T = Value> = Result<Json<T>, Rejection>;

/// Builds the route table for the service.
pub fn router(config: &Config) -> Result<Router, Error> {
    let delay = config.async_delay();

    let router = Router::new()
        .try_on(Method::Get,    "/",                 root)?
        .try_on(Method::Get,    "/users/{user_id}",  get_user)?
        .try_on(Method::Get,    "/items/",           list_items)?
        .try_on(Method::Post,   "/items/",           create_item)?
        .try_on(Method::Get,    "/items/{item_id}",  get_item)?
        .try_on(Method::Put,    "/items/{item_id}",  update_item)?
        .try_on(Method::Delete, "/items/{item_id}",  delete_item)?
        .try_on(Method::Post,   "/async-endpoint",   move |req: Request| async_endpoint(req, delay))?
        .try_on(Method::Post,   "/notify",           notify)?
        .try_on(Method::Get,    "/health",           health)?
        .layer(ProcessTime)
        .layer(Trace);

    Ok(router)
}

fn now() -> String {
    chrono::Local::now().to_rfc3339()
}

async fn root(_req: Request) -> Json<Value> {
    Json(json!({ "message": format!("Hello World: {}", now()) }))
}

async fn get_user(req: Request) -> JsonResult {
    let user_id: i64 = req.path_param("user_id")?;
    Ok(Json(json!({ "user_id": user_id })))
}

// Parameters are echoed; there is no dataset behind them.
async fn list_items(req: Request) -> JsonResult {
    let page = req.query_param_or("page", DEFAULT_PAGE)?;
    let limit = req.query_param_or("limit", DEFAULT_LIMIT)?;
    Ok(Json(json!({ "page": page, "limit": limit })))
}

async fn get_item(req: Request) -> JsonResult {
    let item_id: i64 = req.path_param("item_id")?;
    Ok(Json(json!({ "item_id": item_id })))
}

#[derive(Serialize)]
struct Created {
    message: &'static str,
    item: Item,
}

async fn create_item(req: Request) -> JsonResult<Created> {
    let item = Item::parse(req.body())?;
    Ok(Json(Created { message: "Item created", item }))
}

#[derive(Serialize)]
struct Updated {
    message: &'static str,
    item_id: i64,
    new_values: Item,
}

async fn update_item(req: Request) -> JsonResult<Updated> {
    let item_id: i64 = req.path_param("item_id")?;
    let new_values = Item::parse(req.body())?;
    Ok(Json(Updated { message: "Item updated", item_id, new_values }))
}

async fn delete_item(req: Request) -> JsonResult {
    let item_id: i64 = req.path_param("item_id")?;
    Ok(Json(json!({ "message": "Item deleted", "item_id": item_id })))
}

async fn async_endpoint(_req: Request, delay: Duration) -> Json<Value> {
    tokio::time::sleep(delay).await;
    Json(json!({ "status": format!("Async operation completed: {}", now()) }))
}

async fn notify(req: Request) -> JsonResult {
    let email: String = req.required_query("email")?;
    req.tasks().schedule("send_notification", send_notification, email);
    Ok(Json(json!({ "message": format!("Notification scheduled: {}", now()) })))
}

/// Stand-in for real delivery: logs the recipient.
async fn send_notification(email: String) -> Result<(), Infallible> {
    info!(%email, "sending notification");
    Ok(())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};

    use super::*;
    use crate::tasks::ResponseBody;

    fn app() -> Router {
        router(&Config { async_delay_ms: 10, ..Config::default() }).unwrap()
    }

    fn request(method: &str, uri: &str, body: &str) -> http::Request<Full<Bytes>> {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from(body.to_owned())))
            .unwrap()
    }

    async fn call(method: &str, uri: &str, body: &str) -> (u16, Value) {
        let res: http::Response<ResponseBody> = app().dispatch(request(method, uri, body)).await;
        let status = res.status().as_u16();
        assert!(res.headers().contains_key(ProcessTime::HEADER));
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn root_greets_with_a_timestamp() {
        let (status, body) = call("GET", "/", "").await;
        assert_eq!(status, 200);
        assert!(body["message"].as_str().unwrap().starts_with("Hello World: "));
    }

    #[tokio::test]
    async fn user_id_is_echoed() {
        for id in [0_i64, 42, -7, i64::MAX] {
            let (status, body) = call("GET", &format!("/users/{id}"), "").await;
            assert_eq!(status, 200);
            assert_eq!(body, json!({ "user_id": id }));
        }
    }

    #[tokio::test]
    async fn encoded_path_segments_are_decoded() {
        let (status, body) = call("GET", "/users/%34%32", "").await;
        assert_eq!(status, 200);
        assert_eq!(body, json!({ "user_id": 42 }));

        let (status, body) = call("GET", "/users/%FF", "").await;
        assert_eq!(status, 422);
        assert_eq!(body["detail"][0]["loc"], json!(["path", "user_id"]));
    }

    #[tokio::test]
    async fn pagination_defaults_and_overrides() {
        assert_eq!(call("GET", "/items/", "").await.1, json!({ "page": 1, "limit": 10 }));
        assert_eq!(call("GET", "/items/?page=3&limit=5", "").await.1, json!({ "page": 3, "limit": 5 }));
        assert_eq!(call("GET", "/items/?page=1&page=3", "").await.1, json!({ "page": 3, "limit": 10 }));
        let (status, body) = call("GET", "/items/?limit=many", "").await;
        assert_eq!(status, 422);
        assert_eq!(body["detail"][0]["loc"], json!(["query", "limit"]));
    }

    #[tokio::test]
    async fn item_crud_echoes() {
        let (status, body) = call("POST", "/items/", r#"{"name":"Foo","price":"10.5"}"#).await;
        assert_eq!(status, 200);
        assert_eq!(body["item"], json!({ "name": "Foo", "price": 10.5, "is_offer": false }));

        let (status, body) = call("PUT", "/items/3", r#"{"name":"Bar","price":2,"is_offer":true}"#).await;
        assert_eq!(status, 200);
        assert_eq!(body["item_id"], 3);
        assert_eq!(body["new_values"], json!({ "name": "Bar", "price": 2.0, "is_offer": true }));

        let (status, body) = call("DELETE", "/items/3", "").await;
        assert_eq!(status, 200);
        assert_eq!(body, json!({ "message": "Item deleted", "item_id": 3 }));

        assert_eq!(call("GET", "/items/9", "").await.1, json!({ "item_id": 9 }));
    }

    #[tokio::test]
    async fn non_numeric_price_is_a_validation_error() {
        let (status, body) = call("POST", "/items/", r#"{"name":"Foo","price":"abc"}"#).await;
        assert_eq!(status, 422);
        assert_eq!(body["detail"][0]["loc"], json!(["body", "price"]));
    }

    #[tokio::test]
    async fn notify_requires_an_email() {
        let (status, body) = call("POST", "/notify?email=a%40b.com", "").await;
        assert_eq!(status, 200);
        assert!(body["message"].as_str().unwrap().starts_with("Notification scheduled: "));

        let (status, _) = call("POST", "/notify", "").await;
        assert_eq!(status, 422);
    }

    #[tokio::test]
    async fn async_endpoint_reports_completion() {
        let (status, body) = call("POST", "/async-endpoint", "").await;
        assert_eq!(status, 200);
        assert!(body["status"].as_str().unwrap().starts_with("Async operation completed"));
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, body) = call("GET", "/health", "").await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");
        assert!(body["time"].is_string());
    }
}
