//! HTTP surface of the relay
//!
//! | Route                   | Auth            | Body                 |
//! |-------------------------|-----------------|----------------------|
//! | `POST /update-dns`      | sealed envelope | [`Ack`]              |
//! | `GET /manage-records`   | bearer header   | record list          |
//! | `DELETE /manage-records`| sealed envelope | [`Ack`]              |
//! | `GET /manage-key`       | bearer header   | [`KeyView`]          |
//! | `POST /manage-key`      | sealed envelope | [`Ack`]              |
//!
//! Handlers only translate between HTTP and [`Relay`]; failures become an
//! [`Ack`] with the status code chosen by [`status_for`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use ddns_core::config::ServerConfig;
use ddns_core::{Ack, AuthChannel, DomainRecord, Error, KeyView, Relay};
use serde::Deserialize;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::ratelimit::{RateLimiter, throttle};

#[derive(Clone)]
struct AppState {
    relay: Relay,
}

/// Build the relay router with its middleware stack
///
/// Outermost first: tracing, request deadline, rate limit, body cap.
/// Unknown paths and methods answer with an [`Ack`] like every other error.
pub fn router(relay: Relay, config: &ServerConfig) -> Router {
    let limiter = Arc::new(RateLimiter::new(
        Duration::from_secs(config.rate_limit_secs),
        config.trust_proxy_headers,
    ));

    let routes = Router::new()
        .route("/update-dns", post(update_dns))
        .route("/manage-records", get(list_records).delete(delete_record))
        .route("/manage-key", get(view_key).post(rotate_key))
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(route_not_found)
        .with_state(AppState { relay })
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(middleware::from_fn_with_state(limiter, throttle));

    with_deadline(routes, Duration::from_secs(config.request_timeout_secs))
        .layer(TraceLayer::new_for_http())
}

/// Bound every request by `timeout`; an expired one answers 408 with an [`Ack`]
fn with_deadline(router: Router, timeout: Duration) -> Router {
    router
        .layer(TimeoutLayer::new(timeout))
        .layer(middleware::map_response(timeout_ack))
}

async fn timeout_ack(response: Response) -> Response {
    if response.status() != StatusCode::REQUEST_TIMEOUT {
        return response;
    }
    (
        StatusCode::REQUEST_TIMEOUT,
        Json(Ack::error("Request timed out")),
    )
        .into_response()
}

async fn route_not_found() -> (StatusCode, Json<Ack>) {
    (StatusCode::NOT_FOUND, Json(Ack::error("No such endpoint")))
}

async fn method_not_allowed() -> (StatusCode, Json<Ack>) {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(Ack::error("Method not allowed for this endpoint")),
    )
}

/// A failed request
#[derive(Debug)]
pub enum ApiError {
    Relay(Error),
    Body(BytesRejection),
    Query(QueryRejection),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::Relay(err)
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        Self::Body(rejection)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Query(rejection)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Relay(err) => (status_for(&err), err.public_message()),
            Self::Body(rejection) => {
                let status = rejection.status();
                let message = if status == StatusCode::PAYLOAD_TOO_LARGE {
                    "Request body too large".to_string()
                } else {
                    rejection.body_text()
                };
                (status, message)
            }
            Self::Query(rejection) => (StatusCode::BAD_REQUEST, rejection.body_text()),
        };
        (status, Json(Ack::error(message))).into_response()
    }
}

/// HTTP status for a relay error
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::BadRequest(_) | Error::InvalidKeyLength(_) => StatusCode::BAD_REQUEST,
        Error::AuthenticationFailed(AuthChannel::Bearer) => StatusCode::UNAUTHORIZED,
        Error::AuthenticationFailed(AuthChannel::Envelope) | Error::DecryptionFailed => {
            StatusCode::FORBIDDEN
        }
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::QuotaExceeded { .. } | Error::Conflict(_) => StatusCode::CONFLICT,
        Error::Provider { .. }
        | Error::Persistence(_)
        | Error::Store(_)
        | Error::Config(_)
        | Error::Io(_)
        | Error::Json(_)
        | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Run relay work on its own task
///
/// Once a request reaches the relay it runs to completion, even if the
/// client goes away or the request deadline fires.
async fn detached<T, F>(work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: Future<Output = ddns_core::Result<T>> + Send + 'static,
{
    tokio::spawn(work)
        .await
        .map_err(|e| Error::internal(format!("Request task failed: {e}")))?
        .map_err(ApiError::from)
}

#[derive(Debug, Deserialize)]
struct ViewQuery {
    #[serde(default)]
    username: String,
}

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
}

/// POST /update-dns
async fn update_dns(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Ack>, ApiError> {
    let body = body?;
    let relay = state.relay;
    let receipt = detached(async move { relay.update_dns(&body).await }).await?;
    Ok(Json(Ack::success(receipt.message())))
}

/// GET /manage-records?username=
async fn list_records(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<ViewQuery>, QueryRejection>,
) -> Result<Json<Vec<DomainRecord>>, ApiError> {
    let Query(query) = query?;
    let records = state
        .relay
        .list_records(&query.username, authorization(&headers))
        .await?;
    Ok(Json(records))
}

/// DELETE /manage-records
async fn delete_record(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Ack>, ApiError> {
    let body = body?;
    let relay = state.relay;
    let message = detached(async move { relay.delete_record(&body).await }).await?;
    Ok(Json(Ack::success(message)))
}

/// GET /manage-key?username=
async fn view_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<ViewQuery>, QueryRejection>,
) -> Result<Json<KeyView>, ApiError> {
    let Query(query) = query?;
    let key = state
        .relay
        .view_key(&query.username, authorization(&headers))
        .await?;
    Ok(Json(key))
}

/// POST /manage-key
async fn rotate_key(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Ack>, ApiError> {
    let body = body?;
    let relay = state.relay;
    let message = detached(async move { relay.rotate_key(&body).await }).await?;
    Ok(Json(Ack::success(message)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::extract::ConnectInfo;
    use axum::http::{Method, Request};
    use ddns_core::protocol::{DeleteRecordPayload, RotateKeyPayload, UpdateDnsPayload};
    use ddns_core::{DnsProvider, Envelope, Ledger, ProviderRecord};
    use std::collections::HashMap;
    use std::net::{Ipv4Addr, SocketAddr};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const KEY: &str = "0123456789abcdef0123456789abcdef";

    /// In-memory zone keyed by record id
    #[derive(Default)]
    struct ZoneProvider {
        records: Mutex<HashMap<String, (String, String, String)>>,
        next_id: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl DnsProvider for ZoneProvider {
        async fn find_record(
            &self,
            domain: &str,
            rr: &str,
        ) -> Result<Option<ProviderRecord>, Error> {
            if self.fail {
                return Err(Error::provider("zone", "InvalidAccessKeyId LTAI-secret"));
            }
            let records = self.records.lock().unwrap();
            Ok(records
                .iter()
                .find(|(_, (d, r, _))| d == domain && r == rr)
                .map(|(id, (_, r, value))| ProviderRecord {
                    record_id: id.clone(),
                    rr: r.clone(),
                    value: value.clone(),
                }))
        }

        async fn create_record(
            &self,
            domain: &str,
            rr: &str,
            value: Ipv4Addr,
        ) -> Result<String, Error> {
            let id = format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
            self.records.lock().unwrap().insert(
                id.clone(),
                (domain.to_string(), rr.to_string(), value.to_string()),
            );
            Ok(id)
        }

        async fn update_record(
            &self,
            record_id: &str,
            _rr: &str,
            value: Ipv4Addr,
        ) -> Result<(), Error> {
            match self.records.lock().unwrap().get_mut(record_id) {
                Some(record) => {
                    record.2 = value.to_string();
                    Ok(())
                }
                None => Err(Error::provider("zone", "no such record")),
            }
        }

        async fn delete_record(&self, record_id: &str) -> Result<(), Error> {
            self.records.lock().unwrap().remove(record_id);
            Ok(())
        }

        fn provider_name(&self) -> &'static str {
            "zone"
        }
    }

    struct Harness {
        _dir: TempDir,
        app: Router,
    }

    async fn harness_with(provider: ZoneProvider, config: ServerConfig) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let document = serde_json::json!({
            "users": [
                {
                    "username": "alice",
                    "secret_token": "tok-alice",
                    "encryption_key": KEY,
                    "domain_limit": 1,
                    "records": []
                },
                {
                    "username": "bob",
                    "secret_token": "tok-bob",
                    "encryption_key": KEY,
                    "domain_limit": 1,
                    "records": []
                }
            ]
        });
        std::fs::write(&path, serde_json::to_vec(&document).unwrap()).unwrap();

        let ledger = Arc::new(Ledger::open(&path).await.unwrap());
        let relay = Relay::new(ledger, Arc::new(provider));
        Harness {
            _dir: dir,
            app: router(relay, &config),
        }
    }

    async fn harness() -> Harness {
        harness_with(ZoneProvider::default(), ServerConfig::default()).await
    }

    /// Each request comes from its own address so the limiter stays out of the way
    fn request(method: Method, uri: &str, body: Vec<u8>, client: u8) -> Request<Body> {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, client], 40000))));
        request
    }

    fn bearer_get(uri: &str, token: &str, client: u8) -> Request<Body> {
        let mut request = request(Method::GET, uri, Vec::new(), client);
        request.headers_mut().insert(
            header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
        request
    }

    fn update(user: &str, rr: &str, ip: &str) -> Vec<u8> {
        let payload = UpdateDnsPayload {
            secret_token: format!("tok-{user}"),
            domain_name: "example.com".to_string(),
            rr: rr.to_string(),
            new_ip: ip.to_string(),
        };
        serde_json::to_vec(&Envelope::seal(user, KEY.as_bytes(), &payload).unwrap()).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn update_then_list() {
        let h = harness().await;

        let (status, body) = send(
            &h.app,
            request(Method::POST, "/update-dns", update("alice", "home", "1.2.3.4"), 1),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");

        let (status, body) = send(
            &h.app,
            request(Method::POST, "/update-dns", update("alice", "home", "1.2.3.4"), 2),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].as_str().unwrap().contains("no change"));

        let (status, body) = send(
            &h.app,
            bearer_get("/manage-records?username=alice", "tok-alice", 3),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let records = body.as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["rr"], "home");
        assert_eq!(records[0]["domain_name"], "example.com");
    }

    #[tokio::test]
    async fn status_codes_follow_error_kind() {
        let h = harness().await;

        // malformed envelope
        let (status, body) = send(
            &h.app,
            request(Method::POST, "/update-dns", b"{not json".to_vec(), 1),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");

        // unknown user
        let (status, _) = send(
            &h.app,
            request(Method::POST, "/update-dns", update("mallory", "home", "1.2.3.4"), 2),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // conflict
        send(
            &h.app,
            request(Method::POST, "/update-dns", update("alice", "home", "1.2.3.4"), 3),
        )
        .await;
        let (status, _) = send(
            &h.app,
            request(Method::POST, "/update-dns", update("bob", "home", "5.6.7.8"), 4),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        // wrong bearer token
        let (status, body) = send(
            &h.app,
            bearer_get("/manage-key?username=alice", "tok-bob", 5),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Authentication failed");

        // missing username
        let (status, _) = send(&h.app, bearer_get("/manage-key", "tok-alice", 6)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn provider_failure_is_generic_500() {
        let provider = ZoneProvider {
            fail: true,
            ..ZoneProvider::default()
        };
        let h = harness_with(provider, ServerConfig::default()).await;

        let (status, body) = send(
            &h.app,
            request(Method::POST, "/update-dns", update("alice", "home", "1.2.3.4"), 1),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body["message"].as_str().unwrap().contains("LTAI"));
    }

    #[tokio::test]
    async fn delete_and_key_management() {
        let h = harness().await;
        send(
            &h.app,
            request(Method::POST, "/update-dns", update("alice", "home", "1.2.3.4"), 1),
        )
        .await;

        let delete = DeleteRecordPayload {
            secret_token: "tok-alice".to_string(),
            domain_name: "example.com".to_string(),
            rr: "home".to_string(),
        };
        let body =
            serde_json::to_vec(&Envelope::seal("alice", KEY.as_bytes(), &delete).unwrap()).unwrap();
        let (status, ack) = send(
            &h.app,
            request(Method::DELETE, "/manage-records", body.clone(), 2),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["message"], "home.example.com has been removed");

        let (status, _) = send(&h.app, request(Method::DELETE, "/manage-records", body, 3)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let short = RotateKeyPayload {
            secret_token: "tok-alice".to_string(),
            new_encryption_key: "too-short".to_string(),
        };
        let body =
            serde_json::to_vec(&Envelope::seal("alice", KEY.as_bytes(), &short).unwrap()).unwrap();
        let (status, _) = send(&h.app, request(Method::POST, "/manage-key", body, 4)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let new_key = "abcdefghijklmnopqrstuvwxyz012345";
        let rotate = RotateKeyPayload {
            secret_token: "tok-alice".to_string(),
            new_encryption_key: new_key.to_string(),
        };
        let body =
            serde_json::to_vec(&Envelope::seal("alice", KEY.as_bytes(), &rotate).unwrap()).unwrap();
        let (status, _) = send(&h.app, request(Method::POST, "/manage-key", body, 5)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, view) = send(
            &h.app,
            bearer_get("/manage-key?username=alice", "tok-alice", 6),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["encryption_key"], new_key);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let config = ServerConfig {
            max_body_bytes: 64,
            ..ServerConfig::default()
        };
        let h = harness_with(ZoneProvider::default(), config).await;

        let (status, body) = send(
            &h.app,
            request(Method::POST, "/update-dns", vec![b'x'; 1024], 1),
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["message"], "Request body too large");
    }

    #[tokio::test]
    async fn repeated_client_is_throttled() {
        let h = harness().await;

        let uri = "/manage-records?username=alice";
        let (first, _) = send(&h.app, bearer_get(uri, "tok-alice", 9)).await;
        let (second, body) = send(&h.app, bearer_get(uri, "tok-alice", 9)).await;
        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn unknown_routes_and_methods_answer_with_ack() {
        let h = harness().await;

        let (status, body) = send(
            &h.app,
            request(Method::PUT, "/update-dns", update("alice", "home", "1.2.3.4"), 1),
        )
        .await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["status"], "error");
        assert!(body["message"].is_string());

        let (status, body) = send(&h.app, request(Method::GET, "/nope", Vec::new(), 2)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "No such endpoint");
    }

    #[tokio::test]
    async fn expired_deadline_answers_with_ack() {
        let slow = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                "late"
            }),
        );
        let app = with_deadline(slow, Duration::from_millis(50));

        let (status, body) = send(&app, request(Method::GET, "/slow", Vec::new(), 1)).await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Request timed out");
    }

    #[test]
    fn auth_channels_map_to_distinct_statuses() {
        assert_eq!(
            status_for(&Error::AuthenticationFailed(AuthChannel::Bearer)),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_for(&Error::AuthenticationFailed(AuthChannel::Envelope)),
            StatusCode::FORBIDDEN
        );
        assert_eq!(status_for(&Error::InvalidKeyLength(16)), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&Error::persistence("disk full")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
