//! HttpTransport - the HTTP capability API workflows consume.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  HttpTransport (abstract trait)                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────┐   ┌──────────────────────────────┐ │
//! │  │  ReqwestTransport    │   │  MockTransport               │ │
//! │  │  (`http` feature)    │   │  in-memory REST store,       │ │
//! │  │                      │   │  bearer auth, fixtures       │ │
//! │  └──────────────────────┘   └──────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A transport returns every HTTP status as a response. Only failures to
//! obtain a response at all are errors ([`SondarError::RemoteCallFailed`],
//! or [`SondarError::Timeout`]).

use crate::network::{HttpMethod, UrlPattern};
use crate::result::{SondarError, SondarResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

/// Request payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestBody {
    /// JSON document (`application/json`)
    Json {
        /// Document
        value: Value,
    },
    /// Raw text with an explicit content type
    Text {
        /// Content-Type header value
        content_type: String,
        /// Payload
        text: String,
    },
}

/// An HTTP request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Method
    pub method: HttpMethod,
    /// Absolute URL
    pub url: String,
    /// Extra headers
    pub headers: BTreeMap<String, String>,
    /// Bearer token for the Authorization header
    pub bearer: Option<String>,
    /// Payload
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    /// Create a request without body or headers
    #[must_use]
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            bearer: None,
            body: None,
        }
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the bearer token
    #[must_use]
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Set a JSON body
    #[must_use]
    pub fn with_json(mut self, value: Value) -> Self {
        self.body = Some(RequestBody::Json { value });
        self
    }

    /// Set a text body
    #[must_use]
    pub fn with_text(mut self, content_type: impl Into<String>, text: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Text {
            content_type: content_type.into(),
            text: text.into(),
        });
        self
    }
}

/// An HTTP response
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Parsed JSON body; non-JSON bodies become a string, empty bodies null
    pub body: Value,
}

impl HttpResponse {
    /// Create a response
    #[must_use]
    pub const fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// Parse a raw body
    #[must_use]
    pub fn from_text(status: u16, text: &str) -> Self {
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
        };
        Self { status, body }
    }
}

/// Abstract HTTP client
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a request and return whatever status the server answered with
    ///
    /// # Errors
    ///
    /// [`SondarError::RemoteCallFailed`] when no response was obtained.
    async fn send(&self, request: &HttpRequest) -> SondarResult<HttpResponse>;
}

// =============================================================================
// REQWEST TRANSPORT
// =============================================================================

/// reqwest-backed transport
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

#[cfg(feature = "http")]
impl ReqwestTransport {
    /// Create a transport with a request timeout and User-Agent
    ///
    /// # Errors
    ///
    /// [`SondarError::Config`] when the client cannot be built, for
    /// example because the User-Agent is not a valid header value.
    pub fn new(timeout: Duration, user_agent: &str) -> SondarResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| SondarError::config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }

    fn method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> SondarResult<HttpResponse> {
        let mut builder = self
            .client
            .request(Self::method(request.method), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        builder = match &request.body {
            Some(RequestBody::Json { value }) => builder.json(value),
            Some(RequestBody::Text { content_type, text }) => builder
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(text.clone()),
            None => builder,
        };

        let failed = |e: reqwest::Error| {
            if e.is_timeout() {
                SondarError::timeout(
                    format!("{} {}", request.method, request.url),
                    self.timeout.as_millis() as u64,
                )
            } else {
                SondarError::RemoteCallFailed {
                    method: request.method.to_string(),
                    url: request.url.clone(),
                    message: e.to_string(),
                }
            }
        };

        let resp = builder.send().await.map_err(failed)?;
        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(failed)?;
        Ok(HttpResponse::from_text(status, &text))
    }
}

// =============================================================================
// MOCK TRANSPORT
// =============================================================================

/// Canned response for requests matching a method and URL pattern
#[derive(Debug, Clone)]
struct Fixture {
    method: HttpMethod,
    pattern: UrlPattern,
    response: HttpResponse,
}

#[derive(Debug, Default)]
struct Store {
    collections: HashMap<String, BTreeMap<u64, Value>>,
    next_id: u64,
}

/// In-memory REST service for unit testing
///
/// Fixtures answer first. Everything else is treated as REST over the URL
/// path: `POST /users` creates (ids start at 42), `GET|PUT|PATCH|DELETE
/// /users/{id}` address one record, and `GET /users` lists. When a token is
/// required, mutating requests without it get `401`.
#[derive(Debug)]
pub struct MockTransport {
    required_token: Option<String>,
    fixtures: Vec<Fixture>,
    unreachable: Vec<UrlPattern>,
    latency: Duration,
    store: Mutex<Store>,
    history: Mutex<Vec<HttpRequest>>,
}

/// First id assigned by [`MockTransport`]
pub const MOCK_FIRST_ID: u64 = 42;

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            required_token: None,
            fixtures: Vec::new(),
            unreachable: Vec::new(),
            latency: Duration::ZERO,
            store: Mutex::new(Store {
                collections: HashMap::new(),
                next_id: MOCK_FIRST_ID,
            }),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Require a bearer token for mutating requests
    #[must_use]
    pub fn with_required_token(mut self, token: impl Into<String>) -> Self {
        self.required_token = Some(token.into());
        self
    }

    /// Answer matching requests with a canned response
    #[must_use]
    pub fn with_fixture(
        mut self,
        method: HttpMethod,
        pattern: UrlPattern,
        status: u16,
        body: Value,
    ) -> Self {
        self.fixtures.push(Fixture {
            method,
            pattern,
            response: HttpResponse::new(status, body),
        });
        self
    }

    /// Fail matching requests at the transport level
    #[must_use]
    pub fn with_unreachable(mut self, pattern: UrlPattern) -> Self {
        self.unreachable.push(pattern);
        self
    }

    /// Delay every response
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Seed a record
    #[must_use]
    pub fn with_record(self, collection: &str, id: u64, value: Value) -> Self {
        if let Ok(mut store) = self.store.lock() {
            store
                .collections
                .entry(collection.trim_end_matches('/').to_string())
                .or_default()
                .insert(id, with_id(value, id));
        }
        self
    }

    /// Requests received so far
    #[must_use]
    pub fn history(&self) -> Vec<HttpRequest> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    /// Number of records in a collection path (e.g. `/public/v2/users`)
    #[must_use]
    pub fn record_count(&self, collection: &str) -> usize {
        self.store
            .lock()
            .ok()
            .and_then(|s| s.collections.get(collection.trim_end_matches('/')).map(BTreeMap::len))
            .unwrap_or(0)
    }

    fn authorized(&self, request: &HttpRequest) -> bool {
        match (&self.required_token, request.method) {
            (_, HttpMethod::Get | HttpMethod::Head) | (None, _) => true,
            (Some(token), _) => request.bearer.as_deref() == Some(token.as_str()),
        }
    }

    fn rest(&self, request: &HttpRequest) -> SondarResult<HttpResponse> {
        let mut store = self
            .store
            .lock()
            .map_err(|_| SondarError::driver("mock transport store poisoned"))?;
        let path = url_path(&request.url);
        let (collection, id) = split_id(path);
        let body = match &request.body {
            Some(RequestBody::Json { value }) => value.clone(),
            Some(RequestBody::Text { text, .. }) => Value::String(text.clone()),
            None => Value::Null,
        };

        let not_found = || HttpResponse::new(404, json!({ "message": "Resource not found" }));
        Ok(match (request.method, id) {
            (HttpMethod::Post, None) => {
                let id = store.next_id;
                store.next_id += 1;
                let record = with_id(body, id);
                store
                    .collections
                    .entry(collection.to_string())
                    .or_default()
                    .insert(id, record.clone());
                HttpResponse::new(201, record)
            }
            (HttpMethod::Get | HttpMethod::Head, None) => {
                let items: Vec<Value> = store
                    .collections
                    .get(collection)
                    .map(|c| c.values().cloned().collect())
                    .unwrap_or_default();
                HttpResponse::new(200, Value::Array(items))
            }
            (HttpMethod::Get | HttpMethod::Head, Some(id)) => store
                .collections
                .get(collection)
                .and_then(|c| c.get(&id))
                .map_or_else(not_found, |v| HttpResponse::new(200, v.clone())),
            (HttpMethod::Put | HttpMethod::Patch, Some(id)) => {
                let method = request.method;
                match store.collections.get_mut(collection).and_then(|c| c.get_mut(&id)) {
                    Some(existing) => {
                        *existing = if method == HttpMethod::Patch {
                            merge(existing.clone(), body)
                        } else {
                            with_id(body, id)
                        };
                        HttpResponse::new(200, existing.clone())
                    }
                    None => not_found(),
                }
            }
            (HttpMethod::Delete, Some(id)) => {
                match store.collections.get_mut(collection).and_then(|c| c.remove(&id)) {
                    Some(_) => HttpResponse::new(204, Value::Null),
                    None => not_found(),
                }
            }
            _ => HttpResponse::new(405, json!({ "message": "Method not allowed" })),
        })
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: &HttpRequest) -> SondarResult<HttpResponse> {
        if let Ok(mut history) = self.history.lock() {
            history.push(request.clone());
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.unreachable.iter().any(|p| p.matches(&request.url)) {
            return Err(SondarError::RemoteCallFailed {
                method: request.method.to_string(),
                url: request.url.clone(),
                message: "connection refused".to_string(),
            });
        }
        if let Some(fixture) = self
            .fixtures
            .iter()
            .find(|f| f.method == request.method && f.pattern.matches(&request.url))
        {
            return Ok(fixture.response.clone());
        }
        if !self.authorized(request) {
            return Ok(HttpResponse::new(
                401,
                json!({ "message": "Authentication failed" }),
            ));
        }
        self.rest(request)
    }
}

/// Path of a URL without scheme, host, query or trailing slash
fn url_path(url: &str) -> &str {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = without_scheme
        .find('/')
        .map_or("", |i| &without_scheme[i..]);
    let path = path.split(|c| c == '?' || c == '#').next().unwrap_or("");
    path.trim_end_matches('/')
}

/// Split `/users/42` into (`/users`, Some(42))
fn split_id(path: &str) -> (&str, Option<u64>) {
    match path.rsplit_once('/') {
        Some((collection, last)) => match last.parse::<u64>() {
            Ok(id) => (collection, Some(id)),
            Err(_) => (path, None),
        },
        None => (path, None),
    }
}

fn with_id(value: Value, id: u64) -> Value {
    match value {
        Value::Object(mut map) => {
            map.insert("id".to_string(), json!(id));
            Value::Object(map)
        }
        _ => json!({ "id": id }),
    }
}

fn merge(existing: Value, patch: Value) -> Value {
    match (existing, patch) {
        (Value::Object(mut base), Value::Object(patch)) => {
            base.extend(patch);
            Value::Object(base)
        }
        (existing, _) => existing,
    }
}
