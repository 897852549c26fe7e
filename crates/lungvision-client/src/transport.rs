//! HTTP transport: request envelopes and a bearer-aware executor.
//!
//! The access token is an explicit argument to every call. Nothing is
//! stashed in client-wide default headers.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

pub use reqwest::Method;

use crate::error::{Error, Result};
use crate::types::UploadFile;

/// Default timeout for requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

// ─────────────────────────────────────────────────────────────────────────────
// Request bodies
// ─────────────────────────────────────────────────────────────────────────────

/// Multipart payload that can be rebuilt for every send.
///
/// `reqwest::multipart::Form` is consumed on send, so replaying a request
/// after a token refresh needs a cloneable description instead. File
/// contents are `Bytes`, so clones share the buffer.
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    fields: Vec<(String, String)>,
    files: Vec<(String, UploadFile)>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Add a file field.
    pub fn file(mut self, name: impl Into<String>, file: UploadFile) -> Self {
        self.files.push((name.into(), file));
        self
    }

    /// Text fields in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Names of file fields in insertion order.
    pub fn file_names(&self) -> Vec<&str> {
        self.files.iter().map(|(name, _)| name.as_str()).collect()
    }

    fn to_form(&self) -> Result<Form> {
        let mut form = Form::new();
        for (name, value) in &self.fields {
            form = form.text(name.clone(), value.clone());
        }
        for (name, file) in &self.files {
            let mut part = Part::stream_with_length(file.bytes.clone(), file.len() as u64)
                .file_name(file.file_name.clone());
            if let Some(content_type) = &file.content_type {
                part = part.mime_str(content_type)?;
            }
            form = form.part(name.clone(), part);
        }
        Ok(form)
    }
}

/// Request body variants.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Multipart(MultipartForm),
}

// ─────────────────────────────────────────────────────────────────────────────
// Request envelope
// ─────────────────────────────────────────────────────────────────────────────

/// Everything needed to issue, and reissue, one API call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the base URL (leading `/` optional).
    pub path: String,
    pub body: RequestBody,
    /// Caller-supplied headers; an `Authorization` header here always wins
    /// over the session's bearer token.
    pub headers: HeaderMap,
    /// Overrides the transport's default timeout.
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: RequestBody::Empty,
            headers: HeaderMap::new(),
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Attach a JSON body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Attach a multipart body.
    pub fn multipart(mut self, form: MultipartForm) -> Self {
        self.body = RequestBody::Multipart(form);
        self
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Path without leading slash or query string.
    pub fn route(&self) -> &str {
        let path = self.path.trim_start_matches('/');
        path.split('?').next().unwrap_or(path)
    }

    /// The caller supplied its own credentials.
    pub fn has_authorization(&self) -> bool {
        self.headers.contains_key(AUTHORIZATION)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

/// Executes [`ApiRequest`]s against a base URL.
#[derive(Debug, Clone)]
pub struct Transport {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl Transport {
    /// `base_url` is used as-is; callers normalize the trailing slash.
    pub fn new(http: reqwest::Client, base_url: Url, timeout: Duration) -> Self {
        Self {
            http,
            base_url,
            timeout,
        }
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Get the default timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build a URL for an API path.
    pub fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(Error::from)
    }

    /// Send a request, attaching `bearer` unless the request carries its own
    /// `Authorization` header.
    ///
    /// Returns the raw success body. Non-2xx responses become
    /// [`Error::Api`] with the body parsed as JSON when possible.
    pub async fn execute(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<Bytes> {
        let url = self.url(&request.path)?;
        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .headers(request.headers.clone())
            .timeout(request.timeout.unwrap_or(self.timeout));

        if let Some(token) = bearer
            && !request.has_authorization()
        {
            builder = builder.bearer_auth(token);
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart(form) => builder.multipart(form.to_form()?),
        };

        tracing::debug!(method = %request.method, path = %request.route(), "Sending request");
        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        tracing::debug!(status = status.as_u16(), path = %request.route(), "Received response");

        if status.is_success() {
            Ok(body)
        } else {
            Err(Error::Api {
                status: status.as_u16(),
                payload: parse_payload(&body),
            })
        }
    }
}

fn parse_payload(body: &[u8]) -> Value {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

/// Decode a success body. Empty bodies decode as JSON `null`.
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::from_value(Value::Null)?);
    }
    Ok(serde_json::from_slice(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(server: &MockServer) -> Transport {
        let base = Url::parse(&format!("{}/api/", server.uri())).unwrap();
        Transport::new(reqwest::Client::new(), base, DEFAULT_TIMEOUT)
    }

    #[test]
    fn test_url_building() {
        let base = Url::parse("http://localhost:8000/api/").unwrap();
        let transport = Transport::new(reqwest::Client::new(), base, DEFAULT_TIMEOUT);

        let url = transport.url("login/").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/login/");

        let url = transport.url("/user/me/").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/user/me/");
    }

    #[test]
    fn test_route_strips_slash_and_query() {
        let request = ApiRequest::get("/user/me/?expand=1");
        assert_eq!(request.route(), "user/me/");
    }

    #[test]
    fn test_decode_empty_body_as_unit() {
        decode::<()>(b"").unwrap();
        let value: Value = decode(b"  ").unwrap();
        assert_eq!(value, Value::Null);
        assert!(decode::<DetailShape>(b"").is_err());
    }

    #[derive(Debug, serde::Deserialize)]
    #[allow(dead_code)]
    struct DetailShape {
        detail: String,
    }

    #[tokio::test]
    async fn test_bearer_attached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user/me/"))
            .and(header("authorization", "Bearer A1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let body = transport(&server)
            .execute(&ApiRequest::get("user/me/"), Some("A1"))
            .await
            .unwrap();
        let value: Value = decode(&body).unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn test_caller_authorization_wins() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user/me/"))
            .and(header("authorization", "Bearer caller"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let request = ApiRequest::get("user/me/").header(
            AUTHORIZATION,
            HeaderValue::from_static("Bearer caller"),
        );
        transport(&server)
            .execute(&request, Some("session-token"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_no_bearer_without_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/login/"))
            .and(body_json(json!({"email": "a@b.co", "password": "pw"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let request = ApiRequest::post("login/")
            .json(&json!({"email": "a@b.co", "password": "pw"}))
            .unwrap();
        transport(&server).execute(&request, None).await.unwrap();

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(!received[0].headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn test_error_carries_status_and_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/register/"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"email": ["already exists"]})),
            )
            .mount(&server)
            .await;

        let err = transport(&server)
            .execute(&ApiRequest::post("register/"), None)
            .await
            .unwrap_err();
        match err {
            Error::Api { status, payload } => {
                assert_eq!(status, 400);
                assert_eq!(payload["email"][0], "already exists");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_json_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user/me/"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;

        let err = transport(&server)
            .execute(&ApiRequest::get("user/me/"), None)
            .await
            .unwrap_err();
        assert!(err.is_server_error());
        match err {
            Error::Api { payload, .. } => assert_eq!(payload, json!("Bad Gateway")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        let base = Url::parse("http://127.0.0.1:9/api/").unwrap();
        let transport = Transport::new(
            reqwest::Client::new(),
            base,
            Duration::from_millis(500),
        );
        let err = transport
            .execute(&ApiRequest::get("user/me/"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_multipart_upload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/predict/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": 1})))
            .mount(&server)
            .await;

        let form = MultipartForm::new()
            .text("note", "hello")
            .file("file", UploadFile::new("study.zip", vec![0x50u8, 0x4b, 3, 4]));
        let request = ApiRequest::post("predict/").multipart(form);
        transport(&server).execute(&request, Some("A1")).await.unwrap();

        let received = server.received_requests().await.unwrap();
        let content_type = received[0]
            .headers
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(content_type.starts_with("multipart/form-data"));
        let body = String::from_utf8_lossy(&received[0].body);
        assert!(body.contains("name=\"note\""));
        assert!(body.contains("filename=\"study.zip\""));
        assert!(body.contains("application/zip"));
    }
}
