use async_trait::async_trait;
use serde_json::Value;
use std::fmt::{Display, Formatter};
use tracing::debug;

use crate::model::Error;

/// Read-only access to the remote endpoints used during synthesis and chart resolution
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    /// Fetches `url` and decodes the body as JSON. Non-success statuses are errors.
    async fn get_json(&self, url: &str) -> Result<Value, Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl Display for HttpMethod {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
            HttpMethod::Put => write!(f, "PUT"),
            HttpMethod::Delete => write!(f, "DELETE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    /// `application/x-www-form-urlencoded` pairs
    Form(Vec<(String, String)>),
}

/// A request against an API that answers in JSON
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub bearer_token: Option<String>,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        HttpRequest {
            method,
            url: url.into(),
            bearer_token: None,
            body: RequestBody::Empty,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, url)
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.bearer_token = Some(token.to_owned());
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn form<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.body = RequestBody::Form(pairs.into_iter().map(|(key, value)| (key.into(), value.into())).collect());
        self
    }
}

/// Status and decoded body. An empty body decodes to `Null`, a body that is not JSON to a string.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_conflict(&self) -> bool {
        self.status == 409
    }

    /// Turns a non-success status into [`Error::NetworkError`]
    pub fn error_for_status(self, url: &str) -> Result<Self, Error> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(network_error(url, format!("{} {}", self.status, self.body)))
        }
    }
}

/// Read-write access to administrative JSON APIs
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends the request. Any status is returned as a response, only transport failures are errors.
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, Error>;
}

#[derive(Clone, Default)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        ReqwestFetcher { client }
    }
}

pub(crate) fn network_error(url: &str, message: impl ToString) -> Error {
    Error::NetworkError {
        url: url.to_owned(),
        message: message.to_string(),
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get_json(&self, url: &str) -> Result<Value, Error> {
        debug!("GET {url}");
        let response = self.client.get(url).send().await.map_err(|error| network_error(url, error))?;
        let status = response.status();
        if !status.is_success() {
            return Err(network_error(
                url,
                format!("{} {}", status.as_u16(), status.canonical_reason().unwrap_or("")),
            ));
        }
        response.json::<Value>().await.map_err(|error| network_error(url, error))
    }
}

#[async_trait]
impl HttpClient for ReqwestFetcher {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, Error> {
        let url = request.url.as_str();
        debug!("{} {url}", request.method);
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };
        let mut builder = self.client.request(method, url);
        if let Some(token) = &request.bearer_token {
            builder = builder.bearer_auth(token);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(body),
            RequestBody::Form(pairs) => builder.form(pairs),
        };
        let response = builder.send().await.map_err(|error| network_error(url, error))?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|error| network_error(url, error))?;
        Ok(HttpResponse {
            status,
            body: decode_body(&text),
        })
    }
}

fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_body() {
        assert_eq!(decode_body(""), Value::Null);
        assert_eq!(decode_body("{\"access_token\":\"t\"}"), json!({ "access_token": "t" }));
        assert_eq!(decode_body("Service Unavailable"), Value::String("Service Unavailable".to_owned()));
    }

    #[test]
    fn test_request_builders() {
        let request = HttpRequest::post("https://sso.example.com/token").form([("grant_type", "password")]);
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.body, RequestBody::Form(vec![("grant_type".to_owned(), "password".to_owned())]));
        assert_eq!(request.bearer_token, None);
        assert_eq!(HttpRequest::delete("u").bearer("t").bearer_token.as_deref(), Some("t"));
    }

    #[test]
    fn test_error_for_status() {
        let conflict = HttpResponse { status: 409, body: Value::Null };
        assert!(conflict.is_conflict());
        let error = conflict.error_for_status("https://sso.example.com").unwrap_err();
        assert!(matches!(error, Error::NetworkError { message, .. } if message.starts_with("409")));
        assert!(HttpResponse { status: 204, body: Value::Null }.error_for_status("u").is_ok());
    }
}
