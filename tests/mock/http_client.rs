use async_trait::async_trait;
use rhdh_deployer::{
    http::{HttpClient, HttpRequest, HttpResponse},
    model::Error,
};
use std::{
    collections::{BTreeMap, VecDeque},
    sync::Mutex,
};

use super::Journal;

/// Answers requests keyed by `"{METHOD} {url}"`. Scripted responses replay in order and the last one repeats.
/// Anything unscripted gets a 404.
#[derive(Default)]
pub(crate) struct MockHttpClient {
    journal: Journal,
    responses: Mutex<BTreeMap<String, VecDeque<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
    /// Keys whose requests fail before reaching a server
    unreachable: Vec<String>,
}

impl MockHttpClient {
    pub(crate) fn new(journal: &Journal) -> Self {
        MockHttpClient {
            journal: journal.clone(),
            ..MockHttpClient::default()
        }
    }

    pub(crate) fn with_response(self, key: &str, status: u16, body: serde_json::Value) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(key.to_owned())
            .or_default()
            .push_back(HttpResponse { status, body });
        self
    }

    pub(crate) fn unreachable(mut self, key: &str) -> Self {
        self.unreachable.push(key.to_owned());
        self
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests sent as `"{METHOD} {url}"`
    pub(crate) fn keys(&self) -> Vec<String> {
        self.requests().iter().map(|request| format!("{} {}", request.method, request.url)).collect()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, Error> {
        let key = format!("{} {}", request.method, request.url);
        self.journal.record(format!("http {key}"));
        self.requests.lock().unwrap().push(request.clone());
        if self.unreachable.contains(&key) {
            return Err(Error::NetworkError {
                url: request.url.clone(),
                message: "connection refused".to_owned(),
            });
        }
        let mut responses = self.responses.lock().unwrap();
        let response = match responses.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        Ok(response.unwrap_or(HttpResponse {
            status: 404,
            body: serde_json::Value::Null,
        }))
    }
}
