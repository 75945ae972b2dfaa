use async_trait::async_trait;
use rhdh_deployer::{http::HttpFetcher, model::Error};
use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicUsize, Ordering},
};

/// Serves canned JSON documents by URL
#[derive(Default)]
pub(crate) struct MockHttpFetcher {
    responses: BTreeMap<String, serde_json::Value>,
    calls: AtomicUsize,
}

impl MockHttpFetcher {
    pub(crate) fn with_response(mut self, url: &str, body: serde_json::Value) -> Self {
        self.responses.insert(url.to_owned(), body);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpFetcher for MockHttpFetcher {
    async fn get_json(&self, url: &str) -> Result<serde_json::Value, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses.get(url).cloned().ok_or_else(|| Error::NetworkError {
            url: url.to_owned(),
            message: "404 Not Found".to_owned(),
        })
    }
}
