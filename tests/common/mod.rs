use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Mutex;
use theme_import::{Fetch, FetchError};

/// In-memory site: serves canned bodies and records requests.
#[derive(Default)]
pub struct StaticSite {
    resources: HashMap<String, Vec<u8>>,
    requests: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl StaticSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, body: &str) -> Self {
        self.resources.insert(url.to_string(), body.as_bytes().to_vec());
        self
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.as_str() == url)
            .count()
    }
}

impl Fetch for StaticSite {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, FetchError>> {
        self.requests.lock().unwrap().push(url.to_string());
        let result = self
            .resources
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            });
        async move { result }.boxed()
    }
}
