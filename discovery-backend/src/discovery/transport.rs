//! Outbound HTTP seam used by every discovery source.
//!
//! Sources talk to an `HttpTransport` rather than to reqwest directly so that
//! pagination, backoff and fallback logic can run against scripted replies.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::error::{DiscoveryError, Result};

/// Status and raw body of a completed request
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Upstream error carrying the status and a trimmed body.
    pub fn to_error(&self, context: &str) -> DiscoveryError {
        let body = if self.body.is_empty() {
            "empty response".to_string()
        } else {
            self.body.chars().take(300).collect()
        };
        DiscoveryError::upstream(Some(self.status), format!("{} returned {}: {}", context, self.status, body))
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpReply>;

    async fn post_json(&self, url: &str, body: &Value, timeout: Duration) -> Result<HttpReply>;
}

/// reqwest-backed transport
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self { client: crate::http::shared_client() }
    }

    async fn finish(
        request: reqwest::RequestBuilder,
        url: &str,
        timeout: Duration,
    ) -> Result<HttpReply> {
        let response = request.timeout(timeout).send().await.map_err(|e| map_send_error(e, url, timeout))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| map_send_error(e, url, timeout))?;
        Ok(HttpReply { status, body })
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| url.to_string())
}

fn map_send_error(err: reqwest::Error, url: &str, timeout: Duration) -> DiscoveryError {
    if err.is_timeout() {
        DiscoveryError::Timeout { endpoint: host_of(url), secs: timeout.as_secs() }
    } else {
        DiscoveryError::upstream(None, format!("request to {} failed: {}", host_of(url), err))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpReply> {
        log::debug!("[transport] GET {}", url);
        Self::finish(self.client.get(url), url, timeout).await
    }

    async fn post_json(&self, url: &str, body: &Value, timeout: Duration) -> Result<HttpReply> {
        log::debug!("[transport] POST {}", host_of(url));
        Self::finish(self.client.post(url).json(body), url, timeout).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted transport for source tests.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// A recorded outbound request
    #[derive(Debug, Clone)]
    pub struct Recorded {
        pub method: &'static str,
        pub url: String,
        pub body: Option<Value>,
        pub at: tokio::time::Instant,
    }

    /// Replays queued replies in order; once the queue is empty the fallback
    /// reply (if any) is returned for every further request.
    #[derive(Default)]
    pub struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<HttpReply>>>,
        fallback: Mutex<Option<HttpReply>>,
        pub requests: Mutex<Vec<Recorded>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push(&self, status: u16, body: impl Into<String>) -> &Self {
            self.replies.lock().unwrap().push_back(Ok(HttpReply::new(status, body)));
            self
        }

        pub fn push_json(&self, status: u16, body: Value) -> &Self {
            self.push(status, body.to_string())
        }

        pub fn push_err(&self, err: DiscoveryError) -> &Self {
            self.replies.lock().unwrap().push_back(Err(err));
            self
        }

        pub fn always(&self, status: u16, body: impl Into<String>) -> &Self {
            *self.fallback.lock().unwrap() = Some(HttpReply::new(status, body));
            self
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn recorded(&self) -> Vec<Recorded> {
            self.requests.lock().unwrap().clone()
        }

        fn next(&self, method: &'static str, url: &str, body: Option<&Value>) -> Result<HttpReply> {
            self.requests.lock().unwrap().push(Recorded {
                method,
                url: url.to_string(),
                body: body.cloned(),
                at: tokio::time::Instant::now(),
            });
            if let Some(reply) = self.replies.lock().unwrap().pop_front() {
                return reply;
            }
            match self.fallback.lock().unwrap().clone() {
                Some(reply) => Ok(reply),
                None => Err(DiscoveryError::upstream(None, format!("no scripted reply for {}", url))),
            }
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn get(&self, url: &str, _timeout: Duration) -> Result<HttpReply> {
            self.next("GET", url, None)
        }

        async fn post_json(&self, url: &str, body: &Value, _timeout: Duration) -> Result<HttpReply> {
            self.next("POST", url, Some(body))
        }
    }
}
