//! Shared outbound HTTP client

use std::sync::OnceLock;
use std::time::Duration;

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Process-wide reqwest client. Per-request timeouts are set by callers.
pub fn shared_client() -> reqwest::Client {
    SHARED_CLIENT
        .get_or_init(|| {
            reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .user_agent(concat!("discovery-backend/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_else(|e| {
                    log::warn!("Failed to build HTTP client ({}), using defaults", e);
                    reqwest::Client::new()
                })
        })
        .clone()
}
