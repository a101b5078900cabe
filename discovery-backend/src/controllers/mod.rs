pub mod agents;
pub mod health;
pub mod sync;

use actix_web::HttpResponse;

use crate::error::DiscoveryError;
use crate::networks::Network;

/// Map a discovery error onto a JSON error response.
pub fn error_response(err: &DiscoveryError) -> HttpResponse {
    let body = serde_json::json!({ "error": err.to_string() });
    match err {
        DiscoveryError::NotFound(_) => HttpResponse::NotFound().json(body),
        DiscoveryError::RateLimited { .. } => HttpResponse::TooManyRequests().json(body),
        DiscoveryError::Upstream { .. } | DiscoveryError::Timeout { .. } | DiscoveryError::AllSourcesFailed(_) => {
            HttpResponse::BadGateway().json(body)
        }
        DiscoveryError::Config(_) => HttpResponse::ServiceUnavailable().json(body),
        _ => {
            log::error!("Request failed: {}", err);
            HttpResponse::InternalServerError().json(serde_json::json!({ "error": "Internal server error" }))
        }
    }
}

/// Parse an optional `network` parameter, defaulting to the configured network.
pub fn parse_network(raw: Option<&str>, default: Network) -> Result<Network, HttpResponse> {
    match raw {
        None => Ok(default),
        Some(name) => name.parse::<Network>().map_err(|_| {
            HttpResponse::BadRequest().json(serde_json::json!({
                "error": format!("Unknown network '{}'", name)
            }))
        }),
    }
}
