use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;

use super::{error_response, parse_network};
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/sync/status").route(web::get().to(sync_status)));
}

#[derive(Debug, Deserialize)]
struct StatusParams {
    network: Option<String>,
}

async fn sync_status(state: web::Data<AppState>, params: web::Query<StatusParams>) -> impl Responder {
    let network = match parse_network(params.network.as_deref(), state.config.default_network) {
        Ok(n) => n,
        Err(resp) => return resp,
    };

    let persisted = match state.db.list_sync_state(&format!("{}:", network)) {
        Ok(rows) => rows,
        Err(e) => return error_response(&e),
    };
    let persisted: serde_json::Map<String, serde_json::Value> = persisted
        .into_iter()
        .map(|(key, value)| {
            let concern = key.split_once(':').map(|(_, c)| c.to_string()).unwrap_or(key);
            (concern, serde_json::Value::String(value))
        })
        .collect();

    let cached = match state.discovery.count(network) {
        Ok(n) => n,
        Err(e) => return error_response(&e),
    };

    HttpResponse::Ok().json(serde_json::json!({
        "network": network,
        "status": state.discovery.orchestrator().status(network),
        "state": persisted,
        "cached_agents": cached
    }))
}
