use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use std::time::Duration;

use super::{error_response, parse_network};
use crate::models::AgentQuery;
use crate::AppState;

const DEFAULT_TOP_N: usize = 10;
const MAX_LIMIT: usize = 500;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/agents")
            .route("", web::get().to(search_agents))
            .route("/top", web::get().to(top_agents))
            .route("/refresh", web::post().to(refresh))
            .route("/sync/chain", web::post().to(sync_from_chain))
            .route("/{id}", web::get().to(get_agent)),
    );
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    capability: Option<String>,
    min_score: Option<f64>,
    limit: Option<usize>,
    network: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TopParams {
    n: Option<usize>,
    network: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NetworkParam {
    network: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RefreshRequest {
    #[serde(default)]
    network: Option<String>,
    #[serde(default)]
    ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ChainSyncRequest {
    #[serde(default)]
    network: Option<String>,
}

async fn search_agents(state: web::Data<AppState>, params: web::Query<SearchParams>) -> impl Responder {
    let network = match parse_network(params.network.as_deref(), state.config.default_network) {
        Ok(n) => n,
        Err(resp) => return resp,
    };
    let query = AgentQuery {
        chain_id: Some(network.chain_id()),
        capability: params.capability.clone().filter(|c| !c.trim().is_empty()),
        min_score: params.min_score,
        limit: params.limit.map(|l| l.min(MAX_LIMIT)),
    };

    match state.discovery.search_fresh(network, &query).await {
        Ok(agents) => HttpResponse::Ok().json(serde_json::json!({
            "network": network,
            "count": agents.len(),
            "agents": agents
        })),
        Err(e) => error_response(&e),
    }
}

async fn top_agents(state: web::Data<AppState>, params: web::Query<TopParams>) -> impl Responder {
    let network = match parse_network(params.network.as_deref(), state.config.default_network) {
        Ok(n) => n,
        Err(resp) => return resp,
    };
    let n = params.n.unwrap_or(DEFAULT_TOP_N).min(MAX_LIMIT);
    match state.discovery.top_n(network, n) {
        Ok(agents) => HttpResponse::Ok().json(serde_json::json!({ "network": network, "agents": agents })),
        Err(e) => error_response(&e),
    }
}

async fn get_agent(
    state: web::Data<AppState>,
    path: web::Path<u64>,
    params: web::Query<NetworkParam>,
) -> impl Responder {
    let agent_id = path.into_inner();
    let network = match parse_network(params.network.as_deref(), state.config.default_network) {
        Ok(n) => n,
        Err(resp) => return resp,
    };

    match state.discovery.lookup_by_id(agent_id, network).await {
        Ok(Some(agent)) => HttpResponse::Ok().json(agent),
        Ok(None) => HttpResponse::NotFound().json(serde_json::json!({
            "error": format!("Agent {} not found on {}", agent_id, network)
        })),
        Err(e) => error_response(&e),
    }
}

async fn refresh(state: web::Data<AppState>, body: Option<web::Json<RefreshRequest>>) -> impl Responder {
    let request = body.map(|b| b.into_inner()).unwrap_or_default();
    let network = match parse_network(request.network.as_deref(), state.config.default_network) {
        Ok(n) => n,
        Err(resp) => return resp,
    };
    let ttl = request.ttl_secs.map(Duration::from_secs);

    match state.discovery.refresh(network, ttl).await {
        Ok(outcome) => HttpResponse::Ok().json(serde_json::json!({
            "network": network,
            "synced": outcome.synced,
            "count": outcome.count
        })),
        Err(e) => error_response(&e),
    }
}

async fn sync_from_chain(state: web::Data<AppState>, body: Option<web::Json<ChainSyncRequest>>) -> impl Responder {
    let request = body.map(|b| b.into_inner()).unwrap_or_default();
    let network = match parse_network(request.network.as_deref(), state.config.default_network) {
        Ok(n) => n,
        Err(resp) => return resp,
    };

    log::info!("[discovery] Chain sync requested for {}", network);
    match state.discovery.orchestrator().sync_from_chain(network).await {
        Ok(outcome) => HttpResponse::Ok().json(serde_json::json!({
            "network": network,
            "outcome": outcome
        })),
        Err(e) => error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Database;
    use crate::discovery::sync::testing::StubSource;
    use crate::discovery::{DiscoveryService, SourceKind, SyncOrchestrator};
    use crate::models::AgentRecord;
    use actix_web::{test, App};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn record(id: u64, score: f64, capabilities: &[&str]) -> AgentRecord {
        let mut record = AgentRecord::new(id, 8453, format!("0x{:040x}", id));
        record.reputation_score = score;
        record.capabilities = capabilities.iter().map(|c| c.to_string()).collect();
        record
    }

    fn app_state(db: Arc<Database>, rest: Arc<StubSource>) -> web::Data<AppState> {
        let orchestrator = Arc::new(SyncOrchestrator::new(db.clone(), 1).with_source(rest));
        let discovery = Arc::new(DiscoveryService::new(orchestrator, Duration::from_secs(3600)));
        web::Data::new(AppState { db, config: Config::default(), discovery })
    }

    #[actix_web::test]
    async fn test_search_and_top() {
        let dir = tempdir().unwrap();
        let db = Arc::new(Database::new(dir.path().join("api.db").to_str().unwrap()).unwrap());
        let rest = Arc::new(StubSource::ok(
            SourceKind::Rest,
            db.clone(),
            vec![record(1, 40.0, &["x402"]), record(2, 90.0, &["mcp"]), record(3, 70.0, &["x402"])],
        ));
        let app = test::init_service(App::new().app_data(app_state(db, rest)).configure(config)).await;

        let req = test::TestRequest::get().uri("/api/agents?capability=x402").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["count"], 2);
        assert_eq!(body["agents"][0]["agent_id"], 3);
        assert_eq!(body["network"], "base");

        let req = test::TestRequest::get().uri("/api/agents/top?n=1").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["agents"][0]["agent_id"], 2);
    }

    #[actix_web::test]
    async fn test_get_agent_and_not_found() {
        let dir = tempdir().unwrap();
        let db = Arc::new(Database::new(dir.path().join("api.db").to_str().unwrap()).unwrap());
        db.upsert_agent(&record(5, 1.0, &[])).unwrap();
        let rest = Arc::new(StubSource::ok(SourceKind::Rest, db.clone(), vec![]));
        let app = test::init_service(App::new().app_data(app_state(db, rest)).configure(config)).await;

        let req = test::TestRequest::get().uri("/api/agents/5").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["agent_id"], 5);

        let req = test::TestRequest::get().uri("/api/agents/6").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);

        // Agent 5 only exists on base
        let req = test::TestRequest::get().uri("/api/agents/5?network=mainnet").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_failures_map_to_bad_gateway_and_bad_request() {
        let dir = tempdir().unwrap();
        let db = Arc::new(Database::new(dir.path().join("api.db").to_str().unwrap()).unwrap());
        let rest = Arc::new(StubSource::failing(SourceKind::Rest, db.clone()));
        let app = test::init_service(App::new().app_data(app_state(db, rest)).configure(config)).await;

        let req = test::TestRequest::get().uri("/api/agents").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_GATEWAY);

        let req = test::TestRequest::post()
            .uri("/api/agents/refresh")
            .set_json(serde_json::json!({ "network": "atlantis" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
    }
}
