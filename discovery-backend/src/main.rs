use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::path::Path;
use std::sync::Arc;

use discovery_backend::config::Config;
use discovery_backend::controllers;
use discovery_backend::db::Database;
use discovery_backend::discovery::rest::RestFetcher;
use discovery_backend::discovery::{
    BackgroundSync, ChainSource, DiscoveryService, GraphSource, HttpTransport, ReqwestTransport, RestSource,
    SyncOrchestrator,
};
use discovery_backend::networks;
use discovery_backend::AppState;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    let port = config.port;

    // Network overrides are optional; built-in deployments apply otherwise
    let config_dir = Path::new(&config.config_dir);
    log::info!("Using config directory: {:?}", config_dir);
    networks::load_networks(config_dir);

    if let Some(parent) = Path::new(&config.database_url).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let db = Arc::new(Database::new(&config.database_url).expect("Failed to initialize database"));
    log::info!("Database initialized at {}", config.database_url);

    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new());

    let mut orchestrator = SyncOrchestrator::new(db.clone(), config.min_feedback);
    if config.graph_api_key.is_some() {
        orchestrator = orchestrator.with_graph(Arc::new(GraphSource::from_config(db.clone(), transport.clone(), &config)));
    } else {
        log::info!("GRAPH_API_KEY not set, graph source disabled");
    }
    orchestrator = orchestrator.with_source(Arc::new(RestSource::new(
        db.clone(),
        RestFetcher::new(transport.clone(), config.rest_api_url.clone()),
    )));
    match ChainSource::from_config(db.clone(), transport.clone(), &config) {
        Ok(chain) => orchestrator = orchestrator.with_chain(Arc::new(chain)),
        Err(e) => log::error!("Chain source disabled: {}", e),
    }
    let orchestrator = Arc::new(orchestrator);
    let discovery = Arc::new(DiscoveryService::new(orchestrator.clone(), config.cache_ttl));

    let background = if config.background_sync {
        Some(BackgroundSync::spawn(orchestrator, vec![config.default_network], config.sync_interval))
    } else {
        log::info!("Background sync disabled");
        None
    };

    log::info!("Starting discovery server on port {}", port);

    let server_config = config.clone();
    let result = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(AppState {
                db: db.clone(),
                config: server_config.clone(),
                discovery: discovery.clone(),
            }))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::health::config)
            .configure(controllers::agents::config)
            .configure(controllers::sync::config)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await;

    if let Some(background) = background {
        background.stop().await;
    }

    result
}
