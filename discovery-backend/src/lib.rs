//! ERC-8004 agent discovery backend
//!
//! Indexes registered agents from a hosted subgraph, a public REST index, or
//! the Identity Registry itself into a local SQLite cache, and serves
//! capability and reputation queries over HTTP.

use std::sync::Arc;

pub mod config;
pub mod controllers;
pub mod db;
pub mod discovery;
pub mod error;
pub mod http;
pub mod models;
pub mod networks;

use config::Config;
use db::Database;
use discovery::DiscoveryService;

pub struct AppState {
    pub db: Arc<Database>,
    pub config: Config,
    pub discovery: Arc<DiscoveryService>,
}
