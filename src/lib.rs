//! Board-game collection service: BoardGameGeek import, multi-owner
//! collections, and a lend/return lifecycle over MongoDB.

pub mod bgg;
pub mod config;
pub mod db;
pub mod error;
pub mod middlewares;
pub mod models;
pub mod retry;
pub mod routes;
pub mod store;
pub mod text;
pub mod translate;

use std::sync::Arc;

use mongodb::Database;

use crate::bgg::BggClient;
use crate::translate::Translator;

/// Shared handles threaded through every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub bgg: Arc<BggClient>,
    pub translator: Arc<Translator>,
}
