//! Core logic behind the HTTP handlers.

use crate::{config::ServiceSettings, services::store::ObjectStore};
use sqlx::SqlitePool;
use std::sync::Arc;

pub mod content_service;
pub mod key_resolver;
pub mod signed_url_service;
pub mod store;
pub mod upload_service;
pub mod validation;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Object access façade.
    pub store: Arc<dyn ObjectStore>,

    /// Resource metadata database.
    pub db: Arc<SqlitePool>,

    pub settings: Arc<ServiceSettings>,
}

impl AppState {
    pub fn new(store: Arc<dyn ObjectStore>, db: Arc<SqlitePool>, settings: ServiceSettings) -> Self {
        Self {
            store,
            db,
            settings: Arc::new(settings),
        }
    }
}
