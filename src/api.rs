//! HTTP API for chatflow
//!
//! Turn requests and flow publishing over JSON.

mod handlers;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::config::EngineConfig;
use crate::db::Database;
use crate::runtime::{DatabaseStorage, ProductionRuntime};
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<ProductionRuntime>,
}

impl AppState {
    pub fn new(db: Database, config: EngineConfig) -> Self {
        Self {
            runtime: Arc::new(ProductionRuntime::new(DatabaseStorage::new(db), config)),
        }
    }
}
