//! Shared application state for all generated routes.

use crate::config::ModelGraph;
use crate::store::Store;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub graph: Arc<ModelGraph>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, graph: Arc<ModelGraph>) -> Self {
        AppState { store, graph }
    }
}
