//! Conversational-agent fulfillment webhook that turns an item name and a
//! date into a price prediction from a pre-trained scaler/regressor pair.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod handler;
pub mod items;
pub mod model;
pub mod tunnel;
pub mod types;

// ---------- Server state ----------

#[derive(Clone)]
pub struct AppState {
    pub items: Arc<items::ItemCodeTable>,
    pub models: Arc<model::ModelArtifacts>,
}

impl AppState {
    pub fn new(items: items::ItemCodeTable, models: model::ModelArtifacts) -> Self {
        Self {
            items: Arc::new(items),
            models: Arc::new(models),
        }
    }
}

pub fn router(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/", get(handler::index))
        // Webhook payloads are never refused for size.
        .route(
            "/predict",
            post(handler::predict).layer(DefaultBodyLimit::disable()),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
