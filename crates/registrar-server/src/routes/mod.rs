pub mod catalog;
pub mod health;
pub mod registration;
pub mod students;

use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(registration::routes())
        .merge(students::routes())
        .merge(catalog::routes())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
