// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{middleware, routing::post, Router};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::admission::BookingAdmissionController;

#[derive(Clone)]
pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub admission: Arc<BookingAdmissionController>,
}

impl AppointmentState {
    pub fn new(config: Arc<AppConfig>, admission: Arc<BookingAdmissionController>) -> Self {
        Self { config, admission }
    }
}

pub fn appointment_routes(state: AppointmentState) -> Router {
    // Every route requires an authenticated principal; handlers apply role checks.
    Router::new()
        .route("/admit", post(handlers::admit_appointment))
        .route("/availability/check", post(handlers::check_availability))
        .route("/availability/batch-check", post(handlers::batch_check_availability))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
