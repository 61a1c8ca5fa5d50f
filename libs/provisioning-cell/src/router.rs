// libs/provisioning-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::admin_middleware;

use crate::handlers;
use crate::services::{BatchProvisioner, ProvisioningWorkflow};

#[derive(Clone)]
pub struct ProvisioningState {
    pub config: Arc<AppConfig>,
    pub workflow: Arc<ProvisioningWorkflow>,
    pub batch: Arc<BatchProvisioner>,
}

impl ProvisioningState {
    pub fn new(config: Arc<AppConfig>, workflow: Arc<ProvisioningWorkflow>) -> Self {
        let batch = Arc::new(BatchProvisioner::new(workflow.clone()));
        Self { config, workflow, batch }
    }
}

pub fn provisioning_routes(state: ProvisioningState) -> Router {
    Router::new()
        .route("/calendars", post(handlers::provision_practitioner))
        .route("/setup", post(handlers::provision_practitioner))
        .route("/setup/batch", post(handlers::provision_batch))
        .route("/rollback/{practitioner_id}", post(handlers::rollback_practitioner))
        .route("/stats", get(handlers::onboarding_stats))
        .layer(middleware::from_fn_with_state(state.config.clone(), admin_middleware))
        .with_state(state)
}
