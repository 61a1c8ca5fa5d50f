use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::{appointment_routes, AppointmentState};
use appointment_cell::services::admission::BookingAdmissionController;
use appointment_cell::store::SupabaseAppointmentStore;
use calendar_sync_cell::{calendar_routes, CalendarSyncState, GoogleCalendarClient, SupabaseCalendarStore};
use provisioning_cell::{
    notifier_from_config, provisioning_routes, ProvisioningState, ProvisioningWorkflow,
    SupabasePractitionerDirectory,
};
use shared_config::AppConfig;
use shared_database::SupabaseClient;

/// Per-cell state, wired against one Supabase client and one provider client.
#[derive(Clone)]
pub struct AppServices {
    pub appointments: AppointmentState,
    pub calendar: CalendarSyncState,
    pub provisioning: ProvisioningState,
}

impl AppServices {
    pub fn from_config(config: Arc<AppConfig>) -> Self {
        let supabase = Arc::new(SupabaseClient::with_service_role(&config));

        let appointment_store = Arc::new(SupabaseAppointmentStore::new(supabase.clone()));
        let calendar_store = Arc::new(SupabaseCalendarStore::new(supabase.clone()));
        let directory = Arc::new(SupabasePractitionerDirectory::new(supabase));
        let provider = Arc::new(GoogleCalendarClient::new(&config));

        let admission = Arc::new(BookingAdmissionController::from_config(&config, appointment_store.clone()));
        let appointments = AppointmentState::new(config.clone(), admission);

        let calendar = CalendarSyncState::new(
            config.clone(),
            calendar_store.clone(),
            appointment_store,
            provider.clone(),
        );

        // Shares the calendar cell's registry and lifecycle so provisioning and
        // sync agree on in-flight syncs and cached tokens.
        let workflow = ProvisioningWorkflow::new(
            calendar_store,
            provider,
            directory,
            notifier_from_config(&config),
            calendar.lifecycle.clone(),
            calendar.registry.clone(),
        )
        .with_config(&config);
        let provisioning = ProvisioningState::new(config, Arc::new(workflow));

        Self { appointments, calendar, provisioning }
    }
}

pub fn create_router(services: &AppServices) -> Router {
    Router::new()
        .route("/", get(|| async { "Practice calendar sync API is running!" }))
        .nest("/appointments", appointment_routes(services.appointments.clone()))
        .nest("/calendar", calendar_routes(services.calendar.clone()))
        .nest("/provisioning", provisioning_routes(services.provisioning.clone()))
}
