pub mod directory;
pub mod error;
pub mod handlers;
pub mod models;
pub mod notifier;
pub mod router;
pub mod services;

pub use directory::{InMemoryPractitionerDirectory, PractitionerDirectory, SupabasePractitionerDirectory};
pub use error::ProvisionError;
pub use models::*;
pub use notifier::{notifier_from_config, LogNotifier, Notifier, WebhookNotifier};
pub use router::{provisioning_routes, ProvisioningState};
pub use services::{BatchProvisioner, ProvisioningWorkflow};
