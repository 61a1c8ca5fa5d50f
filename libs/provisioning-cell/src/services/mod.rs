pub mod batch;
pub mod retry;
pub mod stats;
pub mod workflow;

pub use batch::BatchProvisioner;
pub use retry::{retry_with_backoff, Sleeper, TokioSleeper};
pub use stats::compute_onboarding_stats;
pub use workflow::ProvisioningWorkflow;
