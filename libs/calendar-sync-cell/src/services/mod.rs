pub mod conflict;
pub mod events;
pub mod lifecycle;
pub mod metrics;
pub mod registry;
pub mod scheduler;
pub mod sync;
pub mod webhook;

pub use conflict::ConflictDetector;
pub use events::EventService;
pub use lifecycle::ChannelLifecycleManager;
pub use metrics::{MetricsSnapshot, SyncMetrics};
pub use registry::{SyncGuard, SyncRegistry};
pub use scheduler::PeriodicTask;
pub use sync::IncrementalSyncEngine;
pub use webhook::WebhookHandlerService;
