pub mod error;
pub mod handlers;
pub mod models;
pub mod provider;
pub mod router;
pub mod services;
pub mod store;

pub use error::{CalendarSyncError, ProviderError};
pub use models::*;
pub use provider::{CalendarProvider, GoogleCalendarClient};
pub use router::{calendar_routes, CalendarSyncState};
pub use store::{CalendarStore, InMemoryCalendarStore, SupabaseCalendarStore};
