pub mod admission;
pub mod alternatives;
pub mod conflict;
pub mod idempotency;
