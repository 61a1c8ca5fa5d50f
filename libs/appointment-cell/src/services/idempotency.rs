use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use uuid::Uuid;

const SUFFIX_LEN: usize = 8;

/// Builds a key unique per practitioner, start time and client, with a random
/// suffix so two deliberate bookings by the same client never collide.
pub fn generate_idempotency_key(
    practitioner_id: Uuid,
    start_time: DateTime<Utc>,
    client_id: Option<Uuid>,
) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect();

    let client = client_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "anonymous".to_string());

    format!("{}:{}:{}:{}", practitioner_id, start_time.timestamp(), client, suffix)
}
