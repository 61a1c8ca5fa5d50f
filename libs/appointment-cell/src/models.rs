// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Duration, Utc};
use std::fmt;

use shared_database::DatabaseError;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub practitioner_id: Uuid,
    pub client_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub session_type: SessionType,
    pub idempotency_key: Option<String>,
    pub provider_event_id: Option<String>,
    #[serde(default)]
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn new(
        practitioner_id: Uuid,
        client_id: Option<Uuid>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        session_type: SessionType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            practitioner_id,
            client_id,
            start_time,
            end_time,
            status: AppointmentStatus::Scheduled,
            session_type,
            idempotency_key: None,
            provider_event_id: None,
            archived: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Only active, non-archived appointments occupy practitioner time.
    pub fn is_active(&self) -> bool {
        !self.archived && self.status.is_active()
    }

    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    Rescheduled,
    NoShow,
}

impl AppointmentStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, AppointmentStatus::Scheduled | AppointmentStatus::Confirmed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Rescheduled => "rescheduled",
            AppointmentStatus::NoShow => "no_show",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    #[serde(alias = "intake", alias = "initial_consultation")]
    Initial,
    #[default]
    #[serde(alias = "therapy", alias = "standard")]
    Individual,
    Couples,
    Family,
    Group,
    #[serde(alias = "followup")]
    FollowUp,
    Consultation,
}

impl SessionType {
    pub fn display_name(&self) -> &'static str {
        match self {
            SessionType::Initial => "initial",
            SessionType::Individual => "individual",
            SessionType::Couples => "couples",
            SessionType::Family => "family",
            SessionType::Group => "group",
            SessionType::FollowUp => "follow-up",
            SessionType::Consultation => "consultation",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

// ==============================================================================
// ADMISSION REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingAttempt {
    pub practitioner_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub client_id: Option<Uuid>,
    pub session_type: Option<SessionType>,
    pub idempotency_key: Option<String>,
    #[serde(default = "default_true")]
    pub include_alternatives: bool,
}

fn default_true() -> bool {
    true
}

impl BookingAttempt {
    pub fn new(practitioner_id: Uuid, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            practitioner_id,
            start_time,
            end_time,
            client_id: None,
            session_type: None,
            idempotency_key: None,
            include_alternatives: true,
        }
    }

    pub fn with_client(mut self, client_id: Uuid) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    StartInPast,
    BeyondBookingHorizon,
    InvalidTimeRange,
    DurationTooShort,
    DurationTooLong,
    SlotConflict,
    /// The idempotency key belongs to a booking for another slot.
    IdempotencyKeyReused,
    /// Availability could not be determined; admission fails closed.
    AvailabilityUnknown,
    StorageUnavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConflictingAppointment {
    pub id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub session_type: SessionType,
}

impl From<&Appointment> for ConflictingAppointment {
    fn from(appointment: &Appointment) -> Self {
        Self {
            id: appointment.id,
            start_time: appointment.start_time,
            end_time: appointment.end_time,
            session_type: appointment.session_type,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlternativeSlot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub minutes_from_requested: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionDecision {
    pub admitted: bool,
    pub idempotency_key: Option<String>,
    pub appointment: Option<Appointment>,
    /// True when the decision was served from an earlier attempt with the same key.
    pub replayed: bool,
    pub reason: Option<RejectionReason>,
    pub message: Option<String>,
    pub conflicting_appointment: Option<ConflictingAppointment>,
    pub alternatives: Vec<AlternativeSlot>,
}

impl AdmissionDecision {
    pub fn admitted(appointment: Appointment, replayed: bool) -> Self {
        Self {
            admitted: true,
            idempotency_key: appointment.idempotency_key.clone(),
            appointment: Some(appointment),
            replayed,
            reason: None,
            message: None,
            conflicting_appointment: None,
            alternatives: Vec::new(),
        }
    }

    pub fn available() -> Self {
        Self {
            admitted: true,
            idempotency_key: None,
            appointment: None,
            replayed: false,
            reason: None,
            message: None,
            conflicting_appointment: None,
            alternatives: Vec::new(),
        }
    }

    pub fn rejected(reason: RejectionReason, message: impl Into<String>) -> Self {
        Self {
            admitted: false,
            idempotency_key: None,
            appointment: None,
            replayed: false,
            reason: Some(reason),
            message: Some(message.into()),
            conflicting_appointment: None,
            alternatives: Vec::new(),
        }
    }

    pub fn with_key(mut self, key: Option<String>) -> Self {
        self.idempotency_key = key;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchAvailabilityRequest {
    pub attempts: Vec<BookingAttempt>,
}

// ==============================================================================
// POLICIES
// ==============================================================================

#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    pub max_advance: Duration,
    pub min_duration: Duration,
    pub max_duration: Duration,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            max_advance: Duration::days(365),
            min_duration: Duration::minutes(15),
            max_duration: Duration::hours(4),
        }
    }
}

/// Where alternative suggestions are probed when a slot is taken. Hours are
/// practice-local.
#[derive(Debug, Clone)]
pub struct AlternativeSlotPolicy {
    pub day_start_hour: u32,
    pub day_end_hour: u32,
    pub step_minutes: i64,
    pub days_ahead: u64,
    pub max_suggestions: usize,
}

impl Default for AlternativeSlotPolicy {
    fn default() -> Self {
        Self {
            day_start_hour: 8,
            day_end_hour: 20,
            step_minutes: 60,
            days_ahead: 3,
            max_suggestions: 6,
        }
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error, PartialEq)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Duplicate idempotency key: {0}")]
    DuplicateKey(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Appointment store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl AppointmentError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppointmentError::Unavailable(_))
    }
}

impl From<DatabaseError> for AppointmentError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Duplicate(msg) => AppointmentError::DuplicateKey(msg),
            DatabaseError::NotFound(_) => AppointmentError::NotFound,
            DatabaseError::Unavailable(msg) => AppointmentError::Unavailable(msg),
            other => AppointmentError::DatabaseError(other.to_string()),
        }
    }
}
