// libs/provisioning-cell/src/models.rs
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::auth::ROLE_PRACTITIONER;

// ==============================================================================
// PRACTITIONERS
// ==============================================================================

/// Profile row of a person who may own a practice calendar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Practitioner {
    pub id: Uuid,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<String>,
    pub calendar_id: Option<Uuid>,
}

impl Practitioner {
    pub fn is_practitioner(&self) -> bool {
        self.role.as_deref() == Some(ROLE_PRACTITIONER)
    }

    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("Practitioner")
    }
}

// ==============================================================================
// PROVISIONING REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub practitioner_id: Uuid,
    pub practitioner_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchProvisionRequest {
    pub practitioners: Vec<ProvisionRequest>,
}

/// Last step the workflow reached; on failure, the step that failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStep {
    Validation,
    IdempotencyCheck,
    Reconciliation,
    CalendarCreation,
    CalendarPersistence,
    ProfileUpdate,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionResult {
    pub success: bool,
    pub practitioner_id: Uuid,
    pub calendar_id: Option<Uuid>,
    pub provider_calendar_id: Option<String>,
    pub step: ProvisionStep,
    pub error: Option<String>,
    pub retryable: Option<bool>,
    pub rollback_required: Option<bool>,
    /// An active calendar already existed; nothing was changed.
    #[serde(default)]
    pub already_provisioned: bool,
    /// An existing non-active calendar was verified at the provider and reactivated.
    #[serde(default)]
    pub reconciled: bool,
    pub rollback: Option<RollbackReport>,
}

impl ProvisionResult {
    pub fn completed(practitioner_id: Uuid, calendar_id: Uuid, provider_calendar_id: impl Into<String>) -> Self {
        Self {
            success: true,
            practitioner_id,
            calendar_id: Some(calendar_id),
            provider_calendar_id: Some(provider_calendar_id.into()),
            step: ProvisionStep::Completed,
            error: None,
            retryable: None,
            rollback_required: None,
            already_provisioned: false,
            reconciled: false,
            rollback: None,
        }
    }

    pub fn failed(practitioner_id: Uuid, step: ProvisionStep, error: impl Into<String>, retryable: bool) -> Self {
        Self {
            success: false,
            practitioner_id,
            calendar_id: None,
            provider_calendar_id: None,
            step,
            error: Some(error.into()),
            retryable: Some(retryable),
            rollback_required: Some(false),
            already_provisioned: false,
            reconciled: false,
            rollback: None,
        }
    }

    pub fn with_rollback(mut self, report: RollbackReport) -> Self {
        self.rollback_required = Some(true);
        self.rollback = Some(report);
        self
    }
}

/// Outcome of each compensating action. `None` means the action did not apply.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RollbackReport {
    pub practitioner_id: Uuid,
    pub calendar_id: Option<Uuid>,
    pub channel_stopped: Option<bool>,
    pub provider_calendar_deleted: Option<bool>,
    pub calendar_row_deleted: Option<bool>,
    pub profile_cleared: bool,
    pub errors: Vec<String>,
}

impl RollbackReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchProvisionResult {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub results: Vec<ProvisionResult>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OnboardingStats {
    pub total_practitioners: usize,
    pub with_calendar: usize,
    pub without_calendar: usize,
    pub active: usize,
    pub pending: usize,
    pub errored: usize,
    /// Share of practitioners with an active calendar, in percent.
    pub completion_rate: f64,
}

// ==============================================================================
// POLICIES
// ==============================================================================

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based): the base delay,
    /// doubled per attempt, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct BatchPolicy {
    pub concurrency: usize,
    /// Extra start delay added per group of `concurrency` practitioners.
    pub batch_stagger: Duration,
    /// Minimum gap between two starts inside one group.
    pub min_spacing: Duration,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            concurrency: 3,
            batch_stagger: Duration::from_secs(2),
            min_spacing: Duration::from_millis(500),
        }
    }
}

impl BatchPolicy {
    pub fn start_delay(&self, index: usize) -> Duration {
        let concurrency = self.concurrency.max(1);
        let batch = (index / concurrency) as u32;
        let slot = (index % concurrency) as u32;
        self.batch_stagger.saturating_mul(batch) + self.min_spacing.saturating_mul(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(6), Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(200), Duration::from_secs(30));
    }

    #[test]
    fn test_batch_start_delays() {
        let policy = BatchPolicy::default();
        let delays: Vec<u128> = (0..5).map(|i| policy.start_delay(i).as_millis()).collect();

        assert_eq!(delays, vec![0, 500, 1000, 2000, 2500]);
    }

    #[test]
    fn test_practitioner_role() {
        let mut practitioner = Practitioner {
            id: Uuid::new_v4(),
            email: Some("pro@practice.test".into()),
            full_name: None,
            role: Some("practitioner".into()),
            calendar_id: None,
        };
        assert!(practitioner.is_practitioner());
        assert_eq!(practitioner.display_name(), "pro@practice.test");

        practitioner.role = Some("client".into());
        assert!(!practitioner.is_practitioner());
    }
}
