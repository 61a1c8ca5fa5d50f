use std::collections::HashSet;

use uuid::Uuid;

use calendar_sync_cell::models::{Calendar, IntegrationStatus};

use crate::models::{OnboardingStats, Practitioner};

/// Tallies calendar coverage across practitioners. Calendars whose owner is no
/// longer a practitioner are ignored.
pub fn compute_onboarding_stats(practitioners: &[Practitioner], calendars: &[Calendar]) -> OnboardingStats {
    let ids: HashSet<Uuid> = practitioners.iter().map(|p| p.id).collect();
    let owned: Vec<&Calendar> = calendars.iter().filter(|c| ids.contains(&c.practitioner_id)).collect();

    let count = |status: IntegrationStatus| owned.iter().filter(|c| c.integration_status == status).count();
    let with_calendar = owned
        .iter()
        .map(|c| c.practitioner_id)
        .collect::<HashSet<_>>()
        .len();
    let active = count(IntegrationStatus::Active);

    let total = practitioners.len();
    OnboardingStats {
        total_practitioners: total,
        with_calendar,
        without_calendar: total - with_calendar,
        active,
        pending: count(IntegrationStatus::Pending),
        errored: count(IntegrationStatus::Error),
        completion_rate: if total == 0 { 0.0 } else { active as f64 * 100.0 / total as f64 },
    }
}
