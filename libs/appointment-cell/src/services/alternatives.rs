use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::models::{AlternativeSlot, AlternativeSlotPolicy, Appointment};
use crate::services::conflict::intervals_overlap;

/// Proposes nearby free slots of the same length when a requested slot is taken.
pub struct AlternativeSlotFinder {
    policy: AlternativeSlotPolicy,
    timezone: Tz,
}

impl AlternativeSlotFinder {
    pub fn new(policy: AlternativeSlotPolicy, timezone: Tz) -> Self {
        Self { policy, timezone }
    }

    /// UTC range covering every day the finder probes, from the start of the
    /// requested practice-local day.
    pub fn search_window(&self, requested_start: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let local_day = requested_start.with_timezone(&self.timezone).date_naive();
        let from = self.local_to_utc(local_day.and_time(NaiveTime::MIN))
            .unwrap_or(requested_start - Duration::days(1));
        let to = from + Duration::days(self.policy.days_ahead as i64 + 1);
        (from, to)
    }

    pub fn find(
        &self,
        requested_start: DateTime<Utc>,
        requested_end: DateTime<Utc>,
        busy: &[Appointment],
        now: DateTime<Utc>,
    ) -> Vec<AlternativeSlot> {
        let duration = requested_end - requested_start;
        if duration <= Duration::zero() || self.policy.step_minutes <= 0 {
            return Vec::new();
        }

        let first_day = requested_start.with_timezone(&self.timezone).date_naive();
        let mut candidates = Vec::new();

        for offset in 0..=self.policy.days_ahead {
            let Some(day) = first_day.checked_add_days(chrono::Days::new(offset)) else {
                break;
            };
            let (Some(open), Some(close)) = (
                NaiveTime::from_hms_opt(self.policy.day_start_hour, 0, 0),
                NaiveTime::from_hms_opt(self.policy.day_end_hour, 0, 0),
            ) else {
                break;
            };

            let (Some(day_open), Some(day_close)) = (
                self.local_to_utc(day.and_time(open)),
                self.local_to_utc(day.and_time(close)),
            ) else {
                continue;
            };

            let mut start = day_open;
            while start + duration <= day_close {
                let end = start + duration;
                let free = start > now
                    && start != requested_start
                    && !busy.iter().any(|a| a.is_active() && intervals_overlap(start, end, a.start_time, a.end_time));

                if free {
                    candidates.push(AlternativeSlot {
                        start_time: start,
                        end_time: end,
                        minutes_from_requested: (start - requested_start).num_minutes().abs(),
                    });
                }
                start += Duration::minutes(self.policy.step_minutes);
            }
        }

        candidates.sort_by_key(|slot| (slot.minutes_from_requested, slot.start_time));
        candidates.truncate(self.policy.max_suggestions);
        candidates
    }

    fn local_to_utc(&self, local: chrono::NaiveDateTime) -> Option<DateTime<Utc>> {
        self.timezone
            .from_local_datetime(&local)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }
}
