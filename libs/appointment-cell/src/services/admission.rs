use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures::future::join_all;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::models::{
    AdmissionDecision, AdmissionPolicy, AlternativeSlotPolicy, Appointment, AppointmentError,
    BookingAttempt, ConflictingAppointment, RejectionReason, SessionType,
};
use crate::services::alternatives::AlternativeSlotFinder;
use crate::services::conflict::intervals_overlap;
use crate::services::idempotency::generate_idempotency_key;
use crate::store::AppointmentStore;

type PractitionerLock = Arc<tokio::sync::Mutex<()>>;

/// Decides whether a booking attempt may become an appointment.
///
/// Attempts for the same practitioner are serialized inside this process; the
/// store's unique idempotency key is what guards against other processes.
/// Whenever the ledger cannot be read the controller refuses the booking.
pub struct BookingAdmissionController {
    store: Arc<dyn AppointmentStore>,
    policy: AdmissionPolicy,
    alternatives: AlternativeSlotFinder,
    timezone: Tz,
    practitioner_locks: Mutex<HashMap<Uuid, PractitionerLock>>,
}

impl BookingAdmissionController {
    pub fn new(store: Arc<dyn AppointmentStore>, timezone: Tz) -> Self {
        Self {
            store,
            policy: AdmissionPolicy::default(),
            alternatives: AlternativeSlotFinder::new(AlternativeSlotPolicy::default(), timezone),
            timezone,
            practitioner_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &AppConfig, store: Arc<dyn AppointmentStore>) -> Self {
        Self::new(store, practice_timezone(config))
    }

    pub fn with_policy(mut self, policy: AdmissionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_alternative_policy(mut self, policy: AlternativeSlotPolicy) -> Self {
        self.alternatives = AlternativeSlotFinder::new(policy, self.timezone);
        self
    }

    pub fn store(&self) -> Arc<dyn AppointmentStore> {
        Arc::clone(&self.store)
    }

    pub async fn admit(&self, attempt: BookingAttempt) -> AdmissionDecision {
        self.admit_at(attempt, Utc::now()).await
    }

    #[instrument(skip(self, attempt), fields(practitioner_id = %attempt.practitioner_id))]
    pub async fn admit_at(&self, attempt: BookingAttempt, now: DateTime<Utc>) -> AdmissionDecision {
        if let Err(rejection) = self.validate_timing(&attempt, now) {
            return rejection.with_key(attempt.idempotency_key.clone());
        }

        match self.replay(&attempt).await {
            Ok(Some(decision)) => return decision,
            Ok(None) => {}
            Err(e) => return self.fail_closed(&attempt, e),
        }

        let lock = self.practitioner_lock(attempt.practitioner_id);
        let decision = {
            let _guard = lock.lock().await;
            self.admit_locked(&attempt, now).await
        };
        self.release_practitioner_lock(attempt.practitioner_id, lock);

        decision
    }

    /// Same checks as [`admit`](Self::admit) without recording anything.
    pub async fn check_availability(&self, attempt: &BookingAttempt) -> AdmissionDecision {
        self.check_availability_at(attempt, Utc::now()).await
    }

    pub async fn check_availability_at(&self, attempt: &BookingAttempt, now: DateTime<Utc>) -> AdmissionDecision {
        if let Err(rejection) = self.validate_timing(attempt, now) {
            return rejection;
        }

        match self.find_conflict(attempt).await {
            Ok(None) => AdmissionDecision::available(),
            Ok(Some(existing)) => self.conflict_decision(attempt, &existing, now).await,
            Err(e) => self.fail_closed(attempt, e),
        }
    }

    pub async fn batch_check_availability(&self, attempts: &[BookingAttempt]) -> Vec<AdmissionDecision> {
        let now = Utc::now();
        join_all(attempts.iter().map(|attempt| self.check_availability_at(attempt, now))).await
    }

    pub fn validate_timing(&self, attempt: &BookingAttempt, now: DateTime<Utc>) -> Result<(), AdmissionDecision> {
        let reject = |reason, message: &str| Err(AdmissionDecision::rejected(reason, message));

        if attempt.start_time <= now {
            return reject(RejectionReason::StartInPast, "Cannot book appointments in the past");
        }
        if attempt.start_time > now + self.policy.max_advance {
            return reject(
                RejectionReason::BeyondBookingHorizon,
                "Cannot book appointments that far in advance",
            );
        }
        if attempt.end_time <= attempt.start_time {
            return reject(RejectionReason::InvalidTimeRange, "End time must be after start time");
        }

        let duration = attempt.duration();
        if duration < self.policy.min_duration {
            return reject(
                RejectionReason::DurationTooShort,
                &format!("Appointments must last at least {} minutes", self.policy.min_duration.num_minutes()),
            );
        }
        if duration > self.policy.max_duration {
            return reject(
                RejectionReason::DurationTooLong,
                &format!("Appointments cannot exceed {} minutes", self.policy.max_duration.num_minutes()),
            );
        }

        Ok(())
    }

    /// Looks up an earlier admission under the attempt's key. A key may only be
    /// replayed for the same practitioner and slot; reusing it for a different
    /// slot is rejected rather than returning the unrelated booking.
    async fn replay(&self, attempt: &BookingAttempt) -> Result<Option<AdmissionDecision>, AppointmentError> {
        let Some(key) = attempt.idempotency_key.as_deref() else {
            return Ok(None);
        };
        let Some(existing) = self.store.find_by_idempotency_key(key).await? else {
            return Ok(None);
        };

        if existing.practitioner_id != attempt.practitioner_id
            || existing.start_time != attempt.start_time
            || existing.end_time != attempt.end_time
        {
            warn!("Idempotency key {} reused for a different slot than appointment {}", key, existing.id);
            return Ok(Some(
                AdmissionDecision::rejected(
                    RejectionReason::IdempotencyKeyReused,
                    "Idempotency key was already used for a different booking",
                )
                .with_key(Some(key.to_string())),
            ));
        }

        debug!("Replaying admission for idempotency key {}", key);
        Ok(Some(AdmissionDecision::admitted(existing, true)))
    }

    async fn admit_locked(&self, attempt: &BookingAttempt, now: DateTime<Utc>) -> AdmissionDecision {
        // A same-key attempt may have been admitted while this one waited for the lock.
        match self.replay(attempt).await {
            Ok(Some(decision)) => return decision,
            Ok(None) => {}
            Err(e) => return self.fail_closed(attempt, e),
        }

        match self.find_conflict(attempt).await {
            Ok(None) => {}
            Ok(Some(existing)) => {
                return self.conflict_decision(attempt, &existing, now).await
                    .with_key(attempt.idempotency_key.clone());
            }
            Err(e) => return self.fail_closed(attempt, e),
        }

        let key = attempt.idempotency_key.clone().unwrap_or_else(|| {
            generate_idempotency_key(attempt.practitioner_id, attempt.start_time, attempt.client_id)
        });

        let mut appointment = Appointment::new(
            attempt.practitioner_id,
            attempt.client_id,
            attempt.start_time,
            attempt.end_time,
            attempt.session_type.unwrap_or_default(),
        );
        appointment.idempotency_key = Some(key.clone());

        match self.store.insert(appointment).await {
            Ok(created) => {
                info!(
                    "Admitted appointment {} for practitioner {} at {}",
                    created.id, created.practitioner_id, created.start_time
                );
                AdmissionDecision::admitted(created, false)
            }
            Err(AppointmentError::DuplicateKey(_)) => {
                // Another writer recorded this key first.
                match self.store.find_by_idempotency_key(&key).await {
                    Ok(Some(existing)) => AdmissionDecision::admitted(existing, true),
                    Ok(None) => AdmissionDecision::rejected(
                        RejectionReason::StorageUnavailable,
                        "Booking could not be recorded",
                    )
                    .with_key(Some(key)),
                    Err(e) => self.fail_closed(attempt, e).with_key(Some(key)),
                }
            }
            Err(e) => {
                warn!("Failed to record appointment for practitioner {}: {}", attempt.practitioner_id, e);
                AdmissionDecision::rejected(RejectionReason::StorageUnavailable, "Booking could not be recorded")
                    .with_key(Some(key))
            }
        }
    }

    async fn find_conflict(&self, attempt: &BookingAttempt) -> Result<Option<Appointment>, AppointmentError> {
        let existing = self.store
            .find_active_in_range(attempt.practitioner_id, attempt.start_time, attempt.end_time)
            .await?;

        Ok(existing.into_iter().find(|a| {
            a.is_active() && intervals_overlap(attempt.start_time, attempt.end_time, a.start_time, a.end_time)
        }))
    }

    async fn conflict_decision(
        &self,
        attempt: &BookingAttempt,
        existing: &Appointment,
        now: DateTime<Utc>,
    ) -> AdmissionDecision {
        warn!(
            "Slot {} - {} for practitioner {} conflicts with appointment {}",
            attempt.start_time, attempt.end_time, attempt.practitioner_id, existing.id
        );

        let mut decision = AdmissionDecision::rejected(
            RejectionReason::SlotConflict,
            self.conflict_message(existing.session_type, existing.start_time, existing.end_time),
        );
        decision.conflicting_appointment = Some(ConflictingAppointment::from(existing));

        if attempt.include_alternatives {
            let (from, to) = self.alternatives.search_window(attempt.start_time);
            match self.store.find_active_in_range(attempt.practitioner_id, from, to).await {
                Ok(busy) => {
                    decision.alternatives = self.alternatives.find(attempt.start_time, attempt.end_time, &busy, now);
                }
                Err(e) => debug!("Skipping alternative slots: {}", e),
            }
        }

        decision
    }

    /// Human readable description of a taken slot in the practice timezone.
    pub fn conflict_message(&self, session_type: SessionType, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
        let local_start = start.with_timezone(&self.timezone);
        let local_end = end.with_timezone(&self.timezone);

        format!(
            "Requested time conflicts with an existing {} session on {} from {} to {} ({})",
            session_type,
            local_start.format("%A, %B %-d"),
            local_start.format("%-I:%M %p"),
            local_end.format("%-I:%M %p"),
            self.timezone.name(),
        )
    }

    fn fail_closed(&self, attempt: &BookingAttempt, err: AppointmentError) -> AdmissionDecision {
        warn!(
            "Availability unknown for practitioner {}, refusing booking: {}",
            attempt.practitioner_id, err
        );
        AdmissionDecision::rejected(
            RejectionReason::AvailabilityUnknown,
            "Availability could not be verified, please try again",
        )
        .with_key(attempt.idempotency_key.clone())
    }

    fn practitioner_lock(&self, practitioner_id: Uuid) -> PractitionerLock {
        let mut locks = self.practitioner_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(practitioner_id).or_default())
    }

    fn release_practitioner_lock(&self, practitioner_id: Uuid, lock: PractitionerLock) {
        drop(lock);
        let mut locks = self.practitioner_locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks.get(&practitioner_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&practitioner_id);
        }
    }

    #[cfg(test)]
    fn tracked_practitioners(&self) -> usize {
        self.practitioner_locks.lock().map(|l| l.len()).unwrap_or_default()
    }
}

pub fn practice_timezone(config: &AppConfig) -> Tz {
    config.practice_timezone.parse::<Tz>().unwrap_or_else(|_| {
        warn!("Unknown PRACTICE_TIMEZONE '{}', using UTC", config.practice_timezone);
        Tz::UTC
    })
}
