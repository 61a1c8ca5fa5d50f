use std::future::Future;
use std::sync::Arc;

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use calendar_sync_cell::models::{Calendar, IntegrationStatus};
use calendar_sync_cell::provider::CalendarProvider;
use calendar_sync_cell::services::{ChannelLifecycleManager, SyncRegistry};
use calendar_sync_cell::store::CalendarStore;
use shared_config::AppConfig;

use crate::directory::PractitionerDirectory;
use crate::error::ProvisionError;
use crate::models::{OnboardingStats, Practitioner, ProvisionResult, ProvisionStep, RetryPolicy, RollbackReport};
use crate::notifier::{Notification, Notifier};
use crate::services::retry::{retry_with_backoff, Sleeper, TokioSleeper};
use crate::services::stats::compute_onboarding_stats;

enum ReconcileOutcome {
    /// The provider calendar still exists; the record was reactivated.
    Restored(ProvisionResult),
    /// The provider calendar is gone; the stale record must be replaced.
    Missing(Calendar),
}

/// Creates, reconciles and tears down per-practitioner provider calendars.
///
/// Every store and provider call on the primary path is retried with backoff
/// when the failure is transient. Failures after the provider calendar exists
/// trigger compensating rollback.
pub struct ProvisioningWorkflow {
    calendars: Arc<dyn CalendarStore>,
    provider: Arc<dyn CalendarProvider>,
    directory: Arc<dyn PractitionerDirectory>,
    notifier: Arc<dyn Notifier>,
    lifecycle: Arc<ChannelLifecycleManager>,
    registry: Arc<SyncRegistry>,
    sleeper: Arc<dyn Sleeper>,
    retry: RetryPolicy,
    time_zone: String,
    admin_email: Option<String>,
}

impl ProvisioningWorkflow {
    pub fn new(
        calendars: Arc<dyn CalendarStore>,
        provider: Arc<dyn CalendarProvider>,
        directory: Arc<dyn PractitionerDirectory>,
        notifier: Arc<dyn Notifier>,
        lifecycle: Arc<ChannelLifecycleManager>,
        registry: Arc<SyncRegistry>,
    ) -> Self {
        Self {
            calendars,
            provider,
            directory,
            notifier,
            lifecycle,
            registry,
            sleeper: Arc::new(TokioSleeper),
            retry: RetryPolicy::default(),
            time_zone: "UTC".to_string(),
            admin_email: None,
        }
    }

    pub fn with_config(mut self, config: &AppConfig) -> Self {
        self.time_zone = config.practice_timezone.clone();
        self.admin_email = config.admin_notification_email.clone();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn sleeper(&self) -> Arc<dyn Sleeper> {
        self.sleeper.clone()
    }

    async fn retry<T, F, Fut>(&self, operation: &str, op: F) -> Result<T, ProvisionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProvisionError>>,
    {
        retry_with_backoff(&self.retry, self.sleeper.as_ref(), operation, op).await
    }

    fn failure(practitioner_id: Uuid, step: ProvisionStep, error: ProvisionError) -> ProvisionResult {
        error!("Provisioning for practitioner {} failed at {:?}: {}", practitioner_id, step, error);
        ProvisionResult::failed(practitioner_id, step, error.to_string(), error.is_retryable())
    }

    /// Never returns an error; the outcome, failing step and retryability are
    /// described by the [`ProvisionResult`].
    #[instrument(skip(self))]
    pub async fn provision(&self, practitioner_id: Uuid, practitioner_email: &str) -> ProvisionResult {
        let email = practitioner_email.trim();
        if !is_plausible_email(email) {
            return Self::failure(
                practitioner_id,
                ProvisionStep::Validation,
                ProvisionError::Validation(format!("Invalid practitioner email '{}'", email)),
            );
        }

        let practitioner = match self
            .retry("load practitioner", || async { Ok(self.directory.get(practitioner_id).await?) })
            .await
        {
            Ok(Some(practitioner)) => practitioner,
            Ok(None) => return Self::failure(practitioner_id, ProvisionStep::Validation, ProvisionError::PractitionerNotFound(practitioner_id)),
            Err(e) => return Self::failure(practitioner_id, ProvisionStep::Validation, e),
        };
        if !practitioner.is_practitioner() {
            return Self::failure(practitioner_id, ProvisionStep::Validation, ProvisionError::NotAPractitioner(practitioner_id));
        }

        let existing = match self
            .retry("look up calendar", || async { Ok(self.calendars.find_by_practitioner(practitioner_id).await?) })
            .await
        {
            Ok(existing) => existing,
            Err(e) => return Self::failure(practitioner_id, ProvisionStep::IdempotencyCheck, e),
        };

        let mut stale = None;
        if let Some(calendar) = existing {
            if calendar.is_active() {
                info!("Practitioner {} already has active calendar {}", practitioner_id, calendar.id);
                let mut result = ProvisionResult::completed(practitioner_id, calendar.id, calendar.provider_calendar_id);
                result.already_provisioned = true;
                return result;
            }

            match self.reconcile(&practitioner, calendar).await {
                Ok(ReconcileOutcome::Restored(result)) => return result,
                Ok(ReconcileOutcome::Missing(calendar)) => stale = Some(calendar),
                Err(e) => return Self::failure(practitioner_id, ProvisionStep::Reconciliation, e),
            }
        }

        let summary = format!("{} - Sessions", practitioner.display_name());
        let provider_calendar_id = match self
            .retry("create provider calendar", || async {
                Ok(self.provider.create_calendar(&summary, &self.time_zone, Some(email)).await?)
            })
            .await
        {
            Ok(id) => id,
            Err(e) => return Self::failure(practitioner_id, ProvisionStep::CalendarCreation, e),
        };
        info!("Created provider calendar {} for practitioner {}", provider_calendar_id, practitioner_id);

        let persisted = async {
            if let Some(stale) = &stale {
                self.retry("remove stale calendar", || async { Ok(self.calendars.delete(stale.id).await?) }).await?;
                self.registry.forget(stale.id);
            }
            self.retry("persist calendar", || async {
                let calendar = Calendar::new(practitioner_id, provider_calendar_id.clone(), Some(email.to_string()));
                Ok(self.calendars.insert(calendar).await?)
            })
            .await
        };
        let calendar = match persisted.await {
            Ok(calendar) => calendar,
            Err(e) => {
                let report = self.compensate(practitioner_id, Some(&provider_calendar_id), None).await;
                let mut result = Self::failure(practitioner_id, ProvisionStep::CalendarPersistence, e).with_rollback(report);
                result.provider_calendar_id = Some(provider_calendar_id);
                return result;
            }
        };

        if let Err(e) = self
            .retry("update profile", || async { Ok(self.directory.set_calendar(practitioner_id, Some(calendar.id)).await?) })
            .await
        {
            let report = self.compensate(practitioner_id, Some(&provider_calendar_id), Some(calendar.id)).await;
            let mut result = Self::failure(practitioner_id, ProvisionStep::ProfileUpdate, e).with_rollback(report);
            result.calendar_id = Some(calendar.id);
            result.provider_calendar_id = Some(provider_calendar_id);
            return result;
        }

        self.activate(&calendar).await;
        self.send_notifications(&practitioner, email, &calendar).await;

        info!("Provisioned calendar {} for practitioner {}", calendar.id, practitioner_id);
        ProvisionResult::completed(practitioner_id, calendar.id, provider_calendar_id)
    }

    async fn reconcile(&self, practitioner: &Practitioner, calendar: Calendar) -> Result<ReconcileOutcome, ProvisionError> {
        let exists = self
            .retry("verify provider calendar", || async {
                Ok(self.provider.calendar_exists(&calendar.provider_calendar_id).await?)
            })
            .await?;

        if !exists {
            warn!(
                "Provider calendar {} for practitioner {} is gone, recreating",
                calendar.provider_calendar_id, practitioner.id
            );
            self.retry("mark calendar errored", || async {
                Ok(self.calendars.set_status(calendar.id, IntegrationStatus::Error).await?)
            })
            .await?;
            return Ok(ReconcileOutcome::Missing(calendar));
        }

        self.retry("reactivate calendar", || async {
            Ok(self.calendars.set_status(calendar.id, IntegrationStatus::Active).await?)
        })
        .await?;
        if practitioner.calendar_id != Some(calendar.id) {
            self.retry("update profile", || async {
                Ok(self.directory.set_calendar(practitioner.id, Some(calendar.id)).await?)
            })
            .await?;
        }

        info!("Reconciled calendar {} for practitioner {}", calendar.id, practitioner.id);
        let mut result = ProvisionResult::completed(practitioner.id, calendar.id, calendar.provider_calendar_id.clone());
        result.reconciled = true;
        Ok(ReconcileOutcome::Restored(result))
    }

    /// Marks the calendar active and opens its push channel. Neither failure
    /// undoes provisioning: a pending calendar is reconciled on the next run and
    /// a missing channel is picked up by the renewal pass.
    async fn activate(&self, calendar: &Calendar) {
        let activated = self
            .retry("activate calendar", || async {
                Ok(self.calendars.set_status(calendar.id, IntegrationStatus::Active).await?)
            })
            .await;

        let calendar = match activated {
            Ok(()) => Calendar {
                integration_status: IntegrationStatus::Active,
                ..calendar.clone()
            },
            Err(e) => {
                warn!("Failed to activate calendar {}: {}", calendar.id, e);
                return;
            }
        };

        if let Err(e) = self.lifecycle.renew_calendar(&calendar).await {
            warn!("Failed to open push channel for calendar {}: {}", calendar.id, e);
        }
    }

    async fn send_notifications(&self, practitioner: &Practitioner, email: &str, calendar: &Calendar) {
        let welcome = Notification::Welcome {
            practitioner_id: practitioner.id,
            email: email.to_string(),
            provider_calendar_id: calendar.provider_calendar_id.clone(),
        };
        let admin = Notification::AdminProvisioned {
            practitioner_id: practitioner.id,
            practitioner_email: email.to_string(),
            admin_email: self.admin_email.clone(),
            calendar_id: calendar.id,
        };

        let (welcome_sent, admin_sent) = tokio::join!(self.notifier.notify(&welcome), self.notifier.notify(&admin));
        if let Err(e) = welcome_sent {
            warn!("Welcome notification for practitioner {} failed: {}", practitioner.id, e);
        }
        if let Err(e) = admin_sent {
            warn!("Admin notification for practitioner {} failed: {}", practitioner.id, e);
        }
    }

    /// Removes everything provisioned for a practitioner: push channel,
    /// provider calendar, calendar row, profile reference and registry entries.
    #[instrument(skip(self))]
    pub async fn rollback_practitioner(&self, practitioner_id: Uuid) -> Result<RollbackReport, ProvisionError> {
        let Some(calendar) = self.calendars.find_by_practitioner(practitioner_id).await? else {
            info!("No calendar recorded for practitioner {}, clearing profile only", practitioner_id);
            return Ok(self.compensate(practitioner_id, None, None).await);
        };

        let mut channel_errors = Vec::new();
        let channel_stopped = if calendar.subscription_id.is_some() {
            match self.lifecycle.stop_calendar_channel(calendar.id).await {
                Ok(_) => Some(true),
                Err(e) => {
                    warn!("Failed to stop channel for calendar {}: {}", calendar.id, e);
                    channel_errors.push(format!("stop channel: {}", e));
                    Some(false)
                }
            }
        } else {
            None
        };

        let mut report = self
            .compensate(practitioner_id, Some(&calendar.provider_calendar_id), Some(calendar.id))
            .await;
        report.channel_stopped = channel_stopped;
        channel_errors.append(&mut report.errors);
        report.errors = channel_errors;

        info!(
            "Rolled back practitioner {} ({} compensating failures)",
            practitioner_id,
            report.errors.len()
        );
        Ok(report)
    }

    /// Runs the compensating actions concurrently; each one's failure is
    /// captured in the report without blocking the others.
    async fn compensate(
        &self,
        practitioner_id: Uuid,
        provider_calendar_id: Option<&str>,
        calendar_id: Option<Uuid>,
    ) -> RollbackReport {
        let delete_remote = async {
            match provider_calendar_id {
                Some(id) => Some(self.provider.delete_calendar(id).await.map_err(ProvisionError::from)),
                None => None,
            }
        };
        let delete_row = async {
            match calendar_id {
                Some(id) => Some(self.calendars.delete(id).await.map_err(ProvisionError::from)),
                None => None,
            }
        };
        let clear_profile = async {
            self.directory.set_calendar(practitioner_id, None).await.map_err(ProvisionError::from)
        };

        let (remote, row, profile) = tokio::join!(delete_remote, delete_row, clear_profile);

        if let Some(id) = calendar_id {
            self.registry.forget(id);
        }

        let mut errors = Vec::new();
        let provider_calendar_deleted = remote.map(|r| settle(&mut errors, "delete provider calendar", r));
        let calendar_row_deleted = row.map(|r| settle(&mut errors, "delete calendar row", r));
        let profile_cleared = settle(&mut errors, "clear profile reference", profile);

        RollbackReport {
            practitioner_id,
            calendar_id,
            channel_stopped: None,
            provider_calendar_deleted,
            calendar_row_deleted,
            profile_cleared,
            errors,
        }
    }

    pub async fn onboarding_stats(&self) -> Result<OnboardingStats, ProvisionError> {
        let (practitioners, calendars) = tokio::join!(self.directory.list_practitioners(), self.calendars.list());
        Ok(compute_onboarding_stats(&practitioners?, &calendars?))
    }
}

fn settle(errors: &mut Vec<String>, action: &str, outcome: Result<(), ProvisionError>) -> bool {
    match outcome {
        Ok(()) => true,
        Err(e) => {
            warn!("Rollback step '{}' failed: {}", action, e);
            errors.push(format!("{}: {}", action, e));
            false
        }
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_plausibility() {
        assert!(is_plausible_email("rivera@practice.test"));
        assert!(!is_plausible_email("rivera"));
        assert!(!is_plausible_email("@practice.test"));
        assert!(!is_plausible_email("rivera@localhost"));
        assert!(!is_plausible_email("ri vera@practice.test"));
        assert!(!is_plausible_email("a@b@practice.test"));
    }
}
