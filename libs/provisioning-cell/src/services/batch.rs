use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::models::{BatchPolicy, BatchProvisionResult, ProvisionRequest, ProvisionResult, ProvisionStep};
use crate::services::retry::Sleeper;
use crate::services::workflow::ProvisioningWorkflow;

/// Provisions many practitioners under a fixed concurrency limit, spacing the
/// starts to stay inside provider rate limits.
pub struct BatchProvisioner {
    workflow: Arc<ProvisioningWorkflow>,
    sleeper: Arc<dyn Sleeper>,
    policy: BatchPolicy,
}

impl BatchProvisioner {
    pub fn new(workflow: Arc<ProvisioningWorkflow>) -> Self {
        let sleeper = workflow.sleeper();
        Self {
            workflow,
            sleeper,
            policy: BatchPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: BatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Results come back in request order. Repeated practitioner ids and
    /// practitioners that already have an active calendar count as skipped.
    #[instrument(skip(self, requests), fields(total = requests.len()))]
    pub async fn provision_all(&self, requests: Vec<ProvisionRequest>) -> BatchProvisionResult {
        let semaphore = Arc::new(Semaphore::new(self.policy.concurrency.max(1)));
        let last_start = Mutex::new(None);
        let last_start = &last_start;
        let mut seen = HashSet::new();

        let tasks = requests.into_iter().enumerate().map(|(index, request)| {
            let duplicate = !seen.insert(request.practitioner_id);
            let semaphore = semaphore.clone();
            let delay = self.policy.start_delay(index);

            async move {
                if duplicate {
                    return (true, duplicate_result(&request));
                }

                if !delay.is_zero() {
                    self.sleeper.sleep(delay).await;
                }

                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        warn!("Batch limiter closed before practitioner {}: {}", request.practitioner_id, e);
                        return (
                            false,
                            ProvisionResult::failed(request.practitioner_id, ProvisionStep::Validation, e.to_string(), true),
                        );
                    }
                };
                self.space_start(last_start).await;

                let result = self.workflow
                    .provision(request.practitioner_id, &request.practitioner_email)
                    .await;
                (result.already_provisioned, result)
            }
        });

        let outcomes = join_all(tasks).await;

        let mut batch = BatchProvisionResult {
            total: outcomes.len(),
            ..BatchProvisionResult::default()
        };
        for (skipped, result) in outcomes {
            if skipped {
                batch.skipped += 1;
            } else if result.success {
                batch.successful += 1;
            } else {
                batch.failed += 1;
            }
            batch.results.push(result);
        }

        info!(
            "Batch provisioning finished: {} successful, {} failed, {} skipped",
            batch.successful, batch.failed, batch.skipped
        );
        batch
    }

    /// Holds a start back until `min_spacing` has passed since the previous
    /// one. Runs with the permit held, so permits freed together still start
    /// one spacing apart.
    async fn space_start(&self, last_start: &Mutex<Option<Instant>>) {
        let mut last = last_start.lock().await;
        if let Some(previous) = *last {
            let wait = self.policy.min_spacing.saturating_sub(previous.elapsed());
            if !wait.is_zero() {
                self.sleeper.sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

fn duplicate_result(request: &ProvisionRequest) -> ProvisionResult {
    let mut result = ProvisionResult::failed(
        request.practitioner_id,
        ProvisionStep::Validation,
        "Practitioner listed more than once in batch",
        false,
    );
    result.retryable = None;
    result.rollback_required = None;
    result
}
