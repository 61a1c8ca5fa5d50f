use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Process-wide counters for the sync pipeline.
#[derive(Debug, Default)]
pub struct SyncMetrics {
    webhooks_received: AtomicU64,
    syncs_completed: AtomicU64,
    syncs_skipped: AtomicU64,
    full_resyncs: AtomicU64,
    sync_failures: AtomicU64,
    conflicts_detected: AtomicU64,
    renewals_succeeded: AtomicU64,
    renewals_failed: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub webhooks_received: u64,
    pub syncs_completed: u64,
    pub syncs_skipped: u64,
    pub full_resyncs: u64,
    pub sync_failures: u64,
    pub conflicts_detected: u64,
    pub renewals_succeeded: u64,
    pub renewals_failed: u64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn webhook_received(&self) {
        self.webhooks_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sync_completed(&self, full_resync: bool, conflicts: usize) {
        self.syncs_completed.fetch_add(1, Ordering::Relaxed);
        if full_resync {
            self.full_resyncs.fetch_add(1, Ordering::Relaxed);
        }
        self.conflicts_detected.fetch_add(conflicts as u64, Ordering::Relaxed);
    }

    pub fn sync_skipped(&self) {
        self.syncs_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sync_failed(&self) {
        self.sync_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn renewal_succeeded(&self) {
        self.renewals_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn renewal_failed(&self) {
        self.renewals_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            webhooks_received: self.webhooks_received.load(Ordering::Relaxed),
            syncs_completed: self.syncs_completed.load(Ordering::Relaxed),
            syncs_skipped: self.syncs_skipped.load(Ordering::Relaxed),
            full_resyncs: self.full_resyncs.load(Ordering::Relaxed),
            sync_failures: self.sync_failures.load(Ordering::Relaxed),
            conflicts_detected: self.conflicts_detected.load(Ordering::Relaxed),
            renewals_succeeded: self.renewals_succeeded.load(Ordering::Relaxed),
            renewals_failed: self.renewals_failed.load(Ordering::Relaxed),
        }
    }
}
