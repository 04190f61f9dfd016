use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::repository::{EventSink, SessionStore, TenantConfigProvider};
use super::service::AdmissionQueue;

/// Counters for a single pass over all tenants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub tenants_scanned: usize,
    pub expired: usize,
    pub admitted: usize,
    pub failures: usize,
    pub cancelled: bool,
}

/// Periodically expires WAITING/READY sessions that outlived their deadline.
///
/// The interval is independent of tenant timeouts; a session overstays its
/// deadline by at most one interval.
pub struct ExpirationSweeper<S, C, E> {
    queue: Arc<AdmissionQueue<S, C, E>>,
    interval: Duration,
}

impl<S, C, E> ExpirationSweeper<S, C, E>
where
    S: SessionStore + 'static,
    C: TenantConfigProvider + 'static,
    E: EventSink + 'static,
{
    pub fn new(queue: Arc<AdmissionQueue<S, C, E>>, interval: Duration) -> Self {
        Self { queue, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One pass over every tenant with `auto_expire_inactive`. Cancellation is
    /// observed between tenants, never while a tenant's lock is held.
    pub async fn sweep_once(&self, cancel: &CancellationToken) -> SweepReport {
        let mut report = SweepReport::default();

        for tenant in self.queue.tenants() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let Some(config) = self.queue.config_for(&tenant) else {
                continue;
            };
            if !config.auto_expire_inactive {
                debug!(notaria_id = %tenant, "auto expiry disabled, skipping tenant");
                continue;
            }

            report.tenants_scanned += 1;
            match self.queue.expire_overdue(&tenant).await {
                Ok(outcome) => {
                    report.expired += outcome.expired.len();
                    report.admitted += outcome.admitted;
                    report.failures += outcome.failures;
                }
                Err(err) => {
                    warn!(notaria_id = %tenant, error = %err, "expiry sweep failed for tenant");
                    report.failures += 1;
                }
            }
        }

        if report.expired > 0 || report.failures > 0 {
            info!(
                tenants = report.tenants_scanned,
                expired = report.expired,
                admitted = report.admitted,
                failures = report.failures,
                "expiry sweep finished"
            );
        } else {
            debug!(tenants = report.tenants_scanned, "expiry sweep found nothing overdue");
        }

        report
    }

    /// Ticks until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        // Skip the first immediate tick.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep_once(&cancel).await;
                }
                _ = cancel.cancelled() => {
                    info!("expiry sweeper shutting down");
                    break;
                }
            }
        }
    }
}
