use std::{sync::Arc, time::Duration};

use log::*;
use tokio::task::JoinHandle;

use crate::integrations::fulfillment::PrepaidFulfillmentApi;

/// Starts the reconciliation worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// On every tick, orders that have been `processing` for longer than `stale_after` are re-checked with the
/// fulfillment provider.
pub fn start_reconciliation_worker(
    api: Arc<PrepaidFulfillmentApi>,
    interval: Duration,
    stale_after: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let stale_after = match chrono::Duration::from_std(stale_after) {
            Ok(d) => d,
            Err(e) => {
                error!("🕰️ Invalid stale fulfillment timeout. {e}. The reconciliation worker will not run.");
                return;
            },
        };
        let mut timer = tokio::time::interval(interval);
        info!("🕰️ Fulfillment reconciliation worker started");
        loop {
            timer.tick().await;
            debug!("🕰️ Running fulfillment reconciliation job");
            match api.reconcile_stale(stale_after).await {
                Ok(report) if report.resolved + report.failed + report.still_pending == 0 => {
                    trace!("🕰️ No stale fulfillments");
                },
                Ok(report) => info!(
                    "🕰️ Reconciliation: {} resolved, {} failed, {} still pending at the provider",
                    report.resolved, report.failed, report.still_pending
                ),
                Err(e) => {
                    error!("🕰️ Error running fulfillment reconciliation job: {e}");
                },
            }
        }
    })
}
