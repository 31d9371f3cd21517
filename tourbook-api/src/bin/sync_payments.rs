//! One-shot repair job: re-derives every booking's status pair from its
//! payment records and reports what it changed.

use anyhow::{bail, Context};
use tourbook_api::bootstrap::{self, Services};
use tourbook_store::app_config::Config;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bootstrap::init_tracing();

    let config = Config::load().context("Failed to load config")?;
    let Services { engine, notifier, .. } = bootstrap::build_services(&config).await?;

    info!("Resyncing bookings against payments");
    let report = engine.reconciler.resync_all().await?;

    for correction in &report.corrections {
        info!(
            booking_id = %correction.booking_id,
            payment_id = %correction.payment_id,
            "Corrected {} -> {}",
            correction.from,
            correction.to
        );
    }
    for payment_id in &report.orphaned {
        warn!(%payment_id, "Payment has no booking");
    }
    for failure in &report.failures {
        warn!(payment_id = %failure.payment_id, "Resync failed: {}", failure.reason);
    }

    info!(
        scanned = report.scanned,
        corrected = report.corrected,
        unchanged = report.unchanged,
        superseded = report.superseded,
        orphaned = report.orphaned.len(),
        failures = report.failures.len(),
        "Resync finished"
    );

    drop(engine);
    bootstrap::flush_notifications(notifier).await;

    if !report.failures.is_empty() {
        bail!("{} payments could not be resynced", report.failures.len());
    }
    Ok(())
}
