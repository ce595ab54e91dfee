use std::time::Duration;

use sqlx::PgPool;

use crate::autoresponder::run_daily_check;
use crate::email_client::EmailClient;
use crate::schedule::ScheduleTable;
use crate::template::TemplateStore;

/// Drives the reconciliation engine on a fixed cadence. One sequential loop:
/// a tick must finish (or fail) before the next sleep starts, so ticks never
/// overlap. A failed tick is simply retried on the next iteration; the engine
/// derives everything from persisted state, so nothing is lost.
pub async fn run_scheduler(
    db_pool: PgPool,
    email_client: EmailClient,
    templates: TemplateStore,
    schedule: ScheduleTable,
    tick_interval: Duration,
) {
    tracing::info!(
        tick_interval_secs = tick_interval.as_secs(),
        "Autoresponder scheduler started"
    );

    loop {
        if let Err(err) = run_daily_check(&db_pool, &email_client, &templates, &schedule).await {
            tracing::error!(error = ?err, "Autoresponder tick aborted, will retry next tick");
        }

        tokio::time::sleep(tick_interval).await;
    }
}
