use chrono::{NaiveDate, Utc};
use sqlx::PgPool;

use crate::domain::subscriber::Subscriber;
use crate::email_client::EmailClient;
use crate::schedule::ScheduleTable;
use crate::store;
use crate::template::{TemplateError, TemplateStore};

#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error("Day {0} is not present in the schedule table.")]
    NotScheduled(u32),
    #[error("Failed to resolve the template for a scheduled day.")]
    Template(#[from] TemplateError),
    #[error("The delivery gateway rejected the message.")]
    Gateway(#[from] reqwest::Error),
    #[error("Failed to commit the delivery state.")]
    Store(#[from] sqlx::Error),
}

/// Outcome of one reconciliation pass over all confirmed subscribers.
#[derive(Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct TickSummary {
    pub subscribers: usize,
    pub delivered: usize,
    pub halted: usize,
}

/// Delivers one scheduled day's email to one subscriber and, only after the
/// gateway accepted it, commits the updated delivery state. Both the
/// confirmation flow and the daily tick go through here.
///
/// A failure at any step leaves persisted state untouched; the caller retries
/// on a later tick. A crash between gateway success and the store commit can
/// duplicate one message on the next tick, which is accepted.
#[tracing::instrument(
    name = "Deliver one scheduled day",
    skip_all,
    fields(subscriber_email = %subscriber.email, day = day)
)]
pub async fn deliver_scheduled_day(
    db_pool: &PgPool,
    email_client: &EmailClient,
    templates: &TemplateStore,
    schedule: &ScheduleTable,
    subscriber: &Subscriber,
    day: u32,
) -> Result<(), DeliveryError> {
    let template_ref = schedule
        .template_for(day)
        .ok_or(DeliveryError::NotScheduled(day))?;

    // Resolution failure never reaches the gateway.
    let email = templates.resolve(template_ref, subscriber.name.as_ref(), &[])?;

    email_client.send_email(&subscriber.email, &email).await?;

    store::mark_delivered(db_pool, subscriber.id, day).await?;

    Ok(())
}

/// Runs one tick of the reconciliation engine against the current date.
/// Idempotent: re-running with no elapsed time finds nothing newly due.
pub async fn run_daily_check(
    db_pool: &PgPool,
    email_client: &EmailClient,
    templates: &TemplateStore,
    schedule: &ScheduleTable,
) -> Result<TickSummary, sqlx::Error> {
    run_daily_check_at(db_pool, email_client, templates, schedule, Utc::now().date_naive()).await
}

/// Tick body with an injected "today", so elapsed-day arithmetic and catch-up
/// behaviour are testable deterministically.
///
/// Every decision is derived fresh from persisted state, so the engine is safe
/// to re-run after a crash. Only a failure to list subscribers aborts the
/// tick; per-subscriber failures are logged and isolated.
#[tracing::instrument(
    name = "Run the daily autoresponder check",
    skip(db_pool, email_client, templates, schedule)
)]
pub async fn run_daily_check_at(
    db_pool: &PgPool,
    email_client: &EmailClient,
    templates: &TemplateStore,
    schedule: &ScheduleTable,
    today: NaiveDate,
) -> Result<TickSummary, sqlx::Error> {
    let subscribers = store::list_confirmed(db_pool).await?;
    let mut summary = TickSummary {
        subscribers: subscribers.len(),
        ..TickSummary::default()
    };

    for subscriber in &subscribers {
        let current_day = current_schedule_day(subscriber.subscribed_at.date_naive(), today);
        let mut last_sent_day = subscriber.last_sent_day;

        for day in schedule.days() {
            // Day 1 is delivered by the confirmation flow; never resend it here,
            // even before the flag and last_sent_day have been reconciled.
            if day == schedule.first_day() && subscriber.has_sent(day) {
                continue;
            }

            if !is_due(day, current_day, subscriber.has_sent(day), last_sent_day) {
                continue;
            }

            match deliver_scheduled_day(
                db_pool,
                email_client,
                templates,
                schedule,
                subscriber,
                day,
            )
            .await
            {
                Ok(()) => {
                    tracing::info!(
                        subscriber_email = %subscriber.email,
                        day = day,
                        "Scheduled day delivered"
                    );
                    // Advance the local gate so the next offset of a catch-up
                    // chain is evaluated against the committed state.
                    last_sent_day = day;
                    summary.delivered += 1;
                }
                Err(err) => {
                    // Stop this subscriber for this tick so no later day can
                    // overtake the failed one; retried next tick.
                    tracing::warn!(
                        subscriber_email = %subscriber.email,
                        day = day,
                        error = ?err,
                        "Delivery failed, subscriber halted until the next tick"
                    );
                    summary.halted += 1;
                    break;
                }
            }
        }
    }

    tracing::info!(
        subscribers = summary.subscribers,
        delivered = summary.delivered,
        halted = summary.halted,
        "Daily autoresponder check finished"
    );

    Ok(summary)
}

/// 1-based day count since the subscription anchor, inclusive of the anchor
/// day: a subscriber confirmed today is on schedule day 1.
fn current_schedule_day(anchor: NaiveDate, today: NaiveDate) -> i64 {
    (today - anchor).num_days() + 1
}

/// A scheduled day is due iff it has been reached, its flag is unset and every
/// earlier scheduled day has already been delivered (`last_sent_day` gate).
fn is_due(day: u32, current_schedule_day: i64, already_sent: bool, last_sent_day: u32) -> bool {
    current_schedule_day >= i64::from(day) && !already_sent && last_sent_day < day
}
