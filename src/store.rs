use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::domain::{
    new_subscriber::NewSubscriber, subscriber::Subscriber, subscriber_email::SubscriberEmail,
    subscriber_name::SubscriberName, subscriber_status::SubscriberStatus,
};

const SUBSCRIBER_COLUMNS: &str = r#"
    s.id, s.email, s.name, s.status, s.subscribed_at, s.last_sent_day,
    COALESCE(ARRAY_AGG(d.day) FILTER (WHERE d.day IS NOT NULL), '{}') AS sent_days
"#;

fn map_subscriber_row(row: PgRow) -> Subscriber {
    let last_sent_day: i32 = row.get("last_sent_day");
    let sent_days: Vec<i32> = row.get("sent_days");

    Subscriber {
        id: row.get("id"),
        email: SubscriberEmail::parse(row.get("email")).unwrap(),
        name: SubscriberName::parse(row.get("name")).unwrap(),
        status: SubscriberStatus::parse(row.get("status")).unwrap(),
        subscribed_at: row.get("subscribed_at"),
        last_sent_day: last_sent_day as u32,
        sent_days: sent_days.into_iter().map(|day| day as u32).collect(),
    }
}

#[tracing::instrument(name = "Look up a subscriber by email", skip(db_pool))]
pub async fn find_by_email(
    db_pool: &PgPool,
    email: &SubscriberEmail,
) -> Result<Option<Subscriber>, sqlx::Error> {
    sqlx::query(&format!(
        r#"
        SELECT {}
        FROM subscribers s
        LEFT JOIN deliveries d ON d.subscriber_id = s.id
        WHERE s.email = $1
        GROUP BY s.id
        "#,
        SUBSCRIBER_COLUMNS
    ))
    .bind(email.as_ref())
    .map(map_subscriber_row)
    .fetch_optional(db_pool)
    .await
}

#[tracing::instrument(
    name = "Insert a pending subscriber",
    skip(db_pool, new_subscriber, confirmation_token),
    fields(subscriber_email = %new_subscriber.email)
)]
pub async fn insert_pending(
    db_pool: &PgPool,
    new_subscriber: &NewSubscriber,
    confirmation_token: &str,
    token_expires_at: DateTime<Utc>,
) -> Result<Uuid, sqlx::Error> {
    let id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO subscribers
            (id, email, name, status, subscribed_at, confirmation_token, token_expires_at, last_sent_day)
        VALUES ($1, $2, $3, 'pending_confirmation', $4, $5, $6, 0)
        "#,
    )
    .bind(id)
    .bind(new_subscriber.email.as_ref())
    .bind(new_subscriber.name.as_ref())
    .bind(Utc::now())
    .bind(confirmation_token)
    .bind(token_expires_at)
    .execute(db_pool)
    .await?;

    Ok(id)
}

/// Atomically transitions the matching pending subscriber to confirmed: the
/// credential and its expiry are cleared and the subscription anchor is reset
/// to `now`. Stale, expired or already-used credentials match no row, so a
/// second confirmation attempt returns `None`.
#[tracing::instrument(name = "Confirm a subscriber by credential", skip(db_pool, token))]
pub async fn confirm_by_credential(
    db_pool: &PgPool,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Option<Subscriber>, sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE subscribers s
        SET status = 'confirmed',
            confirmation_token = NULL,
            token_expires_at = NULL,
            subscribed_at = $2
        WHERE s.confirmation_token = $1
          AND s.status = 'pending_confirmation'
          AND s.token_expires_at > $2
        RETURNING s.id, s.email, s.name, s.status, s.subscribed_at, s.last_sent_day,
                  '{}'::INT[] AS sent_days
        "#,
    )
    .bind(token)
    .bind(now)
    .map(map_subscriber_row)
    .fetch_optional(db_pool)
    .await
}

#[tracing::instrument(name = "List confirmed subscribers", skip(db_pool))]
pub async fn list_confirmed(db_pool: &PgPool) -> Result<Vec<Subscriber>, sqlx::Error> {
    sqlx::query(&format!(
        r#"
        SELECT {}
        FROM subscribers s
        LEFT JOIN deliveries d ON d.subscriber_id = s.id
        WHERE s.status = 'confirmed'
        GROUP BY s.id
        ORDER BY s.subscribed_at
        "#,
        SUBSCRIBER_COLUMNS
    ))
    .map(map_subscriber_row)
    .fetch_all(db_pool)
    .await
}

/// Records a successful delivery: sets the per-day sent-flag and advances
/// `last_sent_day`, in one transaction so the confirmation-triggered day-1
/// send and a same-day tick cannot lose each other's update.
#[tracing::instrument(name = "Mark a scheduled day as delivered", skip(db_pool))]
pub async fn mark_delivered(
    db_pool: &PgPool,
    subscriber_id: Uuid,
    day: u32,
) -> Result<(), sqlx::Error> {
    let mut transaction = db_pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO deliveries (subscriber_id, day, sent_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (subscriber_id, day) DO NOTHING
        "#,
    )
    .bind(subscriber_id)
    .bind(day as i32)
    .bind(Utc::now())
    .execute(&mut transaction)
    .await?;

    sqlx::query(
        r#"
        UPDATE subscribers
        SET last_sent_day = GREATEST(last_sent_day, $2)
        WHERE id = $1
        "#,
    )
    .bind(subscriber_id)
    .bind(day as i32)
    .execute(&mut transaction)
    .await?;

    transaction.commit().await
}
