use actix_web::{
    web::{self, Query},
    HttpResponse, ResponseError,
};
use chrono::Utc;
use reqwest::StatusCode;
use serde::Deserialize;
use sqlx::PgPool;

use crate::{
    autoresponder::deliver_scheduled_day, email_client::EmailClient, schedule::ScheduleTable,
    store, template::TemplateStore,
};

#[derive(Deserialize, Debug)]
pub struct Parameters {
    pub token: String,
}

#[derive(serde::Serialize)]
struct ConfirmResponse {
    outcome: &'static str,
    email: String,
    name: String,
}

#[derive(thiserror::Error)]
pub enum ConfirmError {
    #[error("The confirmation credential is invalid, expired or already used.")]
    InvalidOrExpired,
    #[error("A database failure was encountered while confirming the subscriber.")]
    Store(#[from] sqlx::Error),
}

impl std::fmt::Debug for ConfirmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Caused by:\n\t({})", self)
    }
}

impl ResponseError for ConfirmError {
    fn status_code(&self) -> StatusCode {
        match self {
            ConfirmError::InvalidOrExpired => StatusCode::UNAUTHORIZED,
            ConfirmError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[tracing::instrument(
    name = "Confirm a subscription",
    skip(db_pool, email_client, templates, schedule, parameters)
)]
pub async fn handle_confirm_subscription(
    parameters: Query<Parameters>,
    db_pool: web::Data<PgPool>,
    email_client: web::Data<EmailClient>,
    templates: web::Data<TemplateStore>,
    schedule: web::Data<ScheduleTable>,
) -> Result<HttpResponse, ConfirmError> {
    let subscriber =
        store::confirm_by_credential(db_pool.get_ref(), &parameters.token, Utc::now())
            .await?
            .ok_or(ConfirmError::InvalidOrExpired)?;

    // Best-effort immediate welcome send. The subscriber is confirmed either
    // way; a failed send is reconciled by the next tick.
    let first_day = schedule.first_day();
    if let Err(err) = deliver_scheduled_day(
        db_pool.get_ref(),
        email_client.get_ref(),
        templates.get_ref(),
        schedule.get_ref(),
        &subscriber,
        first_day,
    )
    .await
    {
        tracing::warn!(
            subscriber_email = %subscriber.email,
            day = first_day,
            error = ?err,
            "Immediate welcome send failed, deferred to the next tick"
        );
    }

    Ok(HttpResponse::Ok().json(ConfirmResponse {
        outcome: "confirmed",
        email: subscriber.email.as_ref().to_string(),
        name: subscriber.name.as_ref().to_string(),
    }))
}
