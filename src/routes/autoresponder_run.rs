use actix_web::{web, HttpResponse, ResponseError};
use reqwest::StatusCode;
use sqlx::PgPool;

use crate::{
    autoresponder::run_daily_check, email_client::EmailClient, schedule::ScheduleTable,
    template::TemplateStore,
};

#[derive(thiserror::Error)]
pub enum RunCheckError {
    #[error("A database failure aborted the autoresponder check.")]
    Store(#[from] sqlx::Error),
}

impl std::fmt::Debug for RunCheckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Caused by:\n\t({})", self)
    }
}

impl ResponseError for RunCheckError {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// Manual trigger for the daily reconciliation pass. Idempotent: running it
/// again with no elapsed time finds nothing newly due.
#[tracing::instrument(name = "Manually trigger the daily check", skip_all)]
pub async fn handle_run_daily_check(
    db_pool: web::Data<PgPool>,
    email_client: web::Data<EmailClient>,
    templates: web::Data<TemplateStore>,
    schedule: web::Data<ScheduleTable>,
) -> Result<HttpResponse, RunCheckError> {
    let summary = run_daily_check(
        db_pool.get_ref(),
        email_client.get_ref(),
        templates.get_ref(),
        schedule.get_ref(),
    )
    .await?;

    Ok(HttpResponse::Ok().json(summary))
}
