use actix_web::{web, HttpResponse, ResponseError};
use chrono::Utc;
use rand::Rng;
use reqwest::StatusCode;
use sqlx::PgPool;

use crate::{
    domain::new_subscriber::{NewSubscriber, NewSubscriberBody},
    email_client::EmailClient,
    schedule::ScheduleTable,
    startup::{ApplicationBaseUrl, ConfirmationTokenTtl, SignupNotification},
    store,
    template::{RenderedEmail, TemplateError, TemplateStore},
};

const TOKEN_LENGTH: usize = 30;

#[derive(serde::Serialize)]
struct SubmitResponse {
    outcome: &'static str,
}

#[derive(thiserror::Error)]
pub enum SubscribeError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Failed to resolve the confirmation email template.")]
    Template(#[from] TemplateError),
    #[error("Failed to send the confirmation email.")]
    SendEmail(#[from] reqwest::Error),
    #[error("A database failure was encountered while registering the subscriber.")]
    Store(#[from] sqlx::Error),
}

impl std::fmt::Debug for SubscribeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Caused by:\n\t({})", self)
    }
}

impl ResponseError for SubscribeError {
    fn status_code(&self) -> StatusCode {
        match self {
            SubscribeError::Validation(_) => StatusCode::BAD_REQUEST,
            SubscribeError::Template(_)
            | SubscribeError::SendEmail(_)
            | SubscribeError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[tracing::instrument(
    name = "Creating a new subscriber handler",
    skip_all,
    fields(
        subscriber_email = %body.email,
        subscriber_name = %body.name
    )
)]
#[allow(clippy::too_many_arguments)]
pub async fn handle_create_subscription(
    body: web::Json<NewSubscriberBody>,
    db_pool: web::Data<PgPool>,
    email_client: web::Data<EmailClient>,
    templates: web::Data<TemplateStore>,
    schedule: web::Data<ScheduleTable>,
    base_url: web::Data<ApplicationBaseUrl>,
    token_ttl: web::Data<ConfirmationTokenTtl>,
    notification: web::Data<SignupNotification>,
) -> Result<HttpResponse, SubscribeError> {
    let new_subscriber: NewSubscriber = body
        .into_inner()
        .try_into()
        .map_err(SubscribeError::Validation)?;

    // Duplicate submissions are a normal outcome, reported distinctly per state.
    if let Some(existing) = store::find_by_email(db_pool.get_ref(), &new_subscriber.email).await? {
        let outcome = if existing.status.is_confirmed() {
            "already_confirmed"
        } else {
            "already_pending"
        };
        return Ok(HttpResponse::Ok().json(SubmitResponse { outcome }));
    }

    let confirmation_token = generate_confirmation_token();
    let token_expires_at = Utc::now() + token_ttl.0;

    store::insert_pending(
        db_pool.get_ref(),
        &new_subscriber,
        &confirmation_token,
        token_expires_at,
    )
    .await?;

    send_confirmation_email(
        email_client.get_ref(),
        templates.get_ref(),
        schedule.get_ref(),
        &new_subscriber,
        &base_url.0,
        &confirmation_token,
    )
    .await?;

    notify_signup(email_client.get_ref(), notification.get_ref(), &new_subscriber).await;

    Ok(HttpResponse::Created().json(SubmitResponse {
        outcome: "registered",
    }))
}

#[tracing::instrument(
    name = "Send a confirmation email to a new subscriber",
    skip(email_client, templates, schedule, new_subscriber, confirmation_token),
    fields(base_url = %base_url)
)]
async fn send_confirmation_email(
    email_client: &EmailClient,
    templates: &TemplateStore,
    schedule: &ScheduleTable,
    new_subscriber: &NewSubscriber,
    base_url: &str,
    confirmation_token: &str,
) -> Result<(), SubscribeError> {
    let confirmation_link = format!(
        "{}/subscriptions/confirm?token={}",
        base_url, confirmation_token
    );
    let email = templates.resolve(
        schedule.confirmation_template(),
        new_subscriber.name.as_ref(),
        &[("confirmation_link", confirmation_link.as_str())],
    )?;

    email_client.send_email(&new_subscriber.email, &email).await?;

    Ok(())
}

/// Optional side-channel: tell the configured operator address about every new
/// signup. A no-op when unconfigured; a failure never fails the submission.
#[tracing::instrument(name = "Send a signup notification", skip_all)]
async fn notify_signup(
    email_client: &EmailClient,
    notification: &SignupNotification,
    new_subscriber: &NewSubscriber,
) {
    let Some(recipient) = &notification.0 else {
        return;
    };

    let line = format!(
        "New signup: {} <{}>",
        new_subscriber.name.as_ref(),
        new_subscriber.email.as_ref()
    );
    let email = RenderedEmail {
        subject: String::from("New subscriber signup"),
        plain: line.clone(),
        html: format!("<p>{}</p>", line),
    };

    if let Err(err) = email_client.send_email(recipient, &email).await {
        tracing::warn!(error = ?err, "Failed to send the signup notification");
    }
}

fn generate_confirmation_token() -> String {
    let mut rng = rand::thread_rng();

    std::iter::repeat_with(|| rng.sample(rand::distributions::Alphanumeric))
        .map(char::from)
        .take(TOKEN_LENGTH)
        .collect()
}
