use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Pool, Postgres};
use std::net::TcpListener;
use tracing_actix_web::TracingLogger;

use crate::config::{DatabaseSettings, Settings};
use crate::domain::subscriber_email::SubscriberEmail;
use crate::email_client::EmailClient;
use crate::routes::{
    handle_confirm_subscription, handle_create_subscription, handle_run_daily_check, health_check,
};
use crate::schedule::ScheduleTable;
use crate::template::TemplateStore;

/// Base URL used to build confirmation links in outgoing emails.
pub struct ApplicationBaseUrl(pub String);

/// How long a confirmation credential stays valid after signup.
#[derive(Clone, Copy)]
pub struct ConfirmationTokenTtl(pub chrono::Duration);

/// Optional operator address notified on every new signup. None disables the hook.
pub struct SignupNotification(pub Option<SubscriberEmail>);

pub struct Application {
    pub port: u16,
    pub server: Server,
}

impl Application {
    pub async fn build(config: Settings) -> Result<Self, std::io::Error> {
        let db_pool = get_connection_db_pool(&config.database);
        let sender_email = config
            .get_email_client_sender()
            .expect("Sender email is not valid");
        let email_client = EmailClient::new(
            config.get_email_client_base_url(),
            sender_email,
            config.get_email_client_api(),
            None,
        );
        let templates = TemplateStore::new(&config.autoresponder.templates_dir);
        let schedule = config
            .get_schedule_table()
            .expect("Invalid autoresponder schedule configuration");
        let notification_recipient = config
            .get_notification_recipient()
            .expect("Signup notification recipient is not a valid email");
        let token_ttl =
            ConfirmationTokenTtl(chrono::Duration::hours(config.autoresponder.token_ttl_hours));

        let listener =
            TcpListener::bind(config.get_address()).expect("Failed to bind the address.");
        let port = listener.local_addr().unwrap().port();
        let server = run(
            listener,
            db_pool,
            email_client,
            templates,
            schedule,
            ApplicationBaseUrl(config.get_app_base_url()),
            token_ttl,
            SignupNotification(notification_recipient),
        )?;

        Ok(Self { port, server })
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stop(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

#[allow(clippy::too_many_arguments)]
pub fn run(
    listener: TcpListener,
    db_pool: PgPool,
    email_client: EmailClient,
    templates: TemplateStore,
    schedule: ScheduleTable,
    base_url: ApplicationBaseUrl,
    token_ttl: ConfirmationTokenTtl,
    notification: SignupNotification,
) -> Result<Server, std::io::Error> {
    let db_pool = web::Data::new(db_pool);
    let email_client = web::Data::new(email_client);
    let templates = web::Data::new(templates);
    let schedule = web::Data::new(schedule);
    let base_url = web::Data::new(base_url);
    let token_ttl = web::Data::new(token_ttl);
    let notification = web::Data::new(notification);

    let server = HttpServer::new(move || {
        // App is where your application logic lives: routing, middlewares, request handler, etc
        App::new()
            // 'wrap' method adds a middleware to the App. This specific middleware provide incoming
            // request logger
            .wrap(TracingLogger::default())
            .route("/health_check", web::get().to(health_check))
            .route("/subscriptions", web::post().to(handle_create_subscription))
            .route(
                "/subscriptions/confirm",
                web::get().to(handle_confirm_subscription),
            )
            .route(
                "/autoresponder/run",
                web::post().to(handle_run_daily_check),
            )
            .app_data(db_pool.clone())
            .app_data(email_client.clone())
            .app_data(templates.clone())
            .app_data(schedule.clone())
            .app_data(base_url.clone())
            .app_data(token_ttl.clone())
            .app_data(notification.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}

pub fn get_connection_db_pool(config: &DatabaseSettings) -> Pool<Postgres> {
    PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(2))
        .connect_lazy_with(config.get_db_options())
}
