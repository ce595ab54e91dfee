use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Response, Url};
use sqlx::{migrate, Connection, Executor, PgConnection, PgPool, Row};
use std::collections::HashMap;
use uuid::Uuid;
use wiremock::MockServer;

use email_autoresponder::{
    autoresponder::{run_daily_check_at, TickSummary},
    config::{get_configuration, DatabaseSettings, Settings},
    email_client::EmailClient,
    startup::{get_connection_db_pool, Application},
    template::TemplateStore,
};

pub struct TestApp {
    pub config: Settings,
    pub address: String,
    pub port: u16,
    pub db_pool: PgPool,
    pub email_server: MockServer,
}

/// Confirmation links extracted from a captured confirmation email.
pub struct ConfirmationLinks {
    pub plain: Url,
    pub html: Url,
}

/// Snapshot of a subscriber's persisted delivery state.
pub struct SubscriberState {
    pub status: String,
    pub has_token: bool,
    pub last_sent_day: i32,
    pub sent_days: Vec<i32>,
}

impl TestApp {
    pub async fn spawn_app() -> TestApp {
        let mut config = get_configuration().expect("Missing configuration file.");
        let db_test_name = format!("db_{}", Uuid::new_v4().to_string().replace('-', "_"));
        let email_server = MockServer::start().await;

        // We are using port 0 as way to define a different port per each test. Port 0 is a special case that operating systems
        // take into account: when port is 0, the OS will search for the first available port
        config.set_app_port(0);
        config.set_email_client_base_url(email_server.uri());

        let db_pool = configure_db(&mut config.database, db_test_name.clone()).await;

        let application = Application::build(config.clone())
            .await
            .expect("Failed to build application.");
        let port = application.get_port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(application.run_until_stop());

        TestApp {
            address,
            port,
            config,
            db_pool,
            email_server,
        }
    }

    pub async fn post_subscription(&self, body: HashMap<&str, &str>) -> Response {
        let client = reqwest::Client::new();
        let url = format!("{}/subscriptions", self.address);

        client
            .post(&url)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Extracts the confirmation links from a captured gateway request body.
    pub fn get_confirmation_link(&self, email_request: &wiremock::Request) -> ConfirmationLinks {
        let body: serde_json::Value =
            serde_json::from_slice(&email_request.body).expect("Invalid email body.");

        let extract_link = |part: &serde_json::Value| {
            let text = part["value"].as_str().unwrap();
            let links: Vec<_> = linkify::LinkFinder::new()
                .links(text)
                .filter(|link| *link.kind() == linkify::LinkKind::Url)
                .collect();

            assert_eq!(links.len(), 1);

            let mut link = Url::parse(links[0].as_str()).unwrap();
            // The configured base_url does not know the random test port
            link.set_port(Some(self.port)).unwrap();
            link
        };

        ConfirmationLinks {
            plain: extract_link(&body["content"][0]),
            html: extract_link(&body["content"][1]),
        }
    }

    /// Runs one engine tick with an injected "today", using the test app's
    /// database and mocked gateway.
    pub async fn run_tick(&self, today: NaiveDate) -> TickSummary {
        let sender = self
            .config
            .get_email_client_sender()
            .expect("Sender email is not valid");
        let email_client = EmailClient::new(
            self.config.get_email_client_base_url(),
            sender,
            self.config.get_email_client_api(),
            None,
        );
        let templates = TemplateStore::new(&self.config.autoresponder.templates_dir);
        let schedule = self
            .config
            .get_schedule_table()
            .expect("Invalid schedule configuration");

        run_daily_check_at(&self.db_pool, &email_client, &templates, &schedule, today)
            .await
            .expect("The tick aborted on a store failure.")
    }

    /// Inserts a confirmed subscriber directly, bypassing the HTTP flow, with
    /// the given anchor and already-sent days.
    pub async fn seed_confirmed_subscriber(
        &self,
        email: &str,
        name: &str,
        subscribed_at: DateTime<Utc>,
        sent_days: &[i32],
    ) -> Uuid {
        let id = Uuid::new_v4();
        let last_sent_day = sent_days.iter().copied().max().unwrap_or(0);

        sqlx::query(
            r#"
            INSERT INTO subscribers (id, email, name, status, subscribed_at, last_sent_day)
            VALUES ($1, $2, $3, 'confirmed', $4, $5)
            "#,
        )
        .bind(id)
        .bind(email)
        .bind(name)
        .bind(subscribed_at)
        .bind(last_sent_day)
        .execute(&self.db_pool)
        .await
        .expect("Failed to seed a confirmed subscriber.");

        for day in sent_days {
            sqlx::query("INSERT INTO deliveries (subscriber_id, day, sent_at) VALUES ($1, $2, $3)")
                .bind(id)
                .bind(*day)
                .bind(subscribed_at)
                .execute(&self.db_pool)
                .await
                .expect("Failed to seed a delivery row.");
        }

        id
    }

    pub async fn get_subscriber_state(&self, email: &str) -> SubscriberState {
        sqlx::query(
            r#"
            SELECT s.status, s.confirmation_token IS NOT NULL AS has_token, s.last_sent_day,
                   COALESCE(ARRAY_AGG(d.day ORDER BY d.day) FILTER (WHERE d.day IS NOT NULL), '{}') AS sent_days
            FROM subscribers s
            LEFT JOIN deliveries d ON d.subscriber_id = s.id
            WHERE s.email = $1
            GROUP BY s.id
            "#,
        )
        .bind(email)
        .map(|row: sqlx::postgres::PgRow| SubscriberState {
            status: row.get("status"),
            has_token: row.get("has_token"),
            last_sent_day: row.get("last_sent_day"),
            sent_days: row.get("sent_days"),
        })
        .fetch_one(&self.db_pool)
        .await
        .expect("Failed to fetch the subscriber state.")
    }
}

/// Subjects of every email the mock gateway received, in arrival order.
pub async fn received_subjects(email_server: &MockServer) -> Vec<String> {
    email_server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|request| {
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            body["subject"].as_str().unwrap().to_string()
        })
        .collect()
}

async fn configure_db(db_config: &mut DatabaseSettings, db_test_name: String) -> PgPool {
    // Create database
    let mut connection = PgConnection::connect_with(&db_config.get_db_options())
        .await
        .expect("Failed to connect to Postgres.");

    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, db_test_name))
        .await
        .expect("Failed to create database.");

    connection
        .close()
        .await
        .expect("Failed to close connection.");

    // Execute migrations
    db_config.set_name(db_test_name);

    let db_pool = get_connection_db_pool(db_config);

    migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("Failed to run migrations.");

    db_pool
}
