use std::time::Duration;

use email_autoresponder::config::get_configuration;
use email_autoresponder::email_client::EmailClient;
use email_autoresponder::scheduler::run_scheduler;
use email_autoresponder::startup::{get_connection_db_pool, Application};
use email_autoresponder::telemetry::{get_subscriber, init_subscriber};
use email_autoresponder::template::TemplateStore;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let subscriber = get_subscriber(String::from("email_autoresponder"), String::from("info"));

    init_subscriber(subscriber);

    let config = get_configuration().expect("Missing configuration file.");

    let application = Application::build(config.clone()).await?;
    tracing::info!("Server listening on {}", config.get_address());

    // The scheduler task gets its own pool and gateway client; both paths
    // still share the same delivery primitive and persisted state.
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
    let tick_interval = Duration::from_secs(config.autoresponder.tick_interval_secs);

    let scheduler = tokio::spawn(run_scheduler(
        db_pool,
        email_client,
        templates,
        schedule,
        tick_interval,
    ));

    tokio::select! {
        outcome = application.run_until_stop() => outcome,
        _ = scheduler => {
            tracing::error!("Autoresponder scheduler stopped unexpectedly");
            Ok(())
        }
    }
}
