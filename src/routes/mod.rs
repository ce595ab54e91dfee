mod autoresponder_run;
mod health_check;
mod subscriptions;
mod subscriptions_confirm;

pub use autoresponder_run::handle_run_daily_check;
pub use health_check::health_check;
pub use subscriptions::handle_create_subscription;
pub use subscriptions_confirm::handle_confirm_subscription;
