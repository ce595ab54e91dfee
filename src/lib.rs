pub mod autoresponder;
pub mod config;
pub mod domain;
pub mod email_client;
pub mod routes;
pub mod schedule;
pub mod scheduler;
pub mod startup;
pub mod store;
pub mod telemetry;
pub mod template;
