pub mod config;
pub mod delivery;
pub mod domain;
pub mod email_client;
pub mod mailerlite_client;
pub mod routes;
pub mod startup;
pub mod store;
pub mod telemetry;
