pub mod config;
pub mod detect;
pub mod metrics;
pub mod server;
pub mod tracker;
