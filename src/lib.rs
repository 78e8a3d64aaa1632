pub mod astro;
pub mod brokers;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod lookup;
pub mod normalize;
pub mod observability;
pub mod orchestrator;
pub mod server;
pub mod types;
