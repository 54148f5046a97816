//! Engine configuration and observability plumbing

pub mod config;
pub mod logging;

pub use config::EngineConfig;
pub use logging::init_logging;
