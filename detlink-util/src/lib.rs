//! Ambient stack shared by the detector-link server and client: CLI parsing,
//! logging, and shutdown signalling (SPEC_FULL.md §4.F–§4.I).

pub mod config;
pub mod logging;
pub mod shutdown;

pub use config::{ClientConfig, ConfigError, LogLevel, ServerConfig, DEFAULT_PORT};
