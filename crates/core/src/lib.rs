pub mod config;
pub mod replies;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
