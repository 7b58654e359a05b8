//! Runtime configuration and the loader surface.

pub mod config;
pub mod exit;
pub mod options;

pub use config::{RuntimeConfig, RuntimeConfigBuilder};
pub use exit::ExitCode;
pub use options::RuntimeOptions;
