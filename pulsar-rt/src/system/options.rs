//! Loader command-line options.

// Layer 1: Standard library imports
use std::net::SocketAddr;
use std::str::FromStr;

// Layer 2: Third-party crate imports
use clap::Parser;
use tracing_subscriber::EnvFilter;

// Layer 3: Internal module imports
use crate::actor::ConcurrencyMode;

fn parse_mode(value: &str) -> Result<ConcurrencyMode, String> {
    ConcurrencyMode::from_str(value)
}

/// Command-line surface of a runtime loader built on the core.
///
/// ```text
/// myapp --workers 4 --concurrency process --bind 0.0.0.0:8060 \
///       --log-level info pulsar_rt::mailbox=debug
/// ```
#[derive(Debug, Clone, Parser)]
#[command(name = "pulsar", version, about = "Pulsar actor runtime")]
pub struct RuntimeOptions {
    /// Initial pool size for the primary monitor
    #[arg(long, default_value_t = 1)]
    pub workers: usize,

    /// Default concurrency mode: process or thread
    #[arg(long, default_value = "process", value_parser = parse_mode)]
    pub concurrency: ConcurrencyMode,

    /// Address for the application server (not the mailbox)
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Base log level, optionally followed by NAMESPACE=LEVEL overrides
    #[arg(long, num_args = 1.., default_values_t = vec!["info".to_owned()])]
    pub log_level: Vec<String>,

    /// Enable event-loop debug mode (verbose runtime tracing)
    #[arg(long)]
    pub debug: bool,
}

impl RuntimeOptions {
    /// Build the tracing filter from `--log-level` and `--debug`.
    ///
    /// The first value is the default level; the rest are
    /// `namespace=level` directives, exactly as the filter syntax takes
    /// them. `--debug` floors the runtime's own namespace at debug.
    pub fn log_filter(&self) -> Result<EnvFilter, String> {
        let mut directives = self.log_level.clone();
        if self.debug && !directives.iter().any(|d| d.starts_with("pulsar_rt")) {
            directives.push("pulsar_rt=debug".to_owned());
        }
        let spec = directives.join(",");
        EnvFilter::try_new(&spec).map_err(|error| format!("bad log level '{spec}': {error}"))
    }
}
