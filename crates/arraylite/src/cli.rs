use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "arraylite")]
pub struct Args {
    /// Logging level (stderr). Also supports RUST_LOG.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Busy timeout applied to newly opened databases, in milliseconds.
    #[arg(long, default_value_t = 1_000)]
    pub busy_timeout_ms: u64,
}
