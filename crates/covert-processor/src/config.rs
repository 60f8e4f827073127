use clap::Parser;

/// CLI flags for the in-path processor.
#[derive(Debug, Clone, Parser)]
#[command(about = "In-path message bus processor: optional checksum mitigation, randomized delay")]
pub struct Args {
    /// Mean one-way delay, in seconds, applied to each forwarded frame
    /// (actual delay is drawn uniformly from `[0, 2 * delay]`).
    #[arg(short = 'd', long, default_value_t = 1e-2)]
    pub delay: f64,

    /// Run the checksum-mitigation strategy: recompute every UDP
    /// checksum so `bit = 0` packets are normalized to `bit = 1`.
    #[arg(short = 'm', long)]
    pub mitigate: bool,

    /// Print debug-level diagnostics.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Reads the NATS server URL from `NATS_SURVEYOR_SERVERS`, defaulting
/// to the in-cluster address the original experiment topology used.
#[must_use]
pub fn nats_url() -> String {
    std::env::var("NATS_SURVEYOR_SERVERS").unwrap_or_else(|_| "nats://nats:4222".to_owned())
}
