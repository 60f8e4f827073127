use std::time::Duration;

use clap::Parser;
use covert_processor::config::{self, Args};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    if let Err(err) = run(&args).await {
        error!("{err:#}");
        std::process::exit(1);
    }
}

async fn run(args: &Args) -> anyhow::Result<()> {
    let nats_url = config::nats_url();
    info!(delay = args.delay, mitigate = args.mitigate, "Running processor");

    let mean_delay = Duration::from_secs_f64(args.delay.max(0.0));
    covert_processor::run(&nats_url, mean_delay, args.mitigate).await?;
    Ok(())
}
