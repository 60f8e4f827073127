use std::sync::{atomic::Ordering, Arc};

use clap::Parser;
use covert_receiver::{Args, CovertReceiver};
use tracing::{error, info};

fn main() {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let receiver = Arc::new(CovertReceiver::new());
    if let Err(err) = run(&args, &receiver) {
        error!("{err:#}");
        std::process::exit(1);
    }

    println!("Covert message: {}", receiver.get_covert_message());
}

fn run(args: &Args, receiver: &Arc<CovertReceiver>) -> anyhow::Result<()> {
    let stop = receiver.stop_handle();
    ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))?;

    info!(listen_port = args.listen_port, "Receiver started, press Ctrl+C to stop");
    receiver.run(args.listen_port, args.ack_port)?;
    Ok(())
}
