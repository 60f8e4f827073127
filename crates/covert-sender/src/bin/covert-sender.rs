use std::sync::{atomic::Ordering, Arc};

use clap::Parser;
use covert_sender::{choose_mode, config, Args, CovertSender, Mode};
use tracing::{error, info};

fn main() {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    if let Err(err) = run(&args) {
        error!("{err:#}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let dst_ip = config::peer_ip()?;

    let sender = CovertSender::open(
        dst_ip,
        args.dst_port,
        args.src_port,
        args.max_udp_payload,
        args.window,
        args.timeout(),
        args.max_transmissions,
        args.wait(),
    )?;

    let stop = sender.stop_handle();
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))?;
    }

    let mode = choose_mode(args.covert_probability);
    if mode == Mode::OvertDummy {
        info!("Session selected overt-dummy mode; the configured covert string will not be sent");
    }

    let outcome = sender.send(args.carrier.as_bytes(), args.covert.as_bytes(), mode)?;
    info!(
        transmitted = outcome.transmitted,
        acknowledged = outcome.acknowledged,
        dropped = outcome.dropped,
        capacity = outcome.capacity,
        "Session finished"
    );

    if stop.load(Ordering::SeqCst) {
        info!("Interrupted by Ctrl-C after completion");
    }

    Ok(())
}
