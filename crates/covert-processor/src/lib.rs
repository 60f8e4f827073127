//! In-path processor: subscribes to the bus's ingress subjects,
//! optionally mitigates the covert channel, and republishes each
//! message to its paired egress subject after a randomized delay.

pub mod config;
pub mod error;

use std::time::Duration;

use futures::StreamExt;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

pub use error::ProcessorError;

/// `(ingress subject, egress subject)` pairs the processor bridges.
const TOPIC_PAIRS: [(&str, &str); 2] = [("inpktsec", "outpktinsec"), ("inpktinsec", "outpktsec")];

/// Connects to the bus and processes both subjects until either a
/// message fails to forward or the process receives `Ctrl-C`, in which
/// case this returns `Ok(())` for a clean shutdown.
///
/// # Errors
///
/// Propagates connection, subscription, publish, and flush errors.
pub async fn run(nats_url: &str, mean_delay: Duration, mitigate: bool) -> Result<(), ProcessorError> {
    let client = async_nats::connect(nats_url).await?;
    let (err_tx, mut err_rx) = mpsc::unbounded_channel();

    for (ingress, egress) in TOPIC_PAIRS {
        let client = client.clone();
        let subscriber = client.subscribe(ingress).await?;
        let err_tx = err_tx.clone();
        tokio::spawn(drive_subject(client, subscriber, egress, mean_delay, mitigate, err_tx));
    }
    drop(err_tx);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl-C, shutting down");
            Ok(())
        }
        Some(err) = err_rx.recv() => Err(err),
    }
}

/// Pulls messages off one subject's subscriber and spawns an
/// independent forwarding task per message, so one message's delay
/// never blocks the next message from being picked up.
async fn drive_subject(
    client: async_nats::Client,
    mut subscriber: async_nats::Subscriber,
    egress: &'static str,
    mean_delay: Duration,
    mitigate: bool,
    err_tx: mpsc::UnboundedSender<ProcessorError>,
) {
    while let Some(message) = subscriber.next().await {
        let client = client.clone();
        let err_tx = err_tx.clone();
        tokio::spawn(async move {
            if let Err(err) = forward_message(&client, message, egress, mean_delay, mitigate).await {
                let _ = err_tx.send(err);
            }
        });
    }
}

async fn forward_message(
    client: &async_nats::Client,
    message: async_nats::Message,
    egress: &'static str,
    mean_delay: Duration,
    mitigate: bool,
) -> Result<(), ProcessorError> {
    let frame = message.payload.to_vec();
    trace!(len = frame.len(), subject = %message.subject, "received frame");

    let forwarded = if mitigate && covert_wire::ethernet::has_udp_layer(&frame) {
        let mitigated = covert_wire::ethernet::recompute_udp_checksum(&frame);
        debug!("mitigated checksum on forwarded frame");
        mitigated
    } else {
        frame
    };

    let delay = random_delay(mean_delay);
    tokio::time::sleep(delay).await;

    client.publish(egress, forwarded.into()).await?;
    tokio::time::timeout(Duration::from_secs(1), client.flush())
        .await
        .map_err(|_| ProcessorError::FlushTimeout)??;

    info!(egress, "forwarded frame");
    Ok(())
}

fn random_delay(mean_delay: Duration) -> Duration {
    let bound = mean_delay.as_secs_f64() * 2.0;
    if bound <= 0.0 {
        return Duration::ZERO;
    }
    let secs = rand::thread_rng().gen_range(0.0..bound);
    Duration::from_secs_f64(secs)
}
