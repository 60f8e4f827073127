use std::{net::Ipv4Addr, time::Duration};

use clap::Parser;

/// CLI flags for the covert sender, plus the environment-derived peer
/// address.
#[derive(Debug, Clone, Parser)]
#[command(about = "Sends a carrier message embedding a covert payload over UDP checksum steganography")]
pub struct Args {
    /// Print debug-level diagnostics.
    #[arg(short, long)]
    pub verbose: bool,

    /// Covert message to embed.
    #[arg(short = 'c', long, default_value = "")]
    pub covert: String,

    /// Carrier (overt) message to transmit.
    #[arg(short = 'o', long = "overt")]
    pub carrier: String,

    /// Maximum UDP payload size in bytes.
    #[arg(short = 's', long = "udpsize", default_value_t = 1458)]
    pub max_udp_payload: usize,

    /// Seconds to keep the ACK thread alive after the last datagram is
    /// sent, to let late ACKs arrive.
    #[arg(long = "wait-secs", default_value_t = 1.0)]
    pub wait_secs: f64,

    /// Sliding window size.
    #[arg(short = 'w', long, default_value_t = 5)]
    pub window: usize,

    /// Maximum transmissions per sequence number (1 = never retransmit).
    #[arg(long = "max-transmissions", default_value_t = 5)]
    pub max_transmissions: u32,

    /// Per-packet retransmission timeout, in seconds.
    #[arg(short = 't', long, default_value_t = 5.0)]
    pub timeout_secs: f64,

    /// Probability (0..=1) of running in covert mode rather than
    /// overt-dummy mode for this session.
    #[arg(long = "covert-probability", default_value_t = 1.0)]
    pub covert_probability: f64,

    /// Destination UDP port (the receiver's listen port).
    #[arg(long, default_value_t = 8888)]
    pub dst_port: u16,

    /// Source UDP port used for covert-bearing datagrams.
    #[arg(long, default_value_t = 9999)]
    pub src_port: u16,
}

impl Args {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs.max(0.0))
    }

    #[must_use]
    pub fn wait(&self) -> Duration {
        Duration::from_secs_f64(self.wait_secs.max(0.0))
    }
}

/// Reads the peer address this sender talks to, from `INSECURENET_HOST_IP`.
///
/// # Errors
///
/// Returns an error if the variable is unset or not a valid IPv4 address.
pub fn peer_ip() -> anyhow::Result<Ipv4Addr> {
    let raw = std::env::var("INSECURENET_HOST_IP")
        .map_err(|_| anyhow::anyhow!("INSECURENET_HOST_IP environment variable is not set"))?;
    raw.parse()
        .map_err(|e| anyhow::anyhow!("INSECURENET_HOST_IP={raw:?} is not a valid IPv4 address: {e}"))
}
