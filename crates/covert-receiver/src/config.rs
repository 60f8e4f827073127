use clap::Parser;

/// CLI flags for the covert receiver.
#[derive(Debug, Clone, Parser)]
#[command(about = "Listens for covert-encoded UDP datagrams and reassembles the embedded message")]
pub struct Args {
    /// Print debug-level diagnostics.
    #[arg(short, long)]
    pub verbose: bool,

    /// UDP port to listen for inbound covert-bearing datagrams on.
    #[arg(long = "listen-port", default_value_t = 8888)]
    pub listen_port: u16,

    /// UDP port ACKs are sent to on the sender's host.
    #[arg(long = "ack-port", default_value_t = 9999)]
    pub ack_port: u16,
}
