//! Receiver half of the storage-channel covert link: a preamble-gated
//! overt/covert state machine fed by a raw-socket capture loop.

pub mod config;
pub mod runner;
pub mod state;

pub use config::Args;
pub use state::{on_packet, PacketOutcome, ReceiverState, HEADER_BITS, PREAMBLE};

use std::sync::{atomic::AtomicBool, Arc, Mutex};

/// Owns the shared state a running receiver session exposes to its
/// CLI: the decoded message so far, and a stop flag for clean shutdown.
pub struct CovertReceiver {
    message: Arc<Mutex<String>>,
    stop: Arc<AtomicBool>,
}

impl Default for CovertReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl CovertReceiver {
    #[must_use]
    pub fn new() -> Self {
        Self {
            message: Arc::new(Mutex::new(String::new())),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Blocks until `stop_handle()` is set, processing inbound datagrams.
    ///
    /// # Errors
    ///
    /// Propagates socket setup and I/O errors.
    pub fn run(&self, listen_port: u16, ack_port: u16) -> std::io::Result<()> {
        runner::run(listen_port, ack_port, &self.message, &self.stop)
    }

    /// The most recently completed covert message, or empty if none
    /// has been decoded yet.
    #[must_use]
    pub fn get_covert_message(&self) -> String {
        self.message.lock().expect("receiver message mutex poisoned").clone()
    }
}
