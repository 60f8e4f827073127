//! Sender half of the storage-channel covert link: chunks a carrier
//! message, embeds a covert bitstream into UDP checksum presence, and
//! drives a sliding-window ARQ over the result.

pub mod config;
pub mod error;
pub mod framing;
pub mod session;

pub use config::Args;
pub use error::SenderError;
pub use session::{choose_mode, CovertSender, Mode, SendOutcome};
