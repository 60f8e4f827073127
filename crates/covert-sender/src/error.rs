use derive_more::{Display, Error, From};

/// Errors which can abort a [`crate::CovertSender::send`] call.
#[derive(Debug, Display, Error, From)]
pub enum SenderError {
    /// The covert string's byte length does not fit in the codec's
    /// length header; detected before any packet is sent.
    #[display("covert payload too large: {_0}")]
    ValueTooLarge(#[error(source)] covert_codec::ValueTooLarge),

    /// The carrier has fewer chunks than there are covert bits to place.
    #[display(
        "carrier has {available} chunks, but {needed} are needed to carry every covert bit"
    )]
    #[from(ignore)]
    CarrierUnderflow { available: usize, needed: usize },

    /// A transient socket error, propagated and terminating the session.
    #[display("socket error: {_0}")]
    Io(#[error(source)] std::io::Error),
}
