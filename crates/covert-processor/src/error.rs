use derive_more::{Display, Error, From};

/// Errors which can abort the processor's run loop.
#[derive(Debug, Display, Error, From)]
pub enum ProcessorError {
    #[display("failed to connect to message bus: {_0}")]
    Connect(#[error(source)] async_nats::ConnectError),

    #[display("failed to subscribe to subject: {_0}")]
    Subscribe(#[error(source)] async_nats::SubscribeError),

    #[display("failed to publish message: {_0}")]
    Publish(#[error(source)] async_nats::PublishError),

    #[display("flush failed: {_0}")]
    Flush(#[error(source)] async_nats::FlushError),

    #[display("flush timed out waiting for server acknowledgment")]
    #[from(ignore)]
    FlushTimeout,
}
