//! Network-layer error types.

use handoff_ids::ParticipantId;

/// Errors that can occur during network operations.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Failed to encode a message to MessagePack.
    #[error("failed to encode message: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Failed to decode a message from MessagePack.
    #[error("failed to decode message: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// Failed to encode or decode a JSON request/reply body.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// NATS subscription error.
    #[error("NATS subscribe error: {0}")]
    Subscribe(#[from] async_nats::SubscribeError),

    /// NATS publish error.
    #[error("NATS publish error: {0}")]
    Publish(#[from] async_nats::PublishError),

    /// NATS connection error.
    #[error("NATS connection error: {0}")]
    Connect(#[from] async_nats::ConnectError),

    /// NATS request/reply error.
    #[error("NATS request error: {0}")]
    Request(#[from] async_nats::RequestError),

    /// A received envelope carried sequence number 0.
    #[error("envelope from {0} has sequence number 0")]
    ZeroSequence(ParticipantId),

    /// A participant tried to join a bus it is already on.
    #[error("{0} already joined the bus")]
    AlreadyJoined(ParticipantId),

    /// The endpoint's background task has stopped.
    #[error("endpoint channel closed")]
    ChannelClosed,
}
