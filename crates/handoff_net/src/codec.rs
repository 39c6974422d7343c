//! Envelope wire encoding.
//!
//! Envelopes travel as MessagePack maps with named fields. Reward requests
//! are JSON instead; see [`crate::connection::NatsConnection::request_json`].

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::NetError;
use crate::messages::Envelope;

/// Encode a value as a named-field MessagePack map.
///
/// # Errors
///
/// Returns [`NetError::Encode`] if serialisation fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, NetError> {
    Ok(rmp_serde::to_vec_named(value)?)
}

/// Decode a MessagePack value.
///
/// # Errors
///
/// Returns [`NetError::Decode`] if deserialisation fails.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, NetError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// Decode an envelope received from the wire.
///
/// # Errors
///
/// Returns [`NetError::Decode`] for malformed bytes and
/// [`NetError::ZeroSequence`] for an envelope numbered 0, which no sender
/// ever stamps.
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, NetError> {
    let envelope: Envelope = decode(bytes)?;
    if envelope.seq == 0 {
        return Err(NetError::ZeroSequence(envelope.sender));
    }
    Ok(envelope)
}
