//! NATS connection management.
//!
//! A thin wrapper around `async-nats` with the defaults the session host,
//! participants and the reward backend agree on.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::NetError;

/// Default NATS server URL.
pub const DEFAULT_NATS_URL: &str = "nats://localhost:4222";

/// The environment variable used to override the NATS URL.
pub const NATS_URL_ENV: &str = "NATS_URL";

/// Resolve the NATS URL: explicit override, then `NATS_URL`, then the default.
#[must_use]
pub fn resolve_url(explicit: Option<&str>) -> String {
    match explicit {
        Some(url) => url.to_string(),
        None => std::env::var(NATS_URL_ENV).unwrap_or_else(|_| DEFAULT_NATS_URL.to_string()),
    }
}

/// A wrapper around an `async-nats` client.
#[derive(Debug, Clone)]
pub struct NatsConnection {
    /// The underlying NATS client.
    client: async_nats::Client,
}

impl NatsConnection {
    /// Connect using the URL from `NATS_URL`, falling back to
    /// [`DEFAULT_NATS_URL`].
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Connect`] if the connection cannot be established.
    pub async fn connect() -> Result<Self, NetError> {
        Self::connect_to(&resolve_url(None)).await
    }

    /// Connect to NATS at the specified URL.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Connect`] if the connection cannot be established.
    pub async fn connect_to(url: &str) -> Result<Self, NetError> {
        info!(url, "connecting to NATS");
        let client = async_nats::connect(url).await?;
        info!("NATS connection established");
        Ok(Self { client })
    }

    /// Returns a reference to the underlying `async-nats` client.
    #[must_use]
    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }

    /// Publish a MessagePack-encoded message to a subject.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] if encoding or publishing fails.
    pub async fn publish<T: Serialize>(&self, subject: &str, message: &T) -> Result<(), NetError> {
        let payload = crate::codec::encode(message)?;
        self.client
            .publish(subject.to_string(), payload.into())
            .await?;
        Ok(())
    }

    /// Subscribe to a subject.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Subscribe`] if the subscription fails.
    pub async fn subscribe(&self, subject: &str) -> Result<async_nats::Subscriber, NetError> {
        let sub = self.client.subscribe(subject.to_string()).await?;
        Ok(sub)
    }

    /// Send a JSON request and decode the JSON reply.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] if encoding, the request itself, or decoding the
    /// reply fails.
    pub async fn request_json<T: Serialize, R: DeserializeOwned>(
        &self,
        subject: &str,
        body: &T,
    ) -> Result<R, NetError> {
        let payload = serde_json::to_vec(body)?;
        debug!(subject, bytes = payload.len(), "request");
        let reply = self
            .client
            .request(subject.to_string(), payload.into())
            .await?;
        Ok(serde_json::from_slice(reply.payload.as_ref())?)
    }
}
