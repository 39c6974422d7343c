//! Serves a [`Ledger`] on the `reward.*` subjects.
//!
//! Subjects (request/reply, JSON, replies are `{"Ok": ..}` / `{"Err": ..}`):
//!
//!   reward.login    — `LoginRequest` → `LoginReply`
//!   reward.balance  — `InventoryRequest` → `InventoryReply`
//!   reward.grant    — `ExecuteFunctionRequest` → `ExecuteFunctionReply`

use std::sync::Arc;

use futures::StreamExt;
use handoff_net::NatsConnection;
use handoff_net::subjects::{REWARD_ALL, REWARD_BALANCE, REWARD_GRANT, REWARD_LOGIN};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use crate::api::ApiError;
use crate::error::RewardError;
use crate::ledger::Ledger;

/// Answers reward requests from a ledger.
pub struct RewardServer {
    ledger: Arc<Ledger>,
    connection: NatsConnection,
}

impl RewardServer {
    pub fn new(ledger: Arc<Ledger>, connection: NatsConnection) -> Self {
        Self { ledger, connection }
    }

    /// Serve until the subscription ends.
    ///
    /// # Errors
    ///
    /// Returns [`RewardError::Net`] if subscribing fails.
    pub async fn run(self) -> Result<(), RewardError> {
        let mut sub = self.connection.subscribe(REWARD_ALL).await?;
        info!(subject = REWARD_ALL, "reward service ready");

        while let Some(msg) = sub.next().await {
            let Some(reply_to) = msg.reply.clone() else {
                debug!(subject = %msg.subject, "request without reply subject");
                continue;
            };
            let body = respond(&self.ledger, msg.subject.as_str(), &msg.payload);
            if let Err(e) = self
                .connection
                .client()
                .publish(reply_to, body.into())
                .await
            {
                error!(%e, "failed to publish reply");
            }
        }
        Ok(())
    }
}

/// The JSON reply to one request.
#[must_use]
pub fn respond(ledger: &Ledger, subject: &str, payload: &[u8]) -> Vec<u8> {
    debug!(subject, "reward request");
    match subject {
        REWARD_LOGIN => encode(&decode(payload).and_then(|req| ledger.login(&req))),
        REWARD_BALANCE => encode(&decode(payload).and_then(|req| ledger.inventory(&req))),
        REWARD_GRANT => encode(&decode(payload).and_then(|req| ledger.execute(&req))),
        other => {
            warn!(subject = other, "unknown reward operation");
            encode::<()>(&Err(ApiError::new(
                "UnknownOperation",
                format!("no handler for {other}"),
            )))
        }
    }
}

fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(payload).map_err(|e| ApiError::new("InvalidRequest", e.to_string()))
}

fn encode<T: Serialize>(reply: &Result<T, ApiError>) -> Vec<u8> {
    serde_json::to_vec(reply).unwrap_or_else(|e| {
        error!(%e, "failed to encode reply");
        Vec::new()
    })
}
