//! Where reward calls go.
//!
//! [`RewardBackend`] is the seam between the tick-side client and the
//! service: [`NatsRewardBackend`] sends JSON requests to whatever serves the
//! `reward.*` subjects, [`InMemoryRewardBackend`] answers from a [`Ledger`]
//! in process.

use std::future::Future;
use std::sync::Arc;

use handoff_net::NatsConnection;
use handoff_net::subjects::{REWARD_BALANCE, REWARD_GRANT, REWARD_LOGIN};
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::api::{
    ApiError, ExecuteFunctionReply, ExecuteFunctionRequest, GRANT_FUNCTION, InventoryReply,
    InventoryRequest, LoginReply, LoginRequest, NEW_BALANCE_KEY, SessionTicket,
};
use crate::error::RewardError;
use crate::ledger::Ledger;

/// The three calls a participant makes against the reward service.
pub trait RewardBackend: Send + Sync + 'static {
    /// Log in with `device_id`, creating the account on first use.
    fn login(&self, device_id: &str)
    -> impl Future<Output = Result<SessionTicket, RewardError>> + Send;

    /// The session's gold balance, 0 if it has none.
    fn balance(
        &self,
        ticket: &SessionTicket,
    ) -> impl Future<Output = Result<i64, RewardError>> + Send;

    /// Run the grant function and return the new balance.
    fn grant(&self, ticket: &SessionTicket)
    -> impl Future<Output = Result<i64, RewardError>> + Send;
}

fn login_request(device_id: &str) -> LoginRequest {
    LoginRequest {
        custom_id: device_id.to_string(),
        create_account: true,
    }
}

fn grant_request(ticket: &SessionTicket) -> ExecuteFunctionRequest {
    ExecuteFunctionRequest {
        session_ticket: ticket.clone(),
        function_name: GRANT_FUNCTION.to_string(),
        generate_play_stream_event: true,
    }
}

/// Turn a function reply into the new balance.
///
/// A script error wins over any result that came with it.
fn grant_outcome(reply: ExecuteFunctionReply) -> Result<i64, RewardError> {
    if let Some(script) = reply.error {
        error!(kind = %script.error, message = %script.message, "grant function failed");
        return Err(RewardError::Script {
            kind: script.error,
            message: script.message,
        });
    }
    reply
        .function_result
        .as_ref()
        .and_then(|result| result.get(NEW_BALANCE_KEY))
        .and_then(serde_json::Value::as_i64)
        .ok_or(RewardError::MissingBalance {
            key: NEW_BALANCE_KEY,
        })
}

// ── NATS ────────────────────────────────────────────────────────────────────

/// Reward calls as JSON request/reply over NATS.
#[derive(Debug, Clone)]
pub struct NatsRewardBackend {
    connection: NatsConnection,
}

impl NatsRewardBackend {
    /// Use an established connection.
    #[must_use]
    pub fn new(connection: NatsConnection) -> Self {
        Self { connection }
    }
}

impl RewardBackend for NatsRewardBackend {
    async fn login(&self, device_id: &str) -> Result<SessionTicket, RewardError> {
        let reply: Result<LoginReply, ApiError> = self
            .connection
            .request_json(REWARD_LOGIN, &login_request(device_id))
            .await?;
        let reply = reply?;
        debug!(newly_created = reply.newly_created, "reward login");
        Ok(reply.session_ticket)
    }

    async fn balance(&self, ticket: &SessionTicket) -> Result<i64, RewardError> {
        let request = InventoryRequest {
            session_ticket: ticket.clone(),
        };
        let reply: Result<InventoryReply, ApiError> = self
            .connection
            .request_json(REWARD_BALANCE, &request)
            .await?;
        Ok(reply?.gold())
    }

    async fn grant(&self, ticket: &SessionTicket) -> Result<i64, RewardError> {
        let reply: Result<ExecuteFunctionReply, ApiError> = self
            .connection
            .request_json(REWARD_GRANT, &grant_request(ticket))
            .await?;
        grant_outcome(reply?)
    }
}

// ── In memory ───────────────────────────────────────────────────────────────

/// Reward calls answered by a [`Ledger`] in this process.
#[derive(Debug, Default)]
pub struct InMemoryRewardBackend {
    ledger: Arc<Ledger>,
    outage: Mutex<Option<ApiError>>,
}

impl InMemoryRewardBackend {
    /// Answer from `ledger`.
    #[must_use]
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            outage: Mutex::new(None),
        }
    }

    /// The ledger behind this backend.
    #[must_use]
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Fail every call with `error` until cleared.
    pub fn set_outage(&self, error: Option<ApiError>) {
        *self.outage.lock() = error;
    }

    fn check_outage(&self) -> Result<(), RewardError> {
        match self.outage.lock().clone() {
            Some(err) => Err(RewardError::Api(err)),
            None => Ok(()),
        }
    }
}

impl RewardBackend for InMemoryRewardBackend {
    async fn login(&self, device_id: &str) -> Result<SessionTicket, RewardError> {
        self.check_outage()?;
        Ok(self.ledger.login(&login_request(device_id))?.session_ticket)
    }

    async fn balance(&self, ticket: &SessionTicket) -> Result<i64, RewardError> {
        self.check_outage()?;
        let request = InventoryRequest {
            session_ticket: ticket.clone(),
        };
        Ok(self.ledger.inventory(&request)?.gold())
    }

    async fn grant(&self, ticket: &SessionTicket) -> Result<i64, RewardError> {
        self.check_outage()?;
        grant_outcome(self.ledger.execute(&grant_request(ticket))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ScriptError;

    #[test]
    fn test_script_error_wins() {
        let reply = ExecuteFunctionReply {
            function_result: Some(serde_json::json!({ "newBalance": 3 })),
            error: Some(ScriptError {
                error: "JavascriptException".to_string(),
                message: "boom".to_string(),
            }),
        };
        assert!(matches!(
            grant_outcome(reply),
            Err(RewardError::Script { .. })
        ));
    }

    #[test]
    fn test_missing_new_balance() {
        let reply = ExecuteFunctionReply {
            function_result: Some(serde_json::json!({ "other": 1 })),
            error: None,
        };
        assert!(matches!(
            grant_outcome(reply),
            Err(RewardError::MissingBalance { .. })
        ));
        let reply = ExecuteFunctionReply::default();
        assert!(matches!(
            grant_outcome(reply),
            Err(RewardError::MissingBalance { .. })
        ));
    }

    #[tokio::test]
    async fn test_in_memory_flow() {
        let backend = InMemoryRewardBackend::new(Arc::new(Ledger::new(7)));
        let ticket = backend.login("device-a").await.unwrap();
        assert_eq!(backend.balance(&ticket).await.unwrap(), 0);
        assert_eq!(backend.grant(&ticket).await.unwrap(), 7);
        assert_eq!(backend.grant(&ticket).await.unwrap(), 14);
        assert_eq!(backend.balance(&ticket).await.unwrap(), 14);
    }

    #[tokio::test]
    async fn test_outage_fails_calls() {
        let backend = InMemoryRewardBackend::default();
        backend.set_outage(Some(ApiError::new("ServiceUnavailable", "down")));
        assert!(matches!(
            backend.login("device-a").await,
            Err(RewardError::Api(_))
        ));
        backend.set_outage(None);
        assert!(backend.login("device-a").await.is_ok());
    }
}
