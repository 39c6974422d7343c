//! In-memory account ledger.
//!
//! Backs [`crate::InMemoryRewardBackend`] and the NATS reward responder in
//! [`crate::server`]. Accounts are keyed by device id; sessions are random
//! tickets.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::api::{
    ApiError, CURRENCY, ExecuteFunctionReply, ExecuteFunctionRequest, GRANT_FUNCTION,
    InventoryReply, InventoryRequest, LoginReply, LoginRequest, ScriptError, SessionTicket,
};

/// Gold granted per collectible unless configured otherwise.
pub const DEFAULT_GRANT: i64 = 10;

#[derive(Debug, Default)]
struct Accounts {
    balances: HashMap<String, i64>,
    sessions: HashMap<SessionTicket, String>,
}

/// Accounts, sessions and the `grantGold` function.
#[derive(Debug)]
pub struct Ledger {
    accounts: Mutex<Accounts>,
    grant_amount: i64,
    script_failure: Mutex<Option<String>>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(DEFAULT_GRANT)
    }
}

impl Ledger {
    /// An empty ledger granting `grant_amount` gold per call.
    #[must_use]
    pub fn new(grant_amount: i64) -> Self {
        Self {
            accounts: Mutex::new(Accounts::default()),
            grant_amount,
            script_failure: Mutex::new(None),
        }
    }

    /// Make the grant function throw with `message` until cleared.
    pub fn set_script_failure(&self, message: Option<String>) {
        *self.script_failure.lock() = message;
    }

    /// The gold balance of a device's account.
    #[must_use]
    pub fn balance_of(&self, device_id: &str) -> Option<i64> {
        self.accounts.lock().balances.get(device_id).copied()
    }

    /// Log in.
    ///
    /// # Errors
    ///
    /// `AccountNotFound` if the account is missing and may not be created.
    pub fn login(&self, request: &LoginRequest) -> Result<LoginReply, ApiError> {
        let mut accounts = self.accounts.lock();
        let newly_created = !accounts.balances.contains_key(&request.custom_id);
        if newly_created {
            if !request.create_account {
                return Err(ApiError::new("AccountNotFound", "no account for this id"));
            }
            accounts.balances.insert(request.custom_id.clone(), 0);
            info!(device = %request.custom_id, "account created");
        }
        let ticket = SessionTicket(uuid::Uuid::new_v4().to_string());
        accounts
            .sessions
            .insert(ticket.clone(), request.custom_id.clone());
        debug!(device = %request.custom_id, "logged in");
        Ok(LoginReply {
            session_ticket: ticket,
            newly_created,
        })
    }

    /// The session's currencies.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` for an unknown ticket.
    pub fn inventory(&self, request: &InventoryRequest) -> Result<InventoryReply, ApiError> {
        let accounts = self.accounts.lock();
        let device = Self::device(&accounts, &request.session_ticket)?;
        let mut reply = InventoryReply::default();
        if let Some(balance) = accounts.balances.get(device) {
            reply.virtual_currency.insert(CURRENCY.to_string(), *balance);
        }
        Ok(reply)
    }

    /// Run a server-side function.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` for an unknown ticket. Failures inside the function
    /// are reported in the reply's `error`, not here.
    pub fn execute(&self, request: &ExecuteFunctionRequest) -> Result<ExecuteFunctionReply, ApiError> {
        let mut accounts = self.accounts.lock();
        let device = Self::device(&accounts, &request.session_ticket)?.to_string();

        if request.function_name != GRANT_FUNCTION {
            return Ok(ExecuteFunctionReply {
                function_result: None,
                error: Some(ScriptError {
                    error: "CloudScriptNotFound".to_string(),
                    message: format!("no function named {}", request.function_name),
                }),
            });
        }
        if let Some(message) = self.script_failure.lock().clone() {
            return Ok(ExecuteFunctionReply {
                function_result: None,
                error: Some(ScriptError {
                    error: "JavascriptException".to_string(),
                    message,
                }),
            });
        }

        let balance = accounts.balances.entry(device.clone()).or_insert(0);
        *balance += self.grant_amount;
        info!(device = %device, balance = *balance, "gold granted");
        Ok(ExecuteFunctionReply::granted(*balance))
    }

    fn device<'a>(accounts: &'a Accounts, ticket: &SessionTicket) -> Result<&'a str, ApiError> {
        accounts
            .sessions
            .get(ticket)
            .map(String::as_str)
            .ok_or_else(|| ApiError::new("NotAuthenticated", "unknown session ticket"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login(ledger: &Ledger, device: &str) -> SessionTicket {
        ledger
            .login(&LoginRequest {
                custom_id: device.to_string(),
                create_account: true,
            })
            .unwrap()
            .session_ticket
    }

    fn grant(ticket: &SessionTicket) -> ExecuteFunctionRequest {
        ExecuteFunctionRequest {
            session_ticket: ticket.clone(),
            function_name: GRANT_FUNCTION.to_string(),
            generate_play_stream_event: true,
        }
    }

    #[test]
    fn test_login_creates_once() {
        let ledger = Ledger::default();
        let first = ledger
            .login(&LoginRequest {
                custom_id: "dev".to_string(),
                create_account: true,
            })
            .unwrap();
        let second = ledger
            .login(&LoginRequest {
                custom_id: "dev".to_string(),
                create_account: true,
            })
            .unwrap();
        assert!(first.newly_created);
        assert!(!second.newly_created);
        assert_ne!(first.session_ticket, second.session_ticket);
    }

    #[test]
    fn test_login_without_create_fails() {
        let ledger = Ledger::default();
        let err = ledger
            .login(&LoginRequest {
                custom_id: "ghost".to_string(),
                create_account: false,
            })
            .unwrap_err();
        assert_eq!(err.code, "AccountNotFound");
    }

    #[test]
    fn test_grant_accumulates() {
        let ledger = Ledger::new(5);
        let ticket = login(&ledger, "dev");
        ledger.execute(&grant(&ticket)).unwrap();
        let reply = ledger.execute(&grant(&ticket)).unwrap();
        assert_eq!(reply, ExecuteFunctionReply::granted(10));
        let inventory = ledger
            .inventory(&InventoryRequest {
                session_ticket: ticket,
            })
            .unwrap();
        assert_eq!(inventory.gold(), 10);
    }

    #[test]
    fn test_script_failure_leaves_balance() {
        let ledger = Ledger::new(5);
        let ticket = login(&ledger, "dev");
        ledger.set_script_failure(Some("boom".to_string()));
        let reply = ledger.execute(&grant(&ticket)).unwrap();
        assert!(reply.error.is_some());
        assert_eq!(ledger.balance_of("dev"), Some(0));
    }

    #[test]
    fn test_unknown_ticket_is_rejected() {
        let ledger = Ledger::default();
        let err = ledger
            .execute(&grant(&SessionTicket("nope".to_string())))
            .unwrap_err();
        assert_eq!(err.code, "NotAuthenticated");
    }
}
