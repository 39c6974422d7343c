//! Request/reply types of the reward service.
//!
//! Every reply travels as a `Result<T, ApiError>`, serialised as JSON
//! (`{"Ok": ...}` or `{"Err": ...}`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The virtual currency granted by collectibles.
pub const CURRENCY: &str = "GD";

/// The server-side function that grants gold.
pub const GRANT_FUNCTION: &str = "grantGold";

/// Key of the new balance in the grant function's result.
pub const NEW_BALANCE_KEY: &str = "newBalance";

/// An authenticated session with the reward service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionTicket(pub String);

impl std::fmt::Display for SessionTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A service-side failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Machine-readable code, e.g. `"AccountNotFound"`.
    pub code: String,
    /// Human-readable detail.
    pub message: String,
}

impl ApiError {
    /// Build an error from a code and message.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Log in with a device-bound custom id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// The device id.
    pub custom_id: String,
    /// Create the account if it does not exist.
    pub create_account: bool,
}

/// A successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginReply {
    /// Ticket for subsequent calls.
    pub session_ticket: SessionTicket,
    /// The account was created by this login.
    pub newly_created: bool,
}

/// Ask for the account's virtual currencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRequest {
    /// The caller's session.
    pub session_ticket: SessionTicket,
}

/// The account's virtual currencies.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReply {
    /// Balance per currency code.
    pub virtual_currency: HashMap<String, i64>,
}

impl InventoryReply {
    /// The gold balance; 0 when the currency is absent.
    #[must_use]
    pub fn gold(&self) -> i64 {
        self.virtual_currency.get(CURRENCY).copied().unwrap_or(0)
    }
}

/// Run a server-side function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteFunctionRequest {
    /// The caller's session.
    pub session_ticket: SessionTicket,
    /// The function to run.
    pub function_name: String,
    /// Ask the service to emit an analytics event.
    pub generate_play_stream_event: bool,
}

/// An error raised by the function itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptError {
    /// Error kind, e.g. `"JavascriptException"`.
    pub error: String,
    /// Detail.
    pub message: String,
}

/// The outcome of a function run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteFunctionReply {
    /// What the function returned.
    pub function_result: Option<serde_json::Value>,
    /// Set when the function threw.
    pub error: Option<ScriptError>,
}

impl ExecuteFunctionReply {
    /// A successful grant reporting `balance`.
    #[must_use]
    pub fn granted(balance: i64) -> Self {
        Self {
            function_result: Some(serde_json::json!({ NEW_BALANCE_KEY: balance })),
            error: None,
        }
    }
}
