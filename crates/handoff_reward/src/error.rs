//! Reward error types.

use handoff_net::NetError;

use crate::api::ApiError;

/// Errors raised by reward calls.
#[derive(Debug, thiserror::Error)]
pub enum RewardError {
    /// A call that needs a session was made before login succeeded.
    #[error("not logged in")]
    NotLoggedIn,

    /// No tokio runtime to run the call on.
    #[error("no async runtime available")]
    NoRuntime,

    /// The service refused the call.
    #[error("reward service error: {0}")]
    Api(ApiError),

    /// The server-side function threw.
    #[error("script error {kind}: {message}")]
    Script {
        /// Error kind.
        kind: String,
        /// Detail.
        message: String,
    },

    /// The function result lacks a usable new balance.
    #[error("function result has no integer {key}")]
    MissingBalance {
        /// The key that was looked up.
        key: &'static str,
    },

    /// The call was aborted before it finished.
    #[error("call cancelled")]
    Cancelled,

    /// Transport failure.
    #[error(transparent)]
    Net(#[from] NetError),
}

impl From<ApiError> for RewardError {
    fn from(err: ApiError) -> Self {
        Self::Api(err)
    }
}
