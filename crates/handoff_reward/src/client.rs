//! The tick-side reward client.
//!
//! Each call is spawned onto the ambient tokio runtime and its result is
//! sent back over a channel. [`RewardClient::poll`] drains that channel once
//! per tick, so reward traffic never blocks simulation. Failures are logged
//! and filed in the [`ErrorReport`]; nothing is retried.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, error, info};

use crate::api::SessionTicket;
use crate::backend::RewardBackend;
use crate::error::RewardError;

/// Which call a result or failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardOp {
    Login,
    Balance,
    Grant,
}

impl std::fmt::Display for RewardOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Login => "login",
            Self::Balance => "balance",
            Self::Grant => "grant",
        })
    }
}

/// The player's gold as shown on screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceDisplay {
    balance: Option<i64>,
}

impl BalanceDisplay {
    /// The last balance received, if any.
    #[must_use]
    pub fn balance(&self) -> Option<i64> {
        self.balance
    }

    pub fn set(&mut self, balance: i64) {
        self.balance = Some(balance);
    }

    /// `"Gold: N"`, with 0 until a balance arrives.
    #[must_use]
    pub fn text(&self) -> String {
        format!("Gold: {}", self.balance.unwrap_or(0))
    }
}

/// One failed reward call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedError {
    pub op: RewardOp,
    pub message: String,
}

/// Failed reward calls, oldest first.
#[derive(Debug, Clone, Default)]
pub struct ErrorReport {
    entries: Vec<ReportedError>,
}

impl ErrorReport {
    pub fn push(&mut self, op: RewardOp, error: &RewardError) {
        self.entries.push(ReportedError {
            op,
            message: error.to_string(),
        });
    }

    #[must_use]
    pub fn entries(&self) -> &[ReportedError] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return everything reported so far.
    pub fn take(&mut self) -> Vec<ReportedError> {
        std::mem::take(&mut self.entries)
    }
}

enum Outcome {
    Session(SessionTicket),
    Balance(i64),
}

struct Completion {
    op: RewardOp,
    outcome: Result<Outcome, RewardError>,
}

/// Issues reward calls and folds their results into local state.
pub struct RewardClient<B: RewardBackend> {
    backend: Arc<B>,
    device_id: String,
    session: Option<SessionTicket>,
    results_tx: mpsc::UnboundedSender<Completion>,
    results_rx: mpsc::UnboundedReceiver<Completion>,
    in_flight: Vec<AbortHandle>,
    display: BalanceDisplay,
    errors: ErrorReport,
}

impl<B: RewardBackend> RewardClient<B> {
    /// A logged-out client for `device_id`.
    pub fn new(backend: Arc<B>, device_id: impl Into<String>) -> Self {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            device_id: device_id.into(),
            session: None,
            results_tx,
            results_rx,
            in_flight: Vec::new(),
            display: BalanceDisplay::default(),
            errors: ErrorReport::default(),
        }
    }

    /// A client with a freshly generated device id.
    pub fn with_random_device(backend: Arc<B>) -> Self {
        Self::new(backend, uuid::Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    #[must_use]
    pub fn session(&self) -> Option<&SessionTicket> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.session.is_some()
    }

    #[must_use]
    pub fn display(&self) -> &BalanceDisplay {
        &self.display
    }

    #[must_use]
    pub fn errors(&self) -> &ErrorReport {
        &self.errors
    }

    pub fn errors_mut(&mut self) -> &mut ErrorReport {
        &mut self.errors
    }

    /// Calls spawned and not yet finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.iter().filter(|h| !h.is_finished()).count()
    }

    /// Log in with the device id. The balance is fetched once it succeeds.
    ///
    /// # Errors
    ///
    /// [`RewardError::NoRuntime`] outside a tokio runtime.
    pub fn login(&mut self) -> Result<(), RewardError> {
        let backend = Arc::clone(&self.backend);
        let device_id = self.device_id.clone();
        self.spawn(RewardOp::Login, async move {
            backend.login(&device_id).await.map(Outcome::Session)
        })
    }

    /// Fetch the current balance.
    ///
    /// # Errors
    ///
    /// [`RewardError::NotLoggedIn`] before login has succeeded,
    /// [`RewardError::NoRuntime`] outside a tokio runtime.
    pub fn refresh_balance(&mut self) -> Result<(), RewardError> {
        let ticket = self.require_session(RewardOp::Balance)?;
        let backend = Arc::clone(&self.backend);
        self.spawn(RewardOp::Balance, async move {
            backend.balance(&ticket).await.map(Outcome::Balance)
        })
    }

    /// Ask the service for gold.
    ///
    /// # Errors
    ///
    /// [`RewardError::NotLoggedIn`] before login has succeeded,
    /// [`RewardError::NoRuntime`] outside a tokio runtime.
    pub fn grant_reward(&mut self) -> Result<(), RewardError> {
        let ticket = self.require_session(RewardOp::Grant)?;
        let backend = Arc::clone(&self.backend);
        self.spawn(RewardOp::Grant, async move {
            backend.grant(&ticket).await.map(Outcome::Balance)
        })
    }

    /// Fold in every finished call. Returns how many were handled.
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(Completion { op, outcome }) = self.results_rx.try_recv() {
            handled += 1;
            match outcome {
                Ok(Outcome::Session(ticket)) => {
                    info!(device = %self.device_id, "logged in to reward service");
                    self.session = Some(ticket);
                    if let Err(err) = self.refresh_balance() {
                        debug!(error = %err, "balance fetch after login not started");
                    }
                }
                Ok(Outcome::Balance(balance)) => {
                    debug!(%op, balance, "balance updated");
                    self.display.set(balance);
                }
                Err(err) => self.report(op, &err),
            }
        }
        self.in_flight.retain(|h| !h.is_finished());
        handled
    }

    /// Abort every call still running. Their results are never delivered.
    pub fn cancel_all(&mut self) -> usize {
        let aborted = self.in_flight.len();
        for handle in self.in_flight.drain(..) {
            handle.abort();
        }
        aborted
    }

    fn require_session(&mut self, op: RewardOp) -> Result<SessionTicket, RewardError> {
        match &self.session {
            Some(ticket) => Ok(ticket.clone()),
            None => {
                let err = RewardError::NotLoggedIn;
                self.report(op, &err);
                Err(err)
            }
        }
    }

    fn spawn<F>(&mut self, op: RewardOp, call: F) -> Result<(), RewardError>
    where
        F: Future<Output = Result<Outcome, RewardError>> + Send + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            let err = RewardError::NoRuntime;
            self.report(op, &err);
            return Err(err);
        };
        let results = self.results_tx.clone();
        let task = runtime.spawn(async move {
            let outcome = call.await;
            // The client may be gone by now.
            let _ = results.send(Completion { op, outcome });
        });
        self.in_flight.retain(|h| !h.is_finished());
        self.in_flight.push(task.abort_handle());
        debug!(%op, "reward call started");
        Ok(())
    }

    fn report(&mut self, op: RewardOp, err: &RewardError) {
        error!(%op, error = %err, "reward call failed");
        self.errors.push(op, err);
    }
}

impl<B: RewardBackend> Drop for RewardClient<B> {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::backend::InMemoryRewardBackend;
    use crate::ledger::Ledger;

    fn client(grant: i64) -> RewardClient<InMemoryRewardBackend> {
        let backend = InMemoryRewardBackend::new(Arc::new(Ledger::new(grant)));
        RewardClient::new(Arc::new(backend), "device-1")
    }

    async fn settle<B: RewardBackend>(client: &mut RewardClient<B>) {
        for _ in 0..16 {
            tokio::task::yield_now().await;
            client.poll();
        }
    }

    #[test]
    fn test_display_text() {
        let mut display = BalanceDisplay::default();
        assert_eq!(display.text(), "Gold: 0");
        display.set(25);
        assert_eq!(display.text(), "Gold: 25");
    }

    #[test]
    fn test_no_runtime_is_reported() {
        let mut client = client(10);
        assert!(matches!(client.login(), Err(RewardError::NoRuntime)));
        assert_eq!(client.errors().entries()[0].op, RewardOp::Login);
    }

    #[tokio::test]
    async fn test_login_fetches_balance() {
        let mut client = client(10);
        client.login().unwrap();
        settle(&mut client).await;
        assert!(client.is_logged_in());
        assert_eq!(client.display().balance(), Some(0));
        assert_eq!(client.in_flight(), 0);
        assert!(client.errors().is_empty());
    }

    #[tokio::test]
    async fn test_grant_requires_login() {
        let mut client = client(10);
        assert!(matches!(
            client.grant_reward(),
            Err(RewardError::NotLoggedIn)
        ));
        assert_eq!(client.errors().len(), 1);
        assert_eq!(client.errors().entries()[0].op, RewardOp::Grant);
    }

    #[tokio::test]
    async fn test_grant_updates_display() {
        let mut client = client(10);
        client.login().unwrap();
        settle(&mut client).await;
        client.grant_reward().unwrap();
        client.grant_reward().unwrap();
        settle(&mut client).await;
        assert_eq!(client.display().text(), "Gold: 20");
    }

    #[tokio::test]
    async fn test_failed_login_is_reported() {
        let backend = Arc::new(InMemoryRewardBackend::default());
        backend.set_outage(Some(ApiError::new("ServiceUnavailable", "down")));
        let mut client = RewardClient::new(Arc::clone(&backend), "device-1");
        client.login().unwrap();
        settle(&mut client).await;
        assert!(!client.is_logged_in());
        let reported = client.errors_mut().take();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].op, RewardOp::Login);
        assert!(reported[0].message.contains("ServiceUnavailable"));
        assert!(client.errors().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_calls_never_land() {
        let mut client = client(10);
        client.login().unwrap();
        assert_eq!(client.cancel_all(), 1);
        settle(&mut client).await;
        assert!(!client.is_logged_in());
        assert!(client.errors().is_empty());
    }
}
