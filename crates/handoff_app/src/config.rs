//! Host configuration.

use std::time::Duration;

use handoff_core::OwnershipPolicy;
use handoff_reward::ledger::DEFAULT_GRANT;

/// Settings for one session host.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Session name; selects the `handoff.<session>.` subjects.
    pub session: String,
    /// NATS URL override. `None` falls back to `NATS_URL`, then the default.
    pub nats_url: Option<String>,
    /// How ownership requests are arbitrated.
    pub policy: OwnershipPolicy,
    /// Also answer `reward.*` requests from an in-memory ledger.
    pub serve_rewards: bool,
    /// Gold per grant when serving rewards.
    pub grant_amount: i64,
    /// Inbox pumps per second.
    pub pump_rate: f64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            session: "default".to_string(),
            nats_url: None,
            policy: OwnershipPolicy::default(),
            serve_rewards: false,
            grant_amount: DEFAULT_GRANT,
            pump_rate: 60.0,
        }
    }
}

impl HostConfig {
    #[must_use]
    pub fn new(session: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_nats_url(mut self, url: Option<String>) -> Self {
        self.nats_url = url;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: OwnershipPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_rewards(mut self, grant_amount: i64) -> Self {
        self.serve_rewards = true;
        self.grant_amount = grant_amount;
        self
    }

    #[must_use]
    pub fn with_pump_rate(mut self, pump_rate: f64) -> Self {
        self.pump_rate = pump_rate;
        self
    }

    /// Time between pumps. Non-positive rates fall back to 60 Hz.
    #[must_use]
    pub fn pump_interval(&self) -> Duration {
        let rate = if self.pump_rate > 0.0 { self.pump_rate } else { 60.0 };
        Duration::from_secs_f64(1.0 / rate)
    }
}
