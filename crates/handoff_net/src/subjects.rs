//! NATS subject hierarchy.
//!
//! Every session lives under `handoff.<session>.`; the reward backend is
//! session-independent and lives under `reward.`.

use handoff_ids::ParticipantId;

use crate::messages::Payload;

/// Root prefix for all handoff NATS subjects.
pub const PREFIX: &str = "handoff";

// ── Reward backend ──────────────────────────────────────────────────────────

/// Login request/reply.
pub const REWARD_LOGIN: &str = "reward.login";

/// Balance request/reply.
pub const REWARD_BALANCE: &str = "reward.balance";

/// Grant-reward request/reply.
pub const REWARD_GRANT: &str = "reward.grant";

/// Every reward subject, for the responder.
pub const REWARD_ALL: &str = "reward.>";

// ── Session subjects ────────────────────────────────────────────────────────

/// Object RPCs. Participants → *.
///
/// `handoff.<session>.rpc`
#[must_use]
pub fn rpc(session: &str) -> String {
    format!("{PREFIX}.{session}.rpc")
}

/// Ownership requests. Participants → arbiter.
///
/// `handoff.<session>.ownership.request`
#[must_use]
pub fn ownership_request(session: &str) -> String {
    format!("{PREFIX}.{session}.ownership.request")
}

/// Ownership outcomes. Arbiter → *.
///
/// `handoff.<session>.ownership.event`
#[must_use]
pub fn ownership_event(session: &str) -> String {
    format!("{PREFIX}.{session}.ownership.event")
}

/// Replication snapshots. Owner → *.
///
/// `handoff.<session>.snapshot`
#[must_use]
pub fn snapshot(session: &str) -> String {
    format!("{PREFIX}.{session}.snapshot")
}

/// Join announcements. Participants → host.
///
/// `handoff.<session>.join`
#[must_use]
pub fn join(session: &str) -> String {
    format!("{PREFIX}.{session}.join")
}

/// Buffered-log replay for one late joiner. Host → participant.
///
/// `handoff.<session>.replay.<participant>`
#[must_use]
pub fn replay(session: &str, participant: ParticipantId) -> String {
    format!("{PREFIX}.{session}.replay.{}", participant.id())
}

/// The subject a payload is published on.
#[must_use]
pub fn for_payload(session: &str, payload: &Payload) -> String {
    match payload {
        Payload::Rpc { .. } => rpc(session),
        Payload::OwnershipRequest { .. } => ownership_request(session),
        Payload::Ownership { .. } => ownership_event(session),
        Payload::Snapshot { .. } => snapshot(session),
        Payload::Join { .. } => join(session),
        Payload::Replay { participant, .. } => replay(session, *participant),
    }
}

#[cfg(test)]
mod tests {
    use handoff_ids::ObjectId;

    use super::*;
    use crate::messages::{ObjectRpc, RequestId};

    #[test]
    fn test_session_subjects() {
        assert_eq!(rpc("lobby"), "handoff.lobby.rpc");
        assert_eq!(ownership_event("lobby"), "handoff.lobby.ownership.event");
        assert_eq!(replay("lobby", ParticipantId(4)), "handoff.lobby.replay.4");
    }

    #[test]
    fn test_payload_routing() {
        let held = Payload::Rpc {
            object: ObjectId(1),
            rpc: ObjectRpc::SetHeldState {
                holder: ParticipantId(1),
            },
        };
        assert_eq!(for_payload("s", &held), "handoff.s.rpc");
        let request = Payload::OwnershipRequest {
            object: ObjectId(1),
            requester: ParticipantId(1),
            request: RequestId(1),
        };
        assert_eq!(for_payload("s", &request), "handoff.s.ownership.request");
    }
}
