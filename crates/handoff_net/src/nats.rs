//! A [`Broadcast`] endpoint over NATS.
//!
//! Core NATS does not buffer, so buffered delivery is provided by the session
//! host: it keeps the [`crate::BufferedLog`] and answers each `Join` with a
//! [`Payload::Replay`] batch on the joiner's replay subject. Until that batch
//! arrives a participant endpoint holds live traffic back in a [`JoinGate`],
//! so replayed state can never overwrite newer live state.

use std::time::Duration;

use futures::StreamExt;
use handoff_ids::ParticipantId;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::{Broadcast, Sequencer};
use crate::connection::NatsConnection;
use crate::error::NetError;
use crate::messages::{Envelope, Payload};
use crate::subjects;

/// How long a participant waits for the host's replay before delivering live
/// traffic anyway.
pub const REPLAY_TIMEOUT: Duration = Duration::from_secs(3);

/// Which side of the session an endpoint serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRole {
    /// A player: receives RPCs, ownership outcomes, snapshots and its replay.
    Participant,
    /// The session host: receives RPCs, ownership requests and outcomes, joins.
    Host,
}

impl EndpointRole {
    /// The subjects this role subscribes to.
    #[must_use]
    pub fn subjects(self, session: &str, participant: ParticipantId) -> Vec<String> {
        match self {
            Self::Participant => vec![
                subjects::rpc(session),
                subjects::ownership_event(session),
                subjects::snapshot(session),
                subjects::replay(session, participant),
            ],
            Self::Host => vec![
                subjects::rpc(session),
                subjects::ownership_request(session),
                subjects::ownership_event(session),
                subjects::join(session),
            ],
        }
    }
}

/// Holds live envelopes back until the host's replay batch arrives.
#[derive(Debug, Default)]
pub struct JoinGate {
    stash: Vec<Envelope>,
    open: bool,
}

impl JoinGate {
    /// A gate that stashes until a replay arrives.
    #[must_use]
    pub fn closed() -> Self {
        Self::default()
    }

    /// A gate that lets everything through.
    #[must_use]
    pub fn opened() -> Self {
        Self {
            stash: Vec::new(),
            open: true,
        }
    }

    /// Returns `true` once the replay has been delivered.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Feed one received envelope; returns what may be delivered now.
    ///
    /// On the replay for `me`, replayed envelopes that were also received live
    /// are dropped from the replay (the live copy keeps its place in the
    /// stream), then the rest of the replay is delivered ahead of the stash.
    pub fn admit(&mut self, envelope: Envelope, me: ParticipantId) -> Vec<Envelope> {
        match envelope.payload {
            Payload::Replay {
                participant,
                envelopes,
            } => {
                if participant != me || self.open {
                    return Vec::new();
                }
                self.open = true;
                let stash = std::mem::take(&mut self.stash);
                let mut out: Vec<Envelope> = envelopes
                    .into_iter()
                    .filter(|r| !stash.iter().any(|s| s.sender == r.sender && s.seq == r.seq))
                    .collect();
                out.extend(stash);
                out
            }
            _ if self.open => vec![envelope],
            _ => {
                self.stash.push(envelope);
                Vec::new()
            }
        }
    }

    /// Give up waiting for a replay and release the stash.
    pub fn force_open(&mut self) -> Vec<Envelope> {
        self.open = true;
        std::mem::take(&mut self.stash)
    }
}

/// A NATS-backed endpoint.
///
/// Publishing queues the envelope for a background writer task; a background
/// reader task decodes incoming envelopes into the inbox drained by
/// [`Broadcast::drain`]. Both tasks stop when the endpoint is dropped.
#[derive(Debug)]
pub struct NatsEndpoint {
    participant: ParticipantId,
    session: String,
    sequencer: Sequencer,
    outgoing: UnboundedSender<(String, Envelope)>,
    inbox: UnboundedReceiver<Envelope>,
    tasks: Vec<JoinHandle<()>>,
}

impl NatsEndpoint {
    /// Subscribe to the role's subjects and start the background tasks.
    /// Participants announce themselves with a `Join` once subscribed.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Subscribe`] if a subscription fails.
    pub async fn open(
        conn: NatsConnection,
        session: impl Into<String>,
        participant: ParticipantId,
        role: EndpointRole,
    ) -> Result<Self, NetError> {
        let session = session.into();

        let mut subscribers = Vec::new();
        for subject in role.subjects(&session, participant) {
            subscribers.push(conn.subscribe(&subject).await?);
            debug!(subject, "subscribed");
        }

        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let gate = match role {
            EndpointRole::Participant => JoinGate::closed(),
            EndpointRole::Host => JoinGate::opened(),
        };
        let reader = tokio::spawn(read_loop(subscribers, gate, participant, inbox_tx));

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_loop(conn, outgoing_rx));

        info!(%participant, session, ?role, "NATS endpoint open");

        let mut endpoint = Self {
            participant,
            session,
            sequencer: Sequencer::new(participant),
            outgoing,
            inbox,
            tasks: vec![reader, writer],
        };
        if role == EndpointRole::Participant {
            endpoint.publish(Payload::Join { participant })?;
        }
        Ok(endpoint)
    }

    /// The session name.
    #[must_use]
    pub fn session(&self) -> &str {
        &self.session
    }
}

impl Broadcast for NatsEndpoint {
    fn participant(&self) -> ParticipantId {
        self.participant
    }

    fn publish(&mut self, payload: Payload) -> Result<(), NetError> {
        let subject = subjects::for_payload(&self.session, &payload);
        let envelope = self.sequencer.stamp(payload);
        self.outgoing
            .send((subject, envelope))
            .map_err(|_| NetError::ChannelClosed)
    }

    fn drain(&mut self) -> Vec<Envelope> {
        let mut received = Vec::new();
        while let Ok(envelope) = self.inbox.try_recv() {
            received.push(envelope);
        }
        received
    }
}

impl Drop for NatsEndpoint {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn read_loop(
    subscribers: Vec<async_nats::Subscriber>,
    mut gate: JoinGate,
    participant: ParticipantId,
    inbox: UnboundedSender<Envelope>,
) {
    let mut merged = futures::stream::select_all(subscribers);
    let deadline = tokio::time::sleep(REPLAY_TIMEOUT);
    tokio::pin!(deadline);

    loop {
        let ready = tokio::select! {
            message = merged.next() => {
                let Some(message) = message else { break };
                match crate::codec::decode_envelope(message.payload.as_ref()) {
                    Ok(envelope) => gate.admit(envelope, participant),
                    Err(err) => {
                        warn!(subject = %message.subject, %err, "dropping undecodable envelope");
                        Vec::new()
                    }
                }
            }
            () = &mut deadline, if !gate.is_open() => {
                warn!(%participant, "no replay from session host; delivering live traffic");
                gate.force_open()
            }
        };
        for envelope in ready {
            if inbox.send(envelope).is_err() {
                return;
            }
        }
    }
}

async fn write_loop(conn: NatsConnection, mut outgoing: UnboundedReceiver<(String, Envelope)>) {
    while let Some((subject, envelope)) = outgoing.recv().await {
        if let Err(err) = conn.publish(&subject, &envelope).await {
            warn!(subject, %err, "publish failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use handoff_ids::ObjectId;

    use super::*;
    use crate::messages::ObjectRpc;

    fn held(sender: u32, seq: u64) -> Envelope {
        Envelope {
            sender: ParticipantId(sender),
            seq,
            payload: Payload::Rpc {
                object: ObjectId(1),
                rpc: ObjectRpc::SetHeldState {
                    holder: ParticipantId(sender),
                },
            },
        }
    }

    fn replay_for(participant: u32, envelopes: Vec<Envelope>) -> Envelope {
        Envelope {
            sender: ParticipantId::ARBITER,
            seq: 1,
            payload: Payload::Replay {
                participant: ParticipantId(participant),
                envelopes,
            },
        }
    }

    #[test]
    fn test_closed_gate_stashes_live_traffic() {
        let mut gate = JoinGate::closed();
        assert!(gate.admit(held(1, 4), ParticipantId(9)).is_empty());
        assert!(!gate.is_open());
    }

    #[test]
    fn test_replay_goes_first_and_skips_live_duplicates() {
        let me = ParticipantId(9);
        let mut gate = JoinGate::closed();
        gate.admit(held(2, 7), me);

        let out = gate.admit(replay_for(9, vec![held(1, 3), held(2, 7)]), me);
        assert_eq!(out, vec![held(1, 3), held(2, 7)]);
        assert!(gate.is_open());

        // After the replay, live traffic flows straight through.
        assert_eq!(gate.admit(held(2, 8), me), vec![held(2, 8)]);
    }

    #[test]
    fn test_replay_for_someone_else_is_ignored() {
        let mut gate = JoinGate::closed();
        assert!(gate.admit(replay_for(4, vec![held(1, 1)]), ParticipantId(9)).is_empty());
        assert!(!gate.is_open());
    }

    #[test]
    fn test_force_open_releases_stash() {
        let mut gate = JoinGate::closed();
        gate.admit(held(1, 1), ParticipantId(9));
        assert_eq!(gate.force_open(), vec![held(1, 1)]);
        assert!(gate.is_open());
    }

    #[test]
    fn test_roles_subscribe_to_different_subjects() {
        let p = EndpointRole::Participant.subjects("s", ParticipantId(2));
        let h = EndpointRole::Host.subjects("s", ParticipantId::ARBITER);
        assert!(p.contains(&"handoff.s.replay.2".to_string()));
        assert!(!p.contains(&"handoff.s.ownership.request".to_string()));
        assert!(h.contains(&"handoff.s.join".to_string()));
    }
}
