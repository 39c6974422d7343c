//! The broadcast channel.
//!
//! [`Broadcast`] is the endpoint a participant (or the arbiter) uses: publish
//! a payload to everyone, and drain whatever arrived since the last tick.
//! [`LocalBus`] is the in-process channel used by tests, demos and
//! single-process sessions; [`crate::nats::NatsEndpoint`] is the networked
//! one.
//!
//! Delivery is reliable and ordered per sender. Buffered payloads are kept in
//! a [`BufferedLog`] and replayed to participants that join later.

use std::collections::BTreeMap;
use std::sync::Arc;

use handoff_ids::ParticipantId;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace};

use crate::error::NetError;
use crate::event_log::BufferedLog;
use crate::messages::{Envelope, Payload};

/// A participant's endpoint on the broadcast channel.
///
/// Sends are fire-and-forget. Received envelopes queue up until the next
/// [`Broadcast::drain`], which the owner calls at the start of its tick.
pub trait Broadcast {
    /// The participant this endpoint belongs to.
    fn participant(&self) -> ParticipantId;

    /// Publish a payload to every participant.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] if the channel is gone or encoding fails.
    fn publish(&mut self, payload: Payload) -> Result<(), NetError>;

    /// Take every envelope that arrived since the last call.
    fn drain(&mut self) -> Vec<Envelope>;
}

/// Stamps outgoing payloads with the sender and its next sequence number.
#[derive(Debug)]
pub struct Sequencer {
    sender: ParticipantId,
    next_seq: u64,
}

impl Sequencer {
    /// Create a sequencer for `sender`. The first envelope gets sequence 1.
    #[must_use]
    pub fn new(sender: ParticipantId) -> Self {
        Self {
            sender,
            next_seq: 1,
        }
    }

    /// Wrap `payload` in the next envelope.
    pub fn stamp(&mut self, payload: Payload) -> Envelope {
        let seq = self.next_seq;
        self.next_seq += 1;
        Envelope {
            sender: self.sender,
            seq,
            payload,
        }
    }
}

#[derive(Debug, Default)]
struct Hub {
    inboxes: BTreeMap<ParticipantId, UnboundedSender<Envelope>>,
    log: BufferedLog,
}

impl Hub {
    fn deliver(&mut self, envelope: &Envelope) {
        self.log.record(envelope);

        let echo = !matches!(envelope.payload, Payload::Snapshot { .. });
        let mut gone = Vec::new();
        for (participant, inbox) in &self.inboxes {
            if *participant == envelope.sender && !echo {
                continue;
            }
            if inbox.send(envelope.clone()).is_err() {
                gone.push(*participant);
            }
        }
        for participant in gone {
            debug!(%participant, "dropping closed inbox");
            self.inboxes.remove(&participant);
        }
    }
}

/// In-process broadcast channel.
///
/// Cloning the bus yields another handle to the same channel. Fan-out happens
/// under a single lock, so every receiver sees one sender's messages in the
/// order they were sent.
#[derive(Debug, Clone, Default)]
pub struct LocalBus {
    hub: Arc<Mutex<Hub>>,
}

impl LocalBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `participant` to the bus.
    ///
    /// The new endpoint's inbox is pre-filled with the buffered log, so a late
    /// joiner sees the latest hold/release/ownership state of every object
    /// before anything sent after it joined.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::AlreadyJoined`] if the participant is attached.
    pub fn join(&self, participant: ParticipantId) -> Result<LocalEndpoint, NetError> {
        let mut hub = self.hub.lock();
        if hub.inboxes.contains_key(&participant) {
            return Err(NetError::AlreadyJoined(participant));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let replay = hub.log.replay();
        debug!(%participant, replayed = replay.len(), "participant joined local bus");
        for envelope in replay {
            // The receiver is alive: we hold it.
            let _ = tx.send(envelope);
        }
        hub.inboxes.insert(participant, tx);

        Ok(LocalEndpoint {
            sequencer: Sequencer::new(participant),
            participant,
            bus: self.clone(),
            inbox: rx,
        })
    }

    /// Detach `participant`. Its pending messages are discarded.
    pub fn leave(&self, participant: ParticipantId) {
        self.hub.lock().inboxes.remove(&participant);
    }

    /// Number of attached participants.
    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.hub.lock().inboxes.len()
    }

    /// Number of buffered log slots.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.hub.lock().log.len()
    }

    fn deliver(&self, envelope: &Envelope) {
        self.hub.lock().deliver(envelope);
    }
}

/// A participant's handle on a [`LocalBus`].
#[derive(Debug)]
pub struct LocalEndpoint {
    participant: ParticipantId,
    sequencer: Sequencer,
    bus: LocalBus,
    inbox: UnboundedReceiver<Envelope>,
}

impl Broadcast for LocalEndpoint {
    fn participant(&self) -> ParticipantId {
        self.participant
    }

    fn publish(&mut self, payload: Payload) -> Result<(), NetError> {
        let envelope = self.sequencer.stamp(payload);
        trace!(
            sender = %envelope.sender,
            seq = envelope.seq,
            kind = envelope.payload.kind_name(),
            "publish"
        );
        self.bus.deliver(&envelope);
        Ok(())
    }

    fn drain(&mut self) -> Vec<Envelope> {
        let mut received = Vec::new();
        while let Ok(envelope) = self.inbox.try_recv() {
            received.push(envelope);
        }
        received
    }
}

impl Drop for LocalEndpoint {
    fn drop(&mut self) {
        self.bus.leave(self.participant);
    }
}

#[cfg(test)]
mod tests {
    use handoff_ids::ObjectId;
    use handoff_math::{Pose, Vec3};

    use super::*;
    use crate::messages::{ObjectRpc, StateSnapshot};

    fn held(holder: u32) -> Payload {
        Payload::Rpc {
            object: ObjectId(1),
            rpc: ObjectRpc::SetHeldState {
                holder: ParticipantId(holder),
            },
        }
    }

    #[test]
    fn test_sequencer_numbers_from_one() {
        let mut seq = Sequencer::new(ParticipantId(2));
        assert_eq!(seq.stamp(held(2)).seq, 1);
        assert_eq!(seq.stamp(held(2)).seq, 2);
    }

    #[test]
    fn test_publish_reaches_everyone_including_sender() {
        let bus = LocalBus::new();
        let mut a = bus.join(ParticipantId(1)).unwrap();
        let mut b = bus.join(ParticipantId(2)).unwrap();

        a.publish(held(1)).unwrap();

        let at_a = a.drain();
        let at_b = b.drain();
        assert_eq!(at_a.len(), 1);
        assert_eq!(at_b.len(), 1);
        assert_eq!(at_b[0].sender, ParticipantId(1));
        assert!(a.drain().is_empty());
    }

    #[test]
    fn test_snapshots_are_not_echoed() {
        let bus = LocalBus::new();
        let mut a = bus.join(ParticipantId(1)).unwrap();
        let mut b = bus.join(ParticipantId(2)).unwrap();

        a.publish(Payload::Snapshot {
            object: ObjectId(1),
            snapshot: StateSnapshot {
                pose: Pose::IDENTITY,
                velocity: Vec3::ZERO,
                tick: 1,
            },
        })
        .unwrap();

        assert!(a.drain().is_empty());
        assert_eq!(b.drain().len(), 1);
    }

    #[test]
    fn test_per_sender_order_is_kept() {
        let bus = LocalBus::new();
        let mut a = bus.join(ParticipantId(1)).unwrap();
        let mut b = bus.join(ParticipantId(2)).unwrap();
        for _ in 0..5 {
            a.publish(held(1)).unwrap();
        }
        let seqs: Vec<u64> = b.drain().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_late_joiner_gets_buffered_state() {
        let bus = LocalBus::new();
        let mut a = bus.join(ParticipantId(1)).unwrap();
        a.publish(held(1)).unwrap();
        a.publish(held(1)).unwrap();

        let mut late = bus.join(ParticipantId(3)).unwrap();
        let replayed = late.drain();
        assert_eq!(replayed.len(), 1, "only the last hold is buffered");
        assert_eq!(replayed[0].seq, 2);
    }

    #[test]
    fn test_double_join_is_rejected() {
        let bus = LocalBus::new();
        let _a = bus.join(ParticipantId(1)).unwrap();
        assert!(matches!(
            bus.join(ParticipantId(1)),
            Err(NetError::AlreadyJoined(_))
        ));
    }

    #[test]
    fn test_dropped_endpoint_leaves() {
        let bus = LocalBus::new();
        let a = bus.join(ParticipantId(1)).unwrap();
        assert_eq!(bus.participant_count(), 1);
        drop(a);
        assert_eq!(bus.participant_count(), 0);
    }
}
