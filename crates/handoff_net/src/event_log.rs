//! Buffered delivery for late joiners.
//!
//! The channel keeps, per object, only the most recent message of each
//! [`LogKind`]. A participant that joins late is replayed those messages in
//! the order they were originally sent, which reproduces the final state of
//! every object without a global message order.

use std::collections::HashMap;

use handoff_ids::ObjectId;

use crate::messages::{Envelope, ObjectRpc, OwnershipEvent, Payload};

/// The buffered message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogKind {
    /// The last `SetHeldState`.
    Held,
    /// The last `Release`.
    Release,
    /// The last ownership transfer.
    Ownership,
}

impl LogKind {
    /// The log slot a payload occupies, or `None` for unbuffered payloads.
    #[must_use]
    pub fn of(payload: &Payload) -> Option<(ObjectId, LogKind)> {
        match payload {
            Payload::Rpc {
                object,
                rpc: ObjectRpc::SetHeldState { .. },
            } => Some((*object, LogKind::Held)),
            Payload::Rpc {
                object,
                rpc: ObjectRpc::Release { .. },
            } => Some((*object, LogKind::Release)),
            Payload::Ownership {
                object,
                event: OwnershipEvent::Transferred { .. },
            } => Some((*object, LogKind::Ownership)),
            _ => None,
        }
    }
}

/// Last-writer-wins log of buffered envelopes.
#[derive(Debug, Default)]
pub struct BufferedLog {
    /// Slot → (arrival order, envelope).
    entries: HashMap<(ObjectId, LogKind), (u64, Envelope)>,
    /// Next arrival order number.
    next_order: u64,
}

impl BufferedLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an envelope if its payload is buffered.
    ///
    /// Returns `true` if the envelope replaced or filled a slot.
    pub fn record(&mut self, envelope: &Envelope) -> bool {
        let Some(slot) = LogKind::of(&envelope.payload) else {
            return false;
        };
        let order = self.next_order;
        self.next_order += 1;
        self.entries.insert(slot, (order, envelope.clone()));
        true
    }

    /// Drop every entry for `object` (e.g. when it is destroyed).
    pub fn forget(&mut self, object: ObjectId) {
        self.entries.retain(|(o, _), _| *o != object);
    }

    /// The envelopes to replay to a late joiner, oldest first.
    #[must_use]
    pub fn replay(&self) -> Vec<Envelope> {
        let mut ordered: Vec<&(u64, Envelope)> = self.entries.values().collect();
        ordered.sort_by_key(|(order, _)| *order);
        ordered.into_iter().map(|(_, env)| env.clone()).collect()
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use handoff_ids::ParticipantId;
    use handoff_math::{Quat, Vec3};

    use super::*;
    use crate::messages::{RequestId, StateSnapshot};

    fn held(object: u64, holder: u32, seq: u64) -> Envelope {
        Envelope {
            sender: ParticipantId(holder),
            seq,
            payload: Payload::Rpc {
                object: ObjectId(object),
                rpc: ObjectRpc::SetHeldState {
                    holder: ParticipantId(holder),
                },
            },
        }
    }

    fn release(object: u64, thrower: u32, seq: u64) -> Envelope {
        Envelope {
            sender: ParticipantId(thrower),
            seq,
            payload: Payload::Rpc {
                object: ObjectId(object),
                rpc: ObjectRpc::Release {
                    position: Vec3::ZERO,
                    rotation: Quat::IDENTITY,
                    velocity: Vec3::X,
                    thrower: ParticipantId(thrower),
                },
            },
        }
    }

    #[test]
    fn test_last_writer_wins_per_kind() {
        let mut log = BufferedLog::new();
        log.record(&held(1, 1, 1));
        log.record(&held(1, 2, 1));
        assert_eq!(log.len(), 1);
        assert_eq!(log.replay(), vec![held(1, 2, 1)]);
    }

    #[test]
    fn test_replay_preserves_send_order() {
        let mut log = BufferedLog::new();
        log.record(&held(1, 1, 1));
        log.record(&release(1, 1, 2));
        log.record(&held(1, 2, 1));
        // The later hold must be replayed after the release.
        assert_eq!(log.replay(), vec![release(1, 1, 2), held(1, 2, 1)]);
    }

    #[test]
    fn test_unbuffered_payloads_are_ignored() {
        let mut log = BufferedLog::new();
        let snapshot = Envelope {
            sender: ParticipantId(1),
            seq: 1,
            payload: Payload::Snapshot {
                object: ObjectId(1),
                snapshot: StateSnapshot {
                    pose: handoff_math::Pose::IDENTITY,
                    velocity: Vec3::ZERO,
                    tick: 1,
                },
            },
        };
        let request = Envelope {
            sender: ParticipantId(1),
            seq: 2,
            payload: Payload::OwnershipRequest {
                object: ObjectId(1),
                requester: ParticipantId(1),
                request: RequestId(1),
            },
        };
        assert!(!log.record(&snapshot));
        assert!(!log.record(&request));
        assert!(log.is_empty());
    }

    #[test]
    fn test_forget_object() {
        let mut log = BufferedLog::new();
        log.record(&held(1, 1, 1));
        log.record(&held(2, 1, 2));
        log.forget(ObjectId(1));
        assert_eq!(log.replay(), vec![held(2, 1, 2)]);
    }
}
