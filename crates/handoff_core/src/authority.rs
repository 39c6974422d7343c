//! Ownership arbitration.
//!
//! The [`OwnershipArbiter`] is the single place that decides who may write an
//! object's physics state. Requesters never wait on it: they file a ticket in
//! [`PendingOwnership`] and the ticket resolves when the outcome comes back
//! over the broadcast channel.

use std::collections::BTreeMap;

use handoff_ids::{ObjectId, ParticipantId};
use handoff_net::{Broadcast, Envelope, NetError, OwnershipEvent, Payload, RequestId};
use tracing::{debug, info, trace, warn};

// ── Tickets ─────────────────────────────────────────────────────────────────

/// The state of an ownership request ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// Waiting for the arbiter.
    Pending,
    /// Ownership was granted.
    Confirmed,
    /// The arbiter refused.
    Failed,
    /// The requester gave up before an outcome arrived.
    Cancelled,
}

impl RequestStatus {
    /// Returns `true` for every status but [`RequestStatus::Pending`].
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One ownership request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnershipTicket {
    /// The object asked for.
    pub object: ObjectId,
    /// Where the request stands.
    pub status: RequestStatus,
}

/// A requester's ownership tickets.
///
/// Each ticket resolves exactly once. Outcomes for tickets that are already
/// terminal (or unknown) are ignored.
#[derive(Debug, Default)]
pub struct PendingOwnership {
    next: u64,
    tickets: BTreeMap<RequestId, OwnershipTicket>,
}

impl PendingOwnership {
    /// Create an empty ticket book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// File a new pending ticket for `object`.
    pub fn issue(&mut self, object: ObjectId) -> RequestId {
        self.next += 1;
        let request = RequestId(self.next);
        self.tickets.insert(
            request,
            OwnershipTicket {
                object,
                status: RequestStatus::Pending,
            },
        );
        request
    }

    /// The ticket for `request`.
    #[must_use]
    pub fn ticket(&self, request: RequestId) -> Option<&OwnershipTicket> {
        self.tickets.get(&request)
    }

    /// The status of `request`.
    #[must_use]
    pub fn status(&self, request: RequestId) -> Option<RequestStatus> {
        self.tickets.get(&request).map(|t| t.status)
    }

    /// The pending ticket for `object`, if one is outstanding.
    #[must_use]
    pub fn outstanding(&self, object: ObjectId) -> Option<RequestId> {
        self.tickets
            .iter()
            .find(|(_, t)| t.object == object && t.status == RequestStatus::Pending)
            .map(|(request, _)| *request)
    }

    /// Number of pending tickets.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.tickets
            .values()
            .filter(|t| t.status == RequestStatus::Pending)
            .count()
    }

    /// Move a pending ticket to `outcome`. Returns `false` if the ticket is
    /// unknown or already terminal.
    pub fn resolve(&mut self, request: RequestId, outcome: RequestStatus) -> bool {
        let Some(ticket) = self.tickets.get_mut(&request) else {
            debug!(%request, ?outcome, "outcome for unknown ticket");
            return false;
        };
        if ticket.status.is_terminal() {
            debug!(%request, status = ?ticket.status, ?outcome, "ticket already resolved");
            return false;
        }
        ticket.status = outcome;
        trace!(%request, object = %ticket.object, ?outcome, "ticket resolved");
        true
    }

    /// Cancel a pending ticket.
    pub fn cancel(&mut self, request: RequestId) -> bool {
        self.resolve(request, RequestStatus::Cancelled)
    }

    /// Cancel every pending ticket for `object`. Returns how many were
    /// cancelled.
    pub fn cancel_object(&mut self, object: ObjectId) -> usize {
        let pending: Vec<RequestId> = self
            .tickets
            .iter()
            .filter(|(_, t)| t.object == object && t.status == RequestStatus::Pending)
            .map(|(request, _)| *request)
            .collect();
        pending.into_iter().filter(|r| self.cancel(*r)).count()
    }

    /// Drop every terminal ticket. Returns how many were dropped.
    pub fn prune(&mut self) -> usize {
        let before = self.tickets.len();
        self.tickets.retain(|_, t| !t.status.is_terminal());
        before - self.tickets.len()
    }

    /// Number of stored tickets, terminal ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    /// Whether no tickets are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }
}

// ── Arbiter ─────────────────────────────────────────────────────────────────

/// How the arbiter answers requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OwnershipPolicy {
    /// Every request is granted.
    #[default]
    Takeover,
    /// Ownership never moves. Requests from anyone but the current owner
    /// fail; the owner's own request is confirmed in place.
    Fixed,
}

/// Serialises ownership decisions per object.
#[derive(Debug, Default)]
pub struct OwnershipArbiter {
    policy: OwnershipPolicy,
    owners: BTreeMap<ObjectId, ParticipantId>,
    auto_register: bool,
}

impl OwnershipArbiter {
    /// Create an arbiter with the given policy and no known objects.
    #[must_use]
    pub fn new(policy: OwnershipPolicy) -> Self {
        Self {
            policy,
            owners: BTreeMap::new(),
            auto_register: false,
        }
    }

    /// Treat unknown objects as scene-owned instead of failing requests.
    #[must_use]
    pub fn with_auto_register(mut self, auto_register: bool) -> Self {
        self.auto_register = auto_register;
        self
    }

    /// The active policy.
    #[must_use]
    pub fn policy(&self) -> OwnershipPolicy {
        self.policy
    }

    /// Change the policy.
    pub fn set_policy(&mut self, policy: OwnershipPolicy) {
        self.policy = policy;
    }

    /// Start tracking `object` with an initial owner.
    pub fn register(&mut self, object: ObjectId, owner: ParticipantId) {
        self.owners.insert(object, owner);
    }

    /// Stop tracking `object`.
    pub fn forget(&mut self, object: ObjectId) -> Option<ParticipantId> {
        self.owners.remove(&object)
    }

    /// The current owner of `object`.
    #[must_use]
    pub fn owner_of(&self, object: ObjectId) -> Option<ParticipantId> {
        self.owners.get(&object).copied()
    }

    /// Decide one request. Always yields `Requested` first, then exactly one
    /// of `Transferred` or `TransferFailed`.
    pub fn handle_request(
        &mut self,
        object: ObjectId,
        requester: ParticipantId,
        request: RequestId,
    ) -> Vec<OwnershipEvent> {
        let mut events = vec![OwnershipEvent::Requested { requester, request }];
        let failed = OwnershipEvent::TransferFailed {
            failed_requester: requester,
            request,
        };

        let current = match self.owners.get(&object) {
            Some(owner) => *owner,
            None if self.auto_register => {
                self.owners.insert(object, ParticipantId::SCENE);
                ParticipantId::SCENE
            }
            None => {
                warn!(%object, %requester, "ownership request for unknown object");
                events.push(failed);
                return events;
            }
        };

        let granted = current == requester || self.policy == OwnershipPolicy::Takeover;
        if granted {
            self.owners.insert(object, requester);
            info!(%object, new_owner = %requester, previous_owner = %current, "ownership transferred");
            events.push(OwnershipEvent::Transferred {
                new_owner: requester,
                previous_owner: current,
                request: Some(request),
            });
        } else {
            info!(%object, %requester, owner = %current, "ownership request refused");
            events.push(failed);
        }
        events
    }
}

/// Runs an [`OwnershipArbiter`] on a broadcast endpoint.
#[derive(Debug)]
pub struct ArbiterService<B: Broadcast> {
    arbiter: OwnershipArbiter,
    endpoint: B,
}

impl<B: Broadcast> ArbiterService<B> {
    /// Wrap an arbiter and the endpoint it answers on.
    pub fn new(arbiter: OwnershipArbiter, endpoint: B) -> Self {
        Self { arbiter, endpoint }
    }

    /// The arbiter.
    #[must_use]
    pub fn arbiter(&self) -> &OwnershipArbiter {
        &self.arbiter
    }

    /// The arbiter, mutably.
    pub fn arbiter_mut(&mut self) -> &mut OwnershipArbiter {
        &mut self.arbiter
    }

    /// The endpoint, for publishing anything besides ownership outcomes.
    pub fn endpoint_mut(&mut self) -> &mut B {
        &mut self.endpoint
    }

    /// Answer one envelope. Returns `true` if it was an ownership request.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] if publishing an outcome fails.
    pub fn handle(&mut self, envelope: &Envelope) -> Result<bool, NetError> {
        let Payload::OwnershipRequest {
            object,
            requester,
            request,
        } = envelope.payload
        else {
            return Ok(false);
        };
        if requester != envelope.sender {
            warn!(%object, %requester, sender = %envelope.sender, "request on behalf of another participant ignored");
            return Ok(false);
        }

        for event in self.arbiter.handle_request(object, requester, request) {
            self.endpoint.publish(Payload::Ownership { object, event })?;
        }
        Ok(true)
    }

    /// Drain the endpoint and answer every ownership request in it. Returns
    /// everything drained, for callers that also watch other traffic.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] if publishing an outcome fails.
    pub fn pump(&mut self) -> Result<Vec<Envelope>, NetError> {
        let received = self.endpoint.drain();
        for envelope in &received {
            self.handle(envelope)?;
        }
        Ok(received)
    }
}

#[cfg(test)]
mod tests {
    use handoff_net::LocalBus;

    use super::*;

    const BALL: ObjectId = ObjectId(1);

    #[test]
    fn test_ticket_resolves_once() {
        let mut pending = PendingOwnership::new();
        let request = pending.issue(BALL);
        assert_eq!(pending.outstanding(BALL), Some(request));

        assert!(pending.resolve(request, RequestStatus::Confirmed));
        assert!(!pending.resolve(request, RequestStatus::Failed));
        assert_eq!(pending.status(request), Some(RequestStatus::Confirmed));
        assert_eq!(pending.outstanding(BALL), None);
    }

    #[test]
    fn test_cancel_object() {
        let mut pending = PendingOwnership::new();
        let first = pending.issue(BALL);
        let second = pending.issue(BALL);
        pending.issue(ObjectId(2));

        assert_eq!(pending.cancel_object(BALL), 2);
        assert_eq!(pending.status(first), Some(RequestStatus::Cancelled));
        assert_eq!(pending.status(second), Some(RequestStatus::Cancelled));
        assert_eq!(pending.pending_count(), 1);

        assert_eq!(pending.prune(), 2);
        assert_eq!(pending.status(first), None);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_takeover_grants_and_records_previous_owner() {
        let mut arbiter = OwnershipArbiter::new(OwnershipPolicy::Takeover);
        arbiter.register(BALL, ParticipantId::SCENE);

        let events = arbiter.handle_request(BALL, ParticipantId(1), RequestId(1));
        assert_eq!(
            events,
            vec![
                OwnershipEvent::Requested {
                    requester: ParticipantId(1),
                    request: RequestId(1),
                },
                OwnershipEvent::Transferred {
                    new_owner: ParticipantId(1),
                    previous_owner: ParticipantId::SCENE,
                    request: Some(RequestId(1)),
                },
            ]
        );
        assert_eq!(arbiter.owner_of(BALL), Some(ParticipantId(1)));
    }

    #[test]
    fn test_fixed_refuses_others_but_confirms_owner() {
        let mut arbiter = OwnershipArbiter::new(OwnershipPolicy::Fixed);
        arbiter.register(BALL, ParticipantId(1));

        let refused = arbiter.handle_request(BALL, ParticipantId(2), RequestId(1));
        assert!(matches!(
            refused[1],
            OwnershipEvent::TransferFailed {
                failed_requester: ParticipantId(2),
                ..
            }
        ));

        let reconfirmed = arbiter.handle_request(BALL, ParticipantId(1), RequestId(1));
        assert!(matches!(
            reconfirmed[1],
            OwnershipEvent::Transferred {
                new_owner: ParticipantId(1),
                previous_owner: ParticipantId(1),
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_object_fails_unless_auto_registered() {
        let mut strict = OwnershipArbiter::new(OwnershipPolicy::Takeover);
        let events = strict.handle_request(BALL, ParticipantId(1), RequestId(1));
        assert!(matches!(events[1], OwnershipEvent::TransferFailed { .. }));

        let mut lenient = OwnershipArbiter::new(OwnershipPolicy::Takeover).with_auto_register(true);
        let events = lenient.handle_request(BALL, ParticipantId(1), RequestId(1));
        assert!(matches!(
            events[1],
            OwnershipEvent::Transferred {
                previous_owner: ParticipantId::SCENE,
                ..
            }
        ));
    }

    #[test]
    fn test_service_answers_over_bus() {
        let bus = LocalBus::new();
        let mut arbiter = OwnershipArbiter::new(OwnershipPolicy::Takeover);
        arbiter.register(BALL, ParticipantId::SCENE);
        let mut service = ArbiterService::new(arbiter, bus.join(ParticipantId::ARBITER).unwrap());
        let mut player = bus.join(ParticipantId(1)).unwrap();

        player
            .publish(Payload::OwnershipRequest {
                object: BALL,
                requester: ParticipantId(1),
                request: RequestId(7),
            })
            .unwrap();
        let drained = service.pump().unwrap();
        assert_eq!(drained.len(), 1);

        let outcomes: Vec<_> = player
            .drain()
            .into_iter()
            .filter_map(|e| match e.payload {
                Payload::Ownership { event, .. } => Some(event),
                _ => None,
            })
            .collect();
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(
            outcomes[1],
            OwnershipEvent::Transferred {
                request: Some(RequestId(7)),
                ..
            }
        ));
    }

    #[test]
    fn test_service_ignores_spoofed_requests() {
        let bus = LocalBus::new();
        let mut service = ArbiterService::new(
            OwnershipArbiter::new(OwnershipPolicy::Takeover).with_auto_register(true),
            bus.join(ParticipantId::ARBITER).unwrap(),
        );
        let mut player = bus.join(ParticipantId(1)).unwrap();
        player
            .publish(Payload::OwnershipRequest {
                object: BALL,
                requester: ParticipantId(2),
                request: RequestId(1),
            })
            .unwrap();
        service.pump().unwrap();
        assert_eq!(service.arbiter().owner_of(BALL), None);
    }
}
