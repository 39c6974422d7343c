//! One participant's view of a handoff session.
//!
//! A [`Session`] owns the participant's scene copy, the hand slots of every
//! known participant, its grabbables and controllers, its broadcast endpoint
//! and its ownership tickets. Everything happens on [`Session::tick`]:
//!
//! 1. Drain the inbox, drop duplicates, dispatch RPCs, ownership outcomes and
//!    snapshots.
//! 2. Apply controller input.
//! 3. Step the scene.
//! 4. Settle objects that came to rest.
//! 5. Capture snapshots of owned objects.
//! 6. Flush the outbox.
//!
//! Errors inside a tick are logged and counted, never returned.

use std::collections::{BTreeMap, HashMap};

use handoff_ids::{ObjectId, ParticipantId};
use handoff_math::{Pose, Vec3};
use handoff_net::{Broadcast, Envelope, ObjectRpc, OwnershipEvent, Payload, RequestId};
use tracing::{debug, trace, warn};

use crate::attachment::{AttachmentRegistry, HandSlot};
use crate::authority::{PendingOwnership, RequestStatus};
use crate::config::SessionConfig;
use crate::controller::{Interaction, PickupController};
use crate::error::CoreError;
use crate::grabbable::{GrabContext, GrabbableObject};
use crate::scene::{NodeId, RigidBody, Scene};

/// Input for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickInput {
    /// The interact button was pressed this tick.
    pub interact: bool,
}

impl TickInput {
    /// An interact press.
    pub const INTERACT: Self = Self { interact: true };
}

/// What happened during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The tick number.
    pub tick: u64,
    /// Envelopes drained from the inbox.
    pub received: usize,
    /// Envelopes dropped as duplicates.
    pub duplicates: usize,
    /// Remote snapshots applied.
    pub snapshots_applied: usize,
    /// Payloads published.
    pub published: usize,
    /// Errors logged.
    pub errors: usize,
}

/// A participant's session.
#[derive(Debug)]
pub struct Session<B: Broadcast> {
    local: ParticipantId,
    endpoint: B,
    config: SessionConfig,
    scene: Scene,
    slots: AttachmentRegistry,
    objects: BTreeMap<ObjectId, GrabbableObject>,
    by_node: HashMap<NodeId, ObjectId>,
    controllers: BTreeMap<ParticipantId, PickupController>,
    pending: PendingOwnership,
    last_seen: HashMap<ParticipantId, u64>,
    outbox: Vec<Payload>,
    tick: u64,
}

impl<B: Broadcast> Session<B> {
    /// Create a session for the endpoint's participant.
    pub fn new(endpoint: B, config: SessionConfig) -> Self {
        let local = endpoint.participant();
        debug!(participant = %local, session = config.session, "session created");
        Self {
            local,
            endpoint,
            config,
            scene: Scene::new(),
            slots: AttachmentRegistry::new(),
            objects: BTreeMap::new(),
            by_node: HashMap::new(),
            controllers: BTreeMap::new(),
            pending: PendingOwnership::new(),
            last_seen: HashMap::new(),
            outbox: Vec::new(),
            tick: 0,
        }
    }

    /// The local participant.
    #[must_use]
    pub fn local(&self) -> ParticipantId {
        self.local
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Ticks run so far.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// The scene.
    #[must_use]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// The scene, mutably (for moving avatars and building levels).
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    /// Hand slots of every known participant.
    #[must_use]
    pub fn slots(&self) -> &AttachmentRegistry {
        &self.slots
    }

    /// The ownership tickets of the local participant.
    #[must_use]
    pub fn pending(&self) -> &PendingOwnership {
        &self.pending
    }

    /// The endpoint.
    pub fn endpoint_mut(&mut self) -> &mut B {
        &mut self.endpoint
    }

    /// A grabbable.
    #[must_use]
    pub fn object(&self, object: ObjectId) -> Option<&GrabbableObject> {
        self.objects.get(&object)
    }

    /// Every grabbable, by id.
    pub fn objects(&self) -> impl Iterator<Item = &GrabbableObject> {
        self.objects.values()
    }

    /// A participant's controller.
    #[must_use]
    pub fn controller(&self, participant: ParticipantId) -> Option<&PickupController> {
        self.controllers.get(&participant)
    }

    // ── Setup ───────────────────────────────────────────────────────────────

    /// Register a participant's avatar without a controller.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError`] if the root is missing or the participant is
    /// already registered.
    pub fn add_participant(
        &mut self,
        participant: ParticipantId,
        root: NodeId,
    ) -> Result<HandSlot, CoreError> {
        self.slots.register(participant, root, &self.scene)
    }

    /// Give a participant's avatar a pickup controller. Only the local
    /// participant's controller reacts to input.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError`] if a node is missing or the participant is
    /// already registered.
    pub fn attach_controller(
        &mut self,
        participant: ParticipantId,
        root: NodeId,
        hand: Option<NodeId>,
    ) -> Result<(), CoreError> {
        let controller = PickupController::new(
            participant,
            root,
            hand,
            self.config.pickup,
            participant == self.local,
            &mut self.scene,
            &mut self.slots,
        )?;
        self.controllers.insert(participant, controller);
        Ok(())
    }

    /// Place a scene-owned grabbable ball.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateObject`] if the id is taken.
    pub fn spawn_grabbable(
        &mut self,
        object: ObjectId,
        name: impl Into<String>,
        pose: Pose,
        radius: f32,
    ) -> Result<NodeId, CoreError> {
        if self.objects.contains_key(&object) {
            return Err(CoreError::DuplicateObject(object));
        }
        let layer = crate::config::INTERACT_LAYER;
        let node = self.scene.spawn(name, pose);
        self.scene.insert_body(node, RigidBody::dynamic(layer, radius))?;
        let grab = GrabbableObject::new(object, node, ParticipantId::SCENE, &mut self.scene)?;
        self.objects.insert(object, grab);
        self.by_node.insert(node, object);
        debug!(%object, %node, "grabbable spawned");
        Ok(node)
    }

    /// Remove a grabbable from the scene, cancelling any pending request.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownObject`] if there is no such object.
    pub fn despawn_grabbable(&mut self, object: ObjectId) -> Result<(), CoreError> {
        let grab = self
            .objects
            .remove(&object)
            .ok_or(CoreError::UnknownObject(object))?;
        self.by_node.remove(&grab.node());
        self.scene.despawn(grab.node());
        let cancelled = self.pending.cancel_object(object);
        for controller in self.controllers.values_mut() {
            if controller.current_object() == Some(object) {
                controller.clear();
            }
        }
        debug!(%object, cancelled, "grabbable despawned");
        Ok(())
    }

    // ── Operations ──────────────────────────────────────────────────────────

    /// Pick up `object` as the local participant.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownObject`] or [`CoreError::AlreadyHeld`].
    pub fn pickup(&mut self, object: ObjectId) -> Result<RequestId, CoreError> {
        let grab = self
            .objects
            .get_mut(&object)
            .ok_or(CoreError::UnknownObject(object))?;
        let request = self.pending.issue(object);
        if let Err(err) = grab.pickup(self.local, request, &mut self.outbox) {
            self.pending.cancel(request);
            return Err(err);
        }
        Ok(request)
    }

    /// Throw `object` with `velocity` as the local participant.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownObject`] or [`CoreError::NotHeld`].
    pub fn drop_object(&mut self, object: ObjectId, velocity: Vec3) -> Result<(), CoreError> {
        let grab = self
            .objects
            .get_mut(&object)
            .ok_or(CoreError::UnknownObject(object))?;
        grab.drop(self.local, velocity, &self.scene, &mut self.outbox)?;
        if let Some(controller) = self.controllers.get_mut(&self.local) {
            if controller.current_object() == Some(object) {
                controller.clear();
            }
        }
        Ok(())
    }

    /// Give up on the pending ownership request for `object`.
    pub fn cancel_request(&mut self, object: ObjectId) -> usize {
        self.pending.cancel_object(object)
    }

    /// Turn replication of `object` on or off.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownObject`] if there is no such object.
    pub fn set_network_physics(&mut self, object: ObjectId, active: bool) -> Result<(), CoreError> {
        self.objects
            .get_mut(&object)
            .ok_or(CoreError::UnknownObject(object))?
            .set_network_physics(active);
        Ok(())
    }

    /// Press interact on the local controller.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NoController`] without a local controller, or the
    /// error of the resulting pickup or throw.
    pub fn interact(&mut self) -> Result<Interaction, CoreError> {
        let local = self.local;
        let controller = self
            .controllers
            .get_mut(&local)
            .ok_or(CoreError::NoController)?;
        let by_node = &self.by_node;
        let interaction = controller.on_interact(&self.scene, |node| by_node.get(&node).copied());

        match interaction {
            Interaction::None => {}
            Interaction::Pickup(object) => {
                if let Err(err) = self.pickup(object) {
                    if let Some(controller) = self.controllers.get_mut(&local) {
                        controller.clear();
                    }
                    return Err(err);
                }
            }
            Interaction::Throw { object, velocity } => self.drop_object(object, velocity)?,
        }
        Ok(interaction)
    }

    // ── Tick ────────────────────────────────────────────────────────────────

    /// Drain the inbox and apply everything in it, without stepping the
    /// scene. [`Session::tick`] starts with this.
    pub fn receive(&mut self) -> TickReport {
        let mut report = TickReport {
            tick: self.tick,
            ..TickReport::default()
        };
        for envelope in self.endpoint.drain() {
            report.received += 1;
            if !self.is_fresh(&envelope) {
                trace!(sender = %envelope.sender, seq = envelope.seq, "duplicate dropped");
                report.duplicates += 1;
                continue;
            }
            match self.dispatch(envelope) {
                Ok(true) => report.snapshots_applied += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(participant = %self.local, %err, "failed to apply message");
                    report.errors += 1;
                }
            }
        }
        report
    }

    /// Run one tick of `dt` seconds.
    pub fn tick(&mut self, dt: f32, input: &TickInput) -> TickReport {
        self.tick += 1;
        // Outcomes stay readable for one tick after they land.
        let pruned = self.pending.prune();
        if pruned > 0 {
            trace!(participant = %self.local, pruned, "resolved tickets dropped");
        }
        let mut report = self.receive();

        if input.interact {
            if let Err(err) = self.interact() {
                warn!(participant = %self.local, %err, "interact failed");
                report.errors += 1;
            }
        }

        self.scene.step(dt, &self.config.physics);

        for grab in self.objects.values_mut() {
            grab.settle(&self.scene, &self.config.physics);
        }

        for grab in self.objects.values_mut() {
            if let Some(snapshot) = grab.capture(self.local, &self.scene, self.tick) {
                self.outbox.push(snapshot);
            }
        }

        report.published = self.flush(&mut report.errors);
        trace!(participant = %self.local, ?report, "tick done");
        report
    }

    /// Publish everything queued so far.
    fn flush(&mut self, errors: &mut usize) -> usize {
        let mut published = 0;
        for payload in self.outbox.drain(..) {
            let kind = payload.kind_name();
            match self.endpoint.publish(payload) {
                Ok(()) => published += 1,
                Err(err) => {
                    warn!(participant = %self.local, kind, %err, "publish failed");
                    *errors += 1;
                }
            }
        }
        published
    }

    /// Per-sender high-water mark: anything at or below it was seen already.
    fn is_fresh(&mut self, envelope: &Envelope) -> bool {
        let last = self.last_seen.entry(envelope.sender).or_insert(0);
        if envelope.seq <= *last {
            return false;
        }
        *last = envelope.seq;
        true
    }

    /// Apply one envelope. Returns `true` if it was a snapshot that applied.
    fn dispatch(&mut self, envelope: Envelope) -> Result<bool, CoreError> {
        let sender = envelope.sender;
        match envelope.payload {
            Payload::Rpc { object, rpc } => {
                let Some(grab) = self.objects.get_mut(&object) else {
                    debug!(%object, "rpc for unknown object");
                    return Ok(false);
                };
                let mut ctx = GrabContext {
                    local: self.local,
                    scene: &mut self.scene,
                    slots: &self.slots,
                };
                grab.apply_rpc(&rpc, &mut ctx)?;
                self.forget_lost_hold(object, &rpc);
                Ok(false)
            }
            Payload::Ownership { object, event } => {
                self.resolve_ticket(&event);
                let Some(grab) = self.objects.get_mut(&object) else {
                    debug!(%object, "ownership event for unknown object");
                    return Ok(false);
                };
                let ctx = GrabContext {
                    local: self.local,
                    scene: &mut self.scene,
                    slots: &self.slots,
                };
                grab.on_ownership(&event, &ctx);
                Ok(false)
            }
            Payload::Snapshot { object, snapshot } => {
                if sender == self.local {
                    return Ok(false);
                }
                let Some(grab) = self.objects.get_mut(&object) else {
                    return Ok(false);
                };
                Ok(grab.apply_snapshot(sender, &snapshot, &mut self.scene))
            }
            Payload::OwnershipRequest { .. } | Payload::Join { .. } | Payload::Replay { .. } => {
                Ok(false)
            }
        }
    }

    fn resolve_ticket(&mut self, event: &OwnershipEvent) {
        let (request, outcome) = match *event {
            OwnershipEvent::Transferred {
                new_owner,
                request: Some(request),
                ..
            } if new_owner == self.local => (request, RequestStatus::Confirmed),
            OwnershipEvent::TransferFailed {
                failed_requester,
                request,
            } if failed_requester == self.local => (request, RequestStatus::Failed),
            _ => return,
        };
        self.pending.resolve(request, outcome);
    }

    /// Someone else took or threw the object the local controller holds.
    fn forget_lost_hold(&mut self, object: ObjectId, rpc: &ObjectRpc) {
        let lost = match *rpc {
            ObjectRpc::SetHeldState { holder } => holder != self.local,
            ObjectRpc::Release { .. } => true,
        };
        if !lost {
            return;
        }
        if let Some(controller) = self.controllers.get_mut(&self.local) {
            if controller.current_object() == Some(object) {
                debug!(%object, "hold lost");
                controller.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use handoff_net::LocalBus;

    use super::*;
    use crate::attachment::HAND_MOUNT;
    use crate::grabbable::GrabState;

    const DT: f32 = 1.0 / 60.0;
    const BALL: ObjectId = ObjectId(1);

    fn session(bus: &LocalBus, id: u32) -> Session<handoff_net::LocalEndpoint> {
        let mut session = Session::new(
            bus.join(ParticipantId(id)).unwrap(),
            SessionConfig::new("test"),
        );
        let root = session
            .scene_mut()
            .spawn("player", Pose::from_position(Vec3::new(0.0, 1.0, 0.0)));
        let hand = session
            .scene_mut()
            .spawn_child(root, "Hand", Pose::from_position(Vec3::Z * 0.5))
            .unwrap();
        session
            .attach_controller(ParticipantId(id), root, Some(hand))
            .unwrap();
        session
            .spawn_grabbable(BALL, "ball", Pose::from_position(Vec3::new(0.5, 0.25, 0.0)), 0.25)
            .unwrap();
        session
    }

    #[test]
    fn test_interact_picks_up_through_the_bus() {
        let bus = LocalBus::new();
        let mut alice = session(&bus, 1);

        let report = alice.tick(DT, &TickInput::INTERACT);
        assert_eq!(report.errors, 0);
        assert_eq!(report.published, 2);
        assert_eq!(alice.controller(ParticipantId(1)).unwrap().current_object(), Some(BALL));

        // The hold comes back on the next tick.
        alice.tick(DT, &TickInput::default());
        let ball = alice.object(BALL).unwrap();
        assert_eq!(ball.holder(), Some(ParticipantId(1)));
        let hand = alice.scene().find_descendant(
            alice.controller(ParticipantId(1)).unwrap().root(),
            HAND_MOUNT,
        );
        assert_eq!(alice.scene().parent(ball.node()), hand);
    }

    #[test]
    fn test_duplicates_are_dropped() {
        let bus = LocalBus::new();
        let mut alice = session(&bus, 1);
        let mut bob = bus.join(ParticipantId(2)).unwrap();
        bob.publish(Payload::Rpc {
            object: BALL,
            rpc: ObjectRpc::SetHeldState {
                holder: ParticipantId(2),
            },
        })
        .unwrap();

        let first = alice.tick(DT, &TickInput::default());
        assert_eq!(first.duplicates, 0);
        assert!(alice.is_fresh(&Envelope {
            sender: ParticipantId(2),
            seq: 2,
            payload: Payload::Join {
                participant: ParticipantId(2),
            },
        }));
        assert!(!alice.is_fresh(&Envelope {
            sender: ParticipantId(2),
            seq: 1,
            payload: Payload::Join {
                participant: ParticipantId(2),
            },
        }));
    }

    #[test]
    fn test_pickup_refused_cancels_ticket() {
        let bus = LocalBus::new();
        let mut alice = session(&bus, 1);
        let first = alice.pickup(BALL).unwrap();
        assert!(matches!(alice.pickup(BALL), Err(CoreError::AlreadyHeld { .. })));
        assert_eq!(alice.pending().status(first), Some(RequestStatus::Pending));
        assert_eq!(alice.pending().pending_count(), 1);
    }

    #[test]
    fn test_unknown_object_errors() {
        let bus = LocalBus::new();
        let mut alice = session(&bus, 1);
        assert!(matches!(
            alice.pickup(ObjectId(99)),
            Err(CoreError::UnknownObject(_))
        ));
        assert!(matches!(
            alice.drop_object(BALL, Vec3::Z),
            Err(CoreError::NotHeld { .. })
        ));
    }

    #[test]
    fn test_interact_without_controller() {
        let bus = LocalBus::new();
        let mut lonely = Session::new(bus.join(ParticipantId(5)).unwrap(), SessionConfig::default());
        assert!(matches!(lonely.interact(), Err(CoreError::NoController)));
        // The tick swallows the error.
        assert_eq!(lonely.tick(DT, &TickInput::INTERACT).errors, 1);
    }

    #[test]
    fn test_resolved_ticket_dropped_next_tick() {
        use crate::authority::{ArbiterService, OwnershipArbiter, OwnershipPolicy};

        let bus = LocalBus::new();
        let arbiter = OwnershipArbiter::new(OwnershipPolicy::Takeover).with_auto_register(true);
        let mut arbiter = ArbiterService::new(arbiter, bus.join(ParticipantId::ARBITER).unwrap());
        let mut alice = session(&bus, 1);

        for _ in 0..50 {
            let request = alice.pickup(BALL).unwrap();
            alice.tick(DT, &TickInput::default());
            arbiter.pump().unwrap();
            alice.tick(DT, &TickInput::default());
            assert_eq!(alice.pending().status(request), Some(RequestStatus::Confirmed));

            alice.drop_object(BALL, Vec3::ZERO).unwrap();
            alice.tick(DT, &TickInput::default());
            assert_eq!(alice.pending().status(request), None);
            alice.tick(DT, &TickInput::default());
        }
        assert!(alice.pending().is_empty());
    }

    #[test]
    fn test_despawn_cancels_pending_request() {
        let bus = LocalBus::new();
        let mut alice = session(&bus, 1);
        let request = alice.pickup(BALL).unwrap();
        alice.despawn_grabbable(BALL).unwrap();
        assert_eq!(alice.pending().status(request), Some(RequestStatus::Cancelled));
        assert!(alice.object(BALL).is_none());

        // Late traffic for the object is ignored.
        let report = alice.tick(DT, &TickInput::default());
        assert_eq!(report.errors, 0);
    }

    #[test]
    fn test_throw_without_arbiter_keeps_predicting() {
        let bus = LocalBus::new();
        let mut alice = session(&bus, 1);
        alice.tick(DT, &TickInput::INTERACT);
        alice.tick(DT, &TickInput::default());
        alice.tick(DT, &TickInput::INTERACT);
        alice.tick(DT, &TickInput::default());

        let ball = alice.object(BALL).unwrap();
        assert_eq!(ball.holder(), None);
        assert!(matches!(ball.state(), GrabState::Flying(_)));
        assert!(!ball.network_sync_enabled());
        // Nobody confirmed, so nothing is written.
        assert_eq!(alice.tick(DT, &TickInput::default()).published, 0);
    }
}
