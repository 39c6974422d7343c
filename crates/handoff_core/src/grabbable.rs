//! The grabbable object state machine.
//!
//! ```text
//!            SetHeldState                 Release (observer, or confirmed thrower)
//!   Free ───────────────▶ Held ─────────────────────────────▶ Flying/Synced ──▶ Free
//!     ▲                    │  Release (unconfirmed thrower)         ▲     at rest
//!     │                    └──────────────▶ Flying/Predicting ──────┘
//!     │                                       Transferred to me, or TransferFailed
//! ```
//!
//! Two signals gate replication: whether the object is held, and whether this
//! participant is the confirmed owner. Holding always wins: a held object
//! never replicates, whoever owns it.
//!
//! Every mutation arrives through [`GrabbableObject::apply_rpc`] or
//! [`GrabbableObject::on_ownership`], including the local participant's own
//! RPCs, which come back over the channel like everyone else's.

use handoff_ids::{ObjectId, ParticipantId};
use handoff_math::{Pose, Vec3};
use handoff_net::{ObjectRpc, OwnershipEvent, Payload, RequestId, StateSnapshot};
use tracing::{debug, info, trace, warn};

use crate::attachment::AttachmentRegistry;
use crate::config::PhysicsConfig;
use crate::error::CoreError;
use crate::replication::ReplicationView;
use crate::scene::{NodeId, RigidBody, Scene};

/// Whether a thrown object follows the replication stream yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightSync {
    /// The thrower simulates locally while its ownership is unconfirmed.
    Predicting,
    /// Replication is on.
    Synced,
}

/// Where an object is in its pickup/throw cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrabState {
    /// Resting or drifting, nobody holds it.
    Free,
    /// In a participant's hand.
    Held {
        /// Who holds it.
        holder: ParticipantId,
    },
    /// Thrown and still moving.
    Flying(FlightSync),
}

/// What a grabbable needs from the participant applying an event.
#[derive(Debug)]
pub struct GrabContext<'a> {
    /// The participant applying the event.
    pub local: ParticipantId,
    /// The participant's scene.
    pub scene: &'a mut Scene,
    /// Hand slots of every known participant.
    pub slots: &'a AttachmentRegistry,
}

/// One participant's copy of a shared grabbable object.
#[derive(Debug, Clone)]
pub struct GrabbableObject {
    id: ObjectId,
    node: NodeId,
    state: GrabState,
    owner: ParticipantId,
    last_thrower: Option<ParticipantId>,
    replication: ReplicationView,
    pending_pickup: Option<RequestId>,
    rest_snapshot_due: bool,
}

impl GrabbableObject {
    /// Wrap `node` as grabbable `id`, initially free and owned by `owner`.
    ///
    /// The node's body is made dynamic and colliding.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownNode`] or [`CoreError::NoBody`].
    pub fn new(
        id: ObjectId,
        node: NodeId,
        owner: ParticipantId,
        scene: &mut Scene,
    ) -> Result<Self, CoreError> {
        let body = scene.body_mut(node)?;
        body.kinematic = false;
        body.collision_enabled = true;
        Ok(Self {
            id,
            node,
            state: GrabState::Free,
            owner,
            last_thrower: None,
            replication: ReplicationView::new(),
            pending_pickup: None,
            rest_snapshot_due: false,
        })
    }

    /// The object id.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// The scene node carrying the object.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> GrabState {
        self.state
    }

    /// The participant holding the object.
    #[must_use]
    pub fn holder(&self) -> Option<ParticipantId> {
        match self.state {
            GrabState::Held { holder } => Some(holder),
            GrabState::Free | GrabState::Flying(_) => None,
        }
    }

    /// The confirmed physics authority.
    #[must_use]
    pub fn authoritative_owner(&self) -> ParticipantId {
        self.owner
    }

    /// Returns `true` if `participant` is the confirmed owner.
    #[must_use]
    pub fn is_owned_by(&self, participant: ParticipantId) -> bool {
        self.owner == participant
    }

    /// The participant that threw the object last.
    #[must_use]
    pub fn last_thrower(&self) -> Option<ParticipantId> {
        self.last_thrower
    }

    /// Returns `true` if the object takes part in replication.
    #[must_use]
    pub fn network_sync_enabled(&self) -> bool {
        self.replication.is_active()
    }

    /// The replication gate.
    #[must_use]
    pub fn replication(&self) -> &ReplicationView {
        &self.replication
    }

    /// The ticket of a local pickup whose `SetHeldState` has not come back.
    #[must_use]
    pub fn pending_pickup(&self) -> Option<RequestId> {
        self.pending_pickup
    }

    /// Turn replication on or off.
    pub fn set_network_physics(&mut self, active: bool) {
        if self.replication.is_active() != active {
            debug!(object = %self.id, active, "network physics");
        }
        self.replication.set_active(active);
    }

    // ── Local operations ────────────────────────────────────────────────────

    /// Ask for ownership and announce `requester` as the holder.
    ///
    /// Nothing changes locally until the `SetHeldState` comes back.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AlreadyHeld`] if the object is held or a local
    /// pickup is already in flight.
    pub fn pickup(
        &mut self,
        requester: ParticipantId,
        request: RequestId,
        outbox: &mut Vec<Payload>,
    ) -> Result<(), CoreError> {
        if self.holder().is_some() || self.pending_pickup.is_some() {
            return Err(CoreError::AlreadyHeld { object: self.id });
        }
        self.pending_pickup = Some(request);
        outbox.push(Payload::OwnershipRequest {
            object: self.id,
            requester,
            request,
        });
        outbox.push(Payload::Rpc {
            object: self.id,
            rpc: ObjectRpc::SetHeldState { holder: requester },
        });
        info!(object = %self.id, %requester, %request, "pickup");
        Ok(())
    }

    /// Announce a release at the current world pose with `velocity`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotHeld`] if the object is neither held nor being
    /// picked up locally.
    pub fn drop(
        &mut self,
        thrower: ParticipantId,
        velocity: Vec3,
        scene: &Scene,
        outbox: &mut Vec<Payload>,
    ) -> Result<(), CoreError> {
        if self.holder().is_none() && self.pending_pickup.is_none() {
            return Err(CoreError::NotHeld { object: self.id });
        }
        let pose = scene
            .world_pose(self.node)
            .ok_or(CoreError::UnknownNode(self.node))?;
        self.pending_pickup = None;
        outbox.push(Payload::Rpc {
            object: self.id,
            rpc: ObjectRpc::Release {
                position: pose.position,
                rotation: pose.rotation,
                velocity,
                thrower,
            },
        });
        info!(object = %self.id, %thrower, ?velocity, "drop");
        Ok(())
    }

    // ── Received events ─────────────────────────────────────────────────────

    /// Apply a hold or release broadcast.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError`] if the object's node or body has gone missing.
    pub fn apply_rpc(&mut self, rpc: &ObjectRpc, ctx: &mut GrabContext<'_>) -> Result<(), CoreError> {
        match *rpc {
            ObjectRpc::SetHeldState { holder } => self.apply_held(holder, ctx)?,
            ObjectRpc::Release {
                position,
                rotation,
                velocity,
                thrower,
            } => self.apply_release(Pose::new(position, rotation), velocity, thrower, ctx)?,
        }
        debug_assert!(self.holder().is_none() || !self.network_sync_enabled());
        Ok(())
    }

    fn apply_held(&mut self, holder: ParticipantId, ctx: &mut GrabContext<'_>) -> Result<(), CoreError> {
        self.set_network_physics(false);
        self.rest_snapshot_due = false;
        let body = ctx.scene.body_mut(self.node)?;
        body.kinematic = true;
        body.collision_enabled = false;
        body.velocity = Vec3::ZERO;

        self.state = GrabState::Held { holder };
        if holder == ctx.local {
            self.pending_pickup = None;
        }

        match ctx.slots.hand_frame(holder) {
            Some(frame) => ctx.scene.attach(self.node, frame)?,
            None => {
                warn!(object = %self.id, %holder, "holder has no hand slot; object stays unparented");
                if ctx.scene.parent(self.node).is_some() {
                    ctx.scene.detach(self.node)?;
                }
            }
        }
        debug!(object = %self.id, %holder, "held");
        Ok(())
    }

    fn apply_release(
        &mut self,
        pose: Pose,
        velocity: Vec3,
        thrower: ParticipantId,
        ctx: &mut GrabContext<'_>,
    ) -> Result<(), CoreError> {
        ctx.scene.detach(self.node)?;
        ctx.scene.set_world_pose(self.node, pose)?;
        let body = ctx.scene.body_mut(self.node)?;
        body.kinematic = false;
        body.collision_enabled = true;
        body.velocity = velocity;

        self.last_thrower = Some(thrower);
        if thrower == ctx.local {
            self.pending_pickup = None;
        }

        // The thrower keeps simulating its own copy until the arbiter confirms
        // it; everyone else follows the stream straight away.
        if thrower == ctx.local && !self.is_owned_by(ctx.local) {
            self.set_network_physics(false);
            self.state = GrabState::Flying(FlightSync::Predicting);
        } else {
            self.set_network_physics(true);
            self.state = GrabState::Flying(FlightSync::Synced);
        }
        debug!(object = %self.id, %thrower, state = ?self.state, "released");
        Ok(())
    }

    /// Apply an arbitration outcome.
    pub fn on_ownership(&mut self, event: &OwnershipEvent, ctx: &GrabContext<'_>) {
        let kinematic = ctx.scene.body(self.node).is_none_or(|b| b.kinematic);
        match *event {
            OwnershipEvent::Requested { requester, request } => {
                trace!(object = %self.id, %requester, %request, "ownership requested");
            }
            OwnershipEvent::Transferred {
                new_owner,
                previous_owner,
                ..
            } => {
                self.owner = new_owner;
                debug!(object = %self.id, %new_owner, %previous_owner, "owner changed");
                if new_owner == ctx.local && !kinematic {
                    self.set_network_physics(true);
                    self.finish_prediction();
                }
            }
            OwnershipEvent::TransferFailed {
                failed_requester, ..
            } => {
                debug!(object = %self.id, %failed_requester, "ownership transfer failed");
                if !kinematic && !self.network_sync_enabled() {
                    self.set_network_physics(true);
                    self.finish_prediction();
                }
            }
        }
        debug_assert!(self.holder().is_none() || !self.network_sync_enabled());
    }

    fn finish_prediction(&mut self) {
        if self.state == GrabState::Flying(FlightSync::Predicting) {
            self.state = GrabState::Flying(FlightSync::Synced);
        }
    }

    // ── Replication ─────────────────────────────────────────────────────────

    /// Apply the owner's snapshot. Returns `true` if it was applied.
    ///
    /// Snapshots from anyone but the confirmed owner, and any snapshot while
    /// replication is off or the body is kinematic, are ignored.
    pub fn apply_snapshot(
        &mut self,
        sender: ParticipantId,
        snapshot: &StateSnapshot,
        scene: &mut Scene,
    ) -> bool {
        if sender != self.owner {
            trace!(object = %self.id, %sender, owner = %self.owner, "snapshot from non-owner");
            return false;
        }
        if scene.body(self.node).is_none_or(|b| b.kinematic) {
            return false;
        }
        if !self.replication.accept(sender, snapshot) {
            return false;
        }

        let (pose, velocity) = self.replication.applies();
        if pose && scene.set_world_pose(self.node, snapshot.pose).is_err() {
            return false;
        }
        if velocity {
            if let Ok(body) = scene.body_mut(self.node) {
                body.velocity = snapshot.velocity;
            }
        }
        true
    }

    /// The snapshot this participant should publish this tick, if any.
    ///
    /// Only the confirmed owner writes, only while replication is on, and
    /// only while the object is moving, in flight, or has just come to rest.
    pub fn capture(&mut self, local: ParticipantId, scene: &Scene, tick: u64) -> Option<Payload> {
        if !self.is_owned_by(local) {
            return None;
        }
        let body: &RigidBody = scene.body(self.node)?;
        if body.kinematic {
            return None;
        }
        let flying = matches!(self.state, GrabState::Flying(_));
        let resting_pose_due = std::mem::take(&mut self.rest_snapshot_due);
        if !flying && !resting_pose_due && body.velocity == Vec3::ZERO {
            return None;
        }
        let pose = scene.world_pose(self.node)?;
        self.replication
            .capture(pose, body.velocity, tick)
            .map(|snapshot| Payload::Snapshot {
                object: self.id,
                snapshot,
            })
    }

    /// Return a synced flight to `Free` once the body rests. Returns `true`
    /// on that transition.
    pub fn settle(&mut self, scene: &Scene, physics: &PhysicsConfig) -> bool {
        if self.state == GrabState::Flying(FlightSync::Synced) && scene.is_resting(self.node, physics)
        {
            self.state = GrabState::Free;
            self.rest_snapshot_due = true;
            debug!(object = %self.id, "came to rest");
            return true;
        }
        false
    }
}
