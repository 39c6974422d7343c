//! Shared scene for the handoff demos.
//!
//! Every participant builds the same scene: one avatar per participant in a
//! row along +X, all facing +X, each with a hand and a pickup controller, and
//! one ball in front of the first avatar. Avatars are tagged as players so
//! they can consume collectibles.

use std::f32::consts::FRAC_PI_2;

use handoff_core::{CoreError, NodeId, PickupConfig, RigidBody, Session, SessionConfig};
use handoff_ids::{ObjectId, ParticipantId};
use handoff_math::{Pose, Quat, Vec3};
use handoff_net::Broadcast;
use handoff_reward::PLAYER_TAG;
use tracing::info;

/// The ball every demo throws around.
pub const BALL: ObjectId = ObjectId(1);

/// Distance between neighbouring avatars.
pub const AVATAR_SPACING: f32 = 2.5;

const AVATAR_RADIUS: f32 = 0.4;
const BALL_RADIUS: f32 = 0.25;

/// Where `participant`'s avatar stands.
#[must_use]
pub fn avatar_pose(participant: ParticipantId) -> Pose {
    let x = AVATAR_SPACING * participant.id().saturating_sub(1) as f32;
    Pose::new(Vec3::new(x, 1.0, 0.0), Quat::from_rotation_y(FRAC_PI_2))
}

/// Session settings with a gentle throw, so the ball lands near the next
/// avatar.
#[must_use]
pub fn demo_config(session: &str) -> SessionConfig {
    SessionConfig::new(session).with_pickup(PickupConfig {
        throw_force: 4.0,
        ..PickupConfig::default()
    })
}

/// Build the shared scene. Returns the local participant's avatar root.
///
/// # Errors
///
/// Returns [`CoreError::NoController`] if the local participant is not in
/// `everyone`, or any error from building the scene.
pub fn populate<B: Broadcast>(
    session: &mut Session<B>,
    everyone: &[ParticipantId],
) -> Result<NodeId, CoreError> {
    let mut local_root = None;
    for &participant in everyone {
        let scene = session.scene_mut();
        let root = scene.spawn(format!("avatar-{}", participant.id()), avatar_pose(participant));
        let hand = scene.spawn_child(root, "Hand", Pose::from_position(Vec3::new(0.3, 0.2, 0.5)))?;
        scene.set_tag(root, PLAYER_TAG)?;
        let mut body = RigidBody::dynamic(0, AVATAR_RADIUS);
        body.kinematic = true;
        scene.insert_body(root, body)?;
        session.attach_controller(participant, root, Some(hand))?;
        if participant == session.local() {
            local_root = Some(root);
        }
    }
    session.spawn_grabbable(
        BALL,
        "ball",
        Pose::from_position(Vec3::new(0.8, BALL_RADIUS, 0.0)),
        BALL_RADIUS,
    )?;
    local_root.ok_or(CoreError::NoController)
}

/// Move an avatar by `offset`.
///
/// # Errors
///
/// Returns [`CoreError::UnknownNode`] if the avatar is gone.
pub fn walk<B: Broadcast>(session: &mut Session<B>, root: NodeId, offset: Vec3) -> Result<(), CoreError> {
    let scene = session.scene_mut();
    let pose = scene.world_pose(root).ok_or(CoreError::UnknownNode(root))?;
    scene.set_world_pose(root, pose.translated(offset))
}

/// Log what this participant sees of every grabbable.
pub fn describe<B: Broadcast>(session: &Session<B>, tick: u64) {
    for grab in session.objects() {
        let position = session
            .scene()
            .world_pose(grab.node())
            .map_or(Vec3::ZERO, |pose| pose.position);
        info!(
            participant = %session.local(),
            tick,
            object = %grab.id(),
            state = ?grab.state(),
            holder = ?grab.holder(),
            owner = %grab.authoritative_owner(),
            sync = grab.network_sync_enabled(),
            x = position.x,
            y = position.y,
            z = position.z,
            "object"
        );
    }
}

#[cfg(test)]
mod tests {
    use handoff_net::LocalBus;

    use super::*;

    const ALICE: ParticipantId = ParticipantId(1);
    const BOB: ParticipantId = ParticipantId(2);

    #[test]
    fn test_populate_builds_shared_scene() {
        let bus = LocalBus::new();
        let mut session = Session::new(bus.join(BOB).unwrap(), demo_config("demo"));
        let root = populate(&mut session, &[ALICE, BOB]).unwrap();

        assert_eq!(session.scene().tag(root), Some(PLAYER_TAG));
        assert!(session.controller(ALICE).is_some());
        assert!(session.controller(BOB).is_some());
        assert!(session.object(BALL).is_some());
        let position = session.scene().world_pose(root).unwrap().position;
        assert!((position.x - AVATAR_SPACING).abs() < 1e-6);
    }

    #[test]
    fn test_avatars_face_along_x() {
        let forward = avatar_pose(ALICE).forward();
        assert!((forward - Vec3::X).length() < 1e-5);
    }

    #[test]
    fn test_missing_local_avatar() {
        let bus = LocalBus::new();
        let mut session = Session::new(bus.join(BOB).unwrap(), demo_config("demo"));
        assert!(matches!(
            populate(&mut session, &[ALICE]),
            Err(CoreError::NoController)
        ));
    }

    #[test]
    fn test_walk_moves_avatar() {
        let bus = LocalBus::new();
        let mut session = Session::new(bus.join(ALICE).unwrap(), demo_config("demo"));
        let root = populate(&mut session, &[ALICE]).unwrap();
        walk(&mut session, root, Vec3::new(-1.0, 0.0, 0.0)).unwrap();
        let position = session.scene().world_pose(root).unwrap().position;
        assert!((position.x + 1.0).abs() < 1e-6);
    }
}
