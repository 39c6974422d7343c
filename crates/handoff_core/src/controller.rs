//! The pickup controller.
//!
//! Turns an interact press into a pickup of the nearest grabbable or a throw
//! of the held one. The controller only decides; the session carries out the
//! returned [`Interaction`].

use handoff_ids::{ObjectId, ParticipantId};
use handoff_math::{Vec3, throw_velocity};
use tracing::{debug, trace};

use crate::attachment::{AttachmentRegistry, HAND_MOUNT};
use crate::config::PickupConfig;
use crate::error::CoreError;
use crate::scene::{NodeId, Scene};

/// What an interact press asks the session to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Interaction {
    /// Nothing in reach, or not the local participant.
    None,
    /// Pick up the object.
    Pickup(ObjectId),
    /// Throw the held object with this velocity.
    Throw {
        /// The held object.
        object: ObjectId,
        /// Release velocity.
        velocity: Vec3,
    },
}

/// Pick the candidate closest to `origin`.
///
/// Ties keep the candidate encountered first.
pub fn select_nearest<I>(origin: Vec3, candidates: I) -> Option<ObjectId>
where
    I: IntoIterator<Item = (ObjectId, Vec3)>,
{
    let mut best: Option<(ObjectId, f32)> = None;
    for (object, position) in candidates {
        let distance = origin.distance(position);
        if best.is_none_or(|(_, closest)| distance < closest) {
            best = Some((object, distance));
        }
    }
    best.map(|(object, _)| object)
}

/// Input handling for one participant's hand.
#[derive(Debug, Clone)]
pub struct PickupController {
    participant: ParticipantId,
    root: NodeId,
    hand: Option<NodeId>,
    config: PickupConfig,
    is_local: bool,
    current: Option<ObjectId>,
}

impl PickupController {
    /// Set up the controller: name the hand node `HandMount` and register the
    /// participant's hand slot.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError`] if a node is missing or the participant already
    /// has a slot.
    pub fn new(
        participant: ParticipantId,
        root: NodeId,
        hand: Option<NodeId>,
        config: PickupConfig,
        is_local: bool,
        scene: &mut Scene,
        slots: &mut AttachmentRegistry,
    ) -> Result<Self, CoreError> {
        if let Some(hand) = hand {
            scene.rename(hand, HAND_MOUNT)?;
        }
        slots.register(participant, root, scene)?;
        debug!(%participant, %root, is_local, "pickup controller ready");
        Ok(Self {
            participant,
            root,
            hand,
            config,
            is_local,
            current: None,
        })
    }

    /// The participant this controller belongs to.
    #[must_use]
    pub fn participant(&self) -> ParticipantId {
        self.participant
    }

    /// The participant's root node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The hand node, if one was given.
    #[must_use]
    pub fn hand(&self) -> Option<NodeId> {
        self.hand
    }

    /// Returns `true` if this controller reacts to input.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.is_local
    }

    /// The tuning in use.
    #[must_use]
    pub fn config(&self) -> &PickupConfig {
        &self.config
    }

    /// The object this controller believes it holds.
    #[must_use]
    pub fn current_object(&self) -> Option<ObjectId> {
        self.current
    }

    /// Forget the held object, e.g. after a refused pickup.
    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Handle an interact press. `grabbable` maps a scene node to the object
    /// it carries, if it is grabbable.
    pub fn on_interact<F>(&mut self, scene: &Scene, grabbable: F) -> Interaction
    where
        F: Fn(NodeId) -> Option<ObjectId>,
    {
        if !self.is_local {
            return Interaction::None;
        }
        match self.current {
            None => self.try_pickup(scene, grabbable),
            Some(object) => self.throw_item(object, scene),
        }
    }

    fn try_pickup<F>(&mut self, scene: &Scene, grabbable: F) -> Interaction
    where
        F: Fn(NodeId) -> Option<ObjectId>,
    {
        let Some(origin) = scene.world_pose(self.root).map(|p| p.position) else {
            return Interaction::None;
        };
        let candidates = scene
            .overlap_sphere(origin, self.config.radius, self.config.interact_layer)
            .into_iter()
            .filter_map(|node| {
                let object = grabbable(node)?;
                Some((object, scene.world_pose(node)?.position))
            });

        match select_nearest(origin, candidates) {
            Some(object) => {
                self.current = Some(object);
                Interaction::Pickup(object)
            }
            None => {
                trace!(participant = %self.participant, "nothing in reach");
                Interaction::None
            }
        }
    }

    fn throw_item(&mut self, object: ObjectId, scene: &Scene) -> Interaction {
        let forward = scene
            .world_pose(self.root)
            .map_or(Vec3::Z, |pose| pose.forward());
        let velocity = throw_velocity(forward, self.config.throw_lift, self.config.throw_force);
        self.current = None;
        Interaction::Throw { object, velocity }
    }
}

#[cfg(test)]
mod tests {
    use handoff_math::{Pose, Quat};

    use super::*;
    use crate::config::INTERACT_LAYER;
    use crate::scene::RigidBody;

    fn spawn_ball(scene: &mut Scene, x: f32) -> NodeId {
        let node = scene.spawn("ball", Pose::from_position(Vec3::new(x, 0.0, 0.0)));
        scene
            .insert_body(node, RigidBody::dynamic(INTERACT_LAYER, 0.1))
            .unwrap();
        node
    }

    fn controller(scene: &mut Scene, is_local: bool) -> PickupController {
        let root = scene.spawn("player", Pose::IDENTITY);
        let hand = scene.spawn_child(root, "Hand", Pose::IDENTITY).unwrap();
        let mut slots = AttachmentRegistry::new();
        PickupController::new(
            ParticipantId(1),
            root,
            Some(hand),
            PickupConfig::default(),
            is_local,
            scene,
            &mut slots,
        )
        .unwrap()
    }

    #[test]
    fn test_select_nearest_picks_closest() {
        let picked = select_nearest(
            Vec3::ZERO,
            [
                (ObjectId(1), Vec3::new(1.0, 0.0, 0.0)),
                (ObjectId(2), Vec3::new(2.5, 0.0, 0.0)),
                (ObjectId(3), Vec3::new(0.5, 0.0, 0.0)),
            ],
        );
        assert_eq!(picked, Some(ObjectId(3)));
    }

    #[test]
    fn test_select_nearest_tie_keeps_first() {
        let picked = select_nearest(
            Vec3::ZERO,
            [
                (ObjectId(4), Vec3::new(1.0, 0.0, 0.0)),
                (ObjectId(5), Vec3::new(-1.0, 0.0, 0.0)),
            ],
        );
        assert_eq!(picked, Some(ObjectId(4)));
        assert_eq!(select_nearest(Vec3::ZERO, []), None);
    }

    #[test]
    fn test_init_names_hand_mount() {
        let mut scene = Scene::new();
        let c = controller(&mut scene, true);
        assert_eq!(scene.name(c.hand().unwrap()), Some(HAND_MOUNT));
    }

    #[test]
    fn test_interact_picks_then_throws() {
        let mut scene = Scene::new();
        let mut c = controller(&mut scene, true);
        let far = spawn_ball(&mut scene, 1.0);
        let near = spawn_ball(&mut scene, 0.5);
        let lookup = |node: NodeId| {
            if node == far {
                Some(ObjectId(10))
            } else if node == near {
                Some(ObjectId(11))
            } else {
                None
            }
        };

        assert_eq!(c.on_interact(&scene, lookup), Interaction::Pickup(ObjectId(11)));
        assert_eq!(c.current_object(), Some(ObjectId(11)));

        let Interaction::Throw { object, velocity } = c.on_interact(&scene, lookup) else {
            panic!("expected a throw");
        };
        assert_eq!(object, ObjectId(11));
        assert!((velocity.length() - 15.0).abs() < 1e-4);
        assert!(velocity.z > 0.0 && velocity.y > 0.0);
        assert_eq!(c.current_object(), None);
    }

    #[test]
    fn test_throw_follows_root_rotation() {
        let mut scene = Scene::new();
        let mut c = controller(&mut scene, true);
        let turned = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        scene
            .set_world_pose(c.root(), Pose::new(Vec3::ZERO, turned))
            .unwrap();
        let ball = spawn_ball(&mut scene, 0.5);
        c.on_interact(&scene, |n| (n == ball).then_some(ObjectId(1)));

        let Interaction::Throw { velocity, .. } = c.on_interact(&scene, |_| None) else {
            panic!("expected a throw");
        };
        assert!(velocity.x > 14.0);
    }

    #[test]
    fn test_remote_controller_ignores_input() {
        let mut scene = Scene::new();
        let mut c = controller(&mut scene, false);
        let ball = spawn_ball(&mut scene, 0.5);
        assert_eq!(
            c.on_interact(&scene, |n| (n == ball).then_some(ObjectId(1))),
            Interaction::None
        );
    }

    #[test]
    fn test_out_of_reach_is_ignored() {
        let mut scene = Scene::new();
        let mut c = controller(&mut scene, true);
        let ball = spawn_ball(&mut scene, 5.0);
        assert_eq!(
            c.on_interact(&scene, |n| (n == ball).then_some(ObjectId(1))),
            Interaction::None
        );
    }
}
