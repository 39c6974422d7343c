//! Minimal scene graph.
//!
//! Nodes form a forest. Each node stores its pose relative to its parent and
//! may carry a [`RigidBody`]. Only unparented dynamic bodies are integrated by
//! [`Scene::step`]; a parented body (an object in a hand) follows its parent.
//!
//! Nodes live in a `BTreeMap`, so every traversal visits them in spawn order.

use std::collections::BTreeMap;

use handoff_math::{Pose, Vec3};
use tracing::trace;

use crate::config::PhysicsConfig;
use crate::error::CoreError;

/// Handle to a scene node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

/// A set of collision layers, one bit per layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LayerMask(pub u32);

impl LayerMask {
    /// No layers.
    pub const NONE: Self = Self(0);
    /// Every layer.
    pub const ALL: Self = Self(u32::MAX);

    /// A mask holding a single layer.
    #[must_use]
    pub const fn layer(index: u8) -> Self {
        Self(1 << index)
    }

    /// This mask plus `index`.
    #[must_use]
    pub const fn with(self, index: u8) -> Self {
        Self(self.0 | (1 << index))
    }

    /// Returns `true` if `index` is in the mask.
    #[must_use]
    pub const fn contains(self, index: u8) -> bool {
        self.0 & (1 << index) != 0
    }
}

/// A spherical rigid body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidBody {
    /// Kinematic bodies are moved by the hierarchy, never by the step.
    pub kinematic: bool,
    /// Whether overlap queries see this body.
    pub collision_enabled: bool,
    /// Linear velocity.
    pub velocity: Vec3,
    /// Collision layer, `0..32`.
    pub layer: u8,
    /// Collider radius.
    pub radius: f32,
}

impl RigidBody {
    /// A dynamic, colliding body at rest.
    #[must_use]
    pub fn dynamic(layer: u8, radius: f32) -> Self {
        Self {
            kinematic: false,
            collision_enabled: true,
            velocity: Vec3::ZERO,
            layer,
            radius,
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    tag: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    local: Pose,
    body: Option<RigidBody>,
}

impl Node {
    fn new(name: String, local: Pose) -> Self {
        Self {
            name,
            tag: None,
            parent: None,
            children: Vec::new(),
            local,
            body: None,
        }
    }
}

/// The scene: a forest of named nodes with optional rigid bodies.
#[derive(Debug, Default)]
pub struct Scene {
    nodes: BTreeMap<NodeId, Node>,
    next_id: u32,
}

impl Scene {
    /// Create an empty scene.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the scene has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns `true` if the node exists.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    /// Spawn a root node at a world pose.
    pub fn spawn(&mut self, name: impl Into<String>, pose: Pose) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, Node::new(name.into(), pose));
        trace!(node = %id, "spawned");
        id
    }

    /// Spawn a node under `parent` at a local pose.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownNode`] if `parent` does not exist.
    pub fn spawn_child(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        local: Pose,
    ) -> Result<NodeId, CoreError> {
        if !self.contains(parent) {
            return Err(CoreError::UnknownNode(parent));
        }
        let id = self.spawn(name, local);
        self.link(id, parent);
        Ok(id)
    }

    /// Remove a node and its whole subtree. Returns the removed ids.
    pub fn despawn(&mut self, node: NodeId) -> Vec<NodeId> {
        let Some(parent) = self.nodes.get(&node).map(|n| n.parent) else {
            return Vec::new();
        };
        if let Some(parent) = parent {
            self.unlink(node, parent);
        }

        let mut removed = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if let Some(n) = self.nodes.remove(&id) {
                stack.extend(n.children);
                removed.push(id);
            }
        }
        trace!(node = %node, count = removed.len(), "despawned");
        removed
    }

    // ── Naming ──────────────────────────────────────────────────────────────

    /// The node's name.
    #[must_use]
    pub fn name(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(&node).map(|n| n.name.as_str())
    }

    /// Rename a node.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownNode`] if the node does not exist.
    pub fn rename(&mut self, node: NodeId, name: impl Into<String>) -> Result<(), CoreError> {
        self.node_mut(node)?.name = name.into();
        Ok(())
    }

    /// The node's tag.
    #[must_use]
    pub fn tag(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(&node).and_then(|n| n.tag.as_deref())
    }

    /// Tag a node (e.g. `"Player"`).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownNode`] if the node does not exist.
    pub fn set_tag(&mut self, node: NodeId, tag: impl Into<String>) -> Result<(), CoreError> {
        self.node_mut(node)?.tag = Some(tag.into());
        Ok(())
    }

    /// Depth-first search of `root`'s subtree (root included) for a node
    /// named exactly `name`.
    #[must_use]
    pub fn find_descendant(&self, root: NodeId, name: &str) -> Option<NodeId> {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = self.nodes.get(&id)?;
            if node.name == name {
                return Some(id);
            }
            // Reverse so the first child is visited first.
            stack.extend(node.children.iter().rev());
        }
        None
    }

    // ── Hierarchy ───────────────────────────────────────────────────────────

    /// The node's parent.
    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(&node).and_then(|n| n.parent)
    }

    /// The node's children, in attach order.
    #[must_use]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(&node)
            .map_or(&[][..], |n| n.children.as_slice())
    }

    /// Parent `child` under `parent` with zero local offset and identity local
    /// rotation.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownNode`] if either node is missing, or
    /// [`CoreError::HierarchyCycle`] if `parent` lies in `child`'s subtree.
    pub fn attach(&mut self, child: NodeId, parent: NodeId) -> Result<(), CoreError> {
        if !self.contains(child) {
            return Err(CoreError::UnknownNode(child));
        }
        if !self.contains(parent) {
            return Err(CoreError::UnknownNode(parent));
        }
        let mut cursor = Some(parent);
        while let Some(id) = cursor {
            if id == child {
                return Err(CoreError::HierarchyCycle { child, parent });
            }
            cursor = self.parent(id);
        }

        if let Some(old) = self.parent(child) {
            self.unlink(child, old);
        }
        self.link(child, parent);
        self.node_mut(child)?.local = Pose::IDENTITY;
        Ok(())
    }

    /// Unparent a node, keeping its world pose.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownNode`] if the node does not exist.
    pub fn detach(&mut self, node: NodeId) -> Result<(), CoreError> {
        let world = self.world_pose(node).ok_or(CoreError::UnknownNode(node))?;
        if let Some(parent) = self.parent(node) {
            self.unlink(node, parent);
        }
        let n = self.node_mut(node)?;
        n.parent = None;
        n.local = world;
        Ok(())
    }

    // ── Poses ───────────────────────────────────────────────────────────────

    /// The node's pose relative to its parent.
    #[must_use]
    pub fn local_pose(&self, node: NodeId) -> Option<Pose> {
        self.nodes.get(&node).map(|n| n.local)
    }

    /// Set the node's pose relative to its parent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownNode`] if the node does not exist.
    pub fn set_local_pose(&mut self, node: NodeId, pose: Pose) -> Result<(), CoreError> {
        self.node_mut(node)?.local = pose;
        Ok(())
    }

    /// The node's world pose.
    #[must_use]
    pub fn world_pose(&self, node: NodeId) -> Option<Pose> {
        let mut pose = self.nodes.get(&node)?.local;
        let mut cursor = self.parent(node);
        while let Some(id) = cursor {
            let ancestor = self.nodes.get(&id)?;
            pose = ancestor.local.compose(&pose);
            cursor = ancestor.parent;
        }
        Some(pose)
    }

    /// Move a node so its world pose is `pose`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownNode`] if the node does not exist.
    pub fn set_world_pose(&mut self, node: NodeId, pose: Pose) -> Result<(), CoreError> {
        let local = match self.parent(node).and_then(|p| self.world_pose(p)) {
            Some(parent) => parent.relative(&pose),
            None => pose,
        };
        self.set_local_pose(node, local)
    }

    // ── Bodies ──────────────────────────────────────────────────────────────

    /// Give a node a rigid body, replacing any existing one.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownNode`] if the node does not exist.
    pub fn insert_body(&mut self, node: NodeId, body: RigidBody) -> Result<(), CoreError> {
        self.node_mut(node)?.body = Some(body);
        Ok(())
    }

    /// The node's rigid body.
    #[must_use]
    pub fn body(&self, node: NodeId) -> Option<&RigidBody> {
        self.nodes.get(&node).and_then(|n| n.body.as_ref())
    }

    /// The node's rigid body, mutably.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownNode`] or [`CoreError::NoBody`].
    pub fn body_mut(&mut self, node: NodeId) -> Result<&mut RigidBody, CoreError> {
        self.node_mut(node)?
            .body
            .as_mut()
            .ok_or(CoreError::NoBody(node))
    }

    /// Colliding bodies on `mask` whose sphere intersects the query sphere.
    #[must_use]
    pub fn overlap_sphere(&self, center: Vec3, radius: f32, mask: LayerMask) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter_map(|(id, node)| {
                let body = node.body.as_ref()?;
                if !body.collision_enabled || !mask.contains(body.layer) {
                    return None;
                }
                let position = self.world_pose(*id)?.position;
                (position.distance(center) <= radius + body.radius).then_some(*id)
            })
            .collect()
    }

    /// Returns `true` if the body touches the ground and moves slower than
    /// the rest speed.
    #[must_use]
    pub fn is_resting(&self, node: NodeId, physics: &PhysicsConfig) -> bool {
        let (Some(body), Some(pose)) = (self.body(node), self.world_pose(node)) else {
            return false;
        };
        let grounded = pose.position.y - body.radius <= physics.ground_height + 1e-3;
        grounded && body.velocity.length() < physics.rest_speed
    }

    /// Advance every unparented dynamic body by `dt` seconds.
    pub fn step(&mut self, dt: f32, physics: &PhysicsConfig) {
        for node in self.nodes.values_mut() {
            let Some(body) = node.body.as_mut() else {
                continue;
            };
            if body.kinematic || node.parent.is_some() {
                continue;
            }

            body.velocity += physics.gravity * dt;
            let mut position = node.local.position + body.velocity * dt;

            let floor = physics.ground_height + body.radius;
            if position.y <= floor {
                position.y = floor;
                body.velocity.y = body.velocity.y.max(0.0);
                let keep = (1.0 - physics.ground_friction * dt).max(0.0);
                body.velocity.x *= keep;
                body.velocity.z *= keep;
                if body.velocity.length() < physics.rest_speed {
                    body.velocity = Vec3::ZERO;
                }
            }
            node.local.position = position;
        }
    }

    fn node_mut(&mut self, node: NodeId) -> Result<&mut Node, CoreError> {
        self.nodes.get_mut(&node).ok_or(CoreError::UnknownNode(node))
    }

    fn link(&mut self, child: NodeId, parent: NodeId) {
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.push(child);
        }
        if let Some(c) = self.nodes.get_mut(&child) {
            c.parent = Some(parent);
        }
    }

    fn unlink(&mut self, child: NodeId, parent: NodeId) {
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.retain(|c| *c != child);
        }
        if let Some(c) = self.nodes.get_mut(&child) {
            c.parent = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use handoff_math::Quat;

    use super::*;

    #[test]
    fn test_find_descendant_is_exact() {
        let mut scene = Scene::new();
        let root = scene.spawn("Player", Pose::IDENTITY);
        let arm = scene.spawn_child(root, "Arm", Pose::IDENTITY).unwrap();
        let hand = scene.spawn_child(arm, "HandMount", Pose::IDENTITY).unwrap();

        assert_eq!(scene.find_descendant(root, "HandMount"), Some(hand));
        assert_eq!(scene.find_descendant(root, "handmount"), None);
        assert_eq!(scene.find_descendant(root, "Player"), Some(root));
    }

    #[test]
    fn test_world_pose_composes_parents() {
        let mut scene = Scene::new();
        let turned = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let root = scene.spawn("root", Pose::new(Vec3::new(1.0, 0.0, 0.0), turned));
        let child = scene
            .spawn_child(root, "child", Pose::from_position(Vec3::Z))
            .unwrap();

        let world = scene.world_pose(child).unwrap();
        assert!((world.position - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_attach_resets_local_pose() {
        let mut scene = Scene::new();
        let hand = scene.spawn("hand", Pose::from_position(Vec3::new(0.0, 1.0, 0.0)));
        let ball = scene.spawn("ball", Pose::from_position(Vec3::new(5.0, 0.0, 5.0)));

        scene.attach(ball, hand).unwrap();
        assert_eq!(scene.parent(ball), Some(hand));
        assert_eq!(scene.local_pose(ball), Some(Pose::IDENTITY));
        assert_eq!(scene.world_pose(ball).unwrap().position, Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_attach_rejects_cycles() {
        let mut scene = Scene::new();
        let a = scene.spawn("a", Pose::IDENTITY);
        let b = scene.spawn_child(a, "b", Pose::IDENTITY).unwrap();
        assert!(matches!(
            scene.attach(a, b),
            Err(CoreError::HierarchyCycle { .. })
        ));
    }

    #[test]
    fn test_detach_keeps_world_pose() {
        let mut scene = Scene::new();
        let hand = scene.spawn("hand", Pose::from_position(Vec3::new(0.0, 1.0, 0.0)));
        let ball = scene.spawn("ball", Pose::IDENTITY);
        scene.attach(ball, hand).unwrap();
        scene.detach(ball).unwrap();

        assert_eq!(scene.parent(ball), None);
        assert!(scene.children(hand).is_empty());
        assert_eq!(scene.world_pose(ball).unwrap().position, Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_despawn_removes_subtree() {
        let mut scene = Scene::new();
        let root = scene.spawn("root", Pose::IDENTITY);
        let child = scene.spawn_child(root, "child", Pose::IDENTITY).unwrap();
        scene.spawn_child(child, "grandchild", Pose::IDENTITY).unwrap();

        assert_eq!(scene.despawn(child).len(), 2);
        assert_eq!(scene.len(), 1);
        assert!(scene.children(root).is_empty());
    }

    #[test]
    fn test_overlap_respects_mask_and_collision() {
        let mut scene = Scene::new();
        let near = scene.spawn("near", Pose::from_position(Vec3::X));
        scene.insert_body(near, RigidBody::dynamic(6, 0.1)).unwrap();
        let other_layer = scene.spawn("other", Pose::from_position(Vec3::X));
        scene.insert_body(other_layer, RigidBody::dynamic(2, 0.1)).unwrap();
        let ghost = scene.spawn("ghost", Pose::from_position(Vec3::X));
        let mut body = RigidBody::dynamic(6, 0.1);
        body.collision_enabled = false;
        scene.insert_body(ghost, body).unwrap();

        let hits = scene.overlap_sphere(Vec3::ZERO, 2.0, LayerMask::layer(6));
        assert_eq!(hits, vec![near]);
    }

    #[test]
    fn test_step_lands_on_ground() {
        let physics = PhysicsConfig::default();
        let mut scene = Scene::new();
        let ball = scene.spawn("ball", Pose::from_position(Vec3::new(0.0, 3.0, 0.0)));
        scene.insert_body(ball, RigidBody::dynamic(6, 0.25)).unwrap();

        for _ in 0..600 {
            scene.step(1.0 / 60.0, &physics);
        }
        let pose = scene.world_pose(ball).unwrap();
        assert!((pose.position.y - 0.25).abs() < 1e-4);
        assert!(scene.is_resting(ball, &physics));
    }

    #[test]
    fn test_step_skips_kinematic_and_parented() {
        let physics = PhysicsConfig::default();
        let mut scene = Scene::new();
        let hand = scene.spawn("hand", Pose::from_position(Vec3::new(0.0, 2.0, 0.0)));
        let ball = scene.spawn("ball", Pose::IDENTITY);
        scene.insert_body(ball, RigidBody::dynamic(6, 0.25)).unwrap();
        scene.attach(ball, hand).unwrap();

        scene.step(0.5, &physics);
        assert_eq!(scene.world_pose(ball).unwrap().position, Vec3::new(0.0, 2.0, 0.0));
    }
}
