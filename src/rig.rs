use enum_map::{Enum, EnumMap};
use rapier3d::na::Vector3;
use rapier3d::prelude::*;

use crate::physics::RootId;
use crate::world::SimulationWorld;

// Tags used for segment discovery
pub const REACH_LINK_TAG: &str = "reachlink";
pub const WALKER_PART_TAG: &str = "walkerpart";
pub const BALL_TAG: &str = "ball";

// Reacher dimensions
pub const REACHER_SEGMENT_RADIUS: Real = 0.5;
pub const REACHER_SEGMENT_MASS: Real = 5.0;

// Ball dimensions
pub const BALL_RADIUS: Real = 0.1;
pub const BALL_MASS: Real = 1.0;

/// A hanging chain of capsules pinned to a fixed pivot at the agent origin.
#[derive(Debug, Clone)]
pub struct ReacherRig {
    pub root: RootId,
    pub origin: Vector3<Real>,
    pub segment_length: Real,
}

impl ReacherRig {
    pub fn spawn(
        world: &mut SimulationWorld,
        origin: Vector3<Real>,
        segment_count: usize,
        segment_length: Real,
    ) -> Self {
        let root = world.spawn_root();
        let anchor = world.insert_anchor(origin);
        let half_length = segment_length / 2.0;
        let half_height = (half_length - REACHER_SEGMENT_RADIUS).max(0.0);

        let mut parent = anchor;
        let mut parent_anchor = point![0.0, 0.0, 0.0];
        for i in 0..segment_count {
            let center = origin + vector![0.0, -(i as Real + 0.5) * segment_length, 0.0];
            let link = world.insert_capsule_part(
                REACH_LINK_TAG,
                root,
                center,
                half_height,
                REACHER_SEGMENT_RADIUS,
                REACHER_SEGMENT_MASS,
            );
            world.spherical_joint(parent, link, parent_anchor, point![0.0, half_length, 0.0]);
            parent = link;
            parent_anchor = point![0.0, -half_length, 0.0];
        }

        Self {
            root,
            origin,
            segment_length,
        }
    }

    /// The hand sits at the free end of the last segment.
    pub fn hand_offset(&self) -> Vector3<Real> {
        vector![0.0, -self.segment_length / 2.0, 0.0]
    }
}

/// Body parts of the walker ragdoll, in observation order.
#[derive(Debug, Enum, Clone, Copy, PartialEq, Eq)]
pub enum WalkerPart {
    Hips,
    Chest,
    Spine,
    Head,
    ThighL,
    ShinL,
    FootL,
    ThighR,
    ShinR,
    FootR,
    ArmL,
    ForearmL,
    HandL,
    ArmR,
    ForearmR,
    HandR,
}

#[derive(Debug, Clone, Copy)]
pub enum PartShape {
    Box { half_extents: [Real; 3] },
    Ball { radius: Real },
}

/// Static description of one walker part at spawn time.
#[derive(Debug, Clone, Copy)]
pub struct PartSpec {
    pub center: [Real; 3],
    pub shape: PartShape,
    pub mass: Real,
    /// Parent part and the joint position in rig space.
    pub joint: Option<(WalkerPart, [Real; 3])>,
    /// Angular limits in degrees around local x, y, z.
    pub limits: [[Real; 2]; 3],
}

impl WalkerPart {
    pub const COUNT: usize = 16;

    pub fn all() -> impl Iterator<Item = WalkerPart> {
        (0..Self::COUNT).map(WalkerPart::from_usize)
    }

    pub fn parent(self) -> Option<WalkerPart> {
        self.spec().joint.map(|(parent, _)| parent)
    }

    /// Parts that report local rotation and joint strength.
    pub fn is_driven(self) -> bool {
        !matches!(self, WalkerPart::Hips | WalkerPart::HandL | WalkerPart::HandR)
    }

    pub fn spec(self) -> PartSpec {
        use WalkerPart::*;
        const NONE: [Real; 2] = [0.0, 0.0];
        let part = |center, half_extents, mass, joint, limits| PartSpec {
            center,
            shape: PartShape::Box { half_extents },
            mass,
            joint,
            limits,
        };
        match self {
            Hips => part([0.0, 1.06, 0.0], [0.2, 0.08, 0.12], 8.0, None, [NONE; 3]),
            Spine => part(
                [0.0, 1.25, 0.0],
                [0.18, 0.1, 0.1],
                8.0,
                Some((Hips, [0.0, 1.145, 0.0])),
                [[-30.0, 30.0], [-30.0, 30.0], [-30.0, 30.0]],
            ),
            Chest => part(
                [0.0, 1.5, 0.0],
                [0.22, 0.14, 0.12],
                8.0,
                Some((Spine, [0.0, 1.355, 0.0])),
                [[-30.0, 30.0], [-30.0, 30.0], [-30.0, 30.0]],
            ),
            Head => PartSpec {
                center: [0.0, 1.78, 0.0],
                shape: PartShape::Ball { radius: 0.12 },
                mass: 3.0,
                joint: Some((Chest, [0.0, 1.65, 0.0])),
                limits: [[-30.0, 30.0], [-60.0, 60.0], NONE],
            },
            ThighL | ThighR => part(
                [self.side() * 0.12, 0.75, 0.0],
                [0.08, 0.22, 0.08],
                4.0,
                Some((Hips, [self.side() * 0.12, 0.975, 0.0])),
                [[-90.0, 60.0], [-20.0, 20.0], NONE],
            ),
            ShinL | ShinR => part(
                [self.side() * 0.12, 0.32, 0.0],
                [0.06, 0.2, 0.06],
                3.0,
                Some((if self == ShinL { ThighL } else { ThighR }, [self.side() * 0.12, 0.525, 0.0])),
                [[0.0, 120.0], NONE, NONE],
            ),
            FootL | FootR => part(
                [self.side() * 0.12, 0.06, 0.04],
                [0.09, 0.05, 0.14],
                1.0,
                Some((if self == FootL { ShinL } else { ShinR }, [self.side() * 0.12, 0.115, 0.0])),
                [[-30.0, 30.0], [-20.0, 20.0], [-20.0, 20.0]],
            ),
            ArmL | ArmR => part(
                [self.side() * 0.29, 1.47, 0.0],
                [0.05, 0.15, 0.05],
                2.0,
                Some((Chest, [self.side() * 0.29, 1.62, 0.0])),
                [[-120.0, 60.0], [-60.0, 60.0], NONE],
            ),
            ForearmL | ForearmR => part(
                [self.side() * 0.29, 1.17, 0.0],
                [0.045, 0.14, 0.045],
                1.5,
                Some((if self == ForearmL { ArmL } else { ArmR }, [self.side() * 0.29, 1.315, 0.0])),
                [[-120.0, 0.0], NONE, NONE],
            ),
            HandL | HandR => PartSpec {
                center: [self.side() * 0.29, 0.97, 0.0],
                shape: PartShape::Ball { radius: 0.05 },
                mass: 0.5,
                joint: Some((if self == HandL { ForearmL } else { ForearmR }, [self.side() * 0.29, 1.025, 0.0])),
                limits: [NONE; 3],
            },
        }
    }

    fn side(self) -> Real {
        use WalkerPart::*;
        match self {
            ThighL | ShinL | FootL | ArmL | ForearmL | HandL => -1.0,
            _ => 1.0,
        }
    }
}

/// Spawned walker ragdoll; part handles indexed by [`WalkerPart`].
#[derive(Debug, Clone)]
pub struct WalkerRig {
    pub root: RootId,
    pub origin: Vector3<Real>,
    pub parts: EnumMap<WalkerPart, RigidBodyHandle>,
}

impl WalkerRig {
    /// Spawn standing on the ground plane at `origin`.
    pub fn spawn(world: &mut SimulationWorld, origin: Vector3<Real>) -> Self {
        let root = world.spawn_root();
        let mut handles: Vec<RigidBodyHandle> = Vec::with_capacity(WalkerPart::COUNT);

        for part in WalkerPart::all() {
            let spec = part.spec();
            let center = origin + Vector3::from(spec.center);
            let handle = match spec.shape {
                PartShape::Box { half_extents } => {
                    world.insert_box_part(WALKER_PART_TAG, root, center, half_extents, spec.mass)
                }
                PartShape::Ball { radius } => {
                    world.insert_ball_part(WALKER_PART_TAG, root, center, radius, spec.mass)
                }
            };
            handles.push(handle);
        }

        let parts = EnumMap::from_fn(|part: WalkerPart| handles[part.into_usize()]);
        for part in WalkerPart::all() {
            let spec = part.spec();
            if let Some((parent, joint_at)) = spec.joint {
                let parent_center = Vector3::from(parent.spec().center);
                let joint_at = Vector3::from(joint_at);
                let anchor_parent = joint_at - parent_center;
                let anchor_child = joint_at - Vector3::from(spec.center);
                let limits = spec.limits.map(|range| range.map(|deg: Real| deg.to_radians()));
                world.limited_joint(
                    parts[parent],
                    parts[part],
                    point![anchor_parent.x, anchor_parent.y, anchor_parent.z],
                    point![anchor_child.x, anchor_child.y, anchor_child.z],
                    limits,
                );
            }
        }

        Self {
            root,
            origin,
            parts,
        }
    }
}

/// Single ball sitting on a platform.
#[derive(Debug, Clone)]
pub struct BallRig {
    pub root: RootId,
    pub origin: Vector3<Real>,
    pub ball: RigidBodyHandle,
}

impl BallRig {
    pub fn spawn(world: &mut SimulationWorld, origin: Vector3<Real>, start: Vector3<Real>) -> Self {
        let root = world.spawn_root();
        let ball = world.insert_ball_part(BALL_TAG, root, origin + start, BALL_RADIUS, BALL_MASS);
        Self { root, origin, ball }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::PhysicsBackend;

    #[test]
    fn test_reacher_spawns_tagged_chain() {
        let mut world = SimulationWorld::new();
        let rig = ReacherRig::spawn(&mut world, vector![0.0, 0.0, 0.0], 3, 4.0);
        let links = world.tagged_bodies(REACH_LINK_TAG);
        assert_eq!(links.len(), 3);
        for (i, link) in links.iter().enumerate() {
            let snap = world.snapshot(*link).unwrap();
            assert!((snap.position.y + (i as f32 + 0.5) * 4.0).abs() < 1e-5);
            assert_eq!(world.root_of(*link), Some(rig.root));
        }
    }

    #[test]
    fn test_walker_parent_chain_ends_at_hips() {
        for part in WalkerPart::all() {
            let mut current = part;
            let mut hops = 0;
            while let Some(parent) = current.parent() {
                current = parent;
                hops += 1;
                assert!(hops < WalkerPart::COUNT);
            }
            assert_eq!(current, WalkerPart::Hips);
        }
    }

    #[test]
    fn test_walker_spawns_every_part() {
        let mut world = SimulationWorld::with_floor(0.0);
        let rig = WalkerRig::spawn(&mut world, vector![0.0, 0.0, 0.0]);
        assert_eq!(world.tagged_bodies(WALKER_PART_TAG).len(), WalkerPart::COUNT);
        let head = world.snapshot(rig.parts[WalkerPart::Head]).unwrap();
        let foot = world.snapshot(rig.parts[WalkerPart::FootL]).unwrap();
        assert!(head.position.y > foot.position.y + 1.5);
    }

    #[test]
    fn test_driven_parts() {
        let driven = WalkerPart::all().filter(|p| p.is_driven()).count();
        assert_eq!(driven, 13);
    }
}
