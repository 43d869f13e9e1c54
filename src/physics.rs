use rapier3d::na::{UnitQuaternion, Vector3};
use rapier3d::prelude::Real;

use crate::error::Result;

// Simulation constants
pub const FIXED_TIME_STEP: Real = 1.0 / 50.0;
pub const GRAVITY_Y: Real = -9.81;

// Ground
pub const FLOOR_HALF_EXTENT: Real = 50.0;
pub const FLOOR_THICKNESS: Real = 0.5;

/// Identifies the agent root a body hangs under.
pub type RootId = u32;

/// Kinematic state of a single rigid body at the current tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodySnapshot {
    pub position: Vector3<Real>,
    pub rotation: UnitQuaternion<Real>,
    pub linvel: Vector3<Real>,
    pub angvel: Vector3<Real>,
}

impl BodySnapshot {
    pub fn at_rest(position: Vector3<Real>, rotation: UnitQuaternion<Real>) -> Self {
        Self {
            position,
            rotation,
            linvel: Vector3::zeros(),
            angvel: Vector3::zeros(),
        }
    }

    /// Local +Z axis in world space.
    pub fn forward(&self) -> Vector3<Real> {
        self.rotation * Vector3::z()
    }

    pub fn is_finite(&self) -> bool {
        let q = self.rotation.quaternion();
        self.position.iter().all(|v| v.is_finite())
            && self.linvel.iter().all(|v| v.is_finite())
            && self.angvel.iter().all(|v| v.is_finite())
            && q.coords.iter().all(|v| v.is_finite())
    }
}

/// Position motor on a limited joint, one target per angular axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointMotor {
    /// Target angles (radians) around the joint's local x, y, z.
    pub target: Vector3<Real>,
    pub stiffness: Real,
    pub damping: Real,
    /// Cap on the torque the motor exerts on each axis.
    pub max_force: Real,
}

/// The physics engine as seen by the environments.
///
/// Forces and torques applied through this trait last for exactly one call to
/// [`PhysicsBackend::step`].
pub trait PhysicsBackend {
    type Handle: Copy + Eq + std::fmt::Debug;

    /// All bodies carrying `tag`, in insertion order, regardless of owner.
    fn tagged_bodies(&self, tag: &str) -> Vec<Self::Handle>;

    /// Root ancestry of a body.
    fn root_of(&self, body: Self::Handle) -> Option<RootId>;

    fn snapshot(&self, body: Self::Handle) -> Option<BodySnapshot>;

    fn set_pose(
        &mut self,
        body: Self::Handle,
        position: Vector3<Real>,
        rotation: UnitQuaternion<Real>,
    ) -> Result<()>;

    fn set_velocities(
        &mut self,
        body: Self::Handle,
        linvel: Vector3<Real>,
        angvel: Vector3<Real>,
    ) -> Result<()>;

    fn apply_torque(&mut self, body: Self::Handle, torque: Vector3<Real>) -> Result<()>;

    fn apply_force(&mut self, body: Self::Handle, force: Vector3<Real>) -> Result<()>;

    fn set_mass(&mut self, body: Self::Handle, mass: Real) -> Result<()>;

    fn mass_of(&self, body: Self::Handle) -> Option<Real>;

    /// Drive the free angular axes of the joint attaching `body` to its parent.
    fn drive_joint(&mut self, body: Self::Handle, motor: &JointMotor) -> Result<()>;

    /// Whether the body currently has an active contact with the ground.
    fn touching_ground(&self, body: Self::Handle) -> bool;

    /// Advance the simulation by one fixed time step.
    fn step(&mut self);
}
