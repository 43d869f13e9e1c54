//! Turning policy actions into torques and forces on the physics backend.

use enum_map::EnumMap;
use rapier3d::na::Vector3;
use rapier3d::prelude::Real;

use crate::error::{ArenaError, Result};
use crate::physics::{JointMotor, PhysicsBackend};
use crate::registry::BodyRegistry;
use crate::rig::WalkerPart;

pub const MAX_TORQUE: Real = 150.0;
pub const TORQUE_COMPONENTS_PER_SEGMENT: usize = 2;

/// Clamp a continuous action component to [-1, 1]; NaN is rejected.
pub fn clamp_unit(value: f32, index: usize) -> Result<Real> {
    if value.is_nan() {
        return Err(ArenaError::InvalidAction { index, value });
    }
    Ok(value.clamp(-1.0, 1.0))
}

/// Applies `(x, 0, z)` torques to every registered segment.
///
/// Segment `i` reads components `2i` and `2i + 1`.
#[derive(Debug, Clone, Copy)]
pub struct TorqueActuator {
    pub scale: Real,
}

impl Default for TorqueActuator {
    fn default() -> Self {
        Self { scale: MAX_TORQUE }
    }
}

impl TorqueActuator {
    pub fn action_size(segments: usize) -> usize {
        segments * TORQUE_COMPONENTS_PER_SEGMENT
    }

    /// Torques the action maps to, without touching the backend.
    pub fn torques(&self, action: &[f32], segments: usize) -> Result<Vec<Vector3<Real>>> {
        let expected = Self::action_size(segments);
        if action.len() != expected {
            return Err(ArenaError::action_length(expected, action.len()));
        }
        action
            .chunks_exact(TORQUE_COMPONENTS_PER_SEGMENT)
            .enumerate()
            .map(|(i, pair)| {
                let x = clamp_unit(pair[0], 2 * i)? * self.scale;
                let z = clamp_unit(pair[1], 2 * i + 1)? * self.scale;
                Ok(Vector3::new(x, 0.0, z))
            })
            .collect()
    }

    /// Apply the action and return the torques that were applied, in registry order.
    pub fn apply<B: PhysicsBackend>(
        &self,
        backend: &mut B,
        registry: &BodyRegistry<B::Handle>,
        action: &[f32],
    ) -> Result<Vec<Vector3<Real>>> {
        let torques = self.torques(action, registry.len())?;
        for (segment, torque) in registry.segments().iter().zip(&torques) {
            backend.apply_torque(segment.handle, *torque)?;
        }
        Ok(torques)
    }
}

/// Target rotation and strength of one walker joint.
#[derive(Debug, Clone, Copy, Default)]
pub struct JointDrive {
    /// Target Euler angles (radians) relative to the parent part.
    pub target: Vector3<Real>,
    /// Maximum torque the motor may exert per axis.
    pub strength: Real,
}

/// Target-axis count for each driven walker part, in action order.
pub const WALKER_TARGET_LAYOUT: [(WalkerPart, usize); 13] = [
    (WalkerPart::Chest, 3),
    (WalkerPart::Spine, 3),
    (WalkerPart::ThighL, 2),
    (WalkerPart::ThighR, 2),
    (WalkerPart::ShinL, 1),
    (WalkerPart::ShinR, 1),
    (WalkerPart::FootR, 3),
    (WalkerPart::FootL, 3),
    (WalkerPart::ArmL, 2),
    (WalkerPart::ArmR, 2),
    (WalkerPart::ForearmL, 1),
    (WalkerPart::ForearmR, 1),
    (WalkerPart::Head, 2),
];

/// Parts whose strength is set by the trailing action components, in action order.
pub const WALKER_STRENGTH_LAYOUT: [WalkerPart; 13] = [
    WalkerPart::Chest,
    WalkerPart::Spine,
    WalkerPart::Head,
    WalkerPart::ThighL,
    WalkerPart::ShinL,
    WalkerPart::FootL,
    WalkerPart::ThighR,
    WalkerPart::ShinR,
    WalkerPart::FootR,
    WalkerPart::ArmL,
    WalkerPart::ForearmL,
    WalkerPart::ArmR,
    WalkerPart::ForearmR,
];

/// Position targets and strengths for the walker's joint motors.
#[derive(Debug, Clone)]
pub struct JointDriveController {
    pub stiffness: Real,
    pub damping: Real,
    pub max_joint_force_limit: Real,
    drives: EnumMap<WalkerPart, JointDrive>,
}

impl JointDriveController {
    pub fn new(stiffness: Real, damping: Real, max_joint_force_limit: Real) -> Self {
        let mut controller = Self {
            stiffness,
            damping,
            max_joint_force_limit,
            drives: EnumMap::default(),
        };
        controller.relax();
        controller
    }

    pub fn action_size() -> usize {
        let targets: usize = WALKER_TARGET_LAYOUT.iter().map(|(_, axes)| axes).sum();
        targets + WALKER_STRENGTH_LAYOUT.len()
    }

    /// Neutral targets at full strength.
    pub fn relax(&mut self) {
        let strength = self.max_joint_force_limit;
        for (part, drive) in self.drives.iter_mut() {
            let neutral = Vector3::from_fn(|axis, _| {
                let [lo, hi] = part.spec().limits[axis];
                lerp(lo, hi, 0.5).to_radians()
            });
            *drive = JointDrive {
                target: neutral,
                strength,
            };
        }
    }

    pub fn drive(&self, part: WalkerPart) -> &JointDrive {
        &self.drives[part]
    }

    /// Map each component from [-1, 1] onto the joint's angular range.
    pub fn set_joint_target_rotation(&mut self, part: WalkerPart, x: Real, y: Real, z: Real) {
        let limits = part.spec().limits;
        let components = [x, y, z];
        let target = Vector3::from_fn(|axis, _| {
            let t = (components[axis].clamp(-1.0, 1.0) + 1.0) * 0.5;
            let [lo, hi] = limits[axis];
            lerp(lo, hi, t).to_radians()
        });
        self.drives[part].target = target;
    }

    /// Map [-1, 1] onto [0, max_joint_force_limit].
    pub fn set_joint_strength(&mut self, part: WalkerPart, strength: Real) {
        self.drives[part].strength =
            (strength.clamp(-1.0, 1.0) + 1.0) * 0.5 * self.max_joint_force_limit;
    }

    /// Decode a full walker action vector into joint targets and strengths.
    pub fn apply_action(&mut self, action: &[f32]) -> Result<()> {
        let expected = Self::action_size();
        if action.len() != expected {
            return Err(ArenaError::action_length(expected, action.len()));
        }
        if let Some(index) = action.iter().position(|v| v.is_nan()) {
            return Err(ArenaError::InvalidAction {
                index,
                value: action[index],
            });
        }

        let mut i = 0;
        for (part, axes) in WALKER_TARGET_LAYOUT {
            let mut components = [0.0; 3];
            components[..axes].copy_from_slice(&action[i..i + axes]);
            i += axes;
            self.set_joint_target_rotation(part, components[0], components[1], components[2]);
        }
        for part in WALKER_STRENGTH_LAYOUT {
            self.set_joint_strength(part, action[i]);
            i += 1;
        }
        Ok(())
    }

    /// Motor command for one part's joint.
    pub fn motor(&self, part: WalkerPart) -> JointMotor {
        let drive = &self.drives[part];
        JointMotor {
            target: drive.target,
            stiffness: self.stiffness,
            damping: self.damping,
            max_force: drive.strength,
        }
    }

    /// Push every driven joint's target and strength to the backend's joint motors.
    pub fn apply<B: PhysicsBackend>(
        &self,
        backend: &mut B,
        parts: &EnumMap<WalkerPart, B::Handle>,
    ) -> Result<()> {
        for part in WalkerPart::all().filter(|p| p.is_driven()) {
            backend.drive_joint(parts[part], &self.motor(part))?;
        }
        Ok(())
    }
}

/// Discrete two-branch control of the ball: branch 0 pushes along -x, branch 1 picks
/// none / -z / +z.
#[derive(Debug, Clone, Copy)]
pub struct BallActuator {
    pub speed: Real,
    /// Force is only applied while the ball's local x is above this.
    pub min_x: Real,
}

impl Default for BallActuator {
    fn default() -> Self {
        Self {
            speed: 40.0,
            min_x: -0.7,
        }
    }
}

impl BallActuator {
    /// Choices per branch: x push, z push.
    pub const BRANCHES: [u32; 2] = [2, 3];

    pub fn action_size() -> usize {
        Self::BRANCHES.len()
    }

    pub fn control_signal(&self, action: &[f32]) -> Result<Vector3<Real>> {
        if action.len() != Self::action_size() {
            return Err(ArenaError::action_length(Self::action_size(), action.len()));
        }
        let x = match branch(action[0], 0)? {
            0 => 0.0,
            1 => -1.0,
            _ => return Err(ArenaError::InvalidAction { index: 0, value: action[0] }),
        };
        let z = match branch(action[1], 1)? {
            0 => 0.0,
            1 => -1.0,
            2 => 1.0,
            _ => return Err(ArenaError::InvalidAction { index: 1, value: action[1] }),
        };
        Ok(Vector3::new(x, 0.0, z))
    }

    /// Apply the decoded force; returns the force that was applied.
    pub fn apply<B: PhysicsBackend>(
        &self,
        backend: &mut B,
        ball: B::Handle,
        local_position: &Vector3<Real>,
        action: &[f32],
    ) -> Result<Vector3<Real>> {
        let signal = self.control_signal(action)?;
        if local_position.x <= self.min_x {
            return Ok(Vector3::zeros());
        }
        let force = signal * self.speed;
        backend.apply_force(ball, force)?;
        Ok(force)
    }
}

fn branch(value: f32, index: usize) -> Result<u32> {
    if !value.is_finite() || value < 0.0 || (value - value.round()).abs() > 1e-3 {
        return Err(ArenaError::InvalidAction { index, value });
    }
    Ok(value.round() as u32)
}

fn lerp(a: Real, b: Real, t: Real) -> Real {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rig::{ReacherRig, REACH_LINK_TAG};
    use crate::world::SimulationWorld;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;
    use rapier3d::prelude::vector;

    #[test]
    fn test_torque_is_bounded_for_any_input() {
        let actuator = TorqueActuator::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let scale: f32 = rng.gen_range(0.0..1.0e6);
            let action: Vec<f32> = (0..6).map(|_| rng.gen_range(-1.0..1.0) * scale).collect();
            let torques = actuator.torques(&action, 3).unwrap();
            for torque in torques {
                assert!(torque.x.abs() <= MAX_TORQUE);
                assert!(torque.z.abs() <= MAX_TORQUE);
                assert_eq!(torque.y, 0.0);
            }
        }
        let extreme = actuator.torques(&[f32::INFINITY, f32::NEG_INFINITY], 1).unwrap();
        assert_eq!(extreme[0], Vector3::new(150.0, 0.0, -150.0));
    }

    #[test]
    fn test_torques_index_per_segment() {
        let actuator = TorqueActuator::default();
        let torques = actuator.torques(&[0.1, 0.2, -0.3, -0.4], 2).unwrap();
        assert_relative_eq!(torques[0].x, 15.0, epsilon = 1e-4);
        assert_relative_eq!(torques[0].z, 30.0, epsilon = 1e-4);
        assert_relative_eq!(torques[1].x, -45.0, epsilon = 1e-4);
        assert_relative_eq!(torques[1].z, -60.0, epsilon = 1e-4);
    }

    #[test]
    fn test_action_length_mismatch_is_fatal() {
        let mut world = SimulationWorld::new();
        let rig = ReacherRig::spawn(&mut world, vector![0.0, 0.0, 0.0], 2, 4.0);
        let registry = BodyRegistry::discover(&world, REACH_LINK_TAG, rig.root).unwrap();
        let err = TorqueActuator::default()
            .apply(&mut world, &registry, &[0.5, 0.5])
            .unwrap_err();
        assert!(matches!(err, ArenaError::ActionLength { expected: 4, actual: 2 }));
    }

    #[test]
    fn test_nan_action_is_rejected() {
        let err = TorqueActuator::default().torques(&[f32::NAN, 0.0], 1).unwrap_err();
        assert!(matches!(err, ArenaError::InvalidAction { index: 0, .. }));
    }

    #[test]
    fn test_walker_action_size() {
        assert_eq!(JointDriveController::action_size(), 39);
    }

    #[test]
    fn test_joint_target_maps_onto_limits() {
        let mut controller = JointDriveController::new(8.0, 0.2, 50.0);
        controller.set_joint_target_rotation(WalkerPart::ThighL, -1.0, 1.0, 0.0);
        let target = controller.drive(WalkerPart::ThighL).target;
        assert_relative_eq!(target.x, (-90.0f32).to_radians(), epsilon = 1e-5);
        assert_relative_eq!(target.y, 20.0f32.to_radians(), epsilon = 1e-5);
        assert_relative_eq!(target.z, 0.0);

        controller.set_joint_strength(WalkerPart::ThighL, 0.0);
        assert_relative_eq!(controller.drive(WalkerPart::ThighL).strength, 25.0);
        controller.set_joint_strength(WalkerPart::ThighL, 3.0);
        assert_relative_eq!(controller.drive(WalkerPart::ThighL).strength, 50.0);
    }

    #[test]
    fn test_walker_action_decoding_order() {
        let mut controller = JointDriveController::new(8.0, 0.2, 50.0);
        let mut action = vec![0.0; 39];
        // Head strength is the third strength component.
        action[26 + 2] = -1.0;
        controller.apply_action(&action).unwrap();
        assert_relative_eq!(controller.drive(WalkerPart::Head).strength, 0.0);
        assert_relative_eq!(controller.drive(WalkerPart::Chest).strength, 25.0);
        assert!(controller.apply_action(&action[..38]).is_err());
    }

    #[test]
    fn test_motor_carries_target_and_strength() {
        let mut controller = JointDriveController::new(400.0, 40.0, 10.0);
        controller.set_joint_target_rotation(WalkerPart::ShinL, 1.0, 0.0, 0.0);
        controller.set_joint_strength(WalkerPart::ShinL, 0.0);
        let motor = controller.motor(WalkerPart::ShinL);
        assert_relative_eq!(motor.target.x, 120.0f32.to_radians(), epsilon = 1e-5);
        assert_relative_eq!(motor.max_force, 5.0);
        assert_relative_eq!(motor.stiffness, 400.0);
        assert_relative_eq!(motor.damping, 40.0);
    }

    #[test]
    fn test_ball_control_signal() {
        let actuator = BallActuator::default();
        assert_eq!(actuator.control_signal(&[1.0, 2.0]).unwrap(), Vector3::new(-1.0, 0.0, 1.0));
        assert_eq!(actuator.control_signal(&[0.0, 1.0]).unwrap(), Vector3::new(0.0, 0.0, -1.0));
        assert!(actuator.control_signal(&[2.0, 0.0]).is_err());
        assert!(actuator.control_signal(&[0.5, 0.0]).is_err());
        assert!(actuator.control_signal(&[0.0]).is_err());
    }
}
