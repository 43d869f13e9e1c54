use enum_map::{Enum, EnumMap};
use rand::rngs::StdRng;
use rand::Rng;
use rapier3d::na::Vector3;
use rapier3d::prelude::{Real, RigidBodyHandle};

use super::{Task, Tick};
use crate::actuation::JointDriveController;
use crate::config::{ParameterSource, WalkerSettings, CHEST_MASS, HIP_MASS, SPINE_MASS};
use crate::episode::Termination;
use crate::error::{ArenaError, Result};
use crate::observation::{OrientationFrame, WalkerIO, WalkerState};
use crate::physics::{BodySnapshot, PhysicsBackend};
use crate::registry::BodyRegistry;
use crate::reward::{WalkerPosture, WalkerReward, TARGET_TOUCH_REWARD};
use crate::rig::{WalkerPart, WalkerRig, WALKER_PART_TAG};
use crate::target::SpawnRadiusTarget;
use crate::world::SimulationWorld;

/// Parts whose ground contact ends the episode.
const FALL_PARTS: [WalkerPart; 3] = [WalkerPart::Head, WalkerPart::Chest, WalkerPart::Spine];

/// Ragdoll that learns to walk towards a target.
pub struct WalkerTask {
    rig: WalkerRig,
    registry: BodyRegistry<RigidBodyHandle>,
    controller: JointDriveController,
    target: SpawnRadiusTarget,
    reward: WalkerReward,
    settings: WalkerSettings,
    states: EnumMap<WalkerPart, BodySnapshot>,
    touching_ground: EnumMap<WalkerPart, bool>,
    frame: OrientationFrame,
}

impl WalkerTask {
    pub fn spawn(world: &mut SimulationWorld, settings: &WalkerSettings) -> Result<Self> {
        let rig = WalkerRig::spawn(world, Vector3::zeros());
        let registry = BodyRegistry::discover(world, WALKER_PART_TAG, rig.root)?;
        // Registry order must be the part order.
        for part in WalkerPart::all() {
            let index = part.into_usize();
            if index >= registry.len() || registry.handle(index) != rig.parts[part] {
                return Err(ArenaError::UnknownBody(format!("{part:?}")));
            }
        }

        let states = EnumMap::from_fn(|part: WalkerPart| registry.segment(part.into_usize()).state);
        let target = SpawnRadiusTarget::new(
            rig.origin,
            settings.target_spawn_radius,
            settings.target_spawn_height,
        );
        let frame = OrientationFrame::new(states[WalkerPart::Hips].position, target.position());
        Ok(Self {
            controller: JointDriveController::new(
                settings.joint_stiffness,
                settings.joint_damping,
                settings.max_joint_force_limit,
            ),
            reward: WalkerReward {
                max_speed: settings.max_speed,
                ..WalkerReward::default()
            },
            settings: settings.clone(),
            touching_ground: EnumMap::default(),
            rig,
            registry,
            target,
            states,
            frame,
        })
    }

    pub fn rig(&self) -> &WalkerRig {
        &self.rig
    }

    pub fn target(&self) -> Vector3<Real> {
        self.target.position()
    }

    pub fn part(&self, part: WalkerPart) -> &BodySnapshot {
        &self.states[part]
    }

    pub fn controller(&self) -> &JointDriveController {
        &self.controller
    }

    /// Any part within touch distance of the target on the ground plane.
    pub fn touching_target(&self) -> bool {
        self.states
            .values()
            .any(|state| self.target.within(&state.position, self.settings.target_touch_distance))
    }

    pub fn fallen(&self) -> bool {
        FALL_PARTS.iter().any(|&part| self.touching_ground[part])
    }

    /// Joint strength recorded on each segment, as a fraction of the force limit.
    pub fn normalized_strength(&self) -> EnumMap<WalkerPart, Real> {
        let limit = self.controller.max_joint_force_limit;
        EnumMap::from_fn(|part: WalkerPart| {
            match self.registry.segment(part.into_usize()).joint_strength {
                Some(strength) if limit > 0.0 => strength / limit,
                _ => 0.0,
            }
        })
    }

    fn record_strengths(&mut self) {
        for part in WalkerPart::all().filter(|p| p.is_driven()) {
            self.registry.segment_mut(part.into_usize()).joint_strength =
                Some(self.controller.drive(part).strength);
        }
    }

    fn respawn_target<R: Rng>(&mut self, rng: &mut R) {
        let parts: Vec<Vector3<Real>> = self
            .registry
            .segments()
            .iter()
            .map(|segment| segment.state.position)
            .collect();
        self.target
            .respawn_clear_of(rng, &parts, self.settings.target_touch_distance);
    }

    fn posture(&self) -> WalkerPosture {
        let head = &self.states[WalkerPart::Head];
        WalkerPosture {
            forward: self.frame.forward(),
            hips_velocity: self.states[WalkerPart::Hips].linvel,
            head_forward: head.forward(),
            head_height: head.position.y,
            left_foot_height: self.states[WalkerPart::FootL].position.y,
            right_foot_height: self.states[WalkerPart::FootR].position.y,
        }
    }

    fn set_torso_masses(
        &self,
        world: &mut SimulationWorld,
        params: &dyn ParameterSource,
    ) -> Result<()> {
        let masses = [
            (WalkerPart::Chest, CHEST_MASS, self.settings.chest_mass),
            (WalkerPart::Spine, SPINE_MASS, self.settings.spine_mass),
            (WalkerPart::Hips, HIP_MASS, self.settings.hip_mass),
        ];
        for (part, name, default) in masses {
            world.set_mass(self.rig.parts[part], params.get_with_default(name, default))?;
        }
        Ok(())
    }
}

impl Task for WalkerTask {
    fn name(&self) -> &'static str {
        "walker"
    }

    fn observation_size(&self) -> usize {
        WalkerIO::observation_size()
    }

    fn action_size(&self) -> usize {
        JointDriveController::action_size()
    }

    fn reset(
        &mut self,
        world: &mut SimulationWorld,
        rng: &mut StdRng,
        params: &dyn ParameterSource,
    ) -> Result<()> {
        self.registry.restore(world)?;
        if self.settings.random_start_yaw {
            let yaw = rng.gen_range(0.0..360.0f32).to_radians();
            self.registry.rotate_about(world, self.rig.origin, yaw)?;
        }
        self.respawn_target(rng);
        self.set_torso_masses(world, params)?;
        self.controller.relax();
        self.record_strengths();
        Ok(())
    }

    fn refresh(&mut self, world: &SimulationWorld) -> Result<()> {
        self.registry.refresh(world)?;
        let registry = &self.registry;
        self.states = EnumMap::from_fn(|part: WalkerPart| registry.segment(part.into_usize()).state);
        let parts = &self.rig.parts;
        self.touching_ground = EnumMap::from_fn(|part: WalkerPart| world.touching_ground(parts[part]));
        self.frame = OrientationFrame::new(self.states[WalkerPart::Hips].position, self.target.position());
        Ok(())
    }

    fn actuate(&mut self, world: &mut SimulationWorld, action: &[f32]) -> Result<()> {
        self.controller.apply_action(action)?;
        self.record_strengths();
        self.controller.apply(world, &self.rig.parts)
    }

    fn evaluate(&mut self, _world: &SimulationWorld, rng: &mut StdRng) -> Result<Tick> {
        let mut reward = self.reward.evaluate(&self.posture());
        let mut termination = None;

        if self.touching_target() {
            reward += TARGET_TOUCH_REWARD;
            if self.settings.respawn_target_on_touch {
                self.respawn_target(rng);
                self.frame = OrientationFrame::new(
                    self.states[WalkerPart::Hips].position,
                    self.target.position(),
                );
            } else {
                termination = Some(Termination::Success);
            }
        }
        if termination.is_none() && self.fallen() {
            reward += self.settings.fall_penalty;
            termination = Some(Termination::Failure);
        }

        Ok(Tick {
            reward,
            termination,
        })
    }

    fn observe(&self) -> Vec<f32> {
        let strength = self.normalized_strength();
        let state = WalkerState {
            frame: &self.frame,
            parts: &self.states,
            touching_ground: &self.touching_ground,
            strength: &strength,
            target: self.target.position(),
        };
        WalkerIO::flatten_sense(&WalkerIO::sense(&state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ArenaSettings, EnvironmentParameters};
    use crate::env::{Environment, WalkerEnv};
    use approx::assert_relative_eq;

    fn walker(seed: u64, random_start_yaw: bool) -> WalkerEnv {
        let mut settings = ArenaSettings::default();
        settings.seed = seed;
        settings.walker.random_start_yaw = random_start_yaw;
        WalkerEnv::from_settings(&settings).unwrap()
    }

    #[test]
    fn test_walker_sizes() {
        let mut env = walker(1, true);
        assert_eq!(env.observation_size(), 236);
        assert_eq!(env.action_size(), 39);
        assert_eq!(env.reset().unwrap().len(), 236);
        let outcome = env.step(&[0.0; 39]).unwrap();
        assert_eq!(outcome.observation.len(), 236);
        assert!(env.step(&[0.0; 38]).is_err());
    }

    #[test]
    fn test_target_spawns_within_radius() {
        let mut env = walker(2, false);
        for _ in 0..20 {
            env.reset().unwrap();
            let offset = env.task().target() - env.task().rig().origin;
            assert_relative_eq!(offset.y, 5.0);
            assert!(offset.xz().norm() <= 15.0 + 1e-4);
        }
    }

    #[test]
    fn test_reset_without_yaw_restores_spawn_pose() {
        let mut env = walker(3, false);
        env.reset().unwrap();
        let hips = *env.task().part(WalkerPart::Hips);
        for _ in 0..10 {
            env.step(&[0.8; 39]).unwrap();
        }
        env.reset().unwrap();
        let again = *env.task().part(WalkerPart::Hips);
        assert!((again.position - hips.position).norm() < 1e-6);
        assert_relative_eq!(again.linvel.norm(), 0.0);
    }

    #[test]
    fn test_start_yaw_keeps_hips_above_origin() {
        let mut env = walker(4, true);
        env.reset().unwrap();
        let hips = env.task().part(WalkerPart::Hips).position;
        assert!(hips.xz().norm() < 1e-4);
        assert_relative_eq!(hips.y, 1.06, epsilon = 1e-5);
    }

    #[test]
    fn test_torso_masses_come_from_parameters() {
        let mut params = EnvironmentParameters::new();
        params.set_parameter(CHEST_MASS, 3.0);
        let mut env = WalkerEnv::new(&ArenaSettings::default(), Box::new(params)).unwrap();
        env.reset().unwrap();
        let chest = env.task().rig().parts[WalkerPart::Chest];
        let hips = env.task().rig().parts[WalkerPart::Hips];
        assert_relative_eq!(env.world().mass_of(chest).unwrap(), 3.0, epsilon = 1e-4);
        assert_relative_eq!(env.world().mass_of(hips).unwrap(), 8.0, epsilon = 1e-4);
    }

    #[test]
    fn test_joints_stay_within_limits() {
        let mut settings = ArenaSettings::default();
        settings.seed = 7;
        settings.walker.random_start_yaw = false;
        settings.walker.target_touch_distance = 0.0;
        let mut env = WalkerEnv::from_settings(&settings).unwrap();
        env.reset().unwrap();
        for _ in 0..300 {
            env.step(&[1.0; 39]).unwrap();
        }

        // Solver compliance on the limit constraints.
        let slack = 10.0f32.to_radians();
        for part in WalkerPart::all() {
            let Some(parent) = part.parent() else {
                continue;
            };
            let local = env.task().part(parent).rotation.inverse() * env.task().part(part).rotation;
            let limits = part.spec().limits;
            let reach = limits
                .iter()
                .map(|[lo, hi]| lo.abs().max(hi.abs()).to_radians().powi(2))
                .sum::<f32>()
                .sqrt();
            assert!(
                local.angle() <= reach + slack,
                "{part:?} bent {:.1} deg",
                local.angle().to_degrees()
            );

            let free_axes = limits.iter().filter(|[lo, hi]| hi > lo).count();
            if free_axes <= 1 {
                let bend = local.scaled_axis();
                for (axis, [lo, hi]) in limits.iter().enumerate() {
                    if hi <= lo {
                        assert!(bend[axis].abs() < slack, "{part:?} turned on locked axis {axis}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_strength_is_recorded_per_segment() {
        let mut env = walker(8, false);
        env.reset().unwrap();
        let relaxed = env.task().normalized_strength();
        assert_relative_eq!(relaxed[WalkerPart::Chest], 1.0);
        assert_relative_eq!(relaxed[WalkerPart::Hips], 0.0);

        let mut action = [0.0; 39];
        action[26..].fill(-1.0);
        env.step(&action).unwrap();
        assert!(env
            .task()
            .normalized_strength()
            .iter()
            .all(|(_, strength)| *strength == 0.0));

        env.reset().unwrap();
        assert_relative_eq!(env.task().normalized_strength()[WalkerPart::ThighL], 1.0);
    }

    #[test]
    fn test_reset_target_is_out_of_reach() {
        let mut env = walker(9, true);
        for _ in 0..100 {
            env.reset().unwrap();
            assert!(!env.task().touching_target());
        }
    }

    #[test]
    fn test_touching_target_succeeds() {
        let mut env = walker(10, false);
        env.reset().unwrap();
        let origin = env.task().rig().origin;
        env.task.target = SpawnRadiusTarget::new(origin + Vector3::new(0.0, 0.0, 0.5), 0.0, 5.0);
        let outcome = env.step(&[0.0; 39]).unwrap();
        assert!(outcome.done);
        assert_eq!(outcome.termination, Some(Termination::Success));
        assert!(outcome.reward >= TARGET_TOUCH_REWARD);
    }

    #[test]
    fn test_touching_target_respawns_it() {
        let mut settings = ArenaSettings::default();
        settings.seed = 11;
        settings.walker.random_start_yaw = false;
        settings.walker.respawn_target_on_touch = true;
        let mut env = WalkerEnv::from_settings(&settings).unwrap();
        env.reset().unwrap();
        let origin = env.task().rig().origin;
        let placed = origin + Vector3::new(0.0, 5.0, 0.5);
        env.task.target = SpawnRadiusTarget::new(origin + Vector3::new(0.0, 0.0, 0.5), 0.0, 5.0);
        assert!((env.task().target() - placed).norm() < 1e-6);

        let outcome = env.step(&[0.0; 39]).unwrap();
        assert!(!outcome.done);
        assert_eq!(outcome.termination, None);
        assert!(outcome.reward >= TARGET_TOUCH_REWARD);
        assert!((env.task().target() - placed).norm() > 1e-3);
        assert!(!env.task().touching_target());
    }

    #[test]
    fn test_fall_ends_episode() {
        let mut settings = ArenaSettings::default();
        settings.seed = 5;
        settings.walker.random_start_yaw = false;
        settings.walker.target_touch_distance = 0.0;
        settings.walker.fall_penalty = -1.0;
        let mut env = WalkerEnv::from_settings(&settings).unwrap();
        env.reset().unwrap();
        // No drive strength: the ragdoll collapses.
        let mut action = [0.0; 39];
        action[26..].fill(-1.0);
        let mut ended = None;
        for _ in 0..500 {
            let outcome = env.step(&action).unwrap();
            if outcome.done {
                ended = Some(outcome);
                break;
            }
        }
        let outcome = ended.expect("ragdoll never fell");
        assert_eq!(outcome.termination, Some(Termination::Failure));
        assert!(outcome.reward < 0.0);
    }
}
