use rand::rngs::StdRng;
use rapier3d::na::Vector3;
use rapier3d::prelude::{Real, RigidBodyHandle};

use super::{Task, Tick};
use crate::actuation::TorqueActuator;
use crate::config::{
    ParameterSource, ReacherSettings, DEVIATION, DEVIATION_FREQ, GOAL_SIZE, GOAL_SPEED,
};
use crate::error::Result;
use crate::observation::ReacherIO;
use crate::registry::BodyRegistry;
use crate::reward::ReacherReward;
use crate::rig::{ReacherRig, REACH_LINK_TAG};
use crate::target::{OrbitParams, OrbitingGoal};
use crate::world::SimulationWorld;

/// Jointed arm that chases a goal orbiting its pivot.
pub struct ReacherTask {
    rig: ReacherRig,
    registry: BodyRegistry<RigidBodyHandle>,
    goal: OrbitingGoal,
    reward: ReacherReward,
    actuator: TorqueActuator,
    settings: ReacherSettings,
    last_torques: Vec<Vector3<Real>>,
}

impl ReacherTask {
    pub fn spawn(world: &mut SimulationWorld, settings: &ReacherSettings) -> Result<Self> {
        let rig = ReacherRig::spawn(
            world,
            Vector3::zeros(),
            settings.segment_count,
            settings.segment_length,
        );
        let registry = BodyRegistry::discover(world, REACH_LINK_TAG, rig.root)?;
        let goal = OrbitingGoal::new(rig.origin);
        Ok(Self {
            rig,
            registry,
            goal,
            reward: ReacherReward::default(),
            actuator: TorqueActuator::default(),
            settings: settings.clone(),
            last_torques: Vec::new(),
        })
    }

    pub fn registry(&self) -> &BodyRegistry<RigidBodyHandle> {
        &self.registry
    }

    pub fn goal(&self) -> &OrbitingGoal {
        &self.goal
    }

    /// Torques applied on the last tick, one per segment.
    pub fn last_torques(&self) -> &[Vector3<Real>] {
        &self.last_torques
    }

    /// Free end of the last segment.
    pub fn hand(&self) -> Vector3<Real> {
        let last = self.registry.len() - 1;
        self.registry.position_of(last) + self.registry.rotation_of(last) * self.rig.hand_offset()
    }

    pub fn hand_to_goal(&self) -> Real {
        (self.goal.position() - self.hand()).norm()
    }

    fn orbit_params(&self, params: &dyn ParameterSource) -> OrbitParams {
        OrbitParams {
            goal_size: params.get_with_default(GOAL_SIZE, self.settings.goal_size),
            goal_speed: params.get_with_default(GOAL_SPEED, self.settings.goal_speed),
            deviation: params.get_with_default(DEVIATION, self.settings.deviation),
            deviation_freq: params.get_with_default(DEVIATION_FREQ, self.settings.deviation_freq),
        }
    }
}

impl Task for ReacherTask {
    fn name(&self) -> &'static str {
        "reacher"
    }

    fn observation_size(&self) -> usize {
        ReacherIO::observation_size(self.registry.len())
    }

    fn action_size(&self) -> usize {
        TorqueActuator::action_size(self.registry.len())
    }

    fn reset(
        &mut self,
        world: &mut SimulationWorld,
        rng: &mut StdRng,
        params: &dyn ParameterSource,
    ) -> Result<()> {
        self.registry.restore(world)?;
        let orbit = self.orbit_params(params);
        self.goal.randomize(rng, &orbit);
        self.reward.reset_to(self.hand_to_goal());
        self.last_torques.clear();
        Ok(())
    }

    fn refresh(&mut self, world: &SimulationWorld) -> Result<()> {
        self.registry.refresh(world)
    }

    fn actuate(&mut self, world: &mut SimulationWorld, action: &[f32]) -> Result<()> {
        self.last_torques = self.actuator.apply(world, &self.registry, action)?;
        Ok(())
    }

    fn evaluate(&mut self, _world: &SimulationWorld, _rng: &mut StdRng) -> Result<Tick> {
        self.goal.advance();
        let reward = self.reward.evaluate(self.hand_to_goal());
        Ok(Tick {
            reward,
            termination: None,
        })
    }

    fn observe(&self) -> Vec<f32> {
        let sense = ReacherIO::sense(
            &self.registry,
            self.rig.origin,
            self.goal.position(),
            self.hand(),
            self.goal.speed(),
        );
        ReacherIO::flatten_sense(&sense)
    }
}
