use rand::rngs::StdRng;
use rapier3d::na::Vector3;
use rapier3d::prelude::{Real, RigidBodyHandle};

use super::{ActionSpace, Task, Tick};
use crate::actuation::BallActuator;
use crate::config::{BallSettings, ParameterSource};
use crate::episode::Termination;
use crate::error::Result;
use crate::observation::{BallIO, BallSense};
use crate::registry::BodyRegistry;
use crate::reward::{BallReward, BALL_SUCCESS_REWARD};
use crate::rig::{BallRig, BALL_RADIUS, BALL_TAG};
use crate::target::BallTarget;
use crate::world::SimulationWorld;

/// Top surface of the platform the ball rolls on.
pub const PLATFORM_TOP: Real = 0.25 - BALL_RADIUS;
/// Local spawn point of the ball.
pub const BALL_START: [Real; 3] = [0.65, 0.25, 0.0];
/// Below this local height the ball has left the platform.
pub const FALL_HEIGHT: Real = -0.1;

/// Ball pushed around a platform towards a target.
pub struct BallTask {
    rig: BallRig,
    registry: BodyRegistry<RigidBodyHandle>,
    target: BallTarget,
    actuator: BallActuator,
    reward: BallReward,
    last_force: Vector3<Real>,
}

impl BallTask {
    pub fn spawn(world: &mut SimulationWorld, settings: &BallSettings) -> Result<Self> {
        let rig = BallRig::spawn(world, Vector3::zeros(), Vector3::from(BALL_START));
        let registry = BodyRegistry::discover(world, BALL_TAG, rig.root)?;
        Ok(Self {
            target: BallTarget::new(rig.origin),
            actuator: BallActuator {
                speed: settings.speed,
                ..BallActuator::default()
            },
            reward: BallReward::default(),
            last_force: Vector3::zeros(),
            rig,
            registry,
        })
    }

    pub fn ball(&self) -> RigidBodyHandle {
        self.rig.ball
    }

    pub fn ball_local(&self) -> Vector3<Real> {
        self.registry.position_of(0) - self.rig.origin
    }

    pub fn target(&self) -> Vector3<Real> {
        self.target.position()
    }

    pub fn last_force(&self) -> Vector3<Real> {
        self.last_force
    }
}

impl Task for BallTask {
    fn name(&self) -> &'static str {
        "ball"
    }

    fn observation_size(&self) -> usize {
        BallIO::observation_size()
    }

    fn action_size(&self) -> usize {
        BallActuator::action_size()
    }

    fn action_space(&self) -> ActionSpace {
        ActionSpace::Discrete(BallActuator::BRANCHES.to_vec())
    }

    fn reset(
        &mut self,
        world: &mut SimulationWorld,
        rng: &mut StdRng,
        _params: &dyn ParameterSource,
    ) -> Result<()> {
        self.registry.restore(world)?;
        self.target.respawn(rng);
        self.last_force = Vector3::zeros();
        Ok(())
    }

    fn refresh(&mut self, world: &SimulationWorld) -> Result<()> {
        self.registry.refresh(world)
    }

    fn actuate(&mut self, world: &mut SimulationWorld, action: &[f32]) -> Result<()> {
        let local = self.ball_local();
        self.last_force = self
            .actuator
            .apply(world, self.registry.handle(0), &local, action)?;
        Ok(())
    }

    fn evaluate(&mut self, _world: &SimulationWorld, _rng: &mut StdRng) -> Result<Tick> {
        let distance = (self.registry.position_of(0) - self.target.position()).norm();
        let tick = if self.reward.reached(distance) {
            Tick {
                reward: BALL_SUCCESS_REWARD,
                termination: Some(Termination::Success),
            }
        } else if self.ball_local().y < FALL_HEIGHT {
            Tick {
                reward: 0.0,
                termination: Some(Termination::Failure),
            }
        } else {
            Tick::default()
        };
        Ok(tick)
    }

    fn observe(&self) -> Vec<f32> {
        let sense = BallSense {
            target_local: self.target.position() - self.rig.origin,
            ball_local: self.ball_local(),
            velocity: self.registry.velocity_of(0),
        };
        BallIO::flatten_sense(&sense)
    }
}
