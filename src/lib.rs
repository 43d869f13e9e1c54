mod actuation;
mod config;
mod env;
mod episode;
mod error;
mod observation;
mod physics;
mod registry;
mod reward;
mod rig;
mod rollout;
mod target;
mod world;

// Re-export public items
pub use actuation::{
    BallActuator, JointDrive, JointDriveController, TorqueActuator, MAX_TORQUE,
    WALKER_STRENGTH_LAYOUT, WALKER_TARGET_LAYOUT,
};
pub use config::{
    ArenaSettings, BallSettings, EnvironmentParameters, ParameterSource, ReacherSettings,
    WalkerSettings, CHEST_MASS, DEVIATION, DEVIATION_FREQ, GOAL_SIZE, GOAL_SPEED, HIP_MASS,
    SPINE_MASS,
};
pub use env::{
    ActionSpace, Arena, BallEnv, BallTask, Environment, ReacherEnv, ReacherTask, Task, Tick,
    WalkerEnv, WalkerTask,
};
pub use episode::{EpisodePhase, EpisodeState, EpisodeSummary, StepOutcome, Termination};
pub use error::{ArenaError, Result};
pub use observation::{
    BallIO, BallSense, OrientationFrame, PartSense, ReacherIO, ReacherSense, SegmentSense,
    WalkerIO, WalkerSense, WalkerState,
};
pub use physics::{BodySnapshot, JointMotor, PhysicsBackend, RootId, FIXED_TIME_STEP, GRAVITY_Y};
pub use registry::{BodyRegistry, BodySegment};
pub use reward::{BallReward, ReacherReward, WalkerPosture, WalkerReward, WalkerRewardTerms};
pub use rig::{
    BallRig, PartShape, PartSpec, ReacherRig, WalkerPart, WalkerRig, BALL_TAG, REACH_LINK_TAG,
    WALKER_PART_TAG,
};
pub use rollout::{
    parallel_rollouts, run_episodes, ConstantPolicy, Policy, RandomPolicy, Trajectory,
};
pub use target::{BallTarget, OrbitParams, OrbitingGoal, SpawnRadiusTarget, ORBIT_RADIUS};
pub use world::SimulationWorld;
