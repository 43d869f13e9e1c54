use rapier3d::na::{UnitQuaternion, Vector3};
use rapier3d::prelude::*;

use crate::error::{ArenaError, Result};
use crate::physics::{
    BodySnapshot, JointMotor, PhysicsBackend, RootId, FIXED_TIME_STEP, FLOOR_HALF_EXTENT,
    FLOOR_THICKNESS, GRAVITY_Y,
};

// Part physics properties
pub const PART_LINEAR_DAMPING: Real = 0.05;
pub const PART_ANGULAR_DAMPING: Real = 0.5;
pub const PART_FRICTION: Real = 0.9;

const ANGULAR_AXES: [(JointAxis, JointAxesMask); 3] = [
    (JointAxis::AngX, JointAxesMask::ANG_X),
    (JointAxis::AngY, JointAxesMask::ANG_Y),
    (JointAxis::AngZ, JointAxesMask::ANG_Z),
];

#[derive(Debug, Clone)]
struct TaggedBody {
    handle: RigidBodyHandle,
    collider: ColliderHandle,
    tag: String,
    root: RootId,
    /// Joint attaching this body to its parent.
    joint: Option<ImpulseJointHandle>,
}

/// Rapier3d scene holding any number of agent rigs.
pub struct SimulationWorld {
    pipeline: PhysicsPipeline,
    gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: BroadPhaseBvh,
    narrow_phase: NarrowPhase,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    tagged: Vec<TaggedBody>,
    ground: Option<ColliderHandle>,
    next_root: RootId,
    time: Real,
}

impl Default for SimulationWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationWorld {
    /// Empty world with gravity and no floor.
    pub fn new() -> Self {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = FIXED_TIME_STEP;

        Self {
            pipeline: PhysicsPipeline::new(),
            gravity: vector![0.0, GRAVITY_Y, 0.0],
            integration_parameters,
            island_manager: IslandManager::new(),
            broad_phase: BroadPhaseBvh::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            tagged: Vec::new(),
            ground: None,
            next_root: 0,
            time: 0.0,
        }
    }

    /// World with a static floor whose top surface sits at `height`.
    pub fn with_floor(height: Real) -> Self {
        Self::with_platform(height, FLOOR_HALF_EXTENT)
    }

    /// Square static platform; bodies can roll off its edges.
    pub fn with_platform(height: Real, half_extent: Real) -> Self {
        let mut world = Self::new();
        let floor_body = RigidBodyBuilder::fixed()
            .translation(vector![0.0, height - FLOOR_THICKNESS, 0.0])
            .build();
        let floor_handle = world.rigid_body_set.insert(floor_body);
        let floor_collider =
            ColliderBuilder::cuboid(half_extent, FLOOR_THICKNESS, half_extent)
                .restitution(0.0)
                .friction(PART_FRICTION)
                .build();
        let collider = world.collider_set.insert_with_parent(
            floor_collider,
            floor_handle,
            &mut world.rigid_body_set,
        );
        world.ground = Some(collider);
        world
    }

    /// Allocate a new agent root. Bodies spawned under it share root ancestry.
    pub fn spawn_root(&mut self) -> RootId {
        let root = self.next_root;
        self.next_root += 1;
        root
    }

    pub fn time(&self) -> Real {
        self.time
    }

    pub fn body_count(&self) -> usize {
        self.tagged.len()
    }

    /// Static body used as the pivot of a hanging chain.
    pub fn insert_anchor(&mut self, center: Vector<Real>) -> RigidBodyHandle {
        self.rigid_body_set
            .insert(RigidBodyBuilder::fixed().translation(center).build())
    }

    /// Dynamic capsule aligned with the local Y axis.
    pub fn insert_capsule_part(
        &mut self,
        tag: &str,
        root: RootId,
        center: Vector<Real>,
        half_height: Real,
        radius: Real,
        mass: Real,
    ) -> RigidBodyHandle {
        let collider = ColliderBuilder::capsule_y(half_height, radius);
        self.insert_part(tag, root, center, collider, mass)
    }

    pub fn insert_box_part(
        &mut self,
        tag: &str,
        root: RootId,
        center: Vector<Real>,
        half_extents: [Real; 3],
        mass: Real,
    ) -> RigidBodyHandle {
        let collider = ColliderBuilder::cuboid(half_extents[0], half_extents[1], half_extents[2]);
        self.insert_part(tag, root, center, collider, mass)
    }

    pub fn insert_ball_part(
        &mut self,
        tag: &str,
        root: RootId,
        center: Vector<Real>,
        radius: Real,
        mass: Real,
    ) -> RigidBodyHandle {
        let collider = ColliderBuilder::ball(radius).restitution(0.1);
        self.insert_part(tag, root, center, collider, mass)
    }

    fn insert_part(
        &mut self,
        tag: &str,
        root: RootId,
        center: Vector<Real>,
        collider: ColliderBuilder,
        mass: Real,
    ) -> RigidBodyHandle {
        let body = RigidBodyBuilder::dynamic()
            .translation(center)
            .linear_damping(PART_LINEAR_DAMPING)
            .angular_damping(PART_ANGULAR_DAMPING)
            .build();
        let handle = self.rigid_body_set.insert(body);
        let collider = collider.mass(mass).friction(PART_FRICTION).build();
        let collider = self
            .collider_set
            .insert_with_parent(collider, handle, &mut self.rigid_body_set);
        self.tagged.push(TaggedBody {
            handle,
            collider,
            tag: tag.to_string(),
            root,
            joint: None,
        });
        handle
    }

    /// Ball-and-socket joint between two bodies; the pair does not collide.
    pub fn spherical_joint(
        &mut self,
        parent: RigidBodyHandle,
        child: RigidBodyHandle,
        anchor_parent: Point<Real>,
        anchor_child: Point<Real>,
    ) -> ImpulseJointHandle {
        let joint = SphericalJointBuilder::new()
            .local_anchor1(anchor_parent)
            .local_anchor2(anchor_child)
            .contacts_enabled(false)
            .build();
        let handle = self.impulse_joint_set.insert(parent, child, joint, true);
        self.attach_joint(child, handle);
        handle
    }

    /// Joint with per-axis angular limits (radians) and force-based position motors.
    ///
    /// Axes whose range is empty are locked; translation is always locked.
    pub fn limited_joint(
        &mut self,
        parent: RigidBodyHandle,
        child: RigidBodyHandle,
        anchor_parent: Point<Real>,
        anchor_child: Point<Real>,
        limits: [[Real; 2]; 3],
    ) -> ImpulseJointHandle {
        let mut locked = JointAxesMask::LIN_AXES;
        for ((_, mask), [lo, hi]) in ANGULAR_AXES.iter().zip(limits) {
            if hi - lo <= Real::EPSILON {
                locked |= *mask;
            }
        }

        let mut joint = GenericJointBuilder::new(locked)
            .local_anchor1(anchor_parent)
            .local_anchor2(anchor_child)
            .contacts_enabled(false);
        for ((axis, mask), range) in ANGULAR_AXES.iter().zip(limits) {
            if !locked.contains(*mask) {
                joint = joint
                    .limits(*axis, range)
                    .motor_model(*axis, MotorModel::ForceBased);
            }
        }
        let handle = self
            .impulse_joint_set
            .insert(parent, child, joint.build(), true);
        self.attach_joint(child, handle);
        handle
    }

    fn attach_joint(&mut self, child: RigidBodyHandle, joint: ImpulseJointHandle) {
        if let Some(entry) = self.tagged.iter_mut().find(|t| t.handle == child) {
            entry.joint = Some(joint);
        }
    }

    fn entry(&self, body: RigidBodyHandle) -> Option<&TaggedBody> {
        self.tagged.iter().find(|t| t.handle == body)
    }

    fn body_mut(&mut self, body: RigidBodyHandle) -> Result<&mut RigidBody> {
        self.rigid_body_set
            .get_mut(body)
            .ok_or_else(|| ArenaError::UnknownBody(format!("{body:?}")))
    }
}

impl PhysicsBackend for SimulationWorld {
    type Handle = RigidBodyHandle;

    fn tagged_bodies(&self, tag: &str) -> Vec<RigidBodyHandle> {
        self.tagged
            .iter()
            .filter(|t| t.tag == tag)
            .map(|t| t.handle)
            .collect()
    }

    fn root_of(&self, body: RigidBodyHandle) -> Option<RootId> {
        self.entry(body).map(|t| t.root)
    }

    fn snapshot(&self, body: RigidBodyHandle) -> Option<BodySnapshot> {
        self.rigid_body_set.get(body).map(|rb| BodySnapshot {
            position: *rb.translation(),
            rotation: *rb.rotation(),
            linvel: *rb.linvel(),
            angvel: *rb.angvel(),
        })
    }

    fn set_pose(
        &mut self,
        body: RigidBodyHandle,
        position: Vector3<Real>,
        rotation: UnitQuaternion<Real>,
    ) -> Result<()> {
        let rb = self.body_mut(body)?;
        rb.set_translation(position, true);
        rb.set_rotation(rotation, true);
        Ok(())
    }

    fn set_velocities(
        &mut self,
        body: RigidBodyHandle,
        linvel: Vector3<Real>,
        angvel: Vector3<Real>,
    ) -> Result<()> {
        let rb = self.body_mut(body)?;
        rb.set_linvel(linvel, true);
        rb.set_angvel(angvel, true);
        Ok(())
    }

    fn apply_torque(&mut self, body: RigidBodyHandle, torque: Vector3<Real>) -> Result<()> {
        self.body_mut(body)?.add_torque(torque, true);
        Ok(())
    }

    fn apply_force(&mut self, body: RigidBodyHandle, force: Vector3<Real>) -> Result<()> {
        self.body_mut(body)?.add_force(force, true);
        Ok(())
    }

    fn set_mass(&mut self, body: RigidBodyHandle, mass: Real) -> Result<()> {
        let collider = self
            .entry(body)
            .map(|t| t.collider)
            .ok_or_else(|| ArenaError::UnknownBody(format!("{body:?}")))?;
        let collider = self
            .collider_set
            .get_mut(collider)
            .ok_or_else(|| ArenaError::UnknownBody(format!("{body:?}")))?;
        collider.set_mass(mass);
        self.body_mut(body)?.wake_up(true);
        Ok(())
    }

    fn mass_of(&self, body: RigidBodyHandle) -> Option<Real> {
        let entry = self.entry(body)?;
        self.collider_set.get(entry.collider).map(|c| c.mass())
    }

    fn drive_joint(&mut self, body: RigidBodyHandle, motor: &JointMotor) -> Result<()> {
        let handle = self
            .entry(body)
            .and_then(|t| t.joint)
            .ok_or_else(|| ArenaError::UnknownBody(format!("no joint on {body:?}")))?;
        let joint = self
            .impulse_joint_set
            .get_mut(handle, true)
            .ok_or_else(|| ArenaError::UnknownBody(format!("{handle:?}")))?;
        for (i, (axis, mask)) in ANGULAR_AXES.iter().enumerate() {
            if joint.data.locked_axes.contains(*mask) {
                continue;
            }
            joint
                .data
                .set_motor_position(*axis, motor.target[i], motor.stiffness, motor.damping)
                .set_motor_max_force(*axis, motor.max_force);
        }
        Ok(())
    }

    fn touching_ground(&self, body: RigidBodyHandle) -> bool {
        let (Some(ground), Some(entry)) = (self.ground, self.entry(body)) else {
            return false;
        };
        self.narrow_phase
            .contact_pair(entry.collider, ground)
            .is_some_and(|pair| pair.has_any_active_contact)
    }

    fn step(&mut self) {
        let physics_hooks = ();
        let event_handler = ();
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            &physics_hooks,
            &event_handler,
        );
        self.time += self.integration_parameters.dt;

        // User forces only last one tick.
        for (_, body) in self.rigid_body_set.iter_mut() {
            body.reset_forces(false);
            body.reset_torques(false);
        }
    }
}
