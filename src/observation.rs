use enum_map::EnumMap;
use rapier3d::na::{UnitQuaternion, Vector3};
use rapier3d::prelude::Real;

use crate::physics::BodySnapshot;
use crate::registry::BodyRegistry;
use crate::rig::WalkerPart;

/// Features per registered segment: position 3, rotation 4, angular velocity 3, velocity 3.
pub const SEGMENT_FEATURES: usize = 13;
/// Goal position 3, hand position 3, goal speed 1.
pub const REACHER_TAIL_FEATURES: usize = 7;

/// Sense data for a single segment, relative to the agent origin
#[derive(Debug, Clone)]
pub struct SegmentSense {
    pub local_position: Vector3<Real>,
    pub rotation: UnitQuaternion<Real>,
    pub angular_velocity: Vector3<Real>,
    pub velocity: Vector3<Real>,
}

/// Complete sense data for a reacher arm
#[derive(Debug, Clone)]
pub struct ReacherSense {
    pub segments: Vec<SegmentSense>,
    pub goal_local: Vector3<Real>,
    pub hand_local: Vector3<Real>,
    pub goal_speed: Real,
}

/// Observation layout of the reacher arm
pub struct ReacherIO;

impl ReacherIO {
    pub fn sense<H: Copy + Eq + std::fmt::Debug>(
        registry: &BodyRegistry<H>,
        origin: Vector3<Real>,
        goal: Vector3<Real>,
        hand: Vector3<Real>,
        goal_speed: Real,
    ) -> ReacherSense {
        let segments = registry
            .segments()
            .iter()
            .map(|segment| SegmentSense {
                local_position: segment.state.position - origin,
                rotation: segment.state.rotation,
                angular_velocity: segment.state.angvel,
                velocity: segment.state.linvel,
            })
            .collect();

        ReacherSense {
            segments,
            goal_local: goal - origin,
            hand_local: hand - origin,
            goal_speed,
        }
    }

    /// Flatten sense data in registry order; the order is part of the policy's input contract.
    pub fn flatten_sense(sense: &ReacherSense) -> Vec<f32> {
        let mut flat = Vec::with_capacity(Self::observation_size(sense.segments.len()));
        for segment in &sense.segments {
            push_vector(&mut flat, &segment.local_position);
            push_quaternion(&mut flat, &segment.rotation);
            push_vector(&mut flat, &segment.angular_velocity);
            push_vector(&mut flat, &segment.velocity);
        }
        push_vector(&mut flat, &sense.goal_local);
        push_vector(&mut flat, &sense.hand_local);
        flat.push(sense.goal_speed);
        flat
    }

    pub fn observation_size(segments: usize) -> usize {
        SEGMENT_FEATURES * segments + REACHER_TAIL_FEATURES
    }
}

/// Stable reference frame for walker observations: sits on the hips and faces the target
/// along the ground plane.
#[derive(Debug, Clone, Copy)]
pub struct OrientationFrame {
    pub position: Vector3<Real>,
    pub rotation: UnitQuaternion<Real>,
}

impl OrientationFrame {
    pub fn new(hips: Vector3<Real>, target: Vector3<Real>) -> Self {
        let mut walk_dir = target - hips;
        walk_dir.y = 0.0;
        let rotation = if walk_dir.norm() > 1e-6 {
            UnitQuaternion::face_towards(&walk_dir, &Vector3::y())
        } else {
            UnitQuaternion::identity()
        };
        Self {
            position: hips,
            rotation,
        }
    }

    pub fn forward(&self) -> Vector3<Real> {
        self.rotation * Vector3::z()
    }

    pub fn inverse_transform_direction(&self, v: &Vector3<Real>) -> Vector3<Real> {
        self.rotation.inverse() * v
    }

    pub fn inverse_transform_point(&self, p: &Vector3<Real>) -> Vector3<Real> {
        self.rotation.inverse() * (p - self.position)
    }
}

/// Sense data for one walker part, expressed in the orientation frame
#[derive(Debug, Clone)]
pub struct PartSense {
    pub touching_ground: bool,
    pub velocity: Vector3<Real>,
    pub angular_velocity: Vector3<Real>,
    pub position_from_hips: Vector3<Real>,
    /// Local rotation and normalised strength, only for driven parts.
    pub drive: Option<(UnitQuaternion<Real>, Real)>,
}

#[derive(Debug, Clone)]
pub struct WalkerSense {
    pub hips_to_frame: UnitQuaternion<Real>,
    pub head_to_frame: UnitQuaternion<Real>,
    pub target_in_frame: Vector3<Real>,
    pub parts: EnumMap<WalkerPart, PartSense>,
}

/// Per-tick inputs for a walker observation.
pub struct WalkerState<'a> {
    pub frame: &'a OrientationFrame,
    pub parts: &'a EnumMap<WalkerPart, BodySnapshot>,
    pub touching_ground: &'a EnumMap<WalkerPart, bool>,
    /// Joint strength divided by the force limit.
    pub strength: &'a EnumMap<WalkerPart, Real>,
    pub target: Vector3<Real>,
}

/// Observation layout of the walker ragdoll
pub struct WalkerIO;

impl WalkerIO {
    pub fn sense(state: &WalkerState<'_>) -> WalkerSense {
        let frame = state.frame;
        let hips = state.parts[WalkerPart::Hips];
        let head = state.parts[WalkerPart::Head];
        let parts = EnumMap::from_fn(|part: WalkerPart| {
            let snap = &state.parts[part];
            let drive = if part.is_driven() {
                let parent = part.parent().map(|p| state.parts[p].rotation);
                let local = parent.map_or(snap.rotation, |parent| parent.inverse() * snap.rotation);
                Some((local, state.strength[part]))
            } else {
                None
            };
            PartSense {
                touching_ground: state.touching_ground[part],
                velocity: frame.inverse_transform_direction(&snap.linvel),
                angular_velocity: frame.inverse_transform_direction(&snap.angvel),
                position_from_hips: frame
                    .inverse_transform_direction(&(snap.position - hips.position)),
                drive,
            }
        });

        WalkerSense {
            hips_to_frame: from_to_rotation(&hips.forward(), &frame.forward()),
            head_to_frame: from_to_rotation(&head.forward(), &frame.forward()),
            target_in_frame: frame.inverse_transform_point(&state.target),
            parts,
        }
    }

    pub fn flatten_sense(sense: &WalkerSense) -> Vec<f32> {
        let mut flat = Vec::with_capacity(Self::observation_size());
        push_quaternion(&mut flat, &sense.hips_to_frame);
        push_quaternion(&mut flat, &sense.head_to_frame);
        push_vector(&mut flat, &sense.target_in_frame);
        for (_, part) in sense.parts.iter() {
            flat.push(if part.touching_ground { 1.0 } else { 0.0 });
            push_vector(&mut flat, &part.velocity);
            push_vector(&mut flat, &part.angular_velocity);
            push_vector(&mut flat, &part.position_from_hips);
            if let Some((local_rotation, strength)) = &part.drive {
                push_quaternion(&mut flat, local_rotation);
                flat.push(*strength);
            }
        }
        flat
    }

    pub fn observation_size() -> usize {
        let driven = WalkerPart::all().filter(|p| p.is_driven()).count();
        4 + 4 + 3 + WalkerPart::COUNT * 10 + driven * 5
    }
}

#[derive(Debug, Clone)]
pub struct BallSense {
    pub target_local: Vector3<Real>,
    pub ball_local: Vector3<Real>,
    pub velocity: Vector3<Real>,
}

/// Observation layout of the rolling ball
pub struct BallIO;

impl BallIO {
    pub fn flatten_sense(sense: &BallSense) -> Vec<f32> {
        let mut flat = Vec::with_capacity(Self::observation_size());
        push_vector(&mut flat, &sense.target_local);
        push_vector(&mut flat, &sense.ball_local);
        push_vector(&mut flat, &sense.velocity);
        flat
    }

    pub fn observation_size() -> usize {
        9
    }
}

fn from_to_rotation(from: &Vector3<Real>, to: &Vector3<Real>) -> UnitQuaternion<Real> {
    UnitQuaternion::rotation_between(from, to).unwrap_or_else(|| {
        // Opposite vectors: any half turn about the vertical works.
        UnitQuaternion::from_axis_angle(&Vector3::y_axis(), std::f32::consts::PI)
    })
}

fn push_vector(flat: &mut Vec<f32>, v: &Vector3<Real>) {
    flat.extend_from_slice(&[v.x, v.y, v.z]);
}

fn push_quaternion(flat: &mut Vec<f32>, q: &UnitQuaternion<Real>) {
    let q = q.quaternion();
    flat.extend_from_slice(&[q.i, q.j, q.k, q.w]);
}
