//! Ordered registry of the rigid-body segments that make up one agent.

use rapier3d::na::{UnitQuaternion, Vector3};
use rapier3d::prelude::Real;
use tracing::debug;

use crate::error::{ArenaError, Result};
use crate::physics::{BodySnapshot, PhysicsBackend, RootId};

/// One rigid body unit of a jointed limb, with the pose it was spawned in.
#[derive(Debug, Clone)]
pub struct BodySegment<H> {
    pub handle: H,
    pub state: BodySnapshot,
    pub original_position: Vector3<Real>,
    pub original_rotation: UnitQuaternion<Real>,
    /// Current joint strength, if the segment is driven.
    pub joint_strength: Option<Real>,
}

/// Segments owned by one agent, in a stable order for the lifetime of the registry.
#[derive(Debug, Clone)]
pub struct BodyRegistry<H> {
    owner: RootId,
    segments: Vec<BodySegment<H>>,
}

impl<H: Copy + Eq + std::fmt::Debug> BodyRegistry<H> {
    /// Keep the candidates whose root ancestry is `owner`, preserving their order.
    pub fn register<B>(backend: &B, candidates: &[H], owner: RootId) -> Result<Self>
    where
        B: PhysicsBackend<Handle = H>,
    {
        let mut segments = Vec::with_capacity(candidates.len());
        for &handle in candidates {
            if backend.root_of(handle) != Some(owner) {
                continue;
            }
            let state = backend
                .snapshot(handle)
                .ok_or_else(|| ArenaError::UnknownBody(format!("{handle:?}")))?;
            segments.push(BodySegment {
                handle,
                state,
                original_position: state.position,
                original_rotation: state.rotation,
                joint_strength: None,
            });
        }

        if segments.is_empty() {
            return Err(ArenaError::NoSegments {
                tag: String::new(),
                root: owner,
            });
        }

        debug!(
            owner,
            candidates = candidates.len(),
            registered = segments.len(),
            "registered body segments"
        );
        Ok(Self { owner, segments })
    }

    /// Find every body tagged `tag` in the scene and register the ones under `owner`.
    pub fn discover<B>(backend: &B, tag: &str, owner: RootId) -> Result<Self>
    where
        B: PhysicsBackend<Handle = H>,
    {
        let candidates = backend.tagged_bodies(tag);
        Self::register(backend, &candidates, owner).map_err(|err| match err {
            ArenaError::NoSegments { root, .. } => ArenaError::NoSegments {
                tag: tag.to_string(),
                root,
            },
            other => other,
        })
    }

    pub fn owner(&self) -> RootId {
        self.owner
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[BodySegment<H>] {
        &self.segments
    }

    pub fn segment(&self, i: usize) -> &BodySegment<H> {
        &self.segments[i]
    }

    pub fn segment_mut(&mut self, i: usize) -> &mut BodySegment<H> {
        &mut self.segments[i]
    }

    pub fn handle(&self, i: usize) -> H {
        self.segments[i].handle
    }

    pub fn position_of(&self, i: usize) -> Vector3<Real> {
        self.segments[i].state.position
    }

    pub fn rotation_of(&self, i: usize) -> UnitQuaternion<Real> {
        self.segments[i].state.rotation
    }

    pub fn velocity_of(&self, i: usize) -> Vector3<Real> {
        self.segments[i].state.linvel
    }

    pub fn angular_velocity_of(&self, i: usize) -> Vector3<Real> {
        self.segments[i].state.angvel
    }

    /// Re-read every segment from the backend.
    ///
    /// Fails on the first segment whose state is NaN or infinite; states read
    /// before it are already updated.
    pub fn refresh<B>(&mut self, backend: &B) -> Result<()>
    where
        B: PhysicsBackend<Handle = H>,
    {
        for (i, segment) in self.segments.iter_mut().enumerate() {
            let state = backend
                .snapshot(segment.handle)
                .ok_or_else(|| ArenaError::UnknownBody(format!("{:?}", segment.handle)))?;
            if !state.is_finite() {
                return Err(ArenaError::NonFiniteState { segment: i });
            }
            segment.state = state;
        }
        Ok(())
    }

    /// Zero all velocities, put every segment back at its original pose and clear
    /// recorded joint strengths.
    pub fn restore<B>(&mut self, backend: &mut B) -> Result<()>
    where
        B: PhysicsBackend<Handle = H>,
    {
        for segment in &mut self.segments {
            backend.set_pose(
                segment.handle,
                segment.original_position,
                segment.original_rotation,
            )?;
            backend.set_velocities(segment.handle, Vector3::zeros(), Vector3::zeros())?;
            segment.state =
                BodySnapshot::at_rest(segment.original_position, segment.original_rotation);
            segment.joint_strength = None;
        }
        Ok(())
    }

    /// Rotate the whole body about the vertical axis through `pivot`.
    pub fn rotate_about<B>(&mut self, backend: &mut B, pivot: Vector3<Real>, yaw: Real) -> Result<()>
    where
        B: PhysicsBackend<Handle = H>,
    {
        let turn = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw);
        for segment in &mut self.segments {
            let position = pivot + turn * (segment.state.position - pivot);
            let rotation = turn * segment.state.rotation;
            backend.set_pose(segment.handle, position, rotation)?;
            segment.state.position = position;
            segment.state.rotation = rotation;
        }
        Ok(())
    }
}
