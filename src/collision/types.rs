//! Collision value types

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::canvas::ElementHandle;
use crate::id::Id;
use crate::slots::SlotVec;

/// Axis-aligned box in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Hitbox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Hitbox {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Overlap test against the half-open region `[x0, x1) x [y0, y1)`
    #[inline]
    pub fn overlaps(&self, x0: i32, y0: i32, x1: i32, y1: i32) -> bool {
        x0 < self.x + self.w && x1 > self.x && y0 < self.y + self.h && y1 > self.y
    }
}

/// Static hitbox. Never moves, never collides with other objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollisionObject {
    pub id: Id,
    /// Canvas element drawn for this object
    pub element: Option<ElementHandle>,
    pub hitbox: Hitbox,
}

impl CollisionObject {
    pub fn new(id: Id, hitbox: Hitbox) -> Self {
        Self {
            id,
            element: None,
            hitbox,
        }
    }

    pub fn with_element(mut self, element: ElementHandle) -> Self {
        self.element = Some(element);
        self
    }
}

/// Velocity hook for `VelocityMode::Custom`: `(current velocity, frame ms) -> new velocity`
#[derive(Clone)]
pub struct VelocityHook(Rc<RefCell<dyn FnMut(Vec2, f32) -> Vec2>>);

impl VelocityHook {
    pub fn new(f: impl FnMut(Vec2, f32) -> Vec2 + 'static) -> Self {
        Self(Rc::new(RefCell::new(f)))
    }

    pub(crate) fn call(&self, vel: Vec2, fmsec: f32) -> Vec2 {
        match self.0.try_borrow_mut() {
            Ok(mut f) => f(vel, fmsec),
            Err(_) => {
                log::warn!("Velocity hook re-entered, keeping current velocity");
                vel
            }
        }
    }
}

impl fmt::Debug for VelocityHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VelocityHook")
    }
}

/// How an actor's motion is computed each frame. Speeds are px/sec.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum VelocityMode {
    /// Move by the actor's own `vel`
    #[default]
    Constant,
    /// Snap to the target's position
    FollowSync { target: Id },
    /// Head toward the target at a fixed speed
    FollowConstant { target: Id, speed: f32 },
    /// Head toward the target at `base + distance_factor * distance`
    FollowDistanceLinear {
        target: Id,
        base: f32,
        distance_factor: f32,
    },
    /// Run the hook, then move by the resulting `vel`
    #[serde(skip)]
    Custom(VelocityHook),
}

impl VelocityMode {
    pub fn follow_target(&self) -> Option<Id> {
        match *self {
            VelocityMode::FollowSync { target }
            | VelocityMode::FollowConstant { target, .. }
            | VelocityMode::FollowDistanceLinear { target, .. } => Some(target),
            VelocityMode::Constant | VelocityMode::Custom(_) => None,
        }
    }
}

/// Moving hitbox. Collides with objects and other actors.
#[derive(Debug, Clone)]
pub struct CollisionActor {
    pub id: Id,
    pub element: Option<ElementHandle>,
    pub hitbox: Hitbox,
    pub vel: Vec2,
    /// Sub-pixel motion carried to the next frame
    pub rem: Vec2,
    pub mode: VelocityMode,
}

impl CollisionActor {
    pub fn new(id: Id, hitbox: Hitbox) -> Self {
        Self {
            id,
            element: None,
            hitbox,
            vel: Vec2::ZERO,
            rem: Vec2::ZERO,
            mode: VelocityMode::Constant,
        }
    }

    pub fn with_element(mut self, element: ElementHandle) -> Self {
        self.element = Some(element);
        self
    }

    pub fn with_velocity(mut self, vx: f32, vy: f32) -> Self {
        self.vel = Vec2::new(vx, vy);
        self
    }

    pub fn with_mode(mut self, mode: VelocityMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Boundary behaviour of one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WrapType {
    /// Positions continue off the grid; lookups clamp to the edge chunk
    #[default]
    None,
    /// Positions and collisions wrap across the boundary
    Toroidal,
}

/// Grid layout. Chunks should be at least twice the largest hitbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionProperties {
    /// Chunks along x
    pub grid_x_len: usize,
    /// Chunks along y
    pub grid_y_len: usize,
    /// Chunk width in px
    pub chunk_size_x: i32,
    /// Chunk height in px
    pub chunk_size_y: i32,
    pub wrap_x: WrapType,
    pub wrap_y: WrapType,
}

impl Default for CollisionProperties {
    fn default() -> Self {
        Self {
            grid_x_len: 16,
            grid_y_len: 16,
            chunk_size_x: 128,
            chunk_size_y: 128,
            wrap_x: WrapType::None,
            wrap_y: WrapType::None,
        }
    }
}

impl CollisionProperties {
    pub fn total_size_x(&self) -> i32 {
        self.grid_x_len as i32 * self.chunk_size_x
    }

    pub fn total_size_y(&self) -> i32 {
        self.grid_y_len as i32 * self.chunk_size_y
    }
}

/// One grid cell: ids of the objects and actors whose position falls inside
#[derive(Debug, Default, Clone)]
pub(crate) struct CollisionChunk {
    pub objects: SlotVec<Id>,
    pub actors: SlotVec<Id>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_is_half_open() {
        let b = Hitbox::new(10, 10, 5, 5);
        assert!(b.overlaps(0, 0, 11, 11));
        // Touching edges do not overlap
        assert!(!b.overlaps(0, 0, 10, 10));
        assert!(!b.overlaps(15, 10, 20, 15));
        assert!(b.overlaps(14, 14, 30, 30));
    }

    #[test]
    fn test_properties_round_trip_json() {
        let json = r#"{"grid_x_len":4,"grid_y_len":3,"wrap_x":"Toroidal"}"#;
        let p: CollisionProperties = serde_json::from_str(json).unwrap();
        assert_eq!(p.grid_x_len, 4);
        assert_eq!(p.chunk_size_x, 128);
        assert_eq!(p.wrap_x, WrapType::Toroidal);
        assert_eq!(p.total_size_x(), 512);
    }

    #[test]
    fn test_follow_target() {
        assert_eq!(VelocityMode::FollowSync { target: Id(3) }.follow_target(), Some(Id(3)));
        assert_eq!(VelocityMode::Constant.follow_target(), None);
        assert_eq!(
            VelocityMode::Custom(VelocityHook::new(|v, _| v)).follow_target(),
            None
        );
    }
}
