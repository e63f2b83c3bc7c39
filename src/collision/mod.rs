//! Grid-chunked collision space
//!
//! Static objects and moving actors are bucketed into fixed-size chunks.
//! Each frame:
//! - every actor advances by its velocity mode, carrying sub-pixel remainders
//! - the swept box (old and new hitbox) is tested against the actor's chunk
//!   and whichever neighbours it reaches past the chunk centre line
//! - each hit queues a `CollidedWith` event stamped with the actor's id
//! - actors that left their chunk are re-bucketed once all actors have moved
//!
//! Ids are block connection ids, so collision events flow through the same
//! connections as every other event.

mod types;

pub use types::{
    CollisionActor, CollisionObject, CollisionProperties, Hitbox, VelocityHook, VelocityMode,
    WrapType,
};

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use glam::Vec2;

use crate::block::{EventCore, Eventable, FrameProcessor};
use crate::canvas::{Canvas, ElementHandle};
use crate::error::CollisionError;
use crate::event::{BlockAction, CollisionAction, EventKind};
use crate::id::Id;
use types::CollisionChunk;

/// Swept region of one actor for one frame
#[derive(Debug, Clone, Copy)]
struct Sweep {
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
}

impl Sweep {
    fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x0: self.x0 + dx,
            y0: self.y0 + dy,
            x1: self.x1 + dx,
            y1: self.y1 + dy,
        }
    }
}

/// Result of advancing one actor
#[derive(Debug, Clone, Copy)]
struct Step {
    ox: i32,
    oy: i32,
    /// New position before wrapping
    x: i32,
    y: i32,
}

/// Neighbourhood layout along one axis around the origin chunk
#[derive(Debug, Clone, Copy)]
struct AxisScan {
    cell: usize,
    prev: usize,
    next: usize,
    /// Added to the sweep when testing the previous chunk (wraps around)
    off_prev: i32,
    off_next: i32,
    reach_prev: bool,
    reach_next: bool,
}

impl AxisScan {
    fn new(cell: usize, len: usize, size: i32, wrap: bool, lo: i32, hi: i32) -> Self {
        let first = cell == 0;
        let last = cell == len - 1;
        let total = size * len as i32;
        let center = size * cell as i32 + size / 2;
        Self {
            cell,
            prev: if first { len - 1 } else { cell - 1 },
            next: if last { 0 } else { cell + 1 },
            off_prev: if first && wrap { total } else { 0 },
            off_next: if last && wrap { -total } else { 0 },
            reach_prev: lo < center && (wrap || !first),
            reach_next: hi > center && (wrap || !last),
        }
    }
}

/// Owns every collision object and actor, bucketed into a fixed grid
pub struct CollisionSpace {
    core: EventCore,
    props: CollisionProperties,
    canvas: Rc<RefCell<Canvas>>,
    grid: Vec<CollisionChunk>,
    // Ascending id order decides which actor moves (and reports) first
    objects: BTreeMap<Id, CollisionObject>,
    actors: BTreeMap<Id, CollisionActor>,
    /// Collision events the queue refused
    dropped_events: u64,
}

impl CollisionSpace {
    pub fn new(props: CollisionProperties, canvas: Rc<RefCell<Canvas>>) -> Result<Self, CollisionError> {
        if props.grid_x_len == 0 || props.grid_y_len == 0 {
            return Err(CollisionError::EmptyGrid {
                x_len: props.grid_x_len,
                y_len: props.grid_y_len,
            });
        }
        if props.chunk_size_x <= 0 || props.chunk_size_y <= 0 {
            return Err(CollisionError::InvalidChunkSize {
                x: props.chunk_size_x,
                y: props.chunk_size_y,
            });
        }
        if props.wrap_x == WrapType::Toroidal && props.grid_x_len < 3 {
            return Err(CollisionError::WrapGridTooSmall {
                axis: 'x',
                len: props.grid_x_len,
            });
        }
        if props.wrap_y == WrapType::Toroidal && props.grid_y_len < 3 {
            return Err(CollisionError::WrapGridTooSmall {
                axis: 'y',
                len: props.grid_y_len,
            });
        }

        let len = props.grid_x_len * props.grid_y_len;
        log::info!(
            "Collision space: {}x{} chunks of {}x{} px (wrap {:?}/{:?})",
            props.grid_x_len,
            props.grid_y_len,
            props.chunk_size_x,
            props.chunk_size_y,
            props.wrap_x,
            props.wrap_y
        );

        Ok(Self {
            core: EventCore::new(),
            props,
            canvas,
            grid: vec![CollisionChunk::default(); len],
            objects: BTreeMap::new(),
            actors: BTreeMap::new(),
            dropped_events: 0,
        })
    }

    pub fn properties(&self) -> &CollisionProperties {
        &self.props
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Add a static object. Returns its id, or `Id::NULL` if rejected.
    pub fn add_object(&mut self, obj: CollisionObject) -> Id {
        self.try_add_object(obj).unwrap_or_else(|e| {
            log::error!("CollisionSpace: rejected object: {e}");
            Id::NULL
        })
    }

    /// Add a moving actor. Returns its id, or `Id::NULL` if rejected.
    pub fn add_actor(&mut self, actor: CollisionActor) -> Id {
        self.try_add_actor(actor).unwrap_or_else(|e| {
            log::error!("CollisionSpace: rejected actor: {e}");
            Id::NULL
        })
    }

    pub fn try_add_object(&mut self, mut obj: CollisionObject) -> Result<Id, CollisionError> {
        self.check_new_id(obj.id)?;
        self.wrap_hitbox(&mut obj.hitbox);
        let id = obj.id;
        let chunk = self.chunk_index_at(obj.hitbox.x, obj.hitbox.y);
        self.grid[chunk].objects.insert(id);
        self.objects.insert(id, obj);
        Ok(id)
    }

    pub fn try_add_actor(&mut self, mut actor: CollisionActor) -> Result<Id, CollisionError> {
        self.check_new_id(actor.id)?;
        self.wrap_hitbox(&mut actor.hitbox);
        let id = actor.id;
        let chunk = self.chunk_index_at(actor.hitbox.x, actor.hitbox.y);
        self.grid[chunk].actors.insert(id);
        self.actors.insert(id, actor);
        Ok(id)
    }

    /// Add an object sized and positioned from a canvas element. The id is
    /// the element block's connection id.
    pub fn add_object_auto_hitbox(&mut self, element: ElementHandle) -> Id {
        let obj = {
            let Ok(canvas) = self.canvas.try_borrow() else {
                log::error!("CollisionSpace: canvas busy, cannot size hitbox");
                return Id::NULL;
            };
            let Some(e) = canvas.element(element) else {
                log::error!("CollisionSpace: {}", CollisionError::MissingElement);
                return Id::NULL;
            };
            CollisionObject::new(e.connection_id(), Hitbox::new(e.x, e.y, e.width(), e.height()))
                .with_element(element)
        };
        self.add_object(obj)
    }

    /// Remove an object or actor. Unknown ids are ignored.
    pub fn remove_object_or_actor(&mut self, id: Id) {
        if id.is_null() {
            return;
        }
        if let Some(obj) = self.objects.remove(&id) {
            let chunk = self.chunk_index_at(obj.hitbox.x, obj.hitbox.y);
            self.grid[chunk].objects.remove_value(&id);
        } else if let Some(actor) = self.actors.remove(&id) {
            let chunk = self.chunk_index_at(actor.hitbox.x, actor.hitbox.y);
            self.grid[chunk].actors.remove_value(&id);
        }
    }

    pub fn actor_set_velocity(&mut self, id: Id, vx: f32, vy: f32) {
        if let Some(actor) = self.actors.get_mut(&id) {
            actor.vel = Vec2::new(vx, vy);
        }
    }

    pub fn actor_stop(&mut self, id: Id) {
        self.actor_set_velocity(id, 0.0, 0.0);
    }

    pub fn actor_set_mode(&mut self, id: Id, mode: VelocityMode) {
        if let Some(actor) = self.actors.get_mut(&id) {
            actor.mode = mode;
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn object(&self, id: Id) -> Option<&CollisionObject> {
        self.objects.get(&id)
    }

    pub fn actor(&self, id: Id) -> Option<&CollisionActor> {
        self.actors.get(&id)
    }

    pub fn contains(&self, id: Id) -> bool {
        self.objects.contains_key(&id) || self.actors.contains_key(&id)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    /// Collision events lost because the space is unregistered or the queue was full
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events
    }

    pub fn chunk_count(&self) -> usize {
        self.grid.len()
    }

    /// Index of the chunk containing `(x, y)`. Toroidal axes wrap, others
    /// clamp to the edge chunk.
    pub fn chunk_index_at(&self, x: i32, y: i32) -> usize {
        let (cx, cy) = self.chunk_coords(x, y);
        cy * self.props.grid_x_len + cx
    }

    pub fn chunk_actor_ids(&self, chunk: usize) -> Vec<Id> {
        self.grid
            .get(chunk)
            .map(|c| c.actors.values().copied().collect())
            .unwrap_or_default()
    }

    pub fn chunk_object_ids(&self, chunk: usize) -> Vec<Id> {
        self.grid
            .get(chunk)
            .map(|c| c.objects.values().copied().collect())
            .unwrap_or_default()
    }

    // =========================================================================
    // Frame
    // =========================================================================

    /// Advance every actor by `delta_ms`, queue collision events and
    /// re-bucket actors that changed chunk.
    pub fn frame(&mut self, delta_ms: f64) {
        let fmsec = delta_ms as f32;
        let wrap_x = self.props.wrap_x == WrapType::Toroidal;
        let wrap_y = self.props.wrap_y == WrapType::Toroidal;
        let total_x = self.props.total_size_x();
        let total_y = self.props.total_size_y();

        let ids: Vec<Id> = self.actors.keys().copied().collect();
        let mut element_moves: Vec<(ElementHandle, i32, i32)> = Vec::new();
        let mut reassign: Vec<(Id, usize)> = Vec::new();
        let mut hits: Vec<Id> = Vec::new();

        for id in ids {
            let Some(step) = self.step_actor(id, fmsec) else {
                continue;
            };
            let Some(actor) = self.actors.get(&id) else {
                continue;
            };
            let (w, h) = (actor.hitbox.w, actor.hitbox.h);

            // Neighbourhood is centred on the chunk the actor started in
            let (cell_x, cell_y) = self.chunk_coords(step.ox, step.oy);
            let origin_chunk = cell_y * self.props.grid_x_len + cell_x;

            let sweep = Sweep {
                x0: step.x.min(step.ox),
                y0: step.y.min(step.oy),
                x1: step.x.max(step.ox) + w,
                y1: step.y.max(step.oy) + h,
            };

            let sx = AxisScan::new(
                cell_x,
                self.props.grid_x_len,
                self.props.chunk_size_x,
                wrap_x,
                sweep.x0,
                sweep.x1,
            );
            let sy = AxisScan::new(
                cell_y,
                self.props.grid_y_len,
                self.props.chunk_size_y,
                wrap_y,
                sweep.y0,
                sweep.y1,
            );

            hits.clear();
            self.scan_neighbourhood(id, sweep, &sx, &sy, &mut hits);
            for other in &hits {
                if !self.core.send_custom_origin_event(EventKind::collided_with(*other), id) {
                    self.dropped_events += 1;
                    log::warn!("Collision space: CollidedWith({other}) from {id} was not queued");
                }
            }

            let x = if wrap_x { step.x.rem_euclid(total_x) } else { step.x };
            let y = if wrap_y { step.y.rem_euclid(total_y) } else { step.y };

            let Some(actor) = self.actors.get_mut(&id) else {
                continue;
            };
            actor.hitbox.x = x;
            actor.hitbox.y = y;
            if let Some(element) = actor.element {
                element_moves.push((element, x, y));
            }

            if self.chunk_index_at(x, y) != origin_chunk {
                reassign.push((id, origin_chunk));
            }
        }

        self.apply_element_moves(&element_moves);
        self.reassign_chunks(&reassign);
    }

    /// Compute and store the new position of one actor. `None` if it did not move.
    fn step_actor(&mut self, id: Id, fmsec: f32) -> Option<Step> {
        let target_pos = {
            let actor = self.actors.get(&id)?;
            match actor.mode.follow_target() {
                Some(target) => match self.actors.get(&target) {
                    Some(t) => Some((t.hitbox.x, t.hitbox.y)),
                    None => {
                        log::debug!("CollisionSpace: actor {id} follows missing actor {target}, skipping");
                        return None;
                    }
                },
                None => None,
            }
        };

        let actor = self.actors.get_mut(&id)?;
        let (ox, oy) = (actor.hitbox.x, actor.hitbox.y);
        let origin = Vec2::new(ox as f32, oy as f32);

        let target = target_pos.map(|(tx, ty)| Vec2::new(tx as f32, ty as f32));

        let vel = match (&actor.mode, target_pos) {
            (VelocityMode::FollowSync { .. }, Some((x, y))) => {
                if x == ox && y == oy {
                    return None;
                }
                // Direct teleport, velocity and remainders untouched
                return Some(Step { ox, oy, x, y });
            }
            (VelocityMode::FollowConstant { speed, .. }, Some(_)) => {
                (target.unwrap_or(origin) - origin).normalize_or_zero() * *speed
            }
            (
                VelocityMode::FollowDistanceLinear {
                    base,
                    distance_factor,
                    ..
                },
                Some(_),
            ) => {
                let to = target.unwrap_or(origin) - origin;
                to.normalize_or_zero() * (*base + *distance_factor * to.length())
            }
            (VelocityMode::Custom(hook), _) => {
                let hook = hook.clone();
                actor.vel = hook.call(actor.vel, fmsec);
                actor.vel
            }
            _ => actor.vel,
        };

        let mut x = ox;
        let mut y = oy;
        let mut moved = false;

        if vel.x != 0.0 {
            let r = fmsec * vel.x / 1000.0 + actor.rem.x;
            let d = r as i32;
            actor.rem.x = r - d as f32;
            if d != 0 {
                x += d;
                moved = true;
            }
        }
        if vel.y != 0.0 {
            let r = fmsec * vel.y / 1000.0 + actor.rem.y;
            let d = r as i32;
            actor.rem.y = r - d as f32;
            if d != 0 {
                y += d;
                moved = true;
            }
        }

        if moved { Some(Step { ox, oy, x, y }) } else { None }
    }

    fn scan_neighbourhood(&self, id: Id, sweep: Sweep, sx: &AxisScan, sy: &AxisScan, hits: &mut Vec<Id>) {
        self.scan_chunk(sx.cell, sy.cell, sweep, id, hits);

        if sx.reach_prev {
            let s = sweep.offset(sx.off_prev, 0);
            self.scan_chunk(sx.prev, sy.cell, s, id, hits);
            if sy.reach_prev {
                self.scan_chunk(sx.prev, sy.prev, s.offset(0, sy.off_prev), id, hits);
            }
            if sy.reach_next {
                self.scan_chunk(sx.prev, sy.next, s.offset(0, sy.off_next), id, hits);
            }
        }

        if sx.reach_next {
            let s = sweep.offset(sx.off_next, 0);
            self.scan_chunk(sx.next, sy.cell, s, id, hits);
            if sy.reach_prev {
                self.scan_chunk(sx.next, sy.prev, s.offset(0, sy.off_prev), id, hits);
            }
            if sy.reach_next {
                self.scan_chunk(sx.next, sy.next, s.offset(0, sy.off_next), id, hits);
            }
        }

        if sy.reach_prev {
            self.scan_chunk(sx.cell, sy.prev, sweep.offset(0, sy.off_prev), id, hits);
        }
        if sy.reach_next {
            self.scan_chunk(sx.cell, sy.next, sweep.offset(0, sy.off_next), id, hits);
        }
    }

    /// Test every object then every actor of one chunk. The moving actor is excluded.
    fn scan_chunk(&self, cx: usize, cy: usize, s: Sweep, id: Id, hits: &mut Vec<Id>) {
        let Some(chunk) = self.grid.get(cy * self.props.grid_x_len + cx) else {
            return;
        };
        for other in chunk.objects.values() {
            if let Some(obj) = self.objects.get(other) {
                if obj.hitbox.overlaps(s.x0, s.y0, s.x1, s.y1) {
                    hits.push(obj.id);
                }
            }
        }
        for other in chunk.actors.values() {
            if *other == id {
                continue;
            }
            if let Some(actor) = self.actors.get(other) {
                if actor.hitbox.overlaps(s.x0, s.y0, s.x1, s.y1) {
                    hits.push(actor.id);
                }
            }
        }
    }

    fn apply_element_moves(&self, moves: &[(ElementHandle, i32, i32)]) {
        if moves.is_empty() {
            return;
        }
        let Ok(mut canvas) = self.canvas.try_borrow_mut() else {
            log::error!("CollisionSpace: canvas busy, {} element moves lost", moves.len());
            return;
        };
        for &(handle, x, y) in moves {
            if let Some(e) = canvas.element_mut(handle) {
                e.x = x;
                e.y = y;
            }
        }
    }

    fn reassign_chunks(&mut self, queue: &[(Id, usize)]) {
        for &(id, old) in queue {
            let Some(actor) = self.actors.get(&id) else {
                continue;
            };
            let new = self.chunk_index_at(actor.hitbox.x, actor.hitbox.y);
            self.grid[old].actors.remove_value(&id);
            self.grid[new].actors.insert(id);
        }
    }

    fn chunk_coords(&self, x: i32, y: i32) -> (usize, usize) {
        (
            axis_cell(x, self.props.chunk_size_x, self.props.grid_x_len, self.props.wrap_x),
            axis_cell(y, self.props.chunk_size_y, self.props.grid_y_len, self.props.wrap_y),
        )
    }

    fn wrap_hitbox(&self, hitbox: &mut Hitbox) {
        if self.props.wrap_x == WrapType::Toroidal {
            hitbox.x = hitbox.x.rem_euclid(self.props.total_size_x());
        }
        if self.props.wrap_y == WrapType::Toroidal {
            hitbox.y = hitbox.y.rem_euclid(self.props.total_size_y());
        }
    }

    fn check_new_id(&self, id: Id) -> Result<(), CollisionError> {
        if id.is_null() {
            return Err(CollisionError::ReservedId);
        }
        if self.contains(id) {
            return Err(CollisionError::DuplicateId(id));
        }
        Ok(())
    }
}

fn axis_cell(v: i32, size: i32, len: usize, wrap: WrapType) -> usize {
    let v = match wrap {
        WrapType::Toroidal => v.rem_euclid(size * len as i32),
        WrapType::None => v.max(0),
    };
    ((v / size) as usize).min(len - 1)
}

impl Eventable for CollisionSpace {
    fn core(&self) -> &EventCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EventCore {
        &mut self.core
    }

    fn action(&mut self, a: &BlockAction) {
        let BlockAction::Collision(c) = *a else {
            return;
        };
        match c {
            CollisionAction::RemoveObjectOrActor { id } => self.remove_object_or_actor(id),
            CollisionAction::ActorSetVel { id, vel } => self.actor_set_velocity(id, vel.x, vel.y),
            CollisionAction::ActorStop { id } => self.actor_stop(id),
        }
    }
}

impl FrameProcessor for CollisionSpace {
    fn frame(&mut self, delta_ms: f64) {
        CollisionSpace::frame(self, delta_ms);
    }
}
