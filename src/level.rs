//! Procedural level generation
//!
//! A `LevelTemplate` is a grid of cells plus the list of `LevelElement`s to
//! scatter over it. Generation fills a cell map element by element, then
//! instantiates every filled cell as a `LevelBlock`: registered with the
//! manager, placed on the canvas and (optionally) added to the collision space
//! under the block's id.
//!
//! Per element the grid is split into square regions of `region_size` cells,
//! `region_buffer` cells apart. Regions are shuffled and the first
//! `generate_count` of them each get one placement attempt sequence:
//! - `Retry` tries the region's cells in shuffled order until one fits
//! - `Skip` gives up after the first cell
//! - `Replace` always places, clearing whatever is in the way
//!
//! A cell fits when it and its `clear_region_size` neighbourhood are empty.
//! Only `Replace` guarantees that every requested element is placed.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use glam::Vec2;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::block::{DrawState, Drawable, EventCore, Eventable};
use crate::canvas::{Canvas, ElementHandle};
use crate::collision::{CollisionActor, CollisionObject, CollisionSpace, Hitbox, VelocityMode};
use crate::error::LevelError;
use crate::event::{BlockAction, BlockEvent, EventKind, GenerateAction, ScreenEvent, StepAction, VisualEvent};
use crate::id::Id;
use crate::manager::Manager;
use crate::slots::SlotVec;

/// Seed used until `seed_random_generator` is called
pub const DEFAULT_SEED: u64 = 5489;

/// What to do when the chosen cell is already taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReplaceMode {
    #[default]
    Retry,
    Skip,
    Replace,
}

/// Placement of a block inside its cell, per axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellOffset {
    Px(i32),
    /// Centre the block in the cell
    Centered,
}

impl Default for CellOffset {
    fn default() -> Self {
        CellOffset::Px(0)
    }
}

impl CellOffset {
    fn resolve(self, region: i32, size: i32) -> i32 {
        match self {
            CellOffset::Px(px) => px,
            CellOffset::Centered => region / 2 - size / 2,
        }
    }
}

/// Collision body given to each generated block. Hitbox x/y are relative to
/// the block's position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CollisionTemplate {
    Object {
        hitbox: Hitbox,
    },
    Actor {
        hitbox: Hitbox,
        /// px/sec
        #[serde(default)]
        vel: Vec2,
        #[serde(default)]
        mode: VelocityMode,
    },
}

/// One kind of generated block
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelElement {
    pub width: i32,
    pub height: i32,
    /// Number of visual steps the block cycles through
    pub steps: usize,
    pub restart_after_last_step: bool,
    pub collision: Option<CollisionTemplate>,
    /// Manager group every generated block joins
    #[serde(skip)]
    pub group: Option<Id>,

    /// Upper bound on blocks placed per generation
    pub generate_count: u32,
    /// Region side in cells
    pub region_size: u32,
    /// Cells between regions
    pub region_buffer: u32,
    /// Neighbourhood (in cells) that must be empty, 0 = the cell only
    pub clear_region_size: u32,
    pub cell_offset_x: CellOffset,
    pub cell_offset_y: CellOffset,
    pub replace_mode: ReplaceMode,
}

impl Default for LevelElement {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            steps: 1,
            restart_after_last_step: false,
            collision: None,
            group: None,
            generate_count: 0,
            region_size: 1,
            region_buffer: 0,
            clear_region_size: 0,
            cell_offset_x: CellOffset::default(),
            cell_offset_y: CellOffset::default(),
            replace_mode: ReplaceMode::default(),
        }
    }
}

impl LevelElement {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, LevelError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Grid layout and element list for one level
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelTemplate {
    /// Cell size in px
    pub cell_width: i32,
    pub cell_height: i32,
    pub grid_x_len: u32,
    pub grid_y_len: u32,
    /// Margin from the canvas top/left in px
    pub offset_x: i32,
    pub offset_y: i32,
    /// Generator element ids, generated in this order
    pub elements: Vec<usize>,
}

impl LevelTemplate {
    pub fn from_json(json: &str) -> Result<Self, LevelError> {
        Ok(serde_json::from_str(json)?)
    }
}

// =============================================================================
// LevelBlock
// =============================================================================

/// A generated block. Reports presses as visual events and steps through
/// its visual states on step actions.
#[derive(Debug)]
pub struct LevelBlock {
    core: EventCore,
    draw: DrawState,
    element_id: usize,
    step: usize,
    steps: usize,
    restart_after_last_step: bool,
}

impl LevelBlock {
    pub fn new(element_id: usize, element: &LevelElement) -> Self {
        Self {
            core: EventCore::new(),
            draw: DrawState::new(element.width, element.height),
            element_id,
            step: 0,
            steps: element.steps.max(1),
            restart_after_last_step: element.restart_after_last_step,
        }
    }

    /// Generator element this block was built from
    pub fn element_id(&self) -> usize {
        self.element_id
    }

    pub fn step(&self) -> usize {
        self.step
    }

    fn apply_step(&mut self, a: StepAction) {
        match a {
            StepAction::SetStep(step) if step < self.steps => self.step = step,
            StepAction::SetStep(step) => {
                log::warn!("LevelBlock: step {step} out of range (have {})", self.steps)
            }
            StepAction::NextStep if self.step + 1 < self.steps => self.step += 1,
            StepAction::NextStep => {
                if self.restart_after_last_step {
                    self.step = 0;
                }
            }
            StepAction::PrevStep => self.step = self.step.saturating_sub(1),
            StepAction::FirstStep => self.step = 0,
            StepAction::LastStep => self.step = self.steps - 1,
        }
    }
}

impl Eventable for LevelBlock {
    fn core(&self) -> &EventCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EventCore {
        &mut self.core
    }

    fn event(&mut self, e: &BlockEvent) {
        let EventKind::Screen(ty, p) = e.kind else {
            return;
        };
        match ty {
            ScreenEvent::PressDown => {
                self.core.send_event(EventKind::Visual(VisualEvent::PressDown, p));
            }
            ScreenEvent::PressUp => {
                self.core.send_event(EventKind::Visual(VisualEvent::PressUp, p));
            }
            ScreenEvent::PressDrag => {
                self.core.send_event(EventKind::Visual(VisualEvent::Drag, p));
                let (fx, fy) = (p.x + p.dx, p.y + p.dy);
                if fx < 0 || fy < 0 || fx >= self.draw.width || fy >= self.draw.height {
                    self.core.send_event(EventKind::Visual(VisualEvent::DragOut, p));
                }
            }
            _ => {}
        }
    }

    fn action(&mut self, a: &BlockAction) {
        if let BlockAction::Step(step) = *a {
            self.apply_step(step);
        }
    }

    fn as_drawable(&self) -> Option<&dyn Drawable> {
        Some(self)
    }

    fn as_drawable_mut(&mut self) -> Option<&mut dyn Drawable> {
        Some(self)
    }
}

impl Drawable for LevelBlock {
    fn draw_state(&self) -> &DrawState {
        &self.draw
    }

    fn draw_state_mut(&mut self) -> &mut DrawState {
        &mut self.draw
    }
}

// =============================================================================
// Cell map
// =============================================================================

/// Which element fills each grid cell, row-major
struct CellMap {
    cells: Vec<Option<usize>>,
    x_len: usize,
    y_len: usize,
}

impl CellMap {
    fn new(x_len: usize, y_len: usize) -> Self {
        Self {
            cells: vec![None; x_len * y_len],
            x_len,
            y_len,
        }
    }

    /// Scatter one element over the map
    fn fill(&mut self, element_id: usize, element: &LevelElement, rng: &mut Pcg32) -> usize {
        let region = element.region_size.max(1) as usize;
        let stride = region + element.region_buffer as usize;
        // Remainders are left empty
        let regions_x = self.x_len / stride;
        let regions_y = self.y_len / stride;

        let mut regions: Vec<usize> = (0..regions_x * regions_y).collect();
        regions.shuffle(rng);

        let cell_len = region * region;
        let mut offsets: Vec<usize> = (0..cell_len).collect();
        let mut placed = 0;

        for &r in regions.iter().take(element.generate_count as usize) {
            let start = (r / regions_x) * stride * self.x_len + (r % regions_x) * stride;
            if cell_len > 1 {
                offsets.shuffle(rng);
            }
            for &off in &offsets {
                let cell = start + (off / region) * self.x_len + off % region;
                if self.try_place(cell, element_id, element) {
                    placed += 1;
                    break;
                }
                if element.replace_mode != ReplaceMode::Retry {
                    break;
                }
            }
        }
        placed
    }

    fn try_place(&mut self, cell: usize, element_id: usize, element: &LevelElement) -> bool {
        let replace = element.replace_mode == ReplaceMode::Replace;
        if !replace && self.cells[cell].is_some() {
            return false;
        }

        let r = element.clear_region_size as usize;
        if r > 0 {
            let (cx, cy) = (cell % self.x_len, cell / self.x_len);
            let xs = cx.saturating_sub(r)..=(cx + r).min(self.x_len - 1);
            let ys = cy.saturating_sub(r)..=(cy + r).min(self.y_len - 1);

            for y in ys {
                for x in xs.clone() {
                    let c = &mut self.cells[y * self.x_len + x];
                    if replace {
                        *c = None;
                    } else if c.is_some() {
                        return false;
                    }
                }
            }
        }

        self.cells[cell] = Some(element_id);
        true
    }
}

// =============================================================================
// LevelGenerator
// =============================================================================

/// Bookkeeping for one instantiated block
#[derive(Debug)]
struct ActiveBlock {
    block: Rc<RefCell<LevelBlock>>,
    element: Option<ElementHandle>,
}

pub struct LevelGenerator {
    core: EventCore,
    manager: Manager,
    canvas: Rc<RefCell<Canvas>>,
    collision: Option<Rc<RefCell<CollisionSpace>>>,
    elements: SlotVec<LevelElement>,
    templates: SlotVec<LevelTemplate>,
    active: BTreeMap<Id, ActiveBlock>,
    rng: Pcg32,
}

impl LevelGenerator {
    pub fn new(manager: Manager, canvas: Rc<RefCell<Canvas>>) -> Self {
        Self {
            core: EventCore::new(),
            manager,
            canvas,
            collision: None,
            elements: SlotVec::new(),
            templates: SlotVec::new(),
            active: BTreeMap::new(),
            rng: Pcg32::seed_from_u64(DEFAULT_SEED),
        }
    }

    /// Give generated blocks collision bodies in `space`
    pub fn with_collision(mut self, space: Rc<RefCell<CollisionSpace>>) -> Self {
        self.collision = Some(space);
        self
    }

    pub fn shared(self) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(self))
    }

    // =========================================================================
    // Elements and templates
    // =========================================================================

    pub fn add_level_element(&mut self, element: LevelElement) -> usize {
        self.elements.insert(element)
    }

    /// Other element ids are unchanged
    pub fn remove_level_element(&mut self, id: usize) -> bool {
        self.elements.remove(id).is_some()
    }

    pub fn level_element(&self, id: usize) -> Option<&LevelElement> {
        self.elements.get(id)
    }

    pub fn add_level_template(&mut self, template: LevelTemplate) -> Result<usize, LevelError> {
        if template.cell_width <= 0 || template.cell_height <= 0 {
            return Err(LevelError::InvalidCellSize {
                w: template.cell_width,
                h: template.cell_height,
            });
        }
        Ok(self.templates.insert(template))
    }

    /// Other template ids are unchanged
    pub fn remove_level_template(&mut self, id: usize) -> bool {
        self.templates.remove(id).is_some()
    }

    /// Reseed the shuffle RNG. A zero seed is replaced by the current time.
    /// Returns the seed used.
    pub fn seed_random_generator(&mut self, seed: u64) -> u64 {
        let seed = if seed == 0 {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(DEFAULT_SEED)
                .max(1)
        } else {
            seed
        };
        self.rng = Pcg32::seed_from_u64(seed);
        seed
    }

    // =========================================================================
    // Generation
    // =========================================================================

    /// Generate a level on top of whatever is already placed. Returns the
    /// number of blocks added.
    pub fn generate_level_from_template(&mut self, id: usize) -> Result<usize, LevelError> {
        let template = self.templates.get(id).ok_or(LevelError::UnknownTemplate(id))?.clone();
        let (x_len, y_len) = (template.grid_x_len as usize, template.grid_y_len as usize);
        let mut map = CellMap::new(x_len, y_len);

        for &element_id in &template.elements {
            let Some(element) = self.elements.get(element_id) else {
                log::warn!("LevelGenerator: template {id} names missing element {element_id}");
                continue;
            };
            let placed = map.fill(element_id, element, &mut self.rng);
            if placed < element.generate_count as usize {
                log::debug!(
                    "LevelGenerator: element {element_id} placed {placed} of {}",
                    element.generate_count
                );
            }
        }

        let mut added = 0;
        for y in 0..y_len {
            for x in 0..x_len {
                let Some(element_id) = map.cells[y * x_len + x] else {
                    continue;
                };
                let px = template.offset_x + template.cell_width * x as i32;
                let py = template.offset_y + template.cell_height * y as i32;
                match self.add_element_at(element_id, px, py, template.cell_width, template.cell_height) {
                    Ok(_) => added += 1,
                    Err(e) => log::error!("LevelGenerator: cell ({x}, {y}) not instantiated: {e}"),
                }
            }
        }

        log::info!("LevelGenerator: template {id} generated {added} blocks");
        Ok(added)
    }

    /// Place one block with its top-left (or centre, for `Centered`) at `(x, y)`
    pub fn add_block_at(&mut self, element_id: usize, x: i32, y: i32) -> Result<Id, LevelError> {
        self.add_element_at(element_id, x, y, 0, 0)
    }

    /// Place one block inside the `region_w` x `region_h` box at `(x, y)`
    pub fn add_block_in_region(
        &mut self,
        element_id: usize,
        x: i32,
        y: i32,
        region_w: i32,
        region_h: i32,
    ) -> Result<Id, LevelError> {
        self.add_element_at(element_id, x, y, region_w, region_h)
    }

    fn add_element_at(
        &mut self,
        element_id: usize,
        x: i32,
        y: i32,
        region_w: i32,
        region_h: i32,
    ) -> Result<Id, LevelError> {
        let element = self
            .elements
            .get(element_id)
            .ok_or(LevelError::UnknownElement(element_id))?;

        let mut canvas = self.canvas.try_borrow_mut().map_err(|_| LevelError::Busy("canvas"))?;
        let mut space = match &self.collision {
            Some(space) if element.collision.is_some() => {
                Some(space.try_borrow_mut().map_err(|_| LevelError::Busy("collision space"))?)
            }
            _ => None,
        };

        let block = Rc::new(RefCell::new(LevelBlock::new(element_id, element)));
        let id = self.manager.register_eventable(&block);
        if id.is_null() {
            return Err(LevelError::Unregistered);
        }
        if let Some(group) = element.group {
            if let Err(e) = self.manager.add_eventable_to_group(id, group) {
                log::warn!("LevelGenerator: block {id} not added to its group: {e}");
            }
        }

        let x = x + element.cell_offset_x.resolve(region_w, element.width);
        let y = y + element.cell_offset_y.resolve(region_h, element.height);
        let handle = canvas.add_block_at(&block, x, y);

        if let (Some(space), Some(template)) = (space.as_mut(), &element.collision) {
            let added = match template {
                CollisionTemplate::Object { hitbox } => {
                    let mut obj = CollisionObject::new(id, placed(hitbox, x, y));
                    obj.element = handle;
                    space.try_add_object(obj)
                }
                CollisionTemplate::Actor { hitbox, vel, mode } => {
                    let mut actor = CollisionActor::new(id, placed(hitbox, x, y))
                        .with_velocity(vel.x, vel.y)
                        .with_mode(mode.clone());
                    actor.element = handle;
                    space.try_add_actor(actor)
                }
            };
            if let Err(e) = added {
                log::error!("LevelGenerator: block {id} has no collision body: {e}");
            }
        }

        self.active.insert(id, ActiveBlock { block, element: handle });
        Ok(id)
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Remove every generated block. Returns how many were removed.
    pub fn clear_level(&mut self) -> usize {
        let active = std::mem::take(&mut self.active);
        let n = active.len();
        for (id, ab) in active {
            self.release(id, &ab);
        }
        n
    }

    /// Remove a generated block from the canvas, collision space and manager
    pub fn remove_block(&mut self, id: Id) -> Result<(), LevelError> {
        let ab = self.active.remove(&id).ok_or(LevelError::UnknownBlock(id))?;
        self.release(id, &ab);
        Ok(())
    }

    /// Swap a generated block for a new one built from `element_id`, centred
    /// where the old one was when the element is `Centered`
    pub fn replace_block(&mut self, id: Id, element_id: usize) -> Result<Id, LevelError> {
        if self.elements.get(element_id).is_none() {
            return Err(LevelError::UnknownElement(element_id));
        }
        let ab = self.active.get(&id).ok_or(LevelError::UnknownBlock(id))?;
        let (x, y, w, h) = {
            let canvas = self.canvas.try_borrow().map_err(|_| LevelError::Busy("canvas"))?;
            let e = ab
                .element
                .and_then(|h| canvas.element(h))
                .ok_or(LevelError::UnknownBlock(id))?;
            (e.x, e.y, e.width(), e.height())
        };

        self.remove_block(id)?;
        self.add_element_at(element_id, x, y, w, h)
    }

    fn release(&self, id: Id, ab: &ActiveBlock) {
        if let Some(handle) = ab.element {
            match self.canvas.try_borrow_mut() {
                Ok(mut canvas) => {
                    canvas.remove_element(handle);
                }
                Err(_) => log::error!("LevelGenerator: canvas busy, block {id} left on it"),
            }
        }
        if let Some(space) = &self.collision {
            match space.try_borrow_mut() {
                Ok(mut space) => space.remove_object_or_actor(id),
                Err(_) => log::error!("LevelGenerator: collision space busy, block {id} left in it"),
            }
        }
        self.manager.deregister_eventable(id);
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn active_block_ids(&self) -> Vec<Id> {
        self.active.keys().copied().collect()
    }

    pub fn active_block_count(&self) -> usize {
        self.active.len()
    }

    pub fn block(&self, id: Id) -> Option<Rc<RefCell<LevelBlock>>> {
        self.active.get(&id).map(|ab| ab.block.clone())
    }

    pub fn block_element(&self, id: Id) -> Option<ElementHandle> {
        self.active.get(&id).and_then(|ab| ab.element)
    }
}

fn placed(hitbox: &Hitbox, x: i32, y: i32) -> Hitbox {
    Hitbox::new(hitbox.x + x, hitbox.y + y, hitbox.w, hitbox.h)
}

impl Eventable for LevelGenerator {
    fn core(&self) -> &EventCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EventCore {
        &mut self.core
    }

    fn action(&mut self, a: &BlockAction) {
        let BlockAction::Generate(g) = *a else {
            return;
        };
        let result = match g {
            GenerateAction::LevelTemplate { template } => self.generate_level_from_template(template).map(drop),
            GenerateAction::ClearLevel => {
                self.clear_level();
                Ok(())
            }
            GenerateAction::RemoveBlock { id } | GenerateAction::RemoveSender { sender: id } => self.remove_block(id),
            GenerateAction::AddBlockAt { element, x, y } => self.add_block_at(element, x, y).map(drop),
            GenerateAction::ReplaceSender { element, sender } => self.replace_block(sender, element).map(drop),
        };
        if let Err(e) = result {
            log::error!("LevelGenerator: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{CollisionProperties, WrapType};
    use crate::event::{EventType, ScreenPoint};
    use crate::manager::Connection;

    const CELL: i32 = 40;

    struct Rig {
        manager: Manager,
        canvas: Rc<RefCell<Canvas>>,
        space: Rc<RefCell<CollisionSpace>>,
        generator: Rc<RefCell<LevelGenerator>>,
        generator_id: Id,
    }

    fn rig() -> Rig {
        let manager = Manager::default();
        let canvas = Canvas::new(400, 400).shared();
        let props = CollisionProperties {
            grid_x_len: 2,
            grid_y_len: 2,
            chunk_size_x: 200,
            chunk_size_y: 200,
            wrap_x: WrapType::None,
            wrap_y: WrapType::None,
        };
        let space = Rc::new(RefCell::new(CollisionSpace::new(props, canvas.clone()).unwrap()));
        manager.register_eventable(&space);
        manager.add_frame_processor(&space);

        let generator = LevelGenerator::new(manager.clone(), canvas.clone())
            .with_collision(space.clone())
            .shared();
        let generator_id = manager.register_eventable(&generator);
        Rig {
            manager,
            canvas,
            space,
            generator,
            generator_id,
        }
    }

    fn template(x_len: u32, y_len: u32, elements: Vec<usize>) -> LevelTemplate {
        LevelTemplate {
            cell_width: CELL,
            cell_height: CELL,
            grid_x_len: x_len,
            grid_y_len: y_len,
            offset_x: 0,
            offset_y: 0,
            elements,
        }
    }

    fn element(count: u32, mode: ReplaceMode) -> LevelElement {
        LevelElement {
            generate_count: count,
            replace_mode: mode,
            ..LevelElement::new(10, 10)
        }
    }

    /// Grid cells of every generated block, sorted
    fn cells(generator: &LevelGenerator, canvas: &Canvas) -> Vec<(i32, i32, usize)> {
        let mut out: Vec<_> = generator
            .active_block_ids()
            .into_iter()
            .filter_map(|id| {
                let e = canvas.element(generator.block_element(id)?)?;
                let element_id = generator.block(id)?.borrow().element_id();
                Some((e.x / CELL, e.y / CELL, element_id))
            })
            .collect();
        out.sort();
        out
    }

    #[test]
    fn test_same_seed_same_level() {
        let layout = |seed: u64| {
            let r = rig();
            let mut g = r.generator.borrow_mut();
            g.seed_random_generator(seed);
            let e = g.add_level_element(LevelElement {
                region_size: 2,
                ..element(5, ReplaceMode::Retry)
            });
            let t = g.add_level_template(template(8, 8, vec![e])).unwrap();
            assert_eq!(g.generate_level_from_template(t), Ok(5));
            cells(&g, &r.canvas.borrow())
        };
        assert_eq!(layout(42), layout(42));
        assert_eq!(layout(7).len(), 5);
    }

    #[test]
    fn test_zero_seed_uses_clock() {
        let r = rig();
        let seed = r.generator.borrow_mut().seed_random_generator(0);
        assert_ne!(seed, 0);
        assert_eq!(r.generator.borrow_mut().seed_random_generator(9), 9);
    }

    #[test]
    fn test_skip_never_overwrites_and_replace_always_places() {
        let r = rig();
        let mut g = r.generator.borrow_mut();
        let fill = g.add_level_element(element(16, ReplaceMode::Retry));
        let skip = g.add_level_element(element(16, ReplaceMode::Skip));
        let replace = g.add_level_element(element(3, ReplaceMode::Replace));

        let t = g.add_level_template(template(4, 4, vec![fill, skip])).unwrap();
        assert_eq!(g.generate_level_from_template(t), Ok(16));
        assert!(cells(&g, &r.canvas.borrow()).iter().all(|c| c.2 == fill));
        g.clear_level();

        let t = g.add_level_template(template(4, 4, vec![fill, replace])).unwrap();
        assert_eq!(g.generate_level_from_template(t), Ok(16));
        let placed = cells(&g, &r.canvas.borrow());
        assert_eq!(placed.iter().filter(|c| c.2 == replace).count(), 3);
    }

    #[test]
    fn test_retry_fills_free_cells_in_region() {
        let r = rig();
        let mut g = r.generator.borrow_mut();
        let a = g.add_level_element(LevelElement {
            region_size: 2,
            ..element(4, ReplaceMode::Retry)
        });
        let t = g.add_level_template(template(4, 4, vec![a, a, a])).unwrap();
        // Each 2x2 region takes one block per pass
        assert_eq!(g.generate_level_from_template(t), Ok(12));

        let placed = cells(&g, &r.canvas.borrow());
        let mut unique = placed.clone();
        unique.dedup();
        assert_eq!(unique.len(), 12);
    }

    #[test]
    fn test_clear_region_keeps_blocks_apart() {
        let r = rig();
        let mut g = r.generator.borrow_mut();
        let e = g.add_level_element(LevelElement {
            clear_region_size: 1,
            ..element(25, ReplaceMode::Retry)
        });
        let t = g.add_level_template(template(5, 5, vec![e])).unwrap();
        let n = g.generate_level_from_template(t).unwrap();
        assert!(n >= 4);

        let placed = cells(&g, &r.canvas.borrow());
        for (i, a) in placed.iter().enumerate() {
            for b in &placed[i + 1..] {
                assert!((a.0 - b.0).abs() > 1 || (a.1 - b.1).abs() > 1, "{a:?} next to {b:?}");
            }
        }
    }

    #[test]
    fn test_region_buffer_spaces_regions() {
        let r = rig();
        let mut g = r.generator.borrow_mut();
        let e = g.add_level_element(LevelElement {
            region_buffer: 1,
            ..element(10, ReplaceMode::Retry)
        });
        let t = g.add_level_template(template(5, 5, vec![e])).unwrap();
        // Stride 2 leaves a 2x2 set of regions
        assert_eq!(g.generate_level_from_template(t), Ok(4));
        let placed = cells(&g, &r.canvas.borrow());
        assert!(placed.iter().all(|c| c.0 % 2 == 0 && c.1 % 2 == 0));
    }

    #[test]
    fn test_offsets() {
        let r = rig();
        let mut g = r.generator.borrow_mut();
        let centered = g.add_level_element(LevelElement {
            cell_offset_x: CellOffset::Centered,
            cell_offset_y: CellOffset::Centered,
            ..LevelElement::new(10, 10)
        });
        let shifted = g.add_level_element(LevelElement {
            cell_offset_x: CellOffset::Px(3),
            cell_offset_y: CellOffset::Px(-2),
            ..LevelElement::new(10, 10)
        });

        let pos = |g: &LevelGenerator, id: Id| {
            let canvas = r.canvas.borrow();
            let e = canvas.element(g.block_element(id).unwrap()).unwrap();
            (e.x, e.y)
        };

        let id = g.add_block_in_region(centered, 100, 100, 40, 40).unwrap();
        assert_eq!(pos(&*g, id), (115, 115));
        let id = g.add_block_at(centered, 100, 100).unwrap();
        assert_eq!(pos(&*g, id), (95, 95));
        let id = g.add_block_at(shifted, 100, 100).unwrap();
        assert_eq!(pos(&*g, id), (103, 98));
    }

    #[test]
    fn test_replace_block_keeps_centre() {
        let r = rig();
        let mut g = r.generator.borrow_mut();
        let small = g.add_level_element(LevelElement {
            cell_offset_x: CellOffset::Centered,
            cell_offset_y: CellOffset::Centered,
            ..LevelElement::new(10, 10)
        });
        let big = g.add_level_element(LevelElement {
            cell_offset_x: CellOffset::Centered,
            cell_offset_y: CellOffset::Centered,
            ..LevelElement::new(20, 20)
        });

        let old = g.add_block_in_region(small, 0, 0, 40, 40).unwrap();
        let new = g.replace_block(old, big).unwrap();
        assert!(!r.manager.is_registered(old));
        assert_eq!(g.active_block_ids(), vec![new]);

        let canvas = r.canvas.borrow();
        let e = canvas.element(g.block_element(new).unwrap()).unwrap();
        assert_eq!((e.x, e.y), (10, 10));
        assert_eq!(g.block(new).unwrap().borrow().element_id(), big);

        assert_eq!(g.replace_block(new, 99), Err(LevelError::UnknownElement(99)));
        assert_eq!(g.replace_block(Id(500), big), Err(LevelError::UnknownBlock(Id(500))));
    }

    #[test]
    fn test_removal_cleans_up_everywhere() {
        let r = rig();
        let mut g = r.generator.borrow_mut();
        let wall = g.add_level_element(LevelElement {
            collision: Some(CollisionTemplate::Object {
                hitbox: Hitbox::new(0, 0, 10, 10),
            }),
            ..element(6, ReplaceMode::Retry)
        });
        let t = g.add_level_template(template(4, 4, vec![wall])).unwrap();
        assert_eq!(g.generate_level_from_template(t), Ok(6));
        assert_eq!(r.space.borrow().object_count(), 6);

        let id = g.active_block_ids()[0];
        let obj = r.space.borrow().object(id).cloned().unwrap();
        let e = r.canvas.borrow().element(obj.element.unwrap()).cloned().unwrap();
        assert_eq!((obj.hitbox.x, obj.hitbox.y), (e.x, e.y));

        g.remove_block(id).unwrap();
        assert!(!r.space.borrow().contains(id));
        assert!(!r.manager.is_registered(id));
        assert_eq!(r.canvas.borrow().len(), 5);
        assert_eq!(g.remove_block(id), Err(LevelError::UnknownBlock(id)));

        assert_eq!(g.clear_level(), 5);
        assert!(r.canvas.borrow().is_empty());
        assert_eq!(r.space.borrow().object_count(), 0);
        // Only the collision space and the generator are left
        assert_eq!(r.manager.block_count(), 2);
    }

    #[test]
    fn test_generate_actions_through_manager() {
        let r = rig();
        let (e, t) = {
            let mut g = r.generator.borrow_mut();
            let e = g.add_level_element(element(3, ReplaceMode::Retry));
            let t = g.add_level_template(template(4, 4, vec![e])).unwrap();
            (e, t)
        };
        let trigger = crate::block::testing::Recorder::new().shared();
        let trigger_id = r.manager.register_eventable(&trigger);
        let press = EventType::PRESS_DOWN;
        let wire = |action| {
            r.manager
                .add_event_action_connection(Connection::new(trigger_id, press, r.generator_id, action))
                .unwrap()
        };

        let c = wire(BlockAction::Generate(GenerateAction::LevelTemplate { template: t }));
        trigger.borrow().send_event(EventKind::Screen(ScreenEvent::PressDown, ScreenPoint::default()));
        r.manager.process_all_block_events();
        assert_eq!(r.generator.borrow().active_block_count(), 3);
        r.manager.remove_event_action_connection(c);

        let c = wire(BlockAction::Generate(GenerateAction::AddBlockAt { element: e, x: 5, y: 6 }));
        trigger.borrow().send_event(EventKind::Screen(ScreenEvent::PressDown, ScreenPoint::default()));
        r.manager.process_all_block_events();
        assert_eq!(r.generator.borrow().active_block_count(), 4);
        r.manager.remove_event_action_connection(c);

        wire(BlockAction::Generate(GenerateAction::ClearLevel));
        trigger.borrow().send_event(EventKind::Screen(ScreenEvent::PressDown, ScreenPoint::default()));
        r.manager.process_all_block_events();
        assert_eq!(r.generator.borrow().active_block_count(), 0);
    }

    #[test]
    fn test_colliding_actor_removes_itself() {
        let r = rig();
        let group = r.manager.register_group();
        let ball = {
            let mut g = r.generator.borrow_mut();
            let e = g.add_level_element(LevelElement {
                collision: Some(CollisionTemplate::Actor {
                    hitbox: Hitbox::new(0, 0, 10, 10),
                    vel: Vec2::new(600.0, 0.0),
                    mode: VelocityMode::Constant,
                }),
                group: Some(group),
                ..LevelElement::new(10, 10)
            });
            g.add_block_at(e, 50, 50).unwrap()
        };
        assert_eq!(r.manager.group_members(group), vec![ball]);
        r.space
            .borrow_mut()
            .try_add_object(CollisionObject::new(Id(900), Hitbox::new(120, 40, 10, 30)))
            .unwrap();

        r.manager
            .add_event_action_connection(Connection::new(
                group,
                EventType::COLLIDED_WITH,
                r.generator_id,
                BlockAction::Generate(GenerateAction::RemoveSender { sender: Id::NULL }),
            ))
            .unwrap();

        for _ in 0..12 {
            r.manager.frame(1000.0 / 60.0);
        }

        assert_eq!(r.generator.borrow().active_block_count(), 0);
        assert!(!r.space.borrow().contains(ball));
        assert!(!r.manager.is_registered(ball));
        assert!(r.manager.group_members(group).is_empty());
        assert!(r.canvas.borrow().is_empty());
    }

    #[test]
    fn test_level_block_events_and_steps() {
        let manager = Manager::default();
        let block = Rc::new(RefCell::new(LevelBlock::new(
            0,
            &LevelElement {
                steps: 3,
                ..LevelElement::new(20, 20)
            },
        )));
        let id = manager.register_eventable(&block);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        manager
            .add_event_action_connection(Connection::run_func(id, crate::event::EventFilter::Any, move |e| {
                sink.borrow_mut().push(e.event_type())
            }))
            .unwrap();

        let drag = BlockEvent::new(
            Id::MANAGER,
            EventKind::Screen(ScreenEvent::PressDrag, ScreenPoint::with_delta(15, 5, 10, 0)),
        );
        block.borrow_mut().event(&drag);
        manager.process_all_block_events();
        assert_eq!(
            *seen.borrow(),
            vec![
                EventType::Visual(VisualEvent::Drag),
                EventType::Visual(VisualEvent::DragOut)
            ]
        );

        let mut b = block.borrow_mut();
        b.action(&BlockAction::Step(StepAction::NextStep));
        b.action(&BlockAction::Step(StepAction::LastStep));
        assert_eq!(b.step(), 2);
        // No wrap unless asked for
        b.action(&BlockAction::Step(StepAction::NextStep));
        assert_eq!(b.step(), 2);
        b.action(&BlockAction::Step(StepAction::SetStep(7)));
        assert_eq!(b.step(), 2);
        b.action(&BlockAction::Step(StepAction::FirstStep));
        b.action(&BlockAction::Step(StepAction::PrevStep));
        assert_eq!(b.step(), 0);
    }

    #[test]
    fn test_level_data_from_json() {
        let element = LevelElement::from_json(
            r#"{
                "width": 16, "height": 8,
                "generate_count": 4,
                "cell_offset_x": "Centered",
                "cell_offset_y": {"Px": 2},
                "replace_mode": "Skip",
                "collision": {"Actor": {"hitbox": {"x": 0, "y": 0, "w": 16, "h": 8}, "vel": [30.0, 0.0]}}
            }"#,
        )
        .unwrap();
        assert_eq!(element.region_size, 1);
        assert_eq!(element.steps, 1);
        assert_eq!(element.cell_offset_x, CellOffset::Centered);
        assert_eq!(element.cell_offset_y, CellOffset::Px(2));
        assert_eq!(element.replace_mode, ReplaceMode::Skip);
        assert!(matches!(
            element.collision,
            Some(CollisionTemplate::Actor { vel, mode: VelocityMode::Constant, .. }) if vel == Vec2::new(30.0, 0.0)
        ));

        let t = LevelTemplate::from_json(r#"{"cell_width": 32, "cell_height": 32, "grid_x_len": 10, "elements": [0, 1]}"#)
            .unwrap();
        assert_eq!(t.grid_y_len, 0);
        assert_eq!(t.elements, vec![0, 1]);

        assert!(matches!(LevelTemplate::from_json("{"), Err(LevelError::Parse(_))));
    }

    #[test]
    fn test_bad_input() {
        let r = rig();
        let mut g = r.generator.borrow_mut();
        assert_eq!(
            g.add_level_template(template(0, 0, vec![])).map(|_| ()),
            Ok(())
        );
        assert_eq!(
            g.add_level_template(LevelTemplate::default()),
            Err(LevelError::InvalidCellSize { w: 0, h: 0 })
        );
        assert_eq!(g.generate_level_from_template(42), Err(LevelError::UnknownTemplate(42)));
        assert_eq!(g.add_block_at(3, 0, 0), Err(LevelError::UnknownElement(3)));

        // Missing elements in a template are skipped
        let e = g.add_level_element(element(2, ReplaceMode::Retry));
        let t = g.add_level_template(template(2, 2, vec![e, 17])).unwrap();
        assert!(g.remove_level_element(e));
        assert_eq!(g.generate_level_from_template(t), Ok(0));
    }
}
