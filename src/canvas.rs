//! Canvas: positioned block elements
//!
//! Elements live in a generation-checked arena. A stale `ElementHandle` (its
//! element was removed, the slot maybe reused) resolves to nothing instead of
//! aliasing the new occupant. Draw and hit-test order is insertion order.

use std::cell::RefCell;
use std::rc::Rc;

use crate::block::{BlockRef, DrawState, Drawable, EventCore, Eventable, WeakBlockRef};
use crate::event::{BlockAction, BlockEvent, CanvasEvent, EventKind, MovementAction, ScreenEvent, ScreenPoint};
use crate::id::Id;

/// Stable reference to a canvas element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    index: u32,
    generation: u32,
}

/// A block placed on a canvas
#[derive(Debug, Clone)]
pub struct BlockElement {
    pub x: i32,
    pub y: i32,
    block: WeakBlockRef,
    interactive: bool,
}

impl BlockElement {
    pub fn block(&self) -> Option<BlockRef> {
        self.block.upgrade()
    }

    pub fn width(&self) -> i32 {
        self.with_drawable(|d| d.width()).unwrap_or(0)
    }

    pub fn height(&self) -> i32 {
        self.with_drawable(|d| d.height()).unwrap_or(0)
    }

    /// Connection id of the placed block, `Id::NULL` if it is gone or busy
    pub fn connection_id(&self) -> Id {
        self.block
            .upgrade()
            .and_then(|b| b.try_borrow().ok().map(|b| b.connection_id()))
            .unwrap_or(Id::NULL)
    }

    fn with_drawable<R>(&self, f: impl FnOnce(&dyn Drawable) -> R) -> Option<R> {
        let block = self.block.upgrade()?;
        let b = block.try_borrow().ok()?;
        b.as_drawable().map(f)
    }
}

#[derive(Debug)]
struct Entry {
    generation: u32,
    element: Option<BlockElement>,
}

#[derive(Debug)]
pub struct Canvas {
    core: EventCore,
    draw: DrawState,
    entries: Vec<Entry>,
    free: Vec<u32>,
    /// Live handles, back to front
    order: Vec<ElementHandle>,
}

impl Canvas {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            core: EventCore::new(),
            draw: DrawState::new(width, height),
            entries: Vec::new(),
            free: Vec::new(),
            order: Vec::new(),
        }
    }

    pub fn shared(self) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(self))
    }

    /// Place a drawable block at `(x, y)`. Returns `None` if it cannot be drawn.
    pub fn add_block_at<B: Eventable + 'static>(
        &mut self,
        block: &Rc<RefCell<B>>,
        x: i32,
        y: i32,
    ) -> Option<ElementHandle> {
        let block: BlockRef = block.clone();
        self.add_block_ref_at(&block, x, y)
    }

    pub fn add_block_ref_at(&mut self, block: &BlockRef, x: i32, y: i32) -> Option<ElementHandle> {
        let interactive = {
            let b = block.try_borrow().ok()?;
            if b.as_drawable().is_none() {
                log::error!("Canvas: block {} is not drawable", b.connection_id());
                return None;
            }
            b.event_region().is_some()
        };

        let element = BlockElement {
            x,
            y,
            block: Rc::downgrade(block),
            interactive,
        };

        let handle = match self.free.pop() {
            Some(index) => {
                let entry = &mut self.entries[index as usize];
                entry.element = Some(element);
                ElementHandle {
                    index,
                    generation: entry.generation,
                }
            }
            None => {
                self.entries.push(Entry {
                    generation: 0,
                    element: Some(element),
                });
                ElementHandle {
                    index: (self.entries.len() - 1) as u32,
                    generation: 0,
                }
            }
        };
        self.order.push(handle);
        Some(handle)
    }

    /// Remove an element. The block itself is untouched.
    pub fn remove_element(&mut self, handle: ElementHandle) -> bool {
        let Some(entry) = self.entries.get_mut(handle.index as usize) else {
            return false;
        };
        if entry.generation != handle.generation || entry.element.is_none() {
            return false;
        }
        entry.element = None;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.order.retain(|h| *h != handle);
        true
    }

    pub fn element(&self, handle: ElementHandle) -> Option<&BlockElement> {
        let entry = self.entries.get(handle.index as usize)?;
        if entry.generation != handle.generation {
            return None;
        }
        entry.element.as_ref()
    }

    pub fn element_mut(&mut self, handle: ElementHandle) -> Option<&mut BlockElement> {
        let entry = self.entries.get_mut(handle.index as usize)?;
        if entry.generation != handle.generation {
            return None;
        }
        entry.element.as_mut()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn resize(&mut self, width: i32, height: i32) {
        let dx = width - self.draw.width;
        let dy = height - self.draw.height;
        self.draw.width = width;
        self.draw.height = height;
        self.core.send_event(EventKind::Canvas(
            CanvasEvent::Resize,
            ScreenPoint::with_delta(width, height, dx, dy),
        ));
    }

    /// Deliver a screen event to the topmost enabled element under it
    fn hit_test(&self, e: &BlockEvent, p: ScreenPoint) -> bool {
        for handle in self.order.iter().rev() {
            let Some(element) = self.element(*handle) else {
                continue;
            };
            if !element.interactive {
                continue;
            }
            let Some(block) = element.block() else {
                continue;
            };
            let Ok(mut b) = block.try_borrow_mut() else {
                log::warn!("Canvas: element block busy, skipping hit test");
                continue;
            };
            if !b.core().is_enabled() {
                continue;
            }
            let Some((w, h)) = b.event_region() else {
                continue;
            };

            let (x, y) = (element.x, element.y);
            if p.x >= x && p.y >= y && p.x <= x + w && p.y <= y + h {
                let mut local = p;
                local.x -= x;
                local.y -= y;
                let ty = match e.kind {
                    EventKind::Screen(ty, _) => ty,
                    _ => return false,
                };
                b.event(&BlockEvent::new(e.origin, EventKind::Screen(ty, local)));
                return true;
            }
        }
        false
    }

    fn send_canvas_event(&self, ty: ScreenEvent, p: ScreenPoint) {
        let canvas_ty = match ty {
            ScreenEvent::PressDown => CanvasEvent::PressDown,
            ScreenEvent::PressUp => CanvasEvent::PressUp,
            ScreenEvent::PressDrag => CanvasEvent::Drag,
            _ => return,
        };
        self.core.send_event(EventKind::Canvas(canvas_ty, p));
    }

    fn move_element(&mut self, handle: ElementHandle, mv: impl FnOnce(i32, i32) -> (i32, i32)) {
        let (cw, ch) = (self.draw.width, self.draw.height);
        let Some(element) = self.element_mut(handle) else {
            log::error!("Canvas: movement action for a missing element");
            return;
        };
        let (w, h) = (element.width(), element.height());
        let (x, y) = mv(element.x, element.y);
        element.x = x.min(cw - w).max(0);
        element.y = y.min(ch - h).max(0);
    }
}

impl Eventable for Canvas {
    fn core(&self) -> &EventCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EventCore {
        &mut self.core
    }

    fn event(&mut self, e: &BlockEvent) {
        if let EventKind::Screen(ty, p) = e.kind {
            if !self.hit_test(e, p) {
                self.send_canvas_event(ty, p);
            }
        }
    }

    fn action(&mut self, a: &BlockAction) {
        let BlockAction::Movement(m) = *a else {
            return;
        };
        match m {
            MovementAction::SetPos { x, y, element: Some(h) } => self.move_element(h, |_, _| (x, y)),
            MovementAction::MoveBy { dx, dy, element: Some(h) } => {
                self.move_element(h, |ox, oy| (ox + dx, oy + dy))
            }
            _ => log::error!("Canvas: movement action received without an element"),
        }
    }

    fn as_drawable(&self) -> Option<&dyn Drawable> {
        Some(self)
    }

    fn as_drawable_mut(&mut self) -> Option<&mut dyn Drawable> {
        Some(self)
    }
}

impl Drawable for Canvas {
    fn draw_state(&self) -> &DrawState {
        &self.draw
    }

    fn draw_state_mut(&mut self) -> &mut DrawState {
        &mut self.draw
    }
}
