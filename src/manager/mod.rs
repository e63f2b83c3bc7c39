//! Manager: block registry, dispatch graph and frame loop
//!
//! `Manager` is a cheap cloneable handle. Blocks, the level generator and the
//! demo loop all hold clones of the same context.
//!
//! Dispatch drains the shared event queue. For each event:
//! - the origin must be a live registered block
//! - connections from the origin block, then from each of its groups, are
//!   filtered by event type and gate
//! - each passing connection resolves its destination (block, group, SELF or
//!   the manager itself) and delivers its action
//!
//! Routing is computed with the registry borrowed; the borrow is released
//! before any block sees an action, so actions may register blocks, add
//! connections or send further events.

mod connection;
mod input;

pub use connection::{ActionFn, Connection, Gate, Predicate};
pub use input::{InputEvent, MouseButton};

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::block::{BlockRef, Eventable, FrameProcessor, WeakBlockRef};
use crate::canvas::Canvas;
use crate::config::Settings;
use crate::error::GraphError;
use crate::event::{BlockAction, BlockEvent, LifecycleAction, SystemAction};
use crate::id::{ConnId, Id, Target};
use crate::queue::{EventQueue, EventSender};
use crate::slots::SlotVec;

/// Registry entry of one block
#[derive(Debug)]
struct BlockConn {
    block: WeakBlockRef,
    /// Connections whose origin is this block
    conn_from: Vec<ConnId>,
    groups: Vec<Id>,
}

#[derive(Debug, Default)]
struct BlockGroup {
    members: SlotVec<Id>,
    /// Connections whose origin is this group
    conn_from: Vec<ConnId>,
}

#[derive(Debug)]
struct StoredConn {
    generation: u32,
    conn: Connection,
}

#[derive(Debug, Default)]
struct Graph {
    blocks: SlotVec<BlockConn>,
    groups: SlotVec<BlockGroup>,
    connections: SlotVec<StoredConn>,
    /// Stamped on the next stored connection
    next_generation: u32,
}

impl Graph {
    fn block(&self, id: Id) -> Option<&BlockConn> {
        match id.target() {
            Target::Block(slot) => self.blocks.get(slot),
            _ => None,
        }
    }

    fn block_mut(&mut self, id: Id) -> Option<&mut BlockConn> {
        match id.target() {
            Target::Block(slot) => self.blocks.get_mut(slot),
            _ => None,
        }
    }

    fn group(&self, id: Id) -> Option<&BlockGroup> {
        match id.target() {
            Target::Group(slot) => self.groups.get(slot),
            _ => None,
        }
    }

    fn group_mut(&mut self, id: Id) -> Option<&mut BlockGroup> {
        match id.target() {
            Target::Group(slot) => self.groups.get_mut(slot),
            _ => None,
        }
    }

    fn connection(&self, cid: ConnId) -> Option<&Connection> {
        self.connections
            .get(cid.index)
            .filter(|s| s.generation == cid.generation)
            .map(|s| &s.conn)
    }

    fn insert_connection(&mut self, conn: Connection) -> ConnId {
        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1);
        let index = self.connections.insert(StoredConn { generation, conn });
        ConnId { index, generation }
    }

    fn remove_connection(&mut self, cid: ConnId) -> Option<Connection> {
        self.connection(cid)?;
        self.connections.remove(cid.index).map(|s| s.conn)
    }

    fn live_block(&self, id: Id) -> Option<BlockRef> {
        self.block(id).and_then(|bc| bc.block.upgrade())
    }

    /// Connections in scope for an event from `origin` whose filter matches
    fn matching_connections(&self, e: &BlockEvent) -> Option<Vec<Connection>> {
        let bc = self.block(e.origin)?;
        let ty = e.event_type();
        let groups = bc.groups.iter().filter_map(|g| self.group(*g));
        let scopes = std::iter::once(&bc.conn_from).chain(groups.map(|g| &g.conn_from));

        Some(
            scopes
                .flatten()
                .filter_map(|cid| self.connection(*cid))
                .filter(|c| c.event.matches(ty))
                .cloned()
                .collect(),
        )
    }
}

#[derive(Default)]
struct Runtime {
    main_canvas: Option<Rc<RefCell<Canvas>>>,
    frame_processors: Vec<Weak<RefCell<dyn FrameProcessor>>>,
    frame_count: u64,
    frame_delta_ms: f64,
}

/// Loop state shared with interrupt sources on other threads
#[derive(Debug)]
struct LoopFlags {
    active: AtomicBool,
    quit: AtomicBool,
}

/// Handler run from an interrupt. May run on any thread.
pub type StateHandler = Arc<dyn Fn() + Send + Sync>;

/// Thread-safe handle for app lifecycle signals. Touches only atomics.
#[derive(Clone)]
pub struct InterruptHandle {
    flags: Arc<LoopFlags>,
    on_background: Option<StateHandler>,
    on_foreground: Option<StateHandler>,
}

impl InterruptHandle {
    pub fn on_background(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_background = Some(Arc::new(f));
        self
    }

    pub fn on_foreground(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_foreground = Some(Arc::new(f));
        self
    }

    /// Pause frames until brought back to the foreground
    pub fn to_background(&self) {
        self.flags.active.store(false, Ordering::Release);
        if let Some(f) = &self.on_background {
            f();
        }
    }

    pub fn to_foreground(&self) {
        self.flags.active.store(true, Ordering::Release);
        if let Some(f) = &self.on_foreground {
            f();
        }
    }

    pub fn request_quit(&self) {
        self.flags.quit.store(true, Ordering::Release);
    }
}

struct Inner {
    settings: Settings,
    graph: RefCell<Graph>,
    queue: Rc<RefCell<EventQueue>>,
    runtime: RefCell<Runtime>,
    flags: Arc<LoopFlags>,
}

/// Shared dispatch context
#[derive(Clone)]
pub struct Manager {
    inner: Rc<Inner>,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl Manager {
    pub fn new(settings: Settings) -> Self {
        let queue = Rc::new(RefCell::new(EventQueue::new(settings.event_queue_capacity)));
        Self {
            inner: Rc::new(Inner {
                settings,
                graph: RefCell::new(Graph::default()),
                queue,
                runtime: RefCell::new(Runtime::default()),
                flags: Arc::new(LoopFlags {
                    active: AtomicBool::new(true),
                    quit: AtomicBool::new(false),
                }),
            }),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    /// Register a block with the dispatch graph and give it a queue handle.
    /// Returns its id, or `Id::NULL` if the block is busy or already registered.
    pub fn register_eventable<B: Eventable + 'static>(&self, block: &Rc<RefCell<B>>) -> Id {
        let block: BlockRef = block.clone();
        self.register_block_ref(&block)
    }

    pub fn register_block_ref(&self, block: &BlockRef) -> Id {
        let Ok(mut b) = block.try_borrow_mut() else {
            log::error!("Manager: cannot register a block that is currently borrowed");
            return Id::NULL;
        };
        if b.core().is_registered() {
            log::error!("Manager: block is already registered as {}", b.connection_id());
            return Id::NULL;
        }

        let slot = self.inner.graph.borrow_mut().blocks.insert(BlockConn {
            block: Rc::downgrade(block),
            conn_from: Vec::new(),
            groups: Vec::new(),
        });
        let id = Id::from_block_slot(slot);
        b.core_mut().attach(id, EventSender::new(self.inner.queue.clone()));
        id
    }

    /// Remove a block from the registry and all of its groups. Connections
    /// from it go too; connections that target it are left in place.
    pub fn deregister_eventable(&self, id: Id) {
        let Target::Block(slot) = id.target() else {
            log::error!("Manager: cannot deregister {id}, not a block id");
            return;
        };

        let removed = {
            let mut graph = self.inner.graph.borrow_mut();
            let Some(bc) = graph.blocks.remove(slot) else {
                return;
            };
            for g in &bc.groups {
                if let Some(group) = graph.group_mut(*g) {
                    group.members.remove_value(&id);
                }
            }
            for cid in &bc.conn_from {
                graph.remove_connection(*cid);
            }
            bc
        };

        if let Some(block) = removed.block.upgrade() {
            match block.try_borrow_mut() {
                Ok(mut b) => b.core_mut().detach(),
                Err(_) => log::warn!("Manager: {id} deregistered while busy, its queue handle stays attached"),
            }
        }
    }

    pub fn is_registered(&self, id: Id) -> bool {
        self.inner.graph.borrow().block(id).is_some()
    }

    /// Live block behind a registered id
    pub fn block(&self, id: Id) -> Option<BlockRef> {
        self.inner.graph.borrow().live_block(id)
    }

    pub fn block_count(&self) -> usize {
        self.inner.graph.borrow().blocks.len()
    }

    // =========================================================================
    // Groups
    // =========================================================================

    pub fn register_group(&self) -> Id {
        let slot = self.inner.graph.borrow_mut().groups.insert(BlockGroup::default());
        Id::from_group_slot(slot)
    }

    /// Remove a group and drop it from every member's group list
    pub fn deregister_group(&self, id: Id) {
        let Target::Group(slot) = id.target() else {
            log::error!("Manager: cannot deregister {id}, not a group id");
            return;
        };
        let mut graph = self.inner.graph.borrow_mut();
        let Some(group) = graph.groups.remove(slot) else {
            return;
        };
        for member in group.members.values() {
            if let Some(bc) = graph.block_mut(*member) {
                bc.groups.retain(|g| *g != id);
            }
        }
    }

    /// Register a block and add it to `group` in one step
    pub fn register_eventable_in_group<B: Eventable + 'static>(&self, block: &Rc<RefCell<B>>, group: Id) -> Id {
        let id = self.register_eventable(block);
        if !id.is_null() {
            if let Err(e) = self.add_eventable_to_group(id, group) {
                log::error!("Manager: registered {id} but could not join group: {e}");
            }
        }
        id
    }

    pub fn add_eventable_to_group(&self, block: Id, group: Id) -> Result<(), GraphError> {
        let mut graph = self.inner.graph.borrow_mut();
        if graph.block(block).is_none() {
            return Err(GraphError::UnknownBlock(block));
        }
        let Some(g) = graph.group_mut(group) else {
            return Err(GraphError::UnknownGroup(group));
        };
        if g.members.position(|m| *m == block).is_none() {
            g.members.insert(block);
        }
        if let Some(bc) = graph.block_mut(block) {
            if !bc.groups.contains(&group) {
                bc.groups.push(group);
            }
        }
        Ok(())
    }

    pub fn remove_eventable_from_group(&self, block: Id, group: Id) -> Result<(), GraphError> {
        let mut graph = self.inner.graph.borrow_mut();
        let Some(bc) = graph.block_mut(block) else {
            return Err(GraphError::UnknownBlock(block));
        };
        bc.groups.retain(|g| *g != group);
        let Some(g) = graph.group_mut(group) else {
            return Err(GraphError::UnknownGroup(group));
        };
        g.members.remove_value(&block);
        Ok(())
    }

    /// Current members of a group, in slot order
    pub fn group_members(&self, group: Id) -> Vec<Id> {
        self.inner
            .graph
            .borrow()
            .group(group)
            .map(|g| g.members.values().copied().collect())
            .unwrap_or_default()
    }

    pub fn block_groups(&self, block: Id) -> Vec<Id> {
        self.inner
            .graph
            .borrow()
            .block(block)
            .map(|bc| bc.groups.clone())
            .unwrap_or_default()
    }

    // =========================================================================
    // Connections
    // =========================================================================

    /// Add a connection after checking both endpoints
    pub fn add_event_action_connection(&self, conn: Connection) -> Result<ConnId, GraphError> {
        let result = self.try_add_connection(conn);
        if let Err(e) = &result {
            log::error!("Manager: invalid connection: {e}");
        }
        result
    }

    fn try_add_connection(&self, conn: Connection) -> Result<ConnId, GraphError> {
        let mut graph = self.inner.graph.borrow_mut();

        let origin_ok = match conn.origin.target() {
            Target::Block(_) => graph.block(conn.origin).is_some(),
            Target::Group(_) => graph.group(conn.origin).is_some(),
            Target::Manager | Target::Origin => false,
        };
        if !origin_ok {
            return Err(GraphError::InvalidOrigin(conn.origin));
        }

        let dest_ok = match conn.destination.target() {
            Target::Manager | Target::Origin => true,
            Target::Block(_) => graph.block(conn.destination).is_some(),
            Target::Group(_) => graph.group(conn.destination).is_some(),
        };
        if !dest_ok {
            return Err(GraphError::InvalidDestination(conn.destination));
        }

        if conn.destination == Id::MANAGER && conn.action == BlockAction::RUN_FUNC && conn.run.is_none() {
            return Err(GraphError::MissingFunction);
        }

        let origin = conn.origin;
        let cid = graph.insert_connection(conn);
        if let Some(bc) = graph.block_mut(origin) {
            bc.conn_from.push(cid);
        } else if let Some(g) = graph.group_mut(origin) {
            g.conn_from.push(cid);
        }
        Ok(cid)
    }

    pub fn remove_event_action_connection(&self, cid: ConnId) -> bool {
        let mut graph = self.inner.graph.borrow_mut();
        let Some(conn) = graph.remove_connection(cid) else {
            return false;
        };
        if let Some(bc) = graph.block_mut(conn.origin) {
            bc.conn_from.retain(|c| *c != cid);
        } else if let Some(g) = graph.group_mut(conn.origin) {
            g.conn_from.retain(|c| *c != cid);
        }
        true
    }

    pub fn connection_count(&self) -> usize {
        self.inner.graph.borrow().connections.len()
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Queue an event as if `origin` had sent it
    pub fn send_event(&self, origin: Id, kind: crate::event::EventKind) -> bool {
        self.inner.queue.borrow_mut().send(origin, kind)
    }

    pub fn queued_events(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Events lost to a full queue since start
    pub fn dropped_events(&self) -> u64 {
        self.inner.queue.borrow().dropped()
    }

    /// Drain the event queue, routing every event through the connections
    pub fn process_all_block_events(&self) {
        let cap = self.inner.settings.max_events_per_drain;
        let mut handled = 0usize;

        loop {
            if handled >= cap {
                let left = self.queued_events();
                if left > 0 {
                    log::warn!("Manager: drain limit of {cap} events hit, {left} events wait for the next frame");
                }
                break;
            }
            let Some(e) = self.inner.queue.borrow_mut().recv() else {
                break;
            };
            handled += 1;
            self.dispatch(&e);
        }
    }

    fn dispatch(&self, e: &BlockEvent) {
        if e.origin.is_null() {
            log::error!("Manager: event {:?} queued with the reserved zero id", e.event_type());
            return;
        }

        let conns = self.inner.graph.borrow().matching_connections(e);
        let Some(conns) = conns else {
            log::error!("Manager: event from unregistered or removed block {}", e.origin);
            return;
        };

        for c in conns {
            if !c.gate.passes(e) {
                continue;
            }
            match c.destination.target() {
                Target::Manager => self.manager_action(&c, e),
                Target::Origin => self.send_action_to_id(e.origin, &c.action, e),
                Target::Group(_) => {
                    let members: Vec<(Id, Option<BlockRef>)> = {
                        let graph = self.inner.graph.borrow();
                        match graph.group(c.destination) {
                            Some(g) => g.members.values().map(|m| (*m, graph.live_block(*m))).collect(),
                            None => {
                                log::error!("Manager: action sent to removed group {}", c.destination);
                                continue;
                            }
                        }
                    };
                    for (id, block) in members {
                        match block {
                            Some(block) => self.send_action_to_block(&block, &c.action, e),
                            None => log::error!("Manager: group member {id} was dropped"),
                        }
                    }
                }
                Target::Block(_) => self.send_action_to_id(c.destination, &c.action, e),
            }
        }
    }

    fn manager_action(&self, c: &Connection, e: &BlockEvent) {
        match c.action {
            BlockAction::System(SystemAction::Quit) => {
                log::info!("Manager: quit requested by {}", e.origin);
                self.inner.flags.quit.store(true, Ordering::Release);
            }
            BlockAction::System(SystemAction::RunFunc) => match &c.run {
                Some(f) => f(e),
                None => log::error!("Manager: RunFunc connection has no function"),
            },
            other => log::error!("Manager: invalid action {:#x} sent to the manager", other.code()),
        }
    }

    fn send_action_to_id(&self, id: Id, template: &BlockAction, e: &BlockEvent) {
        let block = self.inner.graph.borrow().live_block(id);
        match block {
            Some(block) => self.send_action_to_block(&block, template, e),
            None => log::error!("Manager: action sent to removed block {id}"),
        }
    }

    fn send_action_to_block(&self, block: &BlockRef, template: &BlockAction, e: &BlockEvent) {
        let action = template.populate_from(e);
        let Ok(mut b) = block.try_borrow_mut() else {
            log::error!("Manager: action {:#x} dropped, target block is busy", action.code());
            return;
        };
        match action {
            BlockAction::Block(lifecycle) => apply_lifecycle(&mut *b, lifecycle),
            other => b.action(&other),
        }
    }

    // =========================================================================
    // Input and frames
    // =========================================================================

    pub fn set_main_canvas(&self, canvas: Rc<RefCell<Canvas>>) {
        self.inner.runtime.borrow_mut().main_canvas = Some(canvas);
    }

    pub fn main_canvas(&self) -> Option<Rc<RefCell<Canvas>>> {
        self.inner.runtime.borrow().main_canvas.clone()
    }

    /// Feed platform input through the main canvas, then drain events
    pub fn handle_input(&self, input: InputEvent) {
        let canvas = self.main_canvas();
        match (input, canvas) {
            (InputEvent::Resize { width, height }, Some(canvas)) => match canvas.try_borrow_mut() {
                Ok(mut c) => c.resize(width, height),
                Err(_) => log::error!("Manager: main canvas busy, resize dropped"),
            },
            (input, Some(canvas)) => {
                if let Some(kind) = input.to_screen_event() {
                    match canvas.try_borrow_mut() {
                        Ok(mut c) => c.event(&BlockEvent::new(Id::MANAGER, kind)),
                        Err(_) => log::error!("Manager: main canvas busy, input dropped"),
                    }
                }
            }
            (_, None) => log::warn!("Manager: input received before a main canvas was set"),
        }
        self.process_all_block_events();
    }

    pub fn add_frame_processor<P: FrameProcessor + 'static>(&self, proc: &Rc<RefCell<P>>) {
        let proc: Rc<RefCell<dyn FrameProcessor>> = proc.clone();
        self.inner
            .runtime
            .borrow_mut()
            .frame_processors
            .push(Rc::downgrade(&proc));
    }

    pub fn remove_frame_processor<P: FrameProcessor + 'static>(&self, proc: &Rc<RefCell<P>>) {
        let target = Rc::as_ptr(proc);
        self.inner
            .runtime
            .borrow_mut()
            .frame_processors
            .retain(|p| !std::ptr::addr_eq(p.as_ptr(), target));
    }

    /// Run one frame: drain queued events, then advance frame processors in
    /// the order they were added. Does nothing while in the background.
    pub fn frame(&self, delta_ms: f64) {
        if !self.is_active() {
            return;
        }
        {
            let mut rt = self.inner.runtime.borrow_mut();
            rt.frame_count += 1;
            rt.frame_delta_ms = delta_ms;
        }

        self.process_all_block_events();

        let procs: Vec<Rc<RefCell<dyn FrameProcessor>>> = {
            let mut rt = self.inner.runtime.borrow_mut();
            rt.frame_processors.retain(|p| p.strong_count() > 0);
            rt.frame_processors.iter().filter_map(Weak::upgrade).collect()
        };
        for p in procs {
            if !self.is_active() {
                break;
            }
            match p.try_borrow_mut() {
                Ok(mut p) => p.frame(delta_ms),
                Err(_) => log::error!("Manager: frame processor busy, skipped this frame"),
            }
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.inner.runtime.borrow().frame_count
    }

    pub fn frame_delta_ms(&self) -> f64 {
        self.inner.runtime.borrow().frame_delta_ms
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            flags: self.inner.flags.clone(),
            on_background: None,
            on_foreground: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.flags.active.load(Ordering::Acquire)
    }

    pub fn quit_requested(&self) -> bool {
        self.inner.flags.quit.load(Ordering::Acquire)
    }
}

/// Visibility and enablement actions are applied here, never forwarded.
///
/// # Panics
/// When a visibility action targets a block that is not drawable. That can
/// only come from a miswired connection.
fn apply_lifecycle(block: &mut dyn Eventable, a: LifecycleAction) {
    use LifecycleAction::*;

    if a.touches_visibility() {
        let id = block.connection_id();
        let Some(d) = block.as_drawable_mut() else {
            log::error!("Manager: {a:?} sent to non-drawable block {id}");
            panic!("visibility action {a:?} sent to non-drawable block {id}");
        };
        match a {
            Show | ShowEnable => d.show(),
            Hide | HideDisable => d.hide(),
            _ => d.toggle_visible(),
        }
    }

    let core = block.core_mut();
    match a {
        Enable | ShowEnable => core.enable(),
        Disable | HideDisable => core.disable(),
        ToggleEnabled | ToggleVisibleEnabled => core.toggle_enabled(),
        Show | Hide | ToggleVisible => {}
    }
}
