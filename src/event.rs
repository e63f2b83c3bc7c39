//! Events (block → dispatch graph) and actions (dispatch graph → block)
//!
//! Both are plain values copied through the queue. Each category is its own
//! enum so dispatch matches are checked for exhaustiveness. The numeric codes
//! returned by `code()` keep the flat layout: one category bit above the low
//! byte, variant number in the low byte.

use glam::Vec2;

use crate::canvas::ElementHandle;
use crate::id::Id;

/// Category bits
pub mod category {
    pub const B1: u32 = 0x100;
    pub const B2: u32 = 0x200;
    pub const B3: u32 = 0x400;
    pub const B4: u32 = 0x800;
    pub const B5: u32 = 0x1000;
    pub const B6: u32 = 0x2000;
    pub const B7: u32 = 0x4000;
    pub const B8: u32 = 0x8000;
    pub const B9: u32 = 0x1_0000;
    pub const B10: u32 = 0x2_0000;
}

use category::*;

/// Screen-space coordinates carried by pointer-style events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenPoint {
    pub x: i32,
    pub y: i32,
    pub dx: i32,
    pub dy: i32,
}

impl ScreenPoint {
    pub fn at(x: i32, y: i32) -> Self {
        Self { x, y, dx: 0, dy: 0 }
    }

    pub fn with_delta(x: i32, y: i32, dx: i32, dy: i32) -> Self {
        Self { x, y, dx, dy }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScreenEvent {
    PressDown,
    PressUp,
    PressDrag,
    Hover,
    HoverEnter,
    HoverExit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisualEvent {
    PressDown,
    PressUp,
    Drag,
    DragOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonEvent {
    /// Fires on press up
    Pressed,
    Drag,
    DragOut,
    /// For selections, not normal presses
    PressDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanvasEvent {
    PressDown,
    PressUp,
    Drag,
    DragOut,
    /// x/y hold the new size
    Resize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollisionEvent {
    CollidedWith,
}

/// Event variant with its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Screen(ScreenEvent, ScreenPoint),
    Visual(VisualEvent, ScreenPoint),
    Button(ButtonEvent, ScreenPoint),
    Canvas(CanvasEvent, ScreenPoint),
    /// Id of the object/actor that was hit
    Collision(CollisionEvent, Id),
}

/// Payload-free event type, used as a connection filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Screen(ScreenEvent),
    Visual(VisualEvent),
    Button(ButtonEvent),
    Canvas(CanvasEvent),
    Collision(CollisionEvent),
}

impl EventType {
    pub const PRESS_DOWN: EventType = EventType::Screen(ScreenEvent::PressDown);
    pub const COLLIDED_WITH: EventType = EventType::Collision(CollisionEvent::CollidedWith);

    /// Flat numeric code (category bit + variant)
    pub fn code(self) -> u32 {
        match self {
            EventType::Screen(e) => B1 + e as u32 + 1,
            EventType::Visual(e) => B2 + e as u32 + 1,
            EventType::Button(e) => B3 + e as u32 + 1,
            EventType::Canvas(e) => B4 + e as u32 + 1,
            EventType::Collision(e) => B5 + e as u32 + 1,
        }
    }
}

impl EventKind {
    pub fn event_type(&self) -> EventType {
        match *self {
            EventKind::Screen(e, _) => EventType::Screen(e),
            EventKind::Visual(e, _) => EventType::Visual(e),
            EventKind::Button(e, _) => EventType::Button(e),
            EventKind::Canvas(e, _) => EventType::Canvas(e),
            EventKind::Collision(e, _) => EventType::Collision(e),
        }
    }

    /// Screen coordinates, for the categories that carry them
    pub fn screen(&self) -> Option<ScreenPoint> {
        match *self {
            EventKind::Screen(_, p)
            | EventKind::Visual(_, p)
            | EventKind::Button(_, p)
            | EventKind::Canvas(_, p) => Some(p),
            EventKind::Collision(..) => None,
        }
    }

    pub fn collided_with(id: Id) -> Self {
        EventKind::Collision(CollisionEvent::CollidedWith, id)
    }

    /// The other party of a collision event
    pub fn collided_with_id(&self) -> Option<Id> {
        match *self {
            EventKind::Collision(CollisionEvent::CollidedWith, id) => Some(id),
            _ => None,
        }
    }
}

/// An event tagged with the id of the block it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEvent {
    /// 0 for screen events coming from the manager
    pub origin: Id,
    pub kind: EventKind,
}

impl BlockEvent {
    pub fn new(origin: Id, kind: EventKind) -> Self {
        Self { origin, kind }
    }

    pub fn event_type(&self) -> EventType {
        self.kind.event_type()
    }
}

/// Connection event filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    Any,
    Only(EventType),
}

impl EventFilter {
    pub fn matches(self, ty: EventType) -> bool {
        match self {
            EventFilter::Any => true,
            EventFilter::Only(t) => t == ty,
        }
    }
}

impl From<EventType> for EventFilter {
    fn from(ty: EventType) -> Self {
        EventFilter::Only(ty)
    }
}

// =============================================================================
// Actions
// =============================================================================

/// Handled by the manager (destination = `Id::MANAGER`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemAction {
    Quit,
    /// Runs the connection's bound function with the triggering event
    RunFunc,
}

/// Visibility/enablement, applied by the manager directly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Show,
    Hide,
    ToggleVisible,
    Enable,
    Disable,
    ToggleEnabled,
    ShowEnable,
    HideDisable,
    ToggleVisibleEnabled,
}

impl LifecycleAction {
    /// Whether this action needs the Drawable capability
    pub fn touches_visibility(self) -> bool {
        !matches!(
            self,
            LifecycleAction::Enable | LifecycleAction::Disable | LifecycleAction::ToggleEnabled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    Enable,
    Disable,
    ToggleEnabled,
}

/// Handled by the canvas holding `element`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementAction {
    SetPos { x: i32, y: i32, element: Option<ElementHandle> },
    MoveBy { dx: i32, dy: i32, element: Option<ElementHandle> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    SetStep(usize),
    NextStep,
    PrevStep,
    FirstStep,
    LastStep,
}

/// Routed like any other action; no block in this crate handles it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAction {
    SetScrollPos { x: i32, y: i32 },
    MoveScrollBy { dx: i32, dy: i32 },
    ResetScroll,
    PauseScroll,
    ResumeScroll,
}

/// Routed like any other action; no block in this crate handles it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarIntAction {
    SetValue(i32),
    Inc,
    Dec,
    Add(i32),
    Sub(i32),
    Mult(i32),
    Div(i32),
}

/// Routed like any other action; no block in this crate handles it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioAction {
    PlaySound(usize),
    StopSound(usize),
    StopAllSounds,
    PlayMusic(usize),
    PlayMusicOnce(usize),
    PauseMusic,
    ResumeMusic,
    StopMusic,
    RewindMusic,
}

/// Handled by the collision space
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CollisionAction {
    RemoveObjectOrActor { id: Id },
    ActorSetVel { id: Id, vel: Vec2 },
    ActorStop { id: Id },
}

/// Handled by the level generator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateAction {
    LevelTemplate { template: usize },
    ClearLevel,
    RemoveBlock { id: Id },
    /// `sender` is filled in by the manager
    RemoveSender { sender: Id },
    AddBlockAt { element: usize, x: i32, y: i32 },
    /// `sender` is filled in by the manager
    ReplaceSender { element: usize, sender: Id },
}

/// A command delivered to a block
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlockAction {
    System(SystemAction),
    Block(LifecycleAction),
    Button(ButtonAction),
    Movement(MovementAction),
    Step(StepAction),
    Scroll(ScrollAction),
    VarInt(VarIntAction),
    Audio(AudioAction),
    Collision(CollisionAction),
    Generate(GenerateAction),
}

impl BlockAction {
    pub const QUIT: BlockAction = BlockAction::System(SystemAction::Quit);
    pub const RUN_FUNC: BlockAction = BlockAction::System(SystemAction::RunFunc);

    /// Flat numeric code (category bit + variant)
    pub fn code(&self) -> u32 {
        match *self {
            BlockAction::System(a) => B1 + a as u32 + 1,
            BlockAction::Block(a) => B2 + a as u32 + 1,
            BlockAction::Button(a) => B3 + a as u32 + 1,
            BlockAction::Movement(a) => {
                B4 + match a {
                    MovementAction::SetPos { .. } => 1,
                    MovementAction::MoveBy { .. } => 2,
                }
            }
            BlockAction::Step(a) => {
                B5 + match a {
                    StepAction::SetStep(_) => 1,
                    StepAction::NextStep => 2,
                    StepAction::PrevStep => 3,
                    StepAction::FirstStep => 4,
                    StepAction::LastStep => 5,
                }
            }
            BlockAction::Scroll(a) => {
                B6 + match a {
                    ScrollAction::SetScrollPos { .. } => 1,
                    ScrollAction::MoveScrollBy { .. } => 2,
                    ScrollAction::ResetScroll => 3,
                    ScrollAction::PauseScroll => 4,
                    ScrollAction::ResumeScroll => 5,
                }
            }
            BlockAction::VarInt(a) => {
                B7 + match a {
                    VarIntAction::SetValue(_) => 1,
                    VarIntAction::Inc => 2,
                    VarIntAction::Dec => 3,
                    VarIntAction::Add(_) => 4,
                    VarIntAction::Sub(_) => 5,
                    VarIntAction::Mult(_) => 6,
                    VarIntAction::Div(_) => 7,
                }
            }
            BlockAction::Audio(a) => {
                B8 + match a {
                    AudioAction::PlaySound(_) => 1,
                    AudioAction::StopSound(_) => 2,
                    AudioAction::StopAllSounds => 3,
                    AudioAction::PlayMusic(_) => 4,
                    AudioAction::PlayMusicOnce(_) => 5,
                    AudioAction::PauseMusic => 6,
                    AudioAction::ResumeMusic => 7,
                    AudioAction::StopMusic => 8,
                    AudioAction::RewindMusic => 9,
                }
            }
            BlockAction::Collision(a) => {
                B9 + match a {
                    CollisionAction::RemoveObjectOrActor { .. } => 1,
                    CollisionAction::ActorSetVel { .. } => 2,
                    CollisionAction::ActorStop { .. } => 3,
                }
            }
            BlockAction::Generate(a) => {
                B10 + match a {
                    GenerateAction::LevelTemplate { .. } => 1,
                    GenerateAction::ClearLevel => 2,
                    GenerateAction::RemoveBlock { .. } => 3,
                    GenerateAction::RemoveSender { .. } => 4,
                    GenerateAction::AddBlockAt { .. } => 5,
                    GenerateAction::ReplaceSender { .. } => 6,
                }
            }
        }
    }

    /// Fill in the parts of the payload that come from the triggering event
    pub(crate) fn populate_from(mut self, e: &BlockEvent) -> Self {
        match &mut self {
            BlockAction::Movement(MovementAction::SetPos { x, y, .. }) => {
                if let Some(p) = e.kind.screen() {
                    *x = p.x;
                    *y = p.y;
                }
            }
            BlockAction::Movement(MovementAction::MoveBy { dx, dy, .. }) => {
                if let Some(p) = e.kind.screen() {
                    *dx = p.dx;
                    *dy = p.dy;
                }
            }
            BlockAction::Generate(GenerateAction::RemoveSender { sender })
            | BlockAction::Generate(GenerateAction::ReplaceSender { sender, .. }) => {
                *sender = e.origin;
            }
            _ => {}
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_codes_match_flat_layout() {
        assert_eq!(EventType::PRESS_DOWN.code(), 0x101);
        assert_eq!(EventType::Screen(ScreenEvent::HoverExit).code(), 0x106);
        assert_eq!(EventType::Button(ButtonEvent::PressDown).code(), 0x404);
        assert_eq!(EventType::Canvas(CanvasEvent::Resize).code(), 0x805);
        // Collision lives in its own category bit
        assert_eq!(EventType::COLLIDED_WITH.code(), 0x1001);
    }

    #[test]
    fn test_action_codes_match_flat_layout() {
        assert_eq!(BlockAction::QUIT.code(), 0x101);
        assert_eq!(BlockAction::Block(LifecycleAction::ToggleVisibleEnabled).code(), 0x209);
        assert_eq!(
            BlockAction::Movement(MovementAction::MoveBy { dx: 0, dy: 0, element: None }).code(),
            0x802
        );
        assert_eq!(BlockAction::Audio(AudioAction::RewindMusic).code(), 0x8009);
        assert_eq!(
            BlockAction::Collision(CollisionAction::ActorStop { id: Id(3) }).code(),
            0x1_0003
        );
        assert_eq!(
            BlockAction::Generate(GenerateAction::ReplaceSender { element: 0, sender: Id(0) }).code(),
            0x2_0006
        );
    }

    #[test]
    fn test_populate_movement_from_screen_event() {
        let e = BlockEvent::new(
            Id(4),
            EventKind::Screen(ScreenEvent::PressDrag, ScreenPoint::with_delta(10, 20, 3, -2)),
        );
        let set = BlockAction::Movement(MovementAction::SetPos { x: 0, y: 0, element: None })
            .populate_from(&e);
        assert_eq!(set, BlockAction::Movement(MovementAction::SetPos { x: 10, y: 20, element: None }));

        let by = BlockAction::Movement(MovementAction::MoveBy { dx: 0, dy: 0, element: None })
            .populate_from(&e);
        assert_eq!(by, BlockAction::Movement(MovementAction::MoveBy { dx: 3, dy: -2, element: None }));
    }

    #[test]
    fn test_populate_keeps_default_payload_without_screen_coords() {
        let e = BlockEvent::new(Id(4), EventKind::collided_with(Id(9)));
        let set = BlockAction::Movement(MovementAction::SetPos { x: 7, y: 8, element: None })
            .populate_from(&e);
        assert_eq!(set, BlockAction::Movement(MovementAction::SetPos { x: 7, y: 8, element: None }));
    }

    #[test]
    fn test_populate_sender() {
        let e = BlockEvent::new(Id(12), EventKind::collided_with(Id(9)));
        let a = BlockAction::Generate(GenerateAction::ReplaceSender { element: 2, sender: Id::NULL })
            .populate_from(&e);
        assert_eq!(
            a,
            BlockAction::Generate(GenerateAction::ReplaceSender { element: 2, sender: Id(12) })
        );
    }
}
