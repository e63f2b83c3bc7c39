//! Blockwork - block scene toolkit
//!
//! Core modules:
//! - `manager`: Registry, event/action dispatch graph and frame loop
//! - `collision`: Grid-chunked collision space for moving actors
//! - `canvas`: Positioned block elements with hit-testing
//! - `level`: Procedural level generation from templates
//! - `event`/`queue`: Event and action values, bounded event queue
//! - `config`: Data-driven runtime settings

pub mod block;
pub mod canvas;
pub mod collision;
pub mod config;
pub mod error;
pub mod event;
pub mod id;
pub mod level;
pub mod manager;
pub mod queue;
pub mod slots;

pub use block::{BlockRef, DrawState, Drawable, EventCore, Eventable, FrameProcessor};
pub use canvas::{BlockElement, Canvas, ElementHandle};
pub use collision::{
    CollisionActor, CollisionObject, CollisionProperties, CollisionSpace, Hitbox, VelocityHook, VelocityMode,
    WrapType,
};
pub use config::Settings;
pub use error::{CollisionError, ConfigError, GraphError, LevelError};
pub use event::{BlockAction, BlockEvent, EventFilter, EventKind, EventType};
pub use id::{ConnId, Id};
pub use level::{CellOffset, CollisionTemplate, LevelBlock, LevelElement, LevelGenerator, LevelTemplate, ReplaceMode};
pub use manager::{Connection, Gate, InputEvent, InterruptHandle, Manager, MouseButton};
