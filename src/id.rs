//! Identifiers shared by the dispatch graph and the collision space
//!
//! One `Id` field can name any endpoint of a connection:
//! - `Id::MANAGER` (0): the manager itself, also the "null" id
//! - `Id::SELF`: the block that sent the triggering event
//! - group ids: `GROUP_OFFSET + slot + 1`
//! - block ids: `slot + 1`
//!
//! Block ids double as collision object/actor ids.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Endpoint id for blocks, groups and the reserved sentinels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Id(pub usize);

/// What an `Id` refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Manager,
    /// Redeliver to the origin of the triggering event
    Origin,
    /// Group slot index
    Group(usize),
    /// Block slot index
    Block(usize),
}

impl Id {
    pub const MANAGER: Id = Id(0);
    /// Rejected registrations return this
    pub const NULL: Id = Id(0);
    pub const SELF: Id = Id(usize::MAX);
    /// Half of the id space; everything at or above it (except SELF) is a group
    pub const GROUP_OFFSET: usize = usize::MAX / 2;

    #[inline]
    pub fn from_block_slot(slot: usize) -> Self {
        Id(slot + 1)
    }

    #[inline]
    pub fn from_group_slot(slot: usize) -> Self {
        Id(Self::GROUP_OFFSET + slot + 1)
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn is_group(self) -> bool {
        self != Self::SELF && self.0 > Self::GROUP_OFFSET
    }

    /// Classify this id for dispatch
    pub fn target(self) -> Target {
        if self == Self::MANAGER {
            Target::Manager
        } else if self == Self::SELF {
            Target::Origin
        } else if self.0 > Self::GROUP_OFFSET {
            Target::Group(self.0 - Self::GROUP_OFFSET - 1)
        } else if self.0 == Self::GROUP_OFFSET {
            // Group zero is reserved, never allocated
            Target::Group(usize::MAX)
        } else {
            Target::Block(self.0 - 1)
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target() {
            Target::Manager => write!(f, "manager"),
            Target::Origin => write!(f, "self"),
            Target::Group(slot) => write!(f, "group#{}", slot.wrapping_add(1)),
            Target::Block(_) => write!(f, "block#{}", self.0),
        }
    }
}

/// Handle to a registered connection. A handle whose connection was removed
/// stays dead even after its slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnId {
    pub(crate) index: usize,
    pub(crate) generation: u32,
}
