//! Connections: declarative event → action edges

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::event::{BlockAction, BlockEvent, EventFilter};
use crate::id::Id;

/// Function bound to a `RunFunc` connection
pub type ActionFn = Rc<dyn Fn(&BlockEvent)>;
/// Predicate for an `IfFunc` gate
pub type Predicate = Rc<dyn Fn(&BlockEvent) -> bool>;

/// Condition checked before a matched connection fires
#[derive(Clone, Default)]
pub enum Gate {
    #[default]
    Always,
    IfFunc(Predicate),
    IfVar(Rc<Cell<bool>>),
}

impl Gate {
    pub fn passes(&self, e: &BlockEvent) -> bool {
        match self {
            Gate::Always => true,
            Gate::IfFunc(f) => f(e),
            Gate::IfVar(flag) => flag.get(),
        }
    }
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gate::Always => f.write_str("Always"),
            Gate::IfFunc(_) => f.write_str("IfFunc(..)"),
            Gate::IfVar(flag) => write!(f, "IfVar({})", flag.get()),
        }
    }
}

/// One edge of the dispatch graph
///
/// `action` is the action template: its payload is the default, and the
/// manager fills in movement coordinates and sender ids from the event.
#[derive(Clone)]
pub struct Connection {
    /// Block or group the event must come from
    pub origin: Id,
    /// Block, group, `Id::SELF` or `Id::MANAGER`
    pub destination: Id,
    pub event: EventFilter,
    pub action: BlockAction,
    pub gate: Gate,
    /// Only used by `RunFunc` to the manager
    pub run: Option<ActionFn>,
}

impl Connection {
    pub fn new(origin: Id, event: impl Into<EventFilter>, destination: Id, action: BlockAction) -> Self {
        Self {
            origin,
            destination,
            event: event.into(),
            action,
            gate: Gate::Always,
            run: None,
        }
    }

    /// Ask the loop to stop when `event` comes from `origin`
    pub fn quit(origin: Id, event: impl Into<EventFilter>) -> Self {
        Self::new(origin, event, Id::MANAGER, BlockAction::QUIT)
    }

    /// Call `f` with the triggering event
    pub fn run_func(origin: Id, event: impl Into<EventFilter>, f: impl Fn(&BlockEvent) + 'static) -> Self {
        let mut c = Self::new(origin, event, Id::MANAGER, BlockAction::RUN_FUNC);
        c.run = Some(Rc::new(f));
        c
    }

    pub fn if_func(mut self, f: impl Fn(&BlockEvent) -> bool + 'static) -> Self {
        self.gate = Gate::IfFunc(Rc::new(f));
        self
    }

    pub fn if_var(mut self, flag: Rc<Cell<bool>>) -> Self {
        self.gate = Gate::IfVar(flag);
        self
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("origin", &self.origin)
            .field("destination", &self.destination)
            .field("event", &self.event)
            .field("action", &self.action)
            .field("gate", &self.gate)
            .field("run", &self.run.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, EventType};

    #[test]
    fn test_gates() {
        let e = BlockEvent::new(Id(1), EventKind::collided_with(Id(4)));
        assert!(Gate::Always.passes(&e));

        let only_four = Gate::IfFunc(Rc::new(|e: &BlockEvent| e.kind.collided_with_id() == Some(Id(4))));
        assert!(only_four.passes(&e));
        assert!(!only_four.passes(&BlockEvent::new(Id(1), EventKind::collided_with(Id(5)))));

        let flag = Rc::new(Cell::new(false));
        let var = Gate::IfVar(flag.clone());
        assert!(!var.passes(&e));
        flag.set(true);
        assert!(var.passes(&e));
    }

    #[test]
    fn test_builders() {
        let c = Connection::quit(Id(2), EventType::PRESS_DOWN);
        assert_eq!(c.destination, Id::MANAGER);
        assert_eq!(c.action, BlockAction::QUIT);
        assert_eq!(c.event, EventFilter::Only(EventType::PRESS_DOWN));

        let c = Connection::run_func(Id(2), EventFilter::Any, |_| {});
        assert!(c.run.is_some());
        assert_eq!(c.event, EventFilter::Any);
    }
}
