//! Bounded event queue between blocks and the dispatch graph
//!
//! All sends happen on the frame thread before the manager drains the queue,
//! so a plain `Rc<RefCell<_>>` is enough. A full queue drops the event.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::event::{BlockEvent, EventKind};
use crate::id::Id;

/// Fixed-capacity FIFO ring of block events
#[derive(Debug)]
pub struct EventQueue {
    events: VecDeque<BlockEvent>,
    capacity: usize,
    dropped: u64,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Queue an event stamped with `origin`. Returns false (and drops it) when full.
    pub fn send(&mut self, origin: Id, kind: EventKind) -> bool {
        if self.events.len() >= self.capacity {
            self.dropped += 1;
            log::error!(
                "Event queue full ({} events), dropping {:?} from {}",
                self.capacity,
                kind.event_type(),
                origin
            );
            return false;
        }
        self.events.push_back(BlockEvent::new(origin, kind));
        true
    }

    pub fn recv(&mut self) -> Option<BlockEvent> {
        self.events.pop_front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total events dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Cloneable sending half handed to registered blocks
#[derive(Debug, Clone)]
pub struct EventSender {
    queue: Rc<RefCell<EventQueue>>,
}

impl EventSender {
    pub(crate) fn new(queue: Rc<RefCell<EventQueue>>) -> Self {
        Self { queue }
    }

    pub fn send(&self, origin: Id, kind: EventKind) -> bool {
        match self.queue.try_borrow_mut() {
            Ok(mut q) => q.send(origin, kind),
            Err(_) => {
                log::error!("Event queue busy, dropping {:?} from {}", kind.event_type(), origin);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ScreenEvent, ScreenPoint};

    fn press() -> EventKind {
        EventKind::Screen(ScreenEvent::PressDown, ScreenPoint::at(1, 2))
    }

    #[test]
    fn test_fifo_order_and_origin_stamp() {
        let mut q = EventQueue::new(4);
        assert!(q.send(Id(1), press()));
        assert!(q.send(Id(2), EventKind::collided_with(Id(7))));
        assert_eq!(q.len(), 2);

        let first = q.recv().unwrap();
        assert_eq!(first.origin, Id(1));
        let second = q.recv().unwrap();
        assert_eq!(second.origin, Id(2));
        assert_eq!(second.kind, EventKind::collided_with(Id(7)));
        assert!(q.recv().is_none());
    }

    #[test]
    fn test_overflow_drops_without_blocking() {
        let mut q = EventQueue::new(3);
        for i in 0..5 {
            q.send(Id(i + 1), press());
        }
        assert_eq!(q.len(), 3);
        assert_eq!(q.dropped(), 2);
        // The oldest events survive
        assert_eq!(q.recv().unwrap().origin, Id(1));
        assert_eq!(q.recv().unwrap().origin, Id(2));
        assert_eq!(q.recv().unwrap().origin, Id(3));
        assert!(q.is_empty());

        // Space frees up after draining
        assert!(q.send(Id(9), press()));
    }

    #[test]
    fn test_sender_shares_queue() {
        let queue = Rc::new(RefCell::new(EventQueue::new(8)));
        let a = EventSender::new(queue.clone());
        let b = a.clone();
        a.send(Id(1), press());
        b.send(Id(2), press());
        assert_eq!(queue.borrow().len(), 2);
    }
}
