use std::cell::{Cell, RefCell};
use std::mem;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::dom::Element;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootstrapPhase {
    #[default]
    Idle,
    Bootstrapping,
    Complete,
}

/// Holds connection routines back until every component of a batch is
/// defined, then replays them in arrival order.
#[derive(Default)]
pub struct DeferredConnections {
    phase: Cell<BootstrapPhase>,
    buffer: RefCell<Vec<Rc<Element>>>,
}

impl DeferredConnections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> BootstrapPhase {
        self.phase.get()
    }

    pub fn is_bootstrapping(&self) -> bool {
        self.phase.get() == BootstrapPhase::Bootstrapping
    }

    pub fn begin(&self) {
        self.phase.set(BootstrapPhase::Bootstrapping);
    }

    pub fn len(&self) -> usize {
        self.buffer.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.borrow().is_empty()
    }

    /// Buffers `element` while bootstrapping, otherwise runs `connect` now.
    /// Returns whether the connection was deferred.
    pub fn enqueue(&self, element: &Rc<Element>, connect: impl FnOnce(&Rc<Element>)) -> bool {
        if self.is_bootstrapping() {
            trace!(
                target: "bootstrap",
                element = %element.id(),
                tag = element.tag_name(),
                "deferring connection"
            );
            self.buffer.borrow_mut().push(Rc::clone(element));
            true
        } else {
            connect(element);
            false
        }
    }

    /// Leaves the bootstrapping phase and replays buffered connections.
    /// Elements that left the document meanwhile are skipped. Returns how
    /// many connections were replayed.
    pub fn complete(&self, mut connect: impl FnMut(&Rc<Element>)) -> usize {
        self.phase.set(BootstrapPhase::Complete);
        let buffered = mem::take(&mut *self.buffer.borrow_mut());
        let mut replayed = 0;
        for element in buffered {
            if !element.is_connected() {
                debug!(
                    target: "bootstrap",
                    element = %element.id(),
                    "skipping deferred connection of detached element"
                );
                continue;
            }
            connect(&element);
            replayed += 1;
        }
        replayed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Document, DocumentConfig};

    #[test]
    fn connects_immediately_outside_bootstrap() {
        let document = Document::new(DocumentConfig::default());
        let element = document.create_element("x-now");
        let queue = DeferredConnections::new();
        let mut connected = Vec::new();
        assert!(!queue.enqueue(&element, |el| connected.push(el.id())));
        assert_eq!(connected, vec![element.id()]);
    }

    #[test]
    fn replays_in_arrival_order() {
        let document = Document::new(DocumentConfig::default());
        let first = document.create_element("x-first");
        let second = document.create_element("x-second");
        document.append_child(&document.body(), &first).expect("append");
        document.append_child(&document.body(), &second).expect("append");

        let queue = DeferredConnections::new();
        queue.begin();
        assert!(queue.enqueue(&second, |_| panic!("must defer")));
        assert!(queue.enqueue(&first, |_| panic!("must defer")));
        assert_eq!(queue.len(), 2);

        let mut order = Vec::new();
        assert_eq!(queue.complete(|el| order.push(el.id())), 2);
        assert_eq!(order, vec![second.id(), first.id()]);
        assert_eq!(queue.phase(), BootstrapPhase::Complete);
        assert!(queue.is_empty());
    }

    #[test]
    fn skips_elements_removed_before_replay() {
        let document = Document::new(DocumentConfig::default());
        let kept = document.create_element("x-kept");
        let removed = document.create_element("x-removed");
        document.append_child(&document.body(), &kept).expect("append");
        document.append_child(&document.body(), &removed).expect("append");

        let queue = DeferredConnections::new();
        queue.begin();
        queue.enqueue(&kept, |_| {});
        queue.enqueue(&removed, |_| {});
        document.remove_child(&document.body(), &removed).expect("remove");

        let mut order = Vec::new();
        assert_eq!(queue.complete(|el| order.push(el.id())), 1);
        assert_eq!(order, vec![kept.id()]);
    }
}
