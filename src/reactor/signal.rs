use std::cell::{Cell, RefCell};
use std::fmt;

/// Identifies one connected slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(u64);

type Slot<A> = Box<dyn FnMut(&A)>;

/// A list of callbacks invoked in connection order when the signal is emitted.
///
/// Slots may connect or disconnect while the signal is emitting. A slot connected
/// during an emission is first called on the next one. Emitting a signal from
/// one of its own slots only reaches the slots connected since the outer
/// emission began.
pub struct Signal<A> {
    slots: RefCell<Vec<(SlotId, Slot<A>)>>,
    // One per ongoing emission, innermost last.
    emissions: RefCell<Vec<Emission>>,
    next_id: Cell<u64>,
}

/// Slots taken out by one ongoing emission, and what happened to them meanwhile.
#[derive(Default)]
struct Emission {
    held: Vec<SlotId>,
    removed: Vec<SlotId>,
    cleared: bool,
}

impl<A> Signal<A> {
    /// A signal with no slots.
    pub fn new() -> Self {
        Signal {
            slots: RefCell::new(Vec::new()),
            emissions: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    /// Add a slot.
    pub fn connect(&self, slot: impl FnMut(&A) + 'static) -> SlotId {
        let id = SlotId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.slots.borrow_mut().push((id, Box::new(slot)));
        id
    }

    /// Remove one slot. Unknown ids are ignored.
    pub fn disconnect(&self, id: SlotId) {
        let mut slots = self.slots.borrow_mut();
        let before = slots.len();
        slots.retain(|(s, _)| *s != id);
        if slots.len() != before {
            return;
        }

        let mut emissions = self.emissions.borrow_mut();
        if let Some(e) = emissions.iter_mut().find(|e| e.held.contains(&id)) {
            if !e.removed.contains(&id) {
                e.removed.push(id);
            }
        }
    }

    /// Remove every slot.
    pub fn disconnect_all(&self) {
        self.slots.borrow_mut().clear();
        for e in self.emissions.borrow_mut().iter_mut() {
            e.cleared = true;
        }
    }

    /// Number of connected slots.
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    /// Tell if no slots are connected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every slot with `arg`.
    pub fn emit(&self, arg: &A) {
        let mut emitting = std::mem::take(&mut *self.slots.borrow_mut());

        let depth = {
            let mut emissions = self.emissions.borrow_mut();
            emissions.push(Emission {
                held: emitting.iter().map(|(id, _)| *id).collect(),
                ..Default::default()
            });
            emissions.len() - 1
        };

        for (id, slot) in emitting.iter_mut() {
            let skip = {
                let emissions = self.emissions.borrow();
                let e = &emissions[depth];
                e.cleared || e.removed.contains(id)
            };
            if skip {
                continue;
            }
            slot(arg);
        }

        // Inner emissions are done, ours is the last one.
        let emission = self.emissions.borrow_mut().pop().unwrap_or_default();

        if emission.cleared {
            return;
        }

        emitting.retain(|(id, _)| !emission.removed.contains(id));

        let mut slots = self.slots.borrow_mut();
        let added = std::mem::take(&mut *slots);
        *slots = emitting;
        slots.extend(added);
    }
}

impl<A> Default for Signal<A> {
    fn default() -> Self {
        Signal::new()
    }
}

impl<A> fmt::Debug for Signal<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal").field("slots", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;

    #[test]
    fn emits_in_connection_order() {
        let signal = Signal::<u32>::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let s = seen.clone();
        signal.connect(move |v| s.borrow_mut().push(("a", *v)));
        let s = seen.clone();
        signal.connect(move |v| s.borrow_mut().push(("b", *v)));

        signal.emit(&1);
        signal.emit(&2);

        assert_eq!(*seen.borrow(), [("a", 1), ("b", 1), ("a", 2), ("b", 2)]);
    }

    #[test]
    fn disconnect_one() {
        let signal = Signal::<()>::new();
        let count = Rc::new(Cell::new(0));

        let c = count.clone();
        let id = signal.connect(move |_| c.set(c.get() + 1));
        signal.emit(&());
        signal.disconnect(id);
        signal.emit(&());

        assert_eq!(count.get(), 1);
        assert!(signal.is_empty());
    }

    #[test]
    fn disconnect_all_during_emit() {
        let signal = Rc::new(Signal::<()>::new());
        let count = Rc::new(Cell::new(0));

        let sig = Rc::downgrade(&signal);
        signal.connect(move |_| {
            if let Some(s) = sig.upgrade() {
                s.disconnect_all();
            }
        });
        let c = count.clone();
        signal.connect(move |_| c.set(c.get() + 1));

        signal.emit(&());
        signal.emit(&());

        assert_eq!(count.get(), 0);
        assert!(signal.is_empty());
    }

    #[test]
    fn disconnect_unknown_is_ignored() {
        let signal = Signal::<()>::new();
        let id = signal.connect(|_| {});
        signal.disconnect(id);
        signal.disconnect(id);
        signal.disconnect(SlotId(42));

        assert!(signal.is_empty());
        assert!(signal.emissions.borrow().is_empty());
    }

    #[test]
    fn nested_emit_keeps_outer_removals() {
        let signal = Rc::new(Signal::<u32>::new());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let victim = Rc::new(Cell::new(None));

        // First slot disconnects the third, then emits again from inside.
        let sig = Rc::downgrade(&signal);
        let v = victim.clone();
        let s = seen.clone();
        signal.connect(move |n| {
            s.borrow_mut().push(("first", *n));
            if *n == 0 {
                if let (Some(sig), Some(id)) = (sig.upgrade(), v.get()) {
                    sig.disconnect(id);
                    sig.emit(&1);
                }
            }
        });
        let s = seen.clone();
        signal.connect(move |n| s.borrow_mut().push(("second", *n)));
        let s = seen.clone();
        victim.set(Some(signal.connect(move |n| s.borrow_mut().push(("third", *n)))));

        signal.emit(&0);

        // The nested emission reached nothing, and the removal held.
        assert_eq!(*seen.borrow(), [("first", 0), ("second", 0)]);
        assert_eq!(signal.len(), 2);

        signal.emit(&2);
        assert_eq!(seen.borrow().len(), 4);
    }

    #[test]
    fn connect_during_emit_waits_for_next() {
        let signal = Rc::new(Signal::<()>::new());
        let count = Rc::new(Cell::new(0));

        let sig = Rc::downgrade(&signal);
        let c = count.clone();
        let mut once = true;
        signal.connect(move |_| {
            if once {
                once = false;
                let c = c.clone();
                if let Some(s) = sig.upgrade() {
                    s.connect(move |_| c.set(c.get() + 1));
                }
            }
        });

        signal.emit(&());
        assert_eq!(count.get(), 0);
        assert_eq!(signal.len(), 2);

        signal.emit(&());
        assert_eq!(count.get(), 1);
    }
}
