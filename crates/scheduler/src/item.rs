//! Queue entries: one deferred action with its due time and cancellation handle.

use crate::VirtualTimeScheduler;
use std::fmt;
use vtime_core::{Disposable, TimeDomain};

type Action<D> = Box<dyn FnOnce(&VirtualTimeScheduler<D>)>;

/// A deferred action waiting in the scheduler's queue.
///
/// The action is consumed by [`invoke`](Self::invoke), so an item can run at
/// most once. The state passed at scheduling time is captured alongside it.
pub struct ScheduledItem<D: TimeDomain> {
    due_time: D::Absolute,
    action: Action<D>,
    disposable: Disposable,
}

impl<D: TimeDomain> ScheduledItem<D> {
    /// Wraps `action(scheduler, state)` to run at `due_time`, cancelled through `disposable`.
    pub fn new<S, F>(state: S, due_time: D::Absolute, disposable: Disposable, action: F) -> Self
    where
        S: 'static,
        F: FnOnce(&VirtualTimeScheduler<D>, S) + 'static,
    {
        Self {
            due_time,
            action: Box::new(move |scheduler: &VirtualTimeScheduler<D>| action(scheduler, state)),
            disposable,
        }
    }

    /// When the item becomes eligible to run.
    pub fn due_time(&self) -> D::Absolute {
        self.due_time
    }

    /// Whether its disposal handle has been disposed.
    pub fn is_cancelled(&self) -> bool {
        self.disposable.is_disposed()
    }

    /// Handle that cancels this item.
    pub fn disposable(&self) -> &Disposable {
        &self.disposable
    }

    /// Runs the action on `scheduler`.
    pub fn invoke(self, scheduler: &VirtualTimeScheduler<D>) {
        (self.action)(scheduler)
    }
}

impl<D: TimeDomain> fmt::Debug for ScheduledItem<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledItem")
            .field("due_time", &self.due_time)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use vtime_core::TickDomain;

    #[test]
    fn invoke_passes_state_and_scheduler() {
        let sched = VirtualTimeScheduler::new(TickDomain, 3);
        let seen = Rc::new(Cell::new((0u64, 0u32)));
        let out = seen.clone();
        let bump = move |s: &VirtualTimeScheduler<TickDomain>, n: u32| out.set((s.now(), n + 1));
        let item = ScheduledItem::new(41u32, 9, Disposable::new(), bump);
        assert_eq!(item.due_time(), 9);
        item.invoke(&sched);
        assert_eq!(seen.get(), (3, 42));
    }

    #[test]
    fn cancellation_follows_the_handle() {
        let handle = Disposable::new();
        let item: ScheduledItem<TickDomain> = ScheduledItem::new((), 1, handle.clone(), |_, ()| {});
        assert!(!item.is_cancelled());
        handle.dispose();
        assert!(item.is_cancelled());
        assert!(item.disposable().is_disposed());
    }
}
