//! Periodic work as a chain of one-shot items.
//!
//! Each link runs the user action and, if it returns a continuation state,
//! enqueues the next link `period` after the clock at that moment. All links
//! share one [`Disposable`], so disposing it cancels whichever link is pending.

use crate::{ScheduledItem, VirtualTimeScheduler};
use tracing::trace;
use vtime_core::{Disposable, TimeDomain};

pub(crate) fn schedule_periodic<D, S, F>(
    scheduler: &VirtualTimeScheduler<D>,
    state: S,
    period: D::Relative,
    action: F,
) -> Disposable
where
    D: TimeDomain,
    S: 'static,
    F: FnMut(S) -> Option<S> + 'static,
{
    let chain = Disposable::new();
    link(scheduler, scheduler.now(), state, period, action, chain.clone());
    chain
}

fn link<D, S, F>(
    scheduler: &VirtualTimeScheduler<D>,
    due_time: D::Absolute,
    state: S,
    period: D::Relative,
    mut action: F,
    chain: Disposable,
) where
    D: TimeDomain,
    S: 'static,
    F: FnMut(S) -> Option<S> + 'static,
{
    let handle = chain.clone();
    let run = move |sched: &VirtualTimeScheduler<D>, state: S| {
        let Some(next) = action(state) else {
            trace!("periodic chain finished");
            return;
        };
        if chain.is_disposed() {
            return;
        }
        let due_time = sched.domain().add(sched.now(), period);
        link(sched, due_time, next, period, action, chain);
    };
    let item = ScheduledItem::new(state, due_time, handle, run);
    scheduler.enqueue(item);
}
