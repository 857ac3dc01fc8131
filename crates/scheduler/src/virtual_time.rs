//! Virtual-time scheduler: priority-ordered dispatch under a simulated clock.
//!
//! Work is queued by absolute due time and only runs when a drive operation
//! moves the clock:
//!
//! - [`start`](VirtualTimeScheduler::start) drains the queue until it is empty
//!   or an action calls [`stop`](VirtualTimeScheduler::stop);
//! - [`advance_to`](VirtualTimeScheduler::advance_to) and
//!   [`advance_by`](VirtualTimeScheduler::advance_by) run everything due up to
//!   a target and then park the clock exactly on it;
//! - [`sleep`](VirtualTimeScheduler::sleep) moves the clock without running
//!   anything.
//!
//! Items due at the same time run in submission order. Actions may schedule
//! more work; it runs in the same drive if it falls inside the bound.
//!
//! The scheduler is single-threaded by construction (`!Sync`). A single
//! enabled flag keeps nested `start`/`advance_to` calls made from inside an
//! action from starting a second drive loop; those calls are no-ops.

use crate::clock::{Clock, VirtualClock};
use crate::config::SchedulerConfig;
use crate::periodic;
use crate::queue::{EntryId, PriorityQueue};
use crate::{ScheduledItem, Scheduler};
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, info_span, trace, warn};
use vtime_core::{
    Deadline, DispatchObserver, DispatchRecord, Disposable, SchedulerError, TimeDomain,
};

/// Lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Items inserted into the queue.
    pub scheduled: u64,
    /// Items whose action ran.
    pub dispatched: u64,
    /// Cancelled items dropped from the queue head.
    pub purged: u64,
}

struct Next<A> {
    entry: EntryId,
    due_time: A,
}

/// Deterministic scheduler driven by an explicitly advanced clock.
pub struct VirtualTimeScheduler<D: TimeDomain> {
    domain: Rc<D>,
    clock: VirtualClock<D::Absolute>,
    enabled: Cell<bool>,
    queue: RefCell<PriorityQueue<ScheduledItem<D>>>,
    config: SchedulerConfig,
    stats: Cell<SchedulerStats>,
    observer: RefCell<Option<Rc<dyn DispatchObserver>>>,
}

impl<D: TimeDomain> VirtualTimeScheduler<D> {
    /// Scheduler over `domain` with its clock at `initial_clock`.
    pub fn new(domain: D, initial_clock: D::Absolute) -> Self {
        Self::with_config(domain, initial_clock, SchedulerConfig::default())
    }

    /// Like [`new`](Self::new) with explicit tunables.
    pub fn with_config(domain: D, initial_clock: D::Absolute, config: SchedulerConfig) -> Self {
        let domain = Rc::new(domain);
        let order = Rc::clone(&domain);
        let queue = PriorityQueue::new(move |a: &ScheduledItem<D>, b: &ScheduledItem<D>| {
            order.compare(&a.due_time(), &b.due_time())
        });
        Self {
            domain,
            clock: VirtualClock::new(initial_clock),
            enabled: Cell::new(false),
            queue: RefCell::new(queue),
            config,
            stats: Cell::new(SchedulerStats::default()),
            observer: RefCell::new(None),
        }
    }

    /// Builder that validates configuration and requires a domain.
    pub fn builder() -> SchedulerBuilder<D> {
        SchedulerBuilder::new()
    }

    /// The time domain all clock arithmetic goes through.
    pub fn domain(&self) -> &D {
        &self.domain
    }

    /// Current virtual time.
    pub fn now(&self) -> D::Absolute {
        self.clock.get()
    }

    /// Whether a drive loop is running.
    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    /// Queued items, including cancelled ones not yet purged.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Lifetime counters.
    pub fn stats(&self) -> SchedulerStats {
        self.stats.get()
    }

    /// Configuration the scheduler was built with.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Install the observer notified on every dispatch and purge.
    pub fn set_observer(&self, observer: Rc<dyn DispatchObserver>) {
        *self.observer.borrow_mut() = Some(observer);
    }

    /// Remove the installed observer, if any.
    pub fn clear_observer(&self) {
        *self.observer.borrow_mut() = None;
    }

    /// Run `action` at a deadline given either as a wall-clock instant or as a
    /// delay in milliseconds.
    pub fn schedule_future<S, F>(&self, state: S, deadline: Deadline, action: F) -> Disposable
    where
        S: 'static,
        F: FnOnce(&Self, S) + 'static,
    {
        let delay = self.domain.to_relative(deadline.delay_from(self.now_ms()));
        self.schedule_relative(state, delay, action)
    }

    pub(crate) fn enqueue(&self, item: ScheduledItem<D>) -> EntryId {
        let due_time = item.due_time();
        let entry = self.queue.borrow_mut().enqueue(item);
        self.bump(|s| s.scheduled += 1);
        trace!(entry = entry.get(), due = ?due_time, "scheduled");
        entry
    }

    /// Drain the queue in due-time order until it is empty or an action calls
    /// [`stop`](Self::stop). No-op if a drive loop is already running.
    pub fn start(&self) {
        if self.enabled.get() {
            return;
        }
        let span = info_span!("vtime.start", pending = self.pending());
        let _enter = span.enter();
        self.enabled.set(true);
        let mut dispatched = 0u64;
        while self.enabled.get() {
            match self.get_next() {
                Some(next) => {
                    self.dispatch(next);
                    dispatched += 1;
                    self.enforce_limit(dispatched);
                }
                None => self.enabled.set(false),
            }
        }
        debug!(dispatched, clock = ?self.now(), "drive loop idle");
    }

    /// End the running drive loop after the current action returns.
    pub fn stop(&self) {
        self.enabled.set(false);
    }

    /// Run everything due at or before `target`, then set the clock to `target`.
    ///
    /// Fails with [`SchedulerError::OutOfRange`] if `target` is before the clock.
    /// Returns immediately if `target` equals the clock or a drive loop is
    /// already running.
    pub fn advance_to(&self, target: D::Absolute) -> Result<(), SchedulerError> {
        let now = self.now();
        match self.domain.compare(&now, &target) {
            Ordering::Greater => {
                return Err(SchedulerError::out_of_range("advance_to", &now, &target))
            }
            Ordering::Equal => return Ok(()),
            Ordering::Less => {}
        }
        if self.enabled.get() {
            return Ok(());
        }
        let span = info_span!("vtime.advance_to", target = ?target, pending = self.pending());
        let _enter = span.enter();
        self.enabled.set(true);
        let mut dispatched = 0u64;
        while self.enabled.get() {
            match self.get_next() {
                Some(next) if self.domain.compare(&next.due_time, &target) != Ordering::Greater => {
                    self.dispatch(next);
                    dispatched += 1;
                    self.enforce_limit(dispatched);
                }
                _ => self.enabled.set(false),
            }
        }
        // an action may have slept past the target; never rewind
        self.clock.advance(&*self.domain, target);
        debug!(dispatched, clock = ?self.now(), "advanced");
        Ok(())
    }

    /// [`advance_to`](Self::advance_to) the clock plus `delta`. Fails with
    /// [`SchedulerError::OutOfRange`] if `delta` is negative or the sum leaves
    /// the domain.
    pub fn advance_by(&self, delta: D::Relative) -> Result<(), SchedulerError> {
        let now = self.now();
        let target = self.offset("advance_by", now, delta)?;
        match self.domain.compare(&now, &target) {
            Ordering::Greater => Err(SchedulerError::out_of_range("advance_by", &now, &target)),
            Ordering::Equal => Ok(()),
            Ordering::Less => self.advance_to(target),
        }
    }

    /// Move the clock forward by `delta` without running anything, not even
    /// work that becomes overdue. `delta` must move the clock strictly forward.
    pub fn sleep(&self, delta: D::Relative) -> Result<(), SchedulerError> {
        let now = self.now();
        let target = self.offset("sleep", now, delta)?;
        if self.domain.compare(&now, &target) != Ordering::Less {
            return Err(SchedulerError::out_of_range("sleep", &now, &target));
        }
        self.clock.advance(&*self.domain, target);
        trace!(clock = ?target, "slept");
        Ok(())
    }

    fn offset(
        &self,
        operation: &'static str,
        now: D::Absolute,
        delta: D::Relative,
    ) -> Result<D::Absolute, SchedulerError> {
        self.domain.checked_add(now, delta).ok_or_else(|| {
            SchedulerError::out_of_range(operation, &now, &format_args!("{now:?} + {delta:?}"))
        })
    }

    // Earliest live item. Cancelled heads are dropped here and nowhere else.
    fn get_next(&self) -> Option<Next<D::Absolute>> {
        loop {
            let mut queue = self.queue.borrow_mut();
            let (entry, due_time, cancelled) =
                queue.peek().map(|(entry, item)| (entry, item.due_time(), item.is_cancelled()))?;
            if !cancelled {
                return Some(Next { entry, due_time });
            }
            let purged = queue.dequeue();
            // captured state may run arbitrary Drop code; release the queue first
            drop(queue);
            drop(purged);
            self.bump(|s| s.purged += 1);
            trace!(entry = entry.get(), "purged cancelled item");
            if let Some(observer) = self.observer() {
                observer.on_purge(entry.get());
            }
        }
    }

    fn dispatch(&self, next: Next<D::Absolute>) {
        self.clock.advance(&*self.domain, next.due_time);
        // run-wrapper: the item leaves the queue before its action runs
        let Some(item) = self.queue.borrow_mut().remove(next.entry) else {
            return;
        };
        self.bump(|s| s.dispatched += 1);
        let record = DispatchRecord {
            seq: self.stats().dispatched,
            entry: next.entry.get(),
            due_ms: self.domain.to_absolute(next.due_time),
            clock_ms: self.now_ms(),
        };
        trace!(
            seq = record.seq,
            entry = record.entry,
            due_ms = record.due_ms,
            clock_ms = record.clock_ms,
            "dispatch"
        );
        if let Some(observer) = self.observer() {
            observer.on_dispatch(&record);
        }
        item.invoke(self);
    }

    fn enforce_limit(&self, dispatched: u64) {
        if let Some(max) = self.config.max_dispatches {
            if dispatched >= max && self.enabled.get() {
                warn!(max, clock = ?self.now(), "dispatch limit reached; stopping drive loop");
                self.stop();
            }
        }
    }

    fn observer(&self) -> Option<Rc<dyn DispatchObserver>> {
        self.observer.borrow().clone()
    }

    fn bump(&self, f: impl FnOnce(&mut SchedulerStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}

impl<D: TimeDomain> Scheduler for VirtualTimeScheduler<D> {
    type Absolute = D::Absolute;
    type Relative = D::Relative;

    fn now(&self) -> D::Absolute {
        self.clock.get()
    }

    fn schedule<S, F>(&self, state: S, action: F) -> Disposable
    where
        S: 'static,
        F: FnOnce(&Self, S) + 'static,
    {
        self.schedule_absolute(state, self.clock.get(), action)
    }

    fn schedule_relative<S, F>(&self, state: S, delay: D::Relative, action: F) -> Disposable
    where
        S: 'static,
        F: FnOnce(&Self, S) + 'static,
    {
        let due_time = self.domain.add(self.clock.get(), delay);
        self.schedule_absolute(state, due_time, action)
    }

    fn schedule_absolute<S, F>(&self, state: S, due_time: D::Absolute, action: F) -> Disposable
    where
        S: 'static,
        F: FnOnce(&Self, S) + 'static,
    {
        let disposable = Disposable::new();
        self.enqueue(ScheduledItem::new(state, due_time, disposable.clone(), action));
        disposable
    }

    fn schedule_periodic<S, F>(&self, state: S, period: D::Relative, action: F) -> Disposable
    where
        S: 'static,
        F: FnMut(S) -> Option<S> + 'static,
    {
        periodic::schedule_periodic(self, state, period, action)
    }
}

impl<D: TimeDomain> fmt::Debug for VirtualTimeScheduler<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualTimeScheduler")
            .field("clock", &self.now())
            .field("enabled", &self.enabled.get())
            .field("pending", &self.pending())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Assembles a [`VirtualTimeScheduler`].
pub struct SchedulerBuilder<D: TimeDomain> {
    domain: Option<D>,
    initial_clock: Option<D::Absolute>,
    config: SchedulerConfig,
}

impl<D: TimeDomain> SchedulerBuilder<D> {
    /// Empty builder: no domain, default clock and config.
    pub fn new() -> Self {
        Self { domain: None, initial_clock: None, config: SchedulerConfig::default() }
    }

    /// Time domain the scheduler runs on. Required.
    pub fn domain(mut self, domain: D) -> Self {
        self.domain = Some(domain);
        self
    }

    /// Starting clock; defaults to the domain's zero value.
    pub fn initial_clock(mut self, clock: D::Absolute) -> Self {
        self.initial_clock = Some(clock);
        self
    }

    /// Tunables; validated by [`build`](Self::build).
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Fails with [`SchedulerError::MissingTimeDomain`] if no domain was given,
    /// or [`SchedulerError::Config`] if the configuration is invalid.
    pub fn build(self) -> Result<VirtualTimeScheduler<D>, SchedulerError>
    where
        D::Absolute: Default,
    {
        let domain = self.domain.ok_or(SchedulerError::MissingTimeDomain)?;
        self.config.validate()?;
        let initial_clock = self.initial_clock.unwrap_or_default();
        Ok(VirtualTimeScheduler::with_config(domain, initial_clock, self.config))
    }
}

impl<D: TimeDomain> Default for SchedulerBuilder<D> {
    fn default() -> Self {
        Self::new()
    }
}
