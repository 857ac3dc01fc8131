//! The scheduling capability set.

use vtime_core::Disposable;

/// Deferred and periodic execution against some notion of "now".
///
/// Actions receive the scheduler they run on, so they can schedule follow-up
/// work. Code written against this trait does not care whether time is real
/// or virtual.
pub trait Scheduler {
    /// A point in time.
    type Absolute: Copy;
    /// A span of time.
    type Relative: Copy;

    /// Current time.
    fn now(&self) -> Self::Absolute;

    /// Run `action(self, state)` as soon as possible.
    fn schedule<S, F>(&self, state: S, action: F) -> Disposable
    where
        S: 'static,
        F: FnOnce(&Self, S) + 'static;

    /// Run `action(self, state)` once `delay` has elapsed.
    fn schedule_relative<S, F>(&self, state: S, delay: Self::Relative, action: F) -> Disposable
    where
        S: 'static,
        F: FnOnce(&Self, S) + 'static;

    /// Run `action(self, state)` at `due_time`.
    fn schedule_absolute<S, F>(&self, state: S, due_time: Self::Absolute, action: F) -> Disposable
    where
        S: 'static,
        F: FnOnce(&Self, S) + 'static;

    /// Run `action` now and then every `period` while it keeps returning `Some(next_state)`.
    /// Disposing the returned handle cancels the whole chain.
    fn schedule_periodic<S, F>(&self, state: S, period: Self::Relative, action: F) -> Disposable
    where
        S: 'static,
        F: FnMut(S) -> Option<S> + 'static;
}
