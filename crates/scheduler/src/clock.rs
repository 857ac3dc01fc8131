//! Virtual clock cell and the wall-clock reading trait.

use crate::VirtualTimeScheduler;
use std::cell::Cell;
use std::cmp::Ordering;
use std::fmt;
use vtime_core::{Millis, TimeDomain};

/// Anything that can report the current time in milliseconds since the UNIX epoch.
pub trait Clock {
    fn now_ms(&self) -> Millis;
}

/// Virtual (deterministic) clock value that only moves forward.
pub struct VirtualClock<A> {
    inner: Cell<A>,
}

impl<A: Copy> VirtualClock<A> {
    /// Create a new virtual clock seeded at `start`.
    pub fn new(start: A) -> Self {
        Self { inner: Cell::new(start) }
    }

    /// Current value.
    pub fn get(&self) -> A {
        self.inner.get()
    }

    /// Move to `target` if it is strictly later under `domain`'s order.
    /// Returns whether the clock moved.
    pub fn advance<D>(&self, domain: &D, target: A) -> bool
    where
        D: TimeDomain<Absolute = A>,
    {
        if domain.compare(&target, &self.inner.get()) == Ordering::Greater {
            self.inner.set(target);
            true
        } else {
            false
        }
    }
}

impl<A: Copy + fmt::Debug> fmt::Debug for VirtualClock<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("VirtualClock").field(&self.inner.get()).finish()
    }
}

impl<D: TimeDomain> Clock for VirtualTimeScheduler<D> {
    fn now_ms(&self) -> Millis {
        self.domain().to_absolute(self.now())
    }
}
