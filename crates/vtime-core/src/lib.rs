//! Virtual-time core primitives and shared types.

#![deny(unsafe_code)]

/// Version of the vtime core library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wall-clock reading or span in milliseconds. Negative spans are allowed.
pub type Millis = i64;

pub mod domain {
    //! Time domains: the total order and arithmetic the scheduler runs on.
    //!
    //! The scheduler never touches a concrete time representation. Every clock
    //! operation goes through [`TimeDomain`], so the same drive loop serves plain
    //! numeric ticks and calendar instants alike.

    use super::Millis;
    use serde::{Deserialize, Serialize};
    use std::cmp::Ordering;
    use std::fmt;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    /// Arithmetic and ordering over one representation of virtual time.
    pub trait TimeDomain: 'static {
        /// A point on the simulated timeline.
        type Absolute: Copy + fmt::Debug;
        /// A duration added to an [`Absolute`](TimeDomain::Absolute).
        type Relative: Copy + fmt::Debug;

        /// Total order over absolute times.
        fn compare(&self, a: &Self::Absolute, b: &Self::Absolute) -> Ordering;

        /// `absolute + relative`. Implementations saturate instead of overflowing.
        fn add(&self, absolute: Self::Absolute, relative: Self::Relative) -> Self::Absolute;

        /// `absolute + relative`, or `None` if the sum falls outside the domain.
        fn checked_add(
            &self,
            absolute: Self::Absolute,
            relative: Self::Relative,
        ) -> Option<Self::Absolute>;

        /// Wall-clock reading (milliseconds since the UNIX epoch) of a clock value.
        fn to_absolute(&self, absolute: Self::Absolute) -> Millis;

        /// Domain representation of a millisecond span.
        fn to_relative(&self, span: Millis) -> Self::Relative;
    }

    /// Plain numeric ticks; one tick reads as one millisecond.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct TickDomain;

    impl TimeDomain for TickDomain {
        type Absolute = u64;
        type Relative = i64;

        fn compare(&self, a: &u64, b: &u64) -> Ordering {
            a.cmp(b)
        }

        fn add(&self, absolute: u64, relative: i64) -> u64 {
            absolute.saturating_add_signed(relative)
        }

        fn checked_add(&self, absolute: u64, relative: i64) -> Option<u64> {
            absolute.checked_add_signed(relative)
        }

        fn to_absolute(&self, absolute: u64) -> Millis {
            Millis::try_from(absolute).unwrap_or(Millis::MAX)
        }

        fn to_relative(&self, span: Millis) -> i64 {
            span
        }
    }

    /// Calendar instant with millisecond resolution.
    #[derive(
        Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    )]
    #[serde(transparent)]
    pub struct CalendarTime(Millis);

    impl CalendarTime {
        /// 1970-01-01T00:00:00Z.
        pub const UNIX_EPOCH: Self = Self(0);

        /// Instant `ms` milliseconds after (or before, if negative) the epoch.
        pub const fn from_epoch_ms(ms: Millis) -> Self {
            Self(ms)
        }

        /// Milliseconds since the epoch.
        pub const fn epoch_ms(self) -> Millis {
            self.0
        }

        /// Truncates `t` to millisecond resolution.
        pub fn from_system_time(t: SystemTime) -> Self {
            match t.duration_since(UNIX_EPOCH) {
                Ok(after) => Self(Millis::try_from(after.as_millis()).unwrap_or(Millis::MAX)),
                Err(before) => {
                    let ms = Millis::try_from(before.duration().as_millis()).unwrap_or(Millis::MAX);
                    Self(-ms)
                }
            }
        }

        /// `None` if the instant is not representable by the platform clock.
        pub fn to_system_time(self) -> Option<SystemTime> {
            let span = Duration::from_millis(self.0.unsigned_abs());
            if self.0 >= 0 {
                UNIX_EPOCH.checked_add(span)
            } else {
                UNIX_EPOCH.checked_sub(span)
            }
        }
    }

    impl fmt::Display for CalendarTime {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "epoch+{}ms", self.0)
        }
    }

    /// Calendar instants advanced by signed millisecond spans.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct CalendarDomain;

    impl TimeDomain for CalendarDomain {
        type Absolute = CalendarTime;
        type Relative = Millis;

        fn compare(&self, a: &CalendarTime, b: &CalendarTime) -> Ordering {
            a.cmp(b)
        }

        fn add(&self, absolute: CalendarTime, relative: Millis) -> CalendarTime {
            CalendarTime(absolute.0.saturating_add(relative))
        }

        fn checked_add(&self, absolute: CalendarTime, relative: Millis) -> Option<CalendarTime> {
            absolute.0.checked_add(relative).map(CalendarTime)
        }

        fn to_absolute(&self, absolute: CalendarTime) -> Millis {
            absolute.0
        }

        fn to_relative(&self, span: Millis) -> Millis {
            span
        }
    }

    /// When deferred work should run: at a wall-clock instant or after a delay.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum Deadline {
        /// Absolute wall-clock reading in milliseconds.
        At(Millis),
        /// Delay in milliseconds from the current clock.
        After(Millis),
    }

    impl Deadline {
        /// Delay from `now_ms` until this deadline. Deadlines in the past give a
        /// negative delay.
        pub fn delay_from(self, now_ms: Millis) -> Millis {
            match self {
                Deadline::At(at) => at.saturating_sub(now_ms),
                Deadline::After(delay) => delay,
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use proptest::prelude::*;

        #[test]
        fn tick_add_accepts_negative_and_saturates() {
            let d = TickDomain;
            assert_eq!(d.add(10, -3), 7);
            assert_eq!(d.add(2, -5), 0);
            assert_eq!(d.add(u64::MAX - 1, 5), u64::MAX);
            assert_eq!(d.to_absolute(u64::MAX), Millis::MAX);
        }

        #[test]
        fn checked_add_reports_the_domain_edges() {
            let d = TickDomain;
            assert_eq!(d.checked_add(10, -3), Some(7));
            assert_eq!(d.checked_add(0, -1), None);
            assert_eq!(d.checked_add(u64::MAX, 1), None);

            let c = CalendarDomain;
            let t = CalendarTime::from_epoch_ms(5);
            assert_eq!(c.checked_add(t, -10), Some(CalendarTime::from_epoch_ms(-5)));
            assert_eq!(c.checked_add(CalendarTime::from_epoch_ms(Millis::MAX), 1), None);
        }

        #[test]
        fn calendar_time_round_trips_system_time() {
            let t = CalendarTime::from_epoch_ms(1_700_000_000_123);
            let sys = t.to_system_time().unwrap();
            assert_eq!(CalendarTime::from_system_time(sys), t);

            let before = CalendarTime::from_epoch_ms(-1_500);
            let sys = before.to_system_time().unwrap();
            assert_eq!(CalendarTime::from_system_time(sys), before);
        }

        #[test]
        fn calendar_domain_orders_and_adds() {
            let d = CalendarDomain;
            let a = CalendarTime::from_epoch_ms(1_000);
            let b = d.add(a, 250);
            assert_eq!(d.compare(&a, &b), Ordering::Less);
            assert_eq!(d.to_absolute(b), 1_250);
            assert_eq!(d.add(b, -250), a);
        }

        #[test]
        fn deadline_delays() {
            assert_eq!(Deadline::At(150).delay_from(100), 50);
            assert_eq!(Deadline::At(50).delay_from(100), -50);
            assert_eq!(Deadline::After(7).delay_from(100), 7);
        }

        #[test]
        fn deadline_serde_shape() {
            let s = serde_json::to_string(&Deadline::After(5)).unwrap();
            assert_eq!(s, r#"{"after":5}"#);
        }

        proptest! {
            #[test]
            fn tick_add_never_moves_backwards_for_non_negative_spans(
                base in 0u64..u64::MAX,
                span in 0i64..i64::MAX,
            ) {
                let d = TickDomain;
                prop_assert_ne!(d.compare(&d.add(base, span), &base), Ordering::Less);
            }
        }
    }
}

pub mod disposable {
    //! Cancellation handles.

    use std::cell::Cell;
    use std::rc::Rc;

    /// Cancels previously scheduled work.
    ///
    /// Disposing only sets a flag shared by every clone of the handle. Work that
    /// already started is not interrupted; pending work is skipped and purged the
    /// next time the scheduler looks at it.
    #[derive(Debug, Clone, Default)]
    pub struct Disposable {
        disposed: Rc<Cell<bool>>,
    }

    impl Disposable {
        /// A fresh, live handle.
        pub fn new() -> Self {
            Self::default()
        }

        /// Marks the work as cancelled. Idempotent.
        pub fn dispose(&self) {
            self.disposed.set(true);
        }

        /// Whether [`dispose`](Self::dispose) has been called on any clone.
        pub fn is_disposed(&self) -> bool {
            self.disposed.get()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn clones_share_the_flag() {
            let a = Disposable::new();
            let b = a.clone();
            assert!(!b.is_disposed());
            a.dispose();
            assert!(b.is_disposed());
            b.dispose();
            assert!(a.is_disposed());
        }
    }
}

pub mod error {
    //! Errors raised by scheduler operations.

    use std::fmt;
    use thiserror::Error;

    /// Scheduler failures. All of them are caller programming errors.
    #[derive(Debug, Error, Clone, PartialEq, Eq)]
    pub enum SchedulerError {
        /// Requested clock movement would go backwards (or, for `sleep`, not forwards).
        #[error("{operation}: target {target} is out of range for clock {clock}")]
        OutOfRange {
            /// Operation that rejected the request.
            operation: &'static str,
            /// Clock at the time of the request.
            clock: String,
            /// Requested target.
            target: String,
        },
        /// A scheduler was built without a time domain.
        #[error("no time domain supplied")]
        MissingTimeDomain,
        /// Invalid scheduler configuration.
        #[error("config: {0}")]
        Config(String),
    }

    impl SchedulerError {
        /// Builds an [`OutOfRange`](SchedulerError::OutOfRange) from debug renderings.
        pub fn out_of_range(
            operation: &'static str,
            clock: &impl fmt::Debug,
            target: &impl fmt::Debug,
        ) -> Self {
            SchedulerError::OutOfRange {
                operation,
                clock: format!("{clock:?}"),
                target: format!("{target:?}"),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn out_of_range_message() {
            let e = SchedulerError::out_of_range("advance_to", &10u64, &5u64);
            assert_eq!(e.to_string(), "advance_to: target 5 is out of range for clock 10");
        }
    }
}

pub mod observe {
    //! Dispatch records and the observer hook.

    use super::Millis;
    use serde::{Deserialize, Serialize};

    /// One invocation performed by a drive loop.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct DispatchRecord {
        /// Invocation counter over the scheduler lifetime, starting at 1.
        pub seq: u64,
        /// Queue insertion id of the invoked item.
        pub entry: u64,
        /// Wall-clock reading of the item's due time.
        pub due_ms: Millis,
        /// Wall-clock reading of the scheduler clock at invocation.
        pub clock_ms: Millis,
    }

    /// Receives scheduler events. Called synchronously on the scheduler thread;
    /// implementations must not call back into the scheduler.
    pub trait DispatchObserver {
        /// Called right before an item's action runs.
        fn on_dispatch(&self, record: &DispatchRecord);

        /// Called when a cancelled item is purged from the queue.
        fn on_purge(&self, _entry: u64) {}
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn record_json_field_names() {
            let r = DispatchRecord { seq: 1, entry: 4, due_ms: 10, clock_ms: 10 };
            let v = serde_json::to_value(r).unwrap();
            assert_eq!(v["seq"], 1);
            assert_eq!(v["entry"], 4);
            assert_eq!(v["due_ms"], 10);
            assert_eq!(v["clock_ms"], 10);
        }
    }
}

pub use disposable::Disposable;
pub use domain::{CalendarDomain, CalendarTime, Deadline, TickDomain, TimeDomain};
pub use error::SchedulerError;
pub use observe::{DispatchObserver, DispatchRecord};
