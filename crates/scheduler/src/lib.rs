//! Deterministic virtual-time scheduler.
//!
//! Executes delayed and periodic work under a simulated clock that only moves
//! when the harness says so. See [`VirtualTimeScheduler`] for the drive
//! operations and their ordering guarantees.
//!
//! ```
//! use scheduler::{Scheduler, VirtualTimeScheduler};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use vtime_core::TickDomain;
//!
//! let sched = VirtualTimeScheduler::new(TickDomain, 0);
//! let fired = Rc::new(RefCell::new(Vec::new()));
//! for (name, due) in [("b", 10), ("a", 5)] {
//!     let fired = fired.clone();
//!     sched.schedule_absolute(name, due, move |s, n| fired.borrow_mut().push((n, s.now())));
//! }
//! sched.advance_to(7).unwrap();
//! assert_eq!(*fired.borrow(), vec![("a", 5)]);
//! assert_eq!(sched.now(), 7);
//! ```

#![deny(unsafe_code)]

pub mod clock;
pub mod config;
pub mod item;
mod periodic;
pub mod queue;
mod traits;
pub mod virtual_time;

pub use clock::{Clock, VirtualClock};
pub use config::SchedulerConfig;
pub use item::ScheduledItem;
pub use queue::{EntryId, PriorityQueue};
pub use traits::Scheduler;
pub use virtual_time::{SchedulerBuilder, SchedulerStats, VirtualTimeScheduler};
