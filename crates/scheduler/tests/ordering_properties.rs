use proptest::prelude::*;
use scheduler::{Scheduler, VirtualTimeScheduler};
use std::cell::RefCell;
use std::rc::Rc;
use vtime_core::TickDomain;

type Runs = Rc<RefCell<Vec<(usize, u64)>>>;

fn submit(
    sched: &VirtualTimeScheduler<TickDomain>,
    dues: &[u64],
    runs: &Runs,
) -> Vec<vtime_core::Disposable> {
    dues.iter()
        .enumerate()
        .map(|(idx, due)| {
            let runs = runs.clone();
            sched.schedule_absolute(idx, *due, move |s, idx| runs.borrow_mut().push((idx, s.now())))
        })
        .collect()
}

proptest! {
    #[test]
    fn start_runs_by_due_time_then_submission(dues in proptest::collection::vec(0u64..50, 0..40)) {
        let sched = VirtualTimeScheduler::new(TickDomain, 0);
        let runs: Runs = Rc::default();
        submit(&sched, &dues, &runs);
        sched.start();

        let mut expected: Vec<(usize, u64)> = dues.iter().copied().enumerate().collect();
        expected.sort_by_key(|(_, due)| *due);
        prop_assert_eq!(runs.borrow().clone(), expected);
        prop_assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn advance_to_never_runs_work_past_the_target(
        start in 0u64..20,
        dues in proptest::collection::vec(0u64..100, 0..40),
        step in 1u64..60,
    ) {
        let sched = VirtualTimeScheduler::new(TickDomain, start);
        let runs: Runs = Rc::default();
        submit(&sched, &dues, &runs);
        let target = start + step;
        sched.advance_to(target).unwrap();

        prop_assert_eq!(sched.now(), target);
        let ran = runs.borrow();
        prop_assert_eq!(ran.len(), dues.iter().filter(|d| **d <= target).count());
        for (idx, at) in ran.iter() {
            prop_assert!(dues[*idx] <= target);
            prop_assert!(*at <= target);
            prop_assert_eq!(*at, dues[*idx].max(start));
        }
        for pair in ran.windows(2) {
            prop_assert!(pair[0].1 <= pair[1].1, "clock went backwards");
        }
    }

    #[test]
    fn cancelled_work_never_runs(
        dues in proptest::collection::vec(0u64..30, 1..30),
        cancel in proptest::collection::vec(any::<bool>(), 30),
    ) {
        let sched = VirtualTimeScheduler::new(TickDomain, 0);
        let runs: Runs = Rc::default();
        let handles = submit(&sched, &dues, &runs);
        for (h, c) in handles.iter().zip(&cancel) {
            if *c {
                h.dispose();
            }
        }
        sched.start();
        for (idx, _) in runs.borrow().iter() {
            prop_assert!(!cancel[*idx]);
        }
        let live = handles.iter().filter(|h| !h.is_disposed()).count();
        prop_assert_eq!(runs.borrow().len(), live);
        prop_assert_eq!(sched.stats().purged as usize, handles.len() - live);
    }
}
