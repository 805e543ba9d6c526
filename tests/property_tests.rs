//! Property-based tests for rust_kernel_context using proptest

use proptest::prelude::*;
use rust_kernel_context::clock::{duration_to_ticks, ticks_to_duration};
use rust_kernel_context::kernel::highbit;
use rust_kernel_context::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// TaskqConfig Tests
// ============================================================================

proptest! {
    /// A fixed queue of any positive size is valid
    #[test]
    fn test_fixed_config_valid(threads in 1usize..64) {
        let config = TaskqConfig::new("fixed", threads);
        prop_assert!(config.validate().is_ok());
        prop_assert_eq!(config.min_threads, config.max_threads);
    }

    /// A dynamic queue is valid exactly when its floor fits under its ceiling
    #[test]
    fn test_dynamic_config_bounds(min in 0usize..16, max in 1usize..16) {
        let config = TaskqConfig::new("dynamic", max).with_dynamic(min, max);
        prop_assert_eq!(config.validate().is_ok(), min <= max);
    }

    /// CPU percentages in 1..=100 validate; anything above is rejected
    #[test]
    fn test_cpu_percent_config(pct in 1u32..200) {
        let config = TaskqConfig::new("pct", 1).with_cpu_percent(pct);
        prop_assert_eq!(config.validate().is_ok(), pct <= 100);
    }

    /// Reserved capacity may not exceed a set outstanding limit
    #[test]
    fn test_alloc_config(min_alloc in 0usize..64, max_alloc in 0usize..64) {
        let config = TaskqConfig::new("alloc", 2).with_alloc(min_alloc, max_alloc);
        prop_assert_eq!(
            config.validate().is_ok(),
            max_alloc == 0 || min_alloc <= max_alloc
        );
    }

    /// Kernel-style DYNAMIC flags give a floor of one and the count as ceiling
    #[test]
    fn test_from_flags_dynamic(threads in 1usize..128) {
        let config = TaskqConfig::from_flags(
            "flags",
            threads,
            MINCLSYSPRI,
            0,
            0,
            TaskqFlags::DYNAMIC,
        );
        prop_assert!(config.dynamic);
        prop_assert_eq!(config.min_threads, 1);
        prop_assert_eq!(config.max_threads, threads);
        prop_assert!(config.validate().is_ok());
    }
}

// ============================================================================
// Taskq Behavior Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Every dispatched task has run once wait() returns
    #[test]
    fn test_wait_sees_all_tasks(threads in 1usize..8, tasks in 0usize..200) {
        let tq = Taskq::create(TaskqConfig::new("drain_count", threads))
            .expect("Failed to create taskq");
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..tasks {
            let counter = Arc::clone(&counter);
            tq.dispatch(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                DispatchFlags::SLEEP,
            )
            .expect("Failed to dispatch");
        }
        tq.wait();

        prop_assert_eq!(counter.load(Ordering::SeqCst), tasks);
        prop_assert_eq!(tq.outstanding(), 0);
        prop_assert!(tq.nthreads() <= threads);
        tq.destroy();
    }

    /// A one-thread queue runs same-priority tasks in dispatch order
    #[test]
    fn test_single_worker_fifo(tasks in 1usize..100) {
        let tq = Taskq::create(TaskqConfig::new("fifo", 1))
            .expect("Failed to create taskq");
        let order = Arc::new(Mutex::new(Vec::with_capacity(tasks)));

        for i in 0..tasks {
            let order = Arc::clone(&order);
            tq.dispatch(move || order.lock().unwrap().push(i), DispatchFlags::SLEEP)
                .expect("Failed to dispatch");
        }
        tq.wait();

        let order = order.lock().unwrap();
        prop_assert_eq!(&*order, &(0..tasks).collect::<Vec<_>>());
    }

    /// Task ids are unique and increasing
    #[test]
    fn test_task_ids_increase(tasks in 1usize..50) {
        let tq = Taskq::create(TaskqConfig::new("ids", 2))
            .expect("Failed to create taskq");
        let mut last = 0;
        for _ in 0..tasks {
            let id = tq.dispatch(|| {}, DispatchFlags::SLEEP).expect("Failed to dispatch");
            prop_assert!(id.get() > last);
            last = id.get();
        }
        tq.wait();
    }

    /// Dropping the last handle drains the queue
    #[test]
    fn test_drop_drains(tasks in 0usize..100) {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let tq = Taskq::create(TaskqConfig::new("drop_drain", 2))
                .expect("Failed to create taskq");
            for _ in 0..tasks {
                let counter = Arc::clone(&counter);
                tq.dispatch(
                    move || {
                        std::thread::sleep(Duration::from_micros(10));
                        counter.fetch_add(1, Ordering::SeqCst);
                    },
                    DispatchFlags::SLEEP,
                )
                .expect("Failed to dispatch");
            }
        }
        prop_assert_eq!(counter.load(Ordering::SeqCst), tasks);
    }
}

// ============================================================================
// Primitive and Helper Tests
// ============================================================================

proptest! {
    /// A mutex entered and exited any number of times ends unowned
    #[test]
    fn test_mutex_balanced_enter_exit(rounds in 1usize..200) {
        let lock = KMutex::initialized("balanced");
        for _ in 0..rounds {
            lock.enter();
            prop_assert!(lock.held());
            lock.exit();
        }
        prop_assert!(!lock.is_locked());
        lock.destroy();
    }

    /// Converting ticks to a duration and back is lossless
    #[test]
    fn test_tick_conversion(ticks in 0i64..1_000_000) {
        prop_assert_eq!(duration_to_ticks(ticks_to_duration(ticks)), ticks);
    }

    /// highbit names the most significant set bit
    #[test]
    fn test_highbit(value in 1u64..u64::MAX) {
        let bit = highbit(value);
        prop_assert!(bit >= 1 && bit <= 64);
        prop_assert!(value >> (bit - 1) == 1);
    }
}
