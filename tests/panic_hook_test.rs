//! Interaction with the application's own panic hook
//!
//! Kept in its own test binary: it replaces the process panic hook, which
//! would race with panics in any test running alongside it.

use crossbeam_channel::bounded;
use fanout::pool::panic::HookGuard;
use fanout::prelude::*;
use std::panic;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_application_hook_survives_fanout_drop() {
    let fanout = Fanout::new("hook-owner").expect("Failed to build fanout");
    assert_eq!(HookGuard::live(), 1);

    let fired = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&fired);
    panic::set_hook(Box::new(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    }));

    fanout.shutdown().expect("Failed to shut down");
    drop(fanout);
    assert_eq!(HookGuard::live(), 0);

    let _ = panic::catch_unwind(|| panic!("after the last fanout"));
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // A later fanout must not install over it either
    let later = Fanout::new("hook-later").expect("Failed to build fanout");
    let (tx, rx) = bounded(1);
    later
        .try_execute(&Context::background(), |_| panic!("task panic"))
        .expect("Failed to submit task");
    later
        .try_execute(&Context::background(), move |_| {
            let _ = tx.send(());
        })
        .expect("Failed to submit task");
    rx.recv_timeout(Duration::from_secs(5))
        .expect("worker stopped after a panic");
    later.shutdown().expect("Failed to shut down");

    assert_eq!(fired.load(Ordering::SeqCst), 2);
    let panicked: u64 = later.worker_stats().iter().map(|s| s.get_tasks_panicked()).sum();
    assert_eq!(panicked, 1);

    let _ = panic::take_hook();
}
