//! Reentrant init/teardown guard

use parking_lot::Mutex;

/// Reference-counted initialization guard
///
/// Several owners may share one process-wide resource. Each calls
/// [`enter`](Self::enter) when it starts using it and [`exit`](Self::exit) when
/// it stops. The init closure runs only when the count goes from 0 to 1, the
/// teardown closure only when it returns to 0. Both run while the count lock is
/// held, so an init can never overtake a teardown that is still in progress.
///
/// ```rust
/// use fanout::core::RefOnce;
///
/// static GUARD: RefOnce = RefOnce::new();
///
/// let mut inits = 0;
/// GUARD.enter(|| inits += 1);
/// GUARD.enter(|| inits += 1);
/// assert_eq!(inits, 1);
/// assert_eq!(GUARD.count(), 2);
/// ```
#[derive(Debug)]
pub struct RefOnce {
    count: Mutex<usize>,
}

impl RefOnce {
    /// Create a guard with no owners
    pub const fn new() -> Self {
        Self {
            count: parking_lot::const_mutex(0),
        }
    }

    /// Register an owner, running `init` if it is the first
    pub fn enter<F: FnOnce()>(&self, init: F) {
        let mut count = self.count.lock();
        *count += 1;
        if *count == 1 {
            init();
        }
    }

    /// Release an owner, running `teardown` if it was the last
    ///
    /// Unbalanced calls (more exits than enters) are ignored.
    pub fn exit<F: FnOnce()>(&self, teardown: F) {
        let mut count = self.count.lock();
        if *count == 0 {
            return;
        }
        *count -= 1;
        if *count == 0 {
            teardown();
        }
    }

    /// Current number of owners
    pub fn count(&self) -> usize {
        *self.count.lock()
    }
}

impl Default for RefOnce {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_init_and_teardown_balance() {
        let once = RefOnce::new();
        let mut inits = 0;
        let mut teardowns = 0;

        once.enter(|| inits += 1);
        once.enter(|| inits += 1);
        once.exit(|| teardowns += 1);
        assert_eq!((inits, teardowns), (1, 0));

        once.exit(|| teardowns += 1);
        assert_eq!((inits, teardowns), (1, 1));

        // Extra exit is a no-op
        once.exit(|| teardowns += 1);
        assert_eq!(teardowns, 1);

        // Re-entering after full teardown initializes again
        once.enter(|| inits += 1);
        assert_eq!(inits, 2);
    }

    #[test]
    fn test_concurrent_enter_runs_init_once() {
        let once = Arc::new(RefOnce::new());
        let inits = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let once = Arc::clone(&once);
                let inits = Arc::clone(&inits);
                thread::spawn(move || {
                    once.enter(|| {
                        inits.fetch_add(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("thread panicked");
        }
        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert_eq!(once.count(), 16);
    }
}
