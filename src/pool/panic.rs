//! Panic isolation for task execution
//!
//! [`catch`] runs a task under `catch_unwind`. To report *where* a task panicked,
//! not just that it did, a process panic hook is installed when the first engine
//! is built. The hook records the location and a backtrace of the panic site
//! into a thread-local, but only on threads that are currently inside [`catch`];
//! it then forwards to whatever hook was installed before.
//!
//! The hook is never removed. Taking it out again would also discard any hook
//! the application set in the meantime. If the application replaces it later,
//! reports fall back to a backtrace of the catch point.

use crate::core::RefOnce;
use parking_lot::Mutex;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe, PanicHookInfo};
use std::thread;

type PanicHook = dyn Fn(&PanicHookInfo<'_>) + Sync + Send + 'static;

static HOOK_GUARD: RefOnce = RefOnce::new();
static HOOK_INSTALLED: Mutex<bool> = parking_lot::const_mutex(false);

thread_local! {
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
    static CAPTURED: RefCell<Option<(Option<String>, Backtrace)>> = const { RefCell::new(None) };
}

/// What is known about a task that panicked
#[derive(Debug)]
pub struct PanicReport {
    /// Panic payload rendered as text
    pub message: String,
    /// `file:line:column` of the panic, when the hook was installed
    pub location: Option<String>,
    /// Backtrace of the panic site, or of the catch point as a fallback
    pub backtrace: String,
}

/// Run `f`, converting a panic into a [`PanicReport`]
pub fn catch<F: FnOnce()>(f: F) -> Result<(), PanicReport> {
    CAPTURED.with(|c| c.borrow_mut().take());
    CAPTURING.with(|c| c.set(true));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    CAPTURING.with(|c| c.set(false));

    result.map_err(|payload| {
        let captured = CAPTURED.with(|c| c.borrow_mut().take());
        let (location, backtrace) = match captured {
            Some((location, backtrace)) => (location, backtrace.to_string()),
            None => (None, Backtrace::force_capture().to_string()),
        };
        PanicReport {
            message: payload_message(payload.as_ref()),
            location,
            backtrace,
        }
    })
}

fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Counts the live engines and makes sure the capturing hook is installed
#[derive(Debug)]
pub struct HookGuard {
    _private: (),
}

impl HookGuard {
    /// Register an engine, installing the hook if none was live
    pub fn acquire() -> Self {
        HOOK_GUARD.enter(install_hook);
        Self { _private: () }
    }

    /// Number of engines currently holding a guard
    pub fn live() -> usize {
        HOOK_GUARD.count()
    }
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        HOOK_GUARD.exit(|| {
            log::trace!(target: "fanout", "last engine dropped; panic hook stays installed");
        });
    }
}

fn install_hook() {
    let mut installed = HOOK_INSTALLED.lock();
    // Hooks cannot be swapped while unwinding; the next engine retries
    if *installed || thread::panicking() {
        return;
    }

    let previous: Box<PanicHook> = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        if CAPTURING.with(Cell::get) {
            let location = info.location().map(|l| l.to_string());
            let backtrace = Backtrace::force_capture();
            CAPTURED.with(|c| *c.borrow_mut() = Some((location, backtrace)));
        }
        previous(info);
    }));
    *installed = true;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catch_ok() {
        let mut ran = false;
        assert!(catch(|| ran = true).is_ok());
        assert!(ran);
    }

    #[test]
    fn test_catch_str_and_string_payloads() {
        let report = catch(|| panic!("static message")).unwrap_err();
        assert_eq!(report.message, "static message");

        let n = 7;
        let report = catch(|| panic!("formatted {}", n)).unwrap_err();
        assert_eq!(report.message, "formatted 7");
    }

    #[test]
    fn test_catch_unknown_payload() {
        let report = catch(|| std::panic::panic_any(42u32)).unwrap_err();
        assert_eq!(report.message, "Unknown panic");
    }

    #[test]
    fn test_hook_records_location() {
        let _guard = HookGuard::acquire();
        let report = catch(|| panic!("located")).unwrap_err();
        let location = report.location.expect("hook records the panic location");
        assert!(location.contains("panic.rs"), "unexpected location {}", location);
        assert!(!report.backtrace.is_empty());
    }
}
