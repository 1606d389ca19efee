//! Cancellation tokens
//!
//! A [`CancellationToken`] is shared between whoever may cancel an operation and
//! whoever waits on it. Tokens form a hierarchy: cancelling a parent cancels every
//! child created from it. Besides polling [`is_cancelled`](CancellationToken::is_cancelled),
//! a waiter can block on [`done`](CancellationToken::done), a channel that becomes
//! ready the moment the token is cancelled, so cancellation can take part in a
//! `crossbeam_channel::select!`.
//!
//! # Example
//!
//! ```rust
//! use fanout::CancellationToken;
//!
//! let request = CancellationToken::new();
//! let lookup = request.child();
//! let render = request.child();
//!
//! request.cancel();
//! assert!(lookup.is_cancelled() && render.is_cancelled());
//! ```

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Why a token was cancelled
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CancellationReason {
    /// [`CancellationToken::cancel`] was called
    Manual,
    /// An ancestor token was cancelled
    ParentCancelled,
    /// A fanout began shutting down
    Shutdown,
    /// Caller-supplied reason
    Custom(String),
}

impl fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => f.write_str("manually cancelled"),
            Self::ParentCancelled => f.write_str("parent was cancelled"),
            Self::Shutdown => f.write_str("shutdown requested"),
            Self::Custom(msg) => f.write_str(msg),
        }
    }
}

/// Mutable part of a token, guarded by one lock so that registering a child
/// and cancelling cannot interleave.
struct Signal {
    reason: Option<CancellationReason>,
    /// Dropped on cancellation, which disconnects `TokenState::done_rx`.
    wake: Option<Sender<()>>,
    children: Vec<Weak<TokenState>>,
}

struct TokenState {
    fired: AtomicBool,
    signal: Mutex<Signal>,
    done_rx: Receiver<()>,
}

impl TokenState {
    fn fresh() -> Arc<Self> {
        let (wake, done_rx) = crossbeam_channel::bounded(0);
        Arc::new(Self {
            fired: AtomicBool::new(false),
            signal: Mutex::new(Signal {
                reason: None,
                wake: Some(wake),
                children: Vec::new(),
            }),
            done_rx,
        })
    }

    fn fire(&self, reason: CancellationReason) -> bool {
        let (wake, children) = {
            let mut signal = self.signal.lock();
            if signal.reason.is_some() {
                return false;
            }
            signal.reason = Some(reason);
            self.fired.store(true, Ordering::Release);
            (signal.wake.take(), std::mem::take(&mut signal.children))
        };

        drop(wake);
        for child in children.iter().filter_map(Weak::upgrade) {
            child.fire(CancellationReason::ParentCancelled);
        }
        true
    }
}

/// A thread-safe cancellation token
///
/// Clones share state: cancelling any clone cancels them all.
///
/// ```rust
/// use fanout::CancellationToken;
/// use std::thread;
/// use std::time::Duration;
///
/// let token = CancellationToken::new();
/// let waiter = token.clone();
///
/// let handle = thread::spawn(move || {
///     // Blocks until the token is cancelled
///     let _ = waiter.done().recv();
///     waiter.is_cancelled()
/// });
///
/// thread::sleep(Duration::from_millis(20));
/// token.cancel();
/// assert!(handle.join().unwrap());
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("reason", &self.reason())
            .finish()
    }
}

impl CancellationToken {
    /// A token that has not been cancelled
    pub fn new() -> Self {
        Self {
            state: TokenState::fresh(),
        }
    }

    /// Derives a token that is cancelled together with this one
    ///
    /// Deriving from an already-cancelled token yields a cancelled child.
    /// Cancelling the child leaves this token alone.
    pub fn child(&self) -> Self {
        let child = Self::new();
        let mut signal = self.state.signal.lock();
        if signal.reason.is_some() {
            drop(signal);
            child.state.fire(CancellationReason::ParentCancelled);
        } else {
            signal.children.retain(|weak| weak.strong_count() > 0);
            signal.children.push(Arc::downgrade(&child.state));
        }
        child
    }

    /// Cancels with [`CancellationReason::Manual`]
    ///
    /// Returns `true` if this call performed the cancellation.
    pub fn cancel(&self) -> bool {
        self.cancel_with_reason(CancellationReason::Manual)
    }

    /// Cancels this token and every descendant
    ///
    /// The first reason sticks. Only that first call returns `true`.
    pub fn cancel_with_reason(&self, reason: CancellationReason) -> bool {
        self.state.fire(reason)
    }

    /// Whether the token has been cancelled
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.state.fired.load(Ordering::Acquire)
    }

    /// The reason, or `None` while the token is live
    pub fn reason(&self) -> Option<CancellationReason> {
        self.state.signal.lock().reason.clone()
    }

    /// A channel that never yields a value and disconnects on cancellation
    ///
    /// `recv()` on it blocks until the token is cancelled and then returns
    /// `Err(RecvError)`. In a `select!` the arm becomes ready at that point.
    pub fn done(&self) -> &Receiver<()> {
        &self.state.done_rx
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
