//! Handler abstraction and middleware
//!
//! Everything a fanout can do is expressed by [`Handler`]. The worker pool
//! [`Engine`](crate::pool::Engine) is the base handler; middleware wraps a handler
//! in another one that adds behavior (tracing, instrumentation, ...) and then
//! delegates. A [`MiddlewareChain`] is the ordered list of factories applied when
//! a fanout is built.
//!
//! # Writing middleware
//!
//! ```rust
//! use fanout::middleware::{middleware, Handler, MiddlewareChain};
//! use fanout::{Context, Fanout, Result, Work};
//!
//! struct Tenant<H> {
//!     inner: H,
//! }
//!
//! impl<H: Handler> Handler for Tenant<H> {
//!     fn try_submit(&self, ctx: &Context, work: Work) -> Result<()> {
//!         self.inner.try_submit(&ctx.with_value("tenant", "acme"), work)
//!     }
//!     fn submit(&self, ctx: &Context, work: Work) -> Result<()> {
//!         self.inner.submit(&ctx.with_value("tenant", "acme"), work)
//!     }
//!     fn shutdown(&self) -> Result<()> {
//!         self.inner.shutdown()
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let chain = MiddlewareChain::new().with(middleware(|_name, _config, inner| {
//!     Box::new(Tenant { inner })
//! }));
//! let fanout = Fanout::builder("tenants").middleware(chain).build()?;
//! fanout.try_execute(&Context::background(), |ctx| {
//!     assert_eq!(ctx.value("tenant"), Some("acme"));
//! })?;
//! fanout.shutdown()?;
//! # Ok(())
//! # }
//! ```

mod chain;
pub mod trace;

pub use chain::{global_chain, middleware, register_global_middleware, Middleware, MiddlewareChain};
pub use trace::{trace_middleware, TraceHandler};

use crate::core::{Context, Result, Work};
use std::sync::Arc;

/// The capability set shared by the engine and every decorator
pub trait Handler: Send + Sync {
    /// Enqueue without waiting; a saturated queue yields `QueueFull`
    fn try_submit(&self, ctx: &Context, work: Work) -> Result<()>;

    /// Enqueue, waiting for space until `ctx` is cancelled or expires
    fn submit(&self, ctx: &Context, work: Work) -> Result<()>;

    /// Stop accepting work, drain the queue and join the workers
    fn shutdown(&self) -> Result<()>;
}

impl<H: Handler + ?Sized> Handler for Box<H> {
    fn try_submit(&self, ctx: &Context, work: Work) -> Result<()> {
        (**self).try_submit(ctx, work)
    }

    fn submit(&self, ctx: &Context, work: Work) -> Result<()> {
        (**self).submit(ctx, work)
    }

    fn shutdown(&self) -> Result<()> {
        (**self).shutdown()
    }
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn try_submit(&self, ctx: &Context, work: Work) -> Result<()> {
        (**self).try_submit(ctx, work)
    }

    fn submit(&self, ctx: &Context, work: Work) -> Result<()> {
        (**self).submit(ctx, work)
    }

    fn shutdown(&self) -> Result<()> {
        (**self).shutdown()
    }
}
