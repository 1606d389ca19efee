//! Middleware factories, chains and the process-wide registry

use super::Handler;
use crate::config::FanoutConfig;
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Factory that wraps a handler: `(fanout name, config, inner) -> outer`
pub type Middleware =
    Arc<dyn Fn(&str, &FanoutConfig, Box<dyn Handler>) -> Box<dyn Handler> + Send + Sync>;

/// Turn a closure into a [`Middleware`]
pub fn middleware<F>(factory: F) -> Middleware
where
    F: Fn(&str, &FanoutConfig, Box<dyn Handler>) -> Box<dyn Handler> + Send + Sync + 'static,
{
    Arc::new(factory)
}

/// Ordered list of middleware applied when a fanout is built
///
/// The first middleware in the chain becomes the outermost wrapper: on a submit
/// its logic runs first on the way in and last on the way out.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    layers: Vec<Middleware>,
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("layers", &self.layers.len())
            .finish()
    }
}

impl MiddlewareChain {
    /// An empty chain; handlers built with it are the bare engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware (it will sit inside everything already in the chain)
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with(mut self, layer: Middleware) -> Self {
        self.layers.push(layer);
        self
    }

    /// Append middleware in place
    pub fn extend<I: IntoIterator<Item = Middleware>>(&mut self, layers: I) {
        self.layers.extend(layers);
    }

    /// Number of middleware
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// True if the chain has no middleware
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Wrap `base`, applying the chain from last to first
    pub fn apply(
        &self,
        name: &str,
        config: &FanoutConfig,
        base: Box<dyn Handler>,
    ) -> Box<dyn Handler> {
        self.layers
            .iter()
            .rev()
            .fold(base, |handler, layer| layer(name, config, handler))
    }
}

fn global() -> &'static RwLock<MiddlewareChain> {
    static GLOBAL: OnceLock<RwLock<MiddlewareChain>> = OnceLock::new();
    GLOBAL.get_or_init(|| RwLock::new(MiddlewareChain::new().with(super::trace_middleware())))
}

/// Append middleware to the process-wide chain
///
/// The process-wide chain starts out holding the trace middleware. Fanouts copy
/// the chain when they are built, so registration only affects fanouts built
/// afterwards; register everything during startup, before building any fanout
/// that should see it.
pub fn register_global_middleware<I: IntoIterator<Item = Middleware>>(layers: I) {
    global().write().extend(layers);
}

/// Snapshot of the process-wide chain
pub fn global_chain() -> MiddlewareChain {
    global().read().clone()
}
