//! Process lifecycle hooks.
//!
//! Long-lived services register startup and shutdown hooks with a
//! [`LifecycleBinder`] instead of spawning at construction time; the
//! host process decides when boot and teardown actually happen.

use parking_lot::Mutex;
use tracing::debug;

/// A deferred startup or shutdown action.
pub type LifecycleHook = Box<dyn FnOnce() + Send>;

/// Registers hooks fired at process boot and termination.
pub trait LifecycleBinder: Send + Sync {
    fn on_startup(&self, name: &str, hook: LifecycleHook);
    fn on_shutdown(&self, name: &str, hook: LifecycleHook);
}

/// Default binder: collects hooks and fires them on demand.
///
/// Startup hooks run in registration order, shutdown hooks in reverse
/// registration order.
pub struct RuntimeLifecycle {
    startup: Mutex<Vec<(String, LifecycleHook)>>,
    shutdown: Mutex<Vec<(String, LifecycleHook)>>,
}

impl RuntimeLifecycle {
    pub fn new() -> Self {
        Self {
            startup: Mutex::new(Vec::new()),
            shutdown: Mutex::new(Vec::new()),
        }
    }

    /// Fires all registered startup hooks.
    pub fn startup(&self) {
        let hooks = std::mem::take(&mut *self.startup.lock());
        for (name, hook) in hooks {
            debug!("running startup hook: {}", name);
            hook();
        }
    }

    /// Fires all registered shutdown hooks, most recent first.
    pub fn shutdown(&self) {
        let mut hooks = std::mem::take(&mut *self.shutdown.lock());
        hooks.reverse();
        for (name, hook) in hooks {
            debug!("running shutdown hook: {}", name);
            hook();
        }
    }
}

impl Default for RuntimeLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleBinder for RuntimeLifecycle {
    fn on_startup(&self, name: &str, hook: LifecycleHook) {
        self.startup.lock().push((name.to_string(), hook));
    }

    fn on_shutdown(&self, name: &str, hook: LifecycleHook) {
        self.shutdown.lock().push((name.to_string(), hook));
    }
}
