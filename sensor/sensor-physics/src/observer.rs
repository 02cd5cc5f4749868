//! Observer hooks for physical state transitions.
//!
//! One observer at a time may be attached to a
//! [`PhysicalModel`](crate::PhysicalModel). The engine never holds its lock
//! while calling into the observer, so a callback may call straight back
//! into the engine.
//!
//! - `Arc<dyn PhysicalStateAgent>` lets the engine clone the observer out of
//!   its state and release the lock before invoking it
//! - every method has a no-op default, so an observer only implements the
//!   transitions it cares about
//! - [`StateCallbacks`] builds an observer from closures

use std::fmt;
use std::sync::Arc;

/// Receives physical state transition notifications.
///
/// `Send + Sync` because callbacks fire on whichever thread drove the
/// transition.
pub trait PhysicalStateAgent: Send + Sync {
    /// The model left rest: values may now change between reads.
    fn on_physical_state_changing(&self) {}

    /// The model came to rest: values will not change until the next target
    /// or override.
    fn on_physical_state_stabilized(&self) {}

    /// A new target was set and all sensor overrides were cleared.
    fn on_target_state_changed(&self) {}
}

/// Shared handle to one observer closure.
///
/// Cloning shares the closure. `Debug` prints a placeholder, so
/// [`StateCallbacks`] can derive it.
pub struct Callback<F: ?Sized>(pub Arc<F>);

impl<F: ?Sized> Clone for Callback<F> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<F: ?Sized> fmt::Debug for Callback<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callback").finish_non_exhaustive()
    }
}

/// A transition callback with no arguments.
pub type StateCallback = Callback<dyn Fn() + Send + Sync>;

/// Observer assembled from optional closures.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use sensor_physics::{PhysicalModel, StateCallbacks};
///
/// let stabilized = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&stabilized);
/// let callbacks = StateCallbacks::new().on_stabilized(move || {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// let model = PhysicalModel::default();
/// model.set_state_agent(Some(Arc::new(callbacks)));
/// assert_eq!(stabilized.load(Ordering::SeqCst), 1);
/// model.set_state_agent(None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StateCallbacks {
    changing: Option<StateCallback>,
    stabilized: Option<StateCallback>,
    target_changed: Option<StateCallback>,
}

impl StateCallbacks {
    /// Create an observer with no callbacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the callback for the stable to changing transition.
    #[must_use]
    pub fn on_changing<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.changing = Some(Callback(Arc::new(f)));
        self
    }

    /// Set the callback for the changing to stable transition.
    #[must_use]
    pub fn on_stabilized<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.stabilized = Some(Callback(Arc::new(f)));
        self
    }

    /// Set the callback for target changes.
    #[must_use]
    pub fn on_target_changed<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.target_changed = Some(Callback(Arc::new(f)));
        self
    }
}

impl PhysicalStateAgent for StateCallbacks {
    fn on_physical_state_changing(&self) {
        if let Some(cb) = &self.changing {
            (cb.0)();
        }
    }

    fn on_physical_state_stabilized(&self) {
        if let Some(cb) = &self.stabilized {
            (cb.0)();
        }
    }

    fn on_target_state_changed(&self) {
        if let Some(cb) = &self.target_changed {
            (cb.0)();
        }
    }
}
