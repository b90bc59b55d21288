//! Structural-change events and their delivery channel.
//!
//! Mutations to a locator or a module graph are announced to observers
//! in two phases, mirroring how listeners wrap the mutation:
//! [`EventListener::before_event`] runs before any state changes and may
//! veto the mutation (lock gating lives there), then the mutation
//! commits, then [`EventListener::on_event`] runs for recomputation and
//! log emission. Delivery is synchronous, in registration order, within
//! the triggering call.

use std::fmt;
use std::sync::Weak;

use parking_lot::RwLock;

use crate::error::Result;
use crate::key::TypeKey;
use crate::locator::Mode;
use crate::module::Priority;

/// A structural change in a locator or module graph.
#[derive(Clone, Debug)]
pub enum Event {
    /// One or more type keys now resolve to a new injectable.
    DependenciesUpdated { keys: Vec<TypeKey>, mode: Mode },

    /// A module started using another module.
    ModuleAdded {
        module: String,
        added: String,
        priority: Priority,
    },

    /// A module stopped using another module.
    ModuleRemoved { module: String, removed: String },

    /// A used module was moved to another priority band.
    ModulePriorityUpdated {
        module: String,
        updated: String,
        priority: Priority,
    },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::DependenciesUpdated { keys, mode } => {
                let names: Vec<&str> = keys.iter().map(|key| key.type_name()).collect();
                let plural = if keys.len() > 1 { "ies" } else { "y" };
                write!(
                    f,
                    "{} dependenc{plural} have been updated ({mode}): {}",
                    keys.len(),
                    tazriq_support::rendering::render_type_list(&names),
                )
            }
            Event::ModuleAdded {
                module,
                added,
                priority,
            } => {
                write!(f, "`{module}` now uses `{added}` (priority {priority}).")
            }
            Event::ModuleRemoved { module, removed } => {
                write!(f, "`{module}` no longer uses `{removed}`.")
            }
            Event::ModulePriorityUpdated {
                module,
                updated,
                priority,
            } => {
                write!(
                    f,
                    "In `{module}`, the priority `{priority}` has been applied to `{updated}`."
                )
            }
        }
    }
}

/// Observer of structural changes.
pub trait EventListener: Send + Sync {
    /// Veto phase, before the mutation commits. Returning an error
    /// aborts the mutation with no state changed.
    fn before_event(&self, _event: &Event) -> Result<()> {
        Ok(())
    }

    /// Commit phase, after the mutation is visible.
    fn on_event(&self, event: &Event);
}

/// Ordered list of weak listeners with synchronous delivery.
#[derive(Default)]
pub struct EventChannel {
    listeners: RwLock<Vec<Weak<dyn EventListener>>>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Weak<dyn EventListener>) {
        self.listeners.write().push(listener);
    }

    pub fn remove_listener(&self, listener: &Weak<dyn EventListener>) {
        self.listeners
            .write()
            .retain(|existing| !existing.ptr_eq(listener));
    }

    /// Runs the veto phase over all live listeners, in order.
    pub fn before(&self, event: &Event) -> Result<()> {
        for listener in self.snapshot() {
            listener.before_event(event)?;
        }
        Ok(())
    }

    /// Runs the commit phase over all live listeners, in order, and
    /// prunes dead ones.
    pub fn notify(&self, event: &Event) {
        self.listeners
            .write()
            .retain(|listener| listener.strong_count() > 0);

        for listener in self.snapshot() {
            listener.on_event(event);
        }
    }

    // Listeners run outside the lock: they may re-enter the channel.
    fn snapshot(&self) -> Vec<std::sync::Arc<dyn EventListener>> {
        self.listeners
            .read()
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        seen: AtomicUsize,
    }

    impl EventListener for Counter {
        fn on_event(&self, _event: &Event) {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Veto;

    impl EventListener for Veto {
        fn before_event(&self, _event: &Event) -> Result<()> {
            Err(crate::error::Error::ModuleLocked {
                module: "veto".to_string(),
            })
        }

        fn on_event(&self, _event: &Event) {}
    }

    fn sample_event() -> Event {
        Event::ModuleRemoved {
            module: "app".to_string(),
            removed: "overrides".to_string(),
        }
    }

    #[test]
    fn delivers_to_live_listeners() {
        let channel = EventChannel::new();
        let counter = Arc::new(Counter {
            seen: AtomicUsize::new(0),
        });
        channel.add_listener(Arc::downgrade(&counter) as Weak<dyn EventListener>);

        channel.notify(&sample_event());
        assert_eq!(counter.seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dead_listeners_are_pruned() {
        let channel = EventChannel::new();
        let counter = Arc::new(Counter {
            seen: AtomicUsize::new(0),
        });
        channel.add_listener(Arc::downgrade(&counter) as Weak<dyn EventListener>);
        drop(counter);

        channel.notify(&sample_event());
        assert!(channel.listeners.read().is_empty());
    }

    #[test]
    fn veto_aborts_before_phase() {
        let channel = EventChannel::new();
        let veto = Arc::new(Veto);
        channel.add_listener(Arc::downgrade(&veto) as Weak<dyn EventListener>);

        assert!(channel.before(&sample_event()).is_err());
    }

    #[test]
    fn removed_listener_no_longer_notified() {
        let channel = EventChannel::new();
        let counter = Arc::new(Counter {
            seen: AtomicUsize::new(0),
        });
        let weak = Arc::downgrade(&counter) as Weak<dyn EventListener>;
        channel.add_listener(weak.clone());
        channel.remove_listener(&weak);

        channel.notify(&sample_event());
        assert_eq!(counter.seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn update_event_message() {
        let event = Event::DependenciesUpdated {
            keys: vec![TypeKey::of::<String>()],
            mode: Mode::Normal,
        };
        let message = format!("{event}");
        assert!(message.contains("1 dependency"));
        assert!(message.contains("String"));
    }
}
