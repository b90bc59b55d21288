//! Per-module registration table: type key → (injectable, mode).
//!
//! The locator owns conflict resolution between competing registrations
//! for the same key. A registration of equal or higher [`Mode`] rank
//! replaces the existing record (the most recent one wins); a lower
//! rank is silently dropped. The exception is two normal-mode
//! registrations for the same key, which is a hard error aborting the
//! whole update.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::{Error, NoInjectableError, Result};
use crate::event::{Event, EventChannel, EventListener};
use crate::injectable::Injectable;
use crate::key::{TypeKey, TypeSpec, normalize};
use crate::sync::synchronized;

/// Registration precedence level.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub enum Mode {
    /// Loses to anything; used for placeholders and overridable defaults.
    Fallback,
    /// The default. Two normal registrations for one key conflict.
    #[default]
    Normal,
    /// Wins over fallback and normal registrations.
    Override,
}

impl Mode {
    /// Ordinal rank; an equal or greater rank replaces a record.
    #[inline]
    pub fn rank(&self) -> u8 {
        match self {
            Mode::Fallback => 0,
            Mode::Normal => 1,
            Mode::Override => 2,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Fallback => write!(f, "fallback"),
            Mode::Normal => write!(f, "normal"),
            Mode::Override => write!(f, "override"),
        }
    }
}

/// A stored registration.
#[derive(Clone)]
pub struct Record {
    pub injectable: Arc<dyn Injectable>,
    pub mode: Mode,
}

/// A pending registration: which keys, which injectable, which mode.
pub struct Update {
    pub specs: Vec<TypeSpec>,
    pub injectable: Arc<dyn Injectable>,
    pub mode: Mode,
}

impl Update {
    pub fn new(
        specs: impl IntoIterator<Item = TypeSpec>,
        injectable: Arc<dyn Injectable>,
        mode: Mode,
    ) -> Self {
        Self {
            specs: specs.into_iter().collect(),
            injectable,
            mode,
        }
    }
}

/// Registration table owned by one module.
#[derive(Default)]
pub struct Locator {
    records: RwLock<HashMap<TypeKey, Record>>,
    channel: EventChannel,
}

impl Locator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the first registration matching the normalized request.
    pub fn lookup(&self, spec: &TypeSpec) -> Result<Arc<dyn Injectable>> {
        let records = self.records.read();

        for key in spec.keys(false) {
            if let Some(record) = records.get(&key) {
                trace!(key = %key, "Locator hit");
                return Ok(record.injectable.clone());
            }
        }

        Err(Self::no_injectable(spec, &records))
    }

    /// True if any normalized form of the request is registered.
    pub fn contains(&self, spec: &TypeSpec) -> bool {
        let records = self.records.read();
        spec.keys(false).iter().any(|key| records.contains_key(key))
    }

    /// Applies a registration under the conflict rules.
    ///
    /// All-or-nothing: a normal-vs-normal collision aborts before any
    /// key changes. If anything actually changed, a structural-change
    /// event fires synchronously before this returns.
    pub fn update(&self, update: Update) -> Result<()> {
        let _serialized = synchronized();

        let keys = normalize(&update.specs, true);
        let staged = self.stage(&keys, update.mode)?;

        if staged.is_empty() {
            return Ok(());
        }

        let event = Event::DependenciesUpdated {
            keys: staged.clone(),
            mode: update.mode,
        };

        self.channel.before(&event)?;

        {
            let mut records = self.records.write();
            for key in &staged {
                records.insert(
                    *key,
                    Record {
                        injectable: update.injectable.clone(),
                        mode: update.mode,
                    },
                );
            }
        }

        debug!(keys = staged.len(), mode = %update.mode, "Dependencies updated");
        self.channel.notify(&event);
        Ok(())
    }

    fn stage(&self, keys: &[TypeKey], mode: Mode) -> Result<Vec<TypeKey>> {
        let records = self.records.read();
        let mut staged = Vec::new();

        for key in keys {
            match records.get(key) {
                None => staged.push(*key),
                Some(existing) => {
                    if mode == Mode::Normal && existing.mode == Mode::Normal {
                        return Err(Error::RegistrationConflict { key: *key });
                    }
                    if mode.rank() >= existing.mode.rank() {
                        staged.push(*key);
                    }
                    // lower rank: keep the existing record, silently
                }
            }
        }

        Ok(staged)
    }

    /// True if any stored injectable holds a primed cache.
    pub fn is_locked(&self) -> bool {
        self.distinct_injectables()
            .iter()
            .any(|injectable| injectable.is_locked())
    }

    /// Drops every stored injectable's primed cache.
    pub fn unlock(&self) -> Result<()> {
        for injectable in self.distinct_injectables() {
            injectable.unlock()?;
        }
        Ok(())
    }

    /// Awaits every stored injectable once, priming singleton and
    /// scoped caches.
    pub async fn all_ready(&self) -> Result<()> {
        for injectable in self.distinct_injectables() {
            injectable.aget_instance().await?;
        }
        Ok(())
    }

    pub fn add_listener(&self, listener: Weak<dyn EventListener>) {
        self.channel.add_listener(listener);
    }

    pub fn remove_listener(&self, listener: &Weak<dyn EventListener>) {
        self.channel.remove_listener(listener);
    }

    fn distinct_injectables(&self) -> Vec<Arc<dyn Injectable>> {
        let records = self.records.read();
        let mut seen = HashSet::new();
        records
            .values()
            .filter(|record| seen.insert(record.injectable.id()))
            .map(|record| record.injectable.clone())
            .collect()
    }

    fn no_injectable(spec: &TypeSpec, records: &HashMap<TypeKey, Record>) -> Error {
        let names: Vec<&str> = records.keys().map(|key| key.type_name()).collect();
        Error::NoInjectable(NoInjectableError {
            requested: spec.to_string(),
            suggestions: tazriq_support::rendering::suggest_similar(
                &spec.to_string(),
                &names,
                3,
            ),
        })
    }
}
