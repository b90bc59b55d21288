//! Composable, named registration and resolution units.
//!
//! A [`Module`] owns a [`Locator`] and an ordered collection of other
//! modules it uses. Lookups search used modules first — the high
//! priority band before the low one, most recently used first within a
//! band — and the module's own locator last. Named modules are
//! process-wide singletons created on first reference.
//!
//! Any structural mutation is gated on the graph being unlocked: once a
//! singleton or scoped cache is primed anywhere in the reachable graph,
//! registrations and graph changes fail until [`Module::unlock`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use futures::future::BoxFuture;
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::RwLock;
use tracing::{debug, error};

use crate::caller::{Caller, downcast_instance};
use crate::error::{Error, ModuleGraphError, Result};
use crate::event::{Event, EventChannel, EventListener};
use crate::inject::{InjectedFunction, Recipe};
use crate::injectable::{
    AsyncResourceScopedInjectable, ConstantInjectable, Injectable, ResourceScopedInjectable,
    ScopedInjectable, SimpleInjectable, SingletonInjectable,
};
use crate::key::{TypeKey, TypeSpec};
use crate::locator::{Locator, Mode, Update};
use crate::scope::{AsyncResource, Resource};
use crate::sync::synchronized;

/// Name of the distinguished always-present module.
pub const DEFAULT_MODULE_NAME: &str = "__default__";

static MODULES: Lazy<DashMap<String, Arc<Module>>> = Lazy::new(DashMap::new);

/// Search priority of a used module.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Priority {
    /// Searched after the high band, before the module's own locator.
    #[default]
    Low,
    /// Searched first.
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::High => write!(f, "high"),
        }
    }
}

/// Receives one human-readable line per committed structural change.
pub trait LogSink: Send + Sync {
    fn log(&self, message: &str);
}

/// Options for a registration.
pub struct Register {
    /// Wrap the recipe as an injected function so its own parameters
    /// resolve against the registering module.
    pub inject: bool,
    /// Extra type descriptors the registration answers for.
    pub on: Vec<TypeSpec>,
    /// Conflict-resolution mode.
    pub mode: Mode,
}

impl Default for Register {
    fn default() -> Self {
        Self {
            inject: true,
            on: Vec::new(),
            mode: Mode::Normal,
        }
    }
}

impl Register {
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn on(mut self, spec: TypeSpec) -> Self {
        self.on.push(spec);
        self
    }

    pub fn without_injection(mut self) -> Self {
        self.inject = false;
        self
    }
}

struct UsedModule {
    module: Arc<Module>,
    priority: Priority,
}

/// A named, composable locator wrapper. See the module-level docs.
pub struct Module {
    name: String,
    locator: Locator,
    channel: EventChannel,
    loggers: RwLock<Vec<Arc<dyn LogSink>>>,
    used: RwLock<Vec<UsedModule>>,
    self_ref: Weak<Module>,
}

impl Module {
    fn build(name: String) -> Arc<Module> {
        let module = Arc::new_cyclic(|weak: &Weak<Module>| Module {
            name,
            locator: Locator::new(),
            channel: EventChannel::new(),
            loggers: RwLock::new(Vec::new()),
            used: RwLock::new(Vec::new()),
            self_ref: weak.clone(),
        });

        // locator events flow through the module so listeners and
        // lock gating see them
        module.locator.add_listener(module.listener_ref());
        module
    }

    /// Creates an anonymous module, not present in the registry.
    pub fn new() -> Arc<Module> {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let serial = COUNTER.fetch_add(1, Ordering::Relaxed);
        Self::build(format!("anonymous@{serial:07x}"))
    }

    /// Returns the process-wide module of this name, creating it on
    /// first reference.
    pub fn get_or_create(name: &str) -> Arc<Module> {
        let _serialized = synchronized();
        MODULES
            .entry(name.to_string())
            .or_insert_with(|| Self::build(name.to_string()))
            .clone()
    }

    /// Returns the distinguished default module.
    pub fn get_default() -> Arc<Module> {
        Self::get_or_create(DEFAULT_MODULE_NAME)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn listener_ref(&self) -> Weak<dyn EventListener> {
        self.self_ref.clone() as Weak<dyn EventListener>
    }

    fn brokers(&self) -> Vec<Arc<Module>> {
        self.used.read().iter().map(|used| used.module.clone()).collect()
    }

    // ── Resolution ──

    /// Returns the first injectable answering for the request, searching
    /// used modules in priority order and the own locator last.
    pub fn lookup(&self, spec: &TypeSpec) -> Result<Arc<dyn Injectable>> {
        for module in self.brokers() {
            if let Ok(injectable) = module.lookup(spec) {
                return Ok(injectable);
            }
        }

        self.locator.lookup(spec)
    }

    /// True if any searched locator answers for the request.
    pub fn contains(&self, spec: &TypeSpec) -> bool {
        self.brokers().iter().any(|module| module.contains(spec)) || self.locator.contains(spec)
    }

    /// Resolves and builds an instance of `T`, propagating lookup misses.
    pub fn find_instance<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.find_instance_with(&TypeSpec::of::<T>())
    }

    /// [`Module::find_instance`] with an explicit request descriptor.
    pub fn find_instance_with<T: Send + Sync + 'static>(&self, spec: &TypeSpec) -> Result<Arc<T>> {
        let injectable = self.lookup(spec)?;
        downcast_instance(injectable.get_instance()?)
    }

    /// Asynchronous [`Module::find_instance`].
    pub async fn afind_instance<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.afind_instance_with(&TypeSpec::of::<T>()).await
    }

    pub async fn afind_instance_with<T: Send + Sync + 'static>(
        &self,
        spec: &TypeSpec,
    ) -> Result<Arc<T>> {
        let injectable = self.lookup(spec)?;
        downcast_instance(injectable.aget_instance().await?)
    }

    /// Like [`Module::find_instance`], but a lookup miss becomes
    /// `Ok(None)` so callers can fall back to a default. Real failures
    /// still propagate.
    pub fn get_instance<T: Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>> {
        self.get_instance_with(&TypeSpec::of::<T>())
    }

    pub fn get_instance_with<T: Send + Sync + 'static>(
        &self,
        spec: &TypeSpec,
    ) -> Result<Option<Arc<T>>> {
        match self.find_instance_with(spec) {
            Ok(instance) => Ok(Some(instance)),
            Err(miss) if miss.is_lookup_failure() => Ok(None),
            Err(failure) => Err(failure),
        }
    }

    /// Asynchronous [`Module::get_instance`].
    pub async fn aget_instance<T: Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>> {
        self.aget_instance_with(&TypeSpec::of::<T>()).await
    }

    pub async fn aget_instance_with<T: Send + Sync + 'static>(
        &self,
        spec: &TypeSpec,
    ) -> Result<Option<Arc<T>>> {
        match self.afind_instance_with(spec).await {
            Ok(instance) => Ok(Some(instance)),
            Err(miss) if miss.is_lookup_failure() => Ok(None),
            Err(failure) => Err(failure),
        }
    }

    /// Defers resolution to the first access of the returned handle;
    /// `cache` memoizes the first result.
    pub fn get_lazy_instance<T: Send + Sync + 'static>(
        self: &Arc<Self>,
        cache: bool,
    ) -> LazyInstance<T> {
        LazyInstance {
            module: self.clone(),
            spec: TypeSpec::of::<T>(),
            cell: cache.then(OnceCell::new),
        }
    }

    // ── Registration ──

    /// Registers a recipe producing instances of its return type.
    /// Returns the injected function so the recipe stays callable.
    pub fn injectable<T: Send + Sync + 'static>(
        self: &Arc<Self>,
        recipe: Recipe<T>,
    ) -> Result<InjectedFunction<T>> {
        self.injectable_with(recipe, Register::default())
    }

    pub fn injectable_with<T: Send + Sync + 'static>(
        self: &Arc<Self>,
        recipe: Recipe<T>,
        register: Register,
    ) -> Result<InjectedFunction<T>> {
        let function = self.wrap(recipe, register.inject);
        let factory: Arc<dyn Caller<T>> = Arc::new(function.clone());
        let injectable: Arc<dyn Injectable> = Arc::new(SimpleInjectable::new(factory));
        self.register_update::<T>(injectable, &register)?;
        Ok(function)
    }

    /// Registers a recipe cached for the injectable's whole lifetime.
    pub fn singleton<T: Send + Sync + 'static>(
        self: &Arc<Self>,
        recipe: Recipe<T>,
    ) -> Result<InjectedFunction<T>> {
        self.singleton_with(recipe, Register::default())
    }

    pub fn singleton_with<T: Send + Sync + 'static>(
        self: &Arc<Self>,
        recipe: Recipe<T>,
        register: Register,
    ) -> Result<InjectedFunction<T>> {
        let function = self.wrap(recipe, register.inject);
        let factory: Arc<dyn Caller<T>> = Arc::new(function.clone());
        let injectable: Arc<dyn Injectable> = Arc::new(SingletonInjectable::new(factory));
        self.register_update::<T>(injectable, &register)?;
        Ok(function)
    }

    /// Registers a recipe cached once per active scope of `scope_name`.
    pub fn scoped<T: Send + Sync + 'static>(
        self: &Arc<Self>,
        scope_name: &str,
        recipe: Recipe<T>,
    ) -> Result<InjectedFunction<T>> {
        self.scoped_with(scope_name, recipe, Register::default())
    }

    pub fn scoped_with<T: Send + Sync + 'static>(
        self: &Arc<Self>,
        scope_name: &str,
        recipe: Recipe<T>,
        register: Register,
    ) -> Result<InjectedFunction<T>> {
        let function = self.wrap(recipe, register.inject);
        let factory: Arc<dyn Caller<T>> = Arc::new(function.clone());
        let injectable: Arc<dyn Injectable> = Arc::new(ScopedInjectable::new(scope_name, factory));
        self.register_update::<T>(injectable, &register)?;
        Ok(function)
    }

    /// Registers a scoped recipe whose factory yields a two-phase
    /// resource; its release runs at scope exit.
    pub fn scoped_resource<R: Resource>(
        self: &Arc<Self>,
        scope_name: &str,
        recipe: Recipe<R>,
    ) -> Result<InjectedFunction<R>> {
        self.scoped_resource_with(scope_name, recipe, Register::default())
    }

    pub fn scoped_resource_with<R: Resource>(
        self: &Arc<Self>,
        scope_name: &str,
        recipe: Recipe<R>,
        register: Register,
    ) -> Result<InjectedFunction<R>> {
        let function = self.wrap(recipe, register.inject);
        let factory: Arc<dyn Caller<R>> = Arc::new(function.clone());
        let injectable: Arc<dyn Injectable> =
            Arc::new(ResourceScopedInjectable::new(scope_name, factory));
        self.register_update::<R::Output>(injectable, &register)?;
        Ok(function)
    }

    /// Asynchronous-resource flavor of [`Module::scoped_resource`]; the
    /// synchronous accessor of the registration only serves cached
    /// instances.
    pub fn scoped_async_resource<R: AsyncResource>(
        self: &Arc<Self>,
        scope_name: &str,
        recipe: Recipe<R>,
    ) -> Result<InjectedFunction<R>> {
        self.scoped_async_resource_with(scope_name, recipe, Register::default())
    }

    pub fn scoped_async_resource_with<R: AsyncResource>(
        self: &Arc<Self>,
        scope_name: &str,
        recipe: Recipe<R>,
        register: Register,
    ) -> Result<InjectedFunction<R>> {
        let function = self.wrap(recipe, register.inject);
        let factory: Arc<dyn Caller<R>> = Arc::new(function.clone());
        let injectable: Arc<dyn Injectable> =
            Arc::new(AsyncResourceScopedInjectable::new(scope_name, factory));
        self.register_update::<R::Output>(injectable, &register)?;
        Ok(function)
    }

    /// Declares that `T` must eventually be provided by someone:
    /// a fallback placeholder that fails on resolution unless overridden.
    pub fn should_be_injectable<T: Send + Sync + 'static>(&self) -> Result<()> {
        let injectable: Arc<dyn Injectable> =
            Arc::new(crate::injectable::ShouldBeInjectable::new(TypeKey::of::<T>()));
        self.update(Update::new(
            [TypeSpec::of::<T>()],
            injectable,
            Mode::Fallback,
        ))
    }

    /// Registers a value built lazily, exactly once, as a plain
    /// non-injected recipe.
    pub fn constant<T: Send + Sync + 'static>(
        &self,
        init: impl Fn() -> T + Send + Sync + 'static,
    ) -> Result<()> {
        self.constant_with(init, Register::default())
    }

    pub fn constant_with<T: Send + Sync + 'static>(
        &self,
        init: impl Fn() -> T + Send + Sync + 'static,
        register: Register,
    ) -> Result<()> {
        let injectable: Arc<dyn Injectable> = Arc::new(ConstantInjectable::lazy(init));
        self.register_update::<T>(injectable, &register)
    }

    /// Registers a pre-built value.
    pub fn set_constant<T: Send + Sync + 'static>(&self, value: T) -> Result<()> {
        self.set_constant_with(value, Register::default())
    }

    pub fn set_constant_with<T: Send + Sync + 'static>(
        &self,
        value: T,
        register: Register,
    ) -> Result<()> {
        let injectable: Arc<dyn Injectable> = Arc::new(ConstantInjectable::eager(value));
        self.register_update::<T>(injectable, &register)
    }

    /// Wraps a recipe so its parameters resolve against this module,
    /// without registering anything.
    pub fn inject<T: Send + 'static>(self: &Arc<Self>, recipe: Recipe<T>) -> InjectedFunction<T> {
        InjectedFunction::bound(recipe, self)
    }

    /// Applies a raw registration update to the own locator.
    pub fn update(&self, update: Update) -> Result<()> {
        self.locator.update(update)
    }

    fn wrap<T: Send + 'static>(
        self: &Arc<Self>,
        recipe: Recipe<T>,
        inject: bool,
    ) -> InjectedFunction<T> {
        if inject {
            InjectedFunction::bound(recipe, self)
        } else {
            InjectedFunction::detached(recipe)
        }
    }

    fn register_update<T: ?Sized + 'static>(
        &self,
        injectable: Arc<dyn Injectable>,
        register: &Register,
    ) -> Result<()> {
        let mut specs = vec![TypeSpec::of::<T>()];
        specs.extend(register.on.iter().cloned());
        self.update(Update::new(specs, injectable, register.mode))
    }

    // ── Graph ──

    /// Starts searching `module` before this module's own locator.
    pub fn use_module(self: &Arc<Self>, module: &Arc<Module>) -> Result<()> {
        self.use_module_with(module, Priority::default())
    }

    pub fn use_module_with(
        self: &Arc<Self>,
        module: &Arc<Module>,
        priority: Priority,
    ) -> Result<()> {
        if Arc::ptr_eq(self, module) {
            return Err(ModuleGraphError::SelfUse {
                module: self.name.clone(),
            }
            .into());
        }

        if self.uses(module) {
            return Err(ModuleGraphError::AlreadyUsed {
                module: self.name.clone(),
                used: module.name.clone(),
            }
            .into());
        }

        let event = Event::ModuleAdded {
            module: self.name.clone(),
            added: module.name.clone(),
            priority,
        };

        self.dispatch_mutation(event, || {
            self.insert_used(module.clone(), priority);
            module.add_listener(self.listener_ref());
            Ok(())
        })
    }

    /// Stops searching `module`. A module not currently used is a
    /// silent no-op.
    pub fn stop_using(self: &Arc<Self>, module: &Arc<Module>) -> Result<()> {
        if !self.uses(module) {
            return Ok(());
        }

        let event = Event::ModuleRemoved {
            module: self.name.clone(),
            removed: module.name.clone(),
        };

        self.dispatch_mutation(event, || {
            self.used
                .write()
                .retain(|used| !Arc::ptr_eq(&used.module, module));
            module.remove_listener(&self.listener_ref());
            Ok(())
        })
    }

    /// Uses `module` for the lifetime of the returned guard.
    pub fn use_temporarily(
        self: &Arc<Self>,
        module: &Arc<Module>,
        priority: Priority,
    ) -> Result<UseGuard> {
        self.use_module_with(module, priority)?;
        Ok(UseGuard {
            module: self.clone(),
            used: module.clone(),
        })
    }

    /// Moves a used module to another priority band, to the
    /// most-recently-used position of that band.
    pub fn change_priority(
        self: &Arc<Self>,
        module: &Arc<Module>,
        priority: Priority,
    ) -> Result<()> {
        let event = Event::ModulePriorityUpdated {
            module: self.name.clone(),
            updated: module.name.clone(),
            priority,
        };

        self.dispatch_mutation(event, || {
            let mut used = self.used.write();

            let Some(position) = used
                .iter()
                .position(|entry| Arc::ptr_eq(&entry.module, module))
            else {
                return Err(ModuleGraphError::NotUsed {
                    module: self.name.clone(),
                    target: module.name.clone(),
                }
                .into());
            };

            let mut entry = used.remove(position);
            entry.priority = priority;
            let insert_at = band_start(&used, priority);
            used.insert(insert_at, entry);
            Ok(())
        })
    }

    /// Atomically replaces the whole used-module set.
    pub fn init_modules(self: &Arc<Self>, modules: &[Arc<Module>]) -> Result<()> {
        for existing in self.brokers() {
            self.stop_using(&existing)?;
        }

        for module in modules {
            self.use_module(module)?;
        }

        Ok(())
    }

    /// Swaps in the named profile modules; the guard restores the
    /// previous used-module set when dropped.
    pub fn load_profile(self: &Arc<Self>, names: &[&str]) -> Result<ProfileGuard> {
        let previous: Vec<(Arc<Module>, Priority)> = self
            .used
            .read()
            .iter()
            .map(|used| (used.module.clone(), used.priority))
            .collect();

        let modules: Vec<Arc<Module>> = names
            .iter()
            .map(|name| Module::get_or_create(name))
            .collect();
        self.init_modules(&modules)?;

        Ok(ProfileGuard {
            module: self.clone(),
            previous,
        })
    }

    fn uses(&self, module: &Arc<Module>) -> bool {
        self.used
            .read()
            .iter()
            .any(|used| Arc::ptr_eq(&used.module, module))
    }

    fn insert_used(&self, module: Arc<Module>, priority: Priority) {
        let mut used = self.used.write();
        let position = band_start(&used, priority);
        used.insert(position, UsedModule { module, priority });
    }

    // ── Locking ──

    /// True while any singleton or scoped cache is primed in the
    /// reachable graph.
    pub fn is_locked(&self) -> bool {
        self.brokers().iter().any(|module| module.is_locked()) || self.locator.is_locked()
    }

    /// Unlocks every used module and the own locator.
    pub fn unlock(&self) -> Result<()> {
        let _serialized = synchronized();

        for module in self.brokers() {
            module.unlock()?;
        }

        self.locator.unlock()
    }

    /// Primes every reachable injectable once.
    pub fn all_ready(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            for module in self.brokers() {
                module.all_ready().await?;
            }

            self.locator.all_ready().await
        })
    }

    fn check_locking(&self) -> Result<()> {
        if self.is_locked() {
            return Err(Error::ModuleLocked {
                module: self.name.clone(),
            });
        }
        Ok(())
    }

    fn dispatch_mutation(&self, event: Event, mutate: impl FnOnce() -> Result<()>) -> Result<()> {
        self.before_event(&event)?;
        mutate()?;
        self.channel.notify(&event);
        self.emit(&event.to_string());
        Ok(())
    }

    // ── Observers ──

    pub fn add_listener(&self, listener: Weak<dyn EventListener>) {
        self.channel.add_listener(listener);
    }

    pub fn remove_listener(&self, listener: &Weak<dyn EventListener>) {
        self.channel.remove_listener(listener);
    }

    /// Adds a sink receiving one line per committed structural change.
    pub fn add_logger(&self, sink: Arc<dyn LogSink>) {
        self.loggers.write().push(sink);
    }

    fn emit(&self, message: &str) {
        debug!(module = %self.name, "{message}");

        let sinks: Vec<Arc<dyn LogSink>> = self.loggers.read().iter().cloned().collect();
        for sink in sinks {
            sink.log(message);
        }
    }
}

impl EventListener for Module {
    fn before_event(&self, event: &Event) -> Result<()> {
        self.check_locking()?;
        self.channel.before(event)
    }

    fn on_event(&self, event: &Event) {
        self.channel.notify(event);
        self.emit(&format!("`{}` has propagated an event: {event}", self.name));
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("uses", &self.used.read().len())
            .finish()
    }
}

fn band_start(used: &[UsedModule], priority: Priority) -> usize {
    match priority {
        Priority::High => 0,
        Priority::Low => used
            .iter()
            .position(|entry| entry.priority == Priority::Low)
            .unwrap_or(used.len()),
    }
}

/// Un-uses a temporarily used module on drop.
pub struct UseGuard {
    module: Arc<Module>,
    used: Arc<Module>,
}

impl Drop for UseGuard {
    fn drop(&mut self) {
        if let Err(failure) = self.module.stop_using(&self.used) {
            error!(module = %self.module, %failure, "Failed to stop using module");
        }
    }
}

/// Restores the previous used-module set on drop.
pub struct ProfileGuard {
    module: Arc<Module>,
    previous: Vec<(Arc<Module>, Priority)>,
}

impl Drop for ProfileGuard {
    fn drop(&mut self) {
        let restore = || -> Result<()> {
            self.module.init_modules(&[])?;
            // re-using in reverse rebuilds the original band order
            for (module, priority) in self.previous.iter().rev() {
                self.module.use_module_with(module, *priority)?;
            }
            Ok(())
        };

        if let Err(failure) = restore() {
            error!(module = %self.module, %failure, "Failed to restore module profile");
        }
    }
}

/// Defers resolution until first access.
pub struct LazyInstance<T> {
    module: Arc<Module>,
    spec: TypeSpec,
    cell: Option<OnceCell<Option<Arc<T>>>>,
}

impl<T: Send + Sync + 'static> LazyInstance<T> {
    /// Resolves now; `Ok(None)` on lookup miss.
    pub fn get(&self) -> Result<Option<Arc<T>>> {
        match &self.cell {
            Some(cell) => {
                if let Some(cached) = cell.get() {
                    return Ok(cached.clone());
                }
                let resolved = self.module.get_instance_with::<T>(&self.spec)?;
                let _ = cell.set(resolved.clone());
                Ok(resolved)
            }
            None => self.module.get_instance_with(&self.spec),
        }
    }

    /// Asynchronous [`LazyInstance::get`].
    pub async fn aget(&self) -> Result<Option<Arc<T>>> {
        match &self.cell {
            Some(cell) => {
                if let Some(cached) = cell.get() {
                    return Ok(cached.clone());
                }
                let resolved = self.module.aget_instance_with::<T>(&self.spec).await?;
                let _ = cell.set(resolved.clone());
                Ok(resolved)
            }
            None => self.module.aget_instance_with(&self.spec).await,
        }
    }
}

pub mod prelude {
    pub use super::{
        DEFAULT_MODULE_NAME, LazyInstance, LogSink, Module, Priority, ProfileGuard, Register,
        UseGuard,
    };
    pub use crate::caller::{Caller, Instance, downcast_instance};
    pub use crate::error::{Error, Result};
    pub use crate::inject::{Arguments, InjectedFunction, Recipe, Signature, param, param_with, untyped};
    pub use crate::injectable::{Injectable, InjectableId};
    pub use crate::key::{TypeKey, TypeSpec};
    pub use crate::locator::{Locator, Mode, Record, Update};
    pub use crate::scope::{
        AsyncResource, AsyncScopeGuard, Resource, Scope, ScopeGuard, ScopeOptions, adefine_scope,
        adefine_scope_with, async_resource, define_scope, define_scope_with, get_active_scopes,
        get_scope, resource, with_scope_context,
    };
}
