//! Dynamically-scoped instance caches with ordered resource teardown.
//!
//! A [`Scope`] binds an instance cache to a dynamic extent. Per name,
//! either any number of *contextual* scopes may be active (one per
//! execution context: a task or a thread), or exactly one *shared* scope
//! visible to every context. The two binding styles are mutually
//! exclusive for the same name at the same time.
//!
//! Contextual bindings live in task-local storage when inside a tokio
//! task context created by [`with_scope_context`], falling back to
//! thread-local storage for plain threads. They are never a single
//! global, so concurrent tasks can't observe each other's scopes.
//!
//! Resources entered into a scope release in reverse acquisition order
//! when the scope closes, whether the exit is normal or not; release
//! failures are all surfaced, aggregated when there are several.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::caller::Instance;
use crate::error::{Error, Result, ScopeConflictError, TeardownError};
use crate::injectable::InjectableId;

/// One instance per scope name: who is bound, and how.
#[derive(Default)]
struct ScopeSlot {
    shared: Option<Arc<Scope>>,
    contextual: Vec<Weak<Scope>>,
}

static SCOPE_REGISTRY: Lazy<DashMap<String, ScopeSlot>> = Lazy::new(DashMap::new);

tokio::task_local! {
    static TASK_SCOPES: RefCell<HashMap<String, Arc<Scope>>>;
}

thread_local! {
    static THREAD_SCOPES: RefCell<HashMap<String, Arc<Scope>>> =
        RefCell::new(HashMap::new());
}

/// Runs a future with its own scope context.
///
/// Contextual scopes defined inside propagate across `.await` points
/// with the task instead of staying pinned to a worker thread. Spawned
/// sub-tasks get no bindings unless wrapped themselves.
pub async fn with_scope_context<F: Future>(future: F) -> F::Output {
    TASK_SCOPES.scope(RefCell::new(HashMap::new()), future).await
}

fn current_binding(name: &str) -> Option<Arc<Scope>> {
    TASK_SCOPES
        .try_with(|bindings| bindings.borrow().get(name).cloned())
        .unwrap_or_else(|_| THREAD_SCOPES.with(|bindings| bindings.borrow().get(name).cloned()))
}

fn insert_binding(scope: &Arc<Scope>) {
    let inserted = TASK_SCOPES.try_with(|bindings| {
        bindings
            .borrow_mut()
            .insert(scope.name().to_string(), scope.clone());
    });

    if inserted.is_err() {
        THREAD_SCOPES.with(|bindings| {
            bindings
                .borrow_mut()
                .insert(scope.name().to_string(), scope.clone());
        });
    }
}

fn remove_binding(scope: &Arc<Scope>) {
    let remove = |bindings: &RefCell<HashMap<String, Arc<Scope>>>| {
        let mut bindings = bindings.borrow_mut();
        if bindings
            .get(scope.name())
            .is_some_and(|bound| Arc::ptr_eq(bound, scope))
        {
            bindings.remove(scope.name());
        }
    };

    if TASK_SCOPES.try_with(remove).is_err() {
        THREAD_SCOPES.with(remove);
    }
}

/// Returns the scope currently visible for `name`: the contextual
/// binding of this execution context, else the shared one.
pub fn get_scope(name: &str) -> Result<Arc<Scope>> {
    if let Some(scope) = current_binding(name) {
        return Ok(scope);
    }

    if let Some(slot) = SCOPE_REGISTRY.get(name) {
        if let Some(shared) = &slot.shared {
            return Ok(shared.clone());
        }
    }

    Err(Error::ScopeUndefined {
        name: name.to_string(),
    })
}

/// Every scope of `name` active anywhere in the process.
pub fn get_active_scopes(name: &str) -> Vec<Arc<Scope>> {
    SCOPE_REGISTRY
        .get(name)
        .map(|slot| {
            let mut scopes: Vec<Arc<Scope>> =
                slot.contextual.iter().filter_map(Weak::upgrade).collect();
            if let Some(shared) = &slot.shared {
                scopes.push(shared.clone());
            }
            scopes
        })
        .unwrap_or_default()
}

fn bind(scope: &Arc<Scope>, shared: bool) -> Result<()> {
    let name = scope.name();
    let mut slot = SCOPE_REGISTRY.entry(name.to_string()).or_default();

    // A binding already visible from this context wins, whatever its kind.
    if current_binding(name).is_some() || slot.shared.is_some() {
        return Err(ScopeConflictError::AlreadyDefined {
            name: name.to_string(),
        }
        .into());
    }

    if shared {
        slot.contextual.retain(|weak| weak.strong_count() > 0);
        if !slot.contextual.is_empty() {
            return Err(ScopeConflictError::SharedWithContextual {
                name: name.to_string(),
            }
            .into());
        }
        slot.shared = Some(scope.clone());
    } else {
        slot.contextual.push(Arc::downgrade(scope));
        drop(slot);
        insert_binding(scope);
    }

    debug!(scope = name, shared, "Scope defined");
    Ok(())
}

fn unbind(scope: &Arc<Scope>, shared: bool) {
    if let Some(mut slot) = SCOPE_REGISTRY.get_mut(scope.name()) {
        if shared {
            if slot
                .shared
                .as_ref()
                .is_some_and(|bound| Arc::ptr_eq(bound, scope))
            {
                slot.shared = None;
            }
        } else {
            slot.contextual
                .retain(|weak| weak.upgrade().is_some_and(|bound| !Arc::ptr_eq(&bound, scope)));
        }
    }

    if !shared {
        remove_binding(scope);
    }

    debug!(scope = scope.name(), "Scope closed");
}

/// A two-phase resource: open now, close at scope exit.
pub trait Resource: Send + 'static {
    type Output: Send + Sync + 'static;

    fn open(&mut self) -> Result<Self::Output>;
    fn close(&mut self) -> Result<()>;
}

/// A two-phase resource with asynchronous open/close.
#[async_trait]
pub trait AsyncResource: Send + 'static {
    type Output: Send + Sync + 'static;

    async fn open(&mut self) -> Result<Self::Output>;
    async fn close(&mut self) -> Result<()>;
}

/// Builds a [`Resource`] from a pair of closures.
pub fn resource<T, O, C>(open: O, close: C) -> FnResource<T, O, C>
where
    T: Send + Sync + 'static,
    O: FnOnce() -> Result<T> + Send + 'static,
    C: FnOnce() -> Result<()> + Send + 'static,
{
    FnResource {
        open: Some(open),
        close: Some(close),
    }
}

pub struct FnResource<T, O, C>
where
    O: FnOnce() -> Result<T>,
    C: FnOnce() -> Result<()>,
{
    open: Option<O>,
    close: Option<C>,
}

impl<T, O, C> Resource for FnResource<T, O, C>
where
    T: Send + Sync + 'static,
    O: FnOnce() -> Result<T> + Send + 'static,
    C: FnOnce() -> Result<()> + Send + 'static,
{
    type Output = T;

    fn open(&mut self) -> Result<T> {
        match self.open.take() {
            Some(open) => open(),
            None => Err(Error::Factory {
                source: "resource opened twice".into(),
            }),
        }
    }

    fn close(&mut self) -> Result<()> {
        match self.close.take() {
            Some(close) => close(),
            None => Ok(()),
        }
    }
}

/// Builds an [`AsyncResource`] from a pair of future-returning closures.
pub fn async_resource<T, O, OF, C, CF>(open: O, close: C) -> AsyncFnResource<T>
where
    T: Send + Sync + 'static,
    O: FnOnce() -> OF + Send + 'static,
    OF: Future<Output = Result<T>> + Send + 'static,
    C: FnOnce() -> CF + Send + 'static,
    CF: Future<Output = Result<()>> + Send + 'static,
{
    AsyncFnResource {
        open: Some(Box::new(move || Box::pin(open()))),
        close: Some(Box::new(move || Box::pin(close()))),
    }
}

pub struct AsyncFnResource<T> {
    open: Option<Box<dyn FnOnce() -> BoxFuture<'static, Result<T>> + Send>>,
    close: Option<Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>>,
}

#[async_trait]
impl<T: Send + Sync + 'static> AsyncResource for AsyncFnResource<T> {
    type Output = T;

    async fn open(&mut self) -> Result<T> {
        match self.open.take() {
            Some(open) => open().await,
            None => Err(Error::Factory {
                source: "resource opened twice".into(),
            }),
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self.close.take() {
            Some(close) => close().await,
            None => Ok(()),
        }
    }
}

enum Finalizer {
    Sync(Box<dyn FnOnce() -> Result<()> + Send>),
    Async(Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>),
}

/// A dynamic extent owning an instance cache and a LIFO cleanup stack.
pub struct Scope {
    name: String,
    supports_async: bool,
    cache: Mutex<HashMap<InjectableId, Instance>>,
    finalizers: Mutex<Vec<Finalizer>>,
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.name)
            .field("supports_async", &self.supports_async)
            .finish()
    }
}

impl Scope {
    fn new(name: &str, supports_async: bool) -> Self {
        Self {
            name: name.to_string(),
            supports_async,
            cache: Mutex::new(HashMap::new()),
            finalizers: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Opens a resource now and registers its release for scope exit.
    pub fn enter<R: Resource>(&self, mut resource: R) -> Result<Arc<R::Output>> {
        let value = Arc::new(resource.open()?);
        self.finalizers
            .lock()
            .push(Finalizer::Sync(Box::new(move || resource.close())));
        Ok(value)
    }

    /// Opens an asynchronous resource now and registers its release for
    /// scope exit. Fails on a scope that doesn't support asynchronous
    /// resources.
    pub async fn aenter<R: AsyncResource>(&self, mut resource: R) -> Result<Arc<R::Output>> {
        if !self.supports_async {
            return Err(Error::SyncAsyncMismatch {
                context: "this scope doesn't support asynchronous resources",
            });
        }

        let value = Arc::new(resource.open().await?);
        self.finalizers
            .lock()
            .push(Finalizer::Async(Box::new(move || {
                Box::pin(async move { resource.close().await })
            })));
        Ok(value)
    }

    pub(crate) fn cached(&self, id: InjectableId) -> Option<Instance> {
        self.cache.lock().get(&id).cloned()
    }

    pub(crate) fn cache_insert(&self, id: InjectableId, instance: Instance) {
        self.cache.lock().insert(id, instance);
    }

    pub(crate) fn cache_remove(&self, id: InjectableId) {
        self.cache.lock().remove(&id);
    }

    pub(crate) fn has_cached(&self, id: InjectableId) -> bool {
        self.cache.lock().contains_key(&id)
    }

    fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    fn take_finalizers(&self) -> Vec<Finalizer> {
        std::mem::take(&mut *self.finalizers.lock())
    }
}

fn aggregate(mut errors: Vec<Error>) -> Result<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(Error::Teardown(TeardownError { errors })),
    }
}

/// Options for scope entry.
#[derive(Clone, Copy, Default, Debug)]
pub struct ScopeOptions {
    /// Bind process-wide instead of to the current execution context.
    pub shared: bool,
}

/// Enters a contextual scope; the guard closes it.
pub fn define_scope(name: &str) -> Result<ScopeGuard> {
    define_scope_with(name, ScopeOptions::default())
}

/// Enters a scope with explicit options.
pub fn define_scope_with(name: &str, options: ScopeOptions) -> Result<ScopeGuard> {
    let scope = Arc::new(Scope::new(name, false));
    bind(&scope, options.shared)?;
    Ok(ScopeGuard {
        scope,
        shared: options.shared,
        closed: false,
    })
}

/// Enters a scope able to hold asynchronous resources.
pub fn adefine_scope(name: &str) -> Result<AsyncScopeGuard> {
    adefine_scope_with(name, ScopeOptions::default())
}

/// Enters an asynchronous-capable scope with explicit options.
pub fn adefine_scope_with(name: &str, options: ScopeOptions) -> Result<AsyncScopeGuard> {
    let scope = Arc::new(Scope::new(name, true));
    bind(&scope, options.shared)?;
    Ok(AsyncScopeGuard {
        scope,
        shared: options.shared,
        closed: false,
    })
}

/// Guard for a synchronous scope. Dropping it closes the scope; use
/// [`ScopeGuard::close`] to observe release failures.
pub struct ScopeGuard {
    scope: Arc<Scope>,
    shared: bool,
    closed: bool,
}

impl std::fmt::Debug for ScopeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeGuard")
            .field("scope", &self.scope)
            .field("shared", &self.shared)
            .field("closed", &self.closed)
            .finish()
    }
}

impl ScopeGuard {
    pub fn scope(&self) -> &Arc<Scope> {
        &self.scope
    }

    /// See [`Scope::enter`].
    pub fn enter<R: Resource>(&self, resource: R) -> Result<Arc<R::Output>> {
        self.scope.enter(resource)
    }

    /// Closes the scope: clears the cache and releases resources in
    /// reverse acquisition order, surfacing every failure.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        release_scope_sync(&self.scope, self.shared)
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(failure) = release_scope_sync(&self.scope, self.shared) {
                error!(scope = self.scope.name(), %failure, "Scope teardown failed");
            }
        }
    }
}

fn release_scope_sync(scope: &Arc<Scope>, shared: bool) -> Result<()> {
    unbind(scope, shared);
    scope.clear_cache();

    let mut errors = Vec::new();
    for finalizer in scope.take_finalizers().into_iter().rev() {
        match finalizer {
            Finalizer::Sync(close) => {
                if let Err(failure) = close() {
                    errors.push(failure);
                }
            }
            // unreachable for sync scopes; defensive for async drop paths
            Finalizer::Async(_) => {
                error!(
                    scope = scope.name(),
                    "Asynchronous resource leaked: scope was closed synchronously"
                );
            }
        }
    }

    aggregate(errors)
}

/// Guard for an asynchronous-capable scope. Call
/// [`AsyncScopeGuard::close`] to release asynchronous resources; a plain
/// drop unbinds the scope, runs synchronous finalizers and logs any
/// leaked asynchronous ones (Rust has no asynchronous drop).
pub struct AsyncScopeGuard {
    scope: Arc<Scope>,
    shared: bool,
    closed: bool,
}

impl AsyncScopeGuard {
    pub fn scope(&self) -> &Arc<Scope> {
        &self.scope
    }

    /// See [`Scope::enter`].
    pub fn enter<R: Resource>(&self, resource: R) -> Result<Arc<R::Output>> {
        self.scope.enter(resource)
    }

    /// See [`Scope::aenter`].
    pub async fn aenter<R: AsyncResource>(&self, resource: R) -> Result<Arc<R::Output>> {
        self.scope.aenter(resource).await
    }

    /// Closes the scope, awaiting asynchronous releases in reverse
    /// acquisition order and surfacing every failure.
    pub async fn close(mut self) -> Result<()> {
        self.closed = true;
        unbind(&self.scope, self.shared);
        self.scope.clear_cache();

        let mut errors = Vec::new();
        for finalizer in self.scope.take_finalizers().into_iter().rev() {
            let released = match finalizer {
                Finalizer::Sync(close) => close(),
                Finalizer::Async(close) => close().await,
            };
            if let Err(failure) = released {
                errors.push(failure);
            }
        }

        aggregate(errors)
    }
}

impl Drop for AsyncScopeGuard {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(failure) = release_scope_sync(&self.scope, self.shared) {
                error!(scope = self.scope.name(), %failure, "Scope teardown failed");
            }
        }
    }
}
