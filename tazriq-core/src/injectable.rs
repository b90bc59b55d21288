//! Injectable variants: how to produce and cache one instance.
//!
//! Every registration stores an [`Injectable`] behind an
//! `Arc<dyn Injectable>`. The variant decides the caching policy:
//! build every time, once per process, or once per active scope, with
//! resource-aware flavors that tie teardown to scope exit.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;

use crate::caller::{Caller, Instance};
use crate::error::{Error, Result};
use crate::key::TypeKey;
use crate::scope::{self, AsyncResource, Resource};
use crate::sync::synchronized;

/// Process-unique identity of an injectable; scope caches key by it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct InjectableId(u64);

impl InjectableId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A factory plus cache strategy producing instances of one registration.
#[async_trait]
pub trait Injectable: Send + Sync {
    /// Identity used as the scope-cache key.
    fn id(&self) -> InjectableId;

    /// True while this injectable holds a primed cache somewhere.
    fn is_locked(&self) -> bool {
        false
    }

    /// Drops any primed cache. Refused by resource-backed scoped
    /// injectables, whose lifetime is owned by their scope.
    fn unlock(&self) -> Result<()> {
        Ok(())
    }

    /// Returns an instance synchronously.
    fn get_instance(&self) -> Result<Instance>;

    /// Returns an instance, awaiting asynchronous factories.
    async fn aget_instance(&self) -> Result<Instance>;
}

impl std::fmt::Debug for dyn Injectable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Injectable")
            .field("id", &self.id())
            .field("is_locked", &self.is_locked())
            .finish()
    }
}

/// No caching: every request invokes the factory.
pub struct SimpleInjectable<T> {
    factory: Arc<dyn Caller<T>>,
    id: InjectableId,
}

impl<T> SimpleInjectable<T> {
    pub fn new(factory: Arc<dyn Caller<T>>) -> Self {
        Self {
            factory,
            id: InjectableId::next(),
        }
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Injectable for SimpleInjectable<T> {
    fn id(&self) -> InjectableId {
        self.id
    }

    fn get_instance(&self) -> Result<Instance> {
        let instance: Instance = Arc::new(self.factory.call()?);
        Ok(instance)
    }

    async fn aget_instance(&self) -> Result<Instance> {
        let instance: Instance = Arc::new(self.factory.acall().await?);
        Ok(instance)
    }
}

/// Caches exactly one instance for the injectable's lifetime.
///
/// First synchronous construction double-checks under the process-wide
/// re-entrant lock; first asynchronous construction double-checks under
/// a per-injectable async mutex. Either way at most one factory run wins.
pub struct SingletonInjectable<T> {
    factory: Arc<dyn Caller<T>>,
    cache: RwLock<Option<Arc<T>>>,
    build_guard: tokio::sync::Mutex<()>,
    id: InjectableId,
}

impl<T> SingletonInjectable<T> {
    pub fn new(factory: Arc<dyn Caller<T>>) -> Self {
        Self {
            factory,
            cache: RwLock::new(None),
            build_guard: tokio::sync::Mutex::new(()),
            id: InjectableId::next(),
        }
    }

    fn cached(&self) -> Option<Arc<T>> {
        self.cache.read().clone()
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Injectable for SingletonInjectable<T> {
    fn id(&self) -> InjectableId {
        self.id
    }

    fn is_locked(&self) -> bool {
        self.cache.read().is_some()
    }

    fn unlock(&self) -> Result<()> {
        *self.cache.write() = None;
        Ok(())
    }

    fn get_instance(&self) -> Result<Instance> {
        if let Some(value) = self.cached() {
            let instance: Instance = value;
            return Ok(instance);
        }

        let _guard = synchronized();

        if let Some(value) = self.cached() {
            let instance: Instance = value;
            return Ok(instance);
        }

        let value = Arc::new(self.factory.call()?);
        *self.cache.write() = Some(value.clone());
        let instance: Instance = value;
        Ok(instance)
    }

    async fn aget_instance(&self) -> Result<Instance> {
        if let Some(value) = self.cached() {
            let instance: Instance = value;
            return Ok(instance);
        }

        let _guard = self.build_guard.lock().await;

        if let Some(value) = self.cached() {
            let instance: Instance = value;
            return Ok(instance);
        }

        let value = Arc::new(self.factory.acall().await?);
        *self.cache.write() = Some(value.clone());
        let instance: Instance = value;
        Ok(instance)
    }
}

enum ConstantState<T> {
    Ready(Arc<T>),
    Lazy {
        cell: OnceCell<Arc<T>>,
        init: Box<dyn Fn() -> T + Send + Sync>,
    },
}

/// A pre-built (or built-exactly-once) value registered as a plain,
/// non-injected recipe. Never participates in locking.
pub struct ConstantInjectable<T> {
    state: ConstantState<T>,
    id: InjectableId,
}

impl<T> ConstantInjectable<T> {
    /// Eagerly holds an already-built value.
    pub fn eager(value: T) -> Self {
        Self {
            state: ConstantState::Ready(Arc::new(value)),
            id: InjectableId::next(),
        }
    }

    /// Builds the value on first request, exactly once.
    pub fn lazy(init: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            state: ConstantState::Lazy {
                cell: OnceCell::new(),
                init: Box::new(init),
            },
            id: InjectableId::next(),
        }
    }

    fn value(&self) -> Arc<T> {
        match &self.state {
            ConstantState::Ready(value) => value.clone(),
            ConstantState::Lazy { cell, init } => cell.get_or_init(|| Arc::new(init())).clone(),
        }
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Injectable for ConstantInjectable<T> {
    fn id(&self) -> InjectableId {
        self.id
    }

    fn get_instance(&self) -> Result<Instance> {
        let instance: Instance = self.value();
        Ok(instance)
    }

    async fn aget_instance(&self) -> Result<Instance> {
        self.get_instance()
    }
}

/// Caches one instance per active scope of the configured name.
pub struct ScopedInjectable<T> {
    factory: Arc<dyn Caller<T>>,
    scope_name: String,
    id: InjectableId,
}

impl<T> ScopedInjectable<T> {
    pub fn new(scope_name: &str, factory: Arc<dyn Caller<T>>) -> Self {
        Self {
            factory,
            scope_name: scope_name.to_string(),
            id: InjectableId::next(),
        }
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Injectable for ScopedInjectable<T> {
    fn id(&self) -> InjectableId {
        self.id
    }

    fn is_locked(&self) -> bool {
        scope::get_active_scopes(&self.scope_name)
            .iter()
            .any(|scope| scope.has_cached(self.id))
    }

    fn unlock(&self) -> Result<()> {
        for scope in scope::get_active_scopes(&self.scope_name) {
            scope.cache_remove(self.id);
        }
        Ok(())
    }

    fn get_instance(&self) -> Result<Instance> {
        let scope = scope::get_scope(&self.scope_name)?;

        if let Some(instance) = scope.cached(self.id) {
            return Ok(instance);
        }

        let instance: Instance = Arc::new(self.factory.call()?);
        scope.cache_insert(self.id, instance.clone());
        Ok(instance)
    }

    async fn aget_instance(&self) -> Result<Instance> {
        let scope = scope::get_scope(&self.scope_name)?;

        if let Some(instance) = scope.cached(self.id) {
            return Ok(instance);
        }

        let instance: Instance = Arc::new(self.factory.acall().await?);
        scope.cache_insert(self.id, instance.clone());
        Ok(instance)
    }
}

/// Scoped injectable whose factory yields a two-phase resource; the
/// opened value is cached and its release runs at scope exit.
pub struct ResourceScopedInjectable<R: Resource> {
    factory: Arc<dyn Caller<R>>,
    scope_name: String,
    id: InjectableId,
}

impl<R: Resource> ResourceScopedInjectable<R> {
    pub fn new(scope_name: &str, factory: Arc<dyn Caller<R>>) -> Self {
        Self {
            factory,
            scope_name: scope_name.to_string(),
            id: InjectableId::next(),
        }
    }

    fn locked_anywhere(&self) -> bool {
        scope::get_active_scopes(&self.scope_name)
            .iter()
            .any(|scope| scope.has_cached(self.id))
    }
}

#[async_trait]
impl<R: Resource> Injectable for ResourceScopedInjectable<R> {
    fn id(&self) -> InjectableId {
        self.id
    }

    fn is_locked(&self) -> bool {
        self.locked_anywhere()
    }

    fn unlock(&self) -> Result<()> {
        if self.locked_anywhere() {
            return Err(Error::UnlockRefused {
                scope_name: self.scope_name.clone(),
            });
        }
        Ok(())
    }

    fn get_instance(&self) -> Result<Instance> {
        let scope = scope::get_scope(&self.scope_name)?;

        if let Some(instance) = scope.cached(self.id) {
            return Ok(instance);
        }

        let resource = self.factory.call()?;
        let instance: Instance = scope.enter(resource)?;
        scope.cache_insert(self.id, instance.clone());
        Ok(instance)
    }

    async fn aget_instance(&self) -> Result<Instance> {
        let scope = scope::get_scope(&self.scope_name)?;

        if let Some(instance) = scope.cached(self.id) {
            return Ok(instance);
        }

        let resource = self.factory.acall().await?;
        let instance: Instance = scope.enter(resource)?;
        scope.cache_insert(self.id, instance.clone());
        Ok(instance)
    }
}

/// Scoped injectable backed by an asynchronous resource. The
/// synchronous accessor only serves already-built instances.
pub struct AsyncResourceScopedInjectable<R: AsyncResource> {
    factory: Arc<dyn Caller<R>>,
    scope_name: String,
    id: InjectableId,
}

impl<R: AsyncResource> AsyncResourceScopedInjectable<R> {
    pub fn new(scope_name: &str, factory: Arc<dyn Caller<R>>) -> Self {
        Self {
            factory,
            scope_name: scope_name.to_string(),
            id: InjectableId::next(),
        }
    }

    fn locked_anywhere(&self) -> bool {
        scope::get_active_scopes(&self.scope_name)
            .iter()
            .any(|scope| scope.has_cached(self.id))
    }
}

#[async_trait]
impl<R: AsyncResource> Injectable for AsyncResourceScopedInjectable<R> {
    fn id(&self) -> InjectableId {
        self.id
    }

    fn is_locked(&self) -> bool {
        self.locked_anywhere()
    }

    fn unlock(&self) -> Result<()> {
        if self.locked_anywhere() {
            return Err(Error::UnlockRefused {
                scope_name: self.scope_name.clone(),
            });
        }
        Ok(())
    }

    fn get_instance(&self) -> Result<Instance> {
        let scope = scope::get_scope(&self.scope_name)?;

        if let Some(instance) = scope.cached(self.id) {
            return Ok(instance);
        }

        Err(Error::SyncAsyncMismatch {
            context: "the factory opens an asynchronous resource",
        })
    }

    async fn aget_instance(&self) -> Result<Instance> {
        let scope = scope::get_scope(&self.scope_name)?;

        if let Some(instance) = scope.cached(self.id) {
            return Ok(instance);
        }

        let resource = self.factory.acall().await?;
        let instance: Instance = scope.aenter(resource).await?;
        scope.cache_insert(self.id, instance.clone());
        Ok(instance)
    }
}

/// Placeholder for a type declared "must eventually be provided".
///
/// Resolving it is an error until a real registration supersedes it.
pub struct ShouldBeInjectable {
    key: TypeKey,
    id: InjectableId,
}

impl ShouldBeInjectable {
    pub fn new(key: TypeKey) -> Self {
        Self {
            key,
            id: InjectableId::next(),
        }
    }
}

#[async_trait]
impl Injectable for ShouldBeInjectable {
    fn id(&self) -> InjectableId {
        self.id
    }

    fn get_instance(&self) -> Result<Instance> {
        Err(Error::ShouldBeInjectable {
            type_name: self.key.type_name(),
        })
    }

    async fn aget_instance(&self) -> Result<Instance> {
        self.get_instance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caller::{AsyncCaller, SyncCaller, downcast_instance};
    use crate::scope::{define_scope, resource};
    use std::sync::atomic::AtomicU32;

    fn unique(name: &str) -> String {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        format!("{name}-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    fn counting_factory(counter: &Arc<AtomicU32>) -> Arc<dyn Caller<u32>> {
        let counter = counter.clone();
        Arc::new(SyncCaller::new(move || {
            Ok(counter.fetch_add(1, Ordering::SeqCst))
        }))
    }

    #[test]
    fn simple_builds_every_time() {
        let counter = Arc::new(AtomicU32::new(0));
        let injectable = SimpleInjectable::new(counting_factory(&counter));

        let first = downcast_instance::<u32>(injectable.get_instance().unwrap()).unwrap();
        let second = downcast_instance::<u32>(injectable.get_instance().unwrap()).unwrap();

        assert_ne!(*first, *second);
        assert!(!injectable.is_locked());
    }

    #[test]
    fn singleton_builds_once_and_unlocks() {
        let counter = Arc::new(AtomicU32::new(0));
        let injectable = SingletonInjectable::new(counting_factory(&counter));

        let first = downcast_instance::<u32>(injectable.get_instance().unwrap()).unwrap();
        let second = downcast_instance::<u32>(injectable.get_instance().unwrap()).unwrap();
        assert_eq!(*first, *second);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(injectable.is_locked());

        injectable.unlock().unwrap();
        assert!(!injectable.is_locked());

        let third = downcast_instance::<u32>(injectable.get_instance().unwrap()).unwrap();
        assert_eq!(*third, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn singleton_concurrent_first_access_builds_once() {
        let counter = Arc::new(AtomicU32::new(0));
        let factory: Arc<dyn Caller<u32>> = {
            let counter = counter.clone();
            Arc::new(SyncCaller::new(move || {
                std::thread::sleep(std::time::Duration::from_millis(10));
                Ok(counter.fetch_add(1, Ordering::SeqCst))
            }))
        };
        let injectable: Arc<SingletonInjectable<u32>> =
            Arc::new(SingletonInjectable::new(factory));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let injectable = injectable.clone();
                std::thread::spawn(move || {
                    downcast_instance::<u32>(injectable.get_instance().unwrap()).unwrap()
                })
            })
            .collect();

        let values: Vec<u32> = handles.into_iter().map(|h| *h.join().unwrap()).collect();
        assert!(values.iter().all(|value| *value == values[0]));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn async_factory_rejects_sync_access() {
        let injectable =
            SimpleInjectable::new(Arc::new(AsyncCaller::new(|| async { Ok(7u32) }))
                as Arc<dyn Caller<u32>>);

        assert!(matches!(
            injectable.get_instance().unwrap_err(),
            Error::SyncAsyncMismatch { .. }
        ));

        let first = downcast_instance::<u32>(injectable.aget_instance().await.unwrap()).unwrap();
        let second = downcast_instance::<u32>(injectable.aget_instance().await.unwrap()).unwrap();
        assert_eq!(*first, 7);
        // Simple policy: freshly built each time, so distinct allocations
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn constant_lazy_builds_once() {
        let counter = Arc::new(AtomicU32::new(0));
        let injectable = {
            let counter = counter.clone();
            ConstantInjectable::lazy(move || counter.fetch_add(1, Ordering::SeqCst))
        };

        let first = downcast_instance::<u32>(injectable.get_instance().unwrap()).unwrap();
        let second = downcast_instance::<u32>(injectable.get_instance().unwrap()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!injectable.is_locked());
    }

    #[test]
    fn constant_eager_shares_the_value() {
        let injectable = ConstantInjectable::eager("config".to_string());
        let first =
            downcast_instance::<String>(injectable.get_instance().unwrap()).unwrap();
        let second =
            downcast_instance::<String>(injectable.get_instance().unwrap()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn should_be_injectable_always_fails() {
        let injectable = ShouldBeInjectable::new(TypeKey::of::<String>());
        assert!(matches!(
            injectable.get_instance().unwrap_err(),
            Error::ShouldBeInjectable { .. }
        ));
    }

    #[test]
    fn scoped_caches_per_scope() {
        let name = unique("request");
        let counter = Arc::new(AtomicU32::new(0));
        let injectable = ScopedInjectable::new(&name, counting_factory(&counter));

        assert!(matches!(
            injectable.get_instance().unwrap_err(),
            Error::ScopeUndefined { .. }
        ));

        let guard = define_scope(&name).unwrap();
        let first = downcast_instance::<u32>(injectable.get_instance().unwrap()).unwrap();
        let second = downcast_instance::<u32>(injectable.get_instance().unwrap()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(injectable.is_locked());
        guard.close().unwrap();

        let guard = define_scope(&name).unwrap();
        let third = downcast_instance::<u32>(injectable.get_instance().unwrap()).unwrap();
        assert_ne!(*first, *third);
        guard.close().unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn scoped_unlock_evicts_from_active_scopes() {
        let name = unique("request");
        let counter = Arc::new(AtomicU32::new(0));
        let injectable = ScopedInjectable::new(&name, counting_factory(&counter));

        let _guard = define_scope(&name).unwrap();
        let _ = injectable.get_instance().unwrap();
        assert!(injectable.is_locked());

        injectable.unlock().unwrap();
        assert!(!injectable.is_locked());

        let _ = injectable.get_instance().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn resource_scoped_refuses_unlock_while_open() {
        let name = unique("request");
        let released = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let factory: Arc<dyn Caller<_>> = {
            let released = released.clone();
            Arc::new(SyncCaller::new(move || {
                let released = released.clone();
                Ok(resource(
                    || Ok("handle"),
                    move || {
                        released.store(true, Ordering::SeqCst);
                        Ok(())
                    },
                ))
            }))
        };
        let injectable = ResourceScopedInjectable::new(&name, factory);

        let guard = define_scope(&name).unwrap();
        let handle =
            downcast_instance::<&'static str>(injectable.get_instance().unwrap()).unwrap();
        assert_eq!(*handle, "handle");

        assert!(matches!(
            injectable.unlock().unwrap_err(),
            Error::UnlockRefused { .. }
        ));

        guard.close().unwrap();
        assert!(released.load(Ordering::SeqCst));
        assert!(injectable.unlock().is_ok());
    }

    #[tokio::test]
    async fn async_resource_scoped_requires_async_surface() {
        use crate::scope::{adefine_scope, async_resource};

        let name = unique("request");
        let factory: Arc<dyn Caller<_>> = Arc::new(SyncCaller::new(move || {
            Ok(async_resource(
                || async { Ok(11u32) },
                || async { Ok(()) },
            ))
        }));
        let injectable = AsyncResourceScopedInjectable::new(&name, factory);

        let guard = adefine_scope(&name).unwrap();

        // not built yet: the sync accessor can't open it
        assert!(matches!(
            injectable.get_instance().unwrap_err(),
            Error::SyncAsyncMismatch { .. }
        ));

        let built =
            downcast_instance::<u32>(injectable.aget_instance().await.unwrap()).unwrap();
        assert_eq!(*built, 11);

        // once cached, the sync accessor serves it
        let cached = downcast_instance::<u32>(injectable.get_instance().unwrap()).unwrap();
        assert!(Arc::ptr_eq(&built, &cached));

        guard.close().await.unwrap();
    }
}
