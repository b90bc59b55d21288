//! Injected functions: callables whose declared parameters resolve
//! against a module at call time.
//!
//! Rust has no runtime parameter reflection, so a recipe carries its
//! own [`Signature`]: an ordered list of parameter names with optional
//! type descriptors. Parameters with no descriptor, or whose lookup
//! misses, are simply left to explicit call-site arguments. Explicit
//! arguments always shadow resolved dependencies of the same name.
//!
//! Dependency resolution is lazy: a one-shot setup queue runs before
//! the first invocation, resolving the dependency snapshot and
//! subscribing to the module's structural-change events so the snapshot
//! recomputes when the graph changes. Never-called recipes never
//! subscribe.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};

use crate::caller::{Caller, Instance, downcast_instance};
use crate::error::{Error, Result};
use crate::event::{Event, EventListener};
use crate::injectable::Injectable;
use crate::key::TypeSpec;
use crate::module::Module;

/// One declared parameter of a recipe.
#[derive(Clone, Debug)]
pub struct Parameter {
    pub(crate) name: &'static str,
    pub(crate) spec: Option<TypeSpec>,
}

/// Declares a parameter resolvable as type `T`.
#[inline]
pub fn param<T: ?Sized + 'static>(name: &'static str) -> Parameter {
    Parameter {
        name,
        spec: Some(TypeSpec::of::<T>()),
    }
}

/// Declares a parameter with an explicit type descriptor (unions etc.).
#[inline]
pub fn param_with(name: &'static str, spec: TypeSpec) -> Parameter {
    Parameter {
        name,
        spec: Some(spec),
    }
}

/// Declares a parameter with no type: always supplied explicitly.
#[inline]
pub fn untyped(name: &'static str) -> Parameter {
    Parameter { name, spec: None }
}

/// Ordered parameter list of a recipe.
#[derive(Clone, Debug, Default)]
pub struct Signature {
    params: Vec<Parameter>,
}

impl Signature {
    pub fn new(params: impl IntoIterator<Item = Parameter>) -> Self {
        Self {
            params: params.into_iter().collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }
}

/// Named arguments passed to a recipe: explicit call-site values merged
/// with resolved dependencies.
#[derive(Clone, Default)]
pub struct Arguments {
    values: HashMap<&'static str, Instance>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion of an owned value.
    pub fn with<T: Send + Sync + 'static>(mut self, name: &'static str, value: T) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert<T: Send + Sync + 'static>(&mut self, name: &'static str, value: T) {
        let instance: Instance = Arc::new(value);
        self.values.insert(name, instance);
    }

    /// Inserts an already-shared instance.
    pub fn insert_instance(&mut self, name: &'static str, instance: Instance) {
        self.values.insert(name, instance);
    }

    /// Typed access; fails when absent or of the wrong type.
    pub fn get<T: Send + Sync + 'static>(&self, name: &'static str) -> Result<Arc<T>> {
        match self.values.get(name) {
            Some(instance) => downcast_instance(instance.clone()),
            None => Err(Error::MissingArgument { name }),
        }
    }

    /// Typed access for parameters that may legitimately be absent.
    pub fn get_opt<T: Send + Sync + 'static>(&self, name: &'static str) -> Option<Arc<T>> {
        self.values
            .get(name)
            .and_then(|instance| instance.clone().downcast::<T>().ok())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

enum RecipeBody<T> {
    Sync(Arc<dyn Fn(&Arguments) -> Result<T> + Send + Sync>),
    Async(Arc<dyn Fn(Arguments) -> BoxFuture<'static, Result<T>> + Send + Sync>),
}

impl<T> Clone for RecipeBody<T> {
    fn clone(&self) -> Self {
        match self {
            RecipeBody::Sync(body) => RecipeBody::Sync(body.clone()),
            RecipeBody::Async(body) => RecipeBody::Async(body.clone()),
        }
    }
}

/// A factory with a declared signature, ready to be registered or
/// wrapped as an injected function.
pub struct Recipe<T> {
    pub(crate) signature: Signature,
    body: RecipeBody<T>,
}

impl<T> Clone for Recipe<T> {
    fn clone(&self) -> Self {
        Self {
            signature: self.signature.clone(),
            body: self.body.clone(),
        }
    }
}

impl<T: Send + 'static> Recipe<T> {
    /// A synchronous recipe.
    pub fn new(
        signature: Signature,
        body: impl Fn(&Arguments) -> Result<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            signature,
            body: RecipeBody::Sync(Arc::new(body)),
        }
    }

    /// An asynchronous recipe. Its synchronous surface is a
    /// well-defined failure.
    pub fn new_async<F, Fut>(signature: Signature, body: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            signature,
            body: RecipeBody::Async(Arc::new(move |arguments| Box::pin(body(arguments)))),
        }
    }

    /// A dependency-free synchronous recipe.
    pub fn function(body: impl Fn() -> Result<T> + Send + Sync + 'static) -> Self {
        Self::new(Signature::empty(), move |_| body())
    }

    /// A dependency-free asynchronous recipe.
    pub fn async_function<F, Fut>(body: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self::new_async(Signature::empty(), move |_| body())
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }
}

type SetupTask = Box<dyn FnOnce() + Send>;

/// Per-injected-callable state: signature, owner, lazily-resolved
/// dependency snapshot and the one-shot setup queue.
pub struct InjectMetadata {
    signature: Signature,
    module: Mutex<Weak<Module>>,
    owner: Mutex<Option<TypeSpec>>,
    dependencies: RwLock<Dependencies>,
    setup_queue: Mutex<Option<Vec<SetupTask>>>,
}

struct Dependencies {
    entries: Vec<(&'static str, Arc<dyn Injectable>)>,
    resolved: bool,
}

impl Dependencies {
    fn empty() -> Self {
        Self {
            entries: Vec::new(),
            resolved: false,
        }
    }

    fn resolve(signature: &Signature, module: &Arc<Module>, owner: Option<&TypeSpec>) -> Self {
        let mut entries = Vec::new();

        for (index, parameter) in signature.params().iter().enumerate() {
            // a bound-method-style first parameter resolves as the owner
            let spec = match (index, owner) {
                (0, Some(owner)) => Some(owner),
                _ => parameter.spec.as_ref(),
            };

            let Some(spec) = spec else { continue };

            // an individual miss is not an error: the parameter is then
            // supplied explicitly or not at all
            if let Ok(injectable) = module.lookup(spec) {
                entries.push((parameter.name, injectable));
            }
        }

        Self {
            entries,
            resolved: true,
        }
    }
}

impl InjectMetadata {
    fn new(signature: Signature) -> Arc<Self> {
        Arc::new(Self {
            signature,
            module: Mutex::new(Weak::new()),
            owner: Mutex::new(None),
            dependencies: RwLock::new(Dependencies::empty()),
            setup_queue: Mutex::new(Some(Vec::new())),
        })
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Resolves the first parameter against `owner` instead of its own
    /// declared type. Must happen before dependencies are resolved.
    pub fn set_owner(&self, owner: TypeSpec) -> Result<()> {
        if self.dependencies.read().resolved {
            return Err(Error::OwnerAfterResolution);
        }

        let mut slot = self.owner.lock();
        if slot.is_some() {
            return Err(Error::OwnerAlreadyDefined);
        }

        *slot = Some(owner);
        Ok(())
    }

    /// Queues a task to run exactly once before the first invocation.
    /// Fails once the queue has already run.
    pub fn on_setup(&self, task: impl FnOnce() + Send + 'static) -> Result<()> {
        match &mut *self.setup_queue.lock() {
            Some(queue) => {
                queue.push(Box::new(task));
                Ok(())
            }
            None => Err(Error::SetupClosed),
        }
    }

    /// Recomputes the dependency snapshot against `module`.
    pub(crate) fn rebind(&self, module: &Arc<Module>) {
        let owner = self.owner.lock().clone();
        let resolved = Dependencies::resolve(&self.signature, module, owner.as_ref());
        *self.dependencies.write() = resolved;
    }

    fn attach(self: &Arc<Self>, module: &Arc<Module>) {
        *self.module.lock() = Arc::downgrade(module);

        let metadata = Arc::downgrade(self);
        let module = Arc::downgrade(module);

        // resolve + subscribe lazily, only once actually invoked
        let _ = self.on_setup(move || {
            if let (Some(metadata), Some(module)) = (metadata.upgrade(), module.upgrade()) {
                metadata.rebind(&module);
                module.add_listener(Arc::downgrade(&metadata) as Weak<dyn EventListener>);
            }
        });
    }

    fn run_setup(&self) {
        // holding the lock serializes concurrent first invocations
        let mut queue = self.setup_queue.lock();
        if let Some(tasks) = queue.take() {
            for task in tasks {
                task();
            }
        }
    }

    fn snapshot(&self) -> Vec<(&'static str, Arc<dyn Injectable>)> {
        self.dependencies.read().entries.clone()
    }

    fn bind(&self, explicit: &Arguments) -> Result<Arguments> {
        let mut merged = explicit.clone();
        for (name, injectable) in self.snapshot() {
            if merged.contains(name) {
                continue;
            }
            merged.insert_instance(name, injectable.get_instance()?);
        }
        Ok(merged)
    }

    async fn abind(&self, explicit: &Arguments) -> Result<Arguments> {
        let mut merged = explicit.clone();
        for (name, injectable) in self.snapshot() {
            if merged.contains(name) {
                continue;
            }
            merged.insert_instance(name, injectable.aget_instance().await?);
        }
        Ok(merged)
    }
}

impl EventListener for InjectMetadata {
    fn on_event(&self, _event: &Event) {
        if let Some(module) = self.module.lock().upgrade() {
            self.rebind(&module);
        }
    }
}

/// A recipe wrapped so its parameters resolve against a module, with
/// synchronous and asynchronous call surfaces.
pub struct InjectedFunction<T> {
    body: RecipeBody<T>,
    metadata: Arc<InjectMetadata>,
}

impl<T> Clone for InjectedFunction<T> {
    fn clone(&self) -> Self {
        Self {
            body: self.body.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

impl<T> std::fmt::Debug for InjectedFunction<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InjectedFunction")
            .field("signature", self.metadata.signature())
            .finish()
    }
}

impl<T: Send + 'static> InjectedFunction<T> {
    pub(crate) fn bound(recipe: Recipe<T>, module: &Arc<Module>) -> Self {
        let metadata = InjectMetadata::new(recipe.signature.clone());
        metadata.attach(module);
        Self {
            body: recipe.body,
            metadata,
        }
    }

    /// Wraps a recipe with no module binding: nothing resolves, all
    /// parameters come from explicit arguments.
    pub(crate) fn detached(recipe: Recipe<T>) -> Self {
        Self {
            body: recipe.body,
            metadata: InjectMetadata::new(recipe.signature),
        }
    }

    pub fn metadata(&self) -> &Arc<InjectMetadata> {
        &self.metadata
    }

    /// Calls synchronously with explicit arguments. Fails when the
    /// recipe body or any resolved dependency factory is async-only.
    pub fn call(&self, arguments: Arguments) -> Result<T> {
        self.metadata.run_setup();
        let merged = self.metadata.bind(&arguments)?;

        match &self.body {
            RecipeBody::Sync(body) => body(&merged),
            RecipeBody::Async(_) => Err(Error::SyncAsyncMismatch {
                context: "the recipe is asynchronous",
            }),
        }
    }

    /// Calls asynchronously with explicit arguments; synchronous
    /// recipes run inline.
    pub async fn acall(&self, arguments: Arguments) -> Result<T> {
        self.metadata.run_setup();
        let merged = self.metadata.abind(&arguments).await?;

        match &self.body {
            RecipeBody::Sync(body) => body(&merged),
            RecipeBody::Async(body) => body(merged).await,
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Caller<T> for InjectedFunction<T> {
    fn call(&self) -> Result<T> {
        InjectedFunction::call(self, Arguments::new())
    }

    async fn acall(&self) -> Result<T> {
        InjectedFunction::acall(self, Arguments::new()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Module;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    struct Greeting(String);

    fn greeting_recipe() -> Recipe<String> {
        Recipe::new(
            Signature::new([param::<Greeting>("greeting"), untyped("name")]),
            |args| {
                let greeting = args.get::<Greeting>("greeting")?;
                let name = args.get::<String>("name")?;
                Ok(format!("{} {}", greeting.0, name))
            },
        )
    }

    #[test]
    fn resolves_registered_and_merges_explicit() {
        let module = Module::new();
        module
            .set_constant(Greeting("hello".to_string()))
            .unwrap();

        let function = module.inject(greeting_recipe());
        let rendered = function
            .call(Arguments::new().with("name", "world".to_string()))
            .unwrap();
        assert_eq!(rendered, "hello world");
    }

    #[test]
    fn explicit_argument_shadows_resolved_dependency() {
        let module = Module::new();
        module
            .set_constant(Greeting("hello".to_string()))
            .unwrap();

        let function = module.inject(greeting_recipe());
        let rendered = function
            .call(
                Arguments::new()
                    .with("greeting", Greeting("goodbye".to_string()))
                    .with("name", "world".to_string()),
            )
            .unwrap();
        assert_eq!(rendered, "goodbye world");
    }

    #[test]
    fn unresolvable_parameter_must_be_supplied() {
        let module = Module::new();
        let function = module.inject(greeting_recipe());

        let err = function
            .call(Arguments::new().with("name", "world".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::MissingArgument { name: "greeting" }));
    }

    #[test]
    fn dependency_snapshot_recomputes_on_module_change() {
        let module = Module::new();
        let function = module.inject(greeting_recipe());

        // first call resolves nothing for `greeting`
        assert!(
            function
                .call(Arguments::new().with("name", "world".to_string()))
                .is_err()
        );

        // registering afterwards re-resolves through the change event
        module
            .set_constant(Greeting("hello".to_string()))
            .unwrap();
        let rendered = function
            .call(Arguments::new().with("name", "world".to_string()))
            .unwrap();
        assert_eq!(rendered, "hello world");
    }

    #[test]
    fn setup_tasks_run_once_in_order_then_close() {
        let module = Module::new();
        let function = module.inject(Recipe::function(|| Ok(0u8)));

        let order = Arc::new(Mutex::new(Vec::new()));
        for label in ["first", "second"] {
            let order = order.clone();
            function
                .metadata()
                .on_setup(move || order.lock().push(label))
                .unwrap();
        }

        function.call(Arguments::new()).unwrap();
        function.call(Arguments::new()).unwrap();
        assert_eq!(*order.lock(), vec!["first", "second"]);

        assert!(matches!(
            function.metadata().on_setup(|| {}).unwrap_err(),
            Error::SetupClosed
        ));
    }

    #[tokio::test]
    async fn async_recipe_has_no_sync_surface() {
        let module = Module::new();
        let calls = Arc::new(AtomicU32::new(0));

        let function = {
            let calls = calls.clone();
            module.inject(Recipe::async_function(move || {
                let calls = calls.clone();
                async move { Ok(calls.fetch_add(1, Ordering::SeqCst)) }
            }))
        };

        assert!(matches!(
            function.call(Arguments::new()).unwrap_err(),
            Error::SyncAsyncMismatch { .. }
        ));

        assert_eq!(function.acall(Arguments::new()).await.unwrap(), 0);
        assert_eq!(function.acall(Arguments::new()).await.unwrap(), 1);
    }

    #[test]
    fn owner_resolves_first_parameter() {
        struct Owner;

        let module = Module::new();
        module.set_constant(7u32).unwrap();
        module
            .set_constant_with(
                "owned".to_string(),
                crate::module::Register::default().on(TypeSpec::of::<Owner>()),
            )
            .unwrap();

        let recipe: Recipe<String> = Recipe::new(
            Signature::new([untyped("this"), param::<u32>("count")]),
            |args| {
                let this = args.get::<String>("this")?;
                let count = args.get::<u32>("count")?;
                Ok(format!("{this}:{count}"))
            },
        );

        let function = module.inject(recipe);
        function
            .metadata()
            .set_owner(TypeSpec::of::<Owner>())
            .unwrap();

        assert_eq!(function.call(Arguments::new()).unwrap(), "owned:7");
    }

    #[test]
    fn owner_rules_are_enforced() {
        let module = Module::new();
        let function = module.inject(Recipe::function(|| Ok(0u8)));

        function
            .metadata()
            .set_owner(TypeSpec::of::<String>())
            .unwrap();
        assert!(matches!(
            function
                .metadata()
                .set_owner(TypeSpec::of::<String>())
                .unwrap_err(),
            Error::OwnerAlreadyDefined
        ));

        // resolving dependencies closes the owner window
        function.call(Arguments::new()).unwrap();
        let late = module.inject(Recipe::function(|| Ok(0u8)));
        late.call(Arguments::new()).unwrap();
        assert!(matches!(
            late.metadata()
                .set_owner(TypeSpec::of::<String>())
                .unwrap_err(),
            Error::OwnerAfterResolution
        ));
    }
}
