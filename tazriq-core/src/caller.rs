//! Dual sync/async invocation capability.
//!
//! Every factory, recipe and injected function exposes both calling
//! conventions through [`Caller`]: `call` for synchronous callers and
//! `acall` for asynchronous ones. A synchronous factory is always
//! callable from async code (it runs inline); the reverse is a
//! well-defined [`Error::SyncAsyncMismatch`] failure.

use std::any::{Any, type_name};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::{Error, Result};

/// A type-erased, shareable instance.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Downcasts a type-erased instance to `Arc<T>`.
pub fn downcast_instance<T: Send + Sync + 'static>(instance: Instance) -> Result<Arc<T>> {
    instance.downcast::<T>().map_err(|_| Error::TypeMismatch {
        expected: type_name::<T>(),
    })
}

/// Dual sync/async invocation of a no-argument factory.
#[async_trait]
pub trait Caller<T>: Send + Sync {
    /// Invokes the factory synchronously.
    ///
    /// Fails with [`Error::SyncAsyncMismatch`] when the underlying
    /// factory is asynchronous-only.
    fn call(&self) -> Result<T>;

    /// Invokes the factory asynchronously. Always available: a
    /// synchronous factory runs inline.
    async fn acall(&self) -> Result<T>;
}

/// Wraps a synchronous closure as a [`Caller`].
pub struct SyncCaller<T> {
    function: Box<dyn Fn() -> Result<T> + Send + Sync>,
}

impl<T> SyncCaller<T> {
    pub fn new(function: impl Fn() -> Result<T> + Send + Sync + 'static) -> Self {
        Self {
            function: Box::new(function),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Caller<T> for SyncCaller<T> {
    fn call(&self) -> Result<T> {
        (self.function)()
    }

    async fn acall(&self) -> Result<T> {
        self.call()
    }
}

/// Wraps an asynchronous closure as a [`Caller`].
///
/// The synchronous surface is a well-defined failure.
pub struct AsyncCaller<T> {
    function: Box<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>,
}

impl<T> AsyncCaller<T> {
    pub fn new<F, Fut>(function: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            function: Box::new(move || Box::pin(function())),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Caller<T> for AsyncCaller<T> {
    fn call(&self) -> Result<T> {
        Err(Error::SyncAsyncMismatch {
            context: "the factory is asynchronous",
        })
    }

    async fn acall(&self) -> Result<T> {
        (self.function)().await
    }
}
