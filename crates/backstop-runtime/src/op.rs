//! Operation contract for protected calls.
//!
//! An [`Operation`] is one logical unit of work against an external
//! dependency. The retry executor invokes it repeatedly, so it takes
//! `&mut self` and must be safe to re-run after a failure.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;

use backstop_core::CallError;

/// A retriable unit of work against an external dependency.
///
/// Implementations must tolerate repeated invocation: the executor calls
/// [`run`](Operation::run) again after each retryable failure.
#[async_trait]
pub trait Operation: Send {
    type Output: Send;

    async fn run(&mut self) -> Result<Self::Output, CallError>;
}

/// Adapter turning an async closure into an [`Operation`].
///
/// The factory is invoked once per attempt and must produce a fresh future
/// each time.
pub struct FnOperation<T> {
    factory: Box<dyn FnMut() -> BoxFuture<'static, Result<T, CallError>> + Send>,
}

impl<T> FnOperation<T> {
    pub fn new<F>(factory: F) -> Self
    where
        F: FnMut() -> BoxFuture<'static, Result<T, CallError>> + Send + 'static,
    {
        Self {
            factory: Box::new(factory),
        }
    }
}

#[async_trait]
impl<T: Send> Operation for FnOperation<T> {
    type Output = T;

    async fn run(&mut self) -> Result<T, CallError> {
        (self.factory)().await
    }
}

/// Wraps an operation with a per-attempt deadline.
///
/// Attempts that outlive the deadline fail with a timeout-classified
/// [`CallError`], which the retry policy treats like any other failure.
pub struct TimedOperation<O> {
    inner: O,
    deadline: Duration,
}

impl<O> TimedOperation<O> {
    pub fn new(inner: O, deadline: Duration) -> Self {
        Self { inner, deadline }
    }
}

#[async_trait]
impl<O: Operation> Operation for TimedOperation<O> {
    type Output = O::Output;

    async fn run(&mut self) -> Result<O::Output, CallError> {
        match tokio::time::timeout(self.deadline, self.inner.run()).await {
            Ok(result) => result,
            Err(_) => Err(CallError::timeout(self.deadline)),
        }
    }
}
