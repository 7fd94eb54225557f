use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::{Result, StoreError};

/// Deferred result of a store lookup.
///
/// Lookups against a backend that answers from memory complete at call
/// time and come back as `Ready`. Lookups against a backend that does
/// blocking I/O may be handed to the tokio blocking pool instead, in which
/// case the future resolves when that task finishes. Callers await both the
/// same way.
#[derive(Debug)]
pub enum StoreFuture<T> {
    Ready(std::future::Ready<Result<T>>),
    Deferred(JoinHandle<Result<T>>),
}

impl<T: Send + 'static> StoreFuture<T> {
    /// An already-completed lookup.
    pub fn ready(result: Result<T>) -> Self {
        Self::Ready(std::future::ready(result))
    }

    /// Run `f` on the blocking pool of `handle`.
    pub fn deferred<F>(handle: &Handle, f: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        Self::Deferred(handle.spawn_blocking(f))
    }

    /// Returns `true` if the result was computed at call time.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

impl<T> Future for StoreFuture<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Both variants are Unpin.
        match self.get_mut() {
            Self::Ready(ready) => Pin::new(ready).poll(cx),
            Self::Deferred(handle) => match Pin::new(handle).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(join_err)) => {
                    Poll::Ready(Err(StoreError::TaskFailed(join_err.to_string())))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}
