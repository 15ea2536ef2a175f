use crate::InjectResult;
use futures::future::{BoxFuture, FutureExt};
use std::{
    fmt::{Debug, Formatter},
    future::Future,
};

/// A value that is either available now or will be produced by a future.
///
/// Resolution stays synchronous until some provider, hook or lifecycle
/// callback actually suspends. Only then does the remainder of the work get
/// boxed into a future, so a purely synchronous graph never allocates one.
pub enum MaybeAsync<T> {
    /// The value is available.
    Ready(T),
    /// The value will be produced by the future.
    Deferred(BoxFuture<'static, T>),
}

impl<T: Send + 'static> MaybeAsync<T> {
    /// Wraps a value that is already available.
    #[inline]
    pub fn ready(value: T) -> Self {
        MaybeAsync::Ready(value)
    }

    /// Wraps a future.
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        MaybeAsync::Deferred(future.boxed())
    }

    /// Checks whether the value is available without waiting.
    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self, MaybeAsync::Ready(_))
    }

    /// Takes the value if it is available, otherwise gives `self` back.
    pub fn into_ready(self) -> Result<T, Self> {
        match self {
            MaybeAsync::Ready(value) => Ok(value),
            deferred @ MaybeAsync::Deferred(_) => Err(deferred),
        }
    }

    /// Converts this into a future, whether or not it was ready.
    pub fn into_future(self) -> BoxFuture<'static, T> {
        match self {
            MaybeAsync::Ready(value) => futures::future::ready(value).boxed(),
            MaybeAsync::Deferred(future) => future,
        }
    }

    /// Maps the value once it is available.
    pub fn map<U, F>(self, f: F) -> MaybeAsync<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        match self {
            MaybeAsync::Ready(value) => MaybeAsync::Ready(f(value)),
            MaybeAsync::Deferred(future) => {
                MaybeAsync::Deferred(future.map(f).boxed())
            }
        }
    }

    /// Chains another possibly-asynchronous step after this one. If both are
    /// ready, the result is ready.
    pub fn then<U, F>(self, f: F) -> MaybeAsync<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> MaybeAsync<U> + Send + 'static,
    {
        match self {
            MaybeAsync::Ready(value) => f(value),
            MaybeAsync::Deferred(future) => MaybeAsync::Deferred(
                async move { f(future.await).into_future().await }.boxed(),
            ),
        }
    }
}

impl<T, E> MaybeAsync<Result<T, E>>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Chains another step after a successful result. Errors are passed
    /// through untouched.
    pub fn and_then<U, F>(self, f: F) -> MaybeAsync<Result<U, E>>
    where
        U: Send + 'static,
        F: FnOnce(T) -> MaybeAsync<Result<U, E>> + Send + 'static,
    {
        self.then(|result| match result {
            Ok(value) => f(value),
            Err(error) => MaybeAsync::Ready(Err(error)),
        })
    }

    /// Maps a successful result.
    pub fn map_ok<U, F>(self, f: F) -> MaybeAsync<Result<U, E>>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.map(|result| result.map(f))
    }
}

impl<T> Debug for MaybeAsync<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MaybeAsync::Ready(_) => f.write_str("MaybeAsync::Ready(..)"),
            MaybeAsync::Deferred(_) => f.write_str("MaybeAsync::Deferred(..)"),
        }
    }
}

/// Waits for every value in order. Items after the first deferred one are
/// only awaited once the ones before them finished, which keeps dependency
/// construction sequential.
pub fn join_all<T: Send + 'static>(items: Vec<MaybeAsync<T>>) -> MaybeAsync<Vec<T>> {
    let mut values = Vec::with_capacity(items.len());
    let mut rest = items.into_iter();
    while let Some(item) = rest.next() {
        match item {
            MaybeAsync::Ready(value) => values.push(value),
            MaybeAsync::Deferred(future) => {
                return MaybeAsync::deferred(async move {
                    values.push(future.await);
                    for item in rest {
                        values.push(item.into_future().await);
                    }
                    values
                });
            }
        }
    }

    MaybeAsync::Ready(values)
}

/// A deferred unit of work that is only started once the previous one has
/// finished.
pub type Step = Box<dyn FnOnce() -> MaybeAsync<InjectResult<()>> + Send>;

/// Runs each step after the previous one completed, stopping at the first
/// error.
pub fn sequence(steps: Vec<Step>) -> MaybeAsync<InjectResult<()>> {
    let mut steps = steps.into_iter();
    while let Some(step) = steps.next() {
        match step() {
            MaybeAsync::Ready(Ok(())) => {}
            MaybeAsync::Ready(Err(error)) => return MaybeAsync::Ready(Err(error)),
            MaybeAsync::Deferred(future) => {
                return MaybeAsync::deferred(async move {
                    future.await?;
                    for step in steps {
                        step().into_future().await?;
                    }
                    Ok(())
                });
            }
        }
    }

    MaybeAsync::Ready(Ok(()))
}
