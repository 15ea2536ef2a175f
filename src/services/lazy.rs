use crate::{
    resolver, InjectError, InjectResult, Injected, InjectionArgument, MaybeAsync, Next, Request,
    Resolution, Session, Svc, Token,
};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::{
    fmt::{Debug, Formatter},
    marker::PhantomData,
};

enum LazyState {
    Waiting(Next),
    Forcing,
    Running(Shared<BoxFuture<'static, InjectResult<Injected>>>),
    Resolved(Injected),
    Failed,
}

/// The untyped state behind a [`Lazy`]. It holds the rest of the pipeline
/// the `lazy` hook cut off and runs it on first use. After a failure the
/// next use resolves the injection again.
pub struct LazyValue {
    token: Token,
    session: Session,
    retry: InjectionArgument,
    state: Mutex<LazyState>,
}

impl LazyValue {
    pub(crate) fn new(session: Session, next: Next, retry: InjectionArgument) -> Self {
        LazyValue {
            token: session.token(),
            session,
            retry,
            state: Mutex::new(LazyState::Waiting(next)),
        }
    }

    /// Resolves the value, or joins the resolution already in progress.
    pub fn force(&self) -> Resolution {
        let mut state = self.state.lock();
        match &*state {
            LazyState::Resolved(injected) => return MaybeAsync::ready(Ok(injected.clone())),
            LazyState::Running(shared) => match shared.peek() {
                Some(Ok(injected)) => {
                    let injected = injected.clone();
                    *state = LazyState::Resolved(injected.clone());
                    return MaybeAsync::ready(Ok(injected));
                }
                Some(Err(_)) => {}
                None => return MaybeAsync::Deferred(shared.clone().boxed()),
            },
            // Forcing the value again from inside its own resolution is a cycle.
            LazyState::Forcing => {
                return MaybeAsync::ready(Err(InjectError::CircularReference {
                    token: self.token.clone(),
                    cycle: vec![self.token.clone(), self.token.clone()],
                }))
            }
            LazyState::Waiting(_) | LazyState::Failed => {}
        }

        let previous = std::mem::replace(&mut *state, LazyState::Forcing);
        drop(state);
        let resolution = match previous {
            LazyState::Waiting(next) => next.run(self.session.clone()),
            _ => resolver::inject(&self.session.injector(), &self.retry, self.session.parent()),
        };

        match resolution {
            MaybeAsync::Ready(result) => {
                *self.state.lock() = match &result {
                    Ok(injected) => LazyState::Resolved(injected.clone()),
                    Err(_) => LazyState::Failed,
                };
                MaybeAsync::ready(result)
            }
            MaybeAsync::Deferred(future) => {
                let shared = future.shared();
                *self.state.lock() = LazyState::Running(shared.clone());
                MaybeAsync::Deferred(shared.boxed())
            }
        }
    }
}

impl Debug for LazyValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyValue").field("token", &self.token).finish()
    }
}

/// A request resolved on first use rather than when its owner is
/// constructed.
///
/// ```
/// use graph_injector::{class, value, Injector, Lazy, Svc};
///
/// struct Expensive;
/// struct Owner {
///     expensive: Lazy<Svc<Expensive>>,
/// }
///
/// let mut builder = Injector::builder();
/// builder.provide(class(|expensive: Lazy<Svc<Expensive>>| Owner { expensive }));
/// builder.provide(value(Expensive));
///
/// let injector = builder.build().unwrap();
/// let owner: Svc<Owner> = injector.get().unwrap();
/// let first = owner.expensive.get().unwrap();
/// let second = owner.expensive.get().unwrap();
/// assert!(Svc::ptr_eq(&first, &second));
/// ```
pub struct Lazy<R: Request> {
    token: Token,
    value: Svc<LazyValue>,
    marker: PhantomData<fn() -> R>,
}

impl<R: Request> Lazy<R> {
    pub(crate) fn new(token: Token, value: Svc<LazyValue>) -> Self {
        Lazy {
            token,
            value,
            marker: PhantomData,
        }
    }

    /// Resolves the request synchronously.
    pub fn get(&self) -> InjectResult<R> {
        match self.value.force() {
            MaybeAsync::Ready(result) => R::from_injected(&self.token, result?),
            MaybeAsync::Deferred(_) => Err(InjectError::AsyncResolution {
                token: self.token.clone(),
            }),
        }
    }

    /// Resolves the request, waiting for asynchronous providers.
    pub async fn get_async(&self) -> InjectResult<R> {
        let injected = self.value.force().into_future().await?;
        R::from_injected(&self.token, injected)
    }
}

impl<R: Request> Clone for Lazy<R> {
    fn clone(&self) -> Self {
        Lazy {
            token: self.token.clone(),
            value: self.value.clone(),
            marker: PhantomData,
        }
    }
}

impl<R: Request> Debug for Lazy<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lazy").field("token", &self.token).finish()
    }
}
