use crate::{Constraint, InjectResult, Injected, MaybeAsync, Session};
use std::{
    fmt::{Debug, Formatter},
    sync::Arc,
};
use tracing::trace;

/// The result of running a hook or any later stage of resolution.
pub type Resolution = MaybeAsync<InjectResult<Injected>>;

/// Middleware wrapped around a resolution.
///
/// A hook receives the session describing the current injection and the
/// continuation for every later stage. It may change the session before
/// calling [`Next::run`], return a result without calling it, or map the
/// result it gets back.
///
/// Hooks are attached at four levels, outermost first: to an injector, at an
/// injection site, to a provider record and to a single definition. Any
/// closure taking a [`Session`] and a [`Next`] is a hook.
///
/// ```
/// use graph_injector::{value, Hook, InjectionArgument, Injector, Next, Session, Svc};
///
/// let mut builder = Injector::builder();
/// builder.provide(value(2_i32).hook(|session: Session, next: Next| {
///     next.run(session).map_ok(|injected| {
///         let doubled = *injected.downcast::<i32>().unwrap() * 2;
///         graph_injector::Injected::value(doubled)
///     })
/// }));
///
/// let injector = builder.build().unwrap();
/// let value: Svc<i32> = injector.get().unwrap();
/// assert_eq!(4, *value);
/// ```
pub trait Hook: Send + Sync + 'static {
    /// Handles a single injection.
    fn handle(&self, session: Session, next: Next) -> Resolution;

    /// A short name used in logs.
    fn name(&self) -> &'static str {
        "Hook"
    }
}

impl<F> Hook for F
where
    F: Fn(Session, Next) -> Resolution + Send + Sync + 'static,
{
    fn handle(&self, session: Session, next: Next) -> Resolution {
        self(session, next)
    }
}

/// The remainder of a resolution pipeline.
pub struct Next {
    handler: Box<dyn FnOnce(Session) -> Resolution + Send>,
}

impl Next {
    pub(crate) fn new<F>(handler: F) -> Self
    where
        F: FnOnce(Session) -> Resolution + Send + 'static,
    {
        Next {
            handler: Box::new(handler),
        }
    }

    /// Runs the rest of the pipeline.
    pub fn run(self, session: Session) -> Resolution {
        (self.handler)(session)
    }
}

impl Debug for Next {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Next")
    }
}

/// A hook together with the ordering and constraint it was registered with.
#[derive(Clone)]
pub struct HookRecord {
    hook: Arc<dyn Hook>,
    when: Option<Constraint>,
    order: i32,
}

impl HookRecord {
    /// Wraps a hook that always applies.
    pub fn new(hook: impl Hook) -> Self {
        HookRecord {
            hook: Arc::new(hook),
            when: None,
            order: 0,
        }
    }

    /// Only runs the hook when the constraint accepts the session.
    #[must_use]
    pub fn when(mut self, constraint: Constraint) -> Self {
        self.when = Some(constraint);
        self
    }

    /// Sets the position of this hook relative to other hooks at the same
    /// level. Lower orders run first; equal orders keep registration order.
    #[must_use]
    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// The wrapped hook.
    #[must_use]
    pub fn hook(&self) -> &Arc<dyn Hook> {
        &self.hook
    }

    pub(crate) fn applies_to(&self, session: &Session) -> bool {
        self.when
            .as_ref()
            .map_or(true, |constraint| constraint.matches(session))
    }
}

impl Debug for HookRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRecord")
            .field("hook", &self.hook.name())
            .field("constrained", &self.when.is_some())
            .field("order", &self.order)
            .finish()
    }
}

/// Stable-sorts hooks by their order.
pub(crate) fn sort_hooks(hooks: &mut [HookRecord]) {
    hooks.sort_by_key(|record| record.order);
}

/// Picks the hooks whose constraints accept the session, sorted by order.
pub(crate) fn select_hooks(hooks: &[HookRecord], session: &Session) -> Vec<Arc<dyn Hook>> {
    let mut selected: Vec<&HookRecord> = hooks
        .iter()
        .filter(|record| record.applies_to(session))
        .collect();
    selected.sort_by_key(|record| record.order);
    selected.into_iter().map(|record| record.hook.clone()).collect()
}

/// Threads `session` through `hooks` and finally into `terminal`.
pub(crate) fn run_pipeline<F>(hooks: Vec<Arc<dyn Hook>>, session: Session, terminal: F) -> Resolution
where
    F: FnOnce(Session) -> Resolution + Send + 'static,
{
    if hooks.is_empty() {
        return terminal(session);
    }

    let mut chain: Box<dyn FnOnce(Session) -> Resolution + Send> = Box::new(terminal);
    for hook in hooks.into_iter().rev() {
        let next = chain;
        chain = Box::new(move |session: Session| {
            trace!(hook = hook.name(), token = %session.token(), "running hook");
            hook.handle(session, Next { handler: next })
        });
    }
    chain(session)
}
