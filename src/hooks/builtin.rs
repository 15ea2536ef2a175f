use crate::{
    hooks::{Hook, HookRecord, Next, Resolution},
    resolver, Context, DynSvc, InjectError, InjectResult, Injected, InjectionArgument,
    LazyValue, LifecycleFn, MaybeAsync, Service, Session, Svc, Token,
};
use std::{borrow::Cow, sync::Arc};

/// Resolves to [`Injected::Absent`] when the requested token has no
/// provider. Errors from further down the graph are kept.
#[must_use]
pub fn optional() -> Optional {
    Optional
}

/// See [`optional`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Optional;

impl Hook for Optional {
    fn handle(&self, session: Session, next: Next) -> Resolution {
        let token = session.token();
        next.run(session).map(move |result| match result {
            Err(InjectError::NoProvider { token: missing }) if missing == token => {
                Ok(Injected::Absent)
            }
            other => other,
        })
    }

    fn name(&self) -> &'static str {
        "Optional"
    }
}

/// Only looks the token up in the injector the request was made on.
#[must_use]
pub fn self_only() -> SelfOnly {
    SelfOnly
}

/// See [`self_only`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SelfOnly;

impl Hook for SelfOnly {
    fn handle(&self, session: Session, next: Next) -> Resolution {
        session.set_flags(|flags| flags.self_only = true);
        next.run(session)
    }

    fn name(&self) -> &'static str {
        "SelfOnly"
    }
}

/// Starts looking the token up in the parent of the injector the request
/// was made on.
#[must_use]
pub fn skip_self() -> SkipSelf {
    SkipSelf
}

/// See [`skip_self`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SkipSelf;

impl Hook for SkipSelf {
    fn handle(&self, session: Session, next: Next) -> Resolution {
        session.set_flags(|flags| flags.skip_self = true);
        next.run(session)
    }

    fn name(&self) -> &'static str {
        "SkipSelf"
    }
}

/// Skips the injection entirely and resolves to [`Injected::Absent`].
#[must_use]
pub fn skip() -> Skip {
    Skip
}

/// See [`skip`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Skip;

impl Hook for Skip {
    fn handle(&self, _session: Session, _next: Next) -> Resolution {
        MaybeAsync::ready(Ok(Injected::Absent))
    }

    fn name(&self) -> &'static str {
        "Skip"
    }
}

/// Annotates the session with a name, selecting definitions registered
/// with [`ProviderDescriptor::named`](crate::ProviderDescriptor::named).
#[must_use]
pub fn named(name: impl Into<Cow<'static, str>>) -> Named {
    Named(name.into())
}

/// See [`named`].
#[derive(Clone, Debug)]
pub struct Named(Cow<'static, str>);

impl Hook for Named {
    fn handle(&self, session: Session, next: Next) -> Resolution {
        let name = self.0.clone();
        session.annotate(|annotations| annotations.name = Some(name));
        next.run(session)
    }

    fn name(&self) -> &'static str {
        "Named"
    }
}

/// Annotates the session with a tag, selecting definitions registered with
/// [`ProviderDescriptor::tagged`](crate::ProviderDescriptor::tagged).
#[must_use]
pub fn tagged(tag: impl Into<Cow<'static, str>>) -> Tagged {
    Tagged(tag.into())
}

/// See [`tagged`].
#[derive(Clone, Debug)]
pub struct Tagged(Cow<'static, str>);

impl Hook for Tagged {
    fn handle(&self, session: Session, next: Next) -> Resolution {
        let tag = self.0.clone();
        session.annotate(|annotations| {
            if !annotations.tags.contains(&tag) {
                annotations.tags.push(tag);
            }
        });
        next.run(session)
    }

    fn name(&self) -> &'static str {
        "Tagged"
    }
}

/// Resolves every definition of the token that accepts the session and
/// returns them as [`Injected::Many`]. A token without any provider
/// resolves to an empty list.
#[must_use]
pub fn all() -> All {
    All
}

/// See [`all`].
#[derive(Clone, Copy, Debug, Default)]
pub struct All;

impl Hook for All {
    fn handle(&self, session: Session, _next: Next) -> Resolution {
        resolver::resolve_all(session)
    }

    fn name(&self) -> &'static str {
        "All"
    }
}

/// Stops the pipeline and hands out a [`LazyValue`] that runs the rest of it
/// on first use. A failed resolution is retried as a fresh injection of the
/// same token on the next use.
#[must_use]
pub fn lazy() -> LazyHook {
    LazyHook::default()
}

/// See [`lazy`].
#[derive(Clone, Debug, Default)]
pub struct LazyHook {
    retry_hooks: Vec<HookRecord>,
}

impl LazyHook {
    /// A lazy hook whose retries run `hooks` at the injection site again.
    pub(crate) fn retrying(hooks: Vec<HookRecord>) -> Self {
        LazyHook { retry_hooks: hooks }
    }
}

impl Hook for LazyHook {
    fn handle(&self, session: Session, next: Next) -> Resolution {
        let retry = self.retry_hooks.iter().cloned().fold(
            InjectionArgument::new(session.token()).with_metadata(session.metadata()),
            InjectionArgument::with_hook_record,
        );
        let value: DynSvc = Svc::new(LazyValue::new(session, next, retry));
        MaybeAsync::ready(Ok(Injected::Value(value)))
    }

    fn name(&self) -> &'static str {
        "Lazy"
    }
}

/// Resolves under a fixed context, for scopes that allow overriding it.
/// Every injection through the same context shares an instance.
#[must_use]
pub fn with_context(context: Context) -> WithContext {
    WithContext(context)
}

/// See [`with_context`].
#[derive(Clone, Copy, Debug)]
pub struct WithContext(Context);

impl Hook for WithContext {
    fn handle(&self, session: Session, next: Next) -> Resolution {
        session.set_context(self.0);
        next.run(session)
    }

    fn name(&self) -> &'static str {
        "WithContext"
    }
}

/// Recovers from errors of the rest of the pipeline.
pub fn catch<F>(handler: F) -> Catch<F>
where
    F: Fn(InjectError) -> InjectResult<Injected> + Send + Sync + 'static,
{
    Catch(Arc::new(handler))
}

/// See [`catch`].
pub struct Catch<F>(Arc<F>);

impl<F> Hook for Catch<F>
where
    F: Fn(InjectError) -> InjectResult<Injected> + Send + Sync + 'static,
{
    fn handle(&self, session: Session, next: Next) -> Resolution {
        let handler = self.0.clone();
        next.run(session).map(move |result| result.or_else(|error| handler(error)))
    }

    fn name(&self) -> &'static str {
        "Catch"
    }
}

/// Resolves another token when the requested one has no provider.
#[must_use]
pub fn fallback(token: Token) -> Fallback {
    Fallback(token)
}

/// See [`fallback`].
#[derive(Clone, Debug)]
pub struct Fallback(Token);

impl Hook for Fallback {
    fn handle(&self, session: Session, next: Next) -> Resolution {
        let token = session.token();
        let fallback = self.0.clone();
        let injector = session.injector();
        let parent = session.parent().cloned();
        next.run(session).then(move |result| match result {
            Err(InjectError::NoProvider { token: missing }) if missing == token => {
                resolver::inject(&injector, &InjectionArgument::new(fallback), parent.as_ref())
            }
            other => MaybeAsync::ready(other),
        })
    }

    fn name(&self) -> &'static str {
        "Fallback"
    }
}

/// Maps a successful result.
pub fn transform<F>(f: F) -> Transform<F>
where
    F: Fn(Injected) -> InjectResult<Injected> + Send + Sync + 'static,
{
    Transform(Arc::new(f))
}

/// See [`transform`].
pub struct Transform<F>(Arc<F>);

impl<F> Hook for Transform<F>
where
    F: Fn(Injected) -> InjectResult<Injected> + Send + Sync + 'static,
{
    fn handle(&self, session: Session, next: Next) -> Resolution {
        let f = self.0.clone();
        next.run(session).map(move |result| result.and_then(|injected| f(injected)))
    }

    fn name(&self) -> &'static str {
        "Transform"
    }
}

/// Rebinds the session to another token. The rest of the pipeline looks the
/// new token up as if it had been requested, so both share an instance.
#[must_use]
pub fn use_token(token: Token) -> UseToken {
    UseToken(token)
}

/// See [`use_token`].
#[derive(Clone, Debug)]
pub struct UseToken(Token);

impl Hook for UseToken {
    fn handle(&self, session: Session, next: Next) -> Resolution {
        session.set_token(self.0.clone());
        next.run(session)
    }

    fn name(&self) -> &'static str {
        "UseToken"
    }
}

fn typed_hook<T, F>(f: F) -> LifecycleFn
where
    T: Service,
    F: Fn(Svc<T>) -> MaybeAsync<InjectResult<()>> + Send + Sync + 'static,
{
    Arc::new(move |value: DynSvc| match value.downcast::<T>() {
        Ok(value) => f(value),
        Err(_) => MaybeAsync::ready(Err(InjectError::InvalidProvider {
            token: Token::of::<T>(),
        })),
    })
}

/// Runs a callback when the instance resolved through this hook is
/// initialized. Runs after the provider's own `on_init` callbacks, innermost
/// hook first, and only if this hook took part in the construction.
pub fn on_init_hook<T, F>(f: F) -> OnInitHook
where
    T: Service,
    F: Fn(Svc<T>) -> MaybeAsync<InjectResult<()>> + Send + Sync + 'static,
{
    OnInitHook(typed_hook(f))
}

/// See [`on_init_hook`].
#[derive(Clone)]
pub struct OnInitHook(LifecycleFn);

impl Hook for OnInitHook {
    fn handle(&self, session: Session, next: Next) -> Resolution {
        session.push_init_hook(self.0.clone());
        next.run(session)
    }

    fn name(&self) -> &'static str {
        "OnInit"
    }
}

/// Runs a callback when the instance resolved through this hook is
/// destroyed.
pub fn on_destroy_hook<T, F>(f: F) -> OnDestroyHook
where
    T: Service,
    F: Fn(Svc<T>) -> MaybeAsync<InjectResult<()>> + Send + Sync + 'static,
{
    OnDestroyHook(typed_hook(f))
}

/// See [`on_destroy_hook`].
#[derive(Clone)]
pub struct OnDestroyHook(LifecycleFn);

impl Hook for OnDestroyHook {
    fn handle(&self, session: Session, next: Next) -> Resolution {
        session.push_destroy_hook(self.0.clone());
        next.run(session)
    }

    fn name(&self) -> &'static str {
        "OnDestroy"
    }
}

/// Resolves to the injector the requesting provider lives in.
#[must_use]
pub fn current_injector() -> CurrentInjector {
    CurrentInjector
}

/// See [`current_injector`].
#[derive(Clone, Copy, Debug, Default)]
pub struct CurrentInjector;

impl Hook for CurrentInjector {
    fn handle(&self, session: Session, _next: Next) -> Resolution {
        let injector = session
            .parent()
            .map_or_else(|| session.injector(), Session::injector);
        MaybeAsync::ready(Ok(Injected::value(injector)))
    }

    fn name(&self) -> &'static str {
        "CurrentInjector"
    }
}

/// Resolves to the session of the provider under construction.
#[must_use]
pub fn current_session() -> CurrentSession {
    CurrentSession
}

/// See [`current_session`].
#[derive(Clone, Copy, Debug, Default)]
pub struct CurrentSession;

impl Hook for CurrentSession {
    fn handle(&self, session: Session, _next: Next) -> Resolution {
        let current = session.parent().cloned().unwrap_or(session);
        MaybeAsync::ready(Ok(Injected::value(current)))
    }

    fn name(&self) -> &'static str {
        "CurrentSession"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{class, factory, value, Injector, ProviderDescriptor};

    fn injector(providers: Vec<ProviderDescriptor>) -> Injector {
        let mut builder = Injector::builder();
        for provider in providers {
            builder.provide(provider);
        }
        builder.build().unwrap()
    }

    #[test]
    fn optional_only_swallows_the_requested_token() {
        struct Needy;
        let injector = injector(vec![class(|_: Svc<String>| Needy)]);

        let missing = injector
            .resolve(InjectionArgument::new(Token::of::<u8>()).optional())
            .into_ready()
            .unwrap()
            .unwrap();
        assert!(missing.is_absent());

        let broken = injector
            .resolve(InjectionArgument::new(Token::of::<Needy>()).optional())
            .into_ready()
            .unwrap();
        assert!(matches!(broken, Err(InjectError::MissingDependency { .. })));
    }

    #[test]
    fn skip_never_reaches_the_provider() {
        let injector = injector(vec![value(1_u8)]);
        let result = injector
            .resolve(InjectionArgument::new(Token::of::<u8>()).with_hook(skip()))
            .into_ready()
            .unwrap()
            .unwrap();
        assert!(result.is_absent());
    }

    #[test]
    fn catch_recovers_with_a_replacement() {
        let injector = injector(vec![]);
        let value: Svc<u8> = injector
            .get_with(
                InjectionArgument::new(Token::of::<u8>())
                    .with_hook(catch(|_| Ok(Injected::value(9_u8)))),
            )
            .unwrap();
        assert_eq!(9, *value);
    }

    #[test]
    fn fallback_resolves_the_other_token() {
        let injector = injector(vec![value(String::from("default")).provide(Token::named("default"))]);
        let value: Svc<String> = injector
            .get_with(
                InjectionArgument::new(Token::named("custom"))
                    .with_hook(fallback(Token::named("default"))),
            )
            .unwrap();
        assert_eq!("default", value.as_str());
    }

    #[test]
    fn transform_maps_the_result() {
        let injector = injector(vec![value(2_u32)]);
        let value: Svc<u32> = injector
            .get_with(InjectionArgument::new(Token::of::<u32>()).with_hook(transform(
                |injected| {
                    let value = injected.downcast::<u32>().ok_or_else(|| {
                        InjectError::Internal("not a u32".to_string())
                    })?;
                    Ok(Injected::value(*value + 1))
                },
            )))
            .unwrap();
        assert_eq!(3, *value);
    }

    #[test]
    fn use_token_shares_the_target_instance() {
        let injector = injector(vec![
            factory(|| String::from("shared")).singleton(),
        ]);
        let direct: Svc<String> = injector.get().unwrap();
        let rebound: Svc<String> = injector
            .get_with(
                InjectionArgument::new(Token::named("other"))
                    .with_hook(use_token(Token::of::<String>())),
            )
            .unwrap();
        assert!(Svc::ptr_eq(&direct, &rebound));
    }

    #[test]
    fn current_injector_is_the_host() {
        struct NeedsInjector(Injector);
        let injector = injector(vec![class(NeedsInjector)]);
        let service: Svc<NeedsInjector> = injector.get().unwrap();
        assert!(service.0.ptr_eq(&injector));
    }
}
