use crate::{
    hooks, Constraint, DynSvc, Hook, HookRecord, InjectError, InjectResult, Injected,
    InjectionArgument, InjectionKind, InstanceScope, Lifecycle, MaybeAsync, Scope,
    Service, ServiceFactory, SingletonScope, Svc, Token, TransientScope, DefaultScope,
};
use std::{
    borrow::Cow,
    error::Error,
    fmt::{Debug, Formatter},
    future::Future,
    sync::Arc,
};

/// A type-erased constructor. It receives the arguments it was registered
/// with and their resolved values.
pub type Constructor = Arc<
    dyn Fn(&[InjectionArgument], Vec<Injected>) -> MaybeAsync<InjectResult<DynSvc>>
        + Send
        + Sync,
>;

/// A type-erased init or destroy callback.
pub type LifecycleFn = Arc<dyn Fn(DynSvc) -> MaybeAsync<InjectResult<()>> + Send + Sync>;

/// How a provider produces its value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Constructs a value from its dependencies. Only class providers can be
    /// part of a dependency cycle.
    Class,
    /// Computes a value from its dependencies.
    Factory,
    /// Hands out a fixed value.
    Value,
    /// Resolves another token.
    Alias,
    /// Adds a hook to the provider record instead of a definition.
    Hook,
}

/// Annotations attached to a provider.
#[derive(Clone, Debug, Default)]
pub struct ProviderAnnotations {
    /// The name constraint, if any.
    pub name: Option<Cow<'static, str>>,
    /// The tag constraints.
    pub tags: Vec<Cow<'static, str>>,
    /// The position among other multi definitions or provider hooks.
    pub order: i32,
    /// Accumulates with other definitions of the token instead of replacing
    /// them.
    pub multi: bool,
    /// Resolved when the injector is initialized.
    pub eager: bool,
}

/// A recipe for producing the value of a token.
///
/// Descriptors are created with [`class`], [`factory`], [`value`] and the
/// other builder functions and then refined with the methods below.
///
/// ```
/// use graph_injector::{class, value, Injector, Svc};
///
/// struct Config(&'static str);
/// struct Client(Svc<Config>);
///
/// let mut builder = Injector::builder();
/// builder.provide(value(Config("localhost")));
/// builder.provide(class(Client).transient());
///
/// let injector = builder.build().unwrap();
/// let first: Svc<Client> = injector.get().unwrap();
/// let second: Svc<Client> = injector.get().unwrap();
/// assert!(!Svc::ptr_eq(&first, &second));
/// assert!(Svc::ptr_eq(&first.0, &second.0));
/// ```
#[derive(Clone)]
pub struct ProviderDescriptor {
    pub(crate) token: Token,
    pub(crate) kind: ProviderKind,
    pub(crate) arguments: Vec<InjectionArgument>,
    pub(crate) constructor: Option<Constructor>,
    pub(crate) scope: Option<Arc<dyn Scope>>,
    pub(crate) when: Option<Constraint>,
    pub(crate) hooks: Vec<HookRecord>,
    pub(crate) annotations: ProviderAnnotations,
    pub(crate) on_init: Vec<LifecycleFn>,
    pub(crate) on_destroy: Vec<LifecycleFn>,
    pub(crate) invalid: Option<String>,
}

impl ProviderDescriptor {
    fn new(token: Token, kind: ProviderKind) -> Self {
        ProviderDescriptor {
            token,
            kind,
            arguments: Vec::new(),
            constructor: None,
            scope: None,
            when: None,
            hooks: Vec::new(),
            annotations: ProviderAnnotations::default(),
            on_init: Vec::new(),
            on_destroy: Vec::new(),
            invalid: None,
        }
    }

    fn with_arguments(mut self, arguments: Vec<InjectionArgument>, kind: InjectionKind) -> Self {
        self.arguments = arguments
            .into_iter()
            .enumerate()
            .map(|(index, argument)| argument.at_position(kind, &self.token, index))
            .collect();
        self
    }

    /// The token this descriptor provides.
    #[must_use]
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// How the value is produced.
    #[must_use]
    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// The annotations attached so far.
    #[must_use]
    pub fn annotations(&self) -> &ProviderAnnotations {
        &self.annotations
    }

    /// The arguments the constructor receives.
    #[must_use]
    pub fn arguments(&self) -> &[InjectionArgument] {
        &self.arguments
    }

    /// Provides the value under another token, for example a named token or
    /// the type token of a trait object.
    #[must_use]
    pub fn provide(mut self, token: Token) -> Self {
        for argument in &mut self.arguments {
            if argument.metadata().target.is_some() {
                let mut metadata = argument.metadata().clone();
                metadata.target = Some(token.clone());
                *argument = argument.clone().with_metadata(metadata);
            }
        }
        self.token = token;
        self
    }

    /// Sets the scope.
    #[must_use]
    pub fn scope(mut self, scope: impl Scope) -> Self {
        self.scope = Some(Arc::new(scope));
        self
    }

    /// Shares one instance across every resolution.
    #[must_use]
    pub fn singleton(self) -> Self {
        self.scope(SingletonScope)
    }

    /// Creates an instance for every resolution.
    #[must_use]
    pub fn transient(self) -> Self {
        self.scope(TransientScope)
    }

    /// Creates one instance per parent instance.
    #[must_use]
    pub fn instance_scoped(self) -> Self {
        self.scope(InstanceScope)
    }

    /// Only selects this definition when the constraint accepts the session.
    /// Combined with an existing constraint, both have to accept.
    #[must_use]
    pub fn when(mut self, constraint: Constraint) -> Self {
        self.when = Some(match self.when.take() {
            Some(existing) => crate::when::and(existing, constraint),
            None => constraint,
        });
        self
    }

    /// Only selects this definition for requests with the given name.
    #[must_use]
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        let name = name.into();
        self.annotations.name = Some(name.clone());
        self.when(crate::when::named(name))
    }

    /// Only selects this definition for requests with the given tag.
    #[must_use]
    pub fn tagged(mut self, tag: impl Into<Cow<'static, str>>) -> Self {
        let tag = tag.into();
        self.annotations.tags.push(tag.clone());
        self.when(crate::when::tagged(tag))
    }

    /// Sets the position among other multi definitions, or among other hooks
    /// for [`provider_hook`] descriptors.
    #[must_use]
    pub fn order(mut self, order: i32) -> Self {
        self.annotations.order = order;
        self
    }

    /// Accumulates with other definitions of the token instead of replacing
    /// the previous unconstrained one.
    #[must_use]
    pub fn multi(mut self) -> Self {
        self.annotations.multi = true;
        self
    }

    /// Resolves the token when the injector is initialized.
    #[must_use]
    pub fn eager(mut self) -> Self {
        self.annotations.eager = true;
        self
    }

    /// Adds a hook that runs whenever this definition is selected.
    #[must_use]
    pub fn hook(self, hook: impl Hook) -> Self {
        self.hook_record(HookRecord::new(hook))
    }

    /// Adds a hook together with its ordering and constraint.
    #[must_use]
    pub fn hook_record(mut self, record: HookRecord) -> Self {
        self.hooks.push(record);
        self
    }

    /// Overrides the injections of the constructor, one argument per
    /// parameter. The derived hooks of each parameter type are kept and the
    /// override's hooks run inside them.
    ///
    /// ```
    /// use graph_injector::{factory, value, InjectionArgument, Injector, Svc, Token};
    ///
    /// let mut builder = Injector::builder();
    /// builder.provide(value(String::from("fallback")));
    /// builder.provide(value(String::from("primary")).provide(Token::named("primary")));
    /// builder.provide(
    ///     factory(|text: Svc<String>| text.len())
    ///         .inject([InjectionArgument::new(Token::named("primary"))]),
    /// );
    ///
    /// let injector = builder.build().unwrap();
    /// let len: Svc<usize> = injector.get().unwrap();
    /// assert_eq!(7, *len);
    /// ```
    #[must_use]
    pub fn inject(mut self, arguments: impl IntoIterator<Item = InjectionArgument>) -> Self {
        let overrides: Vec<_> = arguments.into_iter().collect();
        if overrides.len() == self.arguments.len() {
            self.arguments = self
                .arguments
                .into_iter()
                .zip(overrides)
                .map(|(derived, other)| derived.merge(other))
                .collect();
        } else {
            self.invalid = Some(format!(
                "expected {} injections but {} were given",
                self.arguments.len(),
                overrides.len()
            ));
        }
        self
    }

    /// Runs a callback after the instance is constructed and before it is
    /// handed out.
    #[must_use]
    pub fn on_init<T, F>(mut self, f: F) -> Self
    where
        T: Service,
        F: Fn(Svc<T>) -> MaybeAsync<InjectResult<()>> + Send + Sync + 'static,
    {
        self.on_init.push(typed_callback(self.token.clone(), f));
        self
    }

    /// Runs a callback when the instance is destroyed.
    #[must_use]
    pub fn on_destroy<T, F>(mut self, f: F) -> Self
    where
        T: Service,
        F: Fn(Svc<T>) -> MaybeAsync<InjectResult<()>> + Send + Sync + 'static,
    {
        self.on_destroy.push(typed_callback(self.token.clone(), f));
        self
    }

    /// Registers the [`Lifecycle`] implementation of `T` as the init and
    /// destroy callbacks.
    #[must_use]
    pub fn lifecycle<T: Lifecycle>(self) -> Self {
        self.on_init(T::on_init).on_destroy(T::on_destroy)
    }

    pub(crate) fn scope_or_default(&self) -> Arc<dyn Scope> {
        match (&self.scope, self.kind) {
            (Some(scope), _) => scope.clone(),
            (None, ProviderKind::Value) => Arc::new(SingletonScope),
            (None, _) => Arc::new(DefaultScope),
        }
    }

    pub(crate) fn validate(&self) -> InjectResult<()> {
        if let Some(reason) = &self.invalid {
            return Err(InjectError::InvalidDescriptor {
                token: self.token.clone(),
                reason: reason.clone(),
            });
        }

        let needs_constructor = matches!(
            self.kind,
            ProviderKind::Class | ProviderKind::Factory | ProviderKind::Value
        );
        if needs_constructor && self.constructor.is_none() {
            return Err(InjectError::InvalidDescriptor {
                token: self.token.clone(),
                reason: "the provider has no constructor".to_string(),
            });
        }
        if self.kind == ProviderKind::Hook && self.hooks.is_empty() {
            return Err(InjectError::InvalidDescriptor {
                token: self.token.clone(),
                reason: "the hook provider has no hook".to_string(),
            });
        }

        Ok(())
    }
}

impl Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("token", &self.token)
            .field("kind", &self.kind)
            .field("arguments", &self.arguments.len())
            .field("scope", &self.scope.as_ref().map(|scope| scope.name()))
            .field("annotations", &self.annotations)
            .finish()
    }
}

fn typed_callback<T, F>(token: Token, f: F) -> LifecycleFn
where
    T: Service,
    F: Fn(Svc<T>) -> MaybeAsync<InjectResult<()>> + Send + Sync + 'static,
{
    Arc::new(move |value: DynSvc| match value.downcast::<T>() {
        Ok(value) => f(value),
        Err(_) => MaybeAsync::ready(Err(InjectError::InvalidProvider {
            token: token.clone(),
        })),
    })
}

fn erase<D, F>(token: Token, constructor: F, kind: ProviderKind) -> ProviderDescriptor
where
    D: 'static,
    F: ServiceFactory<D>,
    F::Output: Service,
{
    let arguments = constructor.arguments();
    let injection = match kind {
        ProviderKind::Class => InjectionKind::Parameter,
        _ => InjectionKind::Factory,
    };
    let mut descriptor =
        ProviderDescriptor::new(token, kind).with_arguments(arguments, injection);
    descriptor.constructor = Some(Arc::new(move |arguments: &[InjectionArgument], values: Vec<Injected>| {
        MaybeAsync::ready(
            constructor
                .invoke(arguments, values)
                .map(|value| Svc::new(value) as DynSvc),
        )
    }));
    descriptor
}

/// Creates a class provider. The constructor's parameters are resolved as
/// dependencies and its return value becomes the service for its type.
///
/// Class providers are the only ones that can take part in a dependency
/// cycle, through a [`Ref`](crate::Ref) parameter on one side of it.
pub fn class<D, F>(constructor: F) -> ProviderDescriptor
where
    D: 'static,
    F: ServiceFactory<D>,
    F::Output: Service,
{
    erase(Token::of::<F::Output>(), constructor, ProviderKind::Class)
}

/// Creates a factory provider for the factory's return type.
pub fn factory<D, F>(f: F) -> ProviderDescriptor
where
    D: 'static,
    F: ServiceFactory<D>,
    F::Output: Service,
{
    erase(Token::of::<F::Output>(), f, ProviderKind::Factory)
}

/// Creates a factory provider from a fallible factory. Errors it returns
/// surface as [`InjectError::ActivationFailed`].
pub fn try_factory<D, F, R, E>(f: F) -> ProviderDescriptor
where
    D: 'static,
    F: ServiceFactory<D, Output = Result<R, E>>,
    R: Service,
    E: Error + Send + Sync + 'static,
{
    let token = Token::of::<R>();
    let arguments = f.arguments();
    let mut descriptor = ProviderDescriptor::new(token.clone(), ProviderKind::Factory)
        .with_arguments(arguments, InjectionKind::Factory);
    descriptor.constructor = Some(Arc::new(move |arguments: &[InjectionArgument], values: Vec<Injected>| {
        MaybeAsync::ready(f.invoke(arguments, values).and_then(|result| {
            result
                .map(|value| Svc::new(value) as DynSvc)
                .map_err(|error| InjectError::activation_failed(token.clone(), error))
        }))
    }));
    descriptor
}

/// Creates a factory provider from a factory returning a future.
///
/// ```
/// use graph_injector::{factory_async, value, Injector, Svc};
///
/// # futures::executor::block_on(async {
/// let mut builder = Injector::builder();
/// builder.provide(value(20_u32));
/// builder.provide(factory_async(|base: Svc<u32>| async move { u64::from(*base) + 1 }));
///
/// let injector = builder.build_async().await.unwrap();
/// let answer: Svc<u64> = injector.get_async().await.unwrap();
/// assert_eq!(21, *answer);
/// # });
/// ```
pub fn factory_async<D, F, Fut, R>(f: F) -> ProviderDescriptor
where
    D: 'static,
    F: ServiceFactory<D, Output = Fut>,
    Fut: Future<Output = R> + Send + 'static,
    R: Service,
{
    let arguments = f.arguments();
    let mut descriptor = ProviderDescriptor::new(Token::of::<R>(), ProviderKind::Factory)
        .with_arguments(arguments, InjectionKind::Factory);
    descriptor.constructor = Some(Arc::new(move |arguments: &[InjectionArgument], values: Vec<Injected>| {
        match f.invoke(arguments, values) {
            Ok(future) => MaybeAsync::deferred(async move {
                Ok(Svc::new(future.await) as DynSvc)
            }),
            Err(error) => MaybeAsync::ready(Err(error)),
        }
    }));
    descriptor
}

/// Creates a factory provider from a factory returning a fallible future.
pub fn try_factory_async<D, F, Fut, R, E>(f: F) -> ProviderDescriptor
where
    D: 'static,
    F: ServiceFactory<D, Output = Fut>,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: Service,
    E: Error + Send + Sync + 'static,
{
    let token = Token::of::<R>();
    let arguments = f.arguments();
    let mut descriptor = ProviderDescriptor::new(token.clone(), ProviderKind::Factory)
        .with_arguments(arguments, InjectionKind::Factory);
    descriptor.constructor = Some(Arc::new(move |arguments: &[InjectionArgument], values: Vec<Injected>| {
        match f.invoke(arguments, values) {
            Ok(future) => {
                let token = token.clone();
                MaybeAsync::deferred(async move {
                    future
                        .await
                        .map(|value| Svc::new(value) as DynSvc)
                        .map_err(|error| InjectError::activation_failed(token, error))
                })
            }
            Err(error) => MaybeAsync::ready(Err(error)),
        }
    }));
    descriptor
}

/// Creates a provider handing out a fixed value. Without another scope the
/// value is a singleton.
pub fn value<T: Service>(value: T) -> ProviderDescriptor {
    let value: DynSvc = Svc::new(value);
    let mut descriptor = ProviderDescriptor::new(Token::of::<T>(), ProviderKind::Value);
    descriptor.constructor = Some(Arc::new(move |_: &[InjectionArgument], _: Vec<Injected>| {
        MaybeAsync::ready(Ok(value.clone()))
    }));
    descriptor
}

/// Creates a provider that resolves `target` whenever `token` is requested.
/// Both tokens share the target's instance.
pub fn alias(token: Token, target: Token) -> ProviderDescriptor {
    let mut descriptor = ProviderDescriptor::new(token, ProviderKind::Alias);
    descriptor.hooks.push(HookRecord::new(hooks::use_token(target)));
    descriptor
}

/// Creates a descriptor that adds a hook to the provider record of `token`
/// rather than a definition. Provider hooks run for every definition of the
/// token; use [`ProviderDescriptor::when`] and [`ProviderDescriptor::order`]
/// to restrict and position them.
pub fn provider_hook(token: Token, hook: impl Hook) -> ProviderDescriptor {
    let mut descriptor = ProviderDescriptor::new(token, ProviderKind::Hook);
    descriptor.hooks.push(HookRecord::new(hook));
    descriptor
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Foo;
    struct Bar(#[allow(dead_code)] Svc<Foo>);

    #[test]
    fn class_arguments_carry_their_position() {
        let descriptor = class(Bar);
        assert_eq!(&Token::of::<Bar>(), descriptor.token());
        assert_eq!(ProviderKind::Class, descriptor.kind());

        let argument = &descriptor.arguments()[0];
        assert_eq!(&Token::of::<Foo>(), argument.token());
        assert_eq!(InjectionKind::Parameter, argument.metadata().kind);
        assert_eq!(Some(0), argument.metadata().index);
        assert_eq!(Some(Token::of::<Bar>()), argument.metadata().target);
    }

    #[test]
    fn inject_with_wrong_arity_is_invalid() {
        let descriptor = class(Bar).inject([]);
        assert!(matches!(
            descriptor.validate(),
            Err(InjectError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn named_adds_annotation_and_constraint() {
        let descriptor = value(Foo).named("foo");
        assert_eq!(Some("foo".into()), descriptor.annotations().name);
        assert!(descriptor.when.is_some());
    }

    #[test]
    fn values_default_to_singletons() {
        assert_eq!("Singleton", value(Foo).scope_or_default().name());
        assert_eq!("Default", class(|| Foo).scope_or_default().name());
    }
}
