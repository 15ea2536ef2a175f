use crate::{hooks, Hook, HookRecord, Request, Token};
use std::borrow::Cow;

/// Where an injection happens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum InjectionKind {
    /// A constructor parameter of a class provider.
    Parameter,
    /// A field assigned after construction.
    Property,
    /// An argument of a method called after construction.
    Method,
    /// An argument of a factory provider.
    Factory,
    /// A request made directly on an injector.
    #[default]
    Standalone,
}

/// Describes the position of an injection.
#[derive(Clone, Debug, Default)]
pub struct InjectionMetadata {
    /// The kind of injection.
    pub kind: InjectionKind,
    /// The token of the provider receiving the dependency.
    pub target: Option<Token>,
    /// The property or method name, for property and method injections.
    pub key: Option<Cow<'static, str>>,
    /// The position of the argument.
    pub index: Option<usize>,
}

/// A single injection: the token to resolve, the hooks to run at the
/// injection site and where the injection happens.
///
/// Arguments are derived from request types, so a constructor taking an
/// `Option<Svc<Foo>>` gets an argument for `Foo` carrying the `optional`
/// hook. Arguments can also be built by hand and passed to
/// [`Injector::resolve`](crate::Injector::resolve) or
/// [`ProviderDescriptor::inject`](crate::ProviderDescriptor::inject).
#[derive(Clone, Debug)]
pub struct InjectionArgument {
    token: Token,
    hooks: Vec<HookRecord>,
    metadata: InjectionMetadata,
}

impl InjectionArgument {
    /// Creates an argument for a token without hooks.
    #[must_use]
    pub fn new(token: Token) -> Self {
        InjectionArgument {
            token,
            hooks: Vec::new(),
            metadata: InjectionMetadata::default(),
        }
    }

    /// Creates the argument a request type would produce.
    #[must_use]
    pub fn of<R: Request>() -> Self {
        R::argument()
    }

    /// The token being requested.
    #[must_use]
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// The injection-site hooks, in declaration order.
    #[must_use]
    pub fn hooks(&self) -> &[HookRecord] {
        &self.hooks
    }

    /// Where the injection happens.
    #[must_use]
    pub fn metadata(&self) -> &InjectionMetadata {
        &self.metadata
    }

    /// Replaces the requested token.
    #[must_use]
    pub fn with_token(mut self, token: Token) -> Self {
        self.token = token;
        self
    }

    /// Adds a hook. Hooks added first run first.
    #[must_use]
    pub fn with_hook(self, hook: impl Hook) -> Self {
        self.with_hook_record(HookRecord::new(hook))
    }

    /// Adds a hook together with its ordering and constraint.
    #[must_use]
    pub fn with_hook_record(mut self, record: HookRecord) -> Self {
        self.hooks.push(record);
        self
    }

    /// Prepends a hook so it wraps every hook already present.
    #[must_use]
    pub(crate) fn wrapped_by(mut self, hook: impl Hook) -> Self {
        self.hooks.insert(0, HookRecord::new(hook));
        self
    }

    /// Only accepts definitions constrained to `name`.
    #[must_use]
    pub fn named(self, name: impl Into<Cow<'static, str>>) -> Self {
        self.with_hook(hooks::named(name))
    }

    /// Only accepts definitions constrained to `tag`.
    #[must_use]
    pub fn tagged(self, tag: impl Into<Cow<'static, str>>) -> Self {
        self.with_hook(hooks::tagged(tag))
    }

    /// Resolves to nothing rather than failing when the token has no
    /// provider.
    #[must_use]
    pub fn optional(self) -> Self {
        self.with_hook(hooks::optional())
    }

    /// Replaces the injection metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: InjectionMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub(crate) fn at_position(
        mut self,
        kind: InjectionKind,
        target: &Token,
        index: usize,
    ) -> Self {
        self.metadata.kind = kind;
        self.metadata.target = Some(target.clone());
        self.metadata.index = Some(index);
        self
    }

    /// Combines an argument derived from a parameter type with an override.
    /// The override's token wins, its hooks run inside the derived ones and
    /// its metadata is kept where set.
    pub(crate) fn merge(mut self, other: InjectionArgument) -> Self {
        self.token = other.token;
        self.hooks.extend(other.hooks);
        if other.metadata.key.is_some() {
            self.metadata.key = other.metadata.key;
        }
        if other.metadata.kind != InjectionKind::Standalone {
            self.metadata.kind = other.metadata.kind;
        }
        self
    }
}
