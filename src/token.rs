use crate::{ModuleId, ProviderDescriptor};
use std::{
    any::{Any, TypeId},
    borrow::Cow,
    fmt::{Debug, Display, Formatter},
    hash::{Hash, Hasher},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

static NEXT_UNIQUE: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, PartialEq, Eq, Hash)]
enum TokenKey {
    Type(TypeId),
    Name(Arc<str>),
    Unique(u64),
}

/// Where a tree-shakable provider may be registered on demand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProvidedIn {
    /// Only the root injector of a hierarchy (the one without a parent).
    Root,
    /// Any injector the token is requested from. Each injector gets its own
    /// record.
    Any,
    /// Only the injector compiled from the given module.
    Module(ModuleId),
}

pub(crate) struct TreeShakable {
    pub(crate) provided_in: ProvidedIn,
    pub(crate) descriptor: ProviderDescriptor,
}

/// The key every provider is registered under and every request asks for.
///
/// Tokens compare by identity. A type token compares by [`TypeId`], a named
/// token by its string and a unique token by a process-unique id, so two
/// unique tokens with the same description are still distinct.
///
/// ```
/// use graph_injector::Token;
///
/// struct Foo;
///
/// assert_eq!(Token::of::<Foo>(), Token::of::<Foo>());
/// assert_eq!(Token::named("config"), Token::named("config"));
/// assert_ne!(Token::unique("config"), Token::unique("config"));
/// ```
#[derive(Clone)]
pub struct Token {
    key: TokenKey,
    name: Cow<'static, str>,
    provided: Option<Arc<TreeShakable>>,
}

impl Token {
    /// Creates a token for a type.
    #[must_use]
    pub fn of<T: ?Sized + Any>() -> Self {
        Token {
            key: TokenKey::Type(TypeId::of::<T>()),
            name: Cow::Borrowed(std::any::type_name::<T>()),
            provided: None,
        }
    }

    /// Creates a token compared by its name.
    #[must_use]
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        let name = name.into();
        Token {
            key: TokenKey::Name(Arc::from(name.as_ref())),
            name,
            provided: None,
        }
    }

    /// Creates a token that is only equal to itself and its clones. The
    /// description is only used for display.
    #[must_use]
    pub fn unique(description: impl Into<Cow<'static, str>>) -> Self {
        Token {
            key: TokenKey::Unique(NEXT_UNIQUE.fetch_add(1, Ordering::Relaxed)),
            name: description.into(),
            provided: None,
        }
    }

    /// Attaches a tree-shakable provider to this token. Injectors matching
    /// `provided_in` register the provider the first time the token is
    /// requested from them and nothing provides it explicitly.
    #[must_use]
    pub fn provided_in(
        mut self,
        provided_in: ProvidedIn,
        descriptor: ProviderDescriptor,
    ) -> Self {
        let bare = Token {
            key: self.key.clone(),
            name: self.name.clone(),
            provided: None,
        };
        self.provided = Some(Arc::new(TreeShakable {
            provided_in,
            descriptor: descriptor.provide(bare),
        }));
        self
    }

    /// Gets the display name of this token.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    /// Checks whether this is the type token for `T`.
    #[must_use]
    pub fn is<T: ?Sized + Any>(&self) -> bool {
        self.key == TokenKey::Type(TypeId::of::<T>())
    }

    pub(crate) fn tree_shakable(&self) -> Option<&TreeShakable> {
        self.provided.as_deref()
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl Debug for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.key {
            TokenKey::Type(_) => write!(f, "Token({})", self.name),
            TokenKey::Name(_) => write!(f, "Token({:?})", self.name),
            TokenKey::Unique(id) => write!(f, "Token({}#{})", self.name, id),
        }
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
