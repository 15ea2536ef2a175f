use crate::{DynSvc, Service, Svc, Token};
use once_cell::sync::OnceCell;
use std::{
    fmt::{Debug, Formatter},
    marker::PhantomData,
    sync::Arc,
};

/// The untyped outcome of resolving a single injection.
#[derive(Clone)]
pub enum Injected {
    /// A fully constructed value.
    Value(DynSvc),
    /// A placeholder for a class instance that is still being constructed
    /// further up the stack. It is filled once that construction finishes.
    Shell(Shell),
    /// Every value matching an `all` request, in registration order.
    Many(Vec<Injected>),
    /// Nothing was injected, for example an optional dependency without a
    /// provider.
    Absent,
}

impl Injected {
    /// Wraps a value.
    pub fn value<T: Service>(value: T) -> Self {
        Injected::Value(Svc::new(value))
    }

    /// Checks whether nothing was injected.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Injected::Absent)
    }

    /// Gets the value if it is available now. A filled shell counts as
    /// available.
    #[must_use]
    pub fn get(&self) -> Option<DynSvc> {
        match self {
            Injected::Value(value) => Some(value.clone()),
            Injected::Shell(shell) => shell.get(),
            Injected::Many(_) | Injected::Absent => None,
        }
    }

    /// Gets the value as a `Svc<T>` if it is available and has that type.
    #[must_use]
    pub fn downcast<T: Service>(&self) -> Option<Svc<T>> {
        self.get()?.downcast().ok()
    }
}

impl Debug for Injected {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Injected::Value(_) => f.write_str("Value(..)"),
            Injected::Shell(shell) => shell.fmt(f),
            Injected::Many(values) => f.debug_tuple("Many").field(values).finish(),
            Injected::Absent => f.write_str("Absent"),
        }
    }
}

/// A slot allocated for an instance before its constructor returned.
#[derive(Clone)]
pub struct Shell {
    token: Token,
    slot: Arc<OnceCell<DynSvc>>,
}

impl Shell {
    pub(crate) fn new(token: Token) -> Self {
        Shell {
            token,
            slot: Arc::new(OnceCell::new()),
        }
    }

    /// The token of the instance this shell stands in for.
    #[must_use]
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Gets the value once the instance has been constructed.
    #[must_use]
    pub fn get(&self) -> Option<DynSvc> {
        self.slot.get().cloned()
    }

    /// Checks whether the instance has been constructed.
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.slot.get().is_some()
    }

    pub(crate) fn fill(&self, value: DynSvc) {
        // A shell is filled exactly once, by the construction that created it.
        let _ = self.slot.set(value);
    }
}

impl Debug for Shell {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shell")
            .field("token", &self.token)
            .field("filled", &self.is_filled())
            .finish()
    }
}

/// A reference to a service that might still be under construction.
///
/// Requesting `Ref<T>` instead of `Svc<T>` allows a class provider to take
/// part in a dependency cycle: the dependent receives the reference right
/// away and can read it once the whole cycle has been constructed, for
/// example from its `on_init` callback.
///
/// ```
/// use graph_injector::{class, Injector, Ref, Svc};
///
/// struct Parent {
///     child: Svc<Child>,
/// }
///
/// struct Child {
///     parent: Ref<Parent>,
/// }
///
/// let mut builder = Injector::builder();
/// builder.provide(class(|child: Svc<Child>| Parent { child }));
/// builder.provide(class(|parent: Ref<Parent>| Child { parent }));
///
/// let injector = builder.build().unwrap();
/// let parent: Svc<Parent> = injector.get().unwrap();
/// let back = parent.child.parent.get().unwrap();
/// assert!(Svc::ptr_eq(&parent, &back));
/// ```
pub struct Ref<T: Service> {
    slot: Arc<OnceCell<DynSvc>>,
    marker: PhantomData<fn() -> T>,
}

impl<T: Service> Ref<T> {
    pub(crate) fn resolved(value: DynSvc) -> Self {
        let slot = OnceCell::new();
        let _ = slot.set(value);
        Ref {
            slot: Arc::new(slot),
            marker: PhantomData,
        }
    }

    pub(crate) fn from_shell(shell: &Shell) -> Self {
        Ref {
            slot: shell.slot.clone(),
            marker: PhantomData,
        }
    }

    /// Gets the service if its construction has finished.
    #[must_use]
    pub fn get(&self) -> Option<Svc<T>> {
        self.slot.get()?.clone().downcast().ok()
    }

    /// Checks whether the service has been constructed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.slot.get().is_some()
    }
}

impl<T: Service> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Ref {
            slot: self.slot.clone(),
            marker: PhantomData,
        }
    }
}

impl<T: Service> Debug for Ref<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ref")
            .field("type", &std::any::type_name::<T>())
            .field("ready", &self.is_ready())
            .finish()
    }
}
