use crate::{
    Context, InjectionMetadata, Injector, InstanceId, LifecycleFn, ProviderDefinition,
    ProviderRecord, Token,
};
use parking_lot::Mutex;
use std::{
    borrow::Cow,
    fmt::{Debug, Formatter},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

static NEXT_SESSION: AtomicU64 = AtomicU64::new(0);

/// Flags restricting how a session looks up its provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionFlags {
    /// Only look in the injector the request was made on.
    pub self_only: bool,
    /// Start looking in the parent of the injector the request was made on.
    pub skip_self: bool,
}

/// Free-form annotations hooks attach to a session. Constraints read them to
/// pick a definition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Annotations {
    /// The requested name.
    pub name: Option<Cow<'static, str>>,
    /// The requested tags.
    pub tags: Vec<Cow<'static, str>>,
}

#[derive(Clone)]
struct SessionState {
    token: Token,
    injector: Injector,
    provider: Option<Arc<ProviderRecord>>,
    definition: Option<Arc<ProviderDefinition>>,
    instance: Option<InstanceId>,
    context: Option<Context>,
    metadata: InjectionMetadata,
    annotations: Annotations,
    flags: SessionFlags,
    init_hooks: Vec<LifecycleFn>,
    destroy_hooks: Vec<LifecycleFn>,
}

struct SessionInner {
    id: u64,
    parent: Option<Session>,
    children: Mutex<Vec<Weak<SessionInner>>>,
    state: Mutex<SessionState>,
}

/// The state of a single injection while it is being resolved.
///
/// Sessions form a tree that mirrors the resolution call stack: resolving a
/// dependency of a provider creates a child of that provider's session. The
/// chain of parents is how cycles are told apart from parallel requests and
/// how scopes find the instance a dependency belongs to.
///
/// Hooks read and change the session before passing it on.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub(crate) fn new(
        token: Token,
        injector: Injector,
        metadata: InjectionMetadata,
        parent: Option<&Session>,
    ) -> Self {
        let state = SessionState {
            token,
            injector,
            provider: None,
            definition: None,
            instance: None,
            context: None,
            metadata,
            annotations: Annotations::default(),
            flags: SessionFlags::default(),
            init_hooks: Vec::new(),
            destroy_hooks: Vec::new(),
        };
        Session::with_state(state, parent)
    }

    fn with_state(state: SessionState, parent: Option<&Session>) -> Self {
        let session = Session {
            inner: Arc::new(SessionInner {
                id: NEXT_SESSION.fetch_add(1, Ordering::Relaxed),
                parent: parent.cloned(),
                children: Mutex::new(Vec::new()),
                state: Mutex::new(state),
            }),
        };
        if let Some(parent) = parent {
            let mut children = parent.inner.children.lock();
            children.retain(|child| child.strong_count() > 0);
            children.push(Arc::downgrade(&session.inner));
        }
        session
    }

    /// Creates a sibling with a copy of this session's state.
    #[must_use]
    pub fn fork(&self) -> Session {
        let state = self.inner.state.lock().clone();
        Session::with_state(state, self.parent())
    }

    /// The session of the provider that requested this injection.
    #[must_use]
    pub fn parent(&self) -> Option<&Session> {
        self.inner.parent.as_ref()
    }

    /// Every session up the chain, starting with the parent.
    #[must_use]
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors {
            next: self.parent(),
        }
    }

    /// The sessions of the dependencies resolved so far that are still alive.
    #[must_use]
    pub fn children(&self) -> Vec<Session> {
        self.inner
            .children
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .map(|inner| Session { inner })
            .collect()
    }

    /// The token being resolved.
    #[must_use]
    pub fn token(&self) -> Token {
        self.inner.state.lock().token.clone()
    }

    /// Rebinds the session to another token. The provider and definition
    /// bound so far are dropped, so the rest of the pipeline looks the new
    /// token up from scratch.
    pub fn set_token(&self, token: Token) {
        let mut state = self.inner.state.lock();
        state.token = token;
        state.provider = None;
        state.definition = None;
    }

    /// The injector resolution currently happens in.
    #[must_use]
    pub fn injector(&self) -> Injector {
        self.inner.state.lock().injector.clone()
    }

    /// The provider record bound to this session.
    #[must_use]
    pub fn provider(&self) -> Option<Arc<ProviderRecord>> {
        self.inner.state.lock().provider.clone()
    }

    /// Binds a provider record, skipping lookup. Any bound definition is
    /// dropped.
    pub fn set_provider(&self, provider: Arc<ProviderRecord>) {
        let mut state = self.inner.state.lock();
        state.provider = Some(provider);
        state.definition = None;
    }

    pub(crate) fn bind_provider(&self, injector: Injector, provider: Arc<ProviderRecord>) {
        let mut state = self.inner.state.lock();
        state.injector = injector;
        state.provider = Some(provider);
        state.definition = None;
    }

    pub(crate) fn clear_provider(&self) {
        let mut state = self.inner.state.lock();
        state.provider = None;
        state.definition = None;
    }

    /// The definition bound to this session.
    #[must_use]
    pub fn definition(&self) -> Option<Arc<ProviderDefinition>> {
        self.inner.state.lock().definition.clone()
    }

    /// Binds a definition, skipping definition selection.
    pub fn set_definition(&self, definition: Arc<ProviderDefinition>) {
        self.inner.state.lock().definition = Some(definition);
    }

    /// The instance this session resolved to, once known.
    #[must_use]
    pub fn instance(&self) -> Option<InstanceId> {
        self.inner.state.lock().instance
    }

    pub(crate) fn set_instance(&self, instance: InstanceId) {
        self.inner.state.lock().instance = Some(instance);
    }

    /// The context set by a hook, if any.
    #[must_use]
    pub fn context(&self) -> Option<Context> {
        self.inner.state.lock().context
    }

    /// Overrides the context for scopes that allow it.
    pub fn set_context(&self, context: Context) {
        self.inner.state.lock().context = Some(context);
    }

    /// Where the injection happens.
    #[must_use]
    pub fn metadata(&self) -> InjectionMetadata {
        self.inner.state.lock().metadata.clone()
    }

    /// The annotations attached so far.
    #[must_use]
    pub fn annotations(&self) -> Annotations {
        self.inner.state.lock().annotations.clone()
    }

    /// Changes the annotations.
    pub fn annotate(&self, f: impl FnOnce(&mut Annotations)) {
        f(&mut self.inner.state.lock().annotations);
    }

    /// The lookup flags.
    #[must_use]
    pub fn flags(&self) -> SessionFlags {
        self.inner.state.lock().flags
    }

    /// Changes the lookup flags.
    pub fn set_flags(&self, f: impl FnOnce(&mut SessionFlags)) {
        f(&mut self.inner.state.lock().flags);
    }

    pub(crate) fn push_init_hook(&self, hook: LifecycleFn) {
        self.inner.state.lock().init_hooks.push(hook);
    }

    pub(crate) fn push_destroy_hook(&self, hook: LifecycleFn) {
        self.inner.state.lock().destroy_hooks.push(hook);
    }

    /// Standalone init hooks, innermost first.
    pub(crate) fn init_hooks(&self) -> Vec<LifecycleFn> {
        let mut hooks = self.inner.state.lock().init_hooks.clone();
        hooks.reverse();
        hooks
    }

    /// Standalone destroy hooks, innermost first.
    pub(crate) fn destroy_hooks(&self) -> Vec<LifecycleFn> {
        let mut hooks = self.inner.state.lock().destroy_hooks.clone();
        hooks.reverse();
        hooks
    }
}

impl Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("token", &state.token)
            .field("instance", &state.instance)
            .field("flags", &state.flags)
            .finish()
    }
}

/// Iterator over the parents of a session.
#[derive(Debug)]
pub struct Ancestors<'a> {
    next: Option<&'a Session>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a Session;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent();
        Some(current)
    }
}
