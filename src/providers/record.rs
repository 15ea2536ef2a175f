use crate::{
    hooks::sort_hooks, Constraint, Constructor, Context, HookRecord, InjectError, InjectResult,
    Injector, InjectorInner, InjectionArgument, InstanceId, LifecycleFn, ProviderAnnotations,
    ProviderDescriptor, ProviderKind, Scope, Session, Token,
};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    fmt::{Debug, Formatter},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
};

static NEXT_DEFINITION: AtomicU64 = AtomicU64::new(0);

/// Every definition of one token within one injector, together with the
/// hooks that apply to all of them.
pub struct ProviderRecord {
    token: Token,
    host: Weak<InjectorInner>,
    definitions: Vec<Arc<ProviderDefinition>>,
    hooks: Vec<HookRecord>,
}

impl ProviderRecord {
    pub(crate) fn new(token: Token, host: Weak<InjectorInner>) -> Self {
        ProviderRecord {
            token,
            host,
            definitions: Vec::new(),
            hooks: Vec::new(),
        }
    }

    /// Registers a descriptor. An unconstrained, non-multi definition replaces
    /// the previous one; everything else accumulates.
    pub(crate) fn add(&mut self, descriptor: ProviderDescriptor) {
        if descriptor.kind == ProviderKind::Hook {
            for hook in descriptor.hooks {
                let mut hook = hook.order(descriptor.annotations.order);
                if let Some(when) = descriptor.when.clone() {
                    hook = hook.when(when);
                }
                self.hooks.push(hook);
            }
            sort_hooks(&mut self.hooks);
            return;
        }

        let definition = ProviderDefinition::new(descriptor);
        if definition.when.is_none() && !definition.annotations.multi {
            self.definitions
                .retain(|existing| existing.when.is_some() || existing.annotations.multi);
        }
        self.definitions.push(Arc::new(definition));
    }

    /// The token the record is registered under.
    #[must_use]
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// The definitions, in registration order.
    #[must_use]
    pub fn definitions(&self) -> &[Arc<ProviderDefinition>] {
        &self.definitions
    }

    /// The provider-level hooks, sorted by order.
    #[must_use]
    pub fn hooks(&self) -> &[HookRecord] {
        &self.hooks
    }

    /// The injector that owns this record.
    pub fn host(&self) -> InjectResult<Injector> {
        Injector::upgrade(&self.host).ok_or_else(|| InjectError::InjectorDestroyed {
            injector: format!("host of {}", self.token),
        })
    }

    /// Picks the definition for a session: the newest constrained definition
    /// accepting the session, otherwise the newest unconstrained one.
    #[must_use]
    pub fn select(&self, session: &Session) -> Option<Arc<ProviderDefinition>> {
        let mut fallback = None;
        for definition in self.definitions.iter().rev() {
            match &definition.when {
                Some(constraint) if constraint.matches(session) => {
                    return Some(definition.clone());
                }
                Some(_) => {}
                None => {
                    if fallback.is_none() {
                        fallback = Some(definition.clone());
                    }
                }
            }
        }
        fallback
    }

    /// Every definition accepting the session, sorted by order and then by
    /// registration.
    #[must_use]
    pub fn matching(&self, session: &Session) -> Vec<Arc<ProviderDefinition>> {
        let mut matching: Vec<_> = self
            .definitions
            .iter()
            .filter(|definition| {
                definition
                    .when
                    .as_ref()
                    .map_or(true, |constraint| constraint.matches(session))
            })
            .cloned()
            .collect();
        matching.sort_by_key(|definition| definition.annotations.order);
        matching
    }
}

impl Debug for ProviderRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRecord")
            .field("token", &self.token)
            .field("definitions", &self.definitions)
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// A single registered provider. Immutable after registration except for its
/// instance cache and its destroyed flag.
pub struct ProviderDefinition {
    id: u64,
    token: Token,
    kind: ProviderKind,
    arguments: Vec<InjectionArgument>,
    constructor: Option<Constructor>,
    scope: Arc<dyn Scope>,
    when: Option<Constraint>,
    hooks: Vec<HookRecord>,
    annotations: ProviderAnnotations,
    on_init: Vec<LifecycleFn>,
    on_destroy: Vec<LifecycleFn>,
    instances: Mutex<HashMap<Context, InstanceId>>,
    destroyed: AtomicBool,
}

impl ProviderDefinition {
    fn new(descriptor: ProviderDescriptor) -> Self {
        let scope = descriptor.scope_or_default();
        let mut hooks = descriptor.hooks;
        sort_hooks(&mut hooks);
        ProviderDefinition {
            id: NEXT_DEFINITION.fetch_add(1, Ordering::Relaxed),
            token: descriptor.token,
            kind: descriptor.kind,
            arguments: descriptor.arguments,
            constructor: descriptor.constructor,
            scope,
            when: descriptor.when,
            hooks,
            annotations: descriptor.annotations,
            on_init: descriptor.on_init,
            on_destroy: descriptor.on_destroy,
            instances: Mutex::new(HashMap::new()),
            destroyed: AtomicBool::new(false),
        }
    }

    /// The token the definition provides.
    #[must_use]
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// How the value is produced.
    #[must_use]
    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// The scope deciding how instances are shared.
    #[must_use]
    pub fn scope(&self) -> &Arc<dyn Scope> {
        &self.scope
    }

    /// The annotations attached at registration.
    #[must_use]
    pub fn annotations(&self) -> &ProviderAnnotations {
        &self.annotations
    }

    /// The injections the constructor receives.
    #[must_use]
    pub fn arguments(&self) -> &[InjectionArgument] {
        &self.arguments
    }

    /// The definition-level hooks, sorted by order.
    #[must_use]
    pub fn hooks(&self) -> &[HookRecord] {
        &self.hooks
    }

    /// Checks whether the definition was torn down with its injector.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    pub(crate) fn constructor(&self) -> Option<&Constructor> {
        self.constructor.as_ref()
    }

    pub(crate) fn on_init(&self) -> &[LifecycleFn] {
        &self.on_init
    }

    pub(crate) fn on_destroy(&self) -> &[LifecycleFn] {
        &self.on_destroy
    }

    pub(crate) fn instances(&self) -> &Mutex<HashMap<Context, InstanceId>> {
        &self.instances
    }

    pub(crate) fn mark_destroyed(&self) {
        self.destroyed.store(true, Ordering::Release);
    }
}

impl PartialEq for ProviderDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ProviderDefinition {}

impl Debug for ProviderDefinition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderDefinition")
            .field("id", &self.id)
            .field("token", &self.token)
            .field("kind", &self.kind)
            .field("scope", &self.scope.name())
            .field("constrained", &self.when.is_some())
            .field("annotations", &self.annotations)
            .finish()
    }
}
