use crate::{InstanceId, Session};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum ContextKey {
    Static,
    Unique(u64),
    Instance(InstanceId),
}

/// The key a definition caches its instances under. Two resolutions of the
/// same definition share an instance exactly when their scope computes the
/// same context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Context(ContextKey);

impl Context {
    /// The process-wide context shared by every singleton.
    pub const STATIC: Context = Context(ContextKey::Static);

    /// Allocates a context that is not equal to any other.
    #[allow(clippy::new_without_default)]
    #[must_use]
    pub fn new() -> Self {
        Context(ContextKey::Unique(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed)))
    }

    /// The context keyed to a parent instance.
    #[must_use]
    pub fn of_instance(instance: InstanceId) -> Self {
        Context(ContextKey::Instance(instance))
    }

    /// Checks whether this is [`Context::STATIC`].
    #[must_use]
    pub fn is_static(self) -> bool {
        self.0 == ContextKey::Static
    }
}

/// What a scope needs to know to decide whether a child instance should be
/// destroyed together with one of its parents.
#[derive(Clone, Copy, Debug)]
pub struct DestroyCandidate {
    /// The context the instance is cached under.
    pub context: Context,
    /// How many parents still hold the instance.
    pub remaining_parents: usize,
}

/// Controls how instances of a definition are shared.
pub trait Scope: Send + Sync + 'static {
    /// A short name used in logs.
    fn name(&self) -> &'static str;

    /// Computes the cache key for a resolution.
    fn context(&self, session: &Session) -> Context;

    /// Whether a context set on the session by a hook replaces the computed
    /// one.
    fn can_be_overridden(&self) -> bool {
        true
    }

    /// Whether a child instance should be destroyed when one of its parents
    /// is destroyed.
    fn should_destroy(&self, candidate: DestroyCandidate) -> bool {
        let _ = candidate;
        false
    }

    /// Whether the scope takes its behavior from the nearest parent.
    fn delegates_to_parent(&self) -> bool {
        false
    }
}

/// One instance per definition, shared by every resolution.
#[derive(Clone, Copy, Debug, Default)]
pub struct SingletonScope;

impl Scope for SingletonScope {
    fn name(&self) -> &'static str {
        "Singleton"
    }

    fn context(&self, _session: &Session) -> Context {
        Context::STATIC
    }

    fn can_be_overridden(&self) -> bool {
        false
    }
}

/// A new instance for every resolution.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransientScope;

impl Scope for TransientScope {
    fn name(&self) -> &'static str {
        "Transient"
    }

    fn context(&self, _session: &Session) -> Context {
        Context::new()
    }

    fn should_destroy(&self, candidate: DestroyCandidate) -> bool {
        candidate.remaining_parents == 0
    }
}

/// One instance per parent instance.
#[derive(Clone, Copy, Debug, Default)]
pub struct InstanceScope;

impl Scope for InstanceScope {
    fn name(&self) -> &'static str {
        "Instance"
    }

    fn context(&self, session: &Session) -> Context {
        session
            .ancestors()
            .find_map(Session::instance)
            .map_or_else(Context::new, Context::of_instance)
    }

    fn should_destroy(&self, candidate: DestroyCandidate) -> bool {
        candidate.remaining_parents == 0
    }
}

/// Behaves like the scope of the nearest parent that has a scope of its
/// own, or like a singleton without one.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultScope;

impl Scope for DefaultScope {
    fn name(&self) -> &'static str {
        "Default"
    }

    fn context(&self, session: &Session) -> Context {
        for ancestor in session.ancestors() {
            if let Some(definition) = ancestor.definition() {
                let scope = definition.scope();
                if !scope.delegates_to_parent() {
                    return scope.context(session);
                }
            }
        }
        Context::STATIC
    }

    fn should_destroy(&self, candidate: DestroyCandidate) -> bool {
        candidate.remaining_parents == 0 && !candidate.context.is_static()
    }

    fn delegates_to_parent(&self) -> bool {
        true
    }
}
