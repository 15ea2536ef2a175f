use crate::{
    instances::{InstanceArena, InstanceStatus, SharedArena},
    maybe::{self, Step},
    DestroyCandidate, DynSvc, InjectError, InjectResult, InstanceId, MaybeAsync, Service, Svc,
};
use std::mem;
use tracing::debug;

/// Callbacks a service runs after construction and before destruction.
///
/// Register them with
/// [`ProviderDescriptor::lifecycle`](crate::ProviderDescriptor::lifecycle).
/// Both default to doing nothing.
///
/// ```
/// use graph_injector::{class, InjectResult, Injector, Lifecycle, MaybeAsync, Svc};
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// #[derive(Default)]
/// struct Pool {
///     open: AtomicBool,
/// }
///
/// impl Lifecycle for Pool {
///     fn on_init(self: Svc<Self>) -> MaybeAsync<InjectResult<()>> {
///         self.open.store(true, Ordering::SeqCst);
///         MaybeAsync::ready(Ok(()))
///     }
/// }
///
/// let mut builder = Injector::builder();
/// builder.provide(class(Pool::default).lifecycle::<Pool>());
///
/// let injector = builder.build().unwrap();
/// let pool: Svc<Pool> = injector.get().unwrap();
/// assert!(pool.open.load(Ordering::SeqCst));
/// ```
pub trait Lifecycle: Service + Sized {
    /// Called once after the instance is constructed.
    fn on_init(self: Svc<Self>) -> MaybeAsync<InjectResult<()>> {
        MaybeAsync::ready(Ok(()))
    }

    /// Called once when the instance is destroyed.
    fn on_destroy(self: Svc<Self>) -> MaybeAsync<InjectResult<()>> {
        MaybeAsync::ready(Ok(()))
    }
}

/// Collects the init callbacks due once `root` is constructed: those of
/// every cycle member waiting on it, closer first, then its own. Each
/// instance is visited at most once. Also returns the values to publish once
/// every callback succeeded.
pub(crate) fn collect_init(
    arena: &mut InstanceArena,
    root: InstanceId,
    value: &DynSvc,
) -> (Vec<Step>, Vec<(InstanceId, DynSvc)>) {
    let mut order = Vec::new();
    visit(arena, root, &mut order);

    let mut steps: Vec<Step> = Vec::new();
    let mut published = Vec::with_capacity(order.len());
    for id in order {
        let Some(instance) = arena.get_mut(id) else {
            continue;
        };
        instance.deferred_init = false;
        let value = if id == root {
            value.clone()
        } else {
            match &instance.constructed {
                Some(value) => value.clone(),
                None => continue,
            }
        };
        for callback in mem::take(&mut instance.init) {
            let value = value.clone();
            steps.push(Box::new(move || callback(value)));
        }
        published.push((id, value));
    }
    (steps, published)
}

fn visit(arena: &mut InstanceArena, id: InstanceId, order: &mut Vec<InstanceId>) {
    let chain = match arena.get_mut(id) {
        Some(instance) if !instance.initialized => {
            instance.initialized = true;
            instance.chain.clone()
        }
        _ => return,
    };
    for member in chain {
        visit(arena, member, order);
    }
    order.push(id);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DestroyReason {
    /// Requested directly, or by tearing down the injector.
    Explicit,
    /// The given parent was destroyed.
    Cascade(InstanceId),
}

/// Whether a child should follow its destroyed parent.
fn should_cascade(arena: &InstanceArena, id: InstanceId, parent: InstanceId) -> bool {
    let Some(instance) = arena.get(id) else {
        return false;
    };
    let remaining = instance
        .parents
        .iter()
        .filter(|other| **other != parent)
        .count();

    if instance.definition.is_destroyed() && remaining == 0 {
        return true;
    }

    // The only parent left is the other half of a circular pair.
    if instance.circular && remaining == 0 && instance.parents.contains(&parent) {
        if let Some(partner) = arena.get(parent) {
            if partner.circular && partner.parents.contains(&id) {
                return true;
            }
        }
    }

    instance.definition.scope().should_destroy(DestroyCandidate {
        context: instance.context,
        remaining_parents: remaining,
    })
}

/// Destroys an instance: runs its destroy callbacks, cascades to its
/// children and frees it.
pub(crate) fn destroy(arena: &SharedArena, id: InstanceId, reason: DestroyReason) -> MaybeAsync<InjectResult<()>> {
    let (value, callbacks, children, token) = {
        let mut guard = arena.lock();
        let Some(instance) = guard.get(id) else {
            return MaybeAsync::ready(Ok(()));
        };
        match &instance.status {
            InstanceStatus::Destroyed => return MaybeAsync::ready(Ok(())),
            InstanceStatus::Pending { .. } => {
                return MaybeAsync::ready(Err(InjectError::InstancePending {
                    token: instance.definition.token().clone(),
                }))
            }
            InstanceStatus::Unknown | InstanceStatus::Resolved(_) => {}
        }
        if let DestroyReason::Cascade(parent) = reason {
            let follow = should_cascade(&guard, id, parent);
            if let Some(instance) = guard.get_mut(id) {
                instance.parents.remove(&parent);
            }
            if !follow {
                return MaybeAsync::ready(Ok(()));
            }
        }

        let Some(instance) = guard.get_mut(id) else {
            return MaybeAsync::ready(Ok(()));
        };
        let value = match mem::replace(&mut instance.status, InstanceStatus::Destroyed) {
            InstanceStatus::Resolved(value) => Some(value),
            _ => None,
        };
        let callbacks = mem::take(&mut instance.destroy);
        let children: Vec<InstanceId> = instance.children.iter().copied().collect();
        let token = instance.definition.token().clone();

        let mut instances = instance.definition.instances().lock();
        if instances.get(&instance.context) == Some(&id) {
            instances.remove(&instance.context);
        }
        (value, callbacks, children, token)
    };
    debug!(token = %token, children = children.len(), "destroying instance");

    let mut steps: Vec<Step> = Vec::new();
    if let Some(value) = value {
        for callback in callbacks {
            let value = value.clone();
            steps.push(Box::new(move || callback(value)));
        }
    }
    for child in children {
        let arena = arena.clone();
        steps.push(Box::new(move || destroy(&arena, child, DestroyReason::Cascade(id))));
    }
    let arena = arena.clone();
    steps.push(Box::new(move || {
        let mut guard = arena.lock();
        let parents: Vec<InstanceId> = guard
            .get(id)
            .map(|instance| instance.parents.iter().copied().collect())
            .unwrap_or_default();
        for parent in parents {
            if let Some(instance) = guard.get_mut(parent) {
                instance.children.remove(&id);
            }
        }
        guard.remove(id);
        MaybeAsync::ready(Ok(()))
    }));

    maybe::sequence(steps)
}

/// Destroys the instance that produced `value`, if it came from this arena.
pub(crate) fn destroy_value<T: Service>(arena: &SharedArena, value: &Svc<T>) -> MaybeAsync<InjectResult<()>> {
    let value: DynSvc = value.clone();
    let id = arena.lock().find_by_value(&value);
    match id {
        Some(id) => destroy(arena, id, DestroyReason::Explicit),
        None => MaybeAsync::ready(Ok(())),
    }
}
