//! Turns a requested token into an instance.
//!
//! Resolution runs in stages, each wrapped by its own list of hooks:
//!
//! 1. the injector hooks and the injection-site hooks wrap provider lookup,
//! 2. the hooks of the provider record wrap definition selection,
//! 3. the hooks of the selected definition wrap instance creation.
//!
//! Every stage stays synchronous until something actually suspends.

use crate::{
    hooks::{run_pipeline, select_hooks, Resolution},
    instances::{Handoff, Instance, InstanceArena, InstanceStatus, SharedArena},
    lifecycle, maybe, DynSvc, InjectError, InjectResult, Injected, InjectionArgument, Injector,
    InstanceId, MaybeAsync, ProviderDefinition, ProviderKind, ProviderRecord, Session, Shell,
    Token,
};
use futures::{
    channel::oneshot,
    future::{BoxFuture, FutureExt},
};
use std::{collections::HashSet, sync::Arc, thread};
use tracing::{debug, trace};

/// Resolves an injection on an injector. `parent` is the session of the
/// provider the injection belongs to, if any.
pub(crate) fn inject(
    injector: &Injector,
    argument: &InjectionArgument,
    parent: Option<&Session>,
) -> Resolution {
    if let Err(error) = injector.ensure_alive() {
        return MaybeAsync::ready(Err(error));
    }

    let session = Session::new(
        argument.token().clone(),
        injector.clone(),
        argument.metadata().clone(),
        parent,
    );
    trace!(token = %argument.token(), injector = injector.name(), "resolving");

    let mut hooks = select_hooks(injector.hooks(), &session);
    hooks.extend(select_hooks(argument.hooks(), &session));
    run_pipeline(hooks, session, resolve_provider)
}

/// Finds the provider record for the session's token unless a hook already
/// bound one, then continues with the provider stage.
pub(crate) fn resolve_provider(session: Session) -> Resolution {
    if let Some(record) = session.provider() {
        return match record.host() {
            Ok(host) => run_provider(session, record, host),
            Err(error) => MaybeAsync::ready(Err(error)),
        };
    }

    let start = if session.flags().skip_self {
        session.injector().parent()
    } else {
        Some(session.injector())
    };
    match start {
        Some(injector) => lookup_from(session, injector),
        None => no_provider(&session),
    }
}

fn no_provider(session: &Session) -> Resolution {
    MaybeAsync::ready(Err(InjectError::NoProvider {
        token: session.token(),
    }))
}

/// Walks up the injector chain starting at `injector`.
fn lookup_from(session: Session, mut injector: Injector) -> Resolution {
    let token = session.token();
    let self_only = session.flags().self_only;
    loop {
        match injector.find_record(&token) {
            Ok(Some(record)) => {
                let host = match record.host() {
                    Ok(host) => host,
                    Err(error) => return MaybeAsync::ready(Err(error)),
                };
                trace!(token = %token, injector = injector.name(), "found provider");
                session.bind_provider(host, record.clone());
                return run_provider(session, record, injector);
            }
            Ok(None) => {}
            Err(error) => return MaybeAsync::ready(Err(error)),
        }

        if self_only {
            break;
        }
        match injector.parent() {
            Some(parent) => injector = parent,
            None => break,
        }
    }

    no_provider(&session)
}

/// Runs the provider hooks around definition selection. `found_at` is where
/// the lookup found the record, so a record without a matching definition
/// can continue the lookup from there.
fn run_provider(session: Session, record: Arc<ProviderRecord>, found_at: Injector) -> Resolution {
    let hooks = select_hooks(record.hooks(), &session);
    run_pipeline(hooks, session, move |session| select_definition(session, found_at))
}

fn select_definition(session: Session, found_at: Injector) -> Resolution {
    let Some(record) = session.provider() else {
        // A provider hook rebound the token.
        return resolve_provider(session);
    };

    let definition = session.definition().or_else(|| record.select(&session));
    match definition {
        Some(definition) => {
            session.set_definition(definition.clone());
            run_definition(session, definition)
        }
        None => {
            trace!(token = %record.token(), "no definition accepts the session");
            session.clear_provider();
            if session.flags().self_only {
                return no_provider(&session);
            }
            match found_at.parent() {
                Some(parent) => lookup_from(session, parent),
                None => no_provider(&session),
            }
        }
    }
}

fn run_definition(session: Session, definition: Arc<ProviderDefinition>) -> Resolution {
    let hooks = select_hooks(definition.hooks(), &session);
    run_pipeline(hooks, session, |session| match session.definition() {
        Some(definition) => get_or_create_instance(session, definition),
        // A definition hook rebound the token.
        None => resolve_provider(session),
    })
}

/// Resolves every definition accepting the session from the first injector
/// up the chain that has a record for the token.
pub(crate) fn resolve_all(session: Session) -> Resolution {
    let token = session.token();
    let self_only = session.flags().self_only;
    let mut next = if session.flags().skip_self {
        session.injector().parent()
    } else {
        Some(session.injector())
    };

    let mut found = None;
    while let Some(injector) = next {
        match injector.find_record(&token) {
            Ok(Some(record)) => {
                found = Some(record);
                break;
            }
            Ok(None) => {}
            Err(error) => return MaybeAsync::ready(Err(error)),
        }
        next = if self_only { None } else { injector.parent() };
    }

    let Some(record) = found else {
        return MaybeAsync::ready(Ok(Injected::Many(Vec::new())));
    };
    let host = match record.host() {
        Ok(host) => host,
        Err(error) => return MaybeAsync::ready(Err(error)),
    };

    let resolutions = record
        .matching(&session)
        .into_iter()
        .map(|definition| {
            let fork = session.fork();
            fork.bind_provider(host.clone(), record.clone());
            fork.set_definition(definition);
            run_provider(fork, record.clone(), host.clone())
        })
        .collect();
    maybe::join_all(resolutions)
        .map(|results| results.into_iter().collect::<InjectResult<Vec<_>>>().map(Injected::Many))
}

enum Lookup {
    Done(Resolution),
    Construct(InstanceId),
}

enum Status {
    Resolved(DynSvc),
    Unknown,
    Pending,
    Destroyed,
}

/// Finds or creates the instance of a definition for the session's context
/// and produces its value.
fn get_or_create_instance(session: Session, definition: Arc<ProviderDefinition>) -> Resolution {
    let injector = session.injector();
    let scope = definition.scope().clone();
    let mut context = scope.context(&session);
    if scope.can_be_overridden() {
        if let Some(overridden) = session.context() {
            context = overridden;
        }
    }

    let shared_arena = injector.arena();
    let lookup = {
        let mut arena = shared_arena.lock();
        let id = {
            let mut instances = definition.instances().lock();
            match instances.get(&context).copied().filter(|id| arena.contains(*id)) {
                Some(id) => id,
                None => {
                    let id = arena.insert(Instance::new(context, definition.clone()));
                    instances.insert(context, id);
                    id
                }
            }
        };
        if let Some(parent) = session.parent().and_then(Session::instance) {
            arena.link(parent, id);
        }
        session.set_instance(id);

        let status = match arena.get(id).map(|instance| &instance.status) {
            Some(InstanceStatus::Resolved(value)) => Status::Resolved(value.clone()),
            Some(InstanceStatus::Unknown) => Status::Unknown,
            Some(InstanceStatus::Pending { .. }) => Status::Pending,
            Some(InstanceStatus::Destroyed) | None => Status::Destroyed,
        };
        match status {
            Status::Resolved(value) => Lookup::Done(MaybeAsync::ready(Ok(Injected::Value(value)))),
            Status::Unknown => {
                let mut init = definition.on_init().to_vec();
                init.extend(session.init_hooks());
                let mut destroy = definition.on_destroy().to_vec();
                destroy.extend(session.destroy_hooks());
                if let Some(instance) = arena.get_mut(id) {
                    instance.status = InstanceStatus::Pending { shared: None };
                    instance.owner = Some(thread::current().id());
                    instance.init = init;
                    instance.destroy = destroy;
                }
                Lookup::Construct(id)
            }
            Status::Pending => {
                let position = session
                    .ancestors()
                    .position(|ancestor| ancestor.instance() == Some(id));
                match position {
                    Some(position) => Lookup::Done(close_cycle(
                        &mut arena,
                        &session,
                        &definition,
                        id,
                        position,
                    )),
                    None => {
                        trace!(token = %definition.token(), "joining construction in progress");
                        let ancestors: Vec<InstanceId> =
                            session.ancestors().filter_map(Session::instance).collect();
                        Lookup::Done(join(&mut arena, &shared_arena, &ancestors, id).unwrap_or_else(
                            || {
                                MaybeAsync::ready(Err(InjectError::InstancePending {
                                    token: definition.token().clone(),
                                }))
                            },
                        ))
                    }
                }
            }
            Status::Destroyed => Lookup::Done(MaybeAsync::ready(Err(
                InjectError::InjectorDestroyed {
                    injector: injector.name().to_string(),
                },
            ))),
        }
    };

    match lookup {
        Lookup::Done(resolution) => resolution,
        Lookup::Construct(id) => construct(session, definition, id),
    }
}

/// Joins a construction that is not part of the requesting resolution.
/// `ancestors` are the instances that resolution is nested in.
///
/// A suspended construction is joined through its shared future, one still
/// running synchronously on another thread through a handoff. A synchronous
/// construction on this thread cannot be waited on and yields `None`.
fn join(
    guard: &mut InstanceArena,
    arena: &SharedArena,
    ancestors: &[InstanceId],
    id: InstanceId,
) -> Option<Resolution> {
    let instance = guard.get_mut(id)?;
    if instance.is_pending() {
        if let Some(value) = instance.constructed.clone() {
            return join_cycle_root(guard, arena, ancestors, id, value);
        }
    }

    let running: BoxFuture<'static, InjectResult<Injected>> = match &instance.status {
        InstanceStatus::Resolved(value) => {
            return Some(MaybeAsync::ready(Ok(Injected::Value(value.clone()))));
        }
        InstanceStatus::Pending {
            shared: Some(shared),
        } => shared.clone().boxed(),
        InstanceStatus::Pending { shared: None }
            if instance.owner != Some(thread::current().id()) =>
        {
            let (sender, receiver) = oneshot::channel();
            instance.waiters.push(sender);
            let token = instance.definition.token().clone();
            async move {
                match receiver.await {
                    Ok(Handoff::Done(result)) => result,
                    Ok(Handoff::Running(shared)) => shared.await,
                    Err(_) => Err(InjectError::InstancePending { token }),
                }
            }
            .boxed()
        }
        _ => return None,
    };
    instance.parallel = true;

    let arena = arena.clone();
    let ancestors = ancestors.to_vec();
    Some(MaybeAsync::deferred(async move {
        let injected = running.await?;
        settle(&arena, &ancestors, id, injected).await
    }))
}

/// A joined construction can finish as a cycle member whose root has not
/// published it yet. Waits for the root in that case.
async fn settle(
    arena: &SharedArena,
    ancestors: &[InstanceId],
    id: InstanceId,
    injected: Injected,
) -> InjectResult<Injected> {
    let waiting = {
        let mut guard = arena.lock();
        let member = guard
            .get(id)
            .filter(|instance| instance.is_pending())
            .and_then(|instance| {
                let token = instance.definition.token().clone();
                instance.constructed.clone().map(|value| (value, token))
            });
        member.map(|(value, token)| (join_cycle_root(&mut guard, arena, ancestors, id, value), token))
    };
    match waiting {
        None => Ok(injected),
        Some((Some(resolution), _)) => resolution.into_future().await,
        Some((None, token)) => Err(InjectError::InstancePending { token }),
    }
}

/// The instance whose completion publishes a waiting cycle member.
fn cycle_root(arena: &InstanceArena, id: InstanceId) -> InstanceId {
    let mut seen = HashSet::new();
    let mut current = id;
    while seen.insert(current) {
        let next = arena
            .get(current)
            .filter(|instance| instance.constructed.is_some())
            .and_then(|instance| instance.cycle_root);
        match next {
            Some(root) => current = root,
            None => break,
        }
    }
    current
}

/// Resolves a cycle member that is constructed but waits for the init of
/// its cycle. Resolutions nested in the root get the value right away;
/// everything else waits until the root published it.
fn join_cycle_root(
    guard: &mut InstanceArena,
    arena: &SharedArena,
    ancestors: &[InstanceId],
    id: InstanceId,
    value: DynSvc,
) -> Option<Resolution> {
    let root = cycle_root(guard, id);
    if root == id || ancestors.contains(&root) {
        return Some(MaybeAsync::ready(Ok(Injected::Value(value))));
    }
    let waiting = join(guard, arena, ancestors, root)?;
    Some(waiting.map(move |result| result.map(|_| Injected::Value(value))))
}

/// Handles a request for an instance that is pending further up the same
/// resolution. Class providers hand out a shell and defer the init of every
/// instance between here and the root of the cycle until the root is done.
fn close_cycle(
    arena: &mut InstanceArena,
    session: &Session,
    definition: &ProviderDefinition,
    id: InstanceId,
    position: usize,
) -> Resolution {
    let token = definition.token().clone();
    if definition.kind() != ProviderKind::Class {
        let mut cycle = vec![token.clone()];
        cycle.extend(session.ancestors().take(position + 1).map(Session::token));
        return MaybeAsync::ready(Err(InjectError::CircularReference { token, cycle }));
    }

    let mut members: Vec<InstanceId> = Vec::new();
    for member in session.ancestors().take(position).filter_map(Session::instance) {
        if member != id && !members.contains(&member) {
            members.push(member);
        }
    }
    for member in &members {
        if let Some(instance) = arena.get_mut(*member) {
            instance.circular = true;
            instance.deferred_init = true;
            instance.cycle_root.get_or_insert(id);
        }
    }

    let Some(root) = arena.get_mut(id) else {
        return MaybeAsync::ready(Err(InjectError::Internal(
            "cycle root vanished while locked".to_string(),
        )));
    };
    root.circular = true;
    for member in members {
        if !root.chain.contains(&member) {
            root.chain.push(member);
        }
    }
    let shell = root
        .shell
        .get_or_insert_with(|| Shell::new(token.clone()))
        .clone();
    debug!(token = %token, "closing dependency cycle with a shell");
    MaybeAsync::ready(Ok(Injected::Shell(shell)))
}

/// Converts a missing provider for a direct dependency into an error that
/// names the provider that needed it.
fn dependency_error(target: Token, dependency: Token, error: InjectError) -> InjectError {
    match error {
        InjectError::NoProvider { token } if token == dependency => {
            InjectError::MissingDependency {
                token: target,
                dependency: token,
            }
        }
        error => error,
    }
}

fn construct(session: Session, definition: Arc<ProviderDefinition>, id: InstanceId) -> Resolution {
    debug!(token = %definition.token(), kind = ?definition.kind(), "constructing instance");
    let injector = session.injector();
    let arena = injector.arena();

    let Some(constructor) = definition.constructor().cloned() else {
        let error = InjectError::InvalidDescriptor {
            token: definition.token().clone(),
            reason: "the provider has no constructor".to_string(),
        };
        arena.lock().reset_cycle(id, &error);
        return MaybeAsync::ready(Err(error));
    };

    let mut dependencies = Vec::with_capacity(definition.arguments().len());
    for argument in definition.arguments() {
        let target = definition.token().clone();
        let dependency = argument.token().clone();
        let resolution = inject(&injector, argument, Some(&session))
            .map(move |result| result.map_err(|error| dependency_error(target, dependency, error)));
        match resolution {
            MaybeAsync::Ready(Err(error)) => {
                arena.lock().reset_cycle(id, &error);
                return MaybeAsync::ready(Err(error));
            }
            resolution => dependencies.push(resolution),
        }
    }

    let arguments = definition.arguments().to_vec();
    let finalize_injector = injector.clone();
    let work = maybe::join_all(dependencies)
        .then(move |values| match values.into_iter().collect::<InjectResult<Vec<_>>>() {
            Ok(values) => constructor(&arguments, values),
            Err(error) => MaybeAsync::ready(Err(error)),
        })
        .and_then(move |value| finalize(&finalize_injector, id, value));

    match work {
        MaybeAsync::Ready(result) => {
            if let Err(error) = &result {
                arena.lock().reset_cycle(id, error);
            }
            MaybeAsync::Ready(result)
        }
        MaybeAsync::Deferred(future) => {
            let reset_arena = arena.clone();
            let shared = async move {
                let result = future.await;
                if let Err(error) = &result {
                    reset_arena.lock().reset_cycle(id, error);
                }
                result
            }
            .boxed()
            .shared();

            if let Some(instance) = arena.lock().get_mut(id) {
                if instance.is_pending() {
                    instance.status = InstanceStatus::Pending {
                        shared: Some(shared.clone()),
                    };
                    instance.notify(|| Handoff::Running(shared.clone()));
                }
            }
            trace!(token = %definition.token(), "construction suspended");
            MaybeAsync::Deferred(shared.boxed())
        }
    }
}

/// Stores a constructed value, fills the shell handed out to a cycle and
/// runs the init callbacks that are due. Values are published only after
/// their init succeeded.
fn finalize(injector: &Injector, id: InstanceId, value: DynSvc) -> Resolution {
    let arena = injector.arena();
    let (steps, published) = {
        let mut guard = arena.lock();
        guard.register_value(id, &value);
        let Some(instance) = guard.get_mut(id) else {
            return MaybeAsync::ready(Err(InjectError::Internal(
                "constructed instance vanished".to_string(),
            )));
        };
        if let Some(shell) = &instance.shell {
            shell.fill(value.clone());
        }
        if instance.deferred_init {
            // The root of the cycle runs the init and publishes the value.
            instance.constructed = Some(value.clone());
            return MaybeAsync::ready(Ok(Injected::Value(value)));
        }
        lifecycle::collect_init(&mut guard, id, &value)
    };

    maybe::sequence(steps).and_then(move |()| {
        let mut guard = arena.lock();
        for (member, member_value) in published {
            if let Some(instance) = guard.get_mut(member) {
                instance.constructed = None;
                instance.owner = None;
                instance.status = InstanceStatus::Resolved(member_value.clone());
                instance.notify(|| Handoff::Done(Ok(Injected::Value(member_value.clone()))));
            }
        }
        MaybeAsync::ready(Ok(Injected::Value(value)))
    })
}
