use crate::{
    Context, DynSvc, InjectError, InjectResult, Injected, InstanceId, LifecycleFn,
    ProviderDefinition, Shell,
};
use futures::{
    channel::oneshot,
    future::{BoxFuture, Shared},
};
use std::{collections::HashSet, sync::Arc, thread::ThreadId};

pub(crate) type SharedResolution = Shared<BoxFuture<'static, InjectResult<Injected>>>;

pub(crate) enum InstanceStatus {
    Unknown,
    Pending { shared: Option<SharedResolution> },
    Resolved(DynSvc),
    Destroyed,
}

/// What a caller waiting on another thread's construction receives.
pub(crate) enum Handoff {
    /// The construction finished.
    Done(InjectResult<Injected>),
    /// The construction suspended; join its future.
    Running(SharedResolution),
}

/// The state of a definition materialized under one context.
pub(crate) struct Instance {
    pub(crate) context: Context,
    pub(crate) definition: Arc<ProviderDefinition>,
    pub(crate) status: InstanceStatus,
    /// Took part in a dependency cycle.
    pub(crate) circular: bool,
    /// Was requested again while its construction was suspended.
    pub(crate) parallel: bool,
    /// Its init callbacks run when the root of its cycle finishes.
    pub(crate) deferred_init: bool,
    pub(crate) initialized: bool,
    pub(crate) shell: Option<Shell>,
    /// Cycle members whose init waits for this instance, closer first.
    pub(crate) chain: Vec<InstanceId>,
    /// The instance whose completion publishes this one.
    pub(crate) cycle_root: Option<InstanceId>,
    /// The value of a cycle member that waits for its root.
    pub(crate) constructed: Option<DynSvc>,
    /// The thread running the synchronous part of the construction.
    pub(crate) owner: Option<ThreadId>,
    pub(crate) waiters: Vec<oneshot::Sender<Handoff>>,
    pub(crate) init: Vec<LifecycleFn>,
    pub(crate) destroy: Vec<LifecycleFn>,
    pub(crate) parents: HashSet<InstanceId>,
    pub(crate) children: HashSet<InstanceId>,
}

impl Instance {
    pub(crate) fn new(context: Context, definition: Arc<ProviderDefinition>) -> Self {
        Instance {
            context,
            definition,
            status: InstanceStatus::Unknown,
            circular: false,
            parallel: false,
            deferred_init: false,
            initialized: false,
            shell: None,
            chain: Vec::new(),
            cycle_root: None,
            constructed: None,
            owner: None,
            waiters: Vec::new(),
            init: Vec::new(),
            destroy: Vec::new(),
            parents: HashSet::new(),
            children: HashSet::new(),
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        matches!(self.status, InstanceStatus::Pending { .. })
    }

    /// Hands the outcome to every caller waiting from another thread.
    pub(crate) fn notify<F>(&mut self, handoff: F)
    where
        F: Fn() -> Handoff,
    {
        for waiter in self.waiters.drain(..) {
            // A waiter that gave up dropped its receiver.
            let _ = waiter.send(handoff());
        }
    }

    /// Fails the waiters and returns a failed construction to its initial
    /// state so the next resolution starts over.
    pub(crate) fn reset(&mut self, error: &InjectError) {
        self.notify(|| Handoff::Done(Err(error.clone())));
        self.status = InstanceStatus::Unknown;
        self.circular = false;
        self.parallel = false;
        self.deferred_init = false;
        self.initialized = false;
        self.shell = None;
        self.chain.clear();
        self.cycle_root = None;
        self.constructed = None;
        self.owner = None;
        self.init.clear();
        self.destroy.clear();
    }
}
