use crate::{
    hooks::HookRecord,
    instances::{InstanceArena, InstanceId, SharedArena},
    lifecycle::{self, DestroyReason},
    maybe::{self, Step},
    resolver, InjectError, InjectResult, Injected, InjectionArgument, InjectorBuilder,
    MaybeAsync, ModuleId, ProvidedIn, ProviderDescriptor, ProviderRecord, Request, Resolution,
    Service, Svc, Token,
};
use parking_lot::{Mutex, RwLock};
use std::{
    borrow::Cow,
    collections::HashMap,
    fmt::{Debug, Formatter},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
};
use tracing::{debug, trace};

static NEXT_INJECTOR: AtomicU64 = AtomicU64::new(0);

/// How an injector reaches its parent.
pub(crate) enum ParentLink {
    /// A child built at runtime keeps its parent alive.
    Strong(Injector),
    /// A module injector is owned by the injector that imported it.
    Weak(Weak<InjectorInner>),
}

/// Everything needed to create an injector.
pub(crate) struct InjectorParts {
    pub(crate) name: Cow<'static, str>,
    pub(crate) parent: Option<ParentLink>,
    pub(crate) providers: Vec<ProviderDescriptor>,
    pub(crate) hooks: Vec<HookRecord>,
    pub(crate) arena: SharedArena,
    pub(crate) module: Option<ModuleId>,
}

pub(crate) struct InjectorInner {
    id: u64,
    name: Cow<'static, str>,
    parent: Option<ParentLink>,
    facade: Option<Injector>,
    records: HashMap<Token, Arc<ProviderRecord>>,
    imported: RwLock<HashMap<Token, Arc<ProviderRecord>>>,
    tree_shaken: Mutex<HashMap<Token, Option<Arc<ProviderRecord>>>>,
    hooks: Vec<HookRecord>,
    arena: SharedArena,
    module: Option<ModuleId>,
    children: Mutex<Vec<Injector>>,
    destroyed: AtomicBool,
}

/// A container that resolves requests into services.
///
/// An injector owns the provider records registered on it, references the
/// records exported to it by imported modules and falls back to its parent
/// for everything else. Every injector of a hierarchy shares one instance
/// arena, so instances created through different injectors can depend on
/// each other.
///
/// Cloning an injector is cheap and yields a handle to the same injector.
#[derive(Clone)]
pub struct Injector {
    inner: Arc<InjectorInner>,
}

impl Injector {
    /// Creates a builder for an injector.
    ///
    /// ```
    /// use graph_injector::{value, Injector, Svc};
    ///
    /// let mut builder = Injector::builder();
    /// builder.provide(value(42_u32));
    ///
    /// let injector = builder.build().unwrap();
    /// let answer: Svc<u32> = injector.get().unwrap();
    /// assert_eq!(42, *answer);
    /// ```
    #[must_use]
    pub fn builder() -> InjectorBuilder {
        InjectorBuilder::default()
    }

    /// Creates a builder for a child of this injector. The child looks up
    /// everything it does not provide itself in this injector.
    #[must_use]
    pub fn child(&self) -> InjectorBuilder {
        let mut builder = InjectorBuilder::default();
        builder.parent(self.clone());
        builder
    }

    /// Creates an injector and its provider records.
    pub(crate) fn from_parts(parts: InjectorParts) -> InjectResult<Self> {
        for descriptor in &parts.providers {
            descriptor.validate()?;
        }

        let InjectorParts {
            name,
            parent,
            providers,
            hooks,
            arena,
            module,
        } = parts;
        let inner = Arc::new_cyclic(|weak: &Weak<InjectorInner>| {
            let mut records: HashMap<Token, ProviderRecord> = HashMap::new();
            for descriptor in providers {
                records
                    .entry(descriptor.token().clone())
                    .or_insert_with(|| ProviderRecord::new(descriptor.token().clone(), weak.clone()))
                    .add(descriptor);
            }

            InjectorInner {
                id: NEXT_INJECTOR.fetch_add(1, Ordering::Relaxed),
                name,
                parent,
                facade: None,
                records: records
                    .into_iter()
                    .map(|(token, record)| (token, Arc::new(record)))
                    .collect(),
                imported: RwLock::default(),
                tree_shaken: Mutex::default(),
                hooks,
                arena,
                module,
                children: Mutex::default(),
                destroyed: AtomicBool::new(false),
            }
        });

        debug!(
            injector = inner.name.as_ref(),
            records = inner.records.len(),
            "built injector"
        );
        Ok(Injector { inner })
    }

    /// Creates an injector that forwards every lookup to `target`. Used for
    /// the second import of a module that is already compiled.
    pub(crate) fn facade(target: &Injector, importer: &Injector) -> Self {
        trace!(injector = target.name(), "creating facade");
        let inner = InjectorInner {
            id: NEXT_INJECTOR.fetch_add(1, Ordering::Relaxed),
            name: Cow::Owned(format!("{} (facade)", target.name())),
            parent: Some(ParentLink::Weak(importer.downgrade())),
            facade: Some(target.clone()),
            records: HashMap::new(),
            imported: RwLock::default(),
            tree_shaken: Mutex::default(),
            hooks: Vec::new(),
            arena: target.arena(),
            module: target.inner.module,
            children: Mutex::default(),
            destroyed: AtomicBool::new(false),
        };
        Injector {
            inner: Arc::new(inner),
        }
    }

    pub(crate) fn upgrade(weak: &Weak<InjectorInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Injector { inner })
    }

    pub(crate) fn downgrade(&self) -> Weak<InjectorInner> {
        Arc::downgrade(&self.inner)
    }

    /// Checks whether two handles refer to the same injector.
    #[must_use]
    pub fn ptr_eq(&self, other: &Injector) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The name of this injector, for diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.name.as_ref()
    }

    /// The parent injector, if there is one and it is still alive.
    #[must_use]
    pub fn parent(&self) -> Option<Injector> {
        match self.inner.parent.as_ref()? {
            ParentLink::Strong(parent) => Some(parent.clone()),
            ParentLink::Weak(parent) => Injector::upgrade(parent),
        }
    }

    /// The injector this one forwards lookups to, if it is a facade.
    #[must_use]
    pub fn facade_target(&self) -> Option<&Injector> {
        self.inner.facade.as_ref()
    }

    /// The module this injector was compiled from.
    #[must_use]
    pub fn module(&self) -> Option<ModuleId> {
        self.inner.module
    }

    /// Checks whether [`destroy`](Injector::destroy) was called.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_alive(&self) -> InjectResult<()> {
        if self.is_destroyed() {
            return Err(InjectError::InjectorDestroyed {
                injector: self.name().to_string(),
            });
        }
        match &self.inner.facade {
            Some(target) => target.ensure_alive(),
            None => Ok(()),
        }
    }

    pub(crate) fn hooks(&self) -> &[HookRecord] {
        &self.inner.hooks
    }

    pub(crate) fn arena(&self) -> SharedArena {
        self.inner.arena.clone()
    }

    /// The number of live instances in this injector's hierarchy.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.inner.arena.lock().len()
    }

    /// Gets the record this injector has for a token, either its own or one
    /// exported to it. Does not look at the parent.
    #[must_use]
    pub fn record(&self, token: &Token) -> Option<Arc<ProviderRecord>> {
        if let Some(target) = &self.inner.facade {
            return target.record(token);
        }
        self.inner
            .records
            .get(token)
            .cloned()
            .or_else(|| self.inner.imported.read().get(token).cloned())
    }

    /// Looks a token up in this injector: own records, then imported ones,
    /// then the token's tree-shakable provider if this injector accepts it.
    pub(crate) fn find_record(&self, token: &Token) -> InjectResult<Option<Arc<ProviderRecord>>> {
        if let Some(target) = &self.inner.facade {
            return target.find_record(token);
        }
        if let Some(record) = self.record(token) {
            return Ok(Some(record));
        }
        let Some(tree_shakable) = token.tree_shakable() else {
            return Ok(None);
        };

        let mut tree_shaken = self.inner.tree_shaken.lock();
        if let Some(cached) = tree_shaken.get(token) {
            return Ok(cached.clone());
        }

        let accepts = match tree_shakable.provided_in {
            ProvidedIn::Root => self.inner.parent.is_none(),
            ProvidedIn::Any => true,
            ProvidedIn::Module(module) => self.inner.module == Some(module),
        };
        let record = if accepts {
            tree_shakable.descriptor.validate()?;
            let mut record = ProviderRecord::new(token.clone(), self.downgrade());
            record.add(tree_shakable.descriptor.clone());
            debug!(token = %token, injector = self.name(), "registered tree-shakable provider");
            Some(Arc::new(record))
        } else {
            None
        };
        tree_shaken.insert(token.clone(), record.clone());
        Ok(record)
    }

    /// Makes a record of another injector visible here. A later import of
    /// the same token replaces an earlier one.
    pub(crate) fn import_record(&self, record: Arc<ProviderRecord>) {
        self.inner
            .imported
            .write()
            .insert(record.token().clone(), record);
    }

    /// The injectors compiled for the modules this one imports, facades
    /// included.
    #[must_use]
    pub fn children(&self) -> Vec<Injector> {
        self.inner.children.lock().clone()
    }

    /// Takes ownership of an injector compiled for an imported module.
    pub(crate) fn adopt(&self, child: Injector) {
        self.inner.children.lock().push(child);
    }

    /// The tokens of this injector's own records with an eager definition.
    pub(crate) fn eager_tokens(&self) -> Vec<Token> {
        let mut tokens: Vec<Token> = self
            .inner
            .records
            .values()
            .filter(|record| {
                record
                    .definitions()
                    .iter()
                    .any(|definition| definition.annotations().eager)
            })
            .map(|record| record.token().clone())
            .collect();
        tokens.sort_by(|a, b| a.name().cmp(b.name()));
        tokens
    }

    /// Resolves an injection without converting the result. The result is
    /// ready unless some part of the resolution suspended.
    pub fn resolve(&self, argument: InjectionArgument) -> Resolution {
        resolver::inject(self, &argument, None)
    }

    /// Gets a service. Any type implementing [`Request`] can be requested:
    /// `Svc<T>`, `Option<Svc<T>>`, `Vec<Svc<T>>`, `Lazy<R>` and more.
    ///
    /// Fails with [`InjectError::AsyncResolution`] if any provider involved
    /// suspended. Use [`get_async`](Injector::get_async) for those.
    ///
    /// ```
    /// use graph_injector::{class, value, Injector, Svc};
    ///
    /// struct Config {
    ///     port: u16,
    /// }
    ///
    /// struct Server {
    ///     config: Svc<Config>,
    /// }
    ///
    /// let mut builder = Injector::builder();
    /// builder.provide(value(Config { port: 8080 }));
    /// builder.provide(class(|config: Svc<Config>| Server { config }));
    ///
    /// let injector = builder.build().unwrap();
    /// let server: Svc<Server> = injector.get().unwrap();
    /// assert_eq!(8080, server.config.port);
    /// ```
    pub fn get<R: Request>(&self) -> InjectResult<R> {
        self.get_with(R::argument())
    }

    /// Gets a service for a customized injection.
    pub fn get_with<R: Request>(&self, argument: InjectionArgument) -> InjectResult<R> {
        let token = argument.token().clone();
        match self.resolve(argument) {
            MaybeAsync::Ready(result) => R::from_injected(&token, result?),
            MaybeAsync::Deferred(_) => Err(InjectError::AsyncResolution { token }),
        }
    }

    /// Gets a service, waiting for asynchronous providers.
    pub async fn get_async<R: Request>(&self) -> InjectResult<R> {
        self.get_with_async(R::argument()).await
    }

    /// Gets a service for a customized injection, waiting for asynchronous
    /// providers.
    pub async fn get_with_async<R: Request>(&self, argument: InjectionArgument) -> InjectResult<R> {
        let token = argument.token().clone();
        let injected = self.resolve(argument).into_future().await?;
        R::from_injected(&token, injected)
    }

    /// Gets the service registered under a token that is not the type's own,
    /// such as a named or unique token.
    ///
    /// ```
    /// use graph_injector::{value, Injector, Svc, Token};
    ///
    /// let mut builder = Injector::builder();
    /// builder.provide(value(String::from("postgres://")).provide(Token::named("database_url")));
    ///
    /// let injector = builder.build().unwrap();
    /// let url: Svc<String> = injector.get_token(Token::named("database_url")).unwrap();
    /// assert_eq!("postgres://", url.as_str());
    /// ```
    pub fn get_token<T: Service>(&self, token: Token) -> InjectResult<Svc<T>> {
        self.get_with(InjectionArgument::new(token))
    }

    /// Gets the service registered under a token, waiting for asynchronous
    /// providers.
    pub async fn get_token_async<T: Service>(&self, token: Token) -> InjectResult<Svc<T>> {
        self.get_with_async(InjectionArgument::new(token)).await
    }

    /// Destroys the instance that produced `service`, then every instance
    /// that only existed because of it.
    pub fn destroy_service<T: Service>(&self, service: &Svc<T>) -> MaybeAsync<InjectResult<()>> {
        lifecycle::destroy_value(&self.inner.arena, service)
    }

    /// Tears the injector down: every instance of its own records is
    /// destroyed, then every injector compiled for its imports. Resolving
    /// from a destroyed injector fails with
    /// [`InjectError::InjectorDestroyed`]. Destroying twice does nothing.
    pub fn destroy(&self) -> MaybeAsync<InjectResult<()>> {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return MaybeAsync::ready(Ok(()));
        }
        debug!(injector = self.name(), "destroying injector");

        let mut records: Vec<Arc<ProviderRecord>> = self.inner.records.values().cloned().collect();
        records.extend(self.inner.tree_shaken.lock().values().flatten().cloned());

        let mut steps: Vec<Step> = Vec::new();
        for record in records {
            for definition in record.definitions() {
                definition.mark_destroyed();
                let instances: Vec<InstanceId> =
                    definition.instances().lock().values().copied().collect();
                for id in instances {
                    let arena = self.arena();
                    steps.push(Box::new(move || {
                        lifecycle::destroy(&arena, id, DestroyReason::Explicit)
                    }));
                }
            }
        }
        for child in std::mem::take(&mut *self.inner.children.lock()) {
            steps.push(Box::new(move || child.destroy()));
        }
        maybe::sequence(steps)
    }

    /// Creates an arena for a new hierarchy.
    pub(crate) fn new_arena() -> SharedArena {
        Arc::new(Mutex::new(InstanceArena::default()))
    }

    /// Resolves an eager token as part of initialization.
    pub(crate) fn resolve_eager(&self, token: Token) -> MaybeAsync<InjectResult<()>> {
        trace!(token = %token, injector = self.name(), "resolving eager provider");
        self.resolve(InjectionArgument::new(token).with_hook(crate::hooks::all()))
            .map_ok(|_: Injected| ())
    }
}

impl Debug for Injector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Injector")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("records", &self.inner.records.len())
            .field("facade", &self.inner.facade.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{class, factory, factory_async, value, Lifecycle, Svc};
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn child_falls_back_to_parent() {
        let mut builder = Injector::builder();
        builder.provide(value(1_u8));
        let parent = builder.build().unwrap();

        let mut builder = parent.child();
        builder.provide(value(2_u16));
        let child = builder.build().unwrap();

        let from_parent: Svc<u8> = child.get().unwrap();
        let own: Svc<u16> = child.get().unwrap();
        assert_eq!(1, *from_parent);
        assert_eq!(2, *own);
        assert!(child.parent().unwrap().ptr_eq(&parent));
        assert!(matches!(
            parent.get::<Svc<u16>>(),
            Err(InjectError::NoProvider { .. })
        ));
    }

    #[test]
    fn get_fails_when_resolution_suspends() {
        let mut builder = Injector::builder();
        builder.provide(factory_async(|| async { 5_u32 }));
        let injector = builder.build().unwrap();

        assert!(matches!(
            injector.get::<Svc<u32>>(),
            Err(InjectError::AsyncResolution { .. })
        ));
    }

    #[tokio::test]
    async fn get_async_waits_for_the_factory() {
        let mut builder = Injector::builder();
        builder.provide(factory_async(|| async { 5_u32 }));
        let injector = builder.build().unwrap();

        let first: Svc<u32> = injector.get_async().await.unwrap();
        let second: Svc<u32> = injector.get().unwrap();
        assert!(Svc::ptr_eq(&first, &second));
    }

    #[test]
    fn invalid_descriptors_fail_the_build() {
        let mut builder = Injector::builder();
        builder.provide(class(|_: Svc<u8>| 1_u16).inject(Vec::new()));
        assert!(matches!(
            builder.build(),
            Err(InjectError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn destroyed_injectors_refuse_requests() {
        static DESTROYED: AtomicUsize = AtomicUsize::new(0);

        struct Connection;
        impl Lifecycle for Connection {
            fn on_destroy(self: Svc<Self>) -> MaybeAsync<InjectResult<()>> {
                DESTROYED.fetch_add(1, Ordering::SeqCst);
                MaybeAsync::ready(Ok(()))
            }
        }

        let mut builder = Injector::builder();
        builder.provide(factory(|| Connection).singleton().lifecycle::<Connection>());
        let injector = builder.build().unwrap();
        let _connection: Svc<Connection> = injector.get().unwrap();
        assert_eq!(1, injector.instance_count());

        injector.destroy().into_ready().unwrap().unwrap();
        injector.destroy().into_ready().unwrap().unwrap();
        assert_eq!(1, DESTROYED.load(Ordering::SeqCst));
        assert_eq!(0, injector.instance_count());
        assert!(matches!(
            injector.get::<Svc<Connection>>(),
            Err(InjectError::InjectorDestroyed { .. })
        ));
    }

    #[test]
    fn destroy_service_frees_the_instance() {
        let mut builder = Injector::builder();
        builder.provide(factory(|| 3_i64).singleton());
        let injector = builder.build().unwrap();

        let first: Svc<i64> = injector.get().unwrap();
        injector
            .destroy_service(&first)
            .into_ready()
            .unwrap()
            .unwrap();
        let second: Svc<i64> = injector.get().unwrap();
        assert!(!Svc::ptr_eq(&first, &second));
    }
}
