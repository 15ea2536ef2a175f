use crate::{
    compiler::ModuleCompiler, injector::ParentLink, HookRecord, InjectError, InjectResult,
    Injector, MaybeAsync, Module, ProviderDescriptor, Token,
};
use std::borrow::Cow;

/// A builder for an [`Injector`].
///
/// The builder collects providers, hooks and imported modules into a root
/// module and compiles it when the injector is built.
pub struct InjectorBuilder {
    module: Module,
    parent: Option<Injector>,
    eager: bool,
}

impl Default for InjectorBuilder {
    fn default() -> Self {
        InjectorBuilder {
            module: Module::new("root"),
            parent: None,
            eager: true,
        }
    }
}

impl InjectorBuilder {
    /// Registers a provider. An unconstrained provider replaces an earlier
    /// unconstrained one for the same token unless both are marked as
    /// [`multi`](ProviderDescriptor::multi).
    pub fn provide(&mut self, provider: ProviderDescriptor) {
        self.module.provide(provider);
    }

    /// Imports a module. Its exports become visible in the built injector.
    pub fn add_module(&mut self, module: Module) {
        self.module.import(module);
    }

    /// Adds a hook that wraps every request made on the built injector.
    pub fn hook(&mut self, hook: HookRecord) {
        self.module.hook(hook);
    }

    /// Sets the injector to fall back to.
    pub fn parent(&mut self, parent: Injector) {
        self.parent = Some(parent);
    }

    /// Names the built injector.
    pub fn name(&mut self, name: impl Into<Cow<'static, str>>) {
        self.module.set_name(name);
    }

    /// Controls whether eager providers are resolved while building.
    /// Enabled by default.
    pub fn eager(&mut self, enabled: bool) {
        self.eager = enabled;
    }

    /// Runs a callback once the injector and its imports are initialized.
    pub fn on_init<F>(&mut self, f: F)
    where
        F: Fn(Injector) -> MaybeAsync<InjectResult<()>> + Send + Sync + 'static,
    {
        self.module.on_init(f);
    }

    fn compile(self) -> InjectResult<(Injector, MaybeAsync<InjectResult<()>>)> {
        let arena = self
            .parent
            .as_ref()
            .map_or_else(Injector::new_arena, Injector::arena);
        let mut compiler = ModuleCompiler::new(arena);
        let injector = compiler.compile(&self.module, self.parent.map(ParentLink::Strong))?;
        let init = compiler.initialize(self.eager);
        Ok((injector, init))
    }

    /// Builds the injector. Fails if a provider or export is invalid, or if
    /// initializing the injector suspends; use
    /// [`build_async`](InjectorBuilder::build_async) in that case.
    pub fn build(self) -> InjectResult<Injector> {
        let (injector, init) = self.compile()?;
        match init {
            MaybeAsync::Ready(result) => result.map(|()| injector),
            MaybeAsync::Deferred(_) => Err(InjectError::AsyncResolution {
                token: Token::of::<Injector>(),
            }),
        }
    }

    /// Builds the injector, waiting for asynchronous initialization.
    pub async fn build_async(self) -> InjectResult<Injector> {
        let (injector, init) = self.compile()?;
        init.into_future().await?;
        Ok(injector)
    }
}
