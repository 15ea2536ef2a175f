use crate::{HookRecord, InjectResult, Injector, MaybeAsync, ProviderDescriptor, Token};
use std::{
    borrow::Cow,
    fmt::{Debug, Formatter},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

static NEXT_MODULE: AtomicU64 = AtomicU64::new(0);

/// Identifies a module. Clones of a module share its id, which is how the
/// compiler recognizes a module imported from more than one place.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModuleId(u64);

/// A callback run once a module's injector is initialized.
pub type ModuleInit = Arc<dyn Fn(Injector) -> MaybeAsync<InjectResult<()>> + Send + Sync>;

/// An entry in a module's export list.
#[derive(Clone)]
pub enum Export {
    /// A token the module provides or received from one of its imports.
    Token(Token),
    /// A provider that is registered in the module and exported.
    Provider(ProviderDescriptor),
    /// Re-exports what an imported module exports, or only the listed
    /// tokens of it.
    Module {
        /// The imported module.
        module: Module,
        /// The tokens to re-export. `None` re-exports everything.
        tokens: Option<Vec<Token>>,
    },
}

impl From<Token> for Export {
    fn from(token: Token) -> Self {
        Export::Token(token)
    }
}

impl From<ProviderDescriptor> for Export {
    fn from(provider: ProviderDescriptor) -> Self {
        Export::Provider(provider)
    }
}

impl From<Module> for Export {
    fn from(module: Module) -> Self {
        Export::Module {
            module,
            tokens: None,
        }
    }
}

impl Debug for Export {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Export::Token(token) => f.debug_tuple("Token").field(token).finish(),
            Export::Provider(provider) => {
                f.debug_tuple("Provider").field(provider.token()).finish()
            }
            Export::Module { module, tokens } => f
                .debug_struct("Module")
                .field("module", &module.name())
                .field("tokens", tokens)
                .finish(),
        }
    }
}

/// A collection of providers that is compiled into its own injector.
///
/// A module imports other modules and exports some of its providers to the
/// modules importing it. Everything it does not export stays private to its
/// injector. For creating a module easily via a domain specific language,
/// see [`define_module!`].
///
/// ```
/// use graph_injector::{value, Injector, Module, Svc, Token};
///
/// let mut database = Module::new("database");
/// database.provide(value(String::from("postgres://")));
/// database.export(Token::of::<String>());
///
/// let mut builder = Injector::builder();
/// builder.add_module(database);
///
/// let injector = builder.build().unwrap();
/// let url: Svc<String> = injector.get().unwrap();
/// assert_eq!("postgres://", url.as_str());
/// ```
#[derive(Clone)]
pub struct Module {
    id: ModuleId,
    name: Cow<'static, str>,
    imports: Vec<Module>,
    providers: Vec<ProviderDescriptor>,
    exports: Vec<Export>,
    hooks: Vec<HookRecord>,
    init: Option<ModuleInit>,
}

impl Default for Module {
    fn default() -> Self {
        Module::new("module")
    }
}

impl Module {
    /// Creates an empty module with a new identity.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Module {
            id: ModuleId(NEXT_MODULE.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            imports: Vec::new(),
            providers: Vec::new(),
            exports: Vec::new(),
            hooks: Vec::new(),
            init: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> ModuleId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    pub fn set_name(&mut self, name: impl Into<Cow<'static, str>>) {
        self.name = name.into();
    }

    /// Registers a provider in this module.
    pub fn provide(&mut self, provider: ProviderDescriptor) {
        self.providers.push(provider);
    }

    /// Imports another module.
    pub fn import(&mut self, module: Module) {
        self.imports.push(module);
    }

    /// Adds an entry to the export list.
    pub fn export(&mut self, export: impl Into<Export>) {
        self.exports.push(export.into());
    }

    /// Adds a hook that wraps every request made on this module's injector.
    pub fn hook(&mut self, hook: HookRecord) {
        self.hooks.push(hook);
    }

    /// Sets the callback run after the module's imports and eager providers
    /// are initialized.
    pub fn on_init<F>(&mut self, f: F)
    where
        F: Fn(Injector) -> MaybeAsync<InjectResult<()>> + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(f));
    }

    #[must_use]
    pub fn imports(&self) -> &[Module] {
        &self.imports
    }

    #[must_use]
    pub fn providers(&self) -> &[ProviderDescriptor] {
        &self.providers
    }

    #[must_use]
    pub fn exports(&self) -> &[Export] {
        &self.exports
    }

    #[must_use]
    pub fn hooks(&self) -> &[HookRecord] {
        &self.hooks
    }

    pub(crate) fn init(&self) -> Option<&ModuleInit> {
        self.init.as_ref()
    }
}

impl Debug for Module {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("imports", &self.imports.len())
            .field("providers", &self.providers.len())
            .field("exports", &self.exports)
            .finish()
    }
}

/// Defines a new module using a domain specific language.
///
/// # Example
///
/// ```
/// use graph_injector::{class, define_module, value, Injector, Svc, Token};
///
/// struct Pool;
/// struct Repository {
///     pool: Svc<Pool>,
/// }
///
/// let storage = define_module! {
///     name = "storage",
///     providers = [
///         value(Pool),
///         class(|pool: Svc<Pool>| Repository { pool }),
///     ],
///     exports = [
///         Token::of::<Repository>(),
///     ],
/// };
///
/// let app = define_module! {
///     name = "app",
///     imports = [storage],
/// };
///
/// let mut builder = Injector::builder();
/// builder.add_module(app);
/// let injector = builder.build().unwrap();
///
/// // `app` does not re-export the repository, so only its own injector
/// // sees it.
/// assert!(injector.get::<Svc<Repository>>().is_err());
/// ```
#[macro_export]
macro_rules! define_module {
    {
        $($key:tt = $value:tt),*
        $(,)?
    } => {
        {
            #[allow(unused_mut)]
            let mut module = <$crate::Module as ::std::default::Default>::default();
            $($crate::define_module!(@apply module, $key = $value);)*
            module
        }
    };
    (@apply $module:ident, name = $name:expr) => {
        $module.set_name($name);
    };
    (
        @apply $module:ident,
        imports = [
            $($import:expr),*
            $(,)?
        ]
    ) => {
        $($module.import($import);)*
    };
    (
        @apply $module:ident,
        providers = [
            $($provider:expr),*
            $(,)?
        ]
    ) => {
        $($module.provide($provider);)*
    };
    (
        @apply $module:ident,
        exports = [
            $($export:expr),*
            $(,)?
        ]
    ) => {
        $($module.export($export);)*
    };
    (
        @apply $module:ident,
        hooks = [
            $($hook:expr),*
            $(,)?
        ]
    ) => {
        $($module.hook($crate::HookRecord::new($hook));)*
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{value, Svc};

    #[test]
    fn clones_share_identity() {
        let module = Module::new("shared");
        let clone = module.clone();
        assert_eq!(module.id(), clone.id());
        assert_ne!(module.id(), Module::new("shared").id());
    }

    #[test]
    fn macro_fills_every_section() {
        let inner = define_module! {
            providers = [value(1_u8)],
            exports = [Token::of::<u8>()],
        };
        let module = define_module! {
            name = "outer",
            imports = [inner.clone()],
            providers = [value(2_u16), value(3_u32)],
            exports = [inner],
            hooks = [crate::hooks::skip_self()],
        };

        assert_eq!("outer", module.name());
        assert_eq!(1, module.imports().len());
        assert_eq!(2, module.providers().len());
        assert!(matches!(
            module.exports(),
            [Export::Module { tokens: None, .. }]
        ));
        assert_eq!(1, module.hooks().len());
    }

    #[test]
    fn exported_tokens_reach_the_importer() {
        let inner = define_module! {
            providers = [value(1_u8), value(2_u16)],
            exports = [Token::of::<u8>()],
        };
        let mut builder = Injector::builder();
        builder.add_module(inner);
        let injector = builder.build().unwrap();

        let exported: Svc<u8> = injector.get().unwrap();
        assert_eq!(1, *exported);
        assert!(injector.get::<Svc<u16>>().is_err());
    }
}
