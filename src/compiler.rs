//! Compiles a module graph into a hierarchy of injectors.

use crate::{
    hooks::sort_hooks,
    injector::{InjectorParts, ParentLink},
    instances::SharedArena,
    maybe::{self, Step},
    Export, InjectError, InjectResult, Injector, MaybeAsync, Module, ModuleId, ModuleInit,
    ProviderRecord, Token,
};
use std::{borrow::Cow, collections::HashMap, sync::Arc};
use tracing::debug;

struct Compiled {
    injector: Injector,
    exports: Vec<Arc<ProviderRecord>>,
}

/// Builds one injector per module. A module that is imported again after it
/// was compiled gets a facade forwarding to its first injector, so its
/// providers are never instantiated twice.
pub(crate) struct ModuleCompiler {
    arena: SharedArena,
    compiled: HashMap<ModuleId, Compiled>,
    init: Vec<(Injector, Option<ModuleInit>)>,
}

impl ModuleCompiler {
    pub(crate) fn new(arena: SharedArena) -> Self {
        ModuleCompiler {
            arena,
            compiled: HashMap::new(),
            init: Vec::new(),
        }
    }

    /// Compiles `module` and everything it imports.
    pub(crate) fn compile(
        &mut self,
        module: &Module,
        parent: Option<ParentLink>,
    ) -> InjectResult<Injector> {
        debug!(module = module.name(), "compiling module");

        let mut providers = module.providers().to_vec();
        for export in module.exports() {
            if let Export::Provider(provider) = export {
                providers.push(provider.clone());
            }
        }
        let mut hooks = module.hooks().to_vec();
        sort_hooks(&mut hooks);

        let injector = Injector::from_parts(InjectorParts {
            name: Cow::Owned(module.name().to_string()),
            parent,
            providers,
            hooks,
            arena: self.arena.clone(),
            module: Some(module.id()),
        })?;
        // Registered before the imports so an import cycle ends in a facade.
        self.compiled.insert(
            module.id(),
            Compiled {
                injector: injector.clone(),
                exports: Vec::new(),
            },
        );

        let mut imported: HashMap<ModuleId, Vec<Arc<ProviderRecord>>> = HashMap::new();
        for import in module.imports() {
            let existing = self
                .compiled
                .get(&import.id())
                .map(|compiled| (compiled.injector.clone(), compiled.exports.clone()));
            let exports = match existing {
                Some((target, exports)) => {
                    debug!(module = import.name(), "module already compiled, using a facade");
                    injector.adopt(Injector::facade(&target, &injector));
                    exports
                }
                None => {
                    let child =
                        self.compile(import, Some(ParentLink::Weak(injector.downgrade())))?;
                    injector.adopt(child);
                    self.compiled
                        .get(&import.id())
                        .map(|compiled| compiled.exports.clone())
                        .unwrap_or_default()
                }
            };
            for record in &exports {
                injector.import_record(record.clone());
            }
            imported.insert(import.id(), exports);
        }

        let exports = Self::exports(module, &injector, &imported)?;
        if let Some(compiled) = self.compiled.get_mut(&module.id()) {
            compiled.exports = exports;
        }
        self.init.push((injector.clone(), module.init().cloned()));
        Ok(injector)
    }

    /// Collects the records a module hands to its importers.
    fn exports(
        module: &Module,
        injector: &Injector,
        imported: &HashMap<ModuleId, Vec<Arc<ProviderRecord>>>,
    ) -> InjectResult<Vec<Arc<ProviderRecord>>> {
        let invalid = |token: &Token| InjectError::InvalidExport {
            module: module.name().to_string(),
            token: token.clone(),
        };

        let mut exports = Vec::new();
        for export in module.exports() {
            match export {
                Export::Token(token) => {
                    exports.push(injector.record(token).ok_or_else(|| invalid(token))?);
                }
                Export::Provider(provider) => {
                    let token = provider.token();
                    exports.push(injector.record(token).ok_or_else(|| invalid(token))?);
                }
                Export::Module {
                    module: reexported,
                    tokens,
                } => {
                    let records = imported
                        .get(&reexported.id())
                        .ok_or_else(|| invalid(&Token::named(reexported.name().to_string())))?;
                    match tokens {
                        None => exports.extend(records.iter().cloned()),
                        Some(tokens) => {
                            for token in tokens {
                                let record = records
                                    .iter()
                                    .find(|record| record.token() == token)
                                    .ok_or_else(|| invalid(token))?;
                                exports.push(record.clone());
                            }
                        }
                    }
                }
            }
        }
        Ok(exports)
    }

    /// Initializes the compiled injectors, imports before importers: eager
    /// providers are resolved first, then the module's init callback runs.
    pub(crate) fn initialize(self, eager: bool) -> MaybeAsync<InjectResult<()>> {
        let mut steps: Vec<Step> = Vec::new();
        for (injector, init) in self.init {
            if eager {
                for token in injector.eager_tokens() {
                    let injector = injector.clone();
                    steps.push(Box::new(move || injector.resolve_eager(token)));
                }
            }
            if let Some(init) = init {
                steps.push(Box::new(move || {
                    debug!(injector = injector.name(), "running module init");
                    init(injector)
                }));
            }
        }
        maybe::sequence(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{class, define_module, value, Svc};
    use parking_lot::Mutex;

    #[test]
    fn diamond_imports_share_one_injector() {
        struct Shared;
        let shared = define_module! {
            name = "shared",
            providers = [class(|| Shared)],
            exports = [Token::of::<Shared>()],
        };
        let left = define_module! {
            name = "left",
            imports = [shared.clone()],
            exports = [shared.clone()],
        };
        let right = define_module! {
            name = "right",
            imports = [shared.clone()],
            exports = [shared],
        };

        let mut builder = Injector::builder();
        builder.add_module(left);
        builder.add_module(right);
        let injector = builder.build().unwrap();

        let first: Svc<Shared> = injector.get().unwrap();
        let second: Svc<Shared> = injector.get().unwrap();
        assert!(Svc::ptr_eq(&first, &second));
        assert_eq!(1, injector.instance_count());

        let facades = injector
            .children()
            .into_iter()
            .flat_map(|child| child.children())
            .filter(|child| child.facade_target().is_some())
            .count();
        assert_eq!(1, facades);
    }

    #[test]
    fn unknown_exports_are_rejected() {
        let module = define_module! {
            name = "broken",
            exports = [Token::named("nothing")],
        };
        let mut builder = Injector::builder();
        builder.add_module(module);
        assert!(matches!(
            builder.build(),
            Err(InjectError::InvalidExport { module, .. }) if module == "broken"
        ));
    }

    #[test]
    fn selected_tokens_can_be_reexported() {
        let inner = define_module! {
            providers = [value(1_u8), value(2_u16)],
            exports = [Token::of::<u8>(), Token::of::<u16>()],
        };
        let mut outer = Module::new("outer");
        outer.import(inner.clone());
        outer.export(Export::Module {
            module: inner,
            tokens: Some(vec![Token::of::<u16>()]),
        });

        let mut builder = Injector::builder();
        builder.add_module(outer);
        let injector = builder.build().unwrap();
        assert_eq!(2, *injector.get::<Svc<u16>>().unwrap());
        assert!(injector.get::<Svc<u8>>().is_err());
    }

    #[test]
    fn imports_initialize_before_importers() {
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut leaf = Module::new("leaf");
        let log = order.clone();
        leaf.on_init(move |_| {
            log.lock().push("leaf");
            MaybeAsync::ready(Ok(()))
        });
        let mut middle = Module::new("middle");
        middle.import(leaf);
        let log = order.clone();
        middle.on_init(move |_| {
            log.lock().push("middle");
            MaybeAsync::ready(Ok(()))
        });

        let mut builder = Injector::builder();
        builder.add_module(middle);
        let log = order.clone();
        builder.on_init(move |_| {
            log.lock().push("root");
            MaybeAsync::ready(Ok(()))
        });
        builder.build().unwrap();

        assert_eq!(vec!["leaf", "middle", "root"], *order.lock());
    }
}
