//! Runtime dependency injection driven by hooks.
//!
//! Services are registered as providers keyed by a [`Token`] and resolved on
//! demand by an [`Injector`]. Resolution runs through a pipeline of
//! [`Hook`]s, so optional dependencies, named lookups, lazy injection and
//! fallbacks are all hooks rather than special cases of the resolver.
//!
//! # Providers
//!
//! A provider is built with one of [`class`], [`factory`], [`try_factory`],
//! [`factory_async`], [`try_factory_async`], [`value`] or [`alias`]. The
//! parameters of the constructor are its dependencies: any type
//! implementing [`Request`] can be a parameter, for example `Svc<T>`,
//! `Option<Svc<T>>`, `Vec<Svc<T>>` or `Lazy<Svc<T>>`.
//!
//! # Scopes
//!
//! The [`Scope`] of a provider decides which requests share an instance:
//!
//! - [`SingletonScope`]: one instance per provider.
//! - [`TransientScope`]: a new instance per request.
//! - [`InstanceScope`]: one instance per instance of the requesting provider.
//! - [`DefaultScope`]: the scope of the nearest requesting provider, or a
//!   singleton when requested directly.
//!
//! Custom scopes implement [`Scope`].
//!
//! # Circular dependencies
//!
//! Class providers may depend on each other in a cycle as long as the
//! provider that closes the cycle takes a [`Ref<T>`] instead of a `Svc<T>`.
//! The reference is filled once the other side finished constructing, and
//! the init callbacks of the whole cycle run in dependency order afterwards.
//! Factory and value providers cannot be part of a cycle.
//!
//! # Asynchronous resolution
//!
//! Resolution stays synchronous until a provider, hook or lifecycle callback
//! returns a future. [`Injector::get`] fails in that case, while
//! [`Injector::get_async`] waits. Parallel requests for the same instance
//! share a single construction.
//!
//! # Modules
//!
//! A [`Module`] groups providers, imports other modules and exports some of
//! its providers to its importers. Every module is compiled into its own
//! injector; a module imported from several places is only compiled once.
//!
//! # Example
//!
//! ```
//! use graph_injector::{class, factory, value, Injector, Ref, Svc};
//!
//! struct Config {
//!     greeting: &'static str,
//! }
//!
//! struct Greeter {
//!     config: Svc<Config>,
//!     audit: Svc<Audit>,
//! }
//!
//! struct Audit {
//!     greeter: Ref<Greeter>,
//! }
//!
//! let mut builder = Injector::builder();
//! builder.provide(value(Config { greeting: "hello" }));
//! builder.provide(class(|config: Svc<Config>, audit: Svc<Audit>| Greeter { config, audit }));
//! builder.provide(class(|greeter: Ref<Greeter>| Audit { greeter }));
//! builder.provide(factory(|greeter: Svc<Greeter>| greeter.config.greeting.len()).transient());
//!
//! let injector = builder.build().unwrap();
//! let greeter: Svc<Greeter> = injector.get().unwrap();
//! let back = greeter.audit.greeter.get().unwrap();
//! assert!(Svc::ptr_eq(&greeter, &back));
//!
//! let length: Svc<usize> = injector.get().unwrap();
//! assert_eq!(5, *length);
//! ```

#![forbid(unsafe_code)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::needless_pass_by_value
)]

mod compiler;
pub mod hooks;
mod injector;
mod instances;
mod lifecycle;
pub mod maybe;
mod module;
mod providers;
mod requests;
mod resolver;
mod scope;
mod services;
mod session;
mod token;

pub use hooks::{Hook, HookRecord, Next, Resolution};
pub use injector::{Injector, InjectorBuilder};
pub(crate) use injector::InjectorInner;
pub use instances::InstanceId;
pub use lifecycle::Lifecycle;
pub use maybe::MaybeAsync;
pub use module::*;
pub use providers::*;
pub use requests::*;
pub use scope::*;
pub use services::*;
pub use session::*;
pub use token::*;

#[cfg(test)]
mod tests;
