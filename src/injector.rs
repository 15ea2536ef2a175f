#[allow(clippy::module_inception)]
mod injector;
mod builder;

pub use builder::*;
pub use injector::Injector;
pub(crate) use injector::{InjectorInner, InjectorParts, ParentLink};
