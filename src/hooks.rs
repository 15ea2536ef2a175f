//! Hooks and the built-in hooks.

mod builtin;
mod hook;

pub use builtin::*;
pub use hook::{Hook, HookRecord, Next, Resolution};
pub(crate) use hook::{run_pipeline, select_hooks, sort_hooks};
