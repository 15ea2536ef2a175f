mod arena;
mod instance;

pub use arena::InstanceId;
pub(crate) use arena::{InstanceArena, SharedArena};
pub(crate) use instance::{Handoff, Instance, InstanceStatus, SharedResolution};
