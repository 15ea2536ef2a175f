mod argument;
mod factory;
mod request;

pub use argument::*;
pub use factory::*;
pub use request::*;
