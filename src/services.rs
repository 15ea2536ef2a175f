mod injected;
mod lazy;
mod service;

pub use injected::*;
pub use lazy::*;
pub use service::*;
