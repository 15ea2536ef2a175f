mod constraint;
mod descriptor;
mod record;

pub use constraint::*;
pub use descriptor::*;
pub use record::*;
