//! Convenience re-exports for crates that consume the model wholesale.

pub use crate::api::*;
pub use crate::assets::*;
pub use crate::format::*;
pub use crate::ids::*;
pub use crate::status::*;
