//! Request handlers.

pub mod analysis;
pub mod health;
pub mod internal;
pub mod queue;
pub mod videos;

pub use analysis::*;
pub use health::*;
pub use internal::*;
pub use queue::*;
pub use videos::*;
