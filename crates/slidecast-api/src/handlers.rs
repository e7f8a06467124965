//! Request handlers.

pub mod convert;
pub mod health;
pub mod jobs;

pub use convert::*;
pub use health::*;
pub use jobs::*;
