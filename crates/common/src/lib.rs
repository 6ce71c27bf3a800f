//! Common types for the storage gateway workspace

mod bytesize;
mod error;
mod secret;

pub use bytesize::format_size;
pub use error::{Error, Result};
pub use secret::Secret;
