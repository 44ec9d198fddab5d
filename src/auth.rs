//! Account identifiers and credential models.

pub mod id;
pub mod token;

pub use id::*;
pub use token::*;
