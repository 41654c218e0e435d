//! Authcore Shared Library
//!
//! Error taxonomy, request/response types and input validation shared by
//! the authcore library and anything that talks to it.

pub mod errors;
pub mod types;
pub mod validation;

// Re-export commonly used items
pub use errors::*;
pub use types::*;
