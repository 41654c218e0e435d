//! Business logic services
//!
//! Services coordinate the auth components with the user store and the
//! mailer.

pub mod account;

pub use account::AccountService;
