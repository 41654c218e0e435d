//! Authcore Library
//!
//! Credential hashing, signed session and verification tokens, request
//! authentication and the account lifecycle built on top of them. The user
//! store and the mailer are collaborators behind traits.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod mail;
pub mod repositories;
pub mod services;
pub mod state;
