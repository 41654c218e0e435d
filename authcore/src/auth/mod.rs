//! Authentication module
//!
//! Argon2id password hashing, HS256 token issuance and verification,
//! session authentication and the email verification workflow.

mod jwt;
mod password;
mod session;
mod verification;

pub use jwt::{Claims, TokenCodec, TokenKeys, TokenPurpose};
pub use password::PasswordService;
pub use session::{Principal, SessionAuthenticator, TokenSource};
pub use verification::{link_failure_message, VerificationWorkflow};
