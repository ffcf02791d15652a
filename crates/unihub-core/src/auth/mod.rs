//! Authentication: credential storage, token inspection, session lifecycle.

pub mod session;
pub mod store;
pub mod token;

pub use session::{SessionManager, SessionState, REMEMBER_RETENTION_DAYS};
pub use store::{CredentialStore, RetentionTier};
