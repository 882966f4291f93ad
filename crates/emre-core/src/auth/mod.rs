//! Authentication state and credential persistence.
//!
//! This module provides:
//! - `Session`: the process-wide bearer credential, injected into the request
//!   executor, with change notification for logout and 401 teardown
//! - `SessionFile`: on-disk session metadata between runs
//! - `CredentialStore`: OS keychain storage for the bearer token
//!
//! Tokens issued by the backend expire after eight days.

pub mod credentials;
pub mod session;

pub use credentials::CredentialStore;
pub use session::{Session, SessionData, SessionFile, StoredSession};
