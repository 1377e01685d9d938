//! Auth-domain models: the authenticated identity snapshot, persisted credentials, and
//! redacted secrets.

pub mod credentials;
pub mod secret;
pub mod user;

pub use credentials::*;
pub use secret::*;
pub use user::*;
