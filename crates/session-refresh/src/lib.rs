//! Single-flight session refresh for an authenticated HTTP client
//!
//! Detects expired-session failures on outbound calls, refreshes the
//! session credential once no matter how many requests fail together, and
//! replays each affected request with the new token. When the refresh
//! itself fails, every affected request fails with the same error, the
//! stored tokens are cleared and the host's `SessionTerminator` runs once.
//!
//! Request lifecycle:
//! 1. `AuthClient::send` attaches the stored access token and sends
//! 2. `FailureClassifier` decides whether the outcome is refresh-eligible
//! 3. Eligible requests wait on `RefreshCoordinator::fresh_token`
//! 4. The first waiter starts the refresh; later ones join its queue
//! 5. Each waiter replays its request once with the new token

pub mod classify;
pub mod client;
pub mod coordinator;
pub mod error;
pub mod terminator;

#[cfg(test)]
mod test_support;

pub use classify::{Classification, DEFAULT_EXCLUDED_ENDPOINTS, FailureClassifier};
pub use client::AuthClient;
pub use coordinator::{RefreshCoordinator, RefreshState};
pub use error::{Error, Result};
pub use terminator::SessionTerminator;
