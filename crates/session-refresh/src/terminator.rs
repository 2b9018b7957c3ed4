//! Session termination hook
//!
//! The host application supplies a `SessionTerminator`; the refresh
//! coordinator calls it once per failed refresh cycle, after the stored
//! tokens have been cleared. A typical implementation drops any cached
//! user state and routes the user back to sign-in.

use std::future::Future;
use std::pin::Pin;

/// Callback invoked when the session cannot be refreshed.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn SessionTerminator>`).
///
/// The refresh cycle stays open until `terminate` returns, so waiting
/// requests are only rejected afterwards. An implementation must not send
/// requests through the `AuthClient` it terminates: such a request would
/// queue behind the very cycle it is running in and never complete.
pub trait SessionTerminator: Send + Sync {
    fn terminate(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}
