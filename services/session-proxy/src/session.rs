//! Proxy session state and the sign-out terminator
//!
//! The proxy holds one upstream session. `SessionFlag` tracks whether it is
//! signed in; the admin API raises it on sign-in and `SignOut` lowers it
//! when the refresh coordinator gives up on the session.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use session_refresh::SessionTerminator;
use tracing::warn;

/// Shared signed-in flag for the proxy's session.
#[derive(Debug, Clone, Default)]
pub struct SessionFlag(Arc<AtomicBool>);

impl SessionFlag {
    pub fn new(signed_in: bool) -> Self {
        Self(Arc::new(AtomicBool::new(signed_in)))
    }

    pub fn is_signed_in(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, signed_in: bool) {
        self.0.store(signed_in, Ordering::SeqCst);
    }

    /// Status label for health and admin responses.
    pub fn label(&self) -> &'static str {
        if self.is_signed_in() {
            "signed_in"
        } else {
            "signed_out"
        }
    }
}

/// Terminator that signs the proxy out when its session cannot be refreshed.
///
/// Stored tokens are already cleared by the time this runs. Requests keep
/// being forwarded unauthenticated until an operator signs in again.
pub struct SignOut {
    flag: SessionFlag,
}

impl SignOut {
    pub fn new(flag: SessionFlag) -> Self {
        Self { flag }
    }
}

impl SessionTerminator for SignOut {
    fn terminate(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.flag.set(false);
            warn!("upstream session ended, sign in again via PUT /admin/session");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_labels() {
        let flag = SessionFlag::new(true);
        assert_eq!(flag.label(), "signed_in");
        flag.set(false);
        assert_eq!(flag.label(), "signed_out");
    }

    #[tokio::test]
    async fn sign_out_lowers_shared_flag() {
        let flag = SessionFlag::new(true);
        let terminator = SignOut::new(flag.clone());

        terminator.terminate().await;
        assert!(!flag.is_signed_in());

        // Terminating an already signed-out session is harmless
        terminator.terminate().await;
        assert!(!flag.is_signed_in());
    }
}
