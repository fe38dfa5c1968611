use std::sync::atomic::{AtomicBool, Ordering};

/// Single-slot readiness signal between the stream resolver and the poller.
///
/// A present token means the poller may start the next query. Taking the
/// token marks a query as in flight; the poller puts it back when the query
/// cycle completes and it is still following.
#[derive(Debug, Default)]
pub struct ReadinessGate {
    token: AtomicBool,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place the token. Returns false if it was already present.
    pub fn signal(&self) -> bool {
        !self.token.swap(true, Ordering::SeqCst)
    }

    /// Take the token if present
    pub fn try_acquire(&self) -> bool {
        self.token.swap(false, Ordering::SeqCst)
    }
}
