use tokio_util::sync::CancellationToken;

/// Cooperative stop signal shared by a session's sender and receiver.
///
/// Once set it stays set. Workers check it before every iteration and race
/// their blocking reads against [`ShutdownFlag::wait`].
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag {
    token: CancellationToken,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.token.cancel();
    }

    pub fn is_set(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the flag is set, immediately if it already is.
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }
}
