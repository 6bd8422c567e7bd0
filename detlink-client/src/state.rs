//! Detector connection state machine (§4.E).

/// One state per stage of a single outbound session. There is exactly one
/// connection in flight at a time; reconnecting always starts a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No socket. Retries a connect every `ConnectRetryInterval`.
    Disconnected,
    /// Socket just connected; about to emit the identifying `SET-request`.
    Connecting,
    /// `SET-request` sent, waiting for the controller's `SET-response`.
    WaitingAck,
    /// Identified and exchanging uploads/heartbeats.
    Ready,
}

impl ClientState {
    #[inline]
    pub fn is_connected(self) -> bool {
        !matches!(self, ClientState::Disconnected)
    }
}
