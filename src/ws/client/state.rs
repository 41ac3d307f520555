/// Gateway connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// no session, no reconnect pending
    #[default]
    Disconnected,
    /// socket opening or handshake in progress
    Connecting,
    /// handshake completed, heartbeat running
    Connected,
    /// connection lost, a reconnect is scheduled
    Reconnecting,
}

impl ConnectionState {
    /// Check whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(self, next: Self) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (_, Disconnected)
                | (Disconnected, Connecting)
                | (Reconnecting, Connecting)
                | (Connecting, Connected)
                | (Connecting, Reconnecting)
                | (Connected, Reconnecting)
        )
    }
}
