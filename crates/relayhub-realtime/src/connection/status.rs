//! Connection status definitions and transition table.

use serde::Serialize;

/// Lifecycle status of a connection.
///
/// Serialize-only: a status is never constructed from client input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Registered and serving traffic. Initial state.
    Connected,
    /// Temporarily interrupted, may resume.
    Reconnecting,
    /// Cleanly torn down. Terminal.
    Disconnected,
    /// Torn down after a transport failure. Terminal.
    Error,
}

impl ConnectionStatus {
    /// Whether the transition `self -> next` is allowed.
    ///
    /// ```text
    /// connected    -> disconnected | error | reconnecting
    /// reconnecting -> connected | disconnected | error
    /// disconnected, error: terminal
    /// ```
    pub fn can_transition_to(self, next: ConnectionStatus) -> bool {
        use ConnectionStatus::*;
        matches!(
            (self, next),
            (Connected, Disconnected | Error | Reconnecting)
                | (Reconnecting, Connected | Disconnected | Error)
        )
    }

    /// Whether this status is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Error)
    }
}
