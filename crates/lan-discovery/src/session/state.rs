//! State enumerations for discovery sessions.

/// State of a discovery session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Constructed, not listening.
    #[default]
    Idle,
    /// Multicast socket open, receive loop running.
    Listening,
    /// Stop requested. The receive loop may still hold the socket.
    Stopping,
    /// Terminal. The receive loop has ended and released the socket, or was
    /// never started.
    Stopped,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Listening => write!(f, "Listening"),
            SessionState::Stopping => write!(f, "Stopping"),
            SessionState::Stopped => write!(f, "Stopped"),
        }
    }
}
