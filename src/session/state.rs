// Session lifecycle states

use serde::Serialize;

/// Where the client session currently stands
///
/// `Authenticating` and `Refreshing` are transient; the others are rest states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Anonymous,
    Authenticating,
    Authenticated,
    Refreshing,
}

impl SessionState {
    /// Whether `self -> next` is an edge of the session state machine
    ///
    /// Moving to `Anonymous` is always allowed (logout, failed refresh).
    pub fn can_transition(self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (_, Anonymous)
                | (Anonymous, Authenticating)
                | (Authenticating, Authenticated)
                | (Authenticated, Refreshing)
                | (Refreshing, Authenticated)
        )
    }

    pub fn is_transient(self) -> bool {
        matches!(self, SessionState::Authenticating | SessionState::Refreshing)
    }

    pub fn is_authenticated(self) -> bool {
        matches!(self, SessionState::Authenticated | SessionState::Refreshing)
    }
}
