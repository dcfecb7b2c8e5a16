// Client-side session management
// Owns the in-memory session mirror, the state machine and the refresh loop

mod client;
mod refresh;
mod state;
mod store;

pub use client::{RefreshOutcome, SessionClient, SessionError};
pub use refresh::{LoopExit, RefreshHandle, RefreshPolicy};
pub use state::SessionState;
pub use store::TokenStore;
