//! In-memory session state.
//!
//! One [`SessionState`] per session id, created lazily from the configured
//! defaults and kept for the lifetime of the process. Nothing is persisted.

pub mod state;
pub mod store;

pub use {
    state::SessionState,
    store::{SessionHandle, SessionStore},
};
