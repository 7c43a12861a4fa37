//! Terminal command implementations.

mod auth;
mod send;

pub use auth::{run_auth_login, run_auth_status};
pub use send::{run_send, SendArgs};
