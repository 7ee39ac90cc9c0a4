//! Services behind the handlers.

pub mod cookies;
pub mod login;
