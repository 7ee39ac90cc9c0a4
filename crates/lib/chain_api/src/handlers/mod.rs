//! Request handlers.

pub mod authorize;
pub mod login;
pub mod logout;
pub mod token;
pub mod well_known;
