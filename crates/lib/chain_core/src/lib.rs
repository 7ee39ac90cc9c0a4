//! # chain_core
//!
//! Core domain logic for chained authentication: the two-step login state
//! machine, the secondary-token relay, claim merging and JWT issuance.

pub mod auth;
pub mod authorization;
pub mod chain;
pub mod claims;
pub mod grant;
pub mod models;
pub mod oauth;
pub mod relay;
pub mod session;
