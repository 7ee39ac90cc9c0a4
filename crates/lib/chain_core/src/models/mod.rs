//! Domain models shared by the adapter and the gateway.

pub mod authorization;
pub mod identity;
pub mod token;

pub use authorization::{AuthorizationRecord, IssuedValue, TokenType};
pub use identity::{AuthenticationResult, IdentityRecord, ProviderRole};
pub use token::AccessToken;
