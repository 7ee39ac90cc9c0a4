//! Two-step login orchestration.

pub mod orchestrator;

pub use orchestrator::{AuthenticationChainOrchestrator, LoginOutcome};
