//! Provider login completion: code exchange, user info, identity.

use chain_core::models::{AuthenticationResult, ProviderRole};
use chain_core::oauth::{PendingLogin, ProviderRegistration};
use tracing::info;

use crate::AppState;
use crate::error::AppResult;

/// Finish a provider login and return the tagged authentication.
///
/// Secondary-provider tokens are saved into the authorized-client manager
/// so the relay can pick them up at code issuance.
pub async fn complete_login(
    state: &AppState,
    registration: &ProviderRegistration,
    code: &str,
    pending: &PendingLogin,
) -> AppResult<AuthenticationResult> {
    let tokens = state
        .oauth
        .exchange_authorization_code(
            registration,
            code,
            &pending.redirect_uri,
            &pending.pkce_verifier,
        )
        .await?;
    let attributes = state
        .oauth
        .fetch_user_info(registration, &tokens.access_token)
        .await?;

    let mut granted = tokens.scopes();
    if granted.is_empty() {
        granted = registration.scopes.clone();
    }
    let identity = registration.parse_identity(attributes, &granted)?;

    if registration.role == ProviderRole::Secondary {
        state.clients.save_authorized_client(
            &registration.registration_id,
            &identity.principal_name,
            &tokens,
        );
    }

    info!(
        registration = %registration.registration_id,
        principal = %identity.principal_name,
        "provider login succeeded"
    );
    Ok(registration.authenticate(identity))
}
