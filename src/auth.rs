use anyhow::Result;

use crate::api::{ApiError, Gateway};
use crate::models::{ProfileResponse, Role};
use crate::session::SessionStore;

/// Where a session ends up after authentication: the resolved role plus the
/// profile payload the role view renders from.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub role: Role,
    pub profile: ProfileResponse,
}

#[derive(Debug)]
pub enum LoginOutcome {
    Dispatched(Dispatch),
    /// The backend refused the credentials, or resolution failed right after
    /// a fresh login. Carries the user-visible message.
    Rejected(String),
    /// Token accepted but the profile reports a role this client does not
    /// know. The credential stays stored; control returns to the login view.
    UnrecognizedRole,
}

/// Exchanges credentials for a token, stores it, then resolves the role.
/// Exactly one of {credential stored, error message returned} holds after
/// this returns.
pub async fn login(
    gateway: &dyn Gateway,
    session: &SessionStore,
    username: &str,
    password: &str,
) -> Result<LoginOutcome> {
    let token = match gateway.login(username, password).await {
        Ok(token) => token,
        Err(err) => {
            tracing::warn!(username, error = %err, "Login rejected");
            return Ok(LoginOutcome::Rejected(login_message(&err)));
        }
    };
    session.set(&token)?;
    tracing::info!(username, "Authenticated, resolving role");

    match gateway.profile().await {
        Ok(profile) => match profile.role {
            Role::Unknown => {
                tracing::warn!(role = %profile.role, "Profile reports an unrecognized role");
                Ok(LoginOutcome::UnrecognizedRole)
            }
            role => Ok(LoginOutcome::Dispatched(Dispatch { role, profile })),
        },
        Err(err) => {
            tracing::warn!(error = %err, "Role resolution failed after login");
            session.clear()?;
            Ok(LoginOutcome::Rejected(
                "Unable to resolve the account role".to_string(),
            ))
        }
    }
}

/// Silent re-authentication on startup: when a credential is stored, resolve
/// the role before any protected view renders. A resolution failure clears
/// the session; the caller falls through to the login prompt.
pub async fn resume(gateway: &dyn Gateway, session: &SessionStore) -> Result<Option<Dispatch>> {
    if session.get().is_none() {
        return Ok(None);
    }
    tracing::info!("Stored credential found, resolving role");

    match gateway.profile().await {
        Ok(profile) => match profile.role {
            Role::Unknown => {
                tracing::warn!(role = %profile.role, "Stored session has an unrecognized role");
                Ok(None)
            }
            role => Ok(Some(Dispatch { role, profile })),
        },
        Err(err) => {
            tracing::warn!(error = %err, "Stored credential rejected, clearing session");
            session.clear()?;
            Ok(None)
        }
    }
}

/// The backend's `detail` when it sent one, the generic fallback otherwise
/// (transport failures have no detail at all).
fn login_message(err: &ApiError) -> String {
    match err {
        ApiError::Unauthorized {
            detail: Some(detail),
        } => detail.clone(),
        _ => "Invalid credentials".to_string(),
    }
}
