// SPDX-License-Identifier: MIT

//! Provider connection lifecycle: connect and disconnect.
//!
//! Connecting only hands back an authorization URL; the Connection Record
//! itself is created when the provider confirms authorization through the
//! auth webhook. Disconnecting deletes the record first so nothing more can
//! be attributed, then revokes the grant at the provider best-effort. A
//! record left in the revoked state by a deauth webhook is also cleaned up
//! here.

use crate::db::Store;
use crate::error::AppError;
use crate::services::terra::ActivityProvider;
use std::sync::Arc;

/// Provider name used for all connections managed by this service.
pub const PROVIDER_NAME: &str = "garmin";

/// Outcome of a connect call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A connection already exists; the caller should not open the widget.
    AlreadyConnected,
    /// Present this URL to the user to authorize the provider.
    AuthorizationUrl(String),
}

/// Outcome of a disconnect call. Both variants are success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    Disconnected,
    NotConnected,
}

/// Manages the link between local users and the wearable provider.
#[derive(Clone)]
pub struct ConnectionService {
    store: Arc<dyn Store>,
    provider: Arc<dyn ActivityProvider>,
}

impl ConnectionService {
    pub fn new(store: Arc<dyn Store>, provider: Arc<dyn ActivityProvider>) -> Self {
        Self { store, provider }
    }

    /// Start the authorization flow for a local user.
    pub async fn connect(
        &self,
        local_user_id: &str,
        return_origin: &str,
    ) -> Result<ConnectOutcome, AppError> {
        // A revoked record does not block reconnecting; the auth webhook
        // overwrites it once the provider confirms the new grant.
        if self
            .store
            .get_connection_by_local(local_user_id, PROVIDER_NAME)
            .await?
            .is_some_and(|c| c.is_active())
        {
            return Ok(ConnectOutcome::AlreadyConnected);
        }

        let url = self
            .provider
            .generate_auth_url(local_user_id, return_origin)
            .await?;

        tracing::info!(local_user_id, "Authorization URL issued");
        Ok(ConnectOutcome::AuthorizationUrl(url))
    }

    /// Tear down the link for a local user. Idempotent: disconnecting when
    /// no connection exists is a success.
    pub async fn disconnect(&self, local_user_id: &str) -> Result<DisconnectOutcome, AppError> {
        let connection = match self
            .store
            .get_connection_by_local(local_user_id, PROVIDER_NAME)
            .await?
        {
            Some(c) => c,
            None => return Ok(DisconnectOutcome::NotConnected),
        };

        // Delete the record first so no further payloads get attributed,
        // then revoke at the provider. Revocation failure is logged, not
        // surfaced: the local link is already gone.
        self.store
            .delete_connection(&connection.external_user_id)
            .await?;

        if let Err(e) = self
            .provider
            .deauthenticate(&connection.external_user_id)
            .await
        {
            tracing::warn!(
                local_user_id,
                external_user_id = %connection.external_user_id,
                error = %e,
                "Provider revocation failed after local disconnect"
            );
        }

        tracing::info!(local_user_id, "Provider disconnected");
        Ok(DisconnectOutcome::Disconnected)
    }
}
