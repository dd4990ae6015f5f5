//! Authorization-code and refresh-token grants
//!
//! Implements the two endpoints of account linking:
//! 1. Authorize: validate the client, resolve the subject, issue a code and
//!    build the redirect carrying `code` and the caller's `state`
//! 2. Token: exchange a code for an access/refresh token pair, or a refresh
//!    token for a new access token

use crate::credential::{Subject, ACCESS_TOKEN_TTL_SECONDS};
use crate::error::{AuthError, AuthResult};
use crate::identity::IdentityProvider;
use crate::store::CredentialStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";

/// The single client allowed to link accounts
#[derive(Clone)]
pub struct ClientRegistration {
    pub client_id: String,
    client_secret: String,
}

impl ClientRegistration {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    fn matches(&self, client_id: Option<&str>, client_secret: Option<&str>) -> bool {
        client_id == Some(self.client_id.as_str())
            && client_secret == Some(self.client_secret.as_str())
    }
}

impl std::fmt::Debug for ClientRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistration")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Query parameters of the authorize endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    /// Opaque caller value, returned unmodified
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub response_type: Option<String>,
}

/// Where to send the user agent after a successful authorize step
#[derive(Debug, Clone)]
pub struct AuthorizeRedirect {
    pub location: String,
}

/// Body of the token endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub grant_type: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

/// Successful token endpoint response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenResponse {
    pub token_type: &'static str,
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

/// Account-linking authorization server
pub struct AuthorizationServer {
    client: ClientRegistration,
    store: Arc<dyn CredentialStore>,
    identity: Arc<dyn IdentityProvider>,
}

impl AuthorizationServer {
    pub fn new(
        client: ClientRegistration,
        store: Arc<dyn CredentialStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            client,
            store,
            identity,
        }
    }

    /// Handle the authorize step and build the redirect back to the caller
    pub async fn authorize(&self, request: AuthorizeRequest) -> AuthResult<AuthorizeRedirect> {
        if request.client_id.as_deref() != Some(self.client.client_id.as_str()) {
            warn!("Authorize rejected: unknown client_id {:?}", request.client_id);
            return Err(AuthError::InvalidClient);
        }

        if request.response_type.as_deref() != Some("code") {
            return Err(AuthError::InvalidRequest("Invalid response_type".to_string()));
        }

        let redirect_uri = request
            .redirect_uri
            .as_deref()
            .filter(|uri| !uri.is_empty())
            .ok_or_else(|| AuthError::InvalidRequest("Missing redirect_uri".to_string()))?;
        let mut location = Url::parse(redirect_uri)
            .map_err(|_| AuthError::InvalidRequest("Invalid redirect_uri".to_string()))?;

        let subject = self.identity.authenticate(&request).await?;
        let code = self
            .store
            .create_code(&self.client.client_id, redirect_uri, &subject)
            .await?;

        {
            let mut query = location.query_pairs_mut();
            query.append_pair("code", &code.code);
            if let Some(state) = &request.state {
                query.append_pair("state", state);
            }
        }

        info!("Authorization code issued for subject {}", subject);
        Ok(AuthorizeRedirect {
            location: location.into(),
        })
    }

    /// Handle the token step
    pub async fn token(&self, request: TokenRequest) -> AuthResult<TokenResponse> {
        debug!("Token request with grant_type {:?}", request.grant_type);

        if !self
            .client
            .matches(request.client_id.as_deref(), request.client_secret.as_deref())
        {
            warn!("Token request rejected: invalid client credentials");
            return Err(AuthError::InvalidClient);
        }

        match request.grant_type.as_str() {
            GRANT_AUTHORIZATION_CODE => self.exchange_code(request).await,
            GRANT_REFRESH_TOKEN => self.refresh(request).await,
            other => Err(AuthError::UnsupportedGrantType(other.to_string())),
        }
    }

    async fn exchange_code(&self, request: TokenRequest) -> AuthResult<TokenResponse> {
        let code = request
            .code
            .as_deref()
            .ok_or_else(|| AuthError::invalid_grant("Invalid authorization code"))?;

        // Redemption is destructive: a failed exchange below still burns the code
        let authorization = self.store.redeem_code(code).await?;

        if request.redirect_uri.as_deref() != Some(authorization.redirect_uri.as_str()) {
            warn!("Code exchange rejected: redirect_uri mismatch");
            return Err(AuthError::invalid_grant("Redirect URI mismatch"));
        }

        if authorization.client_id != self.client.client_id {
            return Err(AuthError::invalid_grant("Code was issued to another client"));
        }

        let (access, refresh) = self.issue_pair(&authorization.subject).await?;
        info!("Account linked for subject {}", authorization.subject);

        Ok(TokenResponse {
            token_type: "Bearer",
            access_token: access,
            refresh_token: Some(refresh),
            expires_in: ACCESS_TOKEN_TTL_SECONDS,
        })
    }

    async fn refresh(&self, request: TokenRequest) -> AuthResult<TokenResponse> {
        let presented = request
            .refresh_token
            .as_deref()
            .ok_or_else(|| AuthError::invalid_grant("Invalid refresh token"))?;

        let refresh = self.store.lookup_refresh_token(presented).await?;
        let access = self.store.issue_access_token(&refresh.subject).await?;
        debug!("Access token refreshed for subject {}", refresh.subject);

        Ok(TokenResponse {
            token_type: "Bearer",
            access_token: access.token,
            refresh_token: None,
            expires_in: ACCESS_TOKEN_TTL_SECONDS,
        })
    }

    async fn issue_pair(&self, subject: &Subject) -> AuthResult<(String, String)> {
        let access = self.store.issue_access_token(subject).await?;
        let refresh = self.store.issue_refresh_token(subject).await?;
        Ok((access.token, refresh.token))
    }
}
